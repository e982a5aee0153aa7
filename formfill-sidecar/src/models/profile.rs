use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::recording::field_names::normalize_field_name;

/// Flat profile data keyed by canonical field name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "HashMap<String, Value>", into = "BTreeMap<String, String>")]
pub struct Profile {
    values: BTreeMap<String, String>,
}

impl Profile {
    /// Build a profile from caller-supplied values.
    ///
    /// Keys are canonicalized with the same normalization applied to mapping
    /// fields. Nested objects (e.g. `{"address": {"city": ..}}` sections) are
    /// flattened one level. When two keys collapse onto the same field, a key
    /// that is already canonical wins; otherwise the first key in sorted order.
    pub fn from_values(values: HashMap<String, Value>) -> Self {
        let mut flat: BTreeMap<String, String> = BTreeMap::new();
        for (key, value) in values {
            match value {
                Value::Object(section) => {
                    for (inner_key, inner_value) in section {
                        if let Some(text) = scalar_to_string(&inner_value) {
                            flat.entry(inner_key).or_insert(text);
                        }
                    }
                }
                other => {
                    if let Some(text) = scalar_to_string(&other) {
                        flat.insert(key, text);
                    }
                }
            }
        }

        let mut canonical: BTreeMap<String, String> = BTreeMap::new();
        for (key, value) in flat {
            if value.trim().is_empty() {
                continue;
            }
            let field = normalize_field_name(&key);
            if key == field {
                canonical.insert(field, value);
            } else {
                canonical.entry(field).or_insert(value);
            }
        }

        Self { values: canonical }
    }

    /// Look up the value for a (possibly non-canonical) field name
    pub fn lookup(&self, field: &str) -> Option<&str> {
        self.values
            .get(&normalize_field_name(field))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl From<HashMap<String, Value>> for Profile {
    fn from(values: HashMap<String, Value>) -> Self {
        Self::from_values(values)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Profile {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self::from_values(
            iter.into_iter()
                .map(|(k, v)| (k.into(), Value::String(v.into())))
                .collect(),
        )
    }
}

impl From<Profile> for BTreeMap<String, String> {
    fn from(profile: Profile) -> Self {
        profile.values
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
