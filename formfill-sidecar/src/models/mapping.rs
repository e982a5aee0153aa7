use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// How a field's value is set during replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillStrategy {
    #[default]
    DirectType,
    DropdownSelect,
    CustomDropdown,
    JsDateInput,
    CharByChar,
    CheckboxClick,
    RadioClick,
}

impl FillStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FillStrategy::DirectType => "direct_type",
            FillStrategy::DropdownSelect => "dropdown_select",
            FillStrategy::CustomDropdown => "custom_dropdown",
            FillStrategy::JsDateInput => "js_date_input",
            FillStrategy::CharByChar => "char_by_char",
            FillStrategy::CheckboxClick => "checkbox_click",
            FillStrategy::RadioClick => "radio_click",
        }
    }
}

/// Which signal produced a mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingSource {
    AriaLabel,
    SelectorPattern,
    LiveAnalysis,
    Manual,
}

/// Learned correspondence between one form control and a profile field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub selector: String,
    #[serde(default)]
    pub alternative_selectors: Vec<String>,
    pub profile_field: Option<String>,
    pub confidence: f64,
    #[serde(default)]
    pub fill_strategy: FillStrategy,
    pub source: MappingSource,
    /// Set when live analysis could not resolve the selector
    #[serde(default)]
    pub stale: bool,
}

impl FieldMapping {
    pub fn new(selector: impl Into<String>, profile_field: Option<String>, source: MappingSource) -> Self {
        let confidence = match (&profile_field, source) {
            (None, _) => 0.0,
            (Some(_), MappingSource::AriaLabel | MappingSource::Manual) => 1.0,
            (Some(_), _) => 0.7,
        };
        Self {
            selector: selector.into(),
            alternative_selectors: Vec::new(),
            profile_field,
            confidence,
            fill_strategy: FillStrategy::default(),
            source,
            stale: false,
        }
    }

    pub fn with_alternatives(mut self, alternatives: Vec<String>) -> Self {
        self.alternative_selectors = alternatives;
        self
    }

    pub fn with_strategy(mut self, strategy: FillStrategy) -> Self {
        self.fill_strategy = strategy;
        self
    }

    pub fn is_mapped(&self) -> bool {
        self.profile_field.is_some()
    }

    /// Canonical selector followed by the fallbacks, in replay order
    pub fn selector_chain(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.selector.as_str())
            .chain(self.alternative_selectors.iter().map(String::as_str))
    }

    /// Whether this mapping addresses the given selector
    pub fn matches_selector(&self, selector: &str) -> bool {
        self.selector_chain().any(|s| s == selector)
    }
}

/// All learned mappings for a single origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingSet {
    pub origin: String,
    pub source_url: String,
    pub trained_at: DateTime<Utc>,
    pub mappings: Vec<FieldMapping>,
}

impl MappingSet {
    /// Build a set, keeping mappings unique by selector (later entries win)
    pub fn new(origin: &str, source_url: impl Into<String>, mappings: Vec<FieldMapping>) -> Self {
        let mut set = Self {
            origin: normalize_origin(origin).unwrap_or_else(|| origin.to_lowercase()),
            source_url: source_url.into(),
            trained_at: Utc::now(),
            mappings: Vec::with_capacity(mappings.len()),
        };
        for mapping in mappings {
            set.upsert(mapping);
        }
        set
    }

    /// Insert a mapping, overwriting any entry with the same selector in place
    pub fn upsert(&mut self, mapping: FieldMapping) {
        match self.mappings.iter_mut().find(|m| m.selector == mapping.selector) {
            Some(existing) => *existing = mapping,
            None => self.mappings.push(mapping),
        }
    }

    pub fn get(&self, selector: &str) -> Option<&FieldMapping> {
        self.mappings.iter().find(|m| m.selector == selector)
    }

    /// Find the mapping addressing any of the candidates, canonical matches first
    pub fn find_for_candidates<'a, I>(&self, candidates: I) -> Option<&FieldMapping>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let candidates: Vec<&str> = candidates.into_iter().collect();
        candidates
            .iter()
            .find_map(|c| self.get(c))
            .or_else(|| {
                self.mappings
                    .iter()
                    .find(|m| candidates.iter().any(|c| m.matches_selector(c)))
            })
    }

    pub fn mapped_count(&self) -> usize {
        self.mappings.iter().filter(|m| m.is_mapped()).count()
    }
}

/// Normalize a URL or bare host into an origin key: lower-case host, no scheme or port
pub fn normalize_origin(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    let parsed = if trimmed.contains("://") {
        Url::parse(trimmed).ok()?
    } else {
        Url::parse(&format!("http://{}", trimmed)).ok()?
    };

    parsed
        .host_str()
        .map(|h| h.trim_end_matches('.').to_lowercase())
        .filter(|h| !h.is_empty())
}

/// Whether a host observed at replay time belongs to the expected origin
pub fn origin_matches(expected: &str, actual: &str) -> bool {
    let expected = expected.to_lowercase();
    let actual = actual.to_lowercase();
    let bare = |h: &str| h.strip_prefix("www.").map(str::to_string).unwrap_or_else(|| h.to_string());
    let (expected, actual) = (bare(&expected), bare(&actual));

    expected == actual
        || actual.ends_with(&format!(".{}", expected))
        || expected.ends_with(&format!(".{}", actual))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_origin() {
        assert_eq!(
            normalize_origin("https://WWW.Example.com:8443/signup?x=1"),
            Some("www.example.com".to_string())
        );
        assert_eq!(normalize_origin("example.com"), Some("example.com".to_string()));
        assert_eq!(normalize_origin("Example.COM:80"), Some("example.com".to_string()));
        assert_eq!(normalize_origin(""), None);
        assert_eq!(normalize_origin("file:///tmp/form.html"), None);
    }

    #[test]
    fn test_origin_matches_subdomains() {
        assert!(origin_matches("example.com", "www.example.com"));
        assert!(origin_matches("accounts.example.com", "example.com"));
        assert!(!origin_matches("example.com", "evil-example.com"));
        assert!(!origin_matches("example.com", "other.org"));
    }

    #[test]
    fn test_mapping_set_unique_by_selector() {
        let set = MappingSet::new(
            "https://example.com/form",
            "https://example.com/form",
            vec![
                FieldMapping::new("#email", None, MappingSource::SelectorPattern),
                FieldMapping::new("#zip", Some("zip".to_string()), MappingSource::SelectorPattern),
                FieldMapping::new("#email", Some("email".to_string()), MappingSource::AriaLabel),
            ],
        );

        assert_eq!(set.origin, "example.com");
        assert_eq!(set.mappings.len(), 2);
        assert_eq!(set.mappings[0].selector, "#email");
        assert_eq!(set.mappings[0].profile_field.as_deref(), Some("email"));
        assert_eq!(set.mappings[0].confidence, 1.0);
        assert_eq!(set.mapped_count(), 2);
    }

    #[test]
    fn test_find_for_candidates_uses_alternatives() {
        let set = MappingSet::new(
            "example.com",
            "https://example.com",
            vec![FieldMapping::new("#first", Some("firstName".to_string()), MappingSource::AriaLabel)
                .with_alternatives(vec!["input[name=first]".to_string()])],
        );

        let found = set.find_for_candidates(["form > input", "input[name=first]"]);
        assert_eq!(found.map(|m| m.selector.as_str()), Some("#first"));
        assert!(set.find_for_candidates(["#nope"]).is_none());
    }

    #[test]
    fn test_persisted_field_names() {
        let mapping = FieldMapping::new("#zip", Some("zip".to_string()), MappingSource::SelectorPattern);
        let value = serde_json::to_value(&mapping).unwrap();
        for key in [
            "selector",
            "alternative_selectors",
            "profile_field",
            "confidence",
            "fill_strategy",
            "source",
        ] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(value["fill_strategy"], "direct_type");
        assert_eq!(value["source"], "selector_pattern");
    }
}
