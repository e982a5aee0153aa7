use once_cell::sync::Lazy;
use regex::Regex;

use super::field_names::normalize_field_name;
use crate::models::{FieldMapping, MappingSource, Recording};

/// Accessible names (normalized: lower-case, punctuation as spaces) -> profile field
const ARIA_LABELS: &[(&str, &str)] = &[
    ("first name", "firstName"),
    ("firstname", "firstName"),
    ("given name", "firstName"),
    ("middle name", "middleName"),
    ("last name", "lastName"),
    ("lastname", "lastName"),
    ("family name", "lastName"),
    ("surname", "lastName"),
    ("full name", "name"),
    ("name", "name"),
    ("email", "email"),
    ("email address", "email"),
    ("e mail", "email"),
    ("phone", "phone"),
    ("phone number", "phone"),
    ("telephone", "phone"),
    ("mobile", "phone"),
    ("mobile number", "phone"),
    ("cell", "phone"),
    ("cell phone", "phone"),
    ("address", "address"),
    ("address line 1", "address"),
    ("address 1", "address"),
    ("street", "address"),
    ("street address", "address"),
    ("address line 2", "address2"),
    ("address 2", "address2"),
    ("apartment", "address2"),
    ("apt", "address2"),
    ("suite", "address2"),
    ("city", "city"),
    ("town", "city"),
    ("suburb", "city"),
    ("state", "state"),
    ("province", "state"),
    ("region", "state"),
    ("zip", "zip"),
    ("zip code", "zip"),
    ("postal", "zip"),
    ("postal code", "zip"),
    ("postcode", "zip"),
    ("country", "country"),
    ("password", "password"),
    ("birthday", "dateOfBirth"),
    ("birthdate", "dateOfBirth"),
    ("birth date", "dateOfBirth"),
    ("date of birth", "dateOfBirth"),
    ("dob", "dateOfBirth"),
    ("gender", "gender"),
    ("sex", "gender"),
    ("company", "company"),
    ("company name", "company"),
    ("organization", "company"),
    ("organisation", "company"),
    ("business", "company"),
    ("job title", "jobTitle"),
    ("position", "jobTitle"),
    ("username", "username"),
    ("user name", "username"),
    ("login", "username"),
];

/// Patterns over id/class/attribute tokens, in priority order. The first rule
/// that matches any candidate decides the field.
const SELECTOR_RULES: &[(&str, &str)] = &[
    (r"first[-_]?name|^fname$|given[-_]?name", "firstName"),
    (r"middle[-_]?name", "middleName"),
    (r"last[-_]?name|^lname$|surname|family[-_]?name", "lastName"),
    (r"full[-_]?name|^(your[-_]?)?name$", "name"),
    (r"user[-_]?name|^login$", "username"),
    (r"e[-_]?mail", "email"),
    (r"phone|mobile|(^|[-_])tel($|[-_])|(^|[-_])cell($|[-_])", "phone"),
    (r"password|passwd|^pass$|pwd", "password"),
    (r"birth[-_]?(date|day)|^dob$|date[-_]?of[-_]?birth", "dateOfBirth"),
    (r"gender|^sex$", "gender"),
    (r"address[-_]?(line)?[-_]?2|^apt$|apartment|suite", "address2"),
    (r"address|street", "address"),
    (r"city|town|suburb|locality", "city"),
    (r"(^|[-_])state($|[-_])|province|region", "state"),
    (r"zip|postal|post[-_]?code", "zip"),
    (r"country", "country"),
    (r"company|organi[sz]ation|^org$", "company"),
    (r"job[-_]?title", "jobTitle"),
];

static SELECTOR_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    SELECTOR_RULES
        .iter()
        .map(|(pattern, field)| (Regex::new(pattern).expect("Invalid selector rule"), *field))
        .collect()
});

/// Pulls `#id`, `.class` and attribute values out of a CSS or XPath selector
static SELECTOR_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"#([A-Za-z0-9_-]+)|\.([A-Za-z_][A-Za-z0-9_-]*)|=\s*["']?([^"'\]\s]+)"#)
        .expect("Invalid regex")
});

static ROLE_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\[role="[^"]*"\]"#).expect("Invalid regex"));

/// Learn field mappings from every Change step of a recording.
///
/// Each Change step yields one mapping; the result is unique by canonical
/// selector, with a later step replacing an earlier one in place.
pub fn extract_mappings(recording: &Recording) -> Vec<FieldMapping> {
    let mut mappings: Vec<FieldMapping> = Vec::new();

    for step in recording.change_steps() {
        let candidates: Vec<&str> = step.candidates().collect();
        if candidates.is_empty() {
            continue;
        }

        let (selector, alternatives) = pick_canonical(&candidates);
        let mapping = match infer_field(&candidates) {
            Some((field, source)) => FieldMapping::new(selector, Some(field), source),
            None => FieldMapping::new(selector, None, MappingSource::SelectorPattern),
        }
        .with_alternatives(alternatives);

        tracing::debug!(
            "Extracted mapping: {} -> {:?}",
            mapping.selector,
            mapping.profile_field
        );

        match mappings.iter_mut().find(|m| m.selector == mapping.selector) {
            Some(existing) => *existing = mapping,
            None => mappings.push(mapping),
        }
    }

    mappings
}

/// Decide which profile field a set of selector candidates addresses
pub fn infer_field(candidates: &[&str]) -> Option<(String, MappingSource)> {
    if let Some(field) = candidates.iter().find_map(|c| aria_field(c)) {
        return Some((normalize_field_name(field), MappingSource::AriaLabel));
    }

    let tokens: Vec<String> = candidates
        .iter()
        .filter(|c| !c.starts_with("aria/") && !c.starts_with("text/"))
        .flat_map(|c| selector_tokens(c))
        .collect();

    SELECTOR_PATTERNS
        .iter()
        .find(|(pattern, _)| tokens.iter().any(|t| pattern.is_match(t)))
        .map(|(_, field)| (normalize_field_name(field), MappingSource::SelectorPattern))
}

fn aria_field(candidate: &str) -> Option<&'static str> {
    let label = candidate.strip_prefix("aria/")?;
    let label = normalize_label(label);
    if label.is_empty() {
        return None;
    }

    if let Some((_, field)) = ARIA_LABELS.iter().find(|(key, _)| *key == label) {
        return Some(*field);
    }

    // Longest table phrase present as whole words; ties go to table order
    let padded = format!(" {} ", label);
    let mut best: Option<(&str, &'static str)> = None;
    for (key, field) in ARIA_LABELS {
        if padded.contains(&format!(" {} ", key)) && best.map_or(true, |(b, _)| key.len() > b.len()) {
            best = Some((*key, *field));
        }
    }
    best.map(|(_, field)| field)
}

fn normalize_label(label: &str) -> String {
    let without_role = ROLE_SUFFIX.replace_all(label, " ");
    without_role
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn selector_tokens(candidate: &str) -> Vec<String> {
    let selector = candidate
        .strip_prefix("pierce/")
        .or_else(|| candidate.strip_prefix("xpath/"))
        .unwrap_or(candidate);

    SELECTOR_TOKEN
        .captures_iter(selector)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)))
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Choose the selector replay should try first: ID, then ARIA, then plain CSS,
/// then pierce/XPath. The rest become fallbacks in their recorded order.
pub fn pick_canonical(candidates: &[&str]) -> (String, Vec<String>) {
    let rank = |c: &str| -> u8 {
        if c.starts_with('#') || c.starts_with("pierce/#") {
            0
        } else if c.starts_with("aria/") {
            1
        } else if c.starts_with("pierce/") || c.starts_with("xpath/") || c.starts_with("text/") {
            3
        } else {
            2
        }
    };

    let Some(chosen) = candidates.iter().copied().min_by_key(|c| rank(*c)) else {
        return (String::new(), Vec::new());
    };

    let canonical = match chosen.strip_prefix("pierce/") {
        Some(id) if id.starts_with('#') => id.to_string(),
        _ => chosen.to_string(),
    };
    let alternatives = candidates
        .iter()
        .filter(|c| **c != chosen && **c != canonical)
        .map(|c| c.to_string())
        .collect();

    (canonical, alternatives)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Step;

    fn change(groups: &[&[&str]]) -> Step {
        Step::change(
            groups
                .iter()
                .map(|g| g.iter().map(|s| s.to_string()).collect())
                .collect(),
            Some("value".to_string()),
        )
    }

    fn recording(steps: Vec<Step>) -> Recording {
        Recording {
            title: None,
            source_url: Some("https://example.com/signup".to_string()),
            steps,
        }
    }

    #[test]
    fn test_aria_label_maps_with_full_confidence() {
        let rec = recording(vec![change(&[&["aria/Email address"], &["#email"]])]);
        let mappings = extract_mappings(&rec);

        assert_eq!(mappings.len(), 1);
        let m = &mappings[0];
        assert_eq!(m.selector, "#email");
        assert_eq!(m.alternative_selectors, vec!["aria/Email address".to_string()]);
        assert_eq!(m.profile_field.as_deref(), Some("email"));
        assert_eq!(m.confidence, 1.0);
        assert_eq!(m.source, MappingSource::AriaLabel);
    }

    #[test]
    fn test_aria_label_variants() {
        assert_eq!(aria_field("aria/ZIP Code"), Some("zip"));
        assert_eq!(aria_field("aria/Suburb/City"), Some("city"));
        assert_eq!(aria_field("aria/First name[role=\"textbox\"]"), Some("firstName"));
        assert_eq!(aria_field("aria/Your billing postal code"), Some("zip"));
        assert_eq!(aria_field("aria/[role=\"textbox\"]"), None);
        assert_eq!(aria_field("#email"), None);
    }

    #[test]
    fn test_selector_pattern_tier() {
        let rec = recording(vec![change(&[&["form > input[name=\"billing_postcode\"]"]])]);
        let m = &extract_mappings(&rec)[0];

        assert_eq!(m.profile_field.as_deref(), Some("zip"));
        assert_eq!(m.confidence, 0.7);
        assert_eq!(m.source, MappingSource::SelectorPattern);
    }

    #[test]
    fn test_selector_rules_respect_table_order() {
        let field = infer_field(&["#email-address"]).map(|(f, _)| f);
        assert_eq!(field.as_deref(), Some("email"));

        let field = infer_field(&["#address-line-2"]).map(|(f, _)| f);
        assert_eq!(field.as_deref(), Some("address2"));

        let field = infer_field(&["input[name='name']"]).map(|(f, _)| f);
        assert_eq!(field.as_deref(), Some("name"));

        // attribute names are not tokens
        assert!(infer_field(&["input[name='q1']"]).is_none());
    }

    #[test]
    fn test_unmatched_field_kept_unmapped() {
        let rec = recording(vec![change(&[&["#q1"]])]);
        let m = &extract_mappings(&rec)[0];

        assert_eq!(m.profile_field, None);
        assert_eq!(m.confidence, 0.0);
    }

    #[test]
    fn test_pick_canonical_priority() {
        let (sel, alts) = pick_canonical(&["aria/Email", "form > input", "pierce/#email", "xpath///input"]);
        assert_eq!(sel, "#email");
        assert_eq!(alts, vec!["aria/Email", "form > input", "xpath///input"]);

        let (sel, _) = pick_canonical(&["xpath///input", "form > input", "aria/Email"]);
        assert_eq!(sel, "aria/Email");

        let (sel, _) = pick_canonical(&["xpath///input", "input.email"]);
        assert_eq!(sel, "input.email");
    }

    #[test]
    fn test_unique_by_selector_and_deterministic() {
        let rec = recording(vec![
            change(&[&["#email"]]),
            change(&[&["aria/Phone"], &["#phone"]]),
            change(&[&["aria/Email"], &["#email"]]),
        ]);

        let first = extract_mappings(&rec);
        let second = extract_mappings(&rec);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].selector, "#email");
        assert_eq!(first[0].source, MappingSource::AriaLabel);
        assert_eq!(first[1].profile_field.as_deref(), Some("phone"));
    }
}
