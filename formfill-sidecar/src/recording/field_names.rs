/// Canonical profile field names. A name in this list is already normalized.
pub const CANONICAL_FIELDS: &[&str] = &[
    "email",
    "firstName",
    "middleName",
    "lastName",
    "name",
    "password",
    "phone",
    "address",
    "address2",
    "city",
    "state",
    "zip",
    "country",
    "company",
    "jobTitle",
    "username",
    "dateOfBirth",
    "gender",
];

/// Compacted alias -> canonical field
const ALIASES: &[(&str, &str)] = &[
    ("firstname", "firstName"),
    ("fname", "firstName"),
    ("givenname", "firstName"),
    ("middlename", "middleName"),
    ("lastname", "lastName"),
    ("lname", "lastName"),
    ("surname", "lastName"),
    ("familyname", "lastName"),
    ("fullname", "name"),
    ("yourname", "name"),
    ("email", "email"),
    ("mail", "email"),
    ("emailaddress", "email"),
    ("password", "password"),
    ("passwd", "password"),
    ("pwd", "password"),
    ("phone", "phone"),
    ("phonenumber", "phone"),
    ("mobile", "phone"),
    ("telephone", "phone"),
    ("tel", "phone"),
    ("cell", "phone"),
    ("address", "address"),
    ("address1", "address"),
    ("addressline1", "address"),
    ("street", "address"),
    ("streetaddress", "address"),
    ("address2", "address2"),
    ("addressline2", "address2"),
    ("apt", "address2"),
    ("apartment", "address2"),
    ("suite", "address2"),
    ("city", "city"),
    ("town", "city"),
    ("suburb", "city"),
    ("suburbcity", "city"),
    ("locality", "city"),
    ("state", "state"),
    ("province", "state"),
    ("region", "state"),
    ("zip", "zip"),
    ("zipcode", "zip"),
    ("postal", "zip"),
    ("postalcode", "zip"),
    ("postcode", "zip"),
    ("country", "country"),
    ("nation", "country"),
    ("company", "company"),
    ("companyname", "company"),
    ("organization", "company"),
    ("organisation", "company"),
    ("jobtitle", "jobTitle"),
    ("username", "username"),
    ("login", "username"),
    ("dob", "dateOfBirth"),
    ("dateofbirth", "dateOfBirth"),
    ("birthdate", "dateOfBirth"),
    ("birthday", "dateOfBirth"),
    ("gender", "gender"),
    ("sex", "gender"),
];

/// Canonicalize a field name so that spelling variants land on one profile key.
///
/// `suburb`, `town` and `city` all become `city`; `postcode`, `postal` and
/// `zip` become `zip`. Canonical names pass through untouched, which makes the
/// function idempotent. Names with no known alias are returned trimmed.
pub fn normalize_field_name(field_name: &str) -> String {
    let trimmed = field_name.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if CANONICAL_FIELDS.iter().any(|f| *f == trimmed) {
        return trimmed.to_string();
    }

    let compact: String = trimmed
        .chars()
        .filter(|c| !matches!(*c, ' ' | '-' | '_' | '/' | '.'))
        .flat_map(char::to_lowercase)
        .collect();

    if let Some((_, canonical)) = ALIASES.iter().find(|(alias, _)| *alias == compact) {
        return canonical.to_string();
    }

    // Longest contained alias wins; ties go to table order
    let mut best: Option<(&str, &str)> = None;
    for (alias, canonical) in ALIASES {
        if compact.contains(alias) && best.map_or(true, |(b, _)| alias.len() > b.len()) {
            best = Some((*alias, *canonical));
        }
    }

    match best {
        Some((_, canonical)) => canonical.to_string(),
        None => trimmed.to_string(),
    }
}
