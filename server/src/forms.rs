use std::collections::BTreeMap;

use chrono::NaiveDateTime;

/// Per-field validation errors collected while checking a submitted form.
///
/// An empty map means the form is valid. Field names match the `name`
/// attributes of the rendered form inputs so templates can place each message
/// next to its input.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FormErrors {
    errors: BTreeMap<&'static str, Vec<String>>,
}

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.entry(field).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    pub fn field(&self, field: &str) -> &[String] {
        self.errors.get(field).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// An option of an HTML `<select>`, with its selection state precomputed by
/// the handler so the templates stay logic-free.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>, selected: bool) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
            selected,
        }
    }
}

pub const REQUIRED_MESSAGE: &str = "This field is required.";

/// Adds a "required" error when the value is blank and reports whether the
/// value was present.
pub fn require(errors: &mut FormErrors, field: &'static str, value: &str) -> bool {
    if value.trim().is_empty() {
        errors.add(field, REQUIRED_MESSAGE);
        false
    } else {
        true
    }
}

/// Parses an optional select value: an empty string means "no choice", and a
/// non-numeric value records a field error.
pub fn parse_optional_id(
    errors: &mut FormErrors,
    field: &'static str,
    value: &str,
) -> Option<i32> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse() {
        Ok(id) => Some(id),
        Err(_) => {
            errors.add(field, "Select a valid choice.");
            None
        }
    }
}

const DEADLINE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parses a deadline as submitted by an HTML `datetime-local` input.
///
/// A trailing `Z` is tolerated and ignored; the value is stored as a naive
/// timestamp.
pub fn parse_deadline(input: &str) -> Option<NaiveDateTime> {
    let trimmed = input.trim().trim_end_matches('Z');
    DEADLINE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
}

/// Builds an `ILIKE` pattern matching the query as a substring, escaping the
/// wildcard characters of `LIKE` so user input is matched literally.
pub fn contains_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn form_errors_collect_per_field() {
        let mut errors = FormErrors::new();
        assert!(errors.is_empty());

        errors.add("name", REQUIRED_MESSAGE);
        errors.add("name", "Name is already in use.");
        errors.add("deadline", "Enter a valid date and time.");

        assert!(!errors.is_empty());
        assert!(errors.has("name"));
        assert_eq!(errors.field("name").len(), 2);
        assert_eq!(errors.field("deadline").len(), 1);
        assert!(errors.field("priority").is_empty());
    }

    #[test]
    fn require_flags_blank_values() {
        let mut errors = FormErrors::new();
        assert!(!require(&mut errors, "name", "   "));
        assert!(errors.has("name"));

        let mut errors = FormErrors::new();
        assert!(require(&mut errors, "name", "Deploy"));
        assert!(errors.is_empty());
    }

    #[test]
    fn parses_datetime_local_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(14, 0, 0)
            .unwrap();

        assert_eq!(parse_deadline("2024-06-01T14:00"), Some(expected));
        assert_eq!(parse_deadline("2024-06-01T14:00:00"), Some(expected));
        assert_eq!(parse_deadline("2024-06-01 14:00:00"), Some(expected));
        assert_eq!(parse_deadline("2024-06-01T14:00:00Z"), Some(expected));
    }

    #[test]
    fn rejects_invalid_deadlines() {
        assert_eq!(parse_deadline("invalid-date"), None);
        assert_eq!(parse_deadline(""), None);
        assert_eq!(parse_deadline("2024-13-01T00:00"), None);
    }

    #[test]
    fn optional_id_accepts_empty_and_numeric_values() {
        let mut errors = FormErrors::new();
        assert_eq!(parse_optional_id(&mut errors, "position", ""), None);
        assert_eq!(parse_optional_id(&mut errors, "position", "7"), Some(7));
        assert!(errors.is_empty());

        assert_eq!(parse_optional_id(&mut errors, "position", "abc"), None);
        assert!(errors.has("position"));
    }

    #[test]
    fn contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("john"), "%john%");
        assert_eq!(contains_pattern("50%"), "%50\\%%");
        assert_eq!(contains_pattern("a_b"), "%a\\_b%");
    }
}
