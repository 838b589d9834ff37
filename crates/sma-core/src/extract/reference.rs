//! Reference and merge-field syntax.

use regex::Regex;
use std::sync::OnceLock;

/// A dot-qualified `prefix.field` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FieldPath {
    pub prefix: String,
    /// Everything after the prefix; relationship paths keep their dots.
    pub field: String,
}

/// A name, optionally narrowed to a type for polymorphic relationships (`Owner:User`).
const IDENTIFIER_PATTERN: &str = r"^\$?[A-Za-z_][A-Za-z0-9_]*(:[A-Za-z_][A-Za-z0-9_]*)?$";
const MERGE_FIELD_PATTERN: &str = r"\{!([^{}]*)\}";

fn identifier() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(IDENTIFIER_PATTERN).ok()).as_ref()
}

fn merge_field() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(MERGE_FIELD_PATTERN).ok()).as_ref()
}

/// True for a plain field or variable name, or a `Name:Type` relationship segment.
pub(crate) fn is_identifier(name: &str) -> bool {
    identifier().map(|re| re.is_match(name)).unwrap_or(false)
}

/// Parse a reference, with or without `{!…}` braces.
///
/// Returns `Ok(None)` for a bare variable name (no field) and `Err` for
/// syntax that cannot be a reference.
pub(crate) fn parse_reference(raw: &str) -> Result<Option<FieldPath>, String> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix("{!")
        .and_then(|r| r.strip_suffix('}'))
        .unwrap_or(trimmed)
        .trim();

    if inner.is_empty() {
        return Err("empty reference".to_string());
    }

    let segments: Vec<&str> = inner.split('.').collect();
    if let Some(bad) = segments.iter().find(|s| !is_identifier(s)) {
        return Err(if bad.is_empty() {
            format!("empty segment in reference `{}`", inner)
        } else {
            format!("invalid segment `{}` in reference `{}`", bad, inner)
        });
    }

    if segments.len() < 2 {
        return Ok(None);
    }

    Ok(Some(FieldPath {
        prefix: segments[0].to_string(),
        field: segments[1..].join("."),
    }))
}

/// Contents of every `{!…}` merge field in a string literal.
pub(crate) fn merge_fields(text: &str) -> Result<Vec<String>, String> {
    let re = merge_field().ok_or_else(|| "merge field pattern unavailable".to_string())?;
    let found: Vec<String> = re
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect();

    if re.replace_all(text, "").contains("{!") {
        return Err("unterminated merge field".to_string());
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dotted() {
        let path = parse_reference("$Record.Rating").unwrap().unwrap();
        assert_eq!(path.prefix, "$Record");
        assert_eq!(path.field, "Rating");

        let path = parse_reference("{!Get_Account.Owner.Email}").unwrap().unwrap();
        assert_eq!(path.prefix, "Get_Account");
        assert_eq!(path.field, "Owner.Email");
    }

    #[test]
    fn test_parse_polymorphic_relationship() {
        let path = parse_reference("$Record.Owner:User.IsActive").unwrap().unwrap();
        assert_eq!(path.prefix, "$Record");
        assert_eq!(path.field, "Owner:User.IsActive");

        assert!(is_identifier("What:Opportunity"));
        assert!(!is_identifier("Owner:"));
        assert!(!is_identifier("Owner:User:Group"));
        assert!(parse_reference("$Record.Owner::User").is_err());
    }

    #[test]
    fn test_parse_bare_variable() {
        assert_eq!(parse_reference("varCount").unwrap(), None);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_reference("").is_err());
        assert!(parse_reference("$Record.").is_err());
        assert!(parse_reference("a..b").is_err());
        assert!(parse_reference("a.b c").is_err());
    }

    #[test]
    fn test_merge_fields() {
        let found = merge_fields("Hello {!$Record.Name}, owner {!Owner_Var.Email}").unwrap();
        assert_eq!(found, vec!["$Record.Name", "Owner_Var.Email"]);
        assert!(merge_fields("plain text").unwrap().is_empty());
        assert!(merge_fields("Hello {!$Record.Name").is_err());
    }
}
