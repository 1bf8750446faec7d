//! SQL template placeholder extraction.

use std::sync::OnceLock;

use regex::Regex;

use super::NameSet;

pub(crate) fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex"))
}

/// Find every `{identifier}` placeholder in a SQL fragment.
pub fn extract_placeholders(source: &str) -> NameSet {
    placeholder_re()
        .captures_iter(source)
        .map(|c| c[1].to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_placeholders() {
        let names = extract_placeholders(
            "SELECT name FROM products WHERE price > {min_price} AND cat = {category}",
        );
        assert!(names.contains("min_price"));
        assert!(names.contains("category"));
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn no_placeholders_is_empty() {
        assert!(extract_placeholders("SELECT * FROM t").is_empty());
    }

    #[test]
    fn rejects_digit_leading_braces() {
        let names = extract_placeholders("SELECT {1abc}, {_ok}");
        assert!(!names.contains("1abc"));
        assert!(names.contains("_ok"));
    }
}
