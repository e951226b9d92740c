//! Deterministic identifier rewriting from Fantom to Python.
//!
//! Three transformations, applied in order: synthetic-name separators,
//! camelCase to snake_case, and reserved-word escaping. The function is pure
//! and total; escaping appends a trailing `_` so the result is never a
//! Python keyword or a shadowed builtin.

use fnv::FnvHashSet;
use std::sync::OnceLock;

/// Python 3.12 keywords plus the builtins generated code must not shadow.
const RESERVED: &[&str] = &[
    // keywords
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class", "continue",
    "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if", "import",
    "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try", "while",
    "with", "yield",
    // builtins
    "type", "hash", "id", "list", "map", "str", "int", "float", "bool", "self", "abs", "all",
    "any", "min", "max", "pow", "round", "set", "dir", "oct", "open", "vars", "print",
];

fn reserved() -> &'static FnvHashSet<&'static str> {
    static SET: OnceLock<FnvHashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| RESERVED.iter().copied().collect())
}

/// Rewrite a Fantom slot, parameter or local name to its Python form.
pub fn map_name(name: &str) -> String {
    let cleaned = name.replace('$', "_");
    let snake = snake_case(&cleaned);
    if reserved().contains(snake.as_str()) {
        format!("{}_", snake)
    } else {
        snake
    }
}

/// camelCase to snake_case with acronym boundaries
/// (`XMLParser` -> `xml_parser`, `utf16BE` -> `utf16_be`).
fn snake_case(name: &str) -> String {
    // Fast path: nothing to rewrite.
    if !name.chars().any(|c| c.is_ascii_uppercase()) {
        return name.to_string();
    }

    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let boundary = match chars.get(i.wrapping_sub(1)) {
                Some(prev) if prev.is_ascii_lowercase() || prev.is_ascii_digit() => true,
                Some(prev) if prev.is_ascii_uppercase() => {
                    chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase())
                }
                _ => false,
            };
            if boundary && i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn lowercase_passes_through() {
        assert_eq!(map_name("size"), "size");
        assert_eq!(map_name("a_b_c"), "a_b_c");
    }

    #[test]
    fn camel_case_splits() {
        assert_eq!(map_name("toStr"), "to_str");
        assert_eq!(map_name("isEmpty"), "is_empty");
        assert_eq!(map_name("doSomethingBig"), "do_something_big");
    }

    #[test]
    fn acronym_boundaries() {
        assert_eq!(map_name("XMLParser"), "xml_parser");
        assert_eq!(map_name("utf16BE"), "utf16_be");
        assert_eq!(map_name("toURI"), "to_uri");
    }

    #[test]
    fn digits_break_words() {
        assert_eq!(map_name("base64Encode"), "base64_encode");
    }

    #[test]
    fn synthetic_separator_rewrites() {
        assert_eq!(map_name("checkFields$0"), "check_fields_0");
        assert_eq!(map_name("x$3"), "x_3");
    }

    #[test]
    fn keywords_escape() {
        assert_eq!(map_name("from"), "from_");
        assert_eq!(map_name("in"), "in_");
        assert_eq!(map_name("lambda"), "lambda_");
    }

    #[test]
    fn builtins_escape() {
        assert_eq!(map_name("type"), "type_");
        assert_eq!(map_name("hash"), "hash_");
        assert_eq!(map_name("min"), "min_");
    }

    #[test]
    fn escaped_names_are_stable() {
        // Idempotent once no collision remains.
        assert_eq!(map_name("type_"), "type_");
        assert_eq!(map_name(&map_name("toStr")), "to_str");
    }

    proptest! {
        #[test]
        fn output_is_never_reserved(name in "[a-zA-Z][a-zA-Z0-9$]{0,12}") {
            let out = map_name(&name);
            prop_assert!(!reserved().contains(out.as_str()));
        }

        #[test]
        fn output_has_no_uppercase_or_separator(name in "[a-zA-Z][a-zA-Z0-9$]{0,12}") {
            let out = map_name(&name);
            prop_assert!(!out.contains('$'));
            prop_assert!(!out.chars().any(|c| c.is_ascii_uppercase()));
        }

        #[test]
        fn snake_inputs_round_trip(name in "[a-z][a-z0-9_]{0,12}") {
            // Already snake_case and unreserved means unchanged.
            prop_assume!(!reserved().contains(name.as_str()));
            prop_assert_eq!(map_name(&name), name);
        }
    }
}
