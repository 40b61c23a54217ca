//! String utility functions.
//!
//! Identifier derivation for worlds and agents: display names are turned
//! into stable kebab-case ids used as storage keys and lookup handles.

use regex::Regex;
use once_cell::sync::Lazy;

static CAMEL_LOWER_UPPER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").unwrap());
static CAMEL_UPPER_LOWER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Z]+)([A-Z][a-z])").unwrap());
static DISALLOWED_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Convert a display name into a kebab-case identifier.
///
/// Splits camelCase, lowercases, collapses every run of non-alphanumeric
/// characters into a single `-`, and strips leading/trailing dashes.
///
/// ```
/// use agent_worlds::utilities::string_utils::to_kebab_case;
/// assert_eq!(to_kebab_case("My World"), "my-world");
/// assert_eq!(to_kebab_case("researchAgent_2"), "research-agent-2");
/// ```
pub fn to_kebab_case(name: &str) -> String {
    let ascii_name: String = name.chars().filter(|c| c.is_ascii()).collect();

    let step1 = CAMEL_UPPER_LOWER.replace_all(&ascii_name, "${1}-${2}");
    let step2 = CAMEL_LOWER_UPPER.replace_all(&step1, "${1}-${2}");
    let lowered = step2.to_lowercase();
    let replaced = DISALLOWED_CHARS.replace_all(&lowered, "-");

    replaced.trim_matches('-').to_string()
}

/// Whether `a` and `b` denote the same identifier, ignoring ASCII case.
pub fn same_identifier(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}
