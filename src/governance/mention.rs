//! `@name` mention grammar.
//!
//! A mention is an `@` that starts the text or follows a character that is
//! neither a word character nor another `@`, immediately followed by a
//! name: one ASCII letter, then ASCII letters/digits, where single `-` or
//! `_` separators may appear between alphanumeric runs. Anything else
//! (`@@x`, a bare `@`, `@-x`, `@123`, `mail@host`) is not a mention and
//! stays plain text.
//!
//! Names are returned lowercased; matching against agents is
//! case-insensitive.

use once_cell::sync::Lazy;
use regex::Regex;

static MENTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^A-Za-z0-9_@])@([A-Za-z][A-Za-z0-9]*(?:[-_][A-Za-z0-9]+)*)").unwrap()
});

static LEADING_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*@([A-Za-z][A-Za-z0-9]*(?:[-_][A-Za-z0-9]+)*)").unwrap());

/// First valid mention in `content`, lowercased.
///
/// Only the first one carries eligibility weight, so at most one agent is
/// triggered per message; later mentions remain in the text untouched.
pub fn extract_first_mention(content: &str) -> Option<String> {
    MENTION
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
}

/// Whether `@name` is a complete, valid mention, i.e. an agent with this
/// id can be addressed at all.
pub fn is_mentionable(name: &str) -> bool {
    !name.is_empty()
        && extract_first_mention(&format!("@{}", name)).is_some_and(|m| m.len() == name.len())
}

/// The mention the text starts with (leading whitespace allowed), lowercased.
pub fn leading_mention(text: &str) -> Option<String> {
    LEADING_MENTION
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
}

/// Whether `text` begins with a mention of `name` (case-insensitive).
pub fn starts_with_mention_of(text: &str, name: &str) -> bool {
    leading_mention(text).is_some_and(|m| m.eq_ignore_ascii_case(name))
}

/// Remove every leading mention for which `is_self` holds, then trim.
///
/// `"@me @me hello"` → `"hello"`; a leading mention of anyone else stops
/// the stripping.
pub fn strip_leading_mentions(text: &str, is_self: impl Fn(&str) -> bool) -> String {
    let mut rest = text.trim();
    while let Some(cap) = LEADING_MENTION.captures(rest) {
        let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
            break;
        };
        if !is_self(name.as_str()) {
            break;
        }
        rest = rest[whole.end()..].trim_start();
    }
    rest.trim().to_string()
}

/// Prefix `text` with `@name `.
pub fn prepend_mention(text: &str, name: &str) -> String {
    format!("@{name} {text}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_mention_wins() {
        assert_eq!(
            extract_first_mention("hi @a1 say hi to @a2").as_deref(),
            Some("a1")
        );
    }

    #[test]
    fn test_unknown_first_mention_still_counts() {
        assert_eq!(
            extract_first_mention("@unknown @a2 help").as_deref(),
            Some("unknown")
        );
    }

    #[test]
    fn test_malformed_mentions_are_skipped() {
        assert_eq!(extract_first_mention("@@ @123 @-invalid"), None);
        assert_eq!(extract_first_mention("@"), None);
        assert_eq!(extract_first_mention("@@x"), None);
        assert_eq!(extract_first_mention("@-x"), None);
        assert_eq!(extract_first_mention("mail me at bob@example.com"), None);
    }

    #[test]
    fn test_malformed_before_valid() {
        assert_eq!(extract_first_mention("@@x then @b2").as_deref(), Some("b2"));
    }

    #[test]
    fn test_mention_is_lowercased_and_punctuation_terminated() {
        assert_eq!(extract_first_mention("Hey @Alice, ready?").as_deref(), Some("alice"));
        assert_eq!(extract_first_mention("(@bob)").as_deref(), Some("bob"));
        assert_eq!(extract_first_mention("@research-bot_2: go").as_deref(), Some("research-bot_2"));
        assert_eq!(extract_first_mention("@trailing- dash").as_deref(), Some("trailing"));
    }

    #[test]
    fn test_is_mentionable() {
        assert!(is_mentionable("a1"));
        assert!(is_mentionable("research-bot"));
        assert!(!is_mentionable("2bot"));
        assert!(!is_mentionable("bot-"));
        assert!(!is_mentionable(""));
    }

    #[test]
    fn test_leading_mention() {
        assert_eq!(leading_mention("  @Human done").as_deref(), Some("human"));
        assert_eq!(leading_mention("done @human"), None);
        assert!(starts_with_mention_of("@A1 hi", "a1"));
        assert!(!starts_with_mention_of("hi @a1", "a1"));
    }

    #[test]
    fn test_strip_leading_self_mentions() {
        let is_me = |m: &str| m.eq_ignore_ascii_case("me");
        assert_eq!(strip_leading_mentions("@me @ME hello", is_me), "hello");
        assert_eq!(strip_leading_mentions("@you @me hello", is_me), "@you @me hello");
        assert_eq!(strip_leading_mentions("hello @me", is_me), "hello @me");
        assert_eq!(strip_leading_mentions("@me", is_me), "");
    }

    #[test]
    fn test_prepend_mention() {
        assert_eq!(prepend_mention("thanks", "a1"), "@a1 thanks");
    }
}
