//! Subject validation and wildcard matching
//!
//! Subjects are dot-separated token strings (`orders.eu.created`).
//! Patterns may use `*` to match exactly one token and `>` to match one or
//! more trailing tokens; `>` is only valid as the final token.

/// Check whether a literal subject is well-formed.
///
/// Literal subjects must be non-empty, contain no whitespace, and have no
/// empty or wildcard tokens.
pub fn is_valid_subject(subject: &str) -> bool {
    if subject.is_empty() || subject.chars().any(char::is_whitespace) {
        return false;
    }
    subject
        .split('.')
        .all(|token| !token.is_empty() && token != "*" && token != ">")
}

/// Check whether a subscription pattern is well-formed.
///
/// Patterns follow the same token rules as subjects but may contain `*`
/// tokens anywhere and a single `>` token in the final position.
pub fn is_valid_pattern(pattern: &str) -> bool {
    if pattern.is_empty() || pattern.chars().any(char::is_whitespace) {
        return false;
    }
    let tokens: Vec<&str> = pattern.split('.').collect();
    let last = tokens.len() - 1;
    tokens
        .iter()
        .enumerate()
        .all(|(i, token)| !token.is_empty() && (*token != ">" || i == last))
}

/// Match a subject against a pattern.
///
/// `*` matches exactly one token; `>` matches one or more remaining tokens.
pub fn matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return true,
            (Some(p), Some(s)) => {
                if p != "*" && p != s {
                    return false;
                }
            }
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Return the part of a matching subject covered by the pattern's first
/// wildcard token.
///
/// `wildcard_suffix("greet.*", "greet.joe")` yields `Some("joe")`. Returns
/// `None` when the subject does not match or the pattern has no wildcard.
pub fn wildcard_suffix<'a>(pattern: &str, subject: &'a str) -> Option<&'a str> {
    if !matches(pattern, subject) {
        return None;
    }

    let wildcard_index = pattern
        .split('.')
        .position(|token| token == "*" || token == ">")?;

    let mut offset = 0;
    for (i, token) in subject.split('.').enumerate() {
        if i == wildcard_index {
            return Some(&subject[offset..]);
        }
        offset += token.len() + 1;
    }
    None
}
