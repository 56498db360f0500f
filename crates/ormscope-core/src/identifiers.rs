//! Naming conventions and identifier validation.

use regex::Regex;
use std::sync::OnceLock;

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"))
}

/// Whether `name` can be used unquoted as a table or column name.
pub fn is_valid_identifier(name: &str) -> bool {
    identifier_pattern().is_match(name)
}

/// Convert a declared name to its database form.
///
/// Runs of capitals are treated as one word, so `UserID` becomes `user_id` and
/// `HTTPServer` becomes `http_server`.
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev = if i > 0 { Some(chars[i - 1]) } else { None };
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                None => false,
                Some(p) if p == '_' => false,
                Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_ascii_uppercase() => next.is_some_and(|n| n.is_ascii_lowercase()),
                Some(_) => false,
            };
            if boundary {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else if c == '-' || c == ' ' {
            out.push('_');
        } else {
            out.push(c);
        }
    }
    out
}

/// English plural of a snake_case table name (last word only).
pub fn pluralize(name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }
    if let Some(stem) = name.strip_suffix('y') {
        let before = stem.chars().last();
        if before.is_some_and(|c| !matches!(c, 'a' | 'e' | 'i' | 'o' | 'u')) {
            return format!("{}ies", stem);
        }
    }
    if name.ends_with('s')
        || name.ends_with('x')
        || name.ends_with('z')
        || name.ends_with("ch")
        || name.ends_with("sh")
    {
        return format!("{}es", name);
    }
    format!("{}s", name)
}

/// Quote an identifier with double quotes, escaping embedded quotes.
pub fn quote_double(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal with single quotes, escaping embedded quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
