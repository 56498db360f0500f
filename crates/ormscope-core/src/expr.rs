//! Compiled SQL text plus its bound arguments.

use crate::error::{Error, Result};
use crate::value::Value;

/// How a backend spells positional parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?` for every parameter.
    Question,
    /// `$1`, `$2`, ... numbered from one.
    Dollar,
}

impl PlaceholderStyle {
    /// Render the placeholder for a 1-based argument index.
    pub fn render(self, index: usize) -> String {
        match self {
            PlaceholderStyle::Question => "?".to_string(),
            PlaceholderStyle::Dollar => format!("${}", index),
        }
    }
}

/// An SQL fragment and its ordered arguments.
///
/// Invariant: the number of positional placeholders in `sql` equals `args.len()`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledExpression {
    pub sql: String,
    pub args: Vec<Value>,
}

impl CompiledExpression {
    pub fn new(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }

    /// Literal SQL with no bound arguments (DDL).
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.sql.trim().is_empty()
    }

    /// Count placeholders in the text for the given style.
    pub fn placeholder_count(&self, style: PlaceholderStyle) -> usize {
        count_placeholders(&self.sql, style)
    }

    /// Verify the placeholder/argument invariant.
    pub fn check_parity(&self, style: PlaceholderStyle) -> Result<()> {
        let found = self.placeholder_count(style);
        if found != self.args.len() {
            return Err(Error::compile(format!(
                "statement has {} placeholders but {} arguments: {}",
                found,
                self.args.len(),
                self.sql
            )));
        }
        if style == PlaceholderStyle::Dollar {
            let highest = highest_placeholder_index(&self.sql);
            if highest != self.args.len() {
                return Err(Error::compile(format!(
                    "statement numbers placeholders up to ${} but has {} arguments: {}",
                    highest,
                    self.args.len(),
                    self.sql
                )));
            }
        }
        Ok(())
    }
}

/// Count positional placeholders outside of quoted literals and identifiers.
pub fn count_placeholders(sql: &str, style: PlaceholderStyle) -> usize {
    let bytes = sql.as_bytes();
    let mut count = 0;
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == q {
                    // doubled quote is an escape
                    if bytes.get(i + 1) == Some(&q) {
                        i += 1;
                    } else {
                        quote = None;
                    }
                }
            }
            None => match b {
                b'\'' | b'"' | b'`' => quote = Some(b),
                b'?' if style == PlaceholderStyle::Question => count += 1,
                b'$' if style == PlaceholderStyle::Dollar => {
                    if bytes.get(i + 1).is_some_and(u8::is_ascii_digit) {
                        count += 1;
                        while bytes.get(i + 1).is_some_and(u8::is_ascii_digit) {
                            i += 1;
                        }
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    count
}

/// The largest `N` of any `$N` placeholder outside of quotes, or 0 when there is none.
fn highest_placeholder_index(sql: &str) -> usize {
    let mut highest = 0;
    let mut quote: Option<char> = None;
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '$' => {
                    let mut digits = String::new();
                    while let Some(d) = chars.next_if(char::is_ascii_digit) {
                        digits.push(d);
                    }
                    if let Ok(n) = digits.parse::<usize>() {
                        highest = highest.max(n);
                    }
                }
                _ => {}
            },
        }
    }
    highest
}

/// Add `offset` to every `$N` placeholder outside of quoted literals and identifiers.
///
/// Used when statements numbered from `$1` are joined into one batch.
pub fn offset_placeholders(sql: &str, offset: usize) -> String {
    if offset == 0 {
        return sql.to_string();
    }
    let mut out = String::with_capacity(sql.len() + 8);
    let mut quote: Option<char> = None;
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                out.push(c);
            }
            None => match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    out.push(c);
                }
                '$' if chars.peek().is_some_and(char::is_ascii_digit) => {
                    let mut digits = String::new();
                    while let Some(d) = chars.next_if(char::is_ascii_digit) {
                        digits.push(d);
                    }
                    match digits.parse::<usize>() {
                        Ok(n) => out.push_str(&format!("${}", n + offset)),
                        Err(_) => {
                            out.push('$');
                            out.push_str(&digits);
                        }
                    }
                }
                _ => out.push(c),
            },
        }
    }
    out
}
