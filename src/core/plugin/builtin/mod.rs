//! Built-in plugins

mod compress;
mod exclude;
mod order;

pub use compress::CompressPlugin;
pub use exclude::ExcludePlugin;
pub use order::OrderPlugin;

use crate::error::{ImageError, Result};
use regex::Regex;

/// Compile a resource path pattern.
///
/// `regex:` prefixes a raw regular expression. Anything else is a glob over
/// the whole path: `**` matches across `/`, `*` and `?` stay within one
/// segment.
pub fn glob_to_regex(pattern: &str) -> Result<Regex> {
    if let Some(raw) = pattern.strip_prefix("regex:") {
        return Regex::new(raw).map_err(|e| ImageError::Config(format!("pattern {}: {}", pattern, e)));
    }

    let mut expression = String::with_capacity(pattern.len() * 2 + 2);
    expression.push('^');
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                expression.push_str(".*");
            }
            '*' => expression.push_str("[^/]*"),
            '?' => expression.push_str("[^/]"),
            other => {
                let mut buf = [0u8; 4];
                expression.push_str(&regex::escape(other.encode_utf8(&mut buf)));
            }
        }
    }
    expression.push('$');

    Regex::new(&expression).map_err(|e| ImageError::Config(format!("pattern {}: {}", pattern, e)))
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns.iter().map(|p| glob_to_regex(p)).collect()
}
