//! Formatter backends: pure functions from the semantic model to text.
//!
//! All backends borrow the model shared and never mutate it; every
//! primary key a backend needs was resolved by the builder beforehand.

pub mod canonical;
pub mod plantuml;
pub mod sql;

use crate::error::CapabilityError;
use crate::model::Database;

/// A rendering backend for a built database model.
pub trait Formatter {
    /// Renders the model. Only SQL dialects can fail, when asked for a
    /// feature they cannot express.
    fn format(&self, db: &Database) -> Result<String, CapabilityError>;
}

/// `camelCase` (and `UpperCamel`) to `snake_case`. Uppercase runs
/// collapse without inner underscores: `userID` becomes `user_id`.
#[must_use]
pub fn camel_to_snake(camel: &str) -> String {
    let mut out = String::with_capacity(camel.len() + 4);
    let mut prev: Option<char> = None;
    for c in camel.chars() {
        if c.is_uppercase() {
            if prev.is_some_and(|p| p != '_' && !p.is_uppercase()) {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
        prev = Some(c);
    }
    out
}

/// Renders a numeric literal, dropping the fraction when integral.
#[must_use]
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_to_snake() {
        assert_eq!(camel_to_snake("userId"), "user_id");
        assert_eq!(camel_to_snake("userID"), "user_id");
        assert_eq!(camel_to_snake("GameMode"), "game_mode");
        assert_eq!(camel_to_snake("already_snake"), "already_snake");
        assert_eq!(camel_to_snake("x"), "x");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(1.5), "1.5");
    }
}
