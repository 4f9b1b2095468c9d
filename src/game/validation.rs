//! Input validation for announced letters and lobby settings
//!
//! Letters must be a single ASCII letter A-Z in either case. They are stored
//! uppercase.

use crate::error::{GameError, Result};

/// Validate an announced letter and return it uppercased.
///
/// Surrounding whitespace is not trimmed: `" a"` is two characters.
pub fn validate_letter(input: &str) -> Result<char> {
    let mut chars = input.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => Ok(c.to_ascii_uppercase()),
        _ => Err(GameError::InvalidLetter(input.to_string())),
    }
}

/// Validate a requested grid size against the configured bounds.
pub fn validate_grid_size(size: usize, min: usize, max: usize) -> Result<usize> {
    if (min..=max).contains(&size) {
        Ok(size)
    } else {
        Err(GameError::InvalidConfig(format!(
            "grid size must be between {} and {}, got {}",
            min, max, size
        )))
    }
}
