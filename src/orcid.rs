//! ORCID iD validation utilities
//! -----------------------------
//! Single source of truth for identifier well-formedness. An ORCID iD is
//! four groups of four digits separated by hyphens; the final character is
//! either a digit or the letter `X` (check value 10 under ISO 7064 MOD 11-2).
//!
//! Both checks must pass before an identifier submitted through the admin or
//! ban forms is acted upon.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{AppError, AppResult};

static ORCID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{4}-\d{4}-\d{3}[\dX]$").unwrap());

/// Structural check only: four groups of four, last character digit or `X`.
pub fn is_well_formed(id: &str) -> bool {
    ORCID_RE.is_match(id)
}

/// ISO 7064 MOD 11-2 check over all characters except the last, skipping
/// hyphens. The computed check value 10 is written as `X`.
pub fn checksum(id: &str) -> bool {
    if id.is_empty() {
        return false;
    }
    let chars: Vec<char> = id.chars().collect();
    let (body, last) = chars.split_at(chars.len() - 1);
    let mut total: u32 = 0;
    for c in body {
        if *c == '-' {
            continue;
        }
        let Some(d) = c.to_digit(10) else { return false };
        total = 2 * (total + d);
    }
    let result = (12 - total % 11) % 11;
    match last[0] {
        'X' => result == 10,
        c => c.to_digit(10).map(|d| d == result).unwrap_or(false),
    }
}

/// Full validation as required by the admin/ban form paths: structural regex
/// and checksum must both pass.
pub fn validate(id: &str) -> AppResult<()> {
    if !is_well_formed(id) || !checksum(id) {
        return Err(AppError::invalid_identifier(format!(
            "'{}' is not a valid ORCID iD",
            id
        )));
    }
    Ok(())
}

/// Public profile URL for an identifier, e.g. `https://orcid.org/0000-...`.
pub fn profile_url(base: &str, id: &str) -> String {
    format!("{}{}", base, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_accepts_known_valid_ids() {
        assert!(checksum("0000-0002-1825-0097"));
        assert!(checksum("0000-0001-5109-3700"));
        // Check value 10 maps to a trailing X
        assert!(checksum("0000-0002-1234-560X"));
    }

    #[test]
    fn checksum_rejects_one_character_off() {
        assert!(checksum("0000-0002-1825-0097"));
        assert!(!checksum("0000-0002-1825-0098"));
        assert!(!checksum("0000-0002-1825-0096"));
    }

    #[test]
    fn checksum_is_a_pure_function() {
        // Same input, same answer, any number of calls.
        let id = "0000-0002-1825-0097";
        let first = checksum(id);
        for _ in 0..10 {
            assert_eq!(checksum(id), first);
        }
    }

    #[test]
    fn checksum_rejects_garbage() {
        assert!(!checksum(""));
        assert!(!checksum("X"));
        assert!(!checksum("not-an-id"));
        assert!(!checksum("0000-0002-1825-009Y"));
    }

    #[test]
    fn structural_check() {
        assert!(is_well_formed("0000-0002-1825-0097"));
        assert!(is_well_formed("0000-0002-1234-560X"));
        assert!(!is_well_formed("0000-0002-1825-009"));
        assert!(!is_well_formed("0000000218250097"));
        assert!(!is_well_formed("0000-0002-1825-00977"));
        assert!(!is_well_formed("0000-0002-1825-009x")); // lowercase x not allowed
    }

    #[test]
    fn validate_requires_both_checks() {
        assert!(validate("0000-0002-1825-0097").is_ok());
        // Well-formed but checksum fails
        let err = validate("0000-0002-1825-0098").unwrap_err();
        assert_eq!(err.code_str(), "invalid_identifier");
        // Checksum would pass but structure fails
        assert!(validate("0000-0002-1825-0097 ").is_err());
    }

    #[test]
    fn profile_url_joins_base_and_id() {
        assert_eq!(
            profile_url("https://orcid.org/", "0000-0002-1825-0097"),
            "https://orcid.org/0000-0002-1825-0097"
        );
    }
}
