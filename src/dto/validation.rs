//! Validation helpers for DTOs.

use validator::ValidationError;

const MIN_IDENTIFIER_LEN: usize = 3;
const MAX_IDENTIFIER_LEN: usize = 128;

/// Validates a player or session identifier: 3 to 128 characters of `[A-Za-z0-9_.:-]`.
///
/// # Examples
///
/// ```ignore
/// validate_identifier("0xAbC123") // Ok
/// validate_identifier("ab")       // Err - too short
/// validate_identifier("a b c")    // Err - space
/// ```
pub fn validate_identifier(id: &str) -> Result<(), ValidationError> {
    let len = id.chars().count();
    if !(MIN_IDENTIFIER_LEN..=MAX_IDENTIFIER_LEN).contains(&len) {
        let mut err = ValidationError::new("identifier_length");
        err.message = Some(
            format!(
                "Identifier must be between {MIN_IDENTIFIER_LEN} and {MAX_IDENTIFIER_LEN} characters (got {len})"
            )
            .into(),
        );
        return Err(err);
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-'))
    {
        let mut err = ValidationError::new("identifier_format");
        err.message =
            Some("Identifier may only contain letters, digits, '_', '.', ':' and '-'".into());
        return Err(err);
    }

    Ok(())
}

/// Canonical form of a player identifier. Hex wallet addresses and nullifier hashes are
/// case-insensitive, so `0x`-prefixed identifiers are lower-cased.
pub fn normalize_identifier(id: &str) -> String {
    let trimmed = id.trim();
    if trimmed
        .get(..2)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("0x"))
    {
        trimmed.to_ascii_lowercase()
    } else {
        trimmed.to_owned()
    }
}
