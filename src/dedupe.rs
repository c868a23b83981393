use chrono::NaiveDate;
use sha2::{Digest, Sha256};

use crate::models::Direction;

const HASH_HEX_LEN: usize = 32;

/// Content fingerprint used as the per-user uniqueness key for transactions.
///
/// Canonical input is `YYYY-MM-DD|lowercased trimmed description|paise|DIRECTION`.
pub fn dedupe_hash(
    date: NaiveDate,
    description: &str,
    amount_paise: i64,
    direction: Direction,
) -> String {
    let input = format!(
        "{}|{}|{}|{}",
        date.format("%Y-%m-%d"),
        description.trim().to_lowercase(),
        amount_paise,
        direction.as_str()
    );
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(HASH_HEX_LEN);
    digest
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 12, 15).unwrap()
    }

    #[test]
    fn test_hash_is_deterministic() {
        let a = dedupe_hash(date(), "UPI-SWIGGY-123456", 45000, Direction::Outflow);
        let b = dedupe_hash(date(), "UPI-SWIGGY-123456", 45000, Direction::Outflow);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_ignores_case_and_outer_whitespace() {
        let a = dedupe_hash(date(), "  Salary December ", 5_000_000, Direction::Inflow);
        let b = dedupe_hash(date(), "SALARY DECEMBER", 5_000_000, Direction::Inflow);
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_matches_sha256_prefix_of_canonical_string() {
        let mut hasher = Sha256::new();
        hasher.update(b"2024-12-15|upi-swiggy-123456|45000|OUTFLOW");
        let expected = hex::encode(hasher.finalize());
        assert_eq!(
            dedupe_hash(date(), "UPI-SWIGGY-123456", 45000, Direction::Outflow),
            expected[..32]
        );
    }

    #[test]
    fn test_each_field_changes_the_hash() {
        let base = dedupe_hash(date(), "RENT", 100, Direction::Outflow);
        let next_day = NaiveDate::from_ymd_opt(2024, 12, 16).unwrap();
        assert_ne!(base, dedupe_hash(next_day, "RENT", 100, Direction::Outflow));
        assert_ne!(base, dedupe_hash(date(), "RENT2", 100, Direction::Outflow));
        assert_ne!(base, dedupe_hash(date(), "RENT", 101, Direction::Outflow));
        assert_ne!(base, dedupe_hash(date(), "RENT", 100, Direction::Inflow));
    }
}
