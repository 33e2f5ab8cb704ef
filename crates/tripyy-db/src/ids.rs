//! Id minting helpers.
//!
//! Entity rows get UUIDs. Synthetic POI ids and comment ids follow the
//! legacy `<prefix>_<millis>_<rand>` format that older clients already
//! parse, so those stay string-built.

use chrono::Utc;
use rand::Rng;
use rand::distr::Alphanumeric;
use uuid::Uuid;

pub fn entity_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn rand_suffix(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

/// `<prefix>_<millis>_<rand>` synthetic id, e.g. `poi_1756387200000_x4k9s2a1b`.
pub fn synthetic(prefix: &str) -> String {
    format!("{}_{}_{}", prefix, Utc::now().timestamp_millis(), rand_suffix(9))
}

/// Comment ids are `<millis><rand>` with no separator.
pub fn comment_id() -> String {
    format!("{}{}", Utc::now().timestamp_millis(), rand_suffix(6))
}

/// 6-digit numeric verification code.
pub fn verification_code() -> String {
    format!("{}", rand::rng().random_range(100_000..1_000_000))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_id_shape() {
        let id = synthetic("poi_fallback");
        assert!(id.starts_with("poi_fallback_"));
        let tail = id.trim_start_matches("poi_fallback_");
        let (millis, rand) = tail.split_once('_').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(rand.len(), 9);
    }

    #[test]
    fn code_is_six_digits() {
        for _ in 0..50 {
            let code = verification_code();
            assert_eq!(code.len(), 6);
            assert!(code.parse::<u32>().is_ok());
            assert!(!code.starts_with('0'));
        }
    }
}
