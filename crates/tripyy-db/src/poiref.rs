//! POIRef canonicalisation and healing.
//!
//! A post's `connected_poi` column may hold, from oldest to newest:
//!   1. a JSON object with an `id` (canonical),
//!   2. a JSON object missing its `id` (pre-id rows),
//!   3. a JSON *string* containing a serialized object (a past bug in the
//!      persistence layer double-encoded the column).
//!
//! Reads heal cases 2 and 3 on the fly without touching the store; the
//! one-shot `repair_poi_strings` job rewrites the rows for good. The
//! create/update path always canonicalises, so no new legacy rows can
//! appear.

use serde_json::Value;

use crate::ids;

/// Guarantee `value` (an object) carries a non-empty string id,
/// synthesising `<prefix>_<millis>_<rand>` when missing. Returns true
/// when an id had to be synthesised.
pub fn ensure_id(value: &mut Value, prefix: &str) -> bool {
    let Some(obj) = value.as_object_mut() else {
        return false;
    };
    let has_id = obj
        .get("id")
        .and_then(|id| id.as_str())
        .is_some_and(|id| !id.is_empty());
    if has_id {
        return false;
    }
    obj.insert("id".to_string(), Value::String(ids::synthetic(prefix)));
    true
}

/// Heal a stored `connected_poi` column value for a read. Never mutates
/// the store; idempotent for already-canonical values.
///
/// Returns `None` when the text is unparseable garbage.
pub fn heal_stored(column_text: &str) -> Option<Value> {
    let parsed: Value = serde_json::from_str(column_text).ok()?;
    match parsed {
        // Double-encoded row: the column held a quoted JSON string.
        Value::String(inner) => {
            let mut value: Value = serde_json::from_str(&inner).ok()?;
            if !value.is_object() {
                return None;
            }
            ensure_id(&mut value, "poi_fallback");
            Some(value)
        }
        Value::Object(_) => {
            let mut value = parsed;
            ensure_id(&mut value, "poi_fallback");
            Some(value)
        }
        _ => None,
    }
}

/// Repair form of the healer used by the one-shot job: same parsing, but
/// synthesised ids use the `poi_fix` prefix so repaired rows are
/// distinguishable from read-time fallbacks.
pub fn repair_stored(column_text: &str) -> Option<Value> {
    let parsed: Value = serde_json::from_str(column_text).ok()?;
    let Value::String(inner) = parsed else {
        // Already object form; nothing to repair.
        return None;
    };
    let mut value: Value = serde_json::from_str(&inner).ok()?;
    if !value.is_object() {
        return None;
    }
    ensure_id(&mut value, "poi_fix");
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_object_passes_through_unchanged() {
        let stored = r#"{"id":"poi_1","name":"Cafe"}"#;
        let healed = heal_stored(stored).unwrap();
        assert_eq!(healed, json!({"id":"poi_1","name":"Cafe"}));
    }

    #[test]
    fn object_without_id_gets_fallback_id() {
        let stored = r#"{"name":"Cafe","description":"x"}"#;
        let healed = heal_stored(stored).unwrap();
        assert!(healed["id"].as_str().unwrap().starts_with("poi_fallback_"));
        assert_eq!(healed["name"], "Cafe");
        assert_eq!(healed["description"], "x");
    }

    #[test]
    fn double_encoded_string_is_parsed_and_healed() {
        let stored = serde_json::to_string(r#"{"name":"Cafe","description":"x"}"#).unwrap();
        let healed = heal_stored(&stored).unwrap();
        assert!(healed["id"].as_str().unwrap().starts_with("poi_fallback_"));
        assert_eq!(healed["name"], "Cafe");
    }

    #[test]
    fn garbage_heals_to_none() {
        assert!(heal_stored("not json").is_none());
        assert!(heal_stored("42").is_none());
        assert!(heal_stored("\"not an object\"").is_none());
    }

    #[test]
    fn repair_only_touches_string_rows() {
        assert!(repair_stored(r#"{"id":"poi_1","name":"Cafe"}"#).is_none());

        let stored = serde_json::to_string(r#"{"name":"Cafe"}"#).unwrap();
        let repaired = repair_stored(&stored).unwrap();
        assert!(repaired["id"].as_str().unwrap().starts_with("poi_fix_"));
    }

    #[test]
    fn repair_preserves_existing_id_inside_string() {
        let stored = serde_json::to_string(r#"{"id":"poi_9","name":"Cafe"}"#).unwrap();
        let repaired = repair_stored(&stored).unwrap();
        assert_eq!(repaired["id"], "poi_9");
    }

    #[test]
    fn ensure_id_is_idempotent() {
        let mut value = json!({"name":"Cafe"});
        assert!(ensure_id(&mut value, "poi"));
        let first = value["id"].clone();
        assert!(!ensure_id(&mut value, "poi"));
        assert_eq!(value["id"], first);
    }
}
