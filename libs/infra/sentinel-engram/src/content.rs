use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngramError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Success,
    Partial,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum RecordEntry {
    Decision {
        description: String,
        alternatives: Vec<String>,
        chosen: String,
        rationale: String,
        recorded_at: DateTime<Utc>,
    },
    Action {
        action_kind: String,
        target: String,
        outcome: String,
        counts: serde_json::Value,
        recorded_at: DateTime<Utc>,
    },
    DeadEnd {
        description: String,
        evidence: String,
        recorded_at: DateTime<Utc>,
    },
}

/// Exactly what gets canonically serialized and hashed. Every field that
/// participates in the content address must be here — nothing in
/// `SessionHandle` is hashed that isn't also reproduced by reopening and
/// reserializing this struct, or `verify()` (P5) would be unable to
/// recompute a matching hash from the stored bytes alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDocument {
    pub session_id: String,
    pub tenant_id: String,
    pub agent_id: String,
    pub intent: String,
    pub context: serde_json::Value,
    pub opened_at: DateTime<Utc>,
    pub records: Vec<RecordEntry>,
    pub outcome: SessionOutcome,
    pub summary: String,
    pub closed_at: DateTime<Utc>,
}

/// Bit-exact canonical form: serialize through `serde_json::Value` so
/// object keys land in a `BTreeMap` (alphabetical, not declaration order),
/// then emit compact (no extraneous whitespace) bytes with no trailing
/// newline. Anyone recomputing this from the same document gets the same
/// bytes, which is the whole point — the hash is only as trustworthy as
/// this function is deterministic.
pub fn canonical_bytes(doc: &SessionDocument) -> Result<Vec<u8>, EngramError> {
    let value = serde_json::to_value(doc)
        .map_err(|e| EngramError::SerializeFault(e.to_string()))?;
    serde_json::to_vec(&value).map_err(|e| EngramError::SerializeFault(e.to_string()))
}

/// BLAKE3 hash of the canonical bytes, hex-encoded. This is the session's
/// content address (I7) and object-store key.
pub fn content_address(doc: &SessionDocument) -> Result<String, EngramError> {
    let bytes = canonical_bytes(doc)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_doc() -> SessionDocument {
        SessionDocument {
            session_id: "s1".into(),
            tenant_id: "t1".into(),
            agent_id: "aws-connector".into(),
            intent: "discover".into(),
            context: serde_json::json!({"region": "us-east-1"}),
            opened_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            records: vec![RecordEntry::DeadEnd {
                description: "no mapping".into(),
                evidence: "nginx 1.18.0".into(),
                recorded_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 1, 0).unwrap(),
            }],
            outcome: SessionOutcome::Partial,
            summary: "partial run".into(),
            closed_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 2, 0).unwrap(),
        }
    }

    #[test]
    fn content_address_is_deterministic() {
        let a = content_address(&sample_doc()).unwrap();
        let b = content_address(&sample_doc()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn content_address_changes_with_any_field() {
        let mut mutated = sample_doc();
        mutated.summary = "different summary".into();
        assert_ne!(
            content_address(&sample_doc()).unwrap(),
            content_address(&mutated).unwrap()
        );
    }

    #[test]
    fn recomputed_hash_matches_recorded_address() {
        let doc = sample_doc();
        let recorded = content_address(&doc).unwrap();
        let bytes = canonical_bytes(&doc).unwrap();
        let recomputed = blake3::hash(&bytes).to_hex().to_string();
        assert_eq!(recorded, recomputed);
    }
}
