//! Audit trail domain types.
//!
//! Every agent action is wrapped in an entry that commits to its position in
//! the interaction's trail and to the entry before it, so any edit, deletion
//! or reordering of stored actions is detectable.
//!
//! Hash input layout (bytes, in order):
//!   1. interaction id as hyphenated UTF-8
//!   2. sequence as 8-byte little-endian
//!   3. prev_hash as UTF-8 (64 hex chars)
//!   4. compact JSON of the action

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use uuid::Uuid;

use super::AgentAction;
use crate::error::GovernanceResult;

/// `prev_hash` of the first entry in every trail.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// One link in an interaction's audit chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AuditEntry {
    pub interaction_id: Uuid,
    /// Zero-based position in the interaction's trail.
    pub sequence: i64,
    pub action: AgentAction,
    pub prev_hash: String,
    pub hash: String,
}

impl AuditEntry {
    /// Build the entry that follows `head` (or starts the trail).
    pub fn next(
        interaction_id: Uuid,
        head: Option<&AuditEntry>,
        action: AgentAction,
    ) -> GovernanceResult<Self> {
        let (sequence, prev_hash) = match head {
            Some(h) => (h.sequence + 1, h.hash.clone()),
            None => (0, GENESIS_HASH.to_string()),
        };
        let hash = hash_entry(interaction_id, sequence, &action, &prev_hash)?;

        Ok(Self {
            interaction_id,
            sequence,
            action,
            prev_hash,
            hash,
        })
    }
}

/// SHA-256 over the entry fields, lowercase hex.
pub fn hash_entry(
    interaction_id: Uuid,
    sequence: i64,
    action: &AgentAction,
    prev_hash: &str,
) -> GovernanceResult<String> {
    let action_json = serde_json::to_vec(action)?;

    let mut hasher = Sha256::new();
    hasher.update(interaction_id.hyphenated().to_string().as_bytes());
    hasher.update(sequence.to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(&action_json);

    Ok(hex::encode(hasher.finalize()))
}

/// Result of checking a stored trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TrailVerification {
    pub valid: bool,
    pub entries: usize,
    /// Sequence of the first entry that failed a check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_invalid: Option<i64>,
}

/// Recompute the chain.
///
/// Checks, per entry: contiguous sequence, `prev_hash` linkage and the
/// stored hash. An empty trail is valid.
pub fn verify_trail(entries: &[AuditEntry]) -> TrailVerification {
    let mut expected_prev = GENESIS_HASH.to_string();

    for (position, entry) in entries.iter().enumerate() {
        let linked = entry.sequence == position as i64 && entry.prev_hash == expected_prev;
        let intact = hash_entry(entry.interaction_id, entry.sequence, &entry.action, &entry.prev_hash)
            .map(|h| h == entry.hash)
            .unwrap_or(false);

        if !linked || !intact {
            return TrailVerification {
                valid: false,
                entries: entries.len(),
                first_invalid: Some(entry.sequence),
            };
        }
        expected_prev = entry.hash.clone();
    }

    TrailVerification {
        valid: true,
        entries: entries.len(),
        first_invalid: None,
    }
}
