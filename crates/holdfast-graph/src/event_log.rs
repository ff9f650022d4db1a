//! Append-only log of node construction and destruction.
//!
//! Every entry is hash-linked to its predecessor, so two runs of the same
//! scenario can be compared by digest alone, and a log that went through
//! serialization can be checked for tampering or truncation.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::node::NodeId;

// ---------------------------------------------------------------------------
// EventKind — what happened to a node
// ---------------------------------------------------------------------------

/// Lifecycle event recorded for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The node was created and entered the live set.
    Constructed,
    /// The node's payload was dropped and the node left the live set.
    Destroyed,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Constructed => "constructed",
            Self::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// LogDigest — chain digest over log entries
// ---------------------------------------------------------------------------

/// SHA-256 digest identifying a log prefix.
///
/// The digest of an empty log is all zeros (genesis).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogDigest(pub [u8; 32]);

impl LogDigest {
    /// Genesis digest: no entries yet.
    pub const GENESIS: LogDigest = LogDigest([0u8; 32]);

    /// Compute a digest over the given bytes.
    pub fn compute(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Access the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex representation.
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for byte in &self.0 {
            s.push_str(&format!("{byte:02x}"));
        }
        s
    }
}

impl fmt::Display for LogDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "log:{}", self.to_hex())
    }
}

// ---------------------------------------------------------------------------
// LogEntry — one recorded lifecycle event
// ---------------------------------------------------------------------------

/// One entry in the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Position in the log; strictly increasing from zero, no gaps.
    pub sequence: u64,
    pub node_id: NodeId,
    pub event: EventKind,
    /// Tag supplied at node creation, if any.
    pub payload_tag: Option<String>,
    /// Digest of the preceding entry (genesis for the first entry).
    pub prev_digest: LogDigest,
    /// Digest over this entry's fields and the previous digest.
    pub entry_digest: LogDigest,
}

// ---------------------------------------------------------------------------
// ChainIntegrityError — log verification failures
// ---------------------------------------------------------------------------

/// Error from verifying a log's hash chain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainIntegrityError {
    /// An entry's sequence number does not match its position.
    #[error("entry at index {index} has sequence {sequence}, expected {index}")]
    SequenceGap { index: u64, sequence: u64 },
    /// An entry's previous-digest link does not match its predecessor.
    #[error("entry {sequence}: chain link broken")]
    LinkBroken { sequence: u64 },
    /// An entry's stored digest does not match its recomputed digest.
    #[error("entry {sequence}: digest mismatch")]
    DigestMismatch { sequence: u64 },
}

// ---------------------------------------------------------------------------
// EventLog — the append-only stream
// ---------------------------------------------------------------------------

/// Append-only, hash-linked record of construction and destruction events.
///
/// Entries can only be appended, never modified or removed. The graph is the
/// single writer; hosts read entries, compare digests, and verify integrity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    entries: Vec<LogEntry>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in append order.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Digest over the whole log (genesis if empty).
    pub fn digest(&self) -> LogDigest {
        self.entries
            .last()
            .map(|e| e.entry_digest)
            .unwrap_or(LogDigest::GENESIS)
    }

    /// Sequence number of the first entry matching node and kind.
    pub fn sequence_of(&self, node_id: NodeId, event: EventKind) -> Option<u64> {
        self.entries
            .iter()
            .find(|e| e.node_id == node_id && e.event == event)
            .map(|e| e.sequence)
    }

    /// Append a new entry, linking it to the current chain head.
    pub(crate) fn append(
        &mut self,
        node_id: NodeId,
        event: EventKind,
        payload_tag: Option<String>,
    ) {
        let sequence = self.entries.len() as u64;
        let prev_digest = self.digest();
        let entry_digest =
            compute_entry_digest(sequence, node_id, event, payload_tag.as_deref(), prev_digest);
        self.entries.push(LogEntry {
            sequence,
            node_id,
            event,
            payload_tag,
            prev_digest,
            entry_digest,
        });
    }

    /// Verify the hash chain over all entries.
    ///
    /// An empty log is trivially valid. Detects reordered, mutated, and
    /// removed entries; cannot detect truncation of a suffix a reader never
    /// saw (compare digests for that).
    pub fn verify_chain(&self) -> Result<(), ChainIntegrityError> {
        let mut prev = LogDigest::GENESIS;
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.sequence != index as u64 {
                return Err(ChainIntegrityError::SequenceGap {
                    index: index as u64,
                    sequence: entry.sequence,
                });
            }
            if entry.prev_digest != prev {
                return Err(ChainIntegrityError::LinkBroken {
                    sequence: entry.sequence,
                });
            }
            let computed = compute_entry_digest(
                entry.sequence,
                entry.node_id,
                entry.event,
                entry.payload_tag.as_deref(),
                entry.prev_digest,
            );
            if entry.entry_digest != computed {
                return Err(ChainIntegrityError::DigestMismatch {
                    sequence: entry.sequence,
                });
            }
            prev = entry.entry_digest;
        }
        Ok(())
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Digest computation
// ---------------------------------------------------------------------------

/// Length-prefixed preimage over the entry fields, chained through the
/// previous digest.
fn compute_entry_digest(
    sequence: u64,
    node_id: NodeId,
    event: EventKind,
    payload_tag: Option<&str>,
    prev_digest: LogDigest,
) -> LogDigest {
    let mut preimage = Vec::new();

    preimage.extend_from_slice(&sequence.to_be_bytes());
    preimage.extend_from_slice(prev_digest.as_bytes());
    preimage.extend_from_slice(&node_id.as_u64().to_be_bytes());

    let kind = event.to_string();
    preimage.extend_from_slice(&(kind.len() as u32).to_be_bytes());
    preimage.extend_from_slice(kind.as_bytes());

    match payload_tag {
        Some(tag) => {
            preimage.push(1);
            preimage.extend_from_slice(&(tag.len() as u32).to_be_bytes());
            preimage.extend_from_slice(tag.as_bytes());
        }
        None => preimage.push(0),
    }

    LogDigest::compute(&preimage)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
