//! Hash-chained event journal.
//!
//! Every committed event is appended as a [`JournalEntry`] whose hash covers
//! the previous entry's hash, its sequence number and the serialized
//! envelope:
//!
//! ```text
//! hash[n] = SHA-256( hash[n-1] || seq[n] (BE u64) || json(envelope[n]) )
//! hash[-1] = [0; 32]
//! ```
//!
//! An indexer drains entries to mirror desk state. Draining keeps the chain
//! head, so later entries still link to what was already handed out.

use otcdesk_types::{EventEnvelope, OtcError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

/// One journaled event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub seq: u64,
    pub envelope: EventEnvelope,
    pub prev_hash: [u8; 32],
    pub hash: [u8; 32],
}

impl JournalEntry {
    #[must_use]
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

/// Append-only event log.
#[derive(Debug, Clone, Default)]
pub struct EventJournal {
    entries: Vec<JournalEntry>,
    next_seq: u64,
    head: [u8; 32],
}

impl EventJournal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `envelope` and return the new entry.
    ///
    /// # Errors
    /// [`OtcError::Serialization`] if the envelope cannot be encoded.
    pub fn append(&mut self, envelope: EventEnvelope) -> Result<&JournalEntry> {
        let sealed = self.seal(vec![envelope])?;
        self.extend(sealed);
        self.entries
            .last()
            .ok_or_else(|| OtcError::Internal("journal append lost its entry".into()))
    }

    /// Chain `envelopes` onto the current head without appending them.
    ///
    /// # Errors
    /// [`OtcError::Serialization`] if an envelope cannot be encoded.
    pub fn seal(&self, envelopes: Vec<EventEnvelope>) -> Result<Vec<JournalEntry>> {
        let mut seq = self.next_seq;
        let mut prev_hash = self.head;
        let mut sealed = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            let hash = entry_hash(&prev_hash, seq, &envelope)?;
            sealed.push(JournalEntry {
                seq,
                envelope,
                prev_hash,
                hash,
            });
            prev_hash = hash;
            seq += 1;
        }
        Ok(sealed)
    }

    /// Append entries produced by [`Self::seal`] against the current head.
    pub fn extend(&mut self, sealed: Vec<JournalEntry>) {
        for entry in sealed {
            debug!(
                seq = entry.seq,
                desk = %entry.envelope.desk,
                kind = entry.envelope.event.kind(),
                hash = %hex::encode(&entry.hash[..8]),
                "Journal append"
            );
            self.next_seq = entry.seq + 1;
            self.head = entry.hash;
            self.entries.push(entry);
        }
    }

    /// Hash of the latest entry ever appended.
    #[must_use]
    pub fn head(&self) -> [u8; 32] {
        self.head
    }

    #[must_use]
    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hand all retained entries to the caller.
    pub fn drain(&mut self) -> Vec<JournalEntry> {
        std::mem::take(&mut self.entries)
    }

    /// Recompute the chain over the retained entries.
    ///
    /// # Errors
    /// [`OtcError::Internal`] at the first entry that does not link or hash
    /// correctly.
    pub fn verify(&self) -> Result<()> {
        let mut expected_prev = self.entries.first().map(|e| e.prev_hash);
        for entry in &self.entries {
            if Some(entry.prev_hash) != expected_prev {
                return Err(OtcError::Internal(format!("journal entry {} breaks the chain", entry.seq)));
            }
            if entry_hash(&entry.prev_hash, entry.seq, &entry.envelope)? != entry.hash {
                return Err(OtcError::Internal(format!("journal entry {} hash mismatch", entry.seq)));
            }
            expected_prev = Some(entry.hash);
        }
        Ok(())
    }
}

fn entry_hash(prev: &[u8; 32], seq: u64, envelope: &EventEnvelope) -> Result<[u8; 32]> {
    let body = serde_json::to_vec(envelope)?;
    let mut hasher = Sha256::new();
    hasher.update(prev);
    hasher.update(seq.to_be_bytes());
    hasher.update(&body);
    Ok(hasher.finalize().into())
}
