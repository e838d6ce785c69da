//! Identifiers used throughout the desk engine.
//!
//! Desks use UUIDv7 so they sort by creation time. Consignments and offers
//! are numbered sequentially per desk, starting at 1. Participants are
//! identified by their raw ed25519 public key.

use std::fmt;

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{OtcError, Result};

// ---------------------------------------------------------------------------
// DeskId
// ---------------------------------------------------------------------------

/// Globally unique desk identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct DeskId(pub Uuid);

impl DeskId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for DeskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A participant: owner, agent, approver, consigner, buyer or payer.
/// This is the raw ed25519 public key (32 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Identity(pub [u8; 32]);

impl Identity {
    /// The all-zero key. Never a valid owner or agent.
    pub const ZERO: Self = Self([0u8; 32]);

    #[must_use]
    pub fn from_pubkey(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        Self(key.to_bytes())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse a full 64-character hex key.
    ///
    /// # Errors
    /// Returns [`OtcError::Configuration`] on malformed input.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| OtcError::Configuration(format!("identity: {e}")))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| OtcError::Configuration("identity: expected 32 bytes".into()))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "id:{}", hex::encode(&self.0[..8]))
    }
}

// ---------------------------------------------------------------------------
// AssetId
// ---------------------------------------------------------------------------

/// A tradeable asset (the token mint or contract symbol).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AssetId(pub String);

impl AssetId {
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// FeedId
// ---------------------------------------------------------------------------

/// Reference to an external price feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct FeedId(pub [u8; 32]);

impl FeedId {
    /// Parse a feed id from hex, with or without a `0x` prefix.
    ///
    /// # Errors
    /// Returns [`OtcError::Configuration`] on malformed input.
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| OtcError::Configuration(format!("feed id: {e}")))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| OtcError::Configuration("feed id: expected 32 bytes".into()))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

// ---------------------------------------------------------------------------
// ConsignmentId / OfferId
// ---------------------------------------------------------------------------

/// Sequential consignment number within a desk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ConsignmentId(pub u64);

impl fmt::Display for ConsignmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "consignment#{}", self.0)
    }
}

/// Sequential offer number within a desk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct OfferId(pub u64);

impl fmt::Display for OfferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "offer#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

#[cfg(any(test, feature = "test-helpers"))]
impl Identity {
    /// A fresh identity backed by a random ed25519 key.
    #[must_use]
    pub fn random() -> Self {
        let key = ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng);
        Self::from_verifying_key(&key.verifying_key())
    }
}
