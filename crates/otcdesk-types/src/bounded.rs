//! Fixed-capacity identity sets.
//!
//! Approver sets, per-offer approvals and consignment allow-lists are kept
//! small and bounded so every persisted record has a predictable size.

use serde::{Deserialize, Serialize};

use crate::{Identity, constants};

/// Explicit approvers of a desk, and per-offer approvals collected so far.
pub type ApproverSet = IdentitySet<{ constants::MAX_APPROVERS }>;

/// Buyers permitted on a private consignment.
pub type AllowList = IdentitySet<{ constants::MAX_ALLOWLIST }>;

/// Returned when inserting into a full [`IdentitySet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetFull {
    pub capacity: usize,
}

/// An insertion-ordered set of at most `N` distinct identities.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IdentitySet<const N: usize> {
    members: Vec<Identity>,
}

impl<const N: usize> IdentitySet<N> {
    pub const CAPACITY: usize = N;

    #[must_use]
    pub fn new() -> Self {
        Self {
            members: Vec::new(),
        }
    }

    /// Build from a slice, rejecting duplicates silently and overflow loudly.
    ///
    /// # Errors
    /// Returns [`SetFull`] if more than `N` distinct identities are given.
    pub fn from_slice(ids: &[Identity]) -> Result<Self, SetFull> {
        let mut set = Self::new();
        for id in ids {
            set.insert(*id)?;
        }
        Ok(set)
    }

    #[must_use]
    pub fn contains(&self, id: &Identity) -> bool {
        self.members.contains(id)
    }

    /// Insert `id`. Returns `Ok(false)` if it was already present.
    ///
    /// # Errors
    /// Returns [`SetFull`] if the set is at capacity.
    pub fn insert(&mut self, id: Identity) -> Result<bool, SetFull> {
        if self.contains(&id) {
            return Ok(false);
        }
        if self.members.len() >= N {
            return Err(SetFull { capacity: N });
        }
        self.members.push(id);
        Ok(true)
    }

    /// Remove `id`. Returns `true` if it was present.
    pub fn remove(&mut self, id: &Identity) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m != id);
        self.members.len() != before
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.members.iter()
    }
}
