//! Per-(desk, asset) escrow counters.

use serde::{Deserialize, Serialize};

use crate::{AssetId, DeskId, OtcError, Result};

/// Inventory the desk holds for one asset.
///
/// ```text
///   deposited = consigned + reserved + free
///   reserved + consigned <= deposited
/// ```
///
/// Counters change only through `otcdesk_inventory::EscrowAccounting`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowPosition {
    pub desk: DeskId,
    pub asset: AssetId,
    /// Everything held in desk escrow for this asset.
    pub deposited: u64,
    /// Backing live offers (created, approved or paid-but-unclaimed).
    pub reserved: u64,
    /// Sitting in active consignments, not yet reserved.
    pub consigned: u64,
}

impl EscrowPosition {
    #[must_use]
    pub fn empty(desk: DeskId, asset: AssetId) -> Self {
        Self {
            desk,
            asset,
            deposited: 0,
            reserved: 0,
            consigned: 0,
        }
    }

    /// Desk-owned inventory: neither consigned nor reserved.
    #[must_use]
    pub fn free(&self) -> u64 {
        self.deposited
            .saturating_sub(self.reserved)
            .saturating_sub(self.consigned)
    }

    /// # Errors
    /// [`OtcError::EscrowInvariant`] if `reserved + consigned > deposited`.
    pub fn check(&self) -> Result<()> {
        let committed = self.reserved.checked_add(self.consigned);
        match committed {
            Some(c) if c <= self.deposited => Ok(()),
            _ => Err(OtcError::EscrowInvariant {
                reason: format!(
                    "{}/{}: reserved {} + consigned {} > deposited {}",
                    self.desk, self.asset, self.reserved, self.consigned, self.deposited
                ),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_and_check() {
        let mut p = EscrowPosition::empty(DeskId::new(), AssetId::new("T"));
        p.deposited = 100;
        p.consigned = 60;
        p.reserved = 30;
        assert_eq!(p.free(), 10);
        assert!(p.check().is_ok());

        p.reserved = 41;
        assert_eq!(p.free(), 0);
        assert!(matches!(p.check(), Err(OtcError::EscrowInvariant { .. })));
    }
}
