//! Escrow conservation checker.
//!
//! Invariants over one desk's committed state:
//! ```text
//! ∀ asset: reserved + consigned <= deposited <= treasury balance
//! ∀ asset: reserved  == Σ token_amount of offers still holding inventory
//! ∀ asset: consigned == Σ remaining of active consignments
//! ∀ active consignment: remaining == total − Σ token_amount of its
//!                                    offers neither cancelled nor refunded
//! ```
//!
//! A violation means an operation moved tokens without its bookkeeping, or
//! the other way round.

use std::collections::HashMap;

use otcdesk_types::{AssetId, DeskId, OtcError, Result};
use tracing::{debug, error};

use crate::ledger::{Account, LedgerAsset, LedgerView};

/// Read-only audit over any [`LedgerView`].
pub struct EscrowAudit<'a, L: LedgerView + ?Sized> {
    ledger: &'a L,
}

impl<'a, L: LedgerView + ?Sized> EscrowAudit<'a, L> {
    #[must_use]
    pub fn new(ledger: &'a L) -> Self {
        Self { ledger }
    }

    /// Check every escrow invariant for `desk`.
    ///
    /// # Errors
    /// [`OtcError::EscrowInvariant`] describing the first violation found,
    /// [`OtcError::Overflow`] if a sum leaves range.
    pub fn verify_desk(&self, desk: DeskId) -> Result<()> {
        let result = self.check(desk);
        if let Err(err) = &result {
            error!(%desk, error = %err, "Escrow audit failed");
        }
        result
    }

    fn check(&self, desk: DeskId) -> Result<()> {
        let offers = self.ledger.offers(desk);
        let consignments = self.ledger.consignments(desk);

        let mut reserved: HashMap<AssetId, u64> = HashMap::new();
        for offer in offers.iter().filter(|o| o.holds_reservation()) {
            add(&mut reserved, &offer.asset, offer.token_amount)?;
        }

        let mut consigned: HashMap<AssetId, u64> = HashMap::new();
        for c in consignments.iter().filter(|c| c.is_active) {
            add(&mut consigned, &c.asset, c.remaining_amount)?;

            let mut committed = 0u64;
            for offer in offers
                .iter()
                .filter(|o| o.consignment() == Some(c.id) && !o.cancelled && !o.refunded)
            {
                committed = committed.checked_add(offer.token_amount).ok_or(OtcError::Overflow)?;
            }
            if c.total_amount.checked_sub(committed) != Some(c.remaining_amount) {
                return Err(violation(format!(
                    "{}: remaining {} but total {} less live offers {committed}",
                    c.id, c.remaining_amount, c.total_amount
                )));
            }
        }

        for position in self.ledger.escrow_positions(desk) {
            position.check()?;
            let asset = &position.asset;
            let expected_reserved = reserved.remove(asset).unwrap_or(0);
            if position.reserved != expected_reserved {
                return Err(violation(format!(
                    "{asset}: reserved {} but live offers hold {expected_reserved}",
                    position.reserved
                )));
            }
            let expected_consigned = consigned.remove(asset).unwrap_or(0);
            if position.consigned != expected_consigned {
                return Err(violation(format!(
                    "{asset}: consigned {} but active listings hold {expected_consigned}",
                    position.consigned
                )));
            }
            let held = self
                .ledger
                .balance(&Account::Treasury(desk), &LedgerAsset::Token(asset.clone()));
            if held < position.deposited {
                return Err(violation(format!(
                    "{asset}: treasury holds {held} but escrow records {}",
                    position.deposited
                )));
            }
            debug!(%desk, %asset, deposited = position.deposited, reserved = position.reserved, consigned = position.consigned, held, "Escrow position balanced");
        }

        if let Some((asset, qty)) = reserved.iter().chain(consigned.iter()).find(|(_, q)| **q > 0) {
            return Err(violation(format!("{asset}: {qty} committed without an escrow position")));
        }
        Ok(())
    }
}

fn add(totals: &mut HashMap<AssetId, u64>, asset: &AssetId, qty: u64) -> Result<()> {
    let slot = totals.entry(asset.clone()).or_insert(0);
    *slot = slot.checked_add(qty).ok_or(OtcError::Overflow)?;
    Ok(())
}

fn violation(reason: String) -> OtcError {
    OtcError::EscrowInvariant { reason }
}
