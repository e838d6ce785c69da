//! Consignments: standing inventory listings.
//!
//! A consignment holds `total_amount` of one asset in desk escrow. Offers
//! reserve from `remaining_amount`; cancellation restores it, payment does not.
//!
//! ```text
//!   0 <= remaining_amount <= total_amount
//!   remaining_amount == total_amount - Σ reservations of live offers
//! ```

use serde::{Deserialize, Serialize};

use crate::{AllowList, AssetId, ConsignmentId, DeskId, Identity, OtcError, Result};

/// Terms supplied by the consigner when listing inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsignmentTerms {
    pub amount: u64,
    pub is_negotiable: bool,
    /// Only meaningful when not negotiable.
    pub fixed_discount_bps: u16,
    /// Only meaningful when not negotiable.
    pub fixed_lockup_days: u32,
    pub min_discount_bps: u16,
    pub max_discount_bps: u16,
    pub min_lockup_days: u32,
    pub max_lockup_days: u32,
    pub min_deal_amount: u64,
    pub max_deal_amount: u64,
    /// Whether offers may take less than the whole listing.
    pub is_fractionalized: bool,
    pub is_private: bool,
    /// Extra buyers admitted to a private listing.
    pub allow_list: Vec<Identity>,
    /// Largest tolerated move between quote and payment. Zero disables the check.
    pub max_price_volatility_bps: u16,
    /// Offer validity window. Zero falls back to the desk quote expiry.
    pub max_time_to_execute_secs: i64,
}

impl ConsignmentTerms {
    /// Negotiable, fractionalized terms over `amount` with wide bounds.
    #[must_use]
    pub fn negotiable(amount: u64) -> Self {
        Self {
            amount,
            is_negotiable: true,
            fixed_discount_bps: 0,
            fixed_lockup_days: 0,
            min_discount_bps: 0,
            max_discount_bps: 10_000,
            min_lockup_days: 0,
            max_lockup_days: 365,
            min_deal_amount: 1,
            max_deal_amount: amount,
            is_fractionalized: true,
            is_private: false,
            allow_list: Vec::new(),
            max_price_volatility_bps: 0,
            max_time_to_execute_secs: 0,
        }
    }

    /// Fixed-price (peer-to-peer) terms over `amount`.
    #[must_use]
    pub fn fixed(amount: u64, discount_bps: u16, lockup_days: u32) -> Self {
        Self {
            is_negotiable: false,
            fixed_discount_bps: discount_bps,
            fixed_lockup_days: lockup_days,
            min_discount_bps: discount_bps,
            max_discount_bps: discount_bps,
            min_lockup_days: lockup_days,
            max_lockup_days: lockup_days,
            ..Self::negotiable(amount)
        }
    }
}

/// A standing listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consignment {
    pub id: ConsignmentId,
    pub desk: DeskId,
    pub consigner: Identity,
    pub asset: AssetId,
    pub total_amount: u64,
    pub remaining_amount: u64,
    pub is_negotiable: bool,
    pub fixed_discount_bps: u16,
    pub fixed_lockup_days: u32,
    pub min_discount_bps: u16,
    pub max_discount_bps: u16,
    pub min_lockup_days: u32,
    pub max_lockup_days: u32,
    pub min_deal_amount: u64,
    pub max_deal_amount: u64,
    pub is_fractionalized: bool,
    pub is_private: bool,
    pub allow_list: AllowList,
    pub max_price_volatility_bps: u16,
    pub max_time_to_execute_secs: i64,
    /// False once withdrawn. Never reactivated.
    pub is_active: bool,
    pub created_at: i64,
}

impl Consignment {
    /// Take `qty` out of the remaining inventory.
    ///
    /// # Errors
    /// [`OtcError::AmountRange`] if `qty` exceeds what remains.
    pub fn reserve(&mut self, qty: u64) -> Result<()> {
        if qty > self.remaining_amount {
            return Err(OtcError::amount_range(format!(
                "{qty} exceeds remaining {} of {}",
                self.remaining_amount, self.id
            )));
        }
        self.remaining_amount -= qty;
        Ok(())
    }

    /// Return `qty` from a released reservation.
    ///
    /// # Errors
    /// [`OtcError::BadState`] if the listing is closed or the restore would
    /// exceed `total_amount`.
    pub fn restore(&mut self, qty: u64) -> Result<()> {
        if !self.is_active {
            return Err(OtcError::bad_state(format!("{} is withdrawn", self.id)));
        }
        let restored = self
            .remaining_amount
            .checked_add(qty)
            .filter(|r| *r <= self.total_amount)
            .ok_or_else(|| {
                OtcError::bad_state(format!("restore of {qty} would exceed total of {}", self.id))
            })?;
        self.remaining_amount = restored;
        Ok(())
    }

    /// Close the listing, returning what was left in it.
    ///
    /// # Errors
    /// [`OtcError::BadState`] if already withdrawn.
    pub fn close(&mut self) -> Result<u64> {
        if !self.is_active {
            return Err(OtcError::bad_state(format!("{} already withdrawn", self.id)));
        }
        let residual = self.remaining_amount;
        self.remaining_amount = 0;
        self.is_active = false;
        Ok(residual)
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl Consignment {
    /// An active listing built straight from `terms`, bypassing validation.
    #[must_use]
    pub fn dummy(desk: DeskId, consigner: Identity, asset: &str, terms: &ConsignmentTerms) -> Self {
        Self {
            id: ConsignmentId(1),
            desk,
            consigner,
            asset: AssetId::new(asset),
            total_amount: terms.amount,
            remaining_amount: terms.amount,
            is_negotiable: terms.is_negotiable,
            fixed_discount_bps: terms.fixed_discount_bps,
            fixed_lockup_days: terms.fixed_lockup_days,
            min_discount_bps: terms.min_discount_bps,
            max_discount_bps: terms.max_discount_bps,
            min_lockup_days: terms.min_lockup_days,
            max_lockup_days: terms.max_lockup_days,
            min_deal_amount: terms.min_deal_amount,
            max_deal_amount: terms.max_deal_amount,
            is_fractionalized: terms.is_fractionalized,
            is_private: terms.is_private,
            allow_list: AllowList::from_slice(&terms.allow_list).unwrap_or_default(),
            max_price_volatility_bps: terms.max_price_volatility_bps,
            max_time_to_execute_secs: terms.max_time_to_execute_secs,
            is_active: true,
            created_at: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(amount: u64) -> Consignment {
        Consignment::dummy(
            DeskId::new(),
            Identity([7; 32]),
            "T",
            &ConsignmentTerms::negotiable(amount),
        )
    }

    #[test]
    fn reserve_and_restore() {
        let mut c = listing(100);
        c.reserve(40).unwrap();
        assert_eq!(c.remaining_amount, 60);
        c.restore(40).unwrap();
        assert_eq!(c.remaining_amount, 100);
    }

    #[test]
    fn reserve_beyond_remaining_fails() {
        let mut c = listing(100);
        c.reserve(100).unwrap();
        assert!(matches!(c.reserve(1), Err(OtcError::AmountRange { .. })));
        assert_eq!(c.remaining_amount, 0);
    }

    #[test]
    fn restore_never_exceeds_total() {
        let mut c = listing(100);
        assert!(matches!(c.restore(1), Err(OtcError::BadState { .. })));
        assert_eq!(c.remaining_amount, 100);
    }

    #[test]
    fn close_once() {
        let mut c = listing(100);
        c.reserve(30).unwrap();
        assert_eq!(c.close().unwrap(), 70);
        assert_eq!(c.remaining_amount, 0);
        assert!(!c.is_active);
        assert!(matches!(c.close(), Err(OtcError::BadState { .. })));
        assert!(matches!(c.restore(30), Err(OtcError::BadState { .. })));
    }

    #[test]
    fn fixed_terms_pin_ranges() {
        let t = ConsignmentTerms::fixed(500, 300, 7);
        assert!(!t.is_negotiable);
        assert_eq!(t.min_discount_bps, t.max_discount_bps);
        assert_eq!(t.fixed_lockup_days, 7);
    }
}
