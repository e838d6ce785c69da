//! # Offer: the buyer's purchase request
//!
//! ## State Machine
//!
//! ```text
//!   ┌─────────┐ quorum ┌──────────┐ payment ┌──────┐ claim ┌───────────┐
//!   │ CREATED ├───────▶│ APPROVED ├────────▶│ PAID ├──────▶│ FULFILLED │
//!   └────┬────┘        └────┬─────┘         └──┬───┘       └───────────┘
//!        │ cancel           │ cancel           │ emergency refund
//!        ▼                  ▼                  ▼
//!   ┌───────────┐◀──────────┘             ┌──────────┐
//!   │ CANCELLED │                         │ REFUNDED │
//!   └───────────┘                         └──────────┘
//! ```
//!
//! The state is derived from one-way flags. No transition ever clears
//! `approved`, `paid` or `fulfilled`; `cancelled` is only set while unpaid.
//! Fixed-price offers are born approved.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ApproverSet, AssetId, ConsignmentId, DeskId, Identity, OfferId, OtcError, Result};

/// Payment unit of an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    /// The host ledger's native asset.
    Native,
    /// The USD stable unit.
    Stable,
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Native => write!(f, "NATIVE"),
            Self::Stable => write!(f, "STABLE"),
        }
    }
}

/// Where an offer's inventory comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OfferOrigin {
    Consignment(ConsignmentId),
    /// Free desk inventory deposited by the owner.
    Direct,
}

/// Lifecycle state, derived from the offer's flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OfferState {
    Created,
    Approved,
    Paid,
    Fulfilled,
    Cancelled,
    Refunded,
}

impl OfferState {
    /// Can an offer in this state move to `target`?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Created, Self::Approved | Self::Cancelled)
                | (Self::Approved, Self::Paid | Self::Cancelled)
                | (Self::Paid, Self::Fulfilled | Self::Refunded)
        )
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Fulfilled | Self::Cancelled | Self::Refunded)
    }
}

impl std::fmt::Display for OfferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "CREATED"),
            Self::Approved => write!(f, "APPROVED"),
            Self::Paid => write!(f, "PAID"),
            Self::Fulfilled => write!(f, "FULFILLED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Refunded => write!(f, "REFUNDED"),
        }
    }
}

/// A purchase request against a consignment or the desk's free inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub desk: DeskId,
    pub origin: OfferOrigin,
    pub asset: AssetId,
    pub beneficiary: Identity,
    /// Raw units of the asset.
    pub token_amount: u64,
    pub discount_bps: u16,
    pub currency: Currency,
    pub lockup_secs: i64,
    /// USD price per whole token at creation.
    pub price_usd_per_token: Decimal,
    /// Native/USD price at creation, if the offer pays in native.
    pub native_usd_price: Option<Decimal>,
    pub agent_commission_bps: u16,
    /// Copied from the consignment. Zero disables the check.
    pub max_price_deviation_bps: u16,
    pub created_at: i64,
    pub unlock_time: i64,
    pub expires_at: i64,
    /// Distinct approvals collected so far.
    pub approvals: ApproverSet,
    pub approved: bool,
    pub paid: bool,
    pub fulfilled: bool,
    pub cancelled: bool,
    pub refunded: bool,
    pub payer: Option<Identity>,
    /// Full payment in payment-currency units.
    pub amount_paid: u64,
    /// Part of `amount_paid` routed to the agent.
    pub commission_paid: u64,
}

impl Offer {
    #[must_use]
    pub fn state(&self) -> OfferState {
        if self.cancelled {
            OfferState::Cancelled
        } else if self.refunded {
            OfferState::Refunded
        } else if self.fulfilled {
            OfferState::Fulfilled
        } else if self.paid {
            OfferState::Paid
        } else if self.approved {
            OfferState::Approved
        } else {
            OfferState::Created
        }
    }

    /// Does this offer still hold a reservation in escrow?
    #[must_use]
    pub fn holds_reservation(&self) -> bool {
        !self.state().is_terminal()
    }

    #[must_use]
    pub fn consignment(&self) -> Option<ConsignmentId> {
        match self.origin {
            OfferOrigin::Consignment(id) => Some(id),
            OfferOrigin::Direct => None,
        }
    }

    fn transition(&self, target: OfferState) -> Result<()> {
        let current = self.state();
        if current.can_transition_to(target) {
            Ok(())
        } else {
            Err(OtcError::bad_state(format!(
                "cannot move {} from {current} to {target}",
                self.id
            )))
        }
    }

    /// # Errors
    /// [`OtcError::AlreadyApproved`] if approved; [`OtcError::BadState`]
    /// if paid or cancelled.
    pub fn mark_approved(&mut self) -> Result<()> {
        if self.approved && !self.cancelled && !self.paid {
            return Err(OtcError::AlreadyApproved);
        }
        self.transition(OfferState::Approved)?;
        self.approved = true;
        Ok(())
    }

    /// # Errors
    /// [`OtcError::NotApproved`] before quorum; [`OtcError::BadState`] if
    /// already paid or terminal.
    pub fn mark_paid(&mut self, payer: Identity, amount_paid: u64, commission_paid: u64) -> Result<()> {
        if self.state() == OfferState::Created {
            return Err(OtcError::NotApproved);
        }
        self.transition(OfferState::Paid)?;
        self.paid = true;
        self.payer = Some(payer);
        self.amount_paid = amount_paid;
        self.commission_paid = commission_paid;
        Ok(())
    }

    /// # Errors
    /// [`OtcError::BadState`] unless paid and not yet claimed or refunded.
    pub fn mark_fulfilled(&mut self) -> Result<()> {
        self.transition(OfferState::Fulfilled)?;
        self.fulfilled = true;
        Ok(())
    }

    /// # Errors
    /// [`OtcError::BadState`] if paid or already cancelled.
    pub fn mark_cancelled(&mut self) -> Result<()> {
        self.transition(OfferState::Cancelled)?;
        self.cancelled = true;
        Ok(())
    }

    /// # Errors
    /// [`OtcError::BadState`] unless paid and not yet claimed or refunded.
    pub fn mark_refunded(&mut self) -> Result<()> {
        self.transition(OfferState::Refunded)?;
        self.refunded = true;
        Ok(())
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl Offer {
    /// An unapproved stable-currency offer of `amount` at $1.
    #[must_use]
    pub fn dummy(beneficiary: Identity, amount: u64) -> Self {
        Self {
            id: OfferId(1),
            desk: DeskId::new(),
            origin: OfferOrigin::Consignment(ConsignmentId(1)),
            asset: AssetId::new("T"),
            beneficiary,
            token_amount: amount,
            discount_bps: 0,
            currency: Currency::Stable,
            lockup_secs: 0,
            price_usd_per_token: Decimal::ONE,
            native_usd_price: None,
            agent_commission_bps: 0,
            max_price_deviation_bps: 0,
            created_at: 0,
            unlock_time: 0,
            expires_at: 60,
            approvals: ApproverSet::new(),
            approved: false,
            paid: false,
            fulfilled: false,
            cancelled: false,
            refunded: false,
            payer: None,
            amount_paid: 0,
            commission_paid: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer() -> Offer {
        Offer::dummy(Identity([5; 32]), 100)
    }

    #[test]
    fn happy_path() {
        let mut o = offer();
        assert_eq!(o.state(), OfferState::Created);
        o.mark_approved().unwrap();
        assert_eq!(o.state(), OfferState::Approved);
        o.mark_paid(Identity([6; 32]), 1_000, 10).unwrap();
        assert_eq!(o.state(), OfferState::Paid);
        assert_eq!(o.payer, Some(Identity([6; 32])));
        o.mark_fulfilled().unwrap();
        assert_eq!(o.state(), OfferState::Fulfilled);
        assert!(!o.holds_reservation());
    }

    #[test]
    fn pay_before_approval_is_not_approved() {
        let mut o = offer();
        assert_eq!(
            o.mark_paid(Identity([6; 32]), 1, 0),
            Err(OtcError::NotApproved)
        );
        assert!(!o.paid);
    }

    #[test]
    fn double_transitions_are_bad_state() {
        let mut o = offer();
        o.mark_approved().unwrap();
        assert_eq!(o.mark_approved(), Err(OtcError::AlreadyApproved));
        o.mark_paid(Identity([6; 32]), 1, 0).unwrap();
        assert!(matches!(
            o.mark_paid(Identity([6; 32]), 1, 0),
            Err(OtcError::BadState { .. })
        ));
        o.mark_fulfilled().unwrap();
        assert!(matches!(o.mark_fulfilled(), Err(OtcError::BadState { .. })));
    }

    #[test]
    fn cancel_only_before_payment() {
        let mut o = offer();
        o.mark_cancelled().unwrap();
        assert!(matches!(o.mark_cancelled(), Err(OtcError::BadState { .. })));
        assert!(matches!(o.mark_approved(), Err(OtcError::BadState { .. })));

        let mut o = offer();
        o.mark_approved().unwrap();
        o.mark_paid(Identity([6; 32]), 1, 0).unwrap();
        assert!(matches!(o.mark_cancelled(), Err(OtcError::BadState { .. })));
        assert!(!o.cancelled);
    }

    #[test]
    fn refund_only_from_paid() {
        let mut o = offer();
        assert!(matches!(o.mark_refunded(), Err(OtcError::BadState { .. })));
        o.mark_approved().unwrap();
        o.mark_paid(Identity([6; 32]), 1, 0).unwrap();
        o.mark_refunded().unwrap();
        assert_eq!(o.state(), OfferState::Refunded);
        assert!(o.paid, "paid flag is never cleared");
        assert!(matches!(o.mark_fulfilled(), Err(OtcError::BadState { .. })));
    }

    #[test]
    fn transition_table() {
        use OfferState::*;
        assert!(Created.can_transition_to(Approved));
        assert!(!Created.can_transition_to(Paid));
        assert!(!Paid.can_transition_to(Cancelled));
        assert!(!Fulfilled.can_transition_to(Refunded));
        assert!(!Cancelled.can_transition_to(Approved));
    }

    #[test]
    fn state_display() {
        assert_eq!(OfferState::Paid.to_string(), "PAID");
        assert_eq!(Currency::Stable.to_string(), "STABLE");
    }
}
