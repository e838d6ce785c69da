//! # OfferEngine
//!
//! Validates commercial terms, builds offers and gates every lifecycle
//! transition. The engine never reads clocks or prices itself: the caller
//! resolves prices through the oracle and passes `now` in.
//!
//! ## Term rules
//!
//! | Path           | Discount                  | Lockup                     | Commission | Approval |
//! |----------------|---------------------------|----------------------------|------------|----------|
//! | negotiable     | within listing bounds     | within listing bounds      | 25–150 bps | quorum   |
//! | fixed-price    | == listing fixed discount | == listing fixed lockup    | 0          | at birth |
//! | direct (desk)  | ≤ 100%                    | desk unlock delay … max    | 0          | quorum   |

use otcdesk_inventory::{ConsignmentLedger, math};
use otcdesk_types::{
    ApproverSet, Consignment, Currency, Desk, Identity, Offer, OfferId, OfferOrigin, OtcError, Result,
    TokenRegistryEntry, constants,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Commercial terms requested by a buyer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferRequest {
    /// Raw units of the asset.
    pub token_amount: u64,
    pub discount_bps: u16,
    pub currency: Currency,
    pub lockup_secs: i64,
    pub agent_commission_bps: u16,
}

/// Prices resolved by the oracle for offer creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreationPrices {
    pub token_usd: Decimal,
    /// Required when the offer pays in native units.
    pub native_usd: Option<Decimal>,
}

/// Offer lifecycle rules for one desk.
pub struct OfferEngine<'a> {
    desk: &'a Desk,
}

impl<'a> OfferEngine<'a> {
    #[must_use]
    pub fn new(desk: &'a Desk) -> Self {
        Self { desk }
    }

    // -----------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------

    /// Create an offer against `consignment`, reserving its inventory.
    ///
    /// `consignment` is only modified on success.
    ///
    /// # Errors
    /// - [`OtcError::Paused`], [`OtcError::BadState`] (inactive listing),
    ///   [`OtcError::NotAllowlisted`] (private listing)
    /// - [`OtcError::AmountRange`] outside the deal bounds or above remaining
    /// - [`OtcError::Discount`], [`OtcError::LockupRange`],
    ///   [`OtcError::CommissionRange`] for terms the listing does not allow
    /// - [`OtcError::MinUsd`] below the desk floor
    #[allow(clippy::too_many_arguments)]
    pub fn create_from_consignment(
        &self,
        id: OfferId,
        consignment: &mut Consignment,
        entry: &TokenRegistryEntry,
        beneficiary: Identity,
        request: &OfferRequest,
        prices: CreationPrices,
        now: i64,
    ) -> Result<Offer> {
        self.desk.require_active()?;
        if !consignment.is_active {
            return Err(OtcError::bad_state(format!("{} is withdrawn", consignment.id)));
        }
        if !ConsignmentLedger::new(self.desk).admits(consignment, &beneficiary) {
            return Err(OtcError::NotAllowlisted);
        }

        let qty = request.token_amount;
        if qty == 0 || qty < consignment.min_deal_amount || qty > consignment.max_deal_amount {
            return Err(OtcError::amount_range(format!(
                "{qty} outside deal bounds [{}, {}]",
                consignment.min_deal_amount, consignment.max_deal_amount
            )));
        }
        if qty > consignment.remaining_amount {
            return Err(OtcError::amount_range(format!(
                "{qty} exceeds remaining {}",
                consignment.remaining_amount
            )));
        }

        check_discount_ceiling(request.discount_bps)?;
        if request.lockup_secs < 0 {
            return Err(OtcError::LockupRange {
                reason: "negative lockup".into(),
            });
        }
        let lockup_days = request.lockup_secs / constants::SECONDS_PER_DAY;

        if consignment.is_negotiable {
            check_negotiated_terms(consignment, request, lockup_days)?;
        } else {
            check_fixed_terms(consignment, request, lockup_days)?;
        }

        self.check_notional(qty, entry.decimals, prices.token_usd)?;
        let native_usd = self.native_snapshot(request.currency, prices)?;

        let window = if consignment.max_time_to_execute_secs > 0 {
            consignment.max_time_to_execute_secs
        } else {
            self.desk.limits.quote_expiry_secs
        };

        let mut offer = self.build(
            id,
            OfferOrigin::Consignment(consignment.id),
            entry,
            beneficiary,
            request,
            prices.token_usd,
            native_usd,
            now,
            window,
        )?;
        offer.max_price_deviation_bps = consignment.max_price_volatility_bps;
        if !consignment.is_negotiable {
            offer.mark_approved()?;
        }

        consignment.reserve(qty)?;
        Ok(offer)
    }

    /// Create an offer against the desk's free inventory. Escrow availability
    /// is checked by the caller.
    ///
    /// # Errors
    /// [`OtcError::Paused`], [`OtcError::AmountRange`],
    /// [`OtcError::Discount`], [`OtcError::LockupRange`],
    /// [`OtcError::CommissionRange`], [`OtcError::MinUsd`].
    pub fn create_direct(
        &self,
        id: OfferId,
        entry: &TokenRegistryEntry,
        beneficiary: Identity,
        request: &OfferRequest,
        prices: CreationPrices,
        now: i64,
    ) -> Result<Offer> {
        self.desk.require_active()?;
        let limits = &self.desk.limits;
        if request.token_amount == 0 || request.token_amount > limits.max_token_per_order {
            return Err(OtcError::amount_range(format!(
                "{} outside (0, {}]",
                request.token_amount, limits.max_token_per_order
            )));
        }
        check_discount_ceiling(request.discount_bps)?;
        if request.lockup_secs < limits.default_unlock_delay_secs
            || request.lockup_secs > limits.max_lockup_secs
        {
            return Err(OtcError::LockupRange {
                reason: format!(
                    "{}s outside [{}s, {}s]",
                    request.lockup_secs, limits.default_unlock_delay_secs, limits.max_lockup_secs
                ),
            });
        }
        if request.agent_commission_bps != 0 {
            return Err(OtcError::CommissionRange {
                bps: request.agent_commission_bps,
            });
        }
        self.check_notional(request.token_amount, entry.decimals, prices.token_usd)?;
        let native_usd = self.native_snapshot(request.currency, prices)?;

        self.build(
            id,
            OfferOrigin::Direct,
            entry,
            beneficiary,
            request,
            prices.token_usd,
            native_usd,
            now,
            limits.quote_expiry_secs,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        &self,
        id: OfferId,
        origin: OfferOrigin,
        entry: &TokenRegistryEntry,
        beneficiary: Identity,
        request: &OfferRequest,
        token_usd: Decimal,
        native_usd: Option<Decimal>,
        now: i64,
        window_secs: i64,
    ) -> Result<Offer> {
        let unlock_time = now.checked_add(request.lockup_secs).ok_or(OtcError::Overflow)?;
        let expires_at = now.checked_add(window_secs).ok_or(OtcError::Overflow)?;
        Ok(Offer {
            id,
            desk: self.desk.id,
            origin,
            asset: entry.asset.clone(),
            beneficiary,
            token_amount: request.token_amount,
            discount_bps: request.discount_bps,
            currency: request.currency,
            lockup_secs: request.lockup_secs,
            price_usd_per_token: token_usd,
            native_usd_price: native_usd,
            agent_commission_bps: request.agent_commission_bps,
            max_price_deviation_bps: 0,
            created_at: now,
            unlock_time,
            expires_at,
            approvals: ApproverSet::new(),
            approved: false,
            paid: false,
            fulfilled: false,
            cancelled: false,
            refunded: false,
            payer: None,
            amount_paid: 0,
            commission_paid: 0,
        })
    }

    fn check_notional(&self, qty: u64, decimals: u8, token_usd: Decimal) -> Result<()> {
        let notional = math::notional_usd(qty, decimals, token_usd)?;
        let limits = &self.desk.limits;
        if notional < limits.min_usd {
            return Err(OtcError::MinUsd {
                notional,
                min: limits.min_usd,
            });
        }
        if !limits.max_usd.is_zero() && notional > limits.max_usd {
            return Err(OtcError::amount_range(format!(
                "notional ${notional} above desk maximum ${}",
                limits.max_usd
            )));
        }
        Ok(())
    }

    fn native_snapshot(&self, currency: Currency, prices: CreationPrices) -> Result<Option<Decimal>> {
        match currency {
            Currency::Stable => Ok(None),
            Currency::Native => prices.native_usd.map(Some).ok_or(OtcError::NoPrice),
        }
    }

    // -----------------------------------------------------------------
    // Transition gates
    // -----------------------------------------------------------------

    /// May `caller` pay `offer` in `currency` at `now`?
    ///
    /// # Errors
    /// - [`OtcError::Paused`]
    /// - [`OtcError::BadState`] on a currency mismatch or a paid / terminal offer
    /// - [`OtcError::NotApproved`] before quorum
    /// - [`OtcError::Expired`] after the offer's window
    /// - [`OtcError::FulfillRestricted`] if only the beneficiary may pay
    pub fn authorize_fulfill(&self, offer: &Offer, caller: &Identity, currency: Currency, now: i64) -> Result<()> {
        self.desk.require_active()?;
        if offer.currency != currency {
            return Err(OtcError::bad_state(format!(
                "{} pays in {}, not {currency}",
                offer.id, offer.currency
            )));
        }
        if offer.paid || offer.cancelled || offer.fulfilled || offer.refunded {
            return Err(OtcError::bad_state(format!(
                "{} is {} and cannot be paid",
                offer.id,
                offer.state()
            )));
        }
        if !offer.approved {
            return Err(OtcError::NotApproved);
        }
        if now > offer.expires_at {
            return Err(OtcError::Expired {
                expires_at: offer.expires_at,
            });
        }
        if self.desk.restrict_fulfill && *caller != offer.beneficiary {
            return Err(OtcError::FulfillRestricted);
        }
        Ok(())
    }

    /// Reject a payment whose live price moved too far from the quote.
    ///
    /// # Errors
    /// [`OtcError::PriceDeviation`].
    pub fn check_price_drift(&self, offer: &Offer, current: Decimal) -> Result<()> {
        if math::within_deviation(offer.price_usd_per_token, current, offer.max_price_deviation_bps) {
            Ok(())
        } else {
            Err(OtcError::PriceDeviation {
                snapshot: offer.price_usd_per_token,
                current,
                max_bps: offer.max_price_deviation_bps,
            })
        }
    }

    /// May `caller` claim `offer` at `now`? Tokens always go to the
    /// beneficiary; owner and agent may trigger delivery on their behalf.
    ///
    /// # Errors
    /// [`OtcError::NotAuthorized`], [`OtcError::BadState`] unless paid and
    /// unclaimed, [`OtcError::Locked`] before the unlock time.
    pub fn authorize_claim(&self, offer: &Offer, caller: &Identity, now: i64) -> Result<()> {
        if *caller != offer.beneficiary && *caller != self.desk.owner && *caller != self.desk.agent {
            return Err(OtcError::NotAuthorized);
        }
        if !(offer.paid && offer.approved && !offer.cancelled) {
            return Err(OtcError::bad_state(format!("{} is not paid", offer.id)));
        }
        if offer.fulfilled || offer.refunded {
            return Err(OtcError::bad_state(format!(
                "{} is already {}",
                offer.id,
                offer.state()
            )));
        }
        if now < offer.unlock_time {
            return Err(OtcError::Locked {
                unlock_time: offer.unlock_time,
            });
        }
        Ok(())
    }

    /// May `caller` cancel `offer` at `now`?
    ///
    /// Owner, agent and approvers may cancel any unpaid offer. The
    /// beneficiary may cancel once the offer has expired.
    ///
    /// # Errors
    /// [`OtcError::BadState`] if paid or terminal, [`OtcError::NotExpired`]
    /// for an early beneficiary cancel, [`OtcError::NotAuthorized`] otherwise.
    pub fn authorize_cancel(&self, offer: &Offer, caller: &Identity, now: i64) -> Result<()> {
        if offer.paid || offer.cancelled || offer.fulfilled || offer.refunded {
            return Err(OtcError::bad_state(format!(
                "{} is {} and cannot be cancelled",
                offer.id,
                offer.state()
            )));
        }
        if self.desk.is_approver(caller) {
            return Ok(());
        }
        if *caller == offer.beneficiary {
            if now < offer.expires_at {
                return Err(OtcError::NotExpired {
                    expires_at: offer.expires_at,
                });
            }
            return Ok(());
        }
        Err(OtcError::NotAuthorized)
    }
}

fn check_discount_ceiling(bps: u16) -> Result<()> {
    if bps > constants::BPS_DENOMINATOR {
        return Err(OtcError::Discount {
            reason: format!("{bps} bps exceeds 100%"),
        });
    }
    Ok(())
}

fn check_negotiated_terms(c: &Consignment, request: &OfferRequest, lockup_days: i64) -> Result<()> {
    if request.discount_bps < c.min_discount_bps || request.discount_bps > c.max_discount_bps {
        return Err(OtcError::Discount {
            reason: format!(
                "{} bps outside [{}, {}]",
                request.discount_bps, c.min_discount_bps, c.max_discount_bps
            ),
        });
    }
    if lockup_days < i64::from(c.min_lockup_days) || lockup_days > i64::from(c.max_lockup_days) {
        return Err(OtcError::LockupRange {
            reason: format!(
                "{lockup_days}d outside [{}d, {}d]",
                c.min_lockup_days, c.max_lockup_days
            ),
        });
    }
    let bps = request.agent_commission_bps;
    if !(constants::MIN_NEGOTIATED_COMMISSION_BPS..=constants::MAX_NEGOTIATED_COMMISSION_BPS).contains(&bps) {
        return Err(OtcError::CommissionRange { bps });
    }
    Ok(())
}

fn check_fixed_terms(c: &Consignment, request: &OfferRequest, lockup_days: i64) -> Result<()> {
    if request.discount_bps != c.fixed_discount_bps {
        return Err(OtcError::Discount {
            reason: format!(
                "{} bps differs from fixed {}",
                request.discount_bps, c.fixed_discount_bps
            ),
        });
    }
    if lockup_days != i64::from(c.fixed_lockup_days) {
        return Err(OtcError::LockupRange {
            reason: format!("{lockup_days}d differs from fixed {}d", c.fixed_lockup_days),
        });
    }
    if request.agent_commission_bps != 0 {
        return Err(OtcError::CommissionRange {
            bps: request.agent_commission_bps,
        });
    }
    Ok(())
}
