//! Recovery paths for paid offers that never settle.
//!
//! An emergency refund hands the payer back everything they paid and puts
//! the tokens back where they came from. An admin withdrawal pushes an
//! abandoned claim through to the beneficiary once the desk has gone quiet.

use otcdesk_inventory::{EscrowAccounting, PriceFeed};
use otcdesk_types::{DeskEvent, DeskId, Identity, Offer, OfferId, OtcError, Result, constants};
use tracing::info;

use crate::controller::LifecycleController;
use crate::ledger::{Account, Changeset, Ledger, LedgerAsset, LedgerView};
use crate::offer_ops::payment_asset;

fn require_unsettled(offer: &Offer) -> Result<()> {
    if !offer.paid {
        return Err(OtcError::bad_state(format!("{} is not paid", offer.id)));
    }
    if offer.fulfilled || offer.refunded {
        return Err(OtcError::bad_state(format!("{} already settled", offer.id)));
    }
    Ok(())
}

impl<L: Ledger, F: PriceFeed> LifecycleController<L, F> {
    /// Toggle emergency refunds and set how long after creation they open.
    ///
    /// # Errors
    /// [`OtcError::NotOwner`]; [`OtcError::LockupRange`] for a negative
    /// deadline.
    pub fn set_emergency_refund(
        &mut self,
        desk: DeskId,
        caller: Identity,
        enabled: bool,
        deadline_secs: i64,
    ) -> Result<()> {
        self.update_desk("set_emergency_refund", desk, caller, |d| {
            if deadline_secs < 0 {
                return Err(OtcError::LockupRange {
                    reason: format!("refund deadline {deadline_secs}s is negative"),
                });
            }
            d.emergency.refund_enabled = enabled;
            d.emergency.refund_deadline_secs = deadline_secs;
            Ok(DeskEvent::EmergencyRefundUpdated { enabled, deadline_secs })
        })
    }

    /// Refund a paid, unclaimed offer.
    ///
    /// The payer receives the full `amount_paid`. Commission already paid to
    /// the agent is not clawed back, so the treasury covers it. The window
    /// opens `refund_deadline_secs` after creation, or 30 days after unlock,
    /// whichever comes first.
    ///
    /// # Errors
    /// [`OtcError::BadState`] when refunds are disabled or the offer is not
    /// paid and unsettled, [`OtcError::NotAuthorized`] for callers other
    /// than the payer, beneficiary, owner, agent or an approver, and
    /// [`OtcError::TooEarlyForRefund`] before the window opens,
    /// [`OtcError::InsufficientBalance`] if the treasury cannot cover it.
    pub fn emergency_refund(&mut self, desk_id: DeskId, caller: Identity, offer_id: OfferId) -> Result<u64> {
        self.run("emergency_refund", desk_id, |this| {
            let mut desk = this.load_desk(desk_id)?;
            let mut offer = this.load_offer(desk_id, offer_id)?;
            if !desk.emergency.refund_enabled {
                return Err(OtcError::bad_state("emergency refunds are disabled"));
            }
            require_unsettled(&offer)?;
            let payer = offer.payer.ok_or_else(|| OtcError::Internal(format!("{offer_id} paid without payer")))?;
            let permitted = caller == payer || caller == offer.beneficiary || desk.is_approver(&caller);
            if !permitted {
                return Err(OtcError::NotAuthorized);
            }

            let now = this.ledger.now();
            let by_deadline = offer.created_at.saturating_add(desk.emergency.refund_deadline_secs);
            let by_unlock = offer
                .unlock_time
                .saturating_add(constants::EMERGENCY_REFUND_UNLOCK_GRACE_SECS);
            if now < by_deadline && now < by_unlock {
                return Err(OtcError::TooEarlyForRefund);
            }

            let refund = offer.amount_paid;
            let mut position = this.ledger.escrow_position(desk_id, &offer.asset);
            let (changes, _) = this.release_reservation(desk_id, &offer, &mut position, Changeset::new(desk_id))?;
            offer.mark_refunded()?;
            desk.touch(now);

            let currency = offer.currency;
            this.ledger.commit(
                changes
                    .with_desk(desk)
                    .with_offer(offer)
                    .with_escrow(position)
                    .with_transfer(payment_asset(currency), Account::Treasury(desk_id), Account::Holder(payer), refund)
                    .with_event(DeskEvent::EmergencyRefunded {
                        offer: offer_id,
                        payer,
                        amount: refund,
                        currency,
                    }),
            )?;
            info!(desk = %desk_id, offer = %offer_id, %payer, refund, %currency, "Emergency refund");
            Ok(refund)
        })
    }

    /// Deliver a paid offer's tokens to its beneficiary once the desk has
    /// seen no activity for 180 days and the offer unlocked at least that
    /// long ago. Owner only.
    ///
    /// # Errors
    /// [`OtcError::NotOwner`], [`OtcError::BadState`] unless paid and
    /// unsettled, and [`OtcError::Locked`] until both delays have passed.
    pub fn admin_emergency_withdraw(&mut self, desk_id: DeskId, caller: Identity, offer_id: OfferId) -> Result<()> {
        self.run("admin_emergency_withdraw", desk_id, |this| {
            let mut desk = this.load_desk(desk_id)?;
            desk.require_owner(&caller)?;
            let mut offer = this.load_offer(desk_id, offer_id)?;
            require_unsettled(&offer)?;

            let now = this.ledger.now();
            let quiet_since = desk.last_activity_at.max(offer.unlock_time);
            let opens_at = quiet_since.saturating_add(constants::ADMIN_EMERGENCY_DELAY_SECS);
            if now < opens_at {
                return Err(OtcError::Locked { unlock_time: opens_at });
            }

            let mut position = this.ledger.escrow_position(desk_id, &offer.asset);
            EscrowAccounting::new(&mut position).deliver(offer.token_amount)?;
            offer.mark_fulfilled()?;
            desk.touch(now);

            let beneficiary = offer.beneficiary;
            let amount = offer.token_amount;
            let token = LedgerAsset::Token(offer.asset.clone());
            this.ledger.commit(
                Changeset::new(desk_id)
                    .with_desk(desk)
                    .with_offer(offer)
                    .with_escrow(position)
                    .with_transfer(token, Account::Treasury(desk_id), Account::Holder(beneficiary), amount)
                    .with_event(DeskEvent::EmergencyWithdrawn {
                        offer: offer_id,
                        beneficiary,
                        amount,
                    }),
            )?;
            info!(desk = %desk_id, offer = %offer_id, %beneficiary, amount, "Emergency withdrawal");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryLedger;
    use otcdesk_inventory::StaticPriceFeed;
    use otcdesk_offers::OfferRequest;
    use otcdesk_types::{AssetId, ConsignmentId, ConsignmentTerms, Currency, DeskConfig, OfferState};

    const OWNER: Identity = Identity([1; 32]);
    const AGENT: Identity = Identity([2; 32]);
    const CONSIGNER: Identity = Identity([4; 32]);
    const BUYER: Identity = Identity([9; 32]);
    const STRANGER: Identity = Identity([8; 32]);
    const DAY: i64 = 86_400;

    type Controller = LifecycleController<InMemoryLedger, StaticPriceFeed>;

    /// Desk with one paid offer of 1 000 tokens at $10, 1% commission,
    /// one-day lockup, created at t = 1 000.
    fn paid_offer() -> (Controller, DeskId, AssetId, ConsignmentId, OfferId) {
        let mut ledger = InMemoryLedger::default();
        ledger.set_time(1_000);
        let mut c = LifecycleController::new(ledger, StaticPriceFeed::new());
        let config = DeskConfig {
            use_manual_prices: true,
            ..DeskConfig::default()
        };
        let desk = c.create_desk(OWNER, AGENT, &config).unwrap();
        let asset = AssetId::new("ELIZA");
        c.register_token(desk, OWNER, asset.clone(), None, 0).unwrap();
        c.set_prices(desk, OWNER, &asset, 1_000_000_000, 15_000_000_000, 10 * 365 * DAY)
            .unwrap();
        c.ledger_mut()
            .mint(Account::Holder(CONSIGNER), LedgerAsset::Token(asset.clone()), 5_000);
        c.ledger_mut().mint(Account::Holder(BUYER), LedgerAsset::Stable, 100_000_000_000);

        let cid = c
            .create_consignment(desk, CONSIGNER, &asset, &ConsignmentTerms::negotiable(5_000))
            .unwrap();
        let req = OfferRequest {
            token_amount: 1_000,
            discount_bps: 0,
            currency: Currency::Stable,
            lockup_secs: DAY,
            agent_commission_bps: 100,
        };
        let oid = c.create_offer_from_consignment(desk, BUYER, cid, &req).unwrap();
        c.approve_offer(desk, AGENT, oid).unwrap();
        c.fulfill_offer_stable(desk, BUYER, oid).unwrap();
        // House float covering commission on refunds.
        c.ledger_mut()
            .mint(Account::Treasury(desk), LedgerAsset::Stable, 1_000_000_000);
        (c, desk, asset, cid, oid)
    }

    #[test]
    fn refund_requires_switch_and_window() {
        let (mut c, desk, _, _, oid) = paid_offer();
        assert!(matches!(c.emergency_refund(desk, BUYER, oid), Err(OtcError::BadState { .. })));

        c.set_emergency_refund(desk, OWNER, true, 7 * DAY).unwrap();
        assert_eq!(c.emergency_refund(desk, BUYER, oid), Err(OtcError::TooEarlyForRefund));
        assert_eq!(c.emergency_refund(desk, STRANGER, oid), Err(OtcError::NotAuthorized));

        c.ledger_mut().advance(7 * DAY);
        // $10 000 back in full; the $100 commission comes out of the float.
        assert_eq!(c.emergency_refund(desk, BUYER, oid), Ok(10_000_000_000));
        assert_eq!(
            c.ledger().balance(&Account::Holder(BUYER), &LedgerAsset::Stable),
            100_000_000_000
        );
        assert_eq!(
            c.ledger().balance(&Account::Treasury(desk), &LedgerAsset::Stable),
            900_000_000
        );
        assert_eq!(
            c.ledger().balance(&Account::Holder(AGENT), &LedgerAsset::Stable),
            100_000_000
        );
        assert_eq!(c.ledger().offer(desk, oid).unwrap().state(), OfferState::Refunded);
    }

    #[test]
    fn refund_restores_listing_inventory() {
        let (mut c, desk, asset, cid, oid) = paid_offer();
        c.set_emergency_refund(desk, OWNER, true, 0).unwrap();
        c.emergency_refund(desk, OWNER, oid).unwrap();

        assert_eq!(c.ledger().consignment(desk, cid).unwrap().remaining_amount, 5_000);
        let pos = c.ledger().escrow_position(desk, &asset);
        assert_eq!((pos.deposited, pos.consigned, pos.reserved), (5_000, 5_000, 0));
        assert!(matches!(c.claim(desk, BUYER, oid), Err(OtcError::BadState { .. })));
    }

    #[test]
    fn unlock_grace_opens_refund_regardless_of_deadline() {
        let (mut c, desk, _, _, oid) = paid_offer();
        c.set_emergency_refund(desk, OWNER, true, 365 * DAY).unwrap();
        c.ledger_mut().advance(DAY + 30 * DAY - 1);
        assert_eq!(c.emergency_refund(desk, BUYER, oid), Err(OtcError::TooEarlyForRefund));
        c.ledger_mut().advance(1);
        assert!(c.emergency_refund(desk, BUYER, oid).is_ok());
    }

    #[test]
    fn admin_withdraw_after_long_inactivity() {
        let (mut c, desk, asset, _, oid) = paid_offer();
        let unlock = c.ledger().offer(desk, oid).unwrap().unlock_time;
        let opens_at = unlock + 180 * DAY;

        c.ledger_mut().set_time(opens_at - 1);
        assert_eq!(
            c.admin_emergency_withdraw(desk, OWNER, oid),
            Err(OtcError::Locked { unlock_time: opens_at })
        );
        c.ledger_mut().set_time(opens_at);
        assert_eq!(c.admin_emergency_withdraw(desk, AGENT, oid), Err(OtcError::NotOwner));
        c.admin_emergency_withdraw(desk, OWNER, oid).unwrap();

        let token = LedgerAsset::Token(asset);
        assert_eq!(c.ledger().balance(&Account::Holder(BUYER), &token), 1_000);
        assert_eq!(c.ledger().offer(desk, oid).unwrap().state(), OfferState::Fulfilled);
        assert!(matches!(
            c.admin_emergency_withdraw(desk, OWNER, oid),
            Err(OtcError::BadState { .. })
        ));
    }

    #[test]
    fn refund_fails_whole_when_treasury_short() {
        let (mut c, desk, asset, cid, oid) = paid_offer();
        c.set_emergency_refund(desk, OWNER, true, 0).unwrap();
        c.withdraw_stable(desk, OWNER, 1_000_000_000, OWNER).unwrap();

        assert!(matches!(
            c.emergency_refund(desk, BUYER, oid),
            Err(OtcError::InsufficientBalance { .. })
        ));
        assert_eq!(c.ledger().offer(desk, oid).unwrap().state(), OfferState::Paid);
        assert_eq!(c.ledger().consignment(desk, cid).unwrap().remaining_amount, 4_000);
        assert_eq!(c.ledger().escrow_position(desk, &asset).reserved, 1_000);
    }

    #[test]
    fn admin_withdraw_waits_for_desk_inactivity() {
        let (mut c, desk, _, _, oid) = paid_offer();
        let unlock = c.ledger().offer(desk, oid).unwrap().unlock_time;
        c.ledger_mut().set_time(unlock + 181 * DAY);
        c.pause(desk, OWNER).unwrap();
        let active_at = c.ledger().desk(desk).unwrap().last_activity_at;

        c.ledger_mut().advance(60);
        let opens_at = active_at + 180 * DAY;
        assert_eq!(
            c.admin_emergency_withdraw(desk, OWNER, oid),
            Err(OtcError::Locked { unlock_time: opens_at })
        );

        c.ledger_mut().set_time(opens_at);
        c.admin_emergency_withdraw(desk, OWNER, oid).unwrap();
        assert_eq!(c.ledger().offer(desk, oid).unwrap().state(), OfferState::Fulfilled);
    }
}
