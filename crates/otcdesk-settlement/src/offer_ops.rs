//! Offer lifecycle: create, approve, pay, claim, cancel.

use otcdesk_inventory::{EscrowAccounting, PriceFeed};
use otcdesk_offers::{ApprovalOutcome, ApprovalQuorum, CreationPrices, OfferEngine, OfferRequest, PaymentQuote, payment};
use otcdesk_types::{
    AssetId, ConsignmentId, Currency, Desk, DeskEvent, DeskId, EscrowPosition, Identity, Offer, OfferId,
    OfferOrigin, OtcError, Result, TokenRegistryEntry,
};
use rust_decimal::Decimal;
use tracing::info;

use crate::controller::LifecycleController;
use crate::ledger::{Account, Changeset, Ledger, LedgerAsset, LedgerView};

pub(crate) fn payment_asset(currency: Currency) -> LedgerAsset {
    match currency {
        Currency::Stable => LedgerAsset::Stable,
        Currency::Native => LedgerAsset::Native,
    }
}

impl<L: Ledger, F: PriceFeed> LifecycleController<L, F> {
    /// Live token price; advances the entry's round watermark.
    pub(crate) fn resolve_token_price(
        &self,
        desk: &Desk,
        entry: &mut TokenRegistryEntry,
        now: i64,
    ) -> Result<Decimal> {
        let resolved = self.oracle(&desk.pricing).token_price(entry, now)?;
        resolved.advance(&mut entry.last_round);
        Ok(resolved.price)
    }

    /// Live native price; advances the desk's native round watermark.
    pub(crate) fn resolve_native_price(&self, desk: &mut Desk, now: i64) -> Result<Decimal> {
        let resolved = self.oracle(&desk.pricing).native_price(now)?;
        resolved.advance(&mut desk.pricing.native_last_round);
        Ok(resolved.price)
    }

    /// Hand an unclaimed offer's reservation back: to its listing while the
    /// listing is active, to the consigner once it is withdrawn, or to free
    /// inventory for a direct offer. Returns the listing's new remaining
    /// amount, if any.
    pub(crate) fn release_reservation(
        &self,
        desk_id: DeskId,
        offer: &Offer,
        position: &mut EscrowPosition,
        changes: Changeset,
    ) -> Result<(Changeset, Option<u64>)> {
        let qty = offer.token_amount;
        match offer.origin {
            OfferOrigin::Consignment(id) => {
                let mut consignment = self.load_consignment(desk_id, id)?;
                if consignment.is_active {
                    consignment.restore(qty)?;
                    EscrowAccounting::new(position).release_to_consignment(qty)?;
                    let remaining = consignment.remaining_amount;
                    Ok((changes.with_consignment(consignment), Some(remaining)))
                } else {
                    EscrowAccounting::new(position).deliver(qty)?;
                    let changes = changes.with_transfer(
                        LedgerAsset::Token(offer.asset.clone()),
                        Account::Treasury(desk_id),
                        Account::Holder(consignment.consigner),
                        qty,
                    );
                    Ok((changes, Some(consignment.remaining_amount)))
                }
            }
            OfferOrigin::Direct => {
                EscrowAccounting::new(position).release_free(qty)?;
                Ok((changes, None))
            }
        }
    }

    /// Open an offer against a listing. The caller is the beneficiary.
    ///
    /// # Errors
    /// [`OtcError::Paused`], [`OtcError::ConsignmentNotFound`], any price
    /// error from the oracle, and the term errors of
    /// [`OfferEngine::create_from_consignment`].
    pub fn create_offer_from_consignment(
        &mut self,
        desk_id: DeskId,
        beneficiary: Identity,
        consignment_id: ConsignmentId,
        request: &OfferRequest,
    ) -> Result<OfferId> {
        self.run("create_offer_from_consignment", desk_id, |this| {
            let mut desk = this.load_desk(desk_id)?;
            desk.require_active()?;
            let mut consignment = this.load_consignment(desk_id, consignment_id)?;
            let mut entry = this.load_entry(desk_id, &consignment.asset)?;
            let now = this.ledger.now();

            let token_usd = this.resolve_token_price(&desk, &mut entry, now)?;
            let native_usd = match request.currency {
                Currency::Native => Some(this.resolve_native_price(&mut desk, now)?),
                Currency::Stable => None,
            };

            let id = desk.allocate_offer_id()?;
            let offer = OfferEngine::new(&desk).create_from_consignment(
                id,
                &mut consignment,
                &entry,
                beneficiary,
                request,
                CreationPrices { token_usd, native_usd },
                now,
            )?;

            let mut position = this.ledger.escrow_position(desk_id, &consignment.asset);
            EscrowAccounting::new(&mut position).reserve_from_consignment(offer.token_amount)?;
            desk.touch(now);

            let mut changes = Changeset::new(desk_id).with_event(DeskEvent::OfferCreated {
                offer: id,
                consignment: Some(consignment_id),
                beneficiary,
                asset: offer.asset.clone(),
                token_amount: offer.token_amount,
                discount_bps: offer.discount_bps,
                currency: offer.currency,
                price_usd_per_token: offer.price_usd_per_token,
                consignment_remaining: Some(consignment.remaining_amount),
            });
            if offer.approved {
                changes = changes.with_event(DeskEvent::OfferApproved {
                    offer: id,
                    approver: None,
                    approvals: 0,
                    approved: true,
                });
            }
            let auto_approved = offer.approved;
            this.ledger.commit(
                changes
                    .with_desk(desk)
                    .with_registry(entry)
                    .with_consignment(consignment)
                    .with_offer(offer)
                    .with_escrow(position),
            )?;
            info!(
                desk = %desk_id,
                offer = %id,
                consignment = %consignment_id,
                %beneficiary,
                amount = request.token_amount,
                discount_bps = request.discount_bps,
                auto_approved,
                "Offer created"
            );
            Ok(id)
        })
    }

    /// Open an offer against the desk's free inventory of `asset`.
    ///
    /// # Errors
    /// [`OtcError::Paused`], [`OtcError::TokenNotRegistered`], price errors,
    /// the term errors of [`OfferEngine::create_direct`], and
    /// [`OtcError::InsufficientInventory`].
    pub fn create_offer(
        &mut self,
        desk_id: DeskId,
        beneficiary: Identity,
        asset: &AssetId,
        request: &OfferRequest,
    ) -> Result<OfferId> {
        self.run("create_offer", desk_id, |this| {
            let mut desk = this.load_desk(desk_id)?;
            desk.require_active()?;
            let mut entry = this.load_entry(desk_id, asset)?;
            let now = this.ledger.now();

            let token_usd = this.resolve_token_price(&desk, &mut entry, now)?;
            let native_usd = match request.currency {
                Currency::Native => Some(this.resolve_native_price(&mut desk, now)?),
                Currency::Stable => None,
            };

            let id = desk.allocate_offer_id()?;
            let offer = OfferEngine::new(&desk).create_direct(
                id,
                &entry,
                beneficiary,
                request,
                CreationPrices { token_usd, native_usd },
                now,
            )?;

            let mut position = this.ledger.escrow_position(desk_id, asset);
            EscrowAccounting::new(&mut position).reserve_free(offer.token_amount)?;
            desk.touch(now);

            let event = DeskEvent::OfferCreated {
                offer: id,
                consignment: None,
                beneficiary,
                asset: asset.clone(),
                token_amount: offer.token_amount,
                discount_bps: offer.discount_bps,
                currency: offer.currency,
                price_usd_per_token: offer.price_usd_per_token,
                consignment_remaining: None,
            };
            this.ledger.commit(
                Changeset::new(desk_id)
                    .with_desk(desk)
                    .with_registry(entry)
                    .with_offer(offer)
                    .with_escrow(position)
                    .with_event(event),
            )?;
            info!(desk = %desk_id, offer = %id, %asset, %beneficiary, amount = request.token_amount, "Direct offer created");
            Ok(id)
        })
    }

    /// Record the caller's approval.
    ///
    /// # Errors
    /// As [`ApprovalQuorum::approve`].
    pub fn approve_offer(&mut self, desk_id: DeskId, approver: Identity, offer_id: OfferId) -> Result<ApprovalOutcome> {
        self.run("approve_offer", desk_id, |this| {
            let desk = this.load_desk(desk_id)?;
            let mut offer = this.load_offer(desk_id, offer_id)?;
            let outcome = ApprovalQuorum::new(&desk).approve(&mut offer, approver)?;
            this.ledger.commit(
                Changeset::new(desk_id)
                    .with_offer(offer)
                    .with_event(DeskEvent::OfferApproved {
                        offer: offer_id,
                        approver: Some(approver),
                        approvals: outcome.approvals,
                        approved: outcome.approved,
                    }),
            )?;
            info!(
                desk = %desk_id,
                offer = %offer_id,
                %approver,
                approvals = outcome.approvals,
                approved = outcome.approved,
                "Offer approval recorded"
            );
            Ok(outcome)
        })
    }

    /// Pay for an offer in `currency`.
    ///
    /// The payment is priced off the creation snapshot; the live price only
    /// has to stay within the listing's volatility bound. The agent's
    /// commission leaves the treasury in the same commit.
    ///
    /// # Errors
    /// The gates of [`OfferEngine::authorize_fulfill`] and
    /// [`OfferEngine::check_price_drift`], oracle errors, and
    /// [`OtcError::InsufficientBalance`] if the payer cannot cover it.
    pub fn fulfill_offer(
        &mut self,
        desk_id: DeskId,
        payer: Identity,
        offer_id: OfferId,
        currency: Currency,
    ) -> Result<PaymentQuote> {
        self.run("fulfill_offer", desk_id, |this| {
            let mut desk = this.load_desk(desk_id)?;
            let mut offer = this.load_offer(desk_id, offer_id)?;
            let now = this.ledger.now();
            OfferEngine::new(&desk).authorize_fulfill(&offer, &payer, currency, now)?;

            let mut entry = this.load_entry(desk_id, &offer.asset)?;
            let current = this.resolve_token_price(&desk, &mut entry, now)?;
            OfferEngine::new(&desk).check_price_drift(&offer, current)?;
            let native_usd = match offer.currency {
                Currency::Native => Some(this.resolve_native_price(&mut desk, now)?),
                Currency::Stable => None,
            };

            let quote = payment::quote(&offer, entry.decimals, desk.stable_decimals, native_usd)?;
            offer.mark_paid(payer, quote.amount, quote.commission)?;
            desk.touch(now);

            let asset = payment_asset(currency);
            let agent = desk.agent;
            let mut changes = Changeset::new(desk_id)
                .with_transfer(asset.clone(), Account::Holder(payer), Account::Treasury(desk_id), quote.amount)
                .with_transfer(asset, Account::Treasury(desk_id), Account::Holder(agent), quote.commission)
                .with_event(DeskEvent::OfferPaid {
                    offer: offer_id,
                    payer,
                    amount: quote.amount,
                    currency,
                });
            if quote.commission > 0 {
                changes = changes.with_event(DeskEvent::AgentCommissionPaid {
                    offer: offer_id,
                    agent,
                    amount: quote.commission,
                    currency,
                });
            }
            this.ledger
                .commit(changes.with_desk(desk).with_registry(entry).with_offer(offer))?;
            info!(
                desk = %desk_id,
                offer = %offer_id,
                %payer,
                %currency,
                amount = quote.amount,
                commission = quote.commission,
                usd = %quote.usd_value,
                "Offer paid"
            );
            Ok(quote)
        })
    }

    /// # Errors
    /// As [`Self::fulfill_offer`].
    pub fn fulfill_offer_stable(&mut self, desk_id: DeskId, payer: Identity, offer_id: OfferId) -> Result<PaymentQuote> {
        self.fulfill_offer(desk_id, payer, offer_id, Currency::Stable)
    }

    /// # Errors
    /// As [`Self::fulfill_offer`].
    pub fn fulfill_offer_native(&mut self, desk_id: DeskId, payer: Identity, offer_id: OfferId) -> Result<PaymentQuote> {
        self.fulfill_offer(desk_id, payer, offer_id, Currency::Native)
    }

    /// Deliver a paid offer's tokens to its beneficiary once unlocked.
    /// Permitted while paused.
    ///
    /// # Errors
    /// As [`OfferEngine::authorize_claim`]; a repeated claim fails with
    /// [`OtcError::BadState`].
    pub fn claim(&mut self, desk_id: DeskId, caller: Identity, offer_id: OfferId) -> Result<()> {
        self.run("claim", desk_id, |this| {
            let mut desk = this.load_desk(desk_id)?;
            let mut offer = this.load_offer(desk_id, offer_id)?;
            let now = this.ledger.now();
            OfferEngine::new(&desk).authorize_claim(&offer, &caller, now)?;

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
                    .with_event(DeskEvent::TokensClaimed {
                        offer: offer_id,
                        beneficiary,
                        amount,
                    }),
            )?;
            info!(desk = %desk_id, offer = %offer_id, %beneficiary, amount, "Tokens claimed");
            Ok(())
        })
    }

    /// Cancel an unpaid offer against a listing, restoring its inventory.
    /// Permitted while paused.
    ///
    /// # Errors
    /// [`OtcError::BadState`] for a direct offer, plus the gates of
    /// [`OfferEngine::authorize_cancel`].
    pub fn cancel_offer_with_consignment(&mut self, desk_id: DeskId, caller: Identity, offer_id: OfferId) -> Result<()> {
        self.run("cancel_offer_with_consignment", desk_id, |this| {
            this.cancel(desk_id, caller, offer_id, true)
        })
    }

    /// Cancel an unpaid direct offer, returning its reservation to free
    /// inventory. Permitted while paused.
    ///
    /// # Errors
    /// [`OtcError::BadState`] for a listing offer, plus the gates of
    /// [`OfferEngine::authorize_cancel`].
    pub fn cancel_offer(&mut self, desk_id: DeskId, caller: Identity, offer_id: OfferId) -> Result<()> {
        self.run("cancel_offer", desk_id, |this| this.cancel(desk_id, caller, offer_id, false))
    }

    fn cancel(&mut self, desk_id: DeskId, caller: Identity, offer_id: OfferId, from_consignment: bool) -> Result<()> {
        let mut desk = self.load_desk(desk_id)?;
        let mut offer = self.load_offer(desk_id, offer_id)?;
        match (offer.origin, from_consignment) {
            (OfferOrigin::Consignment(_), true) | (OfferOrigin::Direct, false) => {}
            (OfferOrigin::Direct, true) => {
                return Err(OtcError::bad_state(format!("{offer_id} is a direct offer")));
            }
            (OfferOrigin::Consignment(id), false) => {
                return Err(OtcError::bad_state(format!("{offer_id} belongs to {id}")));
            }
        }
        let now = self.ledger.now();
        OfferEngine::new(&desk).authorize_cancel(&offer, &caller, now)?;

        let mut position = self.ledger.escrow_position(desk_id, &offer.asset);
        let (changes, remaining) = self.release_reservation(desk_id, &offer, &mut position, Changeset::new(desk_id))?;
        offer.mark_cancelled()?;
        desk.touch(now);

        self.ledger.commit(
            changes
                .with_desk(desk)
                .with_offer(offer)
                .with_escrow(position)
                .with_event(DeskEvent::OfferCancelled {
                    offer: offer_id,
                    by: caller,
                    consignment_remaining: remaining,
                }),
        )?;
        info!(desk = %desk_id, offer = %offer_id, by = %caller, ?remaining, "Offer cancelled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryLedger;
    use otcdesk_inventory::StaticPriceFeed;
    use otcdesk_types::{ConsignmentTerms, DeskConfig, OfferState};

    const OWNER: Identity = Identity([1; 32]);
    const AGENT: Identity = Identity([2; 32]);
    const CONSIGNER: Identity = Identity([4; 32]);
    const BUYER: Identity = Identity([9; 32]);
    const DAY: i64 = 86_400;

    type Controller = LifecycleController<InMemoryLedger, StaticPriceFeed>;

    fn setup() -> (Controller, DeskId, AssetId) {
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
        c.set_prices(desk, OWNER, &asset, 1_000_000_000, 15_000_000_000, 3_600).unwrap();
        c.ledger_mut()
            .mint(Account::Holder(CONSIGNER), LedgerAsset::Token(asset.clone()), 100_000);
        c.ledger_mut().mint(Account::Holder(BUYER), LedgerAsset::Stable, 1_000_000_000_000);
        (c, desk, asset)
    }

    fn request(amount: u64) -> OfferRequest {
        OfferRequest {
            token_amount: amount,
            discount_bps: 500,
            currency: Currency::Stable,
            lockup_secs: DAY,
            agent_commission_bps: 50,
        }
    }

    #[test]
    fn creation_reserves_listing_and_escrow() {
        let (mut c, desk, asset) = setup();
        let cid = c
            .create_consignment(desk, CONSIGNER, &asset, &ConsignmentTerms::negotiable(100_000))
            .unwrap();
        let oid = c.create_offer_from_consignment(desk, BUYER, cid, &request(10_000)).unwrap();

        assert_eq!(c.ledger().consignment(desk, cid).unwrap().remaining_amount, 90_000);
        let pos = c.ledger().escrow_position(desk, &asset);
        assert_eq!((pos.deposited, pos.consigned, pos.reserved), (100_000, 90_000, 10_000));
        assert_eq!(c.ledger().offer(desk, oid).unwrap().state(), OfferState::Created);
    }

    #[test]
    fn failed_payment_leaves_offer_unpaid() {
        let (mut c, desk, asset) = setup();
        let cid = c
            .create_consignment(desk, CONSIGNER, &asset, &ConsignmentTerms::negotiable(100_000))
            .unwrap();
        let oid = c.create_offer_from_consignment(desk, BUYER, cid, &request(10_000)).unwrap();
        c.approve_offer(desk, AGENT, oid).unwrap();

        let broke = Identity([5; 32]);
        let err = c.fulfill_offer_stable(desk, broke, oid).unwrap_err();
        assert!(matches!(err, OtcError::InsufficientBalance { .. }));
        let offer = c.ledger().offer(desk, oid).unwrap();
        assert!(!offer.paid);
        assert_eq!(offer.payer, None);
        assert_eq!(c.ledger().balance(&Account::Holder(AGENT), &LedgerAsset::Stable), 0);
    }

    #[test]
    fn cancel_after_listing_withdrawal_returns_tokens_to_consigner() {
        let (mut c, desk, asset) = setup();
        let cid = c
            .create_consignment(desk, CONSIGNER, &asset, &ConsignmentTerms::negotiable(100_000))
            .unwrap();
        let oid = c.create_offer_from_consignment(desk, BUYER, cid, &request(10_000)).unwrap();
        assert_eq!(c.withdraw_consignment(desk, CONSIGNER, cid), Ok(90_000));

        c.cancel_offer_with_consignment(desk, AGENT, oid).unwrap();
        let token = LedgerAsset::Token(asset.clone());
        assert_eq!(c.ledger().balance(&Account::Holder(CONSIGNER), &token), 100_000);
        let pos = c.ledger().escrow_position(desk, &asset);
        assert_eq!((pos.deposited, pos.consigned, pos.reserved), (0, 0, 0));
        assert!(!c.ledger().consignment(desk, cid).unwrap().is_active);
    }

    #[test]
    fn cancel_checks_offer_origin() {
        let (mut c, desk, asset) = setup();
        let cid = c
            .create_consignment(desk, CONSIGNER, &asset, &ConsignmentTerms::negotiable(100_000))
            .unwrap();
        let oid = c.create_offer_from_consignment(desk, BUYER, cid, &request(10_000)).unwrap();
        assert!(matches!(
            c.cancel_offer(desk, OWNER, oid),
            Err(OtcError::BadState { .. })
        ));
    }

    #[test]
    fn direct_offer_lifecycle() {
        let (mut c, desk, asset) = setup();
        c.ledger_mut()
            .mint(Account::Holder(OWNER), LedgerAsset::Token(asset.clone()), 1_000);

        let mut req = request(500);
        req.agent_commission_bps = 0;
        assert_eq!(
            c.create_offer(desk, BUYER, &asset, &req),
            Err(OtcError::InsufficientInventory { needed: 500, available: 0 })
        );

        c.deposit_tokens(desk, OWNER, &asset, 1_000).unwrap();
        let oid = c.create_offer(desk, BUYER, &asset, &req).unwrap();
        assert_eq!(c.ledger().escrow_position(desk, &asset).free(), 500);

        c.cancel_offer(desk, OWNER, oid).unwrap();
        assert_eq!(c.ledger().escrow_position(desk, &asset).free(), 1_000);
        assert_eq!(c.ledger().offer(desk, oid).unwrap().state(), OfferState::Cancelled);
    }

    #[test]
    fn native_payment_converts_at_live_price() {
        let (mut c, desk, asset) = setup();
        let cid = c
            .create_consignment(desk, CONSIGNER, &asset, &ConsignmentTerms::negotiable(100_000))
            .unwrap();
        let mut req = request(1_500);
        req.currency = Currency::Native;
        req.discount_bps = 0;
        req.agent_commission_bps = 100;
        let oid = c.create_offer_from_consignment(desk, BUYER, cid, &req).unwrap();
        c.approve_offer(desk, OWNER, oid).unwrap();
        c.ledger_mut()
            .mint(Account::Holder(BUYER), LedgerAsset::Native, 1_000_000_000_000);

        // 1 500 tokens × $10 = $15 000 at $150 per native unit = 100 native.
        let quote = c.fulfill_offer_native(desk, BUYER, oid).unwrap();
        assert_eq!(quote.amount, 100_000_000_000);
        assert_eq!(quote.commission, 1_000_000_000);
        assert_eq!(
            c.ledger().balance(&Account::Treasury(desk), &LedgerAsset::Native),
            99_000_000_000
        );
        assert!(matches!(
            c.fulfill_offer_stable(desk, BUYER, oid),
            Err(OtcError::BadState { .. })
        ));
    }
}
