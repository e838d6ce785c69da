//! # LifecycleController
//!
//! The façade every collaborator calls. Each operation:
//!
//! 1. reads committed records through the [`LedgerView`]
//! 2. validates authorization, gating and terms with the pure planes
//! 3. assembles a single [`Changeset`]
//! 4. commits it with one [`Ledger::commit`]
//!
//! A rejected operation returns before step 4, so nothing it touched is
//! written. Successful operations log at `info`, rejections at `warn` with
//! the error code.
//!
//! Operations are split by concern: desk configuration and registry here,
//! inventory in `inventory_ops`, the offer lifecycle in `offer_ops`, and
//! recovery paths in `emergency`.

use otcdesk_inventory::{PriceFeed, PricingOracle, TokenRegistry, registry};
use otcdesk_types::{
    ApproverSet, AssetId, Consignment, ConsignmentId, Desk, DeskConfig, DeskEvent, DeskId, DeskLimits, DeskPricing,
    EmergencySettings, FeedId, Identity, Offer, OfferId, OtcError, Result, TokenRegistryEntry, constants,
};
use tracing::{info, warn};

use crate::ledger::{Changeset, Ledger, LedgerView};

/// Drives every desk operation against a [`Ledger`].
pub struct LifecycleController<L, F> {
    pub(crate) ledger: L,
    pub(crate) feed: F,
}

impl<L: Ledger, F: PriceFeed> LifecycleController<L, F> {
    #[must_use]
    pub fn new(ledger: L, feed: F) -> Self {
        Self { ledger, feed }
    }

    #[must_use]
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    #[must_use]
    pub fn feed(&self) -> &F {
        &self.feed
    }

    pub fn feed_mut(&mut self) -> &mut F {
        &mut self.feed
    }

    // -----------------------------------------------------------------
    // Shared helpers
    // -----------------------------------------------------------------

    pub(crate) fn load_desk(&self, id: DeskId) -> Result<Desk> {
        self.ledger.desk(id).ok_or(OtcError::DeskNotFound(id))
    }

    pub(crate) fn load_entry(&self, desk: DeskId, asset: &AssetId) -> Result<TokenRegistryEntry> {
        self.ledger
            .registry_entry(desk, asset)
            .ok_or_else(|| OtcError::TokenNotRegistered(asset.clone()))
    }

    pub(crate) fn load_consignment(&self, desk: DeskId, id: ConsignmentId) -> Result<Consignment> {
        self.ledger
            .consignment(desk, id)
            .ok_or(OtcError::ConsignmentNotFound(id))
    }

    pub(crate) fn load_offer(&self, desk: DeskId, id: OfferId) -> Result<Offer> {
        self.ledger.offer(desk, id).ok_or(OtcError::OfferNotFound(id))
    }

    pub(crate) fn oracle<'a>(&'a self, pricing: &'a DeskPricing) -> PricingOracle<'a, F> {
        PricingOracle::new(pricing, &self.feed)
    }

    /// Run one operation, logging a rejection with its error code.
    pub(crate) fn run<T>(
        &mut self,
        op: &'static str,
        desk: DeskId,
        body: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let result = body(self);
        if let Err(err) = &result {
            warn!(%desk, op, code = err.code(), error = %err, "Operation rejected");
        }
        result
    }

    /// Owner-gated desk update committed with one event.
    pub(crate) fn update_desk(
        &mut self,
        op: &'static str,
        desk_id: DeskId,
        caller: Identity,
        apply: impl FnOnce(&mut Desk) -> Result<DeskEvent>,
    ) -> Result<()> {
        self.run(op, desk_id, |this| {
            let mut desk = this.load_desk(desk_id)?;
            desk.require_owner(&caller)?;
            let event = apply(&mut desk)?;
            desk.touch(this.ledger.now());
            this.ledger
                .commit(Changeset::new(desk_id).with_desk(desk).with_event(event))?;
            info!(desk = %desk_id, op, "Desk updated");
            Ok(())
        })
    }

    // -----------------------------------------------------------------
    // Desk lifecycle and configuration
    // -----------------------------------------------------------------

    /// Open a new desk owned by `owner`.
    ///
    /// # Errors
    /// [`OtcError::Configuration`] for an invalid config or a zero identity,
    /// plus any limit error from [`DeskConfig::validate`].
    pub fn create_desk(&mut self, owner: Identity, agent: Identity, config: &DeskConfig) -> Result<DeskId> {
        let id = DeskId::new();
        self.run("create_desk", id, |this| {
            config.validate()?;
            if owner.is_zero() || agent.is_zero() {
                return Err(OtcError::Configuration("owner and agent must be set".into()));
            }
            let now = this.ledger.now();
            let desk = Desk {
                id,
                owner,
                agent,
                approvers: ApproverSet::new(),
                required_approvals: config.required_approvals,
                paused: false,
                restrict_fulfill: config.restrict_fulfill,
                limits: config.limits(),
                pricing: DeskPricing {
                    use_manual_prices: config.use_manual_prices,
                    max_price_age_secs: config.max_price_age_secs,
                    ..DeskPricing::default()
                },
                stable_decimals: config.stable_decimals,
                emergency: EmergencySettings {
                    refund_enabled: false,
                    refund_deadline_secs: config.emergency_refund_deadline_secs,
                },
                next_consignment_id: 1,
                next_offer_id: 1,
                created_at: now,
                last_activity_at: now,
            };
            this.ledger.commit(
                Changeset::new(id)
                    .with_desk(desk)
                    .with_event(DeskEvent::DeskCreated { owner, agent }),
            )?;
            info!(desk = %id, %owner, %agent, "Desk created");
            Ok(id)
        })
    }

    /// # Errors
    /// [`OtcError::NotOwner`], or the limit errors of [`DeskLimits::validate`].
    pub fn set_limits(&mut self, desk: DeskId, caller: Identity, limits: DeskLimits) -> Result<()> {
        self.update_desk("set_limits", desk, caller, |d| {
            limits.validate()?;
            d.limits = limits.clone();
            Ok(DeskEvent::LimitsUpdated { limits })
        })
    }

    /// # Errors
    /// [`OtcError::NotOwner`]; [`OtcError::Configuration`] for a zero identity.
    pub fn set_agent(&mut self, desk: DeskId, caller: Identity, agent: Identity) -> Result<()> {
        self.update_desk("set_agent", desk, caller, |d| {
            if agent.is_zero() {
                return Err(OtcError::Configuration("agent must be set".into()));
            }
            d.agent = agent;
            Ok(DeskEvent::AgentUpdated { agent })
        })
    }

    /// Add or remove an explicit approver.
    ///
    /// # Errors
    /// [`OtcError::NotOwner`]; [`OtcError::TooManyApprovers`] past capacity.
    pub fn set_approver(&mut self, desk: DeskId, caller: Identity, approver: Identity, allowed: bool) -> Result<()> {
        self.update_desk("set_approver", desk, caller, |d| {
            if allowed {
                d.approvers.insert(approver).map_err(|full| OtcError::TooManyApprovers {
                    max: full.capacity,
                })?;
            } else {
                d.approvers.remove(&approver);
            }
            Ok(DeskEvent::ApproverUpdated { approver, allowed })
        })
    }

    /// # Errors
    /// [`OtcError::NotOwner`]; [`OtcError::AmountRange`] outside `[1, 32]`.
    pub fn set_required_approvals(&mut self, desk: DeskId, caller: Identity, required: u8) -> Result<()> {
        self.update_desk("set_required_approvals", desk, caller, |d| {
            if required == 0 || usize::from(required) > constants::MAX_APPROVERS {
                return Err(OtcError::amount_range(format!(
                    "required approvals {required} outside [1, {}]",
                    constants::MAX_APPROVERS
                )));
            }
            d.required_approvals = required;
            Ok(DeskEvent::RequiredApprovalsUpdated { required })
        })
    }

    /// # Errors
    /// [`OtcError::NotOwner`].
    pub fn set_restrict_fulfill(&mut self, desk: DeskId, caller: Identity, enabled: bool) -> Result<()> {
        self.update_desk("set_restrict_fulfill", desk, caller, |d| {
            d.restrict_fulfill = enabled;
            Ok(DeskEvent::RestrictFulfillUpdated { enabled })
        })
    }

    /// Halt creation and payment. Claims and cancellations stay open.
    ///
    /// # Errors
    /// [`OtcError::NotOwner`].
    pub fn pause(&mut self, desk: DeskId, caller: Identity) -> Result<()> {
        self.update_desk("pause", desk, caller, |d| {
            d.paused = true;
            Ok(DeskEvent::PauseUpdated { paused: true })
        })
    }

    /// # Errors
    /// [`OtcError::NotOwner`].
    pub fn unpause(&mut self, desk: DeskId, caller: Identity) -> Result<()> {
        self.update_desk("unpause", desk, caller, |d| {
            d.paused = false;
            Ok(DeskEvent::PauseUpdated { paused: false })
        })
    }

    /// # Errors
    /// [`OtcError::NotOwner`]; [`OtcError::Configuration`] for a zero identity.
    pub fn transfer_owner(&mut self, desk: DeskId, caller: Identity, owner: Identity) -> Result<()> {
        self.update_desk("transfer_owner", desk, caller, |d| {
            if owner.is_zero() {
                return Err(OtcError::Configuration("owner must be set".into()));
            }
            let previous = d.owner;
            d.owner = owner;
            Ok(DeskEvent::OwnershipTransferred { previous, owner })
        })
    }

    /// # Errors
    /// [`OtcError::NotOwner`].
    pub fn set_use_manual_prices(&mut self, desk: DeskId, caller: Identity, use_manual_prices: bool) -> Result<()> {
        self.update_desk("set_use_manual_prices", desk, caller, |d| {
            d.pricing.use_manual_prices = use_manual_prices;
            Ok(DeskEvent::PricingModeUpdated { use_manual_prices })
        })
    }

    /// # Errors
    /// [`OtcError::NotOwner`].
    pub fn set_native_feed(&mut self, desk: DeskId, caller: Identity, feed: FeedId) -> Result<()> {
        self.update_desk("set_native_feed", desk, caller, |d| {
            if d.pricing.native_feed != Some(feed) {
                d.pricing.native_feed = Some(feed);
                d.pricing.native_last_round = None;
            }
            Ok(DeskEvent::NativeFeedUpdated { feed })
        })
    }

    // -----------------------------------------------------------------
    // Token registry and prices
    // -----------------------------------------------------------------

    /// Register `asset` on the desk, or overwrite its feed (owner only).
    ///
    /// # Errors
    /// [`OtcError::NotOwner`] on re-registration by anyone else,
    /// [`OtcError::AmountRange`] for decimals above 18.
    pub fn register_token(
        &mut self,
        desk_id: DeskId,
        caller: Identity,
        asset: AssetId,
        feed: Option<FeedId>,
        decimals: u8,
    ) -> Result<()> {
        self.run("register_token", desk_id, |this| {
            let mut desk = this.load_desk(desk_id)?;
            let now = this.ledger.now();
            let existing = this.ledger.registry_entry(desk_id, &asset);
            let entry = TokenRegistry::new(&desk).register(existing, caller, asset.clone(), feed, decimals, now)?;
            let event = DeskEvent::TokenRegistered {
                asset: entry.asset.clone(),
                decimals: entry.decimals,
                feed: entry.feed,
            };
            desk.touch(now);
            this.ledger.commit(
                Changeset::new(desk_id)
                    .with_desk(desk)
                    .with_registry(entry)
                    .with_event(event),
            )?;
            info!(desk = %desk_id, %asset, decimals, "Token registered");
            Ok(())
        })
    }

    /// # Errors
    /// [`OtcError::TokenNotRegistered`], [`OtcError::NotOwner`].
    pub fn set_token_feed(&mut self, desk_id: DeskId, caller: Identity, asset: &AssetId, feed: FeedId) -> Result<()> {
        self.run("set_token_feed", desk_id, |this| {
            let desk = this.load_desk(desk_id)?;
            let mut entry = this.load_entry(desk_id, asset)?;
            TokenRegistry::new(&desk).set_feed(&mut entry, caller, feed)?;
            this.ledger.commit(
                Changeset::new(desk_id)
                    .with_registry(entry)
                    .with_event(DeskEvent::TokenFeedUpdated {
                        asset: asset.clone(),
                        feed,
                    }),
            )?;
            info!(desk = %desk_id, %asset, %feed, "Token feed updated");
            Ok(())
        })
    }

    /// Pin a manual USD price for `asset`, 8 implied decimals.
    ///
    /// # Errors
    /// [`OtcError::TokenNotRegistered`], [`OtcError::NotOwner`],
    /// [`OtcError::BadPrice`].
    pub fn set_manual_token_price(
        &mut self,
        desk_id: DeskId,
        caller: Identity,
        asset: &AssetId,
        price_8d: u64,
    ) -> Result<()> {
        self.run("set_manual_token_price", desk_id, |this| {
            let desk = this.load_desk(desk_id)?;
            let mut entry = this.load_entry(desk_id, asset)?;
            let now = this.ledger.now();
            let price = TokenRegistry::new(&desk).set_manual_price(&mut entry, caller, price_8d, now)?;
            this.ledger.commit(
                Changeset::new(desk_id)
                    .with_registry(entry)
                    .with_event(DeskEvent::PricesUpdated {
                        asset: asset.clone(),
                        token_price: price,
                        native_price: None,
                        max_price_age_secs: desk.pricing.max_price_age_secs,
                    }),
            )?;
            info!(desk = %desk_id, %asset, price_8d, "Manual token price set");
            Ok(())
        })
    }

    /// Pin token and native prices together and reset the feed age bound.
    ///
    /// # Errors
    /// [`OtcError::TokenNotRegistered`], [`OtcError::NotOwner`],
    /// [`OtcError::AmountRange`] for a negative `max_age_secs`,
    /// [`OtcError::BadPrice`] for either price.
    pub fn set_prices(
        &mut self,
        desk_id: DeskId,
        caller: Identity,
        asset: &AssetId,
        token_price_8d: u64,
        native_price_8d: u64,
        max_age_secs: i64,
    ) -> Result<()> {
        self.run("set_prices", desk_id, |this| {
            let mut desk = this.load_desk(desk_id)?;
            let mut entry = this.load_entry(desk_id, asset)?;
            let now = this.ledger.now();
            desk.require_owner(&caller)?;
            if max_age_secs < 0 {
                return Err(OtcError::amount_range(format!("max price age {max_age_secs}s is negative")));
            }
            let token_price = TokenRegistry::new(&desk).set_manual_price(&mut entry, caller, token_price_8d, now)?;
            let native_price = registry::native_price_8d(native_price_8d)?;
            desk.pricing.native_manual_price = Some(native_price);
            desk.pricing.native_price_set_at = now;
            desk.pricing.max_price_age_secs = max_age_secs;
            desk.touch(now);
            this.ledger.commit(
                Changeset::new(desk_id)
                    .with_desk(desk)
                    .with_registry(entry)
                    .with_event(DeskEvent::PricesUpdated {
                        asset: asset.clone(),
                        token_price,
                        native_price: Some(native_price),
                        max_price_age_secs: max_age_secs,
                    }),
            )?;
            info!(desk = %desk_id, %asset, token_price_8d, native_price_8d, max_age_secs, "Prices set");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryLedger, LedgerConfig};
    use otcdesk_inventory::StaticPriceFeed;
    use rust_decimal::Decimal;

    const OWNER: Identity = Identity([1; 32]);
    const AGENT: Identity = Identity([2; 32]);
    const STRANGER: Identity = Identity([8; 32]);

    fn controller() -> (LifecycleController<InMemoryLedger, StaticPriceFeed>, DeskId) {
        let mut ledger = InMemoryLedger::new(LedgerConfig::default());
        ledger.set_time(1_000);
        let mut c = LifecycleController::new(ledger, StaticPriceFeed::new());
        let desk = c.create_desk(OWNER, AGENT, &DeskConfig::default()).unwrap();
        (c, desk)
    }

    #[test]
    fn create_desk_applies_config() {
        let (c, id) = controller();
        let desk = c.ledger().desk(id).unwrap();
        assert_eq!(desk.owner, OWNER);
        assert_eq!(desk.agent, AGENT);
        assert_eq!(desk.next_offer_id, 1);
        assert_eq!(desk.created_at, 1_000);
        assert_eq!(desk.limits, DeskConfig::default().limits());
    }

    #[test]
    fn create_desk_rejects_zero_owner() {
        let mut c = LifecycleController::new(InMemoryLedger::default(), StaticPriceFeed::new());
        assert!(matches!(
            c.create_desk(Identity::ZERO, AGENT, &DeskConfig::default()),
            Err(OtcError::Configuration(_))
        ));
    }

    #[test]
    fn setters_are_owner_only() {
        let (mut c, desk) = controller();
        assert_eq!(c.pause(desk, STRANGER), Err(OtcError::NotOwner));
        assert_eq!(c.set_agent(desk, AGENT, STRANGER), Err(OtcError::NotOwner));
        assert_eq!(c.set_restrict_fulfill(desk, AGENT, true), Err(OtcError::NotOwner));
        assert!(!c.ledger().desk(desk).unwrap().paused);
    }

    #[test]
    fn approver_management() {
        let (mut c, desk) = controller();
        c.set_approver(desk, OWNER, STRANGER, true).unwrap();
        assert!(c.ledger().desk(desk).unwrap().is_approver(&STRANGER));
        c.set_approver(desk, OWNER, STRANGER, false).unwrap();
        assert!(!c.ledger().desk(desk).unwrap().is_approver(&STRANGER));

        for i in 0..constants::MAX_APPROVERS {
            let byte = u8::try_from(i + 10).unwrap();
            c.set_approver(desk, OWNER, Identity([byte; 32]), true).unwrap();
        }
        assert_eq!(
            c.set_approver(desk, OWNER, Identity([200; 32]), true),
            Err(OtcError::TooManyApprovers { max: constants::MAX_APPROVERS })
        );
    }

    #[test]
    fn required_approvals_bounds() {
        let (mut c, desk) = controller();
        assert!(matches!(
            c.set_required_approvals(desk, OWNER, 0),
            Err(OtcError::AmountRange { .. })
        ));
        assert!(matches!(
            c.set_required_approvals(desk, OWNER, 33),
            Err(OtcError::AmountRange { .. })
        ));
        c.set_required_approvals(desk, OWNER, 2).unwrap();
        assert_eq!(c.ledger().desk(desk).unwrap().required_approvals, 2);
    }

    #[test]
    fn ownership_transfer() {
        let (mut c, desk) = controller();
        c.transfer_owner(desk, OWNER, STRANGER).unwrap();
        assert_eq!(c.pause(desk, OWNER), Err(OtcError::NotOwner));
        c.pause(desk, STRANGER).unwrap();
    }

    #[test]
    fn invalid_limits_are_rejected() {
        let (mut c, desk) = controller();
        let mut limits = c.ledger().desk(desk).unwrap().limits;
        limits.quote_expiry_secs = 10;
        assert!(matches!(
            c.set_limits(desk, OWNER, limits),
            Err(OtcError::AmountRange { .. })
        ));
    }

    #[test]
    fn registry_and_prices() {
        let (mut c, desk) = controller();
        let asset = AssetId::new("ELIZA");
        c.register_token(desk, STRANGER, asset.clone(), None, 9).unwrap();
        // Re-registration is owner-only.
        assert_eq!(
            c.register_token(desk, STRANGER, asset.clone(), None, 9),
            Err(OtcError::NotOwner)
        );

        c.set_prices(desk, OWNER, &asset, 1_000_000_000, 15_000_000_000, 600).unwrap();
        let entry = c.ledger().registry_entry(desk, &asset).unwrap();
        assert_eq!(entry.manual_price, Some(Decimal::from(10)));
        let d = c.ledger().desk(desk).unwrap();
        assert_eq!(d.pricing.native_manual_price, Some(Decimal::from(150)));
        assert_eq!(d.pricing.max_price_age_secs, 600);

        assert!(matches!(
            c.set_manual_token_price(desk, OWNER, &asset, 0),
            Err(OtcError::BadPrice { .. })
        ));
        assert!(matches!(
            c.set_prices(desk, OWNER, &asset, 1_000_000_000, 1, 600),
            Err(OtcError::BadPrice { .. })
        ));
        assert!(matches!(
            c.set_prices(desk, OWNER, &asset, 1_000_000_000, 15_000_000_000, -1),
            Err(OtcError::AmountRange { .. })
        ));
        assert_eq!(
            c.set_manual_token_price(desk, OWNER, &AssetId::new("NOPE"), 1),
            Err(OtcError::TokenNotRegistered(AssetId::new("NOPE")))
        );
    }

    #[test]
    fn rejected_operations_emit_no_events() {
        let (mut c, desk) = controller();
        let before = c.ledger().journal().len();
        let _ = c.pause(desk, STRANGER);
        assert_eq!(c.ledger().journal().len(), before);
        c.pause(desk, OWNER).unwrap();
        assert_eq!(c.ledger().journal().len(), before + 1);
    }
}
