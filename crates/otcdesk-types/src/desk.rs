//! The desk record: one trading venue with its roles, limits and pricing mode.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ApproverSet, ConsignmentId, DeskId, FeedId, Identity, OfferId, OtcError, Result, constants};

/// Global per-desk deal limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeskLimits {
    /// Minimum gross notional of an offer, in USD.
    pub min_usd: Decimal,
    /// Maximum gross notional of an offer, in USD. Zero means unlimited.
    pub max_usd: Decimal,
    /// Largest token amount of a direct desk offer (raw units).
    pub max_token_per_order: u64,
    /// Validity window of a direct offer, and fallback for consignments that
    /// leave their own execution window unset.
    pub quote_expiry_secs: i64,
    /// Minimum lockup of a direct offer.
    pub default_unlock_delay_secs: i64,
    /// Maximum lockup of a direct offer.
    pub max_lockup_secs: i64,
}

impl DeskLimits {
    /// Check internal consistency.
    ///
    /// # Errors
    /// [`OtcError::AmountRange`] for any bound out of range, windows
    /// included.
    pub fn validate(&self) -> Result<()> {
        if self.min_usd <= Decimal::ZERO {
            return Err(OtcError::amount_range("min_usd must be positive"));
        }
        if !self.max_usd.is_zero() && self.max_usd < self.min_usd {
            return Err(OtcError::amount_range("max_usd below min_usd"));
        }
        if self.max_token_per_order == 0 {
            return Err(OtcError::amount_range("max_token_per_order must be positive"));
        }
        if self.quote_expiry_secs < constants::MIN_QUOTE_EXPIRY_SECS {
            return Err(OtcError::amount_range(format!(
                "quote expiry {}s below {}s",
                self.quote_expiry_secs,
                constants::MIN_QUOTE_EXPIRY_SECS
            )));
        }
        if self.max_lockup_secs < 0
            || self.default_unlock_delay_secs < 0
            || self.default_unlock_delay_secs > self.max_lockup_secs
        {
            return Err(OtcError::amount_range(format!(
                "unlock delay {}s outside [0, {}s]",
                self.default_unlock_delay_secs, self.max_lockup_secs
            )));
        }
        Ok(())
    }
}

/// How the desk resolves prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeskPricing {
    /// Use manually pinned prices instead of feeds.
    pub use_manual_prices: bool,
    /// Maximum feed price age.
    pub max_price_age_secs: i64,
    /// Feed for the native payment unit.
    pub native_feed: Option<FeedId>,
    /// Manually pinned native/USD price.
    pub native_manual_price: Option<Decimal>,
    /// When the manual native price was set.
    pub native_price_set_at: i64,
    /// Highest native feed round consumed so far.
    pub native_last_round: Option<u64>,
}

impl Default for DeskPricing {
    fn default() -> Self {
        Self {
            use_manual_prices: false,
            max_price_age_secs: constants::DEFAULT_MAX_PRICE_AGE_SECS,
            native_feed: None,
            native_manual_price: None,
            native_price_set_at: 0,
            native_last_round: None,
        }
    }
}

/// Emergency refund switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencySettings {
    pub refund_enabled: bool,
    pub refund_deadline_secs: i64,
}

impl Default for EmergencySettings {
    fn default() -> Self {
        Self {
            refund_enabled: false,
            refund_deadline_secs: constants::DEFAULT_EMERGENCY_REFUND_DEADLINE_SECS,
        }
    }
}

/// One trading venue.
///
/// Created once by its owner, mutated only by owner-gated setters and by the
/// id counters, never destroyed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Desk {
    pub id: DeskId,
    pub owner: Identity,
    pub agent: Identity,
    /// Explicit approvers. Owner and agent approve implicitly.
    pub approvers: ApproverSet,
    /// Distinct approvals an offer needs before it is payable.
    pub required_approvals: u8,
    pub paused: bool,
    /// Only the offer beneficiary may pay.
    pub restrict_fulfill: bool,
    pub limits: DeskLimits,
    pub pricing: DeskPricing,
    /// Decimals of the stable payment unit.
    pub stable_decimals: u8,
    pub emergency: EmergencySettings,
    pub next_consignment_id: u64,
    pub next_offer_id: u64,
    pub created_at: i64,
    pub last_activity_at: i64,
}

impl Desk {
    #[must_use]
    pub fn is_owner(&self, who: &Identity) -> bool {
        self.owner == *who
    }

    /// Owner, agent or explicit approver.
    #[must_use]
    pub fn is_approver(&self, who: &Identity) -> bool {
        self.owner == *who || self.agent == *who || self.approvers.contains(who)
    }

    /// # Errors
    /// [`OtcError::NotOwner`] unless `who` owns the desk.
    pub fn require_owner(&self, who: &Identity) -> Result<()> {
        if self.is_owner(who) {
            Ok(())
        } else {
            Err(OtcError::NotOwner)
        }
    }

    /// # Errors
    /// [`OtcError::Paused`] while the desk is paused.
    pub fn require_active(&self) -> Result<()> {
        if self.paused {
            Err(OtcError::Paused)
        } else {
            Ok(())
        }
    }

    /// Take the next consignment id.
    ///
    /// # Errors
    /// [`OtcError::Overflow`] if the counter is exhausted.
    pub fn allocate_consignment_id(&mut self) -> Result<ConsignmentId> {
        let id = self.next_consignment_id;
        self.next_consignment_id = id.checked_add(1).ok_or(OtcError::Overflow)?;
        Ok(ConsignmentId(id))
    }

    /// Take the next offer id.
    ///
    /// # Errors
    /// [`OtcError::Overflow`] if the counter is exhausted.
    pub fn allocate_offer_id(&mut self) -> Result<OfferId> {
        let id = self.next_offer_id;
        self.next_offer_id = id.checked_add(1).ok_or(OtcError::Overflow)?;
        Ok(OfferId(id))
    }

    /// Record activity at `now`.
    pub fn touch(&mut self, now: i64) {
        self.last_activity_at = self.last_activity_at.max(now);
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl Desk {
    /// A desk with sane limits: $100 floor, 60s expiry, manual prices.
    #[must_use]
    pub fn dummy(owner: Identity, agent: Identity) -> Self {
        Self {
            id: DeskId::new(),
            owner,
            agent,
            approvers: ApproverSet::new(),
            required_approvals: 1,
            paused: false,
            restrict_fulfill: false,
            limits: DeskLimits {
                min_usd: Decimal::from(100),
                max_usd: Decimal::ZERO,
                max_token_per_order: constants::DEFAULT_MAX_TOKEN_PER_ORDER,
                quote_expiry_secs: 60,
                default_unlock_delay_secs: 0,
                max_lockup_secs: constants::DEFAULT_MAX_LOCKUP_SECS,
            },
            pricing: DeskPricing {
                use_manual_prices: true,
                ..DeskPricing::default()
            },
            stable_decimals: constants::DEFAULT_STABLE_DECIMALS,
            emergency: EmergencySettings::default(),
            next_consignment_id: 1,
            next_offer_id: 1,
            created_at: 0,
            last_activity_at: 0,
        }
    }
}
