//! Events emitted by committed operations.
//!
//! Each event carries the entity id and the new field values so an external
//! indexer can mirror desk state. Nothing in the engine reads them back.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AssetId, ConsignmentId, Currency, DeskId, DeskLimits, FeedId, Identity, OfferId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeskEvent {
    DeskCreated {
        owner: Identity,
        agent: Identity,
    },
    OwnershipTransferred {
        previous: Identity,
        owner: Identity,
    },
    AgentUpdated {
        agent: Identity,
    },
    ApproverUpdated {
        approver: Identity,
        allowed: bool,
    },
    RequiredApprovalsUpdated {
        required: u8,
    },
    LimitsUpdated {
        limits: DeskLimits,
    },
    RestrictFulfillUpdated {
        enabled: bool,
    },
    PauseUpdated {
        paused: bool,
    },
    PricingModeUpdated {
        use_manual_prices: bool,
    },
    TokenRegistered {
        asset: AssetId,
        decimals: u8,
        feed: Option<FeedId>,
    },
    TokenFeedUpdated {
        asset: AssetId,
        feed: FeedId,
    },
    NativeFeedUpdated {
        feed: FeedId,
    },
    PricesUpdated {
        asset: AssetId,
        token_price: Decimal,
        native_price: Option<Decimal>,
        max_price_age_secs: i64,
    },
    ConsignmentCreated {
        consignment: ConsignmentId,
        consigner: Identity,
        asset: AssetId,
        amount: u64,
    },
    ConsignmentWithdrawn {
        consignment: ConsignmentId,
        returned: u64,
    },
    TokensDeposited {
        asset: AssetId,
        amount: u64,
    },
    TokensWithdrawn {
        asset: AssetId,
        amount: u64,
        to: Identity,
    },
    StableWithdrawn {
        amount: u64,
        to: Identity,
    },
    NativeWithdrawn {
        amount: u64,
        to: Identity,
    },
    OfferCreated {
        offer: OfferId,
        consignment: Option<ConsignmentId>,
        beneficiary: Identity,
        asset: AssetId,
        token_amount: u64,
        discount_bps: u16,
        currency: Currency,
        price_usd_per_token: Decimal,
        consignment_remaining: Option<u64>,
    },
    OfferApproved {
        offer: OfferId,
        approver: Option<Identity>,
        approvals: usize,
        approved: bool,
    },
    OfferCancelled {
        offer: OfferId,
        by: Identity,
        consignment_remaining: Option<u64>,
    },
    OfferPaid {
        offer: OfferId,
        payer: Identity,
        amount: u64,
        currency: Currency,
    },
    AgentCommissionPaid {
        offer: OfferId,
        agent: Identity,
        amount: u64,
        currency: Currency,
    },
    TokensClaimed {
        offer: OfferId,
        beneficiary: Identity,
        amount: u64,
    },
    EmergencyRefundUpdated {
        enabled: bool,
        deadline_secs: i64,
    },
    EmergencyRefunded {
        offer: OfferId,
        payer: Identity,
        amount: u64,
        currency: Currency,
    },
    EmergencyWithdrawn {
        offer: OfferId,
        beneficiary: Identity,
        amount: u64,
    },
}

impl DeskEvent {
    /// Short name used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DeskCreated { .. } => "desk_created",
            Self::OwnershipTransferred { .. } => "ownership_transferred",
            Self::AgentUpdated { .. } => "agent_updated",
            Self::ApproverUpdated { .. } => "approver_updated",
            Self::RequiredApprovalsUpdated { .. } => "required_approvals_updated",
            Self::LimitsUpdated { .. } => "limits_updated",
            Self::RestrictFulfillUpdated { .. } => "restrict_fulfill_updated",
            Self::PauseUpdated { .. } => "pause_updated",
            Self::PricingModeUpdated { .. } => "pricing_mode_updated",
            Self::TokenRegistered { .. } => "token_registered",
            Self::TokenFeedUpdated { .. } => "token_feed_updated",
            Self::NativeFeedUpdated { .. } => "native_feed_updated",
            Self::PricesUpdated { .. } => "prices_updated",
            Self::ConsignmentCreated { .. } => "consignment_created",
            Self::ConsignmentWithdrawn { .. } => "consignment_withdrawn",
            Self::TokensDeposited { .. } => "tokens_deposited",
            Self::TokensWithdrawn { .. } => "tokens_withdrawn",
            Self::StableWithdrawn { .. } => "stable_withdrawn",
            Self::NativeWithdrawn { .. } => "native_withdrawn",
            Self::OfferCreated { .. } => "offer_created",
            Self::OfferApproved { .. } => "offer_approved",
            Self::OfferCancelled { .. } => "offer_cancelled",
            Self::OfferPaid { .. } => "offer_paid",
            Self::AgentCommissionPaid { .. } => "agent_commission_paid",
            Self::TokensClaimed { .. } => "tokens_claimed",
            Self::EmergencyRefundUpdated { .. } => "emergency_refund_updated",
            Self::EmergencyRefunded { .. } => "emergency_refunded",
            Self::EmergencyWithdrawn { .. } => "emergency_withdrawn",
        }
    }
}

/// An event stamped with its desk and commit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub desk: DeskId,
    pub at: i64,
    pub event: DeskEvent,
}
