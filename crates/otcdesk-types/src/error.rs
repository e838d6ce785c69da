//! Error types for the OTC desk engine.
//!
//! All errors use the `OTC_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Commercial terms (amounts, discounts, commission, lockup)
//! - 2xx: Authorization
//! - 3xx: Offer / consignment lifecycle
//! - 4xx: Pricing
//! - 5xx: Inventory and escrow
//! - 6xx: Record lookup
//! - 9xx: General / internal errors
//!
//! Every error is a rejection of one operation. Validation always runs before
//! any record write or transfer, so a returned error means nothing changed.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{AssetId, ConsignmentId, DeskId, OfferId};

/// Central error enum for all desk operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OtcError {
    // =================================================================
    // Terms Errors (1xx)
    // =================================================================
    /// Zero or out-of-bound amount, or a min > max pair.
    #[error("OTC_ERR_100: Amount out of range: {reason}")]
    AmountRange { reason: String },

    /// Discount above 100% or outside the consignment's bounds.
    #[error("OTC_ERR_101: Invalid discount: {reason}")]
    Discount { reason: String },

    /// Agent commission outside the permitted band.
    #[error("OTC_ERR_102: Commission {bps} bps out of range")]
    CommissionRange { bps: u16 },

    /// Lockup outside the permitted window.
    #[error("OTC_ERR_103: Lockup out of range: {reason}")]
    LockupRange { reason: String },

    /// Deal notional below the desk floor.
    #[error("OTC_ERR_104: Notional ${notional} below desk minimum ${min}")]
    MinUsd { notional: Decimal, min: Decimal },

    /// Arithmetic overflow in amount or price math.
    #[error("OTC_ERR_105: Arithmetic overflow")]
    Overflow,

    // =================================================================
    // Authorization Errors (2xx)
    // =================================================================
    /// Caller is not the owner of the desk or consignment.
    #[error("OTC_ERR_200: Caller is not the owner")]
    NotOwner,

    /// Caller is not an approver of this desk.
    #[error("OTC_ERR_201: Caller is not an approver")]
    NotApprover,

    /// Caller may not perform this operation on this record.
    #[error("OTC_ERR_202: Caller not authorized")]
    NotAuthorized,

    /// Desk restricts fulfillment to the offer beneficiary.
    #[error("OTC_ERR_203: Fulfillment restricted to the beneficiary")]
    FulfillRestricted,

    /// Private consignment and the caller is not on its allow-list.
    #[error("OTC_ERR_204: Caller not on the consignment allow-list")]
    NotAllowlisted,

    /// The approver set is full.
    #[error("OTC_ERR_205: Too many approvers (max {max})")]
    TooManyApprovers { max: usize },

    // =================================================================
    // Lifecycle Errors (3xx)
    // =================================================================
    /// Operation is invalid for the record's current state.
    #[error("OTC_ERR_300: Bad state: {reason}")]
    BadState { reason: String },

    /// The desk is paused.
    #[error("OTC_ERR_301: Desk is paused")]
    Paused,

    /// This approver already approved the offer, or the offer is approved.
    #[error("OTC_ERR_302: Offer already approved")]
    AlreadyApproved,

    /// Payment attempted before approval quorum.
    #[error("OTC_ERR_303: Offer not approved")]
    NotApproved,

    /// Beneficiary cancel attempted before the offer expired.
    #[error("OTC_ERR_304: Offer not expired until {expires_at}")]
    NotExpired { expires_at: i64 },

    /// Payment attempted after the offer expired.
    #[error("OTC_ERR_305: Offer expired at {expires_at}")]
    Expired { expires_at: i64 },

    /// Claim attempted before the lockup elapsed.
    #[error("OTC_ERR_306: Tokens locked until {unlock_time}")]
    Locked { unlock_time: i64 },

    /// Emergency refund requested before its window opened.
    #[error("OTC_ERR_307: Too early for emergency refund")]
    TooEarlyForRefund,

    // =================================================================
    // Pricing Errors (4xx)
    // =================================================================
    /// Feed price older than the desk's maximum age.
    #[error("OTC_ERR_400: Stale price: age {age}s exceeds {max_age}s")]
    StalePrice { age: i64, max_age: i64 },

    /// Feed round regressed since the last observed read.
    #[error("OTC_ERR_401: Stale round: reported {reported} < last seen {last_seen}")]
    StaleRound { last_seen: u64, reported: u64 },

    /// Feed reported a price of zero or below.
    #[error("OTC_ERR_402: Non-positive price")]
    NonPositivePrice,

    /// No price available (manual price unset or feed silent).
    #[error("OTC_ERR_403: No price available")]
    NoPrice,

    /// Price outside accepted bounds.
    #[error("OTC_ERR_404: Bad price: {reason}")]
    BadPrice { reason: String },

    /// Current price moved too far from the offer's snapshot.
    #[error("OTC_ERR_405: Price moved from {snapshot} to {current}, bound {max_bps} bps")]
    PriceDeviation {
        snapshot: Decimal,
        current: Decimal,
        max_bps: u16,
    },

    /// Feed mode is active but no feed is configured.
    #[error("OTC_ERR_406: Price feed not configured")]
    FeedNotConfigured,

    // =================================================================
    // Inventory / Escrow Errors (5xx)
    // =================================================================
    /// Not enough free desk inventory.
    #[error("OTC_ERR_500: Insufficient inventory: need {needed}, have {available}")]
    InsufficientInventory { needed: u64, available: u64 },

    /// A ledger account cannot cover a transfer.
    #[error("OTC_ERR_501: Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: u64, available: u64 },

    /// Escrow counters would violate `reserved + consigned <= deposited`.
    #[error("OTC_ERR_502: Escrow invariant violated: {reason}")]
    EscrowInvariant { reason: String },

    // =================================================================
    // Record Errors (6xx)
    // =================================================================
    #[error("OTC_ERR_600: Desk not found: {0}")]
    DeskNotFound(DeskId),

    #[error("OTC_ERR_601: Consignment not found: {0}")]
    ConsignmentNotFound(ConsignmentId),

    #[error("OTC_ERR_602: Offer not found: {0}")]
    OfferNotFound(OfferId),

    #[error("OTC_ERR_603: Token not registered: {0}")]
    TokenNotRegistered(AssetId),

    // =================================================================
    // General Errors (9xx)
    // =================================================================
    /// Configuration error.
    #[error("OTC_ERR_900: Configuration error: {0}")]
    Configuration(String),

    /// Serialization / deserialization error.
    #[error("OTC_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// The ledger adapter failed to commit.
    #[error("OTC_ERR_902: Ledger error: {0}")]
    Ledger(String),

    /// Catch-all internal error.
    #[error("OTC_ERR_999: Internal error: {0}")]
    Internal(String),
}

impl OtcError {
    /// Bare taxonomy name surfaced to callers.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AmountRange { .. } => "AmountRange",
            Self::Discount { .. } => "Discount",
            Self::CommissionRange { .. } => "CommissionRange",
            Self::LockupRange { .. } => "LockupRange",
            Self::MinUsd { .. } => "MinUsd",
            Self::Overflow => "Overflow",
            Self::NotOwner => "NotOwner",
            Self::NotApprover => "NotApprover",
            Self::NotAuthorized => "NotAuthorized",
            Self::FulfillRestricted => "FulfillRestricted",
            Self::NotAllowlisted => "NotAllowlisted",
            Self::TooManyApprovers { .. } => "TooManyApprovers",
            Self::BadState { .. } => "BadState",
            Self::Paused => "Paused",
            Self::AlreadyApproved => "AlreadyApproved",
            Self::NotApproved => "NotApproved",
            Self::NotExpired { .. } => "NotExpired",
            Self::Expired { .. } => "Expired",
            Self::Locked { .. } => "Locked",
            Self::TooEarlyForRefund => "TooEarlyForRefund",
            Self::StalePrice { .. } => "StalePrice",
            Self::StaleRound { .. } => "StaleRound",
            Self::NonPositivePrice => "NonPositivePrice",
            Self::NoPrice => "NoPrice",
            Self::BadPrice { .. } => "BadPrice",
            Self::PriceDeviation { .. } => "PriceDeviation",
            Self::FeedNotConfigured => "FeedNotConfigured",
            Self::InsufficientInventory { .. } => "InsufficientInventory",
            Self::InsufficientBalance { .. } => "InsufficientBalance",
            Self::EscrowInvariant { .. } => "EscrowInvariant",
            Self::DeskNotFound(_) => "DeskNotFound",
            Self::ConsignmentNotFound(_) => "ConsignmentNotFound",
            Self::OfferNotFound(_) => "OfferNotFound",
            Self::TokenNotRegistered(_) => "TokenNotRegistered",
            Self::Configuration(_) => "Configuration",
            Self::Serialization(_) => "Serialization",
            Self::Ledger(_) => "Ledger",
            Self::Internal(_) => "Internal",
        }
    }

    /// Is this one of the price-validity errors raised by the oracle?
    #[must_use]
    pub fn is_price_error(&self) -> bool {
        matches!(
            self,
            Self::StalePrice { .. }
                | Self::StaleRound { .. }
                | Self::NonPositivePrice
                | Self::NoPrice
                | Self::FeedNotConfigured
        )
    }

    #[must_use]
    pub fn bad_state(reason: impl Into<String>) -> Self {
        Self::BadState {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn amount_range(reason: impl Into<String>) -> Self {
        Self::AmountRange {
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for OtcError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, OtcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_contains_code() {
        let err = OtcError::AmountRange {
            reason: "zero".into(),
        };
        assert!(err.to_string().starts_with("OTC_ERR_100"));

        let err = OtcError::Locked { unlock_time: 42 };
        let msg = err.to_string();
        assert!(msg.starts_with("OTC_ERR_306"));
        assert!(msg.contains("42"));
    }

    #[test]
    fn taxonomy_names() {
        assert_eq!(OtcError::Paused.code(), "Paused");
        assert_eq!(OtcError::bad_state("x").code(), "BadState");
        assert_eq!(
            OtcError::CommissionRange { bps: 10 }.code(),
            "CommissionRange"
        );
    }

    #[test]
    fn price_errors_are_classified() {
        assert!(OtcError::NonPositivePrice.is_price_error());
        assert!(
            OtcError::StaleRound {
                last_seen: 2,
                reported: 1
            }
            .is_price_error()
        );
        assert!(!OtcError::Paused.is_price_error());
    }
}
