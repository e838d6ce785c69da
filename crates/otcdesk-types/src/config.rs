//! Desk configuration.
//!
//! A [`DeskConfig`] seeds a new desk. Every field has a default, so a JSON
//! document only needs to name what it overrides:
//!
//! ```json
//! { "min_usd": "500", "quote_expiry_secs": 1800, "use_manual_prices": true }
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{DeskLimits, OtcError, Result, constants};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeskConfig {
    /// Minimum gross notional per offer, USD.
    pub min_usd: Decimal,
    /// Maximum gross notional per offer, USD. Zero means unlimited.
    pub max_usd: Decimal,
    pub max_token_per_order: u64,
    pub quote_expiry_secs: i64,
    pub default_unlock_delay_secs: i64,
    pub max_lockup_secs: i64,
    pub max_price_age_secs: i64,
    pub use_manual_prices: bool,
    pub stable_decimals: u8,
    pub required_approvals: u8,
    pub restrict_fulfill: bool,
    pub emergency_refund_deadline_secs: i64,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            min_usd: Decimal::from(5),
            max_usd: Decimal::ZERO,
            max_token_per_order: constants::DEFAULT_MAX_TOKEN_PER_ORDER,
            quote_expiry_secs: constants::DEFAULT_QUOTE_EXPIRY_SECS,
            default_unlock_delay_secs: 0,
            max_lockup_secs: constants::DEFAULT_MAX_LOCKUP_SECS,
            max_price_age_secs: constants::DEFAULT_MAX_PRICE_AGE_SECS,
            use_manual_prices: false,
            stable_decimals: constants::DEFAULT_STABLE_DECIMALS,
            required_approvals: 1,
            restrict_fulfill: false,
            emergency_refund_deadline_secs: constants::DEFAULT_EMERGENCY_REFUND_DEADLINE_SECS,
        }
    }
}

impl DeskConfig {
    /// Parse and validate a JSON document.
    ///
    /// # Errors
    /// [`OtcError::Serialization`] on malformed JSON, otherwise whatever
    /// [`Self::validate`] rejects.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn limits(&self) -> DeskLimits {
        DeskLimits {
            min_usd: self.min_usd,
            max_usd: self.max_usd,
            max_token_per_order: self.max_token_per_order,
            quote_expiry_secs: self.quote_expiry_secs,
            default_unlock_delay_secs: self.default_unlock_delay_secs,
            max_lockup_secs: self.max_lockup_secs,
        }
    }

    /// # Errors
    /// Limit errors as in [`DeskLimits::validate`]; [`OtcError::Configuration`]
    /// for the remaining fields.
    pub fn validate(&self) -> Result<()> {
        self.limits().validate()?;
        if self.max_price_age_secs < 0 {
            return Err(OtcError::Configuration(
                "max_price_age_secs must not be negative".into(),
            ));
        }
        if self.stable_decimals > constants::MAX_TOKEN_DECIMALS {
            return Err(OtcError::Configuration(format!(
                "stable_decimals {} above {}",
                self.stable_decimals,
                constants::MAX_TOKEN_DECIMALS
            )));
        }
        if self.required_approvals == 0
            || usize::from(self.required_approvals) > constants::MAX_APPROVERS
        {
            return Err(OtcError::Configuration(format!(
                "required_approvals {} outside [1, {}]",
                self.required_approvals,
                constants::MAX_APPROVERS
            )));
        }
        if self.emergency_refund_deadline_secs < 0 {
            return Err(OtcError::Configuration(
                "emergency_refund_deadline_secs must not be negative".into(),
            ));
        }
        Ok(())
    }
}
