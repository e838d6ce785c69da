//! Token registry entries.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AssetId, DeskId, FeedId, Identity};

/// A tradeable asset on a desk, keyed by (desk, asset).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRegistryEntry {
    pub desk: DeskId,
    pub asset: AssetId,
    /// Base-unit decimals of the asset.
    pub decimals: u8,
    /// External feed used when the desk is not in manual mode.
    pub feed: Option<FeedId>,
    /// Manually pinned USD price.
    pub manual_price: Option<Decimal>,
    /// When the manual price was last set.
    pub manual_price_set_at: i64,
    /// Highest feed round consumed so far; reads must never go below it.
    pub last_round: Option<u64>,
    pub registered_by: Identity,
    pub registered_at: i64,
}

impl TokenRegistryEntry {
    /// Raw units per whole token, as a decimal.
    #[must_use]
    pub fn unit_scale(&self) -> Decimal {
        Decimal::from(10u64.saturating_pow(u32::from(self.decimals)))
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl TokenRegistryEntry {
    /// An entry with a manual price and no feed.
    #[must_use]
    pub fn dummy(desk: DeskId, asset: &str, decimals: u8, price: Decimal) -> Self {
        Self {
            desk,
            asset: AssetId::new(asset),
            decimals,
            feed: None,
            manual_price: Some(price),
            manual_price_set_at: 0,
            last_round: None,
            registered_by: Identity::ZERO,
            registered_at: 0,
        }
    }
}
