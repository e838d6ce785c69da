//! Token registry: which assets a desk trades and where their prices come from.

use otcdesk_types::{AssetId, Desk, FeedId, Identity, OtcError, Result, TokenRegistryEntry, constants};
use rust_decimal::Decimal;

use crate::math;

/// Registry operations for one desk.
pub struct TokenRegistry<'a> {
    desk: &'a Desk,
}

impl<'a> TokenRegistry<'a> {
    #[must_use]
    pub fn new(desk: &'a Desk) -> Self {
        Self { desk }
    }

    /// Register `asset`, or overwrite its feed reference.
    ///
    /// First registration is open to anyone. Re-registration is owner-only
    /// and replaces the feed reference; decimals and manual price stay.
    ///
    /// # Errors
    /// [`OtcError::NotOwner`] on re-registration by a non-owner,
    /// [`OtcError::AmountRange`] for decimals above 18.
    pub fn register(
        &self,
        existing: Option<TokenRegistryEntry>,
        caller: Identity,
        asset: AssetId,
        feed: Option<FeedId>,
        decimals: u8,
        now: i64,
    ) -> Result<TokenRegistryEntry> {
        if decimals > constants::MAX_TOKEN_DECIMALS {
            return Err(OtcError::amount_range(format!(
                "decimals {decimals} above {}",
                constants::MAX_TOKEN_DECIMALS
            )));
        }
        match existing {
            Some(mut entry) => {
                self.desk.require_owner(&caller)?;
                if entry.feed != feed {
                    entry.feed = feed;
                    entry.last_round = None;
                }
                Ok(entry)
            }
            None => Ok(TokenRegistryEntry {
                desk: self.desk.id,
                asset,
                decimals,
                feed,
                manual_price: None,
                manual_price_set_at: 0,
                last_round: None,
                registered_by: caller,
                registered_at: now,
            }),
        }
    }

    /// Point a registered asset at a different feed. Owner only.
    ///
    /// # Errors
    /// [`OtcError::NotOwner`].
    pub fn set_feed(&self, entry: &mut TokenRegistryEntry, caller: Identity, feed: FeedId) -> Result<()> {
        self.desk.require_owner(&caller)?;
        if entry.feed != Some(feed) {
            entry.feed = Some(feed);
            entry.last_round = None;
        }
        Ok(())
    }

    /// Pin a manual USD price (8 decimals). Owner only.
    ///
    /// # Errors
    /// [`OtcError::NotOwner`], or [`OtcError::BadPrice`] outside `(0, $10 000]`.
    pub fn set_manual_price(
        &self,
        entry: &mut TokenRegistryEntry,
        caller: Identity,
        price_8d: u64,
        now: i64,
    ) -> Result<Decimal> {
        self.desk.require_owner(&caller)?;
        let price = token_price_8d(price_8d)?;
        entry.manual_price = Some(price);
        entry.manual_price_set_at = now;
        Ok(price)
    }
}

/// Validate a manual token price.
///
/// # Errors
/// [`OtcError::BadPrice`] outside `(0, $10 000]`.
pub fn token_price_8d(price_8d: u64) -> Result<Decimal> {
    if price_8d == 0 || price_8d > constants::MAX_TOKEN_PRICE_8D {
        return Err(OtcError::BadPrice {
            reason: format!("token price {price_8d} outside (0, {}]", constants::MAX_TOKEN_PRICE_8D),
        });
    }
    Ok(math::price_from_8d(price_8d))
}

/// Validate a manual native/USD price.
///
/// # Errors
/// [`OtcError::BadPrice`] outside `[$0.01, $100 000]`.
pub fn native_price_8d(price_8d: u64) -> Result<Decimal> {
    if !(constants::MIN_NATIVE_PRICE_8D..=constants::MAX_NATIVE_PRICE_8D).contains(&price_8d) {
        return Err(OtcError::BadPrice {
            reason: format!(
                "native price {price_8d} outside [{}, {}]",
                constants::MIN_NATIVE_PRICE_8D,
                constants::MAX_NATIVE_PRICE_8D
            ),
        });
    }
    Ok(math::price_from_8d(price_8d))
}
