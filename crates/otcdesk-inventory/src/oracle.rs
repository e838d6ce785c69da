//! Pricing oracle.
//!
//! Resolves a USD price per whole token (and per native unit) for a desk.
//!
//! ## Resolution
//!
//! - **Manual mode** (`use_manual_prices`): the pinned price, unconditionally.
//! - **Feed mode**: the latest reading from the [`PriceFeed`] port, rejected if
//!   - older than `max_price_age_secs` → [`OtcError::StalePrice`]
//!   - its round is below the last round consumed → [`OtcError::StaleRound`]
//!   - its price is zero or negative → [`OtcError::NonPositivePrice`]
//!
//! Every price used for offer creation or payment passes through here.

use std::collections::HashMap;

use otcdesk_types::{DeskPricing, FeedId, OtcError, Result, TokenRegistryEntry, constants};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// One observation from an external feed: `price × 10^exponent` USD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedReading {
    pub price: i64,
    pub exponent: i32,
    pub publish_time: i64,
    pub round: u64,
}

/// Port to an external price feed network.
pub trait PriceFeed {
    /// Latest reading for `feed`, if the feed has published anything.
    fn latest(&self, feed: &FeedId) -> Option<FeedReading>;
}

/// In-process feed with readings pushed by the host.
#[derive(Debug, Clone, Default)]
pub struct StaticPriceFeed {
    readings: HashMap<FeedId, FeedReading>,
}

impl StaticPriceFeed {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the latest reading of `feed`.
    pub fn publish(&mut self, feed: FeedId, reading: FeedReading) {
        self.readings.insert(feed, reading);
    }
}

impl PriceFeed for StaticPriceFeed {
    fn latest(&self, feed: &FeedId) -> Option<FeedReading> {
        self.readings.get(feed).copied()
    }
}

/// A validated price and the feed round it came from, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPrice {
    pub price: Decimal,
    pub round: Option<u64>,
}

impl ResolvedPrice {
    /// Advance a stored round watermark to this reading's round.
    pub fn advance(&self, last_round: &mut Option<u64>) {
        if let Some(round) = self.round {
            *last_round = Some(last_round.map_or(round, |r| r.max(round)));
        }
    }
}

/// Price resolution for one desk.
pub struct PricingOracle<'a, F: PriceFeed + ?Sized> {
    pricing: &'a DeskPricing,
    feed: &'a F,
}

impl<'a, F: PriceFeed + ?Sized> PricingOracle<'a, F> {
    #[must_use]
    pub fn new(pricing: &'a DeskPricing, feed: &'a F) -> Self {
        Self { pricing, feed }
    }

    /// USD price per whole token of `entry`'s asset.
    ///
    /// # Errors
    /// [`OtcError::NoPrice`] if nothing is available, otherwise the feed
    /// validity errors listed in the module docs.
    pub fn token_price(&self, entry: &TokenRegistryEntry, now: i64) -> Result<ResolvedPrice> {
        if self.pricing.use_manual_prices {
            return manual(entry.manual_price);
        }
        self.read_feed(entry.feed, entry.last_round, now)
    }

    /// USD price per whole native unit.
    ///
    /// # Errors
    /// As [`Self::token_price`].
    pub fn native_price(&self, now: i64) -> Result<ResolvedPrice> {
        if self.pricing.use_manual_prices {
            return manual(self.pricing.native_manual_price);
        }
        self.read_feed(self.pricing.native_feed, self.pricing.native_last_round, now)
    }

    fn read_feed(&self, feed: Option<FeedId>, last_round: Option<u64>, now: i64) -> Result<ResolvedPrice> {
        let feed = feed.ok_or(OtcError::FeedNotConfigured)?;
        let reading = self.feed.latest(&feed).ok_or(OtcError::NoPrice)?;

        let age = now.saturating_sub(reading.publish_time);
        if age > self.pricing.max_price_age_secs {
            return Err(OtcError::StalePrice {
                age,
                max_age: self.pricing.max_price_age_secs,
            });
        }
        if let Some(last_seen) = last_round {
            if reading.round < last_seen {
                return Err(OtcError::StaleRound {
                    last_seen,
                    reported: reading.round,
                });
            }
        }
        if reading.price <= 0 {
            return Err(OtcError::NonPositivePrice);
        }

        Ok(ResolvedPrice {
            price: normalize(reading.price, reading.exponent)?,
            round: Some(reading.round),
        })
    }
}

fn manual(price: Option<Decimal>) -> Result<ResolvedPrice> {
    match price {
        Some(price) if price > Decimal::ZERO => Ok(ResolvedPrice { price, round: None }),
        _ => Err(OtcError::NoPrice),
    }
}

/// Convert a feed's `(price, exponent)` into a USD decimal truncated to
/// 8 decimals.
///
/// # Errors
/// [`OtcError::NonPositivePrice`] if the value is not positive after
/// truncation, [`OtcError::BadPrice`] for exponents outside decimal range.
pub fn normalize(price: i64, exponent: i32) -> Result<Decimal> {
    if price <= 0 {
        return Err(OtcError::NonPositivePrice);
    }
    let value = if exponent <= 0 {
        let scale = exponent.unsigned_abs();
        Decimal::try_new(price, scale).map_err(|_| OtcError::BadPrice {
            reason: format!("exponent {exponent} out of range"),
        })?
    } else {
        10i64
            .checked_pow(exponent.unsigned_abs())
            .and_then(|m| price.checked_mul(m))
            .map(Decimal::from)
            .ok_or_else(|| OtcError::BadPrice {
                reason: format!("exponent {exponent} out of range"),
            })?
    };
    let value = value.round_dp_with_strategy(constants::PRICE_DECIMALS, RoundingStrategy::ToZero);
    if value <= Decimal::ZERO {
        return Err(OtcError::NonPositivePrice);
    }
    Ok(value)
}
