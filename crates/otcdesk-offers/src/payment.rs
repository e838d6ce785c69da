//! Payment quoting.
//!
//! ```text
//! usd        = token_amount / 10^decimals × price_usd_per_token × (1 − discount)
//! amount     = ceil(usd × 10^stable_decimals)                    (stable)
//!            = ceil(usd / native_usd × 10^NATIVE_DECIMALS)        (native)
//! commission = floor(amount × agent_commission_bps / 10 000)  → agent
//! treasury   = amount − commission                             → desk
//! ```
//!
//! The buyer pays the rounding; the agent never receives more than its share.

use otcdesk_inventory::math;
use otcdesk_types::{Currency, Offer, OtcError, Result, constants};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What a payer owes for an offer, and where it goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentQuote {
    pub currency: Currency,
    /// Discounted USD value of the offer.
    pub usd_value: Decimal,
    /// Native/USD rate used for conversion.
    pub native_usd_price: Option<Decimal>,
    /// Total owed by the payer, in currency units.
    pub amount: u64,
    /// Routed to the desk agent.
    pub commission: u64,
    /// Routed to the desk treasury.
    pub treasury_share: u64,
}

/// Discounted USD value of `offer`.
///
/// # Errors
/// [`OtcError::Overflow`] or [`OtcError::Discount`] from the fixed-point math.
pub fn discounted_usd(offer: &Offer, token_decimals: u8) -> Result<Decimal> {
    let gross = math::notional_usd(offer.token_amount, token_decimals, offer.price_usd_per_token)?;
    math::apply_discount(gross, offer.discount_bps)
}

/// Quote the payment for `offer`.
///
/// `native_usd_price` is required when the offer pays in native units.
///
/// # Errors
/// [`OtcError::NoPrice`] if a native quote has no native price,
/// [`OtcError::Overflow`] if amounts leave range.
pub fn quote(
    offer: &Offer,
    token_decimals: u8,
    stable_decimals: u8,
    native_usd_price: Option<Decimal>,
) -> Result<PaymentQuote> {
    let usd_value = discounted_usd(offer, token_decimals)?;

    let (amount, native_usd_price) = match offer.currency {
        Currency::Stable => (math::to_units_ceil(usd_value, stable_decimals)?, None),
        Currency::Native => {
            let rate = native_usd_price
                .filter(|p| *p > Decimal::ZERO)
                .ok_or(OtcError::NoPrice)?;
            let native = usd_value.checked_div(rate).ok_or(OtcError::Overflow)?;
            (math::to_units_ceil(native, constants::NATIVE_DECIMALS)?, Some(rate))
        }
    };

    let commission = math::bps_of_units(amount, offer.agent_commission_bps)?;
    Ok(PaymentQuote {
        currency: offer.currency,
        usd_value,
        native_usd_price,
        amount,
        commission,
        treasury_share: amount - commission,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use otcdesk_types::Identity;

    fn offer(amount: u64, price: Decimal, discount_bps: u16, commission_bps: u16) -> Offer {
        let mut o = Offer::dummy(Identity([1; 32]), amount);
        o.price_usd_per_token = price;
        o.discount_bps = discount_bps;
        o.agent_commission_bps = commission_bps;
        o
    }

    #[test]
    fn stable_quote_with_commission() {
        // 10 000 tokens at $10, 5% discount, 50 bps commission.
        let o = offer(10_000, Decimal::from(10), 500, 50);
        let q = quote(&o, 0, 6, None).unwrap();
        assert_eq!(q.usd_value, Decimal::from(95_000));
        assert_eq!(q.amount, 95_000_000_000);
        assert_eq!(q.commission, 475_000_000);
        assert_eq!(q.treasury_share, 94_525_000_000);
        assert_eq!(q.native_usd_price, None);
    }

    #[test]
    fn native_quote_rounds_up() {
        let mut o = offer(1, Decimal::from(10), 0, 0);
        o.currency = Currency::Native;
        // $10 at $3 per native unit = 3.333333333.. native → ceil at 9 decimals.
        let q = quote(&o, 0, 6, Some(Decimal::from(3))).unwrap();
        assert_eq!(q.amount, 3_333_333_334);
        assert_eq!(q.native_usd_price, Some(Decimal::from(3)));
    }

    #[test]
    fn native_quote_needs_price() {
        let mut o = offer(1, Decimal::from(10), 0, 0);
        o.currency = Currency::Native;
        assert_eq!(quote(&o, 0, 6, None), Err(OtcError::NoPrice));
        assert_eq!(quote(&o, 0, 6, Some(Decimal::ZERO)), Err(OtcError::NoPrice));
    }

    #[test]
    fn stable_rounding_favours_desk() {
        // 1 raw unit of a 9-decimal token at $0.5 → $0.0000000005 → 1 micro-unit.
        let o = offer(1, Decimal::new(5, 1), 0, 0);
        let q = quote(&o, 9, 6, None).unwrap();
        assert_eq!(q.amount, 1);
    }

    #[test]
    fn fixed_price_offer_has_no_commission() {
        let o = offer(1_000, Decimal::from(2), 1_000, 0);
        let q = quote(&o, 0, 6, None).unwrap();
        assert_eq!(q.amount, 1_800_000_000);
        assert_eq!(q.commission, 0);
        assert_eq!(q.treasury_share, q.amount);
    }
}
