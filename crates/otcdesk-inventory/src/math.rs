//! Fixed-point helpers shared by pricing and payment quoting.
//!
//! USD values are [`Decimal`]; ledger amounts are integer base units. All
//! conversions are checked and return [`OtcError::Overflow`] instead of
//! wrapping.

use otcdesk_types::{OtcError, Result, constants};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

fn bps_denominator() -> Decimal {
    Decimal::from(constants::BPS_DENOMINATOR)
}

/// `10^decimals` as a decimal.
///
/// # Errors
/// [`OtcError::Overflow`] above 18 decimals.
pub fn unit_scale(decimals: u8) -> Result<Decimal> {
    if decimals > constants::MAX_TOKEN_DECIMALS {
        return Err(OtcError::Overflow);
    }
    Ok(Decimal::from(10u64.pow(u32::from(decimals))))
}

/// Convert an 8-decimal fixed-point integer price into a decimal.
#[must_use]
pub fn price_from_8d(price_8d: u64) -> Decimal {
    Decimal::from_i128_with_scale(i128::from(price_8d), constants::PRICE_DECIMALS)
}

/// Gross USD value of `amount` base units at `price` per whole token.
///
/// # Errors
/// [`OtcError::Overflow`] if the product leaves decimal range.
pub fn notional_usd(amount: u64, decimals: u8, price: Decimal) -> Result<Decimal> {
    let whole = Decimal::from(amount)
        .checked_div(unit_scale(decimals)?)
        .ok_or(OtcError::Overflow)?;
    whole.checked_mul(price).ok_or(OtcError::Overflow)
}

/// `value × (1 − bps / 10 000)`.
///
/// # Errors
/// [`OtcError::Discount`] if `bps` exceeds 100%.
pub fn apply_discount(value: Decimal, bps: u16) -> Result<Decimal> {
    if bps > constants::BPS_DENOMINATOR {
        return Err(OtcError::Discount {
            reason: format!("{bps} bps exceeds 100%"),
        });
    }
    let keep = Decimal::from(constants::BPS_DENOMINATOR - bps);
    value
        .checked_mul(keep)
        .and_then(|v| v.checked_div(bps_denominator()))
        .ok_or(OtcError::Overflow)
}

/// `floor(amount × bps / 10 000)` in integer units.
///
/// # Errors
/// [`OtcError::Overflow`] if the result does not fit `u64`.
pub fn bps_of_units(amount: u64, bps: u16) -> Result<u64> {
    let scaled = u128::from(amount) * u128::from(bps) / u128::from(constants::BPS_DENOMINATOR);
    u64::try_from(scaled).map_err(|_| OtcError::Overflow)
}

/// USD value expressed in units of a currency with `decimals`, rounded up.
///
/// # Errors
/// [`OtcError::Overflow`] if negative or larger than `u64`.
pub fn to_units_ceil(value: Decimal, decimals: u8) -> Result<u64> {
    if value.is_sign_negative() {
        return Err(OtcError::Overflow);
    }
    value
        .checked_mul(unit_scale(decimals)?)
        .map(|v| v.round_dp_with_strategy(0, RoundingStrategy::AwayFromZero))
        .and_then(|v| v.to_u64())
        .ok_or(OtcError::Overflow)
}

/// Is `current` within `max_bps` of `reference`? A bound of zero always passes,
/// as does a zero reference.
#[must_use]
pub fn within_deviation(reference: Decimal, current: Decimal, max_bps: u16) -> bool {
    if max_bps == 0 || reference.is_zero() {
        return true;
    }
    let diff = (current - reference).abs();
    let allowed = reference.abs() * Decimal::from(max_bps) / bps_denominator();
    diff <= allowed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::from(n)
    }

    #[test]
    fn notional_respects_decimals() {
        // 10 000 whole tokens with 6 decimals at $10.
        let usd = notional_usd(10_000_000_000, 6, dec(10)).unwrap();
        assert_eq!(usd, dec(100_000));
        assert_eq!(notional_usd(5, 0, Decimal::new(25, 1)).unwrap(), Decimal::new(125, 1));
    }

    #[test]
    fn discount_math() {
        assert_eq!(apply_discount(dec(100_000), 500).unwrap(), dec(95_000));
        assert_eq!(apply_discount(dec(100), 10_000).unwrap(), Decimal::ZERO);
        assert!(matches!(
            apply_discount(dec(100), 10_001),
            Err(OtcError::Discount { .. })
        ));
    }

    #[test]
    fn commission_rounds_down() {
        assert_eq!(bps_of_units(95_000_000_000, 50).unwrap(), 475_000_000);
        assert_eq!(bps_of_units(199, 50).unwrap(), 0);
        assert_eq!(bps_of_units(u64::MAX, 10_000).unwrap(), u64::MAX);
    }

    #[test]
    fn unit_conversion_rounding() {
        let v = Decimal::new(10_000_001, 7); // 1.0000001
        assert_eq!(to_units_ceil(v, 6).unwrap(), 1_000_001);
        assert_eq!(to_units_ceil(dec(95_000), 6).unwrap(), 95_000_000_000);
        assert!(to_units_ceil(dec(-1), 6).is_err());
    }

    #[test]
    fn price_8d_is_exact() {
        assert_eq!(price_from_8d(1_000_000_000), dec(10));
        assert_eq!(price_from_8d(1), Decimal::new(1, 8));
    }

    #[test]
    fn deviation_bounds() {
        assert!(within_deviation(dec(100), dec(105), 500));
        assert!(!within_deviation(dec(100), dec(106), 500));
        assert!(within_deviation(dec(100), dec(94), 0));
        assert!(within_deviation(Decimal::ZERO, dec(1), 100));
    }

    #[test]
    fn scale_limit() {
        assert!(unit_scale(18).is_ok());
        assert_eq!(unit_scale(19), Err(OtcError::Overflow));
    }
}
