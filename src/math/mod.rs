/*
 * Fixed-point tick and liquidity math shared by enrichment and building
 */

use crate::models::{EngineError, Result};
use num_bigint::BigUint;
use num_traits::{FromPrimitive, One, ToPrimitive, Zero};

/// Protocol-wide tick bound; prices live in [1.0001^MIN_TICK, 1.0001^MAX_TICK].
pub const MIN_TICK: i32 = -887272;
pub const MAX_TICK: i32 = 887272;

fn q96() -> BigUint {
    BigUint::one() << 96u32
}

fn ln_tick_base() -> f64 {
    1.0001f64.ln()
}

/// `sqrt(1.0001^tick) * 2^96`, floored. The exponential runs in f64 — ticks
/// are discrete, so sub-wei error in the sqrt price is immaterial here.
pub fn tick_to_sqrt_price_x96(tick: i32) -> Result<BigUint> {
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(EngineError::CalculationError(format!(
            "Tick {tick} outside [{MIN_TICK}, {MAX_TICK}]"
        )));
    }
    let sqrt_ratio = (f64::from(tick) * ln_tick_base() / 2.0).exp();
    let scaled = (sqrt_ratio * 2f64.powi(96)).floor();
    BigUint::from_f64(scaled).ok_or_else(|| {
        EngineError::CalculationError(format!("Sqrt price overflow for tick {tick}"))
    })
}

/// Inverse derivation of the tick from a Q64.96 sqrt price, rounded to the
/// nearest tick and clamped to the protocol bounds.
pub fn tick_from_sqrt_price_x96(sqrt_price_x96: &BigUint) -> Result<i32> {
    let value = sqrt_price_x96
        .to_f64()
        .filter(|v| *v > 0.0)
        .ok_or_else(|| EngineError::CalculationError("Invalid sqrt price: zero".to_string()))?;
    let ratio = (value / 2f64.powi(96)).powi(2);
    tick_from_ratio(ratio)
}

/// Tick implied by a raw token1-per-token0 price ratio.
pub fn tick_from_price_ratio(ratio: f64) -> Result<i32> {
    tick_from_ratio(ratio)
}

fn tick_from_ratio(ratio: f64) -> Result<i32> {
    if !ratio.is_finite() || ratio <= 0.0 {
        return Err(EngineError::CalculationError(format!(
            "Invalid price ratio: {ratio}"
        )));
    }
    #[allow(clippy::cast_possible_truncation)]
    let tick = (ratio.ln() / ln_tick_base()).round() as i32;
    Ok(tick.clamp(MIN_TICK, MAX_TICK))
}

/// `sqrt(ratio) * 2^96` for pool initialization from a caller price ratio.
pub fn sqrt_price_x96_from_price(ratio: f64) -> Result<BigUint> {
    if !ratio.is_finite() || ratio <= 0.0 {
        return Err(EngineError::CalculationError(format!(
            "Invalid price ratio: {ratio}"
        )));
    }
    BigUint::from_f64((ratio.sqrt() * 2f64.powi(96)).floor())
        .ok_or_else(|| EngineError::CalculationError("Sqrt price overflow".to_string()))
}

/// Token amounts represented by `liquidity` over a sqrt-price range.
///
/// Three regimes: price at/below the range is all token0, at/above is all
/// token1, inside splits between the two. All arithmetic stays in `BigUint`;
/// intermediate products exceed 256 bits.
#[must_use]
pub fn amounts_from_liquidity(
    sqrt_price: &BigUint,
    sqrt_lower: &BigUint,
    sqrt_upper: &BigUint,
    liquidity: &BigUint,
) -> (BigUint, BigUint) {
    let (lower, upper) = if sqrt_lower <= sqrt_upper {
        (sqrt_lower, sqrt_upper)
    } else {
        (sqrt_upper, sqrt_lower)
    };
    if liquidity.is_zero() || lower.is_zero() || lower == upper {
        return (BigUint::zero(), BigUint::zero());
    }

    if sqrt_price <= lower {
        let amount0 = liquidity * q96() * (upper - lower) / (lower * upper);
        (amount0, BigUint::zero())
    } else if sqrt_price >= upper {
        let amount1 = liquidity * (upper - lower) >> 96u32;
        (BigUint::zero(), amount1)
    } else {
        let amount0 = liquidity * q96() * (upper - sqrt_price) / (sqrt_price * upper);
        let amount1 = liquidity * (sqrt_price - lower) >> 96u32;
        (amount0, amount1)
    }
}

/// Raw fees owed given fee-growth-inside accumulators:
/// `(now - last) * liquidity / 2^128`. Accumulator wraparound
/// (`now < last`) yields zero, never a negative amount.
#[must_use]
pub fn fee_owed(
    fee_growth_inside_now: &BigUint,
    fee_growth_inside_last: &BigUint,
    liquidity: &BigUint,
) -> BigUint {
    if fee_growth_inside_now < fee_growth_inside_last {
        return BigUint::zero();
    }
    (fee_growth_inside_now - fee_growth_inside_last) * liquidity >> 128u32
}

/// Widest usable tick window for a tick spacing: the global bound rounded
/// inward to multiples of the spacing.
pub fn tick_range(spacing: i32) -> Result<(i32, i32)> {
    if spacing <= 0 {
        return Err(EngineError::InvalidInput(format!(
            "Invalid tick spacing: {spacing}"
        )));
    }
    // Truncating division rounds toward zero, which is ceil for the negative
    // bound and floor for the positive one.
    Ok(((MIN_TICK / spacing) * spacing, (MAX_TICK / spacing) * spacing))
}

/// Floors a tick to the nearest spacing multiple at or below it.
#[must_use]
pub fn align_tick(tick: i32, spacing: i32) -> i32 {
    tick.div_euclid(spacing) * spacing
}

/// Liquidity for a full-range deposit:
/// `min(amount0 * sqrtP / 2^96, amount1 * 2^96 / sqrtP)`, floored to 1
/// when the computed value would be zero.
#[must_use]
pub fn liquidity_from_amounts_full_range(
    amount0: &BigUint,
    amount1: &BigUint,
    sqrt_price: &BigUint,
) -> BigUint {
    if sqrt_price.is_zero() {
        return BigUint::one();
    }
    let l0 = amount0 * sqrt_price >> 96u32;
    let l1 = amount1 * q96() / sqrt_price;
    let liquidity = l0.min(l1);
    if liquidity.is_zero() {
        BigUint::one()
    } else {
        liquidity
    }
}
