//! Tranche Conversion Engine
//!
//! Pure fixed-point conversion between tranche amounts and claim-token
//! amounts, given a per-class yield factor and a market price.
//!
//! Every division floors. The asymmetry is deliberate: conversions
//! under-issue claims and over-consume tranches, so rounding residue always
//! lands on the side of the reserve.

use crate::constants::fixed_point::{PRICE_ONE, YIELD_ONE};
use crate::errors::{EverbondError, EverbondResult};
use crate::math::{mul_div_floor, to_amount};

/// Tranche amount -> claim amount.
///
/// `claim = (tranche_amt * yield / 10^YIELD_SCALE) * price / 10^PRICE_SCALE`
///
/// A zero yield or price is `UnacceptableParams`; callers treating a
/// zero-yield tranche as non-convertible must check before invoking.
pub fn tranches_to_claim(
    tranche_amt: u64,
    yield_factor: u64,
    price: u64,
) -> EverbondResult<u64> {
    if yield_factor == 0 || price == 0 {
        return Err(EverbondError::UnacceptableParams);
    }

    let collateral_eq = mul_div_floor(tranche_amt as u128, yield_factor as u128, YIELD_ONE as u128)?;
    let claim = mul_div_floor(collateral_eq, price as u128, PRICE_ONE as u128)?;
    to_amount(claim)
}

/// Claim amount -> tranche amount, the inverse conversion.
///
/// `tranche = (claim_amt * 10^PRICE_SCALE / price) * 10^YIELD_SCALE / yield`
pub fn claim_to_tranches(
    claim_amt: u64,
    yield_factor: u64,
    price: u64,
) -> EverbondResult<u64> {
    if yield_factor == 0 || price == 0 {
        return Err(EverbondError::UnacceptableParams);
    }

    let collateral_eq = mul_div_floor(claim_amt as u128, PRICE_ONE as u128, price as u128)?;
    let tranche = mul_div_floor(collateral_eq, YIELD_ONE as u128, yield_factor as u128)?;
    to_amount(tranche)
}
