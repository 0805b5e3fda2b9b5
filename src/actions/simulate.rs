use alloy_primitives::U256;
use serde::Serialize;

use crate::error::AppError;
use crate::evm::token::TokenAmount;

pub const BPS: u64 = 10_000;
pub const DAYS_PER_YEAR: u64 = 365;
pub const DEFAULT_APR_BPS: u64 = 1200;
pub const DEFAULT_FEE_BPS: u64 = 200;

/// APR the pool pays for a lock period, in basis points.
pub fn apr_for_period(period_days: u64) -> Option<u64> {
    match period_days {
        30 => Some(800),
        90 => Some(1200),
        180 => Some(1500),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct YieldEstimate {
    pub invested: TokenAmount,
    pub period_days: u64,
    pub estimated_yield: TokenAmount,
    pub fee: TokenAmount,
    pub final_amount: TokenAmount,
}

/// Prorated simple interest minus a one-off entry fee, in base units.
pub fn estimate(
    amount: TokenAmount,
    period_days: u64,
    apr_bps: u64,
    fee_bps: u64,
) -> Result<YieldEstimate, AppError> {
    if amount.is_zero() {
        return Err(AppError::InvalidInput("amount must be greater than zero".into()));
    }
    if period_days == 0 {
        return Err(AppError::InvalidInput("period must be at least one day".into()));
    }

    let raw = amount.raw;
    let estimated_yield = raw
        .checked_mul(U256::from(apr_bps))
        .and_then(|v| v.checked_mul(U256::from(period_days)))
        .ok_or(AppError::InvalidNumber)?
        / U256::from(BPS * DAYS_PER_YEAR);
    let fee = raw.checked_mul(U256::from(fee_bps)).ok_or(AppError::InvalidNumber)? / U256::from(BPS);
    let final_amount = raw.saturating_add(estimated_yield).saturating_sub(fee);

    let scaled = |v: U256| TokenAmount::new(v, amount.decimals);
    Ok(YieldEstimate {
        invested: amount,
        period_days,
        estimated_yield: scaled(estimated_yield),
        fee: scaled(fee),
        final_amount: scaled(final_amount),
    })
}
