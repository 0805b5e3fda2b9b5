use alloy_primitives::U256;

use crate::error::AppError;

/// Largest decimals value whose scale still fits in a U256.
pub const MAX_DECIMALS: u8 = 77;

/// 10^decimals as U256
pub fn pow10(decimals: u8) -> U256 {
    U256::from(10u64).pow(U256::from(decimals))
}

/// Decimal string → base units, e.g. ("1.5", 6) → 1_500_000
pub fn parse_units(amount: &str, decimals: u8) -> Result<U256, AppError> {
    if decimals > MAX_DECIMALS {
        return Err(AppError::InvalidInput(format!("unsupported decimals {}", decimals)));
    }
    let amount = amount.trim();
    let parts: Vec<&str> = amount.split('.').collect();
    if amount.is_empty() || parts.len() > 2 {
        return Err(AppError::InvalidNumber);
    }

    let integer = parts[0];
    let fractional = parts.get(1).copied().unwrap_or("");
    if integer.is_empty() && fractional.is_empty() {
        return Err(AppError::InvalidNumber);
    }
    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if !all_digits(integer) || !all_digits(fractional) {
        return Err(AppError::InvalidNumber);
    }

    let integer = if integer.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(integer, 10).map_err(|_| AppError::InvalidNumber)?
    };
    let mut value = integer
        .checked_mul(pow10(decimals))
        .ok_or(AppError::InvalidNumber)?;

    let frac_str = fractional.trim_end_matches('0');
    if !frac_str.is_empty() {
        if frac_str.len() > decimals as usize {
            return Err(AppError::InvalidInput(format!(
                "more than {} decimal places",
                decimals
            )));
        }
        let frac = U256::from_str_radix(frac_str, 10).map_err(|_| AppError::InvalidNumber)?;
        let scale = pow10(decimals - frac_str.len() as u8);
        value = value
            .checked_add(frac * scale)
            .ok_or(AppError::InvalidNumber)?;
    }

    Ok(value)
}

/// Base units → decimal string without trailing zeros, e.g. (1_500_000, 6) → "1.5"
pub fn format_units(value: U256, decimals: u8) -> String {
    if decimals == 0 {
        return value.to_string();
    }
    let base = pow10(decimals);
    let integer = value / base;
    let frac = value % base;
    if frac.is_zero() {
        return integer.to_string();
    }
    let frac = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
    format!("{}.{}", integer, frac.trim_end_matches('0'))
}

/// "0x..." quantity → U256
pub fn str_to_u256(s: impl AsRef<str>) -> Result<U256, AppError> {
    let s = s.as_ref().trim();
    if s.is_empty() || s == "0x" {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(s.strip_prefix("0x").unwrap_or(s), 16).map_err(|_| AppError::InvalidNumber)
}

/// "0x38" / "56" / "1_000" → u64
pub fn str_to_u64(input: &str) -> Result<u64, AppError> {
    let s = input.trim();

    if s.is_empty() {
        return Err(AppError::Parse("input empty"));
    }

    if let Some(hex) = s.strip_prefix("0x") {
        let cleaned: String = hex.chars().filter(|c| *c != '_').collect();
        return u64::from_str_radix(&cleaned, 16).map_err(|_| AppError::Parse("invalid hex number"));
    }

    let cleaned: String = s.chars().filter(|c| *c != '_').collect();
    cleaned
        .parse::<u64>()
        .map_err(|_| AppError::Parse("invalid decimal number"))
}

/// 56 → "0x38"
pub fn u64_to_hex(value: u64) -> String {
    format!("0x{:x}", value)
}
