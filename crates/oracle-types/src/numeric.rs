//! Conversions between observed decimal values and on-chain integers.

use alloy::primitives::U256;
use rust_decimal::Decimal;
use thiserror::Error;

/// Value type every fetcher produces and every feed publishes.
pub type NumericValue = Decimal;

/// Largest mantissa a [`NumericValue`] can carry (2^96 - 1).
const MAX_MANTISSA: u128 = (1u128 << 96) - 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NumericError {
	#[error("Value {0} does not fit the numeric precision")]
	Overflow(U256),
	#[error("Negative value {0} cannot be encoded as an unsigned answer")]
	Negative(Decimal),
	#[error("Value {value} with {decimals} decimals exceeds uint256")]
	OutOfRange { value: Decimal, decimals: u32 },
}

/// Converts a full-width unsigned integer into a [`NumericValue`] without scaling.
pub fn from_uint(value: U256) -> Result<NumericValue, NumericError> {
	if value > U256::from(MAX_MANTISSA) {
		return Err(NumericError::Overflow(value));
	}
	let raw = value.to::<u128>() as i128;
	Decimal::try_from_i128_with_scale(raw, 0).map_err(|_| NumericError::Overflow(value))
}

/// Reads a fixed-point feed answer back into a [`NumericValue`].
pub fn from_fixed_point(value: U256, decimals: u32) -> Result<NumericValue, NumericError> {
	if value > U256::from(MAX_MANTISSA) || decimals > Decimal::MAX_SCALE {
		return Err(NumericError::Overflow(value));
	}
	let raw = value.to::<u128>() as i128;
	Decimal::try_from_i128_with_scale(raw, decimals)
		.map(|d| d.normalize())
		.map_err(|_| NumericError::Overflow(value))
}

/// Encodes `value` as `round(value * 10^decimals)`, rounding half away from zero.
pub fn to_fixed_point(value: NumericValue, decimals: u32) -> Result<U256, NumericError> {
	if value.is_sign_negative() && !value.is_zero() {
		return Err(NumericError::Negative(value));
	}

	let mantissa = U256::from(value.mantissa().unsigned_abs());
	let scale = value.scale();
	let ten = U256::from(10u8);

	if decimals >= scale {
		ten.checked_pow(U256::from(decimals - scale))
			.and_then(|factor| mantissa.checked_mul(factor))
			.ok_or(NumericError::OutOfRange { value, decimals })
	} else {
		let divisor = ten.pow(U256::from(scale - decimals));
		let half = divisor / U256::from(2u8);
		Ok((mantissa + half) / divisor)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::str::FromStr;

	#[test]
	fn test_from_uint_keeps_value_unscaled() {
		assert_eq!(from_uint(U256::from(42u64)).unwrap(), Decimal::from(42));
	}

	#[test]
	fn test_from_uint_rejects_values_beyond_precision() {
		let err = from_uint(U256::MAX).unwrap_err();
		assert_eq!(err, NumericError::Overflow(U256::MAX));

		let limit = U256::from(MAX_MANTISSA);
		assert!(from_uint(limit).is_ok());
		assert!(from_uint(limit + U256::from(1u8)).is_err());
	}

	#[test]
	fn test_to_fixed_point_scales_up() {
		let value = Decimal::from_str("1234.56").unwrap();
		assert_eq!(
			to_fixed_point(value, 8).unwrap(),
			U256::from(123_456_000_000u64)
		);
	}

	#[test]
	fn test_to_fixed_point_rounds_half_away_from_zero() {
		let value = Decimal::from_str("0.125").unwrap();
		assert_eq!(to_fixed_point(value, 2).unwrap(), U256::from(13u8));

		let value = Decimal::from_str("0.124").unwrap();
		assert_eq!(to_fixed_point(value, 2).unwrap(), U256::from(12u8));
	}

	#[test]
	fn test_to_fixed_point_rejects_negative() {
		let value = Decimal::from_str("-1.5").unwrap();
		assert!(matches!(
			to_fixed_point(value, 8),
			Err(NumericError::Negative(_))
		));
	}

	#[test]
	fn test_fixed_point_read_back() {
		let answer = U256::from(123_456_000_000u64);
		assert_eq!(
			from_fixed_point(answer, 8).unwrap(),
			Decimal::from_str("1234.56").unwrap()
		);
	}
}
