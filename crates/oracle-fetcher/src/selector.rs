use crate::FetchError;
use alloy::primitives::{keccak256, FixedBytes};

/// Turns a configured method into its canonical signature.
///
/// A bare name such as `latestPrice` becomes `latestPrice()`; `latestPrice()`
/// is accepted as written. Calls carry no arguments, so a signature with a
/// parameter list is rejected.
pub fn canonical_signature(method: &str) -> Result<String, FetchError> {
	let method = method.trim();
	let name = method.split('(').next().unwrap_or_default().trim_end();

	if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
		return Err(FetchError::InvalidSource(format!(
			"'{}' is not a valid method name",
			method
		)));
	}
	if name.starts_with(|c: char| c.is_ascii_digit()) {
		return Err(FetchError::InvalidSource(format!(
			"method '{}' starts with a digit",
			method
		)));
	}

	let signature = format!("{}()", name);
	match method[name.len()..].replace(' ', "").as_str() {
		"" | "()" => Ok(signature),
		rest if rest.starts_with('(') && rest.ends_with(')') && rest.len() > 2 => {
			Err(FetchError::InvalidSource(format!(
				"method '{}' takes arguments; only zero-argument calls are supported",
				method
			)))
		}
		_ => Err(FetchError::InvalidSource(format!(
			"malformed signature '{}'",
			method
		))),
	}
}

/// First four bytes of the keccak hash of the canonical signature.
pub fn method_selector(method: &str) -> Result<FixedBytes<4>, FetchError> {
	let signature = canonical_signature(method)?;
	let hash = keccak256(signature.as_bytes());
	Ok(FixedBytes::from_slice(&hash[..4]))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_bare_name_and_signature_agree() {
		// totalSupply() => 0x18160ddd
		let expected = FixedBytes::from([0x18, 0x16, 0x0d, 0xdd]);
		assert_eq!(method_selector("totalSupply").unwrap(), expected);
		assert_eq!(method_selector("totalSupply()").unwrap(), expected);
	}

	#[test]
	fn test_signature_with_arguments_rejected() {
		assert_eq!(canonical_signature(" decimals ( ) ").unwrap(), "decimals()");
		for method in ["balanceOf(address)", "getRoundData(uint80)", "f(uint256,bool)"] {
			match canonical_signature(method) {
				Err(FetchError::InvalidSource(reason)) => assert!(reason.contains("arguments")),
				other => panic!("'{}' gave {:?}", method, other),
			}
		}
	}

	#[test]
	fn test_invalid_methods() {
		for method in ["", "price(", "1price", "pri ce", "price)", "price()x", "price(()"] {
			assert!(
				canonical_signature(method).is_err(),
				"'{}' should be rejected",
				method
			);
		}
	}
}
