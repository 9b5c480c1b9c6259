//! Dot-path navigation into JSON documents.
//!
//! `data.prices.0.usd` walks object keys and, where the current node is an
//! array, numeric segments as indices. The leaf must be a JSON number or a
//! string holding a decimal number.

use crate::FetchError;
use oracle_types::NumericValue;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

/// Returns the node at `path`. An empty path addresses the document root.
pub fn navigate<'a>(document: &'a Value, path: &str) -> Result<&'a Value, FetchError> {
	let path = path.trim();
	if path.is_empty() {
		return Ok(document);
	}

	let mut node = document;
	for segment in path.split('.') {
		let next = match node {
			Value::Object(map) => map.get(segment),
			Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
			_ => None,
		};
		node = next.ok_or_else(|| FetchError::PathNotFound(path.to_string()))?;
	}
	Ok(node)
}

/// Coerces a leaf into a [`NumericValue`].
pub fn to_numeric(leaf: &Value) -> Result<NumericValue, FetchError> {
	match leaf {
		Value::Number(n) => parse_decimal(&n.to_string()),
		Value::String(s) => parse_decimal(s.trim()),
		other => Err(FetchError::NotNumeric(format!("found {}", json_kind(other)))),
	}
}

/// Navigates and coerces in one step.
pub fn extract(document: &Value, path: &str) -> Result<NumericValue, FetchError> {
	to_numeric(navigate(document, path)?)
}

fn parse_decimal(raw: &str) -> Result<NumericValue, FetchError> {
	if let Ok(value) = Decimal::from_str(raw) {
		return Ok(value);
	}
	if let Ok(value) = Decimal::from_scientific(raw) {
		return Ok(value);
	}
	// Well-formed but beyond the 96-bit mantissa.
	match raw.parse::<f64>() {
		Ok(f) if f.is_finite() => Err(FetchError::Overflow(raw.to_string())),
		_ => Err(FetchError::NotNumeric(format!("'{}'", raw))),
	}
}

fn json_kind(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "boolean",
		Value::Number(_) => "number",
		Value::String(_) => "string",
		Value::Array(_) => "array",
		Value::Object(_) => "object",
	}
}
