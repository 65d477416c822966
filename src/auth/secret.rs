//! Redacting wrapper for the raw bearer credential string.

// crates.io
use ::http::{HeaderValue, header::InvalidHeaderValue};
// self
use crate::_prelude::*;

/// Bearer credential string that never leaks through `Debug`, `Display`, or header dumps.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BearerSecret(String);
impl BearerSecret {
	/// Wraps a credential string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the raw credential. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Returns `true` for an empty credential string.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Builds the `Authorization: Bearer <credential>` value, flagged as sensitive.
	///
	/// Fails when the credential contains bytes that are not allowed in a header.
	pub fn header_value(&self) -> Result<HeaderValue, InvalidHeaderValue> {
		let mut value = HeaderValue::from_str(&format!("Bearer {}", self.0))?;

		value.set_sensitive(true);

		Ok(value)
	}
}
impl Debug for BearerSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "BearerSecret(<{} bytes redacted>)", self.0.len())
	}
}
impl Display for BearerSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}
