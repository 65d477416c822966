//! Best-effort decoder for self-describing (JWT-shaped) bearer credentials.
//!
//! Only the payload segment is inspected. Signatures are never verified, so a successful decode
//! is an expiry estimate for scheduling and must not be treated as proof of authenticity.

// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::{Map, Value};
// self
use crate::_prelude::*;

/// Claims extracted from a credential payload.
#[derive(Clone, Debug, PartialEq)]
pub struct CredentialClaims {
	/// Expiry instant declared by the `exp` claim.
	pub expires_at: OffsetDateTime,
	/// Issued-at instant declared by the `iat` claim, when present and numeric.
	pub issued_at: Option<OffsetDateTime>,
	/// Full payload object, left opaque for callers that need custom claims.
	pub payload: Map<String, Value>,
}

/// Reasons a credential could not be decoded.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum DecodeError {
	/// The credential does not have the `header.payload.signature` shape.
	#[error("Credential has {segments} segments, expected 3.")]
	Malformed {
		/// Number of `.`-separated segments found.
		segments: usize,
	},
	/// The payload segment is not valid base64url.
	#[error("Credential payload is not valid base64url: {message}.")]
	Base64 {
		/// Decoder failure message.
		message: String,
	},
	/// The payload segment is not valid JSON.
	#[error("Credential payload is not valid JSON: {message}.")]
	Json {
		/// Parser failure message.
		message: String,
	},
	/// The payload is valid JSON but not an object.
	#[error("Credential payload is not a JSON object.")]
	NotAnObject,
	/// The payload has no `exp` claim.
	#[error("Credential payload has no exp claim.")]
	MissingExpiry,
	/// The `exp` claim is present but not a number.
	#[error("Credential exp claim is not numeric.")]
	NonNumericExpiry,
	/// The `exp` claim cannot be represented as an instant.
	#[error("Credential exp claim is out of range.")]
	ExpiryOutOfRange,
}

/// Decodes the claim set of `token` without verifying its signature.
///
/// Accepts both base64url and standard base64 alphabets, with or without padding. Never panics;
/// every malformed input maps to a [`DecodeError`].
pub fn decode_claims(token: &str) -> Result<CredentialClaims, DecodeError> {
	let segments = token.split('.').collect::<Vec<_>>();

	if segments.len() != 3 {
		return Err(DecodeError::Malformed { segments: segments.len() });
	}

	let payload_segment = segments[1];

	if payload_segment.is_empty() {
		return Err(DecodeError::Base64 { message: "empty payload segment".into() });
	}

	let normalized = payload_segment
		.trim_end_matches('=')
		.chars()
		.map(|c| match c {
			'+' => '-',
			'/' => '_',
			other => other,
		})
		.collect::<String>();
	let bytes = URL_SAFE_NO_PAD
		.decode(normalized.as_bytes())
		.map_err(|e| DecodeError::Base64 { message: e.to_string() })?;
	let value = serde_json::from_slice::<Value>(&bytes)
		.map_err(|e| DecodeError::Json { message: e.to_string() })?;
	let Value::Object(payload) = value else {
		return Err(DecodeError::NotAnObject);
	};
	let expires_at = match payload.get("exp") {
		None | Some(Value::Null) => return Err(DecodeError::MissingExpiry),
		Some(Value::Number(n)) => timestamp_from_number(n).ok_or(DecodeError::ExpiryOutOfRange)?,
		Some(_) => return Err(DecodeError::NonNumericExpiry),
	};
	let issued_at = match payload.get("iat") {
		Some(Value::Number(n)) => timestamp_from_number(n),
		_ => None,
	};

	Ok(CredentialClaims { expires_at, issued_at, payload })
}

fn timestamp_from_number(n: &serde_json::Number) -> Option<OffsetDateTime> {
	let secs = match n.as_i64() {
		Some(secs) => secs,
		None => {
			let float = n.as_f64()?;

			if !float.is_finite() || float.abs() > i64::MAX as f64 {
				return None;
			}

			float.floor() as i64
		},
	};

	OffsetDateTime::from_unix_timestamp(secs).ok()
}
