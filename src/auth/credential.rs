//! Immutable bearer credential with its best-effort expiry estimate.

// self
use crate::{
	_prelude::*,
	auth::{claims, secret::BearerSecret},
};

/// A complete bearer credential as held by the [`CredentialStore`](crate::store::CredentialStore).
///
/// Instances are immutable and replaced wholesale, so readers never observe a partially updated
/// credential. The expiry is `None` when the token could not be decoded; such credentials are still
/// attached to requests, they just never trigger proactive renewal.
#[derive(Clone, PartialEq)]
pub struct Credential {
	secret: BearerSecret,
	expires_at: Option<OffsetDateTime>,
	issued_at: Option<OffsetDateTime>,
}
impl Credential {
	/// Builds a credential from a raw token, decoding its expiry claim when possible.
	pub fn from_token(token: impl Into<String>) -> Self {
		let secret = BearerSecret::new(token);

		match claims::decode_claims(secret.expose()) {
			Ok(claims) => Self {
				secret,
				expires_at: Some(claims.expires_at),
				issued_at: claims.issued_at,
			},
			Err(e) => {
				tracing::debug!(error = %e, "credential expiry is unknown");

				Self { secret, expires_at: None, issued_at: None }
			},
		}
	}

	/// Uses `instant` as the expiry when the token itself did not declare a decodable one.
	pub fn with_fallback_expiry(mut self, instant: Option<OffsetDateTime>) -> Self {
		if self.expires_at.is_none() {
			self.expires_at = instant;
		}

		self
	}

	/// Returns the redacted secret.
	pub fn secret(&self) -> &BearerSecret {
		&self.secret
	}

	/// Returns the expiry instant, if known.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		self.expires_at
	}

	/// Returns the issued-at instant, if known.
	pub fn issued_at(&self) -> Option<OffsetDateTime> {
		self.issued_at
	}

	/// Remaining lifetime at `now`; negative once expired, `None` when the expiry is unknown.
	pub fn time_to_live_at(&self, now: OffsetDateTime) -> Option<Duration> {
		self.expires_at.map(|expires_at| expires_at - now)
	}

	/// Returns `true` if the credential is known to be expired at `now`.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		self.time_to_live_at(now).is_some_and(|ttl| !ttl.is_positive())
	}

	/// Returns `true` if the credential is known to expire within `window` of `now`.
	pub fn expires_within_at(&self, now: OffsetDateTime, window: Duration) -> bool {
		self.time_to_live_at(now).is_some_and(|ttl| ttl < window)
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("secret", &"<redacted>")
			.field("expires_at", &self.expires_at)
			.field("issued_at", &self.issued_at)
			.finish()
	}
}

/// Result of a successful sign-in: the credential plus the identity label shown to the user.
#[derive(Clone, Debug)]
pub struct SignIn {
	/// Freshly issued credential.
	pub credential: Credential,
	/// Identity label (typically an email address) persisted next to the credential.
	pub identity: Option<String>,
}
impl SignIn {
	/// Creates a sign-in payload.
	pub fn new(credential: Credential, identity: Option<String>) -> Self {
		Self { credential, identity }
	}
}
