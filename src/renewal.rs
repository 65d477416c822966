//! Remote renewal contract and the HTTP auth API that implements it.
//!
//! [`RenewalEndpoint`] is the single seam through which the
//! [`RefreshCoordinator`](crate::coordinator::RefreshCoordinator) reaches the remote system.
//! [`HttpAuthApi`] speaks the JSON dialect of the default backend: renewal posts an empty body
//! (the renewal cookie travels out of band) and reads `{"access": "<token>"}`, while sign-in posts
//! `{email, password}` and reads `{"access_token": "<token>", "user": {"email": ".."}}`.

// crates.io
use time::format_description::well_known::Rfc3339;
// self
use crate::{
	_prelude::*,
	auth::{Credential, SignIn},
	config::AuthEndpoints,
	error::{ConfigError, RenewalError},
	http::{HttpRequest, HttpTransport},
};

/// Boxed future returned by [`RenewalEndpoint::renew`].
pub type RenewalFuture<'a> =
	Pin<Box<dyn Future<Output = Result<Credential, RenewalError>> + 'a + Send>>;

/// Remote operation that exchanges out-of-band renewal material for a new credential.
pub trait RenewalEndpoint
where
	Self: Send + Sync,
{
	/// Performs one renewal call. Implementations must not retry internally.
	fn renew(&self) -> RenewalFuture<'_>;
}
impl<T> RenewalEndpoint for Arc<T>
where
	T: ?Sized + RenewalEndpoint,
{
	fn renew(&self) -> RenewalFuture<'_> {
		(**self).renew()
	}
}

#[derive(Debug, Deserialize)]
struct RenewalResponse {
	#[serde(alias = "access_token")]
	access: String,
	#[serde(default)]
	access_expiration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
	access_token: String,
	#[serde(default)]
	user: Option<LoginUser>,
}

#[derive(Debug, Deserialize)]
struct LoginUser {
	#[serde(default)]
	email: Option<String>,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
	email: &'a str,
	password: &'a str,
}

/// HTTP implementation of the auth endpoints.
pub struct HttpAuthApi<T>
where
	T: ?Sized + HttpTransport,
{
	transport: Arc<T>,
	endpoints: AuthEndpoints,
}
impl<T> HttpAuthApi<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates an API client over `transport`.
	///
	/// Use a transport that keeps cookies so the renewal cookie set at sign-in is replayed.
	pub fn new(transport: impl Into<Arc<T>>, endpoints: AuthEndpoints) -> Self {
		Self { transport: transport.into(), endpoints }
	}

	/// Returns the configured endpoint layout.
	pub fn endpoints(&self) -> &AuthEndpoints {
		&self.endpoints
	}

	/// Exchanges an email/password pair for a credential.
	pub async fn login(&self, email: &str, password: &str) -> Result<SignIn> {
		let request = HttpRequest::post(self.endpoints.login.clone())
			.with_json(&LoginRequest { email, password })
			.map_err(ConfigError::from)?;
		let response = self.transport.execute(request).await?;

		if !response.status.is_success() {
			tracing::info!(status = response.status.as_u16(), "sign-in rejected");

			return Err(Error::SignInRejected { status: response.status.as_u16() });
		}

		let body = response
			.json::<LoginResponse>()
			.map_err(|source| Error::InvalidResponse { source })?;
		let identity = body.user.and_then(|user| user.email);

		Ok(SignIn::new(Credential::from_token(body.access_token), identity))
	}

	/// Notifies the server that the session ended. Failures are reported but harmless.
	pub async fn logout(&self) -> Result<()> {
		let Some(url) = self.endpoints.logout.clone() else {
			return Ok(());
		};
		let response = self.transport.execute(HttpRequest::post(url)).await?;

		if !response.status.is_success() {
			tracing::debug!(status = response.status.as_u16(), "sign-out endpoint refused");
		}

		Ok(())
	}

	async fn renew_once(&self) -> Result<Credential, RenewalError> {
		let request = HttpRequest::post(self.endpoints.renewal.clone());
		let response = self.transport.execute(request).await?;

		if !response.status.is_success() {
			return Err(RenewalError::Rejected { status: response.status.as_u16() });
		}

		let body = response
			.json::<RenewalResponse>()
			.map_err(|e| RenewalError::InvalidResponse { message: e.to_string() })?;

		if body.access.is_empty() {
			return Err(RenewalError::InvalidResponse { message: "empty access token".into() });
		}

		let fallback_expiry = body
			.access_expiration
			.as_deref()
			.and_then(|raw| OffsetDateTime::parse(raw, &Rfc3339).ok());

		Ok(Credential::from_token(body.access).with_fallback_expiry(fallback_expiry))
	}
}
impl<T> RenewalEndpoint for HttpAuthApi<T>
where
	T: ?Sized + HttpTransport,
{
	fn renew(&self) -> RenewalFuture<'_> {
		Box::pin(self.renew_once())
	}
}
impl<T> Debug for HttpAuthApi<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HttpAuthApi").field("endpoints", &self.endpoints).finish()
	}
}
