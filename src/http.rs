//! Transport primitives for authorized requests and auth endpoint calls.
//!
//! [`HttpTransport`] is the crate's only dependency on an HTTP stack. Requests are plain owned
//! values ([`HttpRequest`]) so the pipeline can replay them unchanged apart from the
//! `Authorization` header. The reqwest-backed [`ReqwestHttpClient`] is enabled by the default
//! `reqwest` feature.

// crates.io
use ::http::{
	HeaderMap, HeaderValue, Method, StatusCode,
	header::{AUTHORIZATION, CONTENT_TYPE, InvalidHeaderValue},
};
// self
use crate::{_prelude::*, auth::BearerSecret, error::TransportError};

/// Boxed future returned by [`HttpTransport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of executing a fully buffered request.
///
/// Implementations must treat non-2xx statuses as successful transport outcomes; only network
/// level failures map to [`TransportError`].
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and buffers the response.
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_>;
}
impl<T> HttpTransport for Arc<T>
where
	T: ?Sized + HttpTransport,
{
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_> {
		(**self).execute(request)
	}
}

/// Owned, replayable outbound request.
#[derive(Clone, Debug)]
pub struct HttpRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute target URL.
	pub url: Url,
	/// Request headers; `Authorization` is managed by the pipeline.
	pub headers: HeaderMap,
	/// Optional buffered body.
	pub body: Option<Vec<u8>>,
}
impl HttpRequest {
	/// Creates a request without headers or body.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, headers: HeaderMap::new(), body: None }
	}

	/// Shorthand for a `GET` request.
	pub fn get(url: Url) -> Self {
		Self::new(Method::GET, url)
	}

	/// Shorthand for a `POST` request.
	pub fn post(url: Url) -> Self {
		Self::new(Method::POST, url)
	}

	/// Sets a raw body.
	pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = Some(body.into());

		self
	}

	/// Serializes `payload` as the JSON body.
	pub fn with_json<T>(mut self, payload: &T) -> Result<Self, serde_json::Error>
	where
		T: ?Sized + Serialize,
	{
		self.body = Some(serde_json::to_vec(payload)?);
		self.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

		Ok(self)
	}

	/// Returns the current `Authorization` header, if it is valid UTF-8.
	pub fn authorization(&self) -> Option<&str> {
		self.headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok())
	}

	/// Replaces the `Authorization` header with a bearer credential.
	pub(crate) fn set_bearer(&mut self, secret: &BearerSecret) -> Result<(), InvalidHeaderValue> {
		self.headers.insert(AUTHORIZATION, secret.header_value()?);

		Ok(())
	}

	/// Removes any `Authorization` header.
	pub(crate) fn clear_authorization(&mut self) {
		self.headers.remove(AUTHORIZATION);
	}
}

/// Fully buffered response.
#[derive(Clone, Debug)]
pub struct HttpResponse {
	/// Response status.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Response body.
	pub body: Vec<u8>,
}
impl HttpResponse {
	/// Creates an empty response with the given status.
	pub fn new(status: StatusCode) -> Self {
		Self { status, headers: HeaderMap::new(), body: Vec::new() }
	}

	/// Sets the body.
	pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = body.into();

		self
	}

	/// Returns `true` for the authorization-rejected status (401).
	pub fn is_unauthorized(&self) -> bool {
		self.status == StatusCode::UNAUTHORIZED
	}

	/// Parses the body as JSON, reporting the failing path on error.
	pub fn json<T>(&self) -> Result<T, serde_path_to_error::Error<serde_json::Error>>
	where
		T: serde::de::DeserializeOwned,
	{
		let mut deserializer = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut deserializer)
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Renewal material travels in an HTTP-only cookie, so the client used for the renewal endpoint
/// must keep a cookie store; [`ReqwestHttpClient::with_cookie_store`] builds one.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client that remembers cookies between calls.
	pub fn with_cookie_store() -> Result<Self, crate::error::ConfigError> {
		Ok(Self(ReqwestClient::builder().cookie_store(true).build()?))
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestHttpClient {
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let mut builder = client.request(request.method, request.url).headers(request.headers);

			if let Some(body) = request.body {
				builder = builder.body(body);
			}

			let response = builder.send().await?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let body = response.bytes().await?.to_vec();

			Ok(HttpResponse { status, headers, body })
		})
	}
}
