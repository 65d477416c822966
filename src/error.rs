//! Session-level error types shared across the store, transport, renewal, and pipeline layers.

// self
use crate::_prelude::*;

/// Session-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Persistence-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Renewal failed; the session cannot continue.
	#[error(transparent)]
	Renewal(#[from] RenewalError),

	/// Sign-in endpoint refused the supplied credentials.
	#[error("Sign-in was rejected with HTTP status {status}.")]
	SignInRejected {
		/// HTTP status returned by the sign-in endpoint.
		status: u16,
	},
	/// An auth endpoint answered with a body that could not be parsed.
	#[error("Auth endpoint returned malformed JSON.")]
	InvalidResponse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// An endpoint URL could not be derived from the base URL.
	#[error("Endpoint `{path}` is not a valid URL relative to the base.")]
	InvalidEndpoint {
		/// Relative path that failed to join.
		path: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A request body could not be serialized.
	#[error("Request body could not be serialized.")]
	RequestBody(#[from] serde_json::Error),
	/// The monitor poll interval must be positive.
	#[error("The monitor poll interval must be positive.")]
	NonPositivePollInterval,
	/// The poll interval must be a whole number of seconds.
	#[error("The monitor poll interval must be a whole number of seconds.")]
	FractionalPollInterval,
	/// The warning threshold cannot be negative.
	#[error("The warning threshold cannot be negative.")]
	NegativeWarningThreshold,
	/// The warning threshold must be a whole number of minutes.
	#[error("The warning threshold must be a whole number of minutes.")]
	FractionalWarningThreshold,
	/// The warning threshold does not fit in a duration.
	#[error("A warning threshold of {minutes} minutes is out of range.")]
	WarningThresholdOutOfRange {
		/// Requested threshold in minutes.
		minutes: i64,
	},
	/// Only a single replay per request is supported.
	#[error("Requests may be replayed at most once, got {requested}.")]
	UnsupportedRetryBudget {
		/// Requested replay count.
		requested: u8,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while sending the request.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while sending the request.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Terminal failure of a single renewal attempt.
///
/// Every caller joined to the same attempt receives a clone of the same value, so the variants
/// only carry cheaply cloneable payloads. Rejections and transport failures are treated alike by
/// the session: both clear the credential.
#[derive(Clone, Debug, ThisError)]
pub enum RenewalError {
	/// The renewal endpoint explicitly refused to issue a new credential.
	#[error("Renewal endpoint rejected the session with HTTP status {status}.")]
	Rejected {
		/// HTTP status returned by the renewal endpoint.
		status: u16,
	},
	/// The renewal endpoint could not be reached.
	#[error("Renewal endpoint is unreachable.")]
	Transport(#[source] Arc<TransportError>),
	/// The renewal endpoint answered successfully but without a usable credential.
	#[error("Renewal endpoint returned an unusable response: {message}.")]
	InvalidResponse {
		/// Human-readable parsing failure.
		message: String,
	},
	/// The session was signed in or out while the renewal was in flight, or there was no session
	/// to renew; the result was dropped.
	#[error("Session changed while the renewal was in flight.")]
	Superseded,
}
impl RenewalError {
	/// Returns `true` when the remote system explicitly refused the renewal.
	pub fn is_rejection(&self) -> bool {
		matches!(self, Self::Rejected { .. })
	}
}
impl From<TransportError> for RenewalError {
	fn from(e: TransportError) -> Self {
		Self::Transport(Arc::new(e))
	}
}
