//! Session tuning knobs and auth endpoint locations.

// self
use crate::{_prelude::*, error::ConfigError};

/// Tunables for proactive monitoring and reactive replay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSessionConfig", into = "RawSessionConfig")]
pub struct SessionConfig {
	/// Remaining lifetime below which the monitor attempts a proactive renewal.
	pub warning_threshold: Duration,
	/// Interval between two monitor checks.
	pub poll_interval: Duration,
	/// Replays allowed per request after a rejection; fixed at one.
	pub max_retries_per_request: u8,
}
impl SessionConfig {
	/// Default warning threshold (30 minutes).
	pub const DEFAULT_WARNING_THRESHOLD: Duration = Duration::minutes(30);
	/// Default monitor poll interval (30 seconds).
	pub const DEFAULT_POLL_INTERVAL: Duration = Duration::seconds(30);
	/// The only supported replay budget.
	pub const MAX_RETRIES_PER_REQUEST: u8 = 1;

	/// Overrides the warning threshold.
	pub fn with_warning_threshold(mut self, threshold: Duration) -> Self {
		self.warning_threshold = threshold;

		self
	}

	/// Overrides the monitor poll interval.
	pub fn with_poll_interval(mut self, interval: Duration) -> Self {
		self.poll_interval = interval;

		self
	}

	/// Checks the invariants the monitor and pipeline rely on.
	///
	/// The poll interval must be whole seconds and the threshold whole minutes, matching the units
	/// of the serialized form.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if !self.poll_interval.is_positive() {
			return Err(ConfigError::NonPositivePollInterval);
		}
		if self.poll_interval.subsec_nanoseconds() != 0 {
			return Err(ConfigError::FractionalPollInterval);
		}
		if self.warning_threshold.is_negative() {
			return Err(ConfigError::NegativeWarningThreshold);
		}
		if self.warning_threshold.subsec_nanoseconds() != 0
			|| self.warning_threshold.whole_seconds() % 60 != 0
		{
			return Err(ConfigError::FractionalWarningThreshold);
		}
		if self.max_retries_per_request != Self::MAX_RETRIES_PER_REQUEST {
			return Err(ConfigError::UnsupportedRetryBudget {
				requested: self.max_retries_per_request,
			});
		}

		Ok(())
	}

	/// Poll interval as a [`std::time::Duration`] for the async timer.
	pub(crate) fn poll_period(&self) -> std::time::Duration {
		std::time::Duration::try_from(self.poll_interval)
			.unwrap_or(std::time::Duration::from_secs(30))
	}
}
impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			warning_threshold: Self::DEFAULT_WARNING_THRESHOLD,
			poll_interval: Self::DEFAULT_POLL_INTERVAL,
			max_retries_per_request: Self::MAX_RETRIES_PER_REQUEST,
		}
	}
}

/// Wire shape of [`SessionConfig`]: whole minutes and seconds.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
struct RawSessionConfig {
	warning_threshold_minutes: i64,
	poll_interval_seconds: i64,
	max_retries_per_request: u8,
}
impl Default for RawSessionConfig {
	fn default() -> Self {
		SessionConfig::default().into()
	}
}
impl TryFrom<RawSessionConfig> for SessionConfig {
	type Error = ConfigError;

	fn try_from(raw: RawSessionConfig) -> Result<Self, Self::Error> {
		let minutes = raw.warning_threshold_minutes;
		let threshold_seconds = minutes
			.checked_mul(60)
			.ok_or(ConfigError::WarningThresholdOutOfRange { minutes })?;
		let config = Self {
			warning_threshold: Duration::seconds(threshold_seconds),
			poll_interval: Duration::seconds(raw.poll_interval_seconds),
			max_retries_per_request: raw.max_retries_per_request,
		};

		config.validate()?;

		Ok(config)
	}
}
impl From<SessionConfig> for RawSessionConfig {
	fn from(config: SessionConfig) -> Self {
		Self {
			warning_threshold_minutes: config.warning_threshold.whole_minutes(),
			poll_interval_seconds: config.poll_interval.whole_seconds(),
			max_retries_per_request: config.max_retries_per_request,
		}
	}
}

/// Locations of the remote auth endpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthEndpoints {
	/// Sign-in endpoint accepting `{email, password}`.
	pub login: Url,
	/// Renewal endpoint; renewal material travels in an HTTP-only cookie.
	pub renewal: Url,
	/// Optional sign-out endpoint notified on explicit sign-out.
	pub logout: Option<Url>,
}
impl AuthEndpoints {
	const LOGIN_PATH: &'static str = "api/auth/login/";
	const LOGOUT_PATH: &'static str = "api/auth/logout/";
	const RENEWAL_PATH: &'static str = "api/token/refresh/";

	/// Derives the default endpoint layout from a base URL.
	///
	/// The base should end with `/`; otherwise its last path segment is replaced when joining.
	pub fn from_base(base: &Url) -> Result<Self, ConfigError> {
		let join = |path: &'static str| {
			base.join(path).map_err(|source| ConfigError::InvalidEndpoint { path, source })
		};

		Ok(Self {
			login: join(Self::LOGIN_PATH)?,
			renewal: join(Self::RENEWAL_PATH)?,
			logout: Some(join(Self::LOGOUT_PATH)?),
		})
	}
}
