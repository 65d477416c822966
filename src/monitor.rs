//! Expiration monitor: periodic time-to-live checks and proactive renewal.
//!
//! The monitor runs as a Tokio task ticking every [`SessionConfig::poll_interval`]; the first tick
//! fires immediately. When the credential's remaining lifetime drops below the warning threshold it
//! asks the [`RefreshCoordinator`] for one proactive renewal per approaching-expiry window. The
//! renewal runs on its own task, so stopping the monitor never cancels an attempt other callers may
//! have joined.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use tokio::{
	runtime::Handle,
	task::JoinHandle,
	time::{self as timer, MissedTickBehavior},
};
// self
use crate::{
	_prelude::*,
	auth::BearerSecret,
	config::SessionConfig,
	coordinator::{RefreshCoordinator, RenewalOutcome, RenewalTrigger},
	error::RenewalError,
	escalation::SessionUi,
	obs::{FlowKind, FlowOutcome, FlowSpan},
	store::CredentialStore,
};

/// What a single check decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckOutcome {
	/// No credential is held.
	NoCredential,
	/// The credential carries no decodable expiry.
	UnknownExpiry,
	/// Remaining lifetime is above the warning threshold.
	Healthy,
	/// A proactive renewal was started by this check.
	RenewalStarted,
	/// A proactive renewal was already tried for this credential.
	AlreadyAttempted,
	/// A renewal is already in flight.
	RenewalInFlight,
}

/// Counters describing monitor activity.
#[derive(Debug, Default)]
pub struct MonitorMetrics {
	checks: AtomicU64,
	proactive_renewals: AtomicU64,
}
impl MonitorMetrics {
	/// Returns the number of checks performed.
	pub fn checks(&self) -> u64 {
		self.checks.load(Ordering::Relaxed)
	}

	/// Returns the number of proactive renewals requested.
	pub fn proactive_renewals(&self) -> u64 {
		self.proactive_renewals.load(Ordering::Relaxed)
	}
}

#[derive(Debug, Default)]
struct WarningState {
	// Credential a proactive renewal was already requested for.
	attempted_for: Option<BearerSecret>,
	indicator_visible: bool,
}

struct MonitorShared {
	store: Arc<CredentialStore>,
	coordinator: RefreshCoordinator,
	ui: Arc<dyn SessionUi>,
	config: SessionConfig,
	warning: Mutex<WarningState>,
	metrics: MonitorMetrics,
}
impl MonitorShared {
	fn check_at(self: &Arc<Self>, now: OffsetDateTime) -> CheckOutcome {
		self.metrics.checks.fetch_add(1, Ordering::Relaxed);

		let span = FlowSpan::start(FlowKind::Monitor, "check", self.store.epoch());
		let outcome = {
			let _entered = span.entered();

			self.evaluate(now)
		};

		span.finish(FlowOutcome::Success);

		outcome
	}

	fn evaluate(self: &Arc<Self>, now: OffsetDateTime) -> CheckOutcome {
		let Some(credential) = self.store.get() else {
			return CheckOutcome::NoCredential;
		};
		let mut warning = self.warning.lock();

		if warning.attempted_for.as_ref().is_some_and(|secret| secret != credential.secret()) {
			warning.attempted_for = None;
		}

		let Some(ttl) = credential.time_to_live_at(now) else {
			return CheckOutcome::UnknownExpiry;
		};

		if ttl >= self.config.warning_threshold {
			warning.attempted_for = None;

			let hide = std::mem::take(&mut warning.indicator_visible);

			drop(warning);

			if hide {
				self.ui.expiry_warning(false);
			}

			return CheckOutcome::Healthy;
		}
		if self.coordinator.is_in_flight() {
			return CheckOutcome::RenewalInFlight;
		}
		if warning.attempted_for.is_some() {
			return CheckOutcome::AlreadyAttempted;
		}

		let Ok(runtime) = Handle::try_current() else {
			tracing::warn!("proactive renewal skipped outside of a Tokio runtime");

			return CheckOutcome::AlreadyAttempted;
		};

		warning.attempted_for = Some(credential.secret().clone());

		drop(warning);

		self.metrics.proactive_renewals.fetch_add(1, Ordering::Relaxed);
		tracing::info!(ttl_seconds = ttl.whole_seconds(), "credential nearing expiry");

		let shared = self.clone();

		runtime.spawn(async move {
			let outcome = shared.coordinator.renew(RenewalTrigger::Proactive).await;

			shared.settle(&outcome);
		});

		CheckOutcome::RenewalStarted
	}

	fn settle(&self, outcome: &RenewalOutcome) {
		let visible = match outcome {
			Ok(_) => false,
			Err(RenewalError::Superseded) => return,
			Err(e) => {
				tracing::warn!(error = %e, "proactive renewal failed");

				true
			},
		};
		let changed = {
			let mut warning = self.warning.lock();

			if !visible {
				warning.attempted_for = None;
			}

			std::mem::replace(&mut warning.indicator_visible, visible) != visible
		};

		if changed {
			self.ui.expiry_warning(visible);
		}
	}

	fn reset(&self) {
		let hide = {
			let mut warning = self.warning.lock();

			warning.attempted_for = None;

			std::mem::take(&mut warning.indicator_visible)
		};

		if hide {
			self.ui.expiry_warning(false);
		}
	}
}

/// Start/stop-able background task watching the credential's remaining lifetime.
pub struct ExpirationMonitor {
	shared: Arc<MonitorShared>,
	task: Mutex<Option<JoinHandle<()>>>,
}
impl ExpirationMonitor {
	/// Creates an idle monitor.
	pub fn new(
		store: Arc<CredentialStore>,
		coordinator: RefreshCoordinator,
		ui: Arc<dyn SessionUi>,
		config: SessionConfig,
	) -> Self {
		Self {
			shared: Arc::new(MonitorShared {
				store,
				coordinator,
				ui,
				config,
				warning: Mutex::default(),
				metrics: MonitorMetrics::default(),
			}),
			task: Mutex::new(None),
		}
	}

	/// Starts checking, beginning with an immediate check.
	///
	/// Restarts the timer when already running; at most one timer is ever active. Outside of a
	/// Tokio runtime the monitor stays idle.
	pub fn start(&self) {
		let Ok(runtime) = Handle::try_current() else {
			tracing::warn!("expiration monitor requires a Tokio runtime");

			return;
		};
		let shared = self.shared.clone();
		let period = shared.config.poll_period();
		let task = runtime.spawn(async move {
			let mut ticker = timer::interval(period);

			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

			loop {
				ticker.tick().await;
				shared.check_at(OffsetDateTime::now_utc());
			}
		});

		if let Some(previous) = self.task.lock().replace(task) {
			previous.abort();
		}

		tracing::debug!(period_seconds = period.as_secs(), "expiration monitor started");
	}

	/// Cancels the timer and clears warning state. In-flight renewals keep running.
	pub fn stop(&self) {
		if let Some(task) = self.task.lock().take() {
			task.abort();
			tracing::debug!("expiration monitor stopped");
		}

		self.shared.reset();
	}

	/// Returns `true` while the timer is active.
	pub fn is_running(&self) -> bool {
		self.task.lock().as_ref().is_some_and(|task| !task.is_finished())
	}

	/// Runs one check against the current wall clock.
	pub fn check(&self) -> CheckOutcome {
		self.check_at(OffsetDateTime::now_utc())
	}

	/// Runs one check as if the current instant were `now`.
	pub fn check_at(&self, now: OffsetDateTime) -> CheckOutcome {
		self.shared.check_at(now)
	}

	/// Returns `true` while the "session expiring" indicator is raised.
	pub fn is_warning_visible(&self) -> bool {
		self.shared.warning.lock().indicator_visible
	}

	/// Returns the monitor counters.
	pub fn metrics(&self) -> &MonitorMetrics {
		&self.shared.metrics
	}
}
impl Drop for ExpirationMonitor {
	fn drop(&mut self) {
		if let Some(task) = self.task.get_mut().take() {
			task.abort();
		}
	}
}
impl Debug for ExpirationMonitor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ExpirationMonitor")
			.field("running", &self.is_running())
			.field("warning", &*self.shared.warning.lock())
			.field("metrics", &self.shared.metrics)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::AtomicUsize;
	// crates.io
	use tokio::sync::Notify;
	// self
	use super::*;
	use crate::{
		auth::{Credential, SignIn},
		escalation::{AckFuture, SessionEndedNotice},
		renewal::{RenewalEndpoint, RenewalFuture},
	};

	#[derive(Default)]
	struct IndicatorUi {
		shown: AtomicUsize,
		hidden: AtomicUsize,
	}
	impl SessionUi for IndicatorUi {
		fn expiry_warning(&self, visible: bool) {
			if visible {
				self.shown.fetch_add(1, Ordering::SeqCst);
			} else {
				self.hidden.fetch_add(1, Ordering::SeqCst);
			}
		}

		fn session_ended(&self, _: SessionEndedNotice) -> AckFuture<'_> {
			Box::pin(async {})
		}

		fn redirect_to_sign_in(&self) {}
	}

	struct GatedEndpoint {
		calls: AtomicUsize,
		gate: Notify,
		outcome: RenewalOutcome,
	}
	impl RenewalEndpoint for GatedEndpoint {
		fn renew(&self) -> RenewalFuture<'_> {
			self.calls.fetch_add(1, Ordering::SeqCst);

			Box::pin(async move {
				self.gate.notified().await;

				self.outcome.clone()
			})
		}
	}

	struct Fixture {
		monitor: ExpirationMonitor,
		coordinator: RefreshCoordinator,
		endpoint: Arc<GatedEndpoint>,
		ui: Arc<IndicatorUi>,
	}

	const NOW: OffsetDateTime = time::macros::datetime!(2025-01-01 00:00 UTC);

	fn token_expiring_at(instant: OffsetDateTime) -> String {
		// crates.io
		use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

		let payload = format!(r#"{{"exp":{}}}"#, instant.unix_timestamp());

		format!("h.{}.s", URL_SAFE_NO_PAD.encode(payload))
	}

	async fn fixture(expires_at: OffsetDateTime, outcome: RenewalOutcome) -> Fixture {
		let store = Arc::new(CredentialStore::new());
		let endpoint = Arc::new(GatedEndpoint {
			calls: AtomicUsize::new(0),
			gate: Notify::new(),
			outcome,
		});
		let coordinator = RefreshCoordinator::new(endpoint.clone(), store.clone());
		let ui = Arc::new(IndicatorUi::default());
		let monitor = ExpirationMonitor::new(
			store.clone(),
			coordinator.clone(),
			ui.clone(),
			SessionConfig::default(),
		);

		store
			.open_session(SignIn::new(
				Credential::from_token(token_expiring_at(expires_at)),
				None,
			))
			.await
			.expect("Sign-in should succeed.");

		Fixture { monitor, coordinator, endpoint, ui }
	}

	async fn settle(coordinator: &RefreshCoordinator) {
		while coordinator.is_in_flight() {
			tokio::task::yield_now().await;
		}
		for _ in 0..4 {
			tokio::task::yield_now().await;
		}
	}

	#[tokio::test]
	async fn one_proactive_renewal_per_window() {
		let f = fixture(NOW + Duration::minutes(20), Ok(Credential::from_token("renewed"))).await;

		assert_eq!(f.monitor.check_at(NOW), CheckOutcome::RenewalStarted);

		while !f.coordinator.is_in_flight() {
			tokio::task::yield_now().await;
		}

		assert_eq!(
			f.monitor.check_at(NOW + Duration::seconds(30)),
			CheckOutcome::RenewalInFlight
		);
		assert_eq!(f.endpoint.calls.load(Ordering::SeqCst), 1);
		assert_eq!(f.monitor.metrics().proactive_renewals(), 1);

		f.endpoint.gate.notify_one();
		settle(&f.coordinator).await;

		assert!(!f.monitor.is_warning_visible());
		assert_eq!(f.monitor.check_at(NOW), CheckOutcome::UnknownExpiry);
		assert_eq!(f.ui.shown.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn failed_proactive_renewal_raises_indicator_once() {
		let f =
			fixture(NOW + Duration::minutes(5), Err(RenewalError::Rejected { status: 401 })).await;

		f.endpoint.gate.notify_one();

		assert_eq!(f.monitor.check_at(NOW), CheckOutcome::RenewalStarted);

		settle(&f.coordinator).await;

		assert!(f.monitor.is_warning_visible());
		assert_eq!(f.ui.shown.load(Ordering::SeqCst), 1);
		assert_eq!(f.monitor.check_at(NOW), CheckOutcome::NoCredential);
		assert_eq!(f.endpoint.calls.load(Ordering::SeqCst), 1);

		f.monitor.stop();

		assert!(!f.monitor.is_warning_visible());
		assert_eq!(f.ui.hidden.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn healthy_credential_needs_no_renewal() {
		let f = fixture(NOW + Duration::hours(2), Ok(Credential::from_token("unused"))).await;

		assert_eq!(f.monitor.check_at(NOW), CheckOutcome::Healthy);
		assert_eq!(f.monitor.check_at(NOW + Duration::minutes(89)), CheckOutcome::Healthy);
		assert_eq!(f.monitor.check_at(NOW + Duration::minutes(91)), CheckOutcome::RenewalStarted);
		assert_eq!(f.monitor.metrics().checks(), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn restart_keeps_a_single_timer() {
		let expires_at = OffsetDateTime::now_utc() + Duration::hours(2);
		let f = fixture(expires_at, Ok(Credential::from_token("unused"))).await;

		f.monitor.start();
		f.monitor.start();

		assert!(f.monitor.is_running());

		timer::sleep(std::time::Duration::from_secs(95)).await;

		assert_eq!(f.monitor.metrics().checks(), 4);

		f.monitor.stop();
		timer::sleep(std::time::Duration::from_secs(120)).await;

		assert!(!f.monitor.is_running());
		assert_eq!(f.monitor.metrics().checks(), 4);
	}
}
