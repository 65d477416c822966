//! Single-flight renewal coordination.
//!
//! [`RefreshCoordinator::renew`] is the only path to the remote renewal endpoint and the only
//! renewal-time writer of the [`CredentialStore`]. The first caller starts an attempt; callers
//! arriving while it is outstanding join it and wake exactly when it resolves, all observing the
//! same [`RenewalOutcome`]. The store is written before the outcome is published, so every caller
//! sees a store consistent with the result it receives.
//!
//! An attempt is a shared future owned by the in-flight slot, not by its first caller: dropping
//! that caller (or stopping the monitor that started it) leaves the attempt resumable by any
//! other joiner.

mod metrics;

pub use metrics::RenewalMetrics;

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use futures_util::future::{BoxFuture, FutureExt, Shared};
// self
use crate::{
	_prelude::*,
	auth::Credential,
	error::RenewalError,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	renewal::RenewalEndpoint,
	store::CredentialStore,
};

/// Resolution of one renewal attempt, shared by every caller that joined it.
pub type RenewalOutcome = Result<Credential, RenewalError>;

type SharedOutcome = Shared<BoxFuture<'static, RenewalOutcome>>;

/// What asked for a renewal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenewalTrigger {
	/// The expiration monitor saw the credential approaching expiry.
	Proactive,
	/// An authorized request was rejected with 401.
	Reactive,
	/// The host application asked explicitly.
	Manual,
}
impl RenewalTrigger {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RenewalTrigger::Proactive => "proactive",
			RenewalTrigger::Reactive => "reactive",
			RenewalTrigger::Manual => "manual",
		}
	}
}
impl Display for RenewalTrigger {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

struct InFlight {
	id: u64,
	outcome: SharedOutcome,
}

struct CoordinatorInner {
	endpoint: Arc<dyn RenewalEndpoint>,
	store: Arc<CredentialStore>,
	in_flight: Mutex<Option<InFlight>>,
	next_id: AtomicU64,
	metrics: RenewalMetrics,
}
impl CoordinatorInner {
	fn release(&self, id: u64) {
		let mut slot = self.in_flight.lock();

		if slot.as_ref().is_some_and(|in_flight| in_flight.id == id) {
			*slot = None;
		}
	}
}

/// Gate guaranteeing at most one outstanding remote renewal call.
#[derive(Clone)]
pub struct RefreshCoordinator {
	inner: Arc<CoordinatorInner>,
}
impl RefreshCoordinator {
	/// Creates a coordinator that renews through `endpoint` and writes into `store`.
	pub fn new(endpoint: Arc<dyn RenewalEndpoint>, store: Arc<CredentialStore>) -> Self {
		Self {
			inner: Arc::new(CoordinatorInner {
				endpoint,
				store,
				in_flight: Mutex::new(None),
				next_id: AtomicU64::new(1),
				metrics: RenewalMetrics::default(),
			}),
		}
	}

	/// Returns `true` while a renewal attempt is outstanding.
	pub fn is_in_flight(&self) -> bool {
		self.inner.in_flight.lock().is_some()
	}

	/// Returns the coordination counters.
	pub fn metrics(&self) -> &RenewalMetrics {
		&self.inner.metrics
	}

	/// Starts a renewal, or joins the one already in flight, and waits for its outcome.
	///
	/// On success the returned credential is the one installed in the store by this attempt. On
	/// failure the store has been cleared. Failures are never retried here.
	pub async fn renew(&self, trigger: RenewalTrigger) -> RenewalOutcome {
		self.join_or_start(trigger).await
	}

	/// Waits for the in-flight attempt, if any, without starting a new one.
	pub async fn wait_in_flight(&self) -> Option<RenewalOutcome> {
		let joined = self.inner.in_flight.lock().as_ref().map(|in_flight| {
			self.inner.metrics.record_join();
			tracing::debug!(attempt = in_flight.id, "waiting for in-flight renewal");

			in_flight.outcome.clone()
		});

		match joined {
			Some(outcome) => Some(outcome.await),
			None => None,
		}
	}

	fn join_or_start(&self, trigger: RenewalTrigger) -> SharedOutcome {
		let mut slot = self.inner.in_flight.lock();

		if let Some(in_flight) = slot.as_ref() {
			self.inner.metrics.record_join();
			obs::record_flow_outcome(FlowKind::Renewal, FlowOutcome::Joined);
			tracing::debug!(%trigger, attempt = in_flight.id, "joining in-flight renewal");

			return in_flight.outcome.clone();
		}

		let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
		let outcome = Self::resolve(self.inner.clone(), id, trigger).boxed().shared();

		*slot = Some(InFlight { id, outcome: outcome.clone() });

		outcome
	}

	async fn resolve(
		inner: Arc<CoordinatorInner>,
		id: u64,
		trigger: RenewalTrigger,
	) -> RenewalOutcome {
		const KIND: FlowKind = FlowKind::Renewal;

		let span = FlowSpan::start(KIND, trigger.as_str(), inner.store.epoch());

		inner.metrics.record_attempt();

		let outcome = span
			.instrument(async {
				let revision = inner.store.revision();

				tracing::info!(attempt = id, "renewing credential");

				match inner.endpoint.renew().await {
					Ok(credential) =>
						if inner.store.replace(revision, credential.clone()).await {
							Ok(credential)
						} else {
							Err(RenewalError::Superseded)
						},
					Err(e) => {
						if inner.store.invalidate(revision).await {
							Err(e)
						} else {
							Err(RenewalError::Superseded)
						}
					},
				}
			})
			.await;

		inner.release(id);

		match &outcome {
			Ok(credential) => {
				inner.metrics.record_success();
				span.finish(FlowOutcome::Success);
				tracing::info!(
					attempt = id,
					expires_at = ?credential.expires_at(),
					"credential renewed"
				);
			},
			Err(e) => {
				inner.metrics.record_failure();
				span.finish(FlowOutcome::Failure);
				tracing::warn!(attempt = id, error = %e, "credential renewal failed");
			},
		}

		outcome
	}
}
impl Debug for RefreshCoordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshCoordinator")
			.field("in_flight", &self.is_in_flight())
			.field("metrics", &self.inner.metrics)
			.finish()
	}
}
