//! Escalation path taken when a session can no longer be renewed.
//!
//! [`EscalationHandler::escalate`] clears the store, stops the expiration monitor, shows one
//! blocking notice, and sends the user back to sign-in once the notice is acknowledged. Each
//! session epoch escalates at most once, no matter how many requests observed the same failure.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	error::RenewalError,
	monitor::ExpirationMonitor,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::CredentialStore,
};

/// Boxed future resolved when the user acknowledges a notice.
pub type AckFuture<'a> = Pin<Box<dyn Future<Output = ()> + 'a + Send>>;

/// User-facing surface the session talks to.
pub trait SessionUi
where
	Self: Send + Sync,
{
	/// Shows or hides the non-blocking "session expiring" indicator.
	fn expiry_warning(&self, visible: bool);

	/// Presents the blocking "session ended" notice and resolves once it is acknowledged.
	fn session_ended(&self, notice: SessionEndedNotice) -> AckFuture<'_>;

	/// Navigates to the unauthenticated entry point.
	fn redirect_to_sign_in(&self);
}
impl<T> SessionUi for Arc<T>
where
	T: ?Sized + SessionUi,
{
	fn expiry_warning(&self, visible: bool) {
		(**self).expiry_warning(visible)
	}

	fn session_ended(&self, notice: SessionEndedNotice) -> AckFuture<'_> {
		(**self).session_ended(notice)
	}

	fn redirect_to_sign_in(&self) {
		(**self).redirect_to_sign_in()
	}
}

/// Content of the blocking notice shown when a session ends.
///
/// The notice offers a single acknowledgment action; it cannot be dismissed by clicking outside
/// of it or pressing escape.
#[derive(Clone, Debug)]
pub struct SessionEndedNotice {
	/// Message shown to the user.
	pub message: String,
	/// Renewal failure that ended the session.
	pub cause: RenewalError,
	/// Identity label of the session that ended, if known.
	pub identity: Option<String>,
	/// Always `false`.
	pub dismiss_on_click_outside: bool,
	/// Always `false`.
	pub dismiss_on_escape: bool,
}
impl SessionEndedNotice {
	/// Default message shown to the user.
	pub const DEFAULT_MESSAGE: &'static str = "Your session has expired. Please sign in again.";

	fn new(cause: RenewalError, identity: Option<String>) -> Self {
		Self {
			message: Self::DEFAULT_MESSAGE.into(),
			cause,
			identity,
			dismiss_on_click_outside: false,
			dismiss_on_escape: false,
		}
	}
}

/// [`SessionUi`] for headless hosts: logs every event and acknowledges notices immediately.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingUi;
impl SessionUi for TracingUi {
	fn expiry_warning(&self, visible: bool) {
		tracing::info!(visible, "session expiry warning changed");
	}

	fn session_ended(&self, notice: SessionEndedNotice) -> AckFuture<'_> {
		tracing::warn!(cause = %notice.cause, message = %notice.message, "session ended");

		Box::pin(async {})
	}

	fn redirect_to_sign_in(&self) {
		tracing::info!("redirecting to sign-in");
	}
}

/// Result of one [`EscalationHandler::escalate`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EscalationOutcome {
	/// This call ended the session and showed the notice.
	Escalated,
	/// Nothing to do: the epoch was already escalated, signed out, or never signed in.
	Skipped,
}

/// Terminal recovery path for unrecoverable renewal failures.
pub struct EscalationHandler {
	store: Arc<CredentialStore>,
	monitor: Arc<ExpirationMonitor>,
	ui: Arc<dyn SessionUi>,
	handled_epoch: AtomicU64,
	notices: AtomicU64,
}
impl EscalationHandler {
	/// Creates a handler clearing `store`, stopping `monitor`, and notifying through `ui`.
	pub fn new(
		store: Arc<CredentialStore>,
		monitor: Arc<ExpirationMonitor>,
		ui: Arc<dyn SessionUi>,
	) -> Self {
		Self { store, monitor, ui, handled_epoch: AtomicU64::new(0), notices: AtomicU64::new(0) }
	}

	/// Number of notices shown so far.
	pub fn notices_shown(&self) -> u64 {
		self.notices.load(Ordering::Relaxed)
	}

	/// Ends the current session because of `cause`.
	///
	/// Safe to call concurrently: only the first call for a session epoch clears state and shows
	/// the notice, later calls return [`EscalationOutcome::Skipped`] immediately. The call that
	/// escalates resolves after the user acknowledged the notice and was redirected.
	pub async fn escalate(&self, cause: RenewalError) -> EscalationOutcome {
		const KIND: FlowKind = FlowKind::Escalation;

		if matches!(cause, RenewalError::Superseded) {
			return EscalationOutcome::Skipped;
		}

		let epoch = self.store.epoch();

		if epoch == 0 || self.handled_epoch.fetch_max(epoch, Ordering::AcqRel) >= epoch {
			obs::record_flow_outcome(KIND, FlowOutcome::Joined);
			tracing::debug!(epoch, "session already escalated");

			return EscalationOutcome::Skipped;
		}

		let span = FlowSpan::start(KIND, "escalate", epoch);

		span.instrument(async {
			let identity = self.store.identity();

			tracing::warn!(epoch, cause = %cause, "ending session");

			if let Err(e) = self.store.clear().await {
				tracing::warn!(error = %e, "failed to drop persisted session");
			}

			self.monitor.stop();
			self.notices.fetch_add(1, Ordering::Relaxed);
			self.ui.session_ended(SessionEndedNotice::new(cause, identity)).await;
			self.ui.redirect_to_sign_in();
		})
		.await;

		span.finish(FlowOutcome::Success);

		EscalationOutcome::Escalated
	}

	/// Returns `true` once `epoch` was escalated or retired.
	pub(crate) fn has_ended(&self, epoch: u64) -> bool {
		self.handled_epoch.load(Ordering::Acquire) >= epoch
	}

	/// Marks `epoch` as ended on purpose so later failures from it do not escalate.
	pub(crate) fn retire(&self, epoch: u64) {
		self.handled_epoch.fetch_max(epoch, Ordering::AcqRel);
	}
}
impl Debug for EscalationHandler {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("EscalationHandler")
			.field("handled_epoch", &self.handled_epoch.load(Ordering::Relaxed))
			.field("notices", &self.notices_shown())
			.finish()
	}
}
