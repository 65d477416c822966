//! Explicitly owned session object wiring the store, coordinator, monitor, and escalation path.
//!
//! Every component receives its collaborators from here instead of reaching for process-wide
//! state, so independent sessions can coexist in one process.

// self
use crate::{
	_prelude::*,
	auth::{Credential, SignIn},
	config::SessionConfig,
	coordinator::{RefreshCoordinator, RenewalOutcome, RenewalTrigger},
	error::ConfigError,
	escalation::{EscalationHandler, SessionUi},
	http::HttpTransport,
	monitor::ExpirationMonitor,
	pipeline::AuthorizedClient,
	renewal::RenewalEndpoint,
	store::{CredentialStore, KeyValueStore},
};

/// Derived session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
	/// No credential is held.
	Anonymous,
	/// A credential is held and not known to be expired.
	Authenticated,
	/// A renewal attempt owns the next transition.
	RenewalInFlight,
	/// Renewal failed or the credential expired; escalation is pending.
	Invalid,
}

/// Builder for [`Session`].
pub struct SessionBuilder {
	endpoint: Arc<dyn RenewalEndpoint>,
	ui: Arc<dyn SessionUi>,
	config: SessionConfig,
	backend: Option<Arc<dyn KeyValueStore>>,
}
impl SessionBuilder {
	/// Overrides the default configuration.
	pub fn config(mut self, config: SessionConfig) -> Self {
		self.config = config;

		self
	}

	/// Persists the credential and identity label through `backend`.
	pub fn persistence(mut self, backend: Arc<dyn KeyValueStore>) -> Self {
		self.backend = Some(backend);

		self
	}

	/// Validates the configuration and assembles the session. The monitor starts idle.
	pub fn build(self) -> Result<Session, ConfigError> {
		self.config.validate()?;

		let store = Arc::new(match self.backend {
			Some(backend) => CredentialStore::with_backend(backend),
			None => CredentialStore::new(),
		});
		let coordinator = RefreshCoordinator::new(self.endpoint, store.clone());
		let monitor = Arc::new(ExpirationMonitor::new(
			store.clone(),
			coordinator.clone(),
			self.ui.clone(),
			self.config.clone(),
		));
		let escalation =
			Arc::new(EscalationHandler::new(store.clone(), monitor.clone(), self.ui));

		Ok(Session {
			inner: Arc::new(SessionInner {
				config: self.config,
				store,
				coordinator,
				monitor,
				escalation,
			}),
		})
	}
}
impl Debug for SessionBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionBuilder")
			.field("config", &self.config)
			.field("persistent", &self.backend.is_some())
			.finish()
	}
}

#[derive(Debug)]
struct SessionInner {
	config: SessionConfig,
	store: Arc<CredentialStore>,
	coordinator: RefreshCoordinator,
	monitor: Arc<ExpirationMonitor>,
	escalation: Arc<EscalationHandler>,
}

/// Handle to one credential lifecycle. Cloning shares the same session.
#[derive(Clone, Debug)]
pub struct Session {
	inner: Arc<SessionInner>,
}
impl Session {
	/// Starts building a session renewing through `endpoint` and notifying through `ui`.
	pub fn builder(endpoint: Arc<dyn RenewalEndpoint>, ui: Arc<dyn SessionUi>) -> SessionBuilder {
		SessionBuilder { endpoint, ui, config: SessionConfig::default(), backend: None }
	}

	/// Reloads a persisted session and starts the monitor when one was found.
	pub async fn restore(&self) -> Result<bool> {
		let restored = self.inner.store.restore().await?;

		if let Some(epoch) = restored {
			tracing::info!(epoch, "session restored");
			self.inner.monitor.start();
		}

		Ok(restored.is_some())
	}

	/// Installs a freshly signed-in credential and starts the monitor.
	pub async fn sign_in(&self, sign_in: SignIn) -> Result<()> {
		let epoch = self.inner.store.open_session(sign_in).await?;

		tracing::info!(epoch, "session opened");
		self.inner.monitor.start();

		Ok(())
	}

	/// Ends the session on purpose: clears the credential and its persisted copy, stops the
	/// monitor. Failures still in flight for this session will not show the expiry notice.
	pub async fn sign_out(&self) -> Result<()> {
		self.inner.escalation.retire(self.inner.store.epoch());
		self.inner.monitor.stop();
		self.inner.store.clear().await?;

		tracing::info!("session closed");

		Ok(())
	}

	/// Derives the current [`SessionState`].
	pub fn state(&self) -> SessionState {
		self.state_at(OffsetDateTime::now_utc())
	}

	/// Derives the [`SessionState`] as if the current instant were `now`.
	pub fn state_at(&self, now: OffsetDateTime) -> SessionState {
		if self.inner.coordinator.is_in_flight() {
			return SessionState::RenewalInFlight;
		}

		let snapshot = self.inner.store.snapshot();

		if snapshot.invalidated {
			return SessionState::Invalid;
		}

		match snapshot.credential {
			Some(credential) if credential.is_expired_at(now) => SessionState::Invalid,
			Some(_) => SessionState::Authenticated,
			None => SessionState::Anonymous,
		}
	}

	/// Returns the current credential.
	pub fn credential(&self) -> Option<Credential> {
		self.inner.store.get()
	}

	/// Returns the identity label of the current session.
	pub fn identity(&self) -> Option<String> {
		self.inner.store.identity()
	}

	/// Renews on demand, joining any attempt already in flight.
	pub async fn renew(&self) -> RenewalOutcome {
		self.inner.coordinator.renew(RenewalTrigger::Manual).await
	}

	/// Wraps `transport` in an [`AuthorizedClient`] bound to this session.
	pub fn client<T>(&self, transport: Arc<T>) -> AuthorizedClient<T>
	where
		T: ?Sized + HttpTransport,
	{
		AuthorizedClient::new(self.clone(), transport)
	}

	/// Returns the session configuration.
	pub fn config(&self) -> &SessionConfig {
		&self.inner.config
	}

	/// Returns the credential store.
	pub fn store(&self) -> &Arc<CredentialStore> {
		&self.inner.store
	}

	/// Returns the refresh coordinator.
	pub fn coordinator(&self) -> &RefreshCoordinator {
		&self.inner.coordinator
	}

	/// Returns the expiration monitor.
	pub fn monitor(&self) -> &ExpirationMonitor {
		&self.inner.monitor
	}

	/// Returns the escalation handler.
	pub fn escalation(&self) -> &EscalationHandler {
		&self.inner.escalation
	}
}
