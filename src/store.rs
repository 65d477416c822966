//! Credential Store plus the key-value persistence contract it writes through to.
//!
//! [`CredentialStore`] is the only mutable shared state of a session. Reads are lock-cheap
//! snapshots; writes replace the whole slot under one lock so readers observe either a complete
//! credential or none. Writes are funneled through the refresh coordinator (renewals) and the
//! explicit sign-in/sign-out operations of [`Session`](crate::session::Session).

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{BearerSecret, Credential, SignIn},
};

/// Boxed future returned by [`KeyValueStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// String key-value persistence backend (think browser local storage or a config file).
pub trait KeyValueStore
where
	Self: Send + Sync,
{
	/// Reads the value stored under `key`, if any.
	fn load<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

	/// Stores or replaces the value under `key`.
	fn save<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()>;

	/// Removes the value under `key`; removing a missing key succeeds.
	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;
}

/// Error type produced by [`KeyValueStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Fields persisted across process restarts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
	/// Raw bearer credential.
	pub access_token: BearerSecret,
	/// Identity label shown to the user.
	#[serde(rename = "userEmail", default)]
	pub identity: Option<String>,
}

/// Point-in-time copy of the store contents.
#[derive(Clone, Debug, Default)]
pub struct StoreSnapshot {
	/// Current credential, if any.
	pub credential: Option<Credential>,
	/// Identity label tied to the credential.
	pub identity: Option<String>,
	/// Session epoch; bumped by every sign-in or restore.
	pub epoch: u64,
	/// Bumped by every explicit write (sign-in, restore, clear) but not by renewals.
	pub revision: u64,
	/// Set when a renewal failed and escalation has not yet cleared the session.
	pub invalidated: bool,
}
impl StoreSnapshot {
	/// Returns `true` while a session is live: a credential is held, or a failed renewal is
	/// awaiting escalation.
	pub fn holds_session(&self) -> bool {
		self.credential.is_some() || self.invalidated
	}
}

/// Holder of the current bearer credential and its identity label.
pub struct CredentialStore {
	slot: RwLock<StoreSnapshot>,
	backend: Option<Arc<dyn KeyValueStore>>,
	write_order: AsyncMutex<()>,
}
impl CredentialStore {
	/// Key under which the session blob is persisted.
	pub const PERSISTENCE_KEY: &'static str = "auth";

	/// Creates an empty, memory-only store.
	pub fn new() -> Self {
		Self { slot: Default::default(), backend: None, write_order: AsyncMutex::new(()) }
	}

	/// Creates an empty store that writes through to `backend`.
	pub fn with_backend(backend: Arc<dyn KeyValueStore>) -> Self {
		Self { backend: Some(backend), ..Self::new() }
	}

	/// Returns the current credential.
	pub fn get(&self) -> Option<Credential> {
		self.slot.read().credential.clone()
	}

	/// Returns the identity label tied to the current session.
	pub fn identity(&self) -> Option<String> {
		self.slot.read().identity.clone()
	}

	/// Returns the current session epoch.
	pub fn epoch(&self) -> u64 {
		self.slot.read().epoch
	}

	/// Returns the revision a renewal must still observe to be allowed to write.
	pub fn revision(&self) -> u64 {
		self.slot.read().revision
	}

	/// Returns `true` if a failed renewal invalidated the session.
	pub fn is_invalidated(&self) -> bool {
		self.slot.read().invalidated
	}

	/// Returns a consistent copy of every field.
	pub fn snapshot(&self) -> StoreSnapshot {
		self.slot.read().clone()
	}

	/// Installs a signed-in credential, opening a new session epoch.
	pub async fn open_session(&self, sign_in: SignIn) -> Result<u64, StoreError> {
		let _ordered = self.write_order.lock().await;
		let (epoch, persisted) = {
			let mut slot = self.slot.write();

			slot.epoch += 1;
			slot.revision += 1;
			slot.invalidated = false;
			slot.identity = sign_in.identity;
			slot.credential = Some(sign_in.credential);

			(slot.epoch, Self::persisted_form(&slot))
		};

		if let Some(persisted) = persisted {
			self.persist(&persisted).await?;
		}

		Ok(epoch)
	}

	/// Reloads a persisted session, opening a new epoch when one was found.
	///
	/// Corrupt blobs are discarded instead of failing start-up.
	pub async fn restore(&self) -> Result<Option<u64>, StoreError> {
		let Some(backend) = &self.backend else {
			return Ok(None);
		};
		let _ordered = self.write_order.lock().await;
		let Some(raw) = backend.load(Self::PERSISTENCE_KEY).await? else {
			return Ok(None);
		};
		let mut deserializer = serde_json::Deserializer::from_str(&raw);
		let parsed = serde_path_to_error::deserialize::<_, PersistedSession>(&mut deserializer);
		let persisted = match parsed {
			Ok(persisted) => persisted,
			Err(e) => {
				tracing::warn!(
					path = %e.path(),
					error = %e.inner(),
					"discarding unreadable persisted session"
				);
				backend.remove(Self::PERSISTENCE_KEY).await?;

				return Ok(None);
			},
		};
		let mut slot = self.slot.write();

		slot.epoch += 1;
		slot.revision += 1;
		slot.invalidated = false;
		slot.identity = persisted.identity;
		slot.credential = Some(Credential::from_token(persisted.access_token.expose()));

		Ok(Some(slot.epoch))
	}

	/// Clears the session and its persisted copy; idempotent.
	///
	/// Returns `true` if a credential was present.
	pub async fn clear(&self) -> Result<bool, StoreError> {
		let _ordered = self.write_order.lock().await;
		let had_credential = {
			let mut slot = self.slot.write();
			let had_credential = slot.credential.take().is_some();

			slot.revision += 1;
			slot.identity = None;
			slot.invalidated = false;

			had_credential
		};

		self.forget().await?;

		Ok(had_credential)
	}

	/// Replaces the credential after a successful renewal, keeping identity and epoch.
	///
	/// Skipped (returning `false`) when an explicit write happened after `revision` was read, or
	/// when there is no session to renew.
	pub(crate) async fn replace(&self, revision: u64, credential: Credential) -> bool {
		let _ordered = self.write_order.lock().await;
		let persisted = {
			let mut slot = self.slot.write();

			if slot.revision != revision || !slot.holds_session() {
				return false;
			}

			slot.invalidated = false;
			slot.credential = Some(credential);

			Self::persisted_form(&slot)
		};

		if let Some(persisted) = persisted
			&& let Err(e) = self.persist(&persisted).await
		{
			tracing::warn!(error = %e, "failed to persist renewed credential");
		}

		true
	}

	/// Drops the credential after a failed renewal and marks the session invalid.
	///
	/// Skipped (returning `false`) when an explicit write happened after `revision` was read, or
	/// when there is no session to invalidate.
	pub(crate) async fn invalidate(&self, revision: u64) -> bool {
		let _ordered = self.write_order.lock().await;

		{
			let mut slot = self.slot.write();

			if slot.revision != revision || !slot.holds_session() {
				return false;
			}

			slot.credential = None;
			slot.invalidated = true;
		}

		if let Err(e) = self.forget().await {
			tracing::warn!(error = %e, "failed to drop persisted credential");
		}

		true
	}

	fn persisted_form(slot: &StoreSnapshot) -> Option<PersistedSession> {
		slot.credential.as_ref().map(|credential| PersistedSession {
			access_token: credential.secret().clone(),
			identity: slot.identity.clone(),
		})
	}

	async fn persist(&self, persisted: &PersistedSession) -> Result<(), StoreError> {
		let Some(backend) = &self.backend else {
			return Ok(());
		};
		let raw = serde_json::to_string(persisted)
			.map_err(|e| StoreError::Serialization { message: e.to_string() })?;

		backend.save(Self::PERSISTENCE_KEY, raw).await
	}

	async fn forget(&self) -> Result<(), StoreError> {
		match &self.backend {
			Some(backend) => backend.remove(Self::PERSISTENCE_KEY).await,
			None => Ok(()),
		}
	}
}
impl Default for CredentialStore {
	fn default() -> Self {
		Self::new()
	}
}
impl Debug for CredentialStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let slot = self.slot.read();

		f.debug_struct("CredentialStore")
			.field("credential", &slot.credential)
			.field("epoch", &slot.epoch)
			.field("revision", &slot.revision)
			.field("invalidated", &slot.invalidated)
			.field("persistent", &self.backend.is_some())
			.finish()
	}
}
