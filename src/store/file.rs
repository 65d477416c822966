//! JSON-file [`KeyValueStore`] for hosts whose session must survive a restart.

// std
use std::{
	collections::BTreeMap,
	fs::{self, File},
	io::{self, ErrorKind, Write},
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	store::{KeyValueStore, StoreError, StoreFuture},
};

type Snapshot = BTreeMap<String, String>;

/// Persists every key to one JSON object file.
///
/// Each mutation writes the full snapshot to a sibling `*.swap` file, syncs it, and renames it over
/// the target, so readers never observe a half-written snapshot.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	entries: Arc<RwLock<Snapshot>>,
}
impl FileStore {
	/// Opens the store at `path`, creating parent directories and loading any existing snapshot.
	///
	/// A missing or empty file opens as an empty store.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| io_failure("create directory", parent, e))?;
		}

		let entries = match fs::read(&path) {
			Ok(bytes) if bytes.is_empty() => Snapshot::new(),
			Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
				message: format!("{} is not a session snapshot: {e}", path.display()),
			})?,
			Err(e) if e.kind() == ErrorKind::NotFound => Snapshot::new(),
			Err(e) => return Err(io_failure("read", &path, e)),
		};

		Ok(Self { path, entries: Arc::new(RwLock::new(entries)) })
	}

	/// Returns the backing file path.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn write_snapshot(&self, entries: &Snapshot) -> Result<(), StoreError> {
		let bytes = serde_json::to_vec_pretty(entries).map_err(|e| StoreError::Serialization {
			message: format!("Failed to encode session snapshot: {e}"),
		})?;
		let swap = self.path.with_extension("swap");
		let mut file = File::create(&swap).map_err(|e| io_failure("create", &swap, e))?;

		file.write_all(&bytes).map_err(|e| io_failure("write", &swap, e))?;
		file.sync_all().map_err(|e| io_failure("sync", &swap, e))?;
		drop(file);

		fs::rename(&swap, &self.path).map_err(|e| io_failure("replace", &self.path, e))
	}
}
impl KeyValueStore for FileStore {
	fn load<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		Box::pin(async move { Ok(self.entries.read().get(key).cloned()) })
	}

	fn save<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let mut entries = self.entries.write();

			if entries.get(key) == Some(&value) {
				return Ok(());
			}

			entries.insert(key.to_owned(), value);
			self.write_snapshot(&entries)
		})
	}

	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let mut entries = self.entries.write();

			match entries.remove(key) {
				Some(_) => self.write_snapshot(&entries),
				None => Ok(()),
			}
		})
	}
}

fn io_failure(action: &str, path: &Path, e: io::Error) -> StoreError {
	StoreError::Backend { message: format!("Failed to {action} {}: {e}", path.display()) }
}
