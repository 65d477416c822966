//! Thread-safe in-memory [`KeyValueStore`] implementation for local development and tests.

// std
use std::collections::HashMap;
// self
use crate::{
	_prelude::*,
	store::{KeyValueStore, StoreFuture},
};

type StoreMap = Arc<RwLock<HashMap<String, String>>>;

/// Storage backend that keeps values in-process; cloning shares the same map.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Returns `true` if a value is stored under `key`.
	pub fn contains(&self, key: &str) -> bool {
		self.0.read().contains_key(key)
	}

	/// Returns the number of stored keys.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` if nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl KeyValueStore for MemoryStore {
	fn load<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		let value = self.0.read().get(key).cloned();

		Box::pin(async move { Ok(value) })
	}

	fn save<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().insert(key.to_owned(), value);

			Ok(())
		})
	}

	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().remove(key);

			Ok(())
		})
	}
}
