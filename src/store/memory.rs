//! Thread-safe in-memory [`SecureStore`] for tests and sessions that opt out of persistence.

// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	store::{SecureStore, StoreFuture},
};

type StoreMap = Arc<RwLock<HashMap<String, AccessToken>>>;

/// Keeps token records in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Number of stored records.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	/// Synchronous view of the record under `key`.
	pub fn get(&self, key: &str) -> Option<AccessToken> {
		self.0.read().get(key).cloned()
	}
}
impl SecureStore for MemoryStore {
	fn save<'a>(&'a self, key: &'a str, token: AccessToken) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().insert(key.to_owned(), token);

			Ok(())
		})
	}

	fn load<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<AccessToken>> {
		Box::pin(async move { Ok(self.get(key)) })
	}

	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().remove(key);

			Ok(())
		})
	}
}
