//! Secure store contract and built-in implementations for the persisted token record.
//!
//! The session treats the store as a best-effort mirror: it loads once when a
//! [`Client`](crate::client::Client) is opened, then writes after every successful exchange and
//! removes on logout or rejected refresh. Store failures are logged, never surfaced to callers.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, auth::AccessToken};

/// Boxed future returned by [`SecureStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Keychain-style persistence for a single token record per key.
pub trait SecureStore
where
	Self: Send + Sync,
{
	/// Persists or replaces the token stored under `key`.
	fn save<'a>(&'a self, key: &'a str, token: AccessToken) -> StoreFuture<'a, ()>;

	/// Loads the token stored under `key`; absence is not an error.
	fn load<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<AccessToken>>;

	/// Removes the token stored under `key`; removing a missing record succeeds.
	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;
}

/// Error type produced by [`SecureStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// The record could not be encoded or decoded.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// The storage backend failed.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
