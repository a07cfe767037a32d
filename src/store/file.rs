//! JSON file backed [`SecureStore`] for desktop and CLI applications.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	store::{SecureStore, StoreError, StoreFuture},
};

type Snapshot = BTreeMap<String, AccessToken>;

/// Persists every record to one JSON file, replacing it atomically after each mutation.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<Snapshot>>,
}
impl FileStore {
	/// Opens (or creates) a store at `path`, loading any existing snapshot.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		ensure_parent_exists(&path)?;

		let snapshot = read_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the snapshot file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn persist(&self, contents: &Snapshot) -> Result<(), StoreError> {
		ensure_parent_exists(&self.path)?;

		let serialized = serde_json::to_vec_pretty(contents).map_err(|e| {
			StoreError::Serialization { message: format!("Failed to serialize snapshot: {e}") }
		})?;
		let tmp_path = self.path.with_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(backend("create", &tmp_path))?;

			file.write_all(&serialized).map_err(backend("write", &tmp_path))?;
			file.sync_all().map_err(backend("sync", &tmp_path))?;
		}

		fs::rename(&tmp_path, &self.path).map_err(backend("replace", &self.path))
	}
}
impl SecureStore for FileStore {
	fn save<'a>(&'a self, key: &'a str, token: AccessToken) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			guard.insert(key.to_owned(), token);

			self.persist(&guard)
		})
	}

	fn load<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<AccessToken>> {
		Box::pin(async move { Ok(self.inner.read().get(key).cloned()) })
	}

	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			if guard.remove(key).is_none() {
				return Ok(());
			}

			self.persist(&guard)
		})
	}
}

fn backend(action: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> StoreError {
	let path = path.display().to_string();

	move |e| StoreError::Backend { message: format!("Failed to {action} {path}: {e}") }
}

fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		fs::create_dir_all(parent).map_err(backend("create directory", parent))?;
	}

	Ok(())
}

fn read_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
	if !path.exists() {
		return Ok(Snapshot::new());
	}

	let bytes = fs::read(path).map_err(backend("read", path))?;

	if bytes.is_empty() {
		return Ok(Snapshot::new());
	}

	serde_path_to_error::deserialize(&mut serde_json::Deserializer::from_slice(&bytes)).map_err(
		|e| StoreError::Serialization {
			message: format!("Failed to parse {} at `{}`: {}", path.display(), e.path(), e.inner()),
		},
	)
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::auth::{TokenKind, UserId};

	fn temp_path(tag: &str) -> PathBuf {
		env::temp_dir().join(format!(
			"oauth2_session_file_store_{tag}_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		))
	}

	fn user_token() -> AccessToken {
		AccessToken::builder(TokenKind::User {
			id: UserId::new("u42").expect("User fixture should be valid."),
		})
		.access_token("tok1")
		.refresh_token("ref1")
		.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
		.expires_in(Duration::hours(1))
		.build()
		.expect("Token fixture should build.")
	}

	#[tokio::test]
	async fn save_and_reload_round_trip() {
		let path = temp_path("round_trip");
		let store = FileStore::open(&path).expect("File store should open.");

		store.save("AccessToken", user_token()).await.expect("Save should succeed.");
		drop(store);

		let reopened = FileStore::open(&path).expect("File store should reopen.");
		let loaded = reopened
			.load("AccessToken")
			.await
			.expect("Load should succeed.")
			.expect("Record should survive a reopen.");

		assert_eq!(loaded, user_token());
		assert_eq!(loaded.user_id().map(|id| id.as_ref()), Some("u42"));

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary snapshot {}: {e}", path.display())
		});
	}

	#[tokio::test]
	async fn remove_is_persisted_and_idempotent() {
		let path = temp_path("remove");
		let store = FileStore::open(&path).expect("File store should open.");

		store.save("AccessToken", user_token()).await.expect("Save should succeed.");
		store.remove("AccessToken").await.expect("Remove should succeed.");
		store.remove("AccessToken").await.expect("Second remove should succeed.");

		let reopened = FileStore::open(&path).expect("File store should reopen.");

		assert!(reopened.load("AccessToken").await.expect("Load should succeed.").is_none());

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary snapshot {}: {e}", path.display())
		});
	}

	#[test]
	fn corrupt_snapshot_is_a_serialization_error() {
		let path = temp_path("corrupt");

		fs::write(&path, b"{not json").expect("Fixture file should be writable.");

		assert!(matches!(FileStore::open(&path), Err(StoreError::Serialization { .. })));

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary snapshot {}: {e}", path.display())
		});
	}
}
