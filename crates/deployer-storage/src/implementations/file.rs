//! File-based storage backend implementation for the deployment pipeline.
//!
//! Persists each key as a file under a base directory so deployment records
//! and metric rows survive restarts. An exclusive directory lock prevents two
//! pipeline processes from sharing the same store, and all mutations are
//! serialized through a process-local mutex so compare-and-swap is atomic.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use fs2::FileExt;
use std::fs::File;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

/// File storage implementation.
///
/// Keys map to files under the configured base directory; values are written
/// via a temporary file and an atomic rename so a crash never leaves a
/// half-written record behind.
pub struct FileStorage {
	/// Base directory holding one file per key.
	base_dir: PathBuf,
	/// Serializes mutations so compare-and-swap reads and writes atomically.
	write_lock: Mutex<()>,
	/// Exclusive lock file held for the lifetime of this storage instance.
	_dir_lock: File,
}

impl FileStorage {
	/// Opens (creating if needed) a file store rooted at `base_dir`.
	///
	/// Acquires an exclusive lock on the directory; a second process opening
	/// the same directory fails instead of silently racing the first.
	pub fn open(base_dir: impl AsRef<Path>) -> Result<Self, StorageError> {
		let base_dir = base_dir.as_ref().to_path_buf();
		std::fs::create_dir_all(&base_dir)
			.map_err(|e| StorageError::Backend(format!("Failed to create storage dir: {}", e)))?;

		let lock_path = base_dir.join(".lock");
		let dir_lock = File::create(&lock_path)
			.map_err(|e| StorageError::Backend(format!("Failed to create lock file: {}", e)))?;
		dir_lock.try_lock_exclusive().map_err(|e| {
			StorageError::Backend(format!(
				"Storage directory {} is locked by another process: {}",
				base_dir.display(),
				e
			))
		})?;

		tracing::debug!(dir = %base_dir.display(), "Opened file storage");

		Ok(Self {
			base_dir,
			write_lock: Mutex::new(()),
			_dir_lock: dir_lock,
		})
	}

	/// Maps a storage key to a file path, replacing characters that are not
	/// filesystem-safe.
	fn path_for(&self, key: &str) -> PathBuf {
		let sanitized: String = key
			.chars()
			.map(|c| {
				if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
					c
				} else {
					'-'
				}
			})
			.collect();
		self.base_dir.join(sanitized)
	}

	async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
		match fs::read(self.path_for(key)).await {
			Ok(bytes) => Ok(Some(bytes)),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(StorageError::Backend(format!("Read failed: {}", e))),
		}
	}

	async fn write(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
		let path = self.path_for(key);
		let tmp = path.with_extension("tmp");
		fs::write(&tmp, value)
			.await
			.map_err(|e| StorageError::Backend(format!("Write failed: {}", e)))?;
		fs::rename(&tmp, &path)
			.await
			.map_err(|e| StorageError::Backend(format!("Rename failed: {}", e)))
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
		self.read(key).await
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let _guard = self.write_lock.lock().await;
		self.write(key, &value).await
	}

	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		new: Vec<u8>,
	) -> Result<bool, StorageError> {
		let _guard = self.write_lock.lock().await;
		let current = self.read(key).await?;
		if current.as_deref() != expected {
			return Ok(false);
		}
		self.write(key, &new).await?;
		Ok(true)
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let _guard = self.write_lock.lock().await;
		match fs::remove_file(self.path_for(key)).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(format!("Delete failed: {}", e))),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		Ok(self.read(key).await?.is_some())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_roundtrip_and_cas() {
		let dir = tempfile::tempdir().unwrap();
		let storage = FileStorage::open(dir.path()).unwrap();

		assert_eq!(storage.get_bytes("deployments:a").await.unwrap(), None);

		assert!(storage
			.compare_and_swap("deployments:a", None, b"v1".to_vec())
			.await
			.unwrap());
		assert_eq!(
			storage.get_bytes("deployments:a").await.unwrap(),
			Some(b"v1".to_vec())
		);

		// Stale expectation does not overwrite.
		assert!(!storage
			.compare_and_swap("deployments:a", Some(b"old"), b"v2".to_vec())
			.await
			.unwrap());
		assert!(storage
			.compare_and_swap("deployments:a", Some(b"v1"), b"v2".to_vec())
			.await
			.unwrap());

		storage.delete("deployments:a").await.unwrap();
		assert!(!storage.exists("deployments:a").await.unwrap());
	}

	#[tokio::test]
	async fn test_values_survive_reopen() {
		let dir = tempfile::tempdir().unwrap();
		{
			let storage = FileStorage::open(dir.path()).unwrap();
			storage
				.set_bytes("metrics:1:2024-05-01", b"row".to_vec())
				.await
				.unwrap();
		}
		let storage = FileStorage::open(dir.path()).unwrap();
		assert_eq!(
			storage.get_bytes("metrics:1:2024-05-01").await.unwrap(),
			Some(b"row".to_vec())
		);
	}
}
