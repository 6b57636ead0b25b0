//! Object storage for generated artifacts.
//!
//! Paths are `/`-separated and relative; `..` segments are rejected.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::error::StorageError;

/// Disk identifier of the in-process backend.
pub const MEMORY_DISK: &str = "memory";

pub trait ObjectStorage: Send + Sync {
    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// `None` when the object does not exist.
    fn get(&self, path: &str) -> Result<Option<Vec<u8>>, StorageError>;

    fn exists(&self, path: &str) -> Result<bool, StorageError>;

    /// `None` when the object does not exist.
    fn last_modified(&self, path: &str) -> Result<Option<DateTime<Utc>>, StorageError>;

    /// Deleting a missing object is not an error.
    fn delete(&self, path: &str) -> Result<(), StorageError>;
}

impl<S> ObjectStorage for Arc<S>
where
    S: ObjectStorage + ?Sized,
{
    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError> {
        (**self).put(path, bytes)
    }

    fn get(&self, path: &str) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).get(path)
    }

    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        (**self).exists(path)
    }

    fn last_modified(&self, path: &str) -> Result<Option<DateTime<Utc>>, StorageError> {
        (**self).last_modified(path)
    }

    fn delete(&self, path: &str) -> Result<(), StorageError> {
        (**self).delete(path)
    }
}

/// Open the backend named by `disk`: [`MEMORY_DISK`] is in-process, any other
/// name is a directory of that name under `root`.
pub fn open_disk(disk: &str, root: impl AsRef<Path>) -> Arc<dyn ObjectStorage> {
    if disk == MEMORY_DISK {
        Arc::new(InMemoryObjectStorage::new())
    } else {
        Arc::new(FilesystemObjectStorage::new(root.as_ref().join(disk)))
    }
}

fn validate_path(path: &str) -> Result<&str, StorageError> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() || trimmed.split('/').any(|segment| segment == ".." || segment.is_empty()) {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(trimmed)
}

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    modified_at: DateTime<Utc>,
}

/// In-memory object storage.
///
/// Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryObjectStorage {
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl InMemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object with an explicit modification time.
    pub fn put_at(&self, path: &str, bytes: &[u8], modified_at: DateTime<Utc>) -> Result<(), StorageError> {
        let path = validate_path(path)?;
        self.objects
            .write()
            .map_err(|_| StorageError::Poisoned("object storage"))?
            .insert(
                path.to_string(),
                StoredObject {
                    bytes: bytes.to_vec(),
                    modified_at,
                },
            );
        Ok(())
    }
}

impl ObjectStorage for InMemoryObjectStorage {
    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.put_at(path, bytes, Utc::now())
    }

    fn get(&self, path: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = validate_path(path)?;
        let objects = self
            .objects
            .read()
            .map_err(|_| StorageError::Poisoned("object storage"))?;
        Ok(objects.get(path).map(|o| o.bytes.clone()))
    }

    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let path = validate_path(path)?;
        let objects = self
            .objects
            .read()
            .map_err(|_| StorageError::Poisoned("object storage"))?;
        Ok(objects.contains_key(path))
    }

    fn last_modified(&self, path: &str) -> Result<Option<DateTime<Utc>>, StorageError> {
        let path = validate_path(path)?;
        let objects = self
            .objects
            .read()
            .map_err(|_| StorageError::Poisoned("object storage"))?;
        Ok(objects.get(path).map(|o| o.modified_at))
    }

    fn delete(&self, path: &str) -> Result<(), StorageError> {
        let path = validate_path(path)?;
        self.objects
            .write()
            .map_err(|_| StorageError::Poisoned("object storage"))?
            .remove(path);
        Ok(())
    }
}

/// Local filesystem storage rooted at a directory.
#[derive(Debug, Clone)]
pub struct FilesystemObjectStorage {
    root: PathBuf,
}

impl FilesystemObjectStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        Ok(self.root.join(validate_path(path)?))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl ObjectStorage for FilesystemObjectStorage {
    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        fs::write(&full, bytes).map_err(|e| io_error(&full, e))
    }

    fn get(&self, path: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let full = self.resolve(path)?;
        match fs::read(&full) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&full, e)),
        }
    }

    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let full = self.resolve(path)?;
        Ok(full.is_file())
    }

    fn last_modified(&self, path: &str) -> Result<Option<DateTime<Utc>>, StorageError> {
        let full = self.resolve(path)?;
        match fs::metadata(&full) {
            Ok(meta) => {
                let modified = meta.modified().map_err(|e| io_error(&full, e))?;
                Ok(Some(DateTime::<Utc>::from(modified)))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&full, e)),
        }
    }

    fn delete(&self, path: &str) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        match fs::remove_file(&full) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&full, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("billing-storage-{name}-{}", uuid::Uuid::now_v7()))
    }

    #[test]
    fn traversal_is_rejected() {
        let storage = InMemoryObjectStorage::new();
        for bad in ["", "/", "../etc/passwd", "invoices//x.pdf", "a/../b"] {
            assert!(matches!(storage.put(bad, b"x"), Err(StorageError::InvalidPath(_))), "{bad}");
        }
    }

    #[test]
    fn in_memory_round_trip_and_delete() {
        let storage = InMemoryObjectStorage::new();
        storage.put("invoices/a.pdf", b"%PDF").unwrap();
        assert!(storage.exists("invoices/a.pdf").unwrap());
        assert_eq!(storage.get("/invoices/a.pdf").unwrap().as_deref(), Some(&b"%PDF"[..]));

        storage.delete("invoices/a.pdf").unwrap();
        storage.delete("invoices/a.pdf").unwrap();
        assert_eq!(storage.get("invoices/a.pdf").unwrap(), None);
        assert_eq!(storage.last_modified("invoices/a.pdf").unwrap(), None);
    }

    #[test]
    fn filesystem_backend_creates_directories() {
        let root = temp_root("fs");
        let storage = FilesystemObjectStorage::new(&root);

        storage.put("invoices/2025/a.pdf", b"%PDF-1.7").unwrap();
        assert_eq!(storage.get("invoices/2025/a.pdf").unwrap(), Some(b"%PDF-1.7".to_vec()));
        assert!(storage.last_modified("invoices/2025/a.pdf").unwrap().is_some());
        assert_eq!(storage.get("invoices/2025/missing.pdf").unwrap(), None);

        storage.delete("invoices/2025/a.pdf").unwrap();
        assert!(!storage.exists("invoices/2025/a.pdf").unwrap());

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn open_disk_picks_the_backend() {
        let root = temp_root("disk");
        let memory = open_disk(MEMORY_DISK, &root);
        memory.put("x.bin", b"1").unwrap();
        assert!(!root.exists());

        let local = open_disk("local", &root);
        local.put("x.bin", b"1").unwrap();
        assert!(root.join("local").join("x.bin").is_file());

        let _ = fs::remove_dir_all(root);
    }
}
