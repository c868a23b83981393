use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, error};

use crate::error::{BurnrateError, Result};

const MAX_NAME_ATTEMPTS: u32 = 100;

/// Filesystem archive for original upload bytes, keyed `<user>/<millis>-<name>`.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub path: PathBuf,
    pub storage_key: String,
}

/// Keep a filename safe to use as a single path component.
fn sanitize_component(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn put(&self, user_id: &str, filename: &str, bytes: &[u8]) -> Result<StoredBlob> {
        let user_dir = sanitize_component(user_id);
        let file = sanitize_component(filename);
        let millis = Utc::now().timestamp_millis();
        let dir = self.root.join(&user_dir);
        if let Err(e) = std::fs::create_dir_all(&dir) {
            error!(dir = %dir.display(), error = %e, "blob directory create failed");
            return Err(BurnrateError::Storage(format!("Failed to store file: {e}")));
        }

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = match attempt {
                0 => format!("{millis}-{file}"),
                n => format!("{millis}-{n}-{file}"),
            };
            let storage_key = format!("{user_dir}/{name}");
            let path = dir.join(&name);
            match write_new(&path, bytes) {
                Ok(()) => {
                    debug!(key = %storage_key, bytes = bytes.len(), "stored upload");
                    return Ok(StoredBlob { path, storage_key });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(key = %storage_key, "blob key taken, trying next");
                }
                Err(e) => {
                    error!(key = %storage_key, error = %e, "blob write failed");
                    return Err(BurnrateError::Storage(format!("Failed to store file: {e}")));
                }
            }
        }
        error!(user = %user_dir, file = %file, "no free blob key");
        Err(BurnrateError::Storage(
            "Failed to store file: too many uploads with the same name".to_string(),
        ))
    }
}

/// Never replaces an existing archive.
fn write_new(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut f = OpenOptions::new().write(true).create_new(true).open(path)?;
    f.write_all(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_writes_under_user_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        let blob = store.put("user-1", "statement.csv", b"a,b\n").unwrap();
        assert!(blob.storage_key.starts_with("user-1/"));
        assert!(blob.storage_key.ends_with("-statement.csv"));
        assert_eq!(std::fs::read(&blob.path).unwrap(), b"a,b\n");
    }

    #[test]
    fn test_same_name_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        let blobs: Vec<StoredBlob> = (0..5)
            .map(|i| store.put("u", "statement.csv", format!("v{i}").as_bytes()).unwrap())
            .collect();
        for (i, blob) in blobs.iter().enumerate() {
            assert_eq!(std::fs::read_to_string(&blob.path).unwrap(), format!("v{i}"));
            assert!(blob.storage_key.ends_with("-statement.csv"));
        }
        let mut keys: Vec<&str> = blobs.iter().map(|b| b.storage_key.as_str()).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), 5);
    }

    #[test]
    fn test_existing_key_gets_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        let first = store.put("u", "s.csv", b"first").unwrap();
        // Occupy every plain key the next put could pick within the next second.
        let millis = Utc::now().timestamp_millis();
        for m in millis..millis + 1000 {
            let taken = dir.path().join("u").join(format!("{m}-s.csv"));
            if !taken.exists() {
                std::fs::write(taken, b"taken").unwrap();
            }
        }
        let second = store.put("u", "s.csv", b"second").unwrap();
        assert_ne!(first.storage_key, second.storage_key);
        assert_eq!(std::fs::read(&first.path).unwrap(), b"first");
        assert_eq!(std::fs::read(&second.path).unwrap(), b"second");
        assert!(second.storage_key.split('-').count() >= 3);
    }

    #[test]
    fn test_filename_cannot_escape_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        let blob = store.put("../evil", "../../etc/passwd", b"x").unwrap();
        assert!(blob.path.starts_with(dir.path()));
        assert!(!blob.storage_key.contains(".."));
    }

    #[test]
    fn test_sanitize_component() {
        assert_eq!(sanitize_component("my statement (1).pdf"), "my_statement__1_.pdf");
        assert_eq!(sanitize_component("..."), "upload");
        assert_eq!(sanitize_component("a/b\\c.csv"), "c.csv");
    }

    #[test]
    fn test_unwritable_root_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let file_as_root = dir.path().join("not-a-dir");
        std::fs::write(&file_as_root, b"").unwrap();
        let store = BlobStore::new(&file_as_root);
        let err = store.put("u", "s.csv", b"x").unwrap_err();
        assert!(matches!(err, BurnrateError::Storage(_)));
        assert!(err.to_string().starts_with("Failed to store file"));
    }
}
