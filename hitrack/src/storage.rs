//! Durable key/value storage for session tokens.
//!
//! Values are read and written whole; there is no partial update. Both keys absent means logged
//! out.

use crate::error::Result;
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

pub const ACCESS_TOKEN_KEY: &str = "token";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

pub trait TokenStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Tokens kept in a single JSON object file, eg `{"token": "...", "refreshToken": "..."}`.
///
/// Writes go to a sibling temporary file which is then renamed over the original, so a reader
/// never observes a half-written file.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileStorage {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        match fs::read(&self.path) {
            Ok(raw) if raw.is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => match serde_json::from_slice(&raw) {
                Ok(map) => Ok(map),
                Err(e) => {
                    warn!(
                        "ignoring unreadable token file {}: {}",
                        self.path.display(),
                        e
                    );
                    Ok(BTreeMap::new())
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, map: &BTreeMap<String, String>) -> Result<()> {
        if map.is_empty() {
            return match fs::remove_file(&self.path) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            };
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        let mut file = private_file(&tmp)?;
        file.write_all(&serde_json::to_vec_pretty(map)?)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, &self.path)?;
        debug!("wrote token file {}", self.path.display());
        Ok(())
    }
}

/// Opens `path` for writing, truncated, readable only by the owner on unix
fn private_file(path: &Path) -> io::Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let file = options.open(path)?;
    // mode only applies on creation; a leftover tmp file keeps whatever it had
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    Ok(file)
}

impl TokenStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load()?.remove(key).filter(|v| !v.is_empty()))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = self.load()?;
        map.insert(key.to_string(), value.to_string());
        self.store(&map)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = self.load()?;
        if map.remove(key).is_some() {
            self.store(&map)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(access: Option<&str>, refresh: Option<&str>) -> Self {
        let storage = Self::new();
        {
            let mut values = storage.values.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(a) = access {
                values.insert(ACCESS_TOKEN_KEY.to_string(), a.to_string());
            }
            if let Some(r) = refresh {
                values.insert(REFRESH_TOKEN_KEY.to_string(), r.to_string());
            }
        }
        storage
    }
}

impl TokenStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).filter(|v| !v.is_empty()).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.remove(key);
        Ok(())
    }
}

#[test]
fn test_file_storage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("tokens.json");
    let storage = FileStorage::new(&path);

    assert_eq!(storage.get(ACCESS_TOKEN_KEY).unwrap(), None);
    storage.set(ACCESS_TOKEN_KEY, "aaa").unwrap();
    storage.set(REFRESH_TOKEN_KEY, "rrr").unwrap();
    assert!(path.exists());

    // a second handle over the same file sees the same values
    let reopened = FileStorage::new(&path);
    assert_eq!(reopened.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("aaa"));
    assert_eq!(reopened.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("rrr"));

    reopened.remove(ACCESS_TOKEN_KEY).unwrap();
    assert_eq!(storage.get(ACCESS_TOKEN_KEY).unwrap(), None);
    storage.remove(REFRESH_TOKEN_KEY).unwrap();
    assert!(!path.exists());
    // removing from an absent file is fine
    storage.remove(REFRESH_TOKEN_KEY).unwrap();
}

#[test]
fn test_file_storage_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tokens.json");
    fs::write(&path, b"not json").unwrap();
    let storage = FileStorage::new(&path);
    assert_eq!(storage.get(ACCESS_TOKEN_KEY).unwrap(), None);
    storage.set(ACCESS_TOKEN_KEY, "aaa").unwrap();
    assert_eq!(storage.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("aaa"));
}

#[test]
fn test_memory_storage() {
    let storage = MemoryStorage::with_tokens(Some("aaa"), None);
    assert_eq!(storage.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("aaa"));
    assert_eq!(storage.get(REFRESH_TOKEN_KEY).unwrap(), None);
    storage.set(REFRESH_TOKEN_KEY, "").unwrap();
    assert_eq!(storage.get(REFRESH_TOKEN_KEY).unwrap(), None);
}

#[cfg(unix)]
#[test]
fn test_token_file_is_private() {
    use std::os::unix::fs::PermissionsExt;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tokens.json");
    // a stale, world-readable tmp file from an earlier crash
    fs::write(path.with_extension("tmp"), b"{}").unwrap();
    fs::set_permissions(path.with_extension("tmp"), fs::Permissions::from_mode(0o644)).unwrap();

    let storage = FileStorage::new(&path);
    storage.set(REFRESH_TOKEN_KEY, "rrr").unwrap();
    let mode = fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}
