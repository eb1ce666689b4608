//! Durable storage for the session credential.
//!
//! SYSTEM CONTEXT
//! ==============
//! The store is the only bootstrap source for session state: whatever it
//! holds when a [`crate::SessionController`] is built is what the user sees
//! as "logged in". It holds exactly one key, `token`.
//!
//! TRADE-OFFS
//! ==========
//! Writes are synchronous and happen on the caller's task. The record is a
//! few bytes, and a write that completes before the in-memory broadcast keeps
//! the crash window to the gap between two adjacent statements.

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;

use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Key-value persistence for a single credential.
pub trait SessionStore: Send + Sync {
    /// Read the persisted credential, if any.
    fn load(&self) -> Result<Option<String>, StoreError>;

    /// Persist `token`, replacing any previous value.
    fn save(&self, token: &str) -> Result<(), StoreError>;

    /// Remove the persisted credential. Clearing an empty store succeeds.
    fn clear(&self) -> Result<(), StoreError>;
}

// =============================================================================
// FILE
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct SessionRecord {
    token: String,
}

/// JSON file holding `{"token": "..."}`; the file is removed on logout.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut staged = self.path.clone().into_os_string();
        staged.push(".tmp");
        PathBuf::from(staged)
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<String>, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: SessionRecord = serde_json::from_str(&raw)?;
        Ok(non_empty(record.token))
    }

    fn save(&self, token: &str) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_vec(&SessionRecord { token: token.to_owned() })?;
        // Rename over the old record so a torn write never leaves half a token.
        let staged = self.staging_path();
        write_private(&staged, &raw)?;
        fs::rename(&staged, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write `raw` to `path`, readable by the owner only on unix.
fn write_private(path: &Path, raw: &[u8]) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        options.mode(0o600);
        let mut file = options.open(path)?;
        // A staging file left behind by a crash keeps its old mode.
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
        file.write_all(raw)
    }
    #[cfg(not(unix))]
    {
        options.open(path)?.write_all(raw)
    }
}

// =============================================================================
// MEMORY
// =============================================================================

/// In-process store, for embedding and tests. Survives controller rebuilds
/// as long as the same instance is reused.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    token: Mutex<Option<String>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token(token: &str) -> Self {
        Self { token: Mutex::new(non_empty(token.to_owned())) }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<String>, StoreError> {
        Ok(self.token.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn save(&self, token: &str) -> Result<(), StoreError> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = non_empty(token.to_owned());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

fn non_empty(token: String) -> Option<String> {
    if token.is_empty() { None } else { Some(token) }
}
