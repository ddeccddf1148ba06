//! Session file storage
//!
//! Persists the session to disk for reuse across CLI invocations.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::Session;
use crate::{Error, Result};

/// Reads and writes the session file.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Store backed by `path`; the parent directory is created on save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Session file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored session.
    ///
    /// Any read or parse failure is logged and reported as no session.
    #[must_use]
    pub fn load(&self) -> Option<Session> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No stored session");
            return None;
        }

        match fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str::<Session>(&content) {
                Ok(session) => {
                    debug!(path = %self.path.display(), "Loaded stored session");
                    Some(session)
                }
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Failed to parse stored session");
                    None
                }
            },
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read session file");
                None
            }
        }
    }

    /// Write the session, replacing any previous file atomically.
    pub fn save(&self, session: &Session) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| {
                Error::Internal(format!("Failed to create session dir {}: {e}", dir.display()))
            })?;
        }

        let content = serde_json::to_string_pretty(session)?;
        let tmp = self.temp_path();

        fs::write(&tmp, content)
            .map_err(|e| Error::Internal(format!("Failed to write session file: {e}")))?;

        // Set restrictive permissions (owner read/write only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            if let Err(e) = fs::set_permissions(&tmp, perms) {
                warn!(error = %e, "Failed to restrict session file permissions");
            }
        }

        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            Error::Internal(format!("Failed to replace session file: {e}"))
        })?;

        info!(path = %self.path.display(), "Saved session");
        Ok(())
    }

    /// Delete the stored session, if any.
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
            info!(path = %self.path.display(), "Deleted session");
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
