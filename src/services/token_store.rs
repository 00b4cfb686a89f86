// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Durable storage of the Outlook token silo.
//!
//! One JSON file, replaced atomically through a temp file in the same
//! directory. This is the only state that survives a restart.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{AuthError, Result};
use crate::models::MicrosoftToken;

/// File-backed store for a single [`MicrosoftToken`].
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted token. A missing file is `Ok(None)`.
    pub async fn load(&self) -> Result<Option<MicrosoftToken>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AuthError::Storage(format!(
                    "cannot read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let token = serde_json::from_slice(&bytes).map_err(|e| {
            tracing::warn!(path = %self.path.display(), error = %e, "Token file is corrupt");
            AuthError::Storage(format!("corrupt token file {}: {}", self.path.display(), e))
        })?;
        Ok(Some(token))
    }

    /// Atomically replace the persisted token.
    pub async fn save(&self, token: &MicrosoftToken) -> Result<()> {
        let json = serde_json::to_vec_pretty(token)
            .map_err(|e| AuthError::Storage(format!("cannot encode token: {}", e)))?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomically(&path, &json))
            .await
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("token write task failed: {}", e)))??;

        tracing::debug!(path = %self.path.display(), "Saved Outlook token");
        Ok(())
    }

    /// Remove the persisted token; a missing file is not an error.
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Cleared Outlook token");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::Storage(format!(
                "cannot remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    /// `now >= expires_at - 60s`
    pub fn is_expired(&self, token: &MicrosoftToken) -> bool {
        token.is_expired()
    }
}

fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .map_err(|e| AuthError::Storage(format!("cannot create {}: {}", dir.display(), e)))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| AuthError::Storage(format!("cannot create temp file: {}", e)))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))
            .map_err(|e| AuthError::Storage(format!("cannot set permissions: {}", e)))?;
    }

    tmp.write_all(contents)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| AuthError::Storage(format!("cannot write token: {}", e)))?;

    tmp.persist(path)
        .map_err(|e| AuthError::Storage(format!("cannot replace {}: {}", path.display(), e.error)))?;
    Ok(())
}
