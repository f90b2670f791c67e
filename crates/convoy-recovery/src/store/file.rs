// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable file-backed storage tier.
//!
//! One file per key under a configured directory. Writes go through a
//! temporary file and a rename so a crash mid-write never leaves a truncated
//! record for recovery to trip over.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use convoy_core::{ConvoyError, StateStore};

/// File-per-key tier that survives process restarts.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Maps a storage key to a filesystem-safe path inside the store dir.
    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }

    fn storage_err(e: std::io::Error) -> ConvoyError {
        ConvoyError::Storage { source: Box::new(e) }
    }
}

#[async_trait]
impl StateStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ConvoyError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::storage_err(e)),
        }
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), ConvoyError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(Self::storage_err)?;

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value).await.map_err(Self::storage_err)?;
        tokio::fs::rename(&tmp, &path).await.map_err(Self::storage_err)?;

        debug!(key = key, path = %path.display(), "durable record written");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), ConvoyError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::storage_err(e)),
        }
    }
}
