//! JSON file snapshot store
//!
//! Snapshots are written to a temporary sibling file, synced, and renamed over
//! the target. A crash mid-write leaves the previous snapshot untouched.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::backend::SnapshotStore;
use super::error::{PersistenceError, PersistenceResult};
use super::schema;
use crate::host::Host;

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "hosts.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn write_atomic(&self, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let temp = self.temp_path();
        let mut file = fs::File::create(&temp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp, &self.path).await
    }
}

#[async_trait]
impl SnapshotStore for JsonFileStore {
    async fn save(&self, hosts: &[Host]) -> PersistenceResult<()> {
        let bytes = schema::encode(hosts)?;

        self.write_atomic(&bytes)
            .await
            .map_err(|source| PersistenceError::WriteFailed {
                path: self.path.clone(),
                source,
            })?;

        debug!(
            "wrote {} hosts ({} bytes) to {}",
            hosts.len(),
            bytes.len(),
            self.path.display()
        );
        Ok(())
    }

    async fn load(&self) -> PersistenceResult<Vec<Host>> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no snapshot at {}, starting empty", self.path.display());
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(PersistenceError::ReadFailed {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        schema::decode(&bytes)
    }

    fn describe(&self) -> String {
        format!("JSON file {}", self.path.display())
    }
}
