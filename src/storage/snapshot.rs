//! File snapshots of the in-memory store.

use crate::core::{EventLogError, Result};
use crate::storage::Table;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub tables: HashMap<String, Table>,
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// Creation time in milliseconds since the Unix epoch.
    pub created_at: i64,
    pub item_count: usize,
    pub table_count: usize,
}

impl StoreSnapshot {
    pub fn new(tables: HashMap<String, Table>) -> Self {
        let item_count = tables.values().map(Table::item_count).sum();
        let table_count = tables.len();
        Self {
            version: SNAPSHOT_VERSION,
            tables,
            metadata: SnapshotMetadata {
                created_at: chrono::Utc::now().timestamp_millis(),
                item_count,
                table_count,
            },
        }
    }
}

fn io_error(action: &str, err: std::io::Error) -> EventLogError {
    EventLogError::Execution(format!("Failed to {} snapshot: {}", action, err))
}

/// Reads and writes a [`StoreSnapshot`] at a fixed path.
///
/// Saves go through a temporary sibling file that is renamed over the target,
/// so a crash mid-write leaves the previous snapshot intact.
pub struct SnapshotManager {
    snapshot_path: PathBuf,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(snapshot_path: P) -> Self {
        Self {
            snapshot_path: snapshot_path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        if let Some(parent) = self.snapshot_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| io_error("create directory for", e))?;
            }
        }

        let serialized = rmp_serde::to_vec(snapshot)?;
        let temp_path = self.snapshot_path.with_extension("tmp");
        let temp_file = File::create(&temp_path).map_err(|e| io_error("create", e))?;
        let mut writer = BufWriter::new(temp_file);
        writer.write_all(&serialized).map_err(|e| io_error("write", e))?;
        writer.flush().map_err(|e| io_error("flush", e))?;
        writer.get_mut().sync_all().map_err(|e| io_error("sync", e))?;
        fs::rename(&temp_path, &self.snapshot_path).map_err(|e| io_error("rename", e))?;

        tracing::debug!(
            path = %self.snapshot_path.display(),
            items = snapshot.metadata.item_count,
            "snapshot saved"
        );
        Ok(())
    }

    /// `None` when no snapshot has been written yet.
    pub fn load(&self) -> Result<Option<StoreSnapshot>> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }
        let mut file = File::open(&self.snapshot_path).map_err(|e| io_error("open", e))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data).map_err(|e| io_error("read", e))?;
        let snapshot: StoreSnapshot = rmp_serde::from_slice(&data)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(EventLogError::Serialization(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        Ok(Some(snapshot))
    }

    pub fn exists(&self) -> bool {
        self.snapshot_path.exists()
    }

    pub fn delete(&self) -> Result<()> {
        if self.snapshot_path.exists() {
            fs::remove_file(&self.snapshot_path).map_err(|e| io_error("delete", e))?;
        }
        Ok(())
    }
}
