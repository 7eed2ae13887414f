//! Filesystem layout helpers and atomic write operations
//!
//! Actor snapshots live under `<root>/snapshots/<actor>.json` and the
//! runtime configuration under `<root>/config.json`. Every write goes
//! through a temp file, fsync and rename so a crash never leaves a torn
//! snapshot behind.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::RuntimeConfig;
use super::error::{StorageError, StorageResult};
use super::ids::ObjectId;
use super::snapshot::ActorSnapshot;

/// Storage manager for runtime persistence
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Create a new storage manager
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Get the root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the config file path
    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }

    /// Get the snapshots directory path
    pub fn snapshots_dir(&self) -> PathBuf {
        self.root.join("snapshots")
    }

    /// Snapshot file of one actor
    pub fn snapshot_path(&self, actor: ObjectId) -> PathBuf {
        self.snapshots_dir().join(format!("{}.json", actor.0))
    }

    /// Write data atomically to a file
    ///
    /// Creates a temporary file, writes the data, syncs, then renames
    pub fn write_atomic(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        let failed = |detail: String| StorageError::AtomicWriteFailed {
            path: path.to_path_buf(),
            detail,
        };
        let temp_path = path.with_extension("tmp");

        let mut file = File::create(&temp_path)
            .map_err(|e| failed(format!("create {}: {e}", temp_path.display())))?;
        file.write_all(data)
            .map_err(|e| failed(format!("write: {e}")))?;
        file.sync_all()
            .map_err(|e| failed(format!("sync: {e}")))?;
        drop(file);

        fs::rename(&temp_path, path)
            .map_err(|e| failed(format!("rename {}: {e}", temp_path.display())))?;

        // Sync parent directory
        if let Some(parent) = path.parent() {
            let dir = OpenOptions::new().read(true).open(parent)?;
            dir.sync_all()?;
        }

        Ok(())
    }

    /// Read a file
    pub fn read_file(&self, path: &Path) -> StorageResult<Vec<u8>> {
        fs::read(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StorageError::PathNotFound(path.to_path_buf()),
            _ => StorageError::Io(e),
        })
    }

    /// Create a directory and all parent directories
    pub fn create_dir_all(&self, path: &Path) -> StorageResult<()> {
        Ok(fs::create_dir_all(path)?)
    }

    /// Persist an actor snapshot
    pub fn write_snapshot(&self, snapshot: &ActorSnapshot) -> StorageResult<PathBuf> {
        self.create_dir_all(&self.snapshots_dir())?;
        let path = self.snapshot_path(snapshot.actor);
        let json = serde_json::to_vec_pretty(snapshot)?;
        self.write_atomic(&path, &json)?;
        tracing::info!(
            actor = %snapshot.actor,
            interactions = snapshot.interactions.len(),
            path = %path.display(),
            "snapshot written"
        );
        Ok(path)
    }

    /// Read an actor snapshot
    pub fn read_snapshot(&self, actor: ObjectId) -> StorageResult<ActorSnapshot> {
        let data = self.read_file(&self.snapshot_path(actor))?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Actors that have a snapshot on disk
    pub fn list_snapshots(&self) -> StorageResult<Vec<ObjectId>> {
        let dir = self.snapshots_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut actors = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Ok(uuid) = uuid::Uuid::parse_str(stem) {
                actors.push(ObjectId::from_uuid(uuid));
            }
        }
        actors.sort();
        Ok(actors)
    }

    /// Write runtime configuration
    pub fn write_config(&self, config: &RuntimeConfig) -> StorageResult<()> {
        self.create_dir_all(&self.root)?;
        let json = serde_json::to_vec_pretty(config)?;
        self.write_atomic(&self.config_path(), &json)
    }

    /// Load runtime configuration
    pub fn load_config(&self) -> StorageResult<RuntimeConfig> {
        let data = self.read_file(&self.config_path())?;
        Ok(serde_json::from_slice(&data)?)
    }
}
