//! Mirror configuration sources.
//!
//! The orchestrator reads one JSON document per mirror from a directory:
//!
//! ```json
//! {
//!   "id": "ubuntu",
//!   "info": { "name": "Ubuntu", "url": "/ubuntu", "upstream": "rsync://...", "type": "sync" },
//!   "sync": {
//!     "jobName": "ubuntu-sync",
//!     "image": "mirror/rsync:latest",
//!     "interval": "6h",
//!     "timeout": "2h",
//!     "volumes": [{ "src": "/data/ubuntu", "dst": "/data" }],
//!     "command": ["rsync", "-av", "..."],
//!     "environments": ["RSYNC_PASSWORD=..."]
//!   }
//! }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::error::{OrchestratorError, Result};
use crate::mirror::MirrorConfig;

/// Where mirror configs come from on every reload.
pub trait ConfigSource: Send + Sync {
    fn load(&self) -> Result<Vec<MirrorConfig>>;

    /// Human readable origin, for logs
    fn describe(&self) -> String;
}

/// Reads every `*.json` file of a directory.
#[derive(Debug, Clone)]
pub struct DirConfigSource {
    dir: PathBuf,
}

impl DirConfigSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ConfigSource for DirConfigSource {
    fn load(&self) -> Result<Vec<MirrorConfig>> {
        let io_err = |path: &Path, source| OrchestratorError::ConfigIo {
            path: path.to_path_buf(),
            source,
        };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(|e| io_err(&self.dir, e))? {
            let path = entry.map_err(|e| io_err(&self.dir, e))?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut configs = Vec::with_capacity(paths.len());
        for path in paths {
            let content = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
            let config: MirrorConfig = serde_json::from_str(&content)
                .map_err(|source| OrchestratorError::ConfigParse {
                    path: path.clone(),
                    source,
                })?;
            configs.push(config);
        }
        Ok(configs)
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

/// Config snapshot held in memory. Handy for embedding and tests.
#[derive(Debug)]
pub struct MemoryConfigSource {
    state: RwLock<std::result::Result<Vec<MirrorConfig>, String>>,
}

impl MemoryConfigSource {
    pub fn new(configs: Vec<MirrorConfig>) -> Self {
        Self {
            state: RwLock::new(Ok(configs)),
        }
    }

    pub fn set(&self, configs: Vec<MirrorConfig>) {
        *self.state.write() = Ok(configs);
    }

    /// Make subsequent loads fail with the given reason.
    pub fn set_failure(&self, reason: impl Into<String>) {
        *self.state.write() = Err(reason.into());
    }
}

impl Default for MemoryConfigSource {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl ConfigSource for MemoryConfigSource {
    fn load(&self) -> Result<Vec<MirrorConfig>> {
        match &*self.state.read() {
            Ok(configs) => Ok(configs.clone()),
            Err(reason) => Err(OrchestratorError::Internal(reason.clone())),
        }
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Validate a full configuration snapshot: every entry on its own, and ids
/// unique across the snapshot.
pub fn check_snapshot(configs: &[MirrorConfig]) -> Result<()> {
    let mut seen = HashSet::with_capacity(configs.len());
    for config in configs {
        config.validate()?;
        if !seen.insert(config.id.as_str()) {
            return Err(OrchestratorError::DuplicateMirror(config.id.clone()));
        }
    }
    Ok(())
}
