//! Mirror data model.
//!
//! A mirror is described by an immutable [`MirrorConfig`] (read from disk on
//! every reload) and a replaceable [`SavedStatus`] (the durable sync history).
//! The state store keeps both together in a shared [`MirrorRecord`]; callers
//! outside the scheduler only ever see [`MirrorItem`] value copies.

pub mod interval;
pub mod loader;

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};

pub use interval::IntervalPolicy;

/// Sentinel for "never" timestamps.
pub const EPOCH: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

/// Size value meaning "not measured yet".
pub const UNKNOWN_SIZE: i64 = -1;

/// Longest mirror id the durable store accepts.
pub const MAX_MIRROR_ID_LEN: usize = 42;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncType {
    /// Periodically synchronized by a worker
    Sync,
    /// Served from a cache, never scheduled
    Cached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MirrorStatus {
    #[serde(alias = "unknown")]
    Unknown,
    #[serde(alias = "cached")]
    Cached,
    #[serde(alias = "succeeded")]
    Succeeded,
    #[serde(alias = "syncing")]
    Syncing,
    #[serde(alias = "failed")]
    Failed,
}

impl MirrorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MirrorStatus::Unknown => "unknown",
            MirrorStatus::Cached => "cached",
            MirrorStatus::Succeeded => "succeeded",
            MirrorStatus::Syncing => "syncing",
            MirrorStatus::Failed => "failed",
        }
    }

    /// Whether a worker may report this status as the outcome of a job.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MirrorStatus::Succeeded | MirrorStatus::Failed)
    }
}

impl std::fmt::Display for MirrorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for MirrorStatus {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unknown" => Ok(MirrorStatus::Unknown),
            "cached" => Ok(MirrorStatus::Cached),
            "succeeded" => Ok(MirrorStatus::Succeeded),
            "syncing" => Ok(MirrorStatus::Syncing),
            "failed" => Ok(MirrorStatus::Failed),
            other => Err(OrchestratorError::Internal(format!(
                "unrecognized mirror status {other:?}"
            ))),
        }
    }
}

/// Display metadata. Passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub upstream: String,
    #[serde(rename = "type")]
    pub sync_type: SyncType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeInfo {
    pub src: String,
    pub dst: String,
    #[serde(default)]
    pub read_only: bool,
}

/// Container job description for `Sync` mirrors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    pub job_name: String,
    pub image: String,
    pub interval: IntervalPolicy,
    #[serde(with = "interval::duration_expr")]
    pub timeout: TimeDelta,
    #[serde(default)]
    pub volumes: Vec<VolumeInfo>,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub environments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorConfig {
    pub id: String,
    pub info: MirrorInfo,
    #[serde(default)]
    pub sync: Option<SyncConfig>,
}

impl MirrorConfig {
    pub fn sync_type(&self) -> SyncType {
        self.info.sync_type
    }

    /// The sync section, but only for mirrors that are actually scheduled.
    pub fn schedule(&self) -> Option<&SyncConfig> {
        match self.info.sync_type {
            SyncType::Sync => self.sync.as_ref(),
            SyncType::Cached => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| OrchestratorError::InvalidConfig {
            id: self.id.clone(),
            reason: reason.to_string(),
        };
        if self.id.trim().is_empty() {
            return Err(invalid("mirror id is empty"));
        }
        if self.id.chars().count() > MAX_MIRROR_ID_LEN {
            return Err(invalid("mirror id is longer than 42 characters"));
        }
        if self.info.sync_type == SyncType::Sync && self.sync.is_none() {
            return Err(invalid("sync mirror has no sync section"));
        }
        Ok(())
    }
}

/// A downloadable file advertised for a mirror (ISO image, installer, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub priority: i32,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
}

impl Artifact {
    /// Artifact urls are site-relative paths without query or fragment.
    pub fn has_valid_url(&self) -> bool {
        self.url.starts_with('/') && !self.url.contains('?') && !self.url.contains('#')
    }
}

/// Durable sync history of one mirror. Always replaced as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedStatus {
    pub id: String,
    pub status: MirrorStatus,
    pub last_sync_at: DateTime<Utc>,
    pub last_success_at: DateTime<Utc>,
    pub size: i64,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

impl SavedStatus {
    /// Record for a mirror that has never been synced.
    pub fn unknown(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: MirrorStatus::Unknown,
            last_sync_at: EPOCH,
            last_success_at: EPOCH,
            size: UNKNOWN_SIZE,
            artifacts: Vec::new(),
        }
    }

    /// Canonical form written to memory and storage: millisecond UTC
    /// timestamps, `-1` for any negative size, and only well-formed artifacts.
    pub fn canonical(mut self) -> Self {
        self.last_sync_at = self.last_sync_at.trunc_subsecs(3);
        self.last_success_at = self.last_success_at.trunc_subsecs(3);
        if self.size < 0 {
            self.size = UNKNOWN_SIZE;
        }
        let id = self.id.clone();
        self.artifacts.retain(|artifact| {
            let ok = artifact.has_valid_url();
            if !ok {
                tracing::warn!(mirror_id = %id, url = %artifact.url, "Dropping artifact with invalid url");
            }
            ok
        });
        self
    }
}

/// Live config + status pair shared between the state store and the jobs
/// scheduled for it.
#[derive(Debug)]
pub struct MirrorRecord {
    pub config: MirrorConfig,
    saved: RwLock<SavedStatus>,
}

impl MirrorRecord {
    pub fn new(config: MirrorConfig, saved: SavedStatus) -> Self {
        Self {
            config,
            saved: RwLock::new(saved),
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// Copy of the current saved status.
    pub fn saved(&self) -> SavedStatus {
        self.saved.read().clone()
    }

    pub(crate) fn replace_saved(&self, saved: SavedStatus) {
        *self.saved.write() = saved;
    }

    pub fn next_sync_at(&self) -> DateTime<Utc> {
        next_sync_at(&self.config, self.saved.read().last_sync_at)
    }

    pub fn snapshot(&self) -> MirrorItem {
        MirrorItem {
            config: self.config.clone(),
            saved: self.saved(),
        }
    }
}

/// Detached copy of a mirror record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorItem {
    pub config: MirrorConfig,
    pub saved: SavedStatus,
}

impl MirrorItem {
    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn next_sync_at(&self) -> DateTime<Utc> {
        next_sync_at(&self.config, self.saved.last_sync_at)
    }
}

const SIZE_SUFFIXES: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Human readable byte count, e.g. `1.5 GB`. Unknown sizes print as `0 B`.
pub fn format_size(size: i64) -> String {
    if size <= 0 {
        return "0 B".to_string();
    }
    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_SUFFIXES.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let number = format!("{value:.2}");
    let number = number.trim_end_matches('0').trim_end_matches('.');
    format!("{number} {}", SIZE_SUFFIXES[unit])
}

fn next_sync_at(config: &MirrorConfig, last_sync_at: DateTime<Utc>) -> DateTime<Utc> {
    match config.schedule() {
        Some(sync) => sync.interval.next_sync_time(last_sync_at),
        None => EPOCH,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sync_config(id: &str, interval: &str, timeout: &str) -> MirrorConfig {
        MirrorConfig {
            id: id.to_string(),
            info: MirrorInfo {
                name: id.to_string(),
                description: String::new(),
                url: format!("/{id}"),
                upstream: format!("rsync://upstream.example.org/{id}"),
                sync_type: SyncType::Sync,
            },
            sync: Some(SyncConfig {
                job_name: format!("{id}-sync"),
                image: "mirror/rsync:latest".to_string(),
                interval: interval.parse().unwrap(),
                timeout: interval::parse_duration(timeout).unwrap(),
                volumes: Vec::new(),
                command: vec!["rsync".to_string()],
                environments: Vec::new(),
            }),
        }
    }

    #[test]
    fn validate_rejects_long_and_empty_ids() {
        let mut cfg = sync_config("ubuntu", "6h", "1h");
        assert!(cfg.validate().is_ok());

        cfg.id = "x".repeat(43);
        assert!(cfg.validate().is_err());

        cfg.id = "  ".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_requires_sync_section_for_sync_mirrors() {
        let mut cfg = sync_config("debian", "6h", "1h");
        cfg.sync = None;
        assert!(cfg.validate().is_err());

        cfg.info.sync_type = SyncType::Cached;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn cached_mirror_has_no_schedule() {
        let mut cfg = sync_config("pypi", "6h", "1h");
        cfg.info.sync_type = SyncType::Cached;
        assert!(cfg.schedule().is_none());

        let item = MirrorItem {
            config: cfg,
            saved: SavedStatus::unknown("pypi"),
        };
        assert_eq!(item.next_sync_at(), EPOCH);
    }

    #[test]
    fn canonical_clamps_size_and_drops_bad_artifacts() {
        let mut saved = SavedStatus::unknown("arch");
        saved.size = -42;
        saved.artifacts = vec![
            Artifact {
                priority: 1,
                name: "iso".to_string(),
                url: "/arch/iso/latest.iso".to_string(),
                description: String::new(),
            },
            Artifact {
                priority: 2,
                name: "remote".to_string(),
                url: "https://example.org/x.iso".to_string(),
                description: String::new(),
            },
            Artifact {
                priority: 3,
                name: "query".to_string(),
                url: "/arch/x.iso?v=1".to_string(),
                description: String::new(),
            },
        ];

        let canonical = saved.canonical();
        assert_eq!(canonical.size, UNKNOWN_SIZE);
        assert_eq!(canonical.artifacts.len(), 1);
        assert_eq!(canonical.artifacts[0].name, "iso");
    }

    #[test]
    fn canonical_truncates_to_milliseconds() {
        let mut saved = SavedStatus::unknown("alpine");
        saved.last_sync_at = EPOCH + TimeDelta::nanoseconds(1_234_567_891);
        let canonical = saved.canonical();
        assert_eq!(
            canonical.last_sync_at,
            EPOCH + TimeDelta::milliseconds(1_234)
        );
    }

    #[test]
    fn format_size_picks_largest_unit() {
        assert_eq!(format_size(UNKNOWN_SIZE), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3 GB");
        assert_eq!(format_size(5 * 1024_i64.pow(5)), "5120 TB");
    }

    #[test]
    fn status_parses_both_spellings() {
        let s: MirrorStatus = serde_json::from_str("\"Succeeded\"").unwrap();
        assert_eq!(s, MirrorStatus::Succeeded);
        let s: MirrorStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(s, MirrorStatus::Failed);
        assert_eq!("syncing".parse::<MirrorStatus>().unwrap(), MirrorStatus::Syncing);
    }
}
