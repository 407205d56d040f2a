// =====================================================================================
// File: core-scoring/src/state.rs
// Description: JSON-document state store for perceptual hashes, case timestamps,
//              and device usage sliding windows
// =====================================================================================

use chrono::{Duration, NaiveDateTime};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{ScoringError, ScoringResult};
use crate::types::naive_ts;

/// One recorded perceptual hash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashRecord {
    pub hash: String,
    pub case_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ApplicantState {
    #[serde(default)]
    hashes: HashMap<String, HashRecord>,
    #[serde(default)]
    timestamps: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DeviceState {
    #[serde(default)]
    events: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StateDocument {
    #[serde(default)]
    applicants: HashMap<String, ApplicantState>,
    #[serde(default)]
    devices: HashMap<String, DeviceState>,
}

/// Persistent store behind a process-local mutex. Every mutation rewrites the
/// backing file atomically (write to temp, then rename), so readers never see
/// a partial document. A corrupt or missing file is treated as empty.
pub struct StateStore {
    path: PathBuf,
    state: Mutex<StateDocument>,
}

impl StateStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = Self::load(&path);
        Self {
            path,
            state: Mutex::new(state),
        }
    }

    fn load(path: &Path) -> StateDocument {
        match fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                warn!(path = %path.display(), %err, "State file corrupt, starting empty");
                StateDocument::default()
            }),
            Err(_) => StateDocument::default(),
        }
    }

    fn persist(&self, state: &StateDocument) -> ScoringResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| {
                    ScoringError::state_error(format!("create state dir failed: {err}"))
                })?;
            }
        }
        let serialized = serde_json::to_string_pretty(state)
            .map_err(|err| ScoringError::state_error(format!("serialize failed: {err}")))?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, serialized)
            .map_err(|err| ScoringError::state_error(format!("write failed: {err}")))?;
        fs::rename(&tmp_path, &self.path)
            .map_err(|err| ScoringError::state_error(format!("rename failed: {err}")))
    }

    /// Record a perceptual hash for `(applicant, evidence)` under a case id
    pub fn record_hash(
        &self,
        applicant_id: &str,
        evidence_id: &str,
        hash: &str,
        case_id: &str,
    ) -> ScoringResult<()> {
        let mut state = self.state.lock();
        state
            .applicants
            .entry(applicant_id.to_string())
            .or_default()
            .hashes
            .insert(
                evidence_id.to_string(),
                HashRecord {
                    hash: hash.to_string(),
                    case_id: case_id.to_string(),
                },
            );
        self.persist(&state)
    }

    /// All hashes recorded so far for an applicant
    pub fn list_hashes(&self, applicant_id: &str) -> HashMap<String, HashRecord> {
        let state = self.state.lock();
        state
            .applicants
            .get(applicant_id)
            .map(|applicant| applicant.hashes.clone())
            .unwrap_or_default()
    }

    /// Append a device usage event, trim to the sliding window, and return the
    /// number of events remaining inside the window (including this one).
    /// A missing device id records nothing and counts zero.
    pub fn record_device_usage(
        &self,
        device_id: Option<&str>,
        timestamp: NaiveDateTime,
        window_days: i64,
    ) -> ScoringResult<usize> {
        let Some(device_id) = device_id else {
            return Ok(0);
        };
        let mut state = self.state.lock();
        let device = state.devices.entry(device_id.to_string()).or_default();
        device
            .events
            .push(timestamp.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
        let cutoff = timestamp - Duration::days(window_days);
        device
            .events
            .retain(|event| matches!(naive_ts::parse(event), Some(parsed) if parsed >= cutoff));
        let count = device.events.len();
        self.persist(&state)?;
        Ok(count)
    }

    /// Append a case submission timestamp for an applicant and return the full
    /// recorded history
    pub fn record_case_timestamp(
        &self,
        applicant_id: &str,
        timestamp: &str,
    ) -> ScoringResult<Vec<String>> {
        let mut state = self.state.lock();
        let applicant = state.applicants.entry(applicant_id.to_string()).or_default();
        applicant.timestamps.push(timestamp.to_string());
        let history = applicant.timestamps.clone();
        self.persist(&state)?;
        Ok(history)
    }
}
