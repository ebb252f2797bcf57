//! The `Task` row: the single unit of work tracked by the orchestrator, and
//! the state machine that governs its lifecycle.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use transcode_wire::{ArtifactPayload, CallbackConfig, Face};

use crate::profile::Profile;

/// Where a `Task` sits in its lifecycle. Monotone along
/// `Pending -> Processing -> {Completed, Partial, Failed}`; the only
/// regression is `retry`, which resets a terminal task back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Partial,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Partial | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Partial => "partial",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// The face-detection stage, modeled as a peer of the per-profile transcode
/// stages rather than a profile, so it keeps its own config and retry counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FaceStage {
    Disabled,
    Pending,
    Completed { faces: Vec<Face> },
    Failed { reason: String },
}

impl FaceStage {
    pub fn is_pending(&self) -> bool {
        matches!(self, FaceStage::Pending)
    }

    fn label(&self) -> &'static str {
        match self {
            FaceStage::Disabled => "disabled",
            FaceStage::Pending => "pending",
            FaceStage::Completed { .. } => "completed",
            FaceStage::Failed { .. } => "failed",
        }
    }
}

/// `image`, `video`, or `unknown` — the output of the media classifier (C4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Video,
    Unknown,
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// The single unit of work tracked by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub status: TaskStatus,
    pub source: String,
    pub submitted_profiles: Vec<Profile>,
    pub effective_profiles: Vec<String>,
    pub dropped_profiles: Vec<String>,
    pub outputs: BTreeMap<String, Vec<ArtifactPayload>>,
    pub failed_profiles: BTreeSet<String>,
    pub profile_errors: BTreeMap<String, String>,
    /// Per-profile retry-attempt counters, bounded by `aggregator.retry_max_per_profile`.
    pub attempts: BTreeMap<String, u32>,
    pub face_detection: FaceStage,
    pub face_attempts: u32,
    pub detected_media_type: MediaType,
    pub callback: Option<CallbackConfig>,
    pub notify_topic: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl Task {
    /// Profiles still outstanding: neither succeeded nor terminally failed.
    pub fn outstanding_profiles(&self) -> BTreeSet<String> {
        self.effective_profiles
            .iter()
            .filter(|p| !self.outputs.contains_key(*p) && !self.failed_profiles.contains(*p))
            .cloned()
            .collect()
    }

    /// The §4.6 terminal predicate. Returns `None` while the task must remain
    /// `Processing`.
    pub fn terminal_status(&self) -> Option<TaskStatus> {
        if !self.outstanding_profiles().is_empty() || self.face_detection.is_pending() {
            return None;
        }
        if self.failed_profiles.is_empty()
            && matches!(self.face_detection, FaceStage::Disabled | FaceStage::Completed { .. })
        {
            Some(TaskStatus::Completed)
        } else if !self.outputs.is_empty() {
            Some(TaskStatus::Partial)
        } else {
            Some(TaskStatus::Failed)
        }
    }

    /// Checks the invariants of the data model (§3). Intended for tests and
    /// debug assertions, not the hot merge path.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.status != TaskStatus::Failed && self.effective_profiles.is_empty() {
            return Err("effective_profiles must be non-empty outside FAILED-at-admission".into());
        }
        for profile_id in self.outputs.keys() {
            if !self.effective_profiles.contains(profile_id) {
                return Err(format!("output for unknown profile {profile_id}"));
            }
            if self.failed_profiles.contains(profile_id) {
                return Err(format!("profile {profile_id} is both succeeded and failed"));
            }
        }
        for profile_id in &self.failed_profiles {
            if !self.effective_profiles.contains(profile_id) {
                return Err(format!("failure for unknown profile {profile_id}"));
            }
        }
        match self.status {
            TaskStatus::Completed => {
                let all_present = self
                    .effective_profiles
                    .iter()
                    .all(|p| self.outputs.contains_key(p));
                if !all_present {
                    return Err("COMPLETED requires every effective profile in outputs".into());
                }
                if !matches!(self.face_detection, FaceStage::Disabled | FaceStage::Completed { .. }) {
                    return Err("COMPLETED requires face stage DISABLED or COMPLETED".into());
                }
            }
            TaskStatus::Partial => {
                let union: BTreeSet<String> = self
                    .outputs
                    .keys()
                    .cloned()
                    .chain(self.failed_profiles.iter().cloned())
                    .collect();
                let effective: BTreeSet<String> = self.effective_profiles.iter().cloned().collect();
                if union != effective {
                    return Err("PARTIAL requires outputs ∪ failed == effective_profiles".into());
                }
                if self.failed_profiles.is_empty() || self.outputs.is_empty() {
                    return Err("PARTIAL requires a nonempty failure and a nonempty success set".into());
                }
                if self.face_detection.is_pending() {
                    return Err("PARTIAL requires face stage not PENDING".into());
                }
            }
            TaskStatus::Failed => {
                if !self.outputs.is_empty() {
                    return Err("FAILED requires empty outputs".into());
                }
            }
            TaskStatus::Pending | TaskStatus::Processing => {}
        }
        Ok(())
    }
}

impl std::fmt::Display for FaceStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
