//! C2 — persistent CRUD over task rows, atomic partial-result merges, and
//! the striped keyed lock that keeps per-task merges serialized without
//! blocking unrelated tasks. The spec treats the lock as a pure contention
//! optimizer (correctness rests on the CAS in `transition`); this in-memory
//! reference store keeps both; a real backend would layer the lock over
//! actual DB transactions the same way.

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use transcode_wire::{FaceResult, ProfileResult};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::task::{FaceStage, Task, TaskStatus};

/// Outcome of folding one result message into a task row.
#[derive(Debug)]
pub enum ApplyOutcome {
    /// The result was folded into the row; carries the row's new state.
    Applied(Task),
    /// The task no longer exists or is already terminal; caller should ack
    /// and drop.
    Stale,
    /// `(task_id, profile_id)` (or the face stage) already has a recorded
    /// outcome; caller should ack and drop.
    Duplicate,
    /// A retryable failure under the attempt bound; caller should republish
    /// the original work item with this attempt number.
    NeedsRepublish { task: Task, attempt: u32 },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ListFilter {
    pub status: Option<TaskStatus>,
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create(&self, task: Task) -> OrchestratorResult<()>;
    async fn get(&self, task_id: &str) -> OrchestratorResult<Task>;
    async fn list(&self, filter: ListFilter, limit: usize, offset: usize) -> OrchestratorResult<(Vec<Task>, usize)>;
    async fn summary(&self) -> OrchestratorResult<BTreeMap<String, usize>>;

    async fn apply_partial(
        &self,
        task_id: &str,
        result: ProfileResult,
        retry_max_per_profile: u32,
    ) -> OrchestratorResult<ApplyOutcome>;

    async fn apply_face_result(
        &self,
        task_id: &str,
        result: FaceResult,
        retry_max_per_profile: u32,
    ) -> OrchestratorResult<ApplyOutcome>;

    /// Guarded CAS: fails with `StorageConflict` unless `task.status == old`.
    async fn transition(&self, task_id: &str, old: TaskStatus, new: TaskStatus) -> OrchestratorResult<Task>;

    /// Clears `outputs`, `failed_profiles`, `face_detection`, `error`;
    /// resets `status` to `Pending`.
    async fn reset_for_retry(&self, task_id: &str) -> OrchestratorResult<Task>;

    async fn delete(&self, task_id: &str) -> OrchestratorResult<()>;
}

/// A fixed-size array of stripe mutexes, each guarding an arbitrary subset of
/// keys chosen by hash. Acquiring the stripe for `task_id` serializes all
/// merges on that task without serializing unrelated tasks (modulo hash
/// collisions across stripes, which only add benign extra waiting).
pub struct KeyedLocks {
    stripes: Vec<Mutex<()>>,
}

impl KeyedLocks {
    pub fn new(stripe_count: usize) -> Self {
        let stripe_count = stripe_count.max(1);
        Self {
            stripes: (0..stripe_count).map(|_| Mutex::new(())).collect(),
        }
    }

    fn stripe_index(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.stripes.len()
    }

    pub async fn lock(&self, key: &str) -> tokio::sync::MutexGuard<'_, ()> {
        self.stripes[self.stripe_index(key)].lock().await
    }
}

impl Default for KeyedLocks {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Reference `TaskStore`: an in-memory map behind a single `RwLock`, with a
/// `KeyedLocks` layered in front of every read-modify-write merge.
pub struct InMemoryTaskStore {
    tasks: RwLock<BTreeMap<String, Task>>,
    locks: KeyedLocks,
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(BTreeMap::new()),
            locks: KeyedLocks::default(),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, task: Task) -> OrchestratorResult<()> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.task_id) {
            return Err(OrchestratorError::TaskAlreadyExists(task.task_id));
        }
        tasks.insert(task.task_id.clone(), task);
        Ok(())
    }

    async fn get(&self, task_id: &str) -> OrchestratorResult<Task> {
        let tasks = self.tasks.read().await;
        tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::TaskNotFound(task_id.to_string()))
    }

    async fn list(&self, filter: ListFilter, limit: usize, offset: usize) -> OrchestratorResult<(Vec<Task>, usize)> {
        let tasks = self.tasks.read().await;
        let matching: Vec<&Task> = tasks
            .values()
            .filter(|task| filter.status.map(|s| s == task.status).unwrap_or(true))
            .collect();
        let total = matching.len();
        let page = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn summary(&self) -> OrchestratorResult<BTreeMap<String, usize>> {
        let tasks = self.tasks.read().await;
        let mut counts = BTreeMap::new();
        for task in tasks.values() {
            *counts.entry(task.status.to_string()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn apply_partial(
        &self,
        task_id: &str,
        result: ProfileResult,
        retry_max_per_profile: u32,
    ) -> OrchestratorResult<ApplyOutcome> {
        let _guard = self.locks.lock(task_id).await;
        let mut tasks = self.tasks.write().await;
        let Some(task) = tasks.get_mut(task_id) else {
            return Ok(ApplyOutcome::Stale);
        };
        if task.status.is_terminal() {
            return Ok(ApplyOutcome::Stale);
        }

        let profile_id = result.profile_id().to_string();
        if !task.effective_profiles.contains(&profile_id) {
            return Ok(ApplyOutcome::Stale);
        }
        if task.outputs.contains_key(&profile_id) || task.failed_profiles.contains(&profile_id) {
            return Ok(ApplyOutcome::Duplicate);
        }

        match result {
            ProfileResult::Success { artifact, .. } => {
                task.outputs.entry(profile_id).or_default().push(artifact);
            }
            ProfileResult::Failure { reason, retryable, .. } => {
                let attempt_count = task.attempts.entry(profile_id.clone()).or_insert(0);
                *attempt_count += 1;
                let attempt = *attempt_count;
                if retryable && attempt < retry_max_per_profile {
                    task.updated_at = Utc::now();
                    return Ok(ApplyOutcome::NeedsRepublish { task: task.clone(), attempt });
                }
                task.failed_profiles.insert(profile_id.clone());
                task.profile_errors.insert(profile_id, reason);
            }
        }
        task.updated_at = Utc::now();
        Ok(ApplyOutcome::Applied(task.clone()))
    }

    async fn apply_face_result(
        &self,
        task_id: &str,
        result: FaceResult,
        retry_max_per_profile: u32,
    ) -> OrchestratorResult<ApplyOutcome> {
        let _guard = self.locks.lock(task_id).await;
        let mut tasks = self.tasks.write().await;
        let Some(task) = tasks.get_mut(task_id) else {
            return Ok(ApplyOutcome::Stale);
        };
        if task.status.is_terminal() {
            return Ok(ApplyOutcome::Stale);
        }
        if !task.face_detection.is_pending() {
            return Ok(ApplyOutcome::Duplicate);
        }

        match result {
            FaceResult::Success { faces, .. } => {
                task.face_detection = FaceStage::Completed { faces };
            }
            FaceResult::Failure { reason, retryable, .. } => {
                task.face_attempts += 1;
                if retryable && task.face_attempts < retry_max_per_profile {
                    task.updated_at = Utc::now();
                    let attempt = task.face_attempts;
                    return Ok(ApplyOutcome::NeedsRepublish { task: task.clone(), attempt });
                }
                task.face_detection = FaceStage::Failed { reason };
            }
        }
        task.updated_at = Utc::now();
        Ok(ApplyOutcome::Applied(task.clone()))
    }

    async fn transition(&self, task_id: &str, old: TaskStatus, new: TaskStatus) -> OrchestratorResult<Task> {
        let _guard = self.locks.lock(task_id).await;
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| OrchestratorError::TaskNotFound(task_id.to_string()))?;
        if task.status != old {
            return Err(OrchestratorError::StorageConflict {
                task_id: task_id.to_string(),
                expected: old.to_string(),
                actual: task.status.to_string(),
            });
        }
        task.status = new;
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn reset_for_retry(&self, task_id: &str) -> OrchestratorResult<Task> {
        let _guard = self.locks.lock(task_id).await;
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| OrchestratorError::TaskNotFound(task_id.to_string()))?;
        task.outputs.clear();
        task.failed_profiles.clear();
        task.profile_errors.clear();
        task.attempts.clear();
        task.face_attempts = 0;
        task.face_detection = if matches!(task.face_detection, FaceStage::Disabled) {
            FaceStage::Disabled
        } else {
            FaceStage::Pending
        };
        task.error = None;
        task.status = TaskStatus::Pending;
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn delete(&self, task_id: &str) -> OrchestratorResult<()> {
        let _guard = self.locks.lock(task_id).await;
        let mut tasks = self.tasks.write().await;
        tasks
            .remove(task_id)
            .map(|_| ())
            .ok_or_else(|| OrchestratorError::TaskNotFound(task_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap as Map, BTreeSet};
    use transcode_wire::ArtifactPayload;

    fn fresh_task(task_id: &str) -> Task {
        let now = Utc::now();
        Task {
            task_id: task_id.into(),
            status: TaskStatus::Processing,
            source: "https://example.com/clip.mp4".into(),
            submitted_profiles: vec![],
            effective_profiles: vec!["p1".into(), "p2".into()],
            dropped_profiles: vec![],
            outputs: Map::new(),
            failed_profiles: BTreeSet::new(),
            profile_errors: Map::new(),
            attempts: Map::new(),
            face_detection: FaceStage::Disabled,
            face_attempts: 0,
            detected_media_type: crate::task::MediaType::Video,
            callback: None,
            notify_topic: None,
            created_at: now,
            updated_at: now,
            error: None,
        }
    }

    #[tokio::test]
    async fn duplicate_success_is_rejected_after_first_apply() {
        let store = InMemoryTaskStore::new();
        store.create(fresh_task("t1")).await.unwrap();
        let ok = ProfileResult::Success {
            task_id: "t1".into(),
            profile_id: "p1".into(),
            artifact: ArtifactPayload { url: "u".into(), size_bytes: 1, metadata: serde_json::json!({}) },
        };
        let first = store.apply_partial("t1", ok.clone(), 3).await.unwrap();
        assert!(matches!(first, ApplyOutcome::Applied(_)));
        let second = store.apply_partial("t1", ok, 3).await.unwrap();
        assert!(matches!(second, ApplyOutcome::Duplicate));
    }

    #[tokio::test]
    async fn retryable_failure_under_bound_requests_republish() {
        let store = InMemoryTaskStore::new();
        store.create(fresh_task("t1")).await.unwrap();
        let failure = ProfileResult::Failure {
            task_id: "t1".into(),
            profile_id: "p1".into(),
            reason: "timeout".into(),
            retryable: true,
        };
        let outcome = store.apply_partial("t1", failure, 3).await.unwrap();
        match outcome {
            ApplyOutcome::NeedsRepublish { attempt, task } => {
                assert_eq!(attempt, 1);
                assert!(!task.failed_profiles.contains("p1"));
            }
            other => panic!("expected NeedsRepublish, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn retryable_failure_exhausted_records_terminal_failure() {
        let store = InMemoryTaskStore::new();
        store.create(fresh_task("t1")).await.unwrap();
        let failure = || ProfileResult::Failure {
            task_id: "t1".into(),
            profile_id: "p1".into(),
            reason: "timeout".into(),
            retryable: true,
        };
        store.apply_partial("t1", failure(), 3).await.unwrap();
        store.apply_partial("t1", failure(), 3).await.unwrap();
        let outcome = store.apply_partial("t1", failure(), 3).await.unwrap();
        match outcome {
            ApplyOutcome::Applied(task) => {
                assert!(task.failed_profiles.contains("p1"));
            }
            other => panic!("expected Applied with failure recorded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stale_message_for_unknown_profile_is_discarded() {
        let store = InMemoryTaskStore::new();
        store.create(fresh_task("t1")).await.unwrap();
        let result = ProfileResult::Success {
            task_id: "t1".into(),
            profile_id: "not-effective".into(),
            artifact: ArtifactPayload { url: "u".into(), size_bytes: 1, metadata: serde_json::json!({}) },
        };
        let outcome = store.apply_partial("t1", result, 3).await.unwrap();
        assert!(matches!(outcome, ApplyOutcome::Stale));
    }

    #[tokio::test]
    async fn reset_for_retry_clears_outputs_and_resets_status() {
        let store = InMemoryTaskStore::new();
        store.create(fresh_task("t1")).await.unwrap();
        store.transition("t1", TaskStatus::Processing, TaskStatus::Completed).await.unwrap();
        let reset = store.reset_for_retry("t1").await.unwrap();
        assert_eq!(reset.status, TaskStatus::Pending);
        assert!(reset.outputs.is_empty());
    }

    #[tokio::test]
    async fn transition_rejects_mismatched_expected_status() {
        let store = InMemoryTaskStore::new();
        store.create(fresh_task("t1")).await.unwrap();
        let err = store
            .transition("t1", TaskStatus::Completed, TaskStatus::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::StorageConflict { .. }));
    }
}
