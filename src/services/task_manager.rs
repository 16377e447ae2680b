//! The Task Manager (§4.B): a persistent per-task store with claim/lease semantics
//! and markdown hydration, kept deliberately separate from the Task Queue's richer
//! runtime state machine (§4.C) per the note in SPEC_FULL.md §4.B.
//!
//! Grounded in style on the teacher's `services/task_queue_service.rs` (service over
//! an in-memory/repository-backed table, `#[instrument]` density, idempotent-edge
//! mutation helpers) but made fully synchronous per §5's atomicity requirement.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::error::TaskManagerError;
use crate::domain::models::{Event, TaskId};
use crate::domain::ports::EventSink;

/// The Task Manager's own status vocabulary (§4.B), distinct from the Task Queue's
/// `TaskStatus` (§4.C) — see the design note in SPEC_FULL.md §4.B for why these are
/// kept separate rather than merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerStatus {
    /// Not currently claimed by any owner.
    Pending,
    /// Claimed by a worker/session (`owner` is set).
    InProgress,
    /// Finished successfully.
    Completed,
    /// Removed via an explicit `update(..., status: deleted)`.
    Deleted,
}

impl ManagerStatus {
    fn sort_rank(self) -> u8 {
        match self {
            Self::InProgress => 0,
            Self::Pending => 1,
            Self::Completed => 2,
            Self::Deleted => 3,
        }
    }
}

/// A single entry in the Task Manager's table (§4.B).
#[derive(Debug, Clone)]
pub struct ManagedTask {
    id: TaskId,
    subject: String,
    description: String,
    status: ManagerStatus,
    owner: Option<String>,
    blocked_by: Vec<TaskId>,
    blocks: Vec<TaskId>,
    metadata: HashMap<String, Value>,
    updated_at: DateTime<Utc>,
}

impl ManagedTask {
    /// Task id.
    #[must_use]
    pub const fn id(&self) -> &TaskId {
        &self.id
    }

    /// Subject line.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Full description text.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Current manager status.
    #[must_use]
    pub const fn status(&self) -> ManagerStatus {
        self.status
    }

    /// Current owner, if claimed.
    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Ids of tasks blocking this one.
    #[must_use]
    pub fn blocked_by(&self) -> &[TaskId] {
        &self.blocked_by
    }

    /// Ids of tasks this one blocks.
    #[must_use]
    pub fn blocks(&self) -> &[TaskId] {
        &self.blocks
    }

    /// Opaque metadata.
    #[must_use]
    pub const fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }
}

/// A patch applied via `update` (§4.B). All fields optional; `None` leaves the field
/// untouched, `Some(None)` on `metadata` deletions is expressed via the
/// [`MetadataPatch::Delete`] variant.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    /// New status, if changing.
    pub status: Option<ManagerStatus>,
    /// New subject, if changing.
    pub subject: Option<String>,
    /// New description, if changing.
    pub description: Option<String>,
    /// Ids to add to `blocked_by` (idempotent).
    pub add_blocked_by: Vec<TaskId>,
    /// Ids to add to `blocks` (idempotent).
    pub add_blocks: Vec<TaskId>,
    /// Metadata mutations to apply.
    pub metadata: Vec<(String, MetadataPatch)>,
}

/// A single metadata mutation.
#[derive(Debug, Clone)]
pub enum MetadataPatch {
    /// Set `key` to `value`.
    Set(Value),
    /// Remove `key` entirely (the `update` contract's "assigning `null`" rule).
    Delete,
}

/// Summary row returned by `list_summaries` (§4.B).
#[derive(Debug, Clone)]
pub struct TaskSummary {
    /// Task id.
    pub id: TaskId,
    /// Subject line.
    pub subject: String,
    /// Manager status.
    pub status: ManagerStatus,
    /// Current owner, if any.
    pub owner: Option<String>,
    /// Ids of blockers not yet `completed`.
    pub open_blockers: Vec<TaskId>,
}

/// Outcome of `reconcile_stale_in_progress` (§4.B).
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOutcome {
    /// Number of tasks reverted from `in_progress` to `pending`.
    pub reconciled: usize,
}

/// The Task Manager (§4.B).
pub struct TaskManager {
    tasks: HashMap<TaskId, ManagedTask>,
    next_id: u64,
    sink: Box<dyn EventSink>,
}

impl TaskManager {
    /// Construct an empty manager, emitting events through `sink`.
    #[must_use]
    pub fn new(sink: Box<dyn EventSink>) -> Self {
        Self {
            tasks: HashMap::new(),
            next_id: 1,
            sink,
        }
    }

    /// Allocate a new task with a monotonic id and default `pending` status.
    #[tracing::instrument(skip(self, subject, description))]
    pub fn create(
        &mut self,
        subject: impl Into<String>,
        description: impl Into<String>,
    ) -> TaskId {
        let id = TaskId::normalize(&self.next_id.to_string());
        self.next_id += 1;
        let subject = subject.into();
        let task = ManagedTask {
            id: id.clone(),
            subject,
            description: description.into(),
            status: ManagerStatus::Pending,
            owner: None,
            blocked_by: Vec::new(),
            blocks: Vec::new(),
            metadata: HashMap::new(),
            updated_at: Utc::now(),
        };
        self.tasks.insert(id.clone(), task);
        self.sink.emit(Event::TaskCreated {
            task_id: id.clone(),
            at: Utc::now(),
        });
        id
    }

    fn resolve(&self, raw: &str) -> TaskId {
        TaskId::normalize(raw)
    }

    /// Fetch a task by (possibly shorthand) id.
    #[must_use]
    pub fn get(&self, raw_id: &str) -> Option<&ManagedTask> {
        self.tasks.get(&self.resolve(raw_id))
    }

    /// Apply a patch to a task (§4.B `update`). Accepts shorthand ids.
    #[tracing::instrument(skip(self, patch))]
    pub fn update(&mut self, raw_id: &str, patch: TaskPatch) -> Result<(), TaskManagerError> {
        let id = self.resolve(raw_id);

        if matches!(patch.status, Some(ManagerStatus::Deleted)) {
            if !self.tasks.contains_key(&id) {
                return Err(TaskManagerError::NotFound(id.to_string()));
            }
            self.tasks.remove(&id);
            for other in self.tasks.values_mut() {
                other.blocked_by.retain(|x| x != &id);
                other.blocks.retain(|x| x != &id);
            }
            self.sink.emit(Event::TaskUpdated { task_id: id, at: Utc::now() });
            return Ok(());
        }

        let task = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| TaskManagerError::NotFound(id.to_string()))?;

        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(subject) = patch.subject {
            task.subject = subject;
        }
        if let Some(description) = patch.description {
            task.description = description;
        }
        for dep in patch.add_blocked_by {
            if !task.blocked_by.contains(&dep) {
                task.blocked_by.push(dep);
            }
        }
        for dep in patch.add_blocks {
            if !task.blocks.contains(&dep) {
                task.blocks.push(dep);
            }
        }
        for (key, mutation) in patch.metadata {
            match mutation {
                MetadataPatch::Set(value) => {
                    task.metadata.insert(key, value);
                }
                MetadataPatch::Delete => {
                    task.metadata.remove(&key);
                }
            }
        }
        task.updated_at = Utc::now();

        self.sink.emit(Event::TaskUpdated { task_id: id, at: Utc::now() });
        Ok(())
    }

    /// Atomically claim a task for `owner` (§4.B `claim`).
    #[tracing::instrument(skip(self, owner))]
    pub fn claim(&mut self, raw_id: &str, owner: impl Into<String>) -> Result<(), TaskManagerError> {
        let id = self.resolve(raw_id);
        let task = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| TaskManagerError::NotFound(id.to_string()))?;
        task.status = ManagerStatus::InProgress;
        task.owner = Some(owner.into());
        task.updated_at = Utc::now();
        Ok(())
    }

    /// Shorthand for `update(id, {status: completed})` (§4.B `complete`).
    pub fn complete(&mut self, raw_id: &str) -> Result<(), TaskManagerError> {
        self.update(
            raw_id,
            TaskPatch {
                status: Some(ManagerStatus::Completed),
                ..TaskPatch::default()
            },
        )
    }

    /// True iff any entry in `blocked_by` is not yet `completed` (§4.B `isBlocked`).
    #[must_use]
    pub fn is_blocked(&self, raw_id: &str) -> bool {
        let Some(task) = self.get(raw_id) else {
            return false;
        };
        task.blocked_by.iter().any(|dep_id| {
            self.tasks
                .get(dep_id)
                .is_none_or(|dep| dep.status != ManagerStatus::Completed)
        })
    }

    /// `pending ∧ ¬owner ∧ ¬isBlocked` (§4.B `getAvailableTasks`).
    #[must_use]
    pub fn get_available_tasks(&self) -> Vec<&ManagedTask> {
        self.tasks
            .values()
            .filter(|t| t.status == ManagerStatus::Pending && t.owner.is_none())
            .filter(|t| !self.is_blocked(t.id.as_str()))
            .collect()
    }

    /// Summaries sorted by status (`in_progress, pending, completed, deleted`, the
    /// latter never actually present since deletion removes the row) then numeric id
    /// (§4.B `listSummaries`).
    #[must_use]
    pub fn list_summaries(&self) -> Vec<TaskSummary> {
        let mut rows: Vec<TaskSummary> = self
            .tasks
            .values()
            .map(|t| TaskSummary {
                id: t.id.clone(),
                subject: t.subject.clone(),
                status: t.status,
                owner: t.owner.clone(),
                open_blockers: t
                    .blocked_by
                    .iter()
                    .filter(|dep_id| {
                        self.tasks
                            .get(*dep_id)
                            .is_none_or(|dep| dep.status != ManagerStatus::Completed)
                    })
                    .cloned()
                    .collect(),
            })
            .collect();

        rows.sort_by(|a, b| {
            a.status
                .sort_rank()
                .cmp(&b.status.sort_rank())
                .then_with(|| numeric_suffix(a.id.as_str()).cmp(&numeric_suffix(b.id.as_str())))
        });
        rows
    }

    /// For each `in_progress` task whose owner is not in `active_owners` and whose
    /// last update predates `now - stale_after_ms`, revert to `pending` (clearing
    /// owner) and stamp `metadata.recoveryReason` (§4.B `reconcileStaleInProgress`).
    #[tracing::instrument(skip(self, active_owners))]
    pub fn reconcile_stale_in_progress(
        &mut self,
        stale_after_ms: i64,
        now: DateTime<Utc>,
        active_owners: &[String],
        reason: &str,
    ) -> ReconcileOutcome {
        let mut reconciled = 0usize;
        for task in self.tasks.values_mut() {
            if task.status != ManagerStatus::InProgress {
                continue;
            }
            let owner_active = task
                .owner
                .as_ref()
                .is_some_and(|o| active_owners.iter().any(|a| a == o));
            let stale = now - task.updated_at > chrono::Duration::milliseconds(stale_after_ms);
            if !owner_active && stale {
                task.status = ManagerStatus::Pending;
                task.owner = None;
                task.metadata
                    .insert("recoveryReason".to_string(), Value::String(reason.to_string()));
                task.updated_at = now;
                reconciled += 1;
            }
        }
        ReconcileOutcome { reconciled }
    }

    /// Render the task table to the markdown grammar in §6.3.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut rows: Vec<&ManagedTask> = self.tasks.values().collect();
        rows.sort_by_key(|t| numeric_suffix(t.id.as_str()));

        let mut out = String::from("# Tasks\n\n");
        for t in rows {
            let sigil = match t.status {
                ManagerStatus::Pending => ' ',
                ManagerStatus::InProgress => '~',
                ManagerStatus::Completed => 'x',
                ManagerStatus::Deleted => continue,
            };
            out.push_str(&format!("## [{sigil}] {}: {}\n", t.id, t.subject));
            out.push_str(&format!(
                "**Status:** {}\n",
                match t.status {
                    ManagerStatus::Pending => "pending",
                    ManagerStatus::InProgress => "in_progress",
                    ManagerStatus::Completed => "completed",
                    ManagerStatus::Deleted => "deleted",
                }
            ));
            if let Some(owner) = &t.owner {
                out.push_str(&format!("**Owner:** {owner}\n"));
            }
            if !t.blocked_by.is_empty() {
                let ids: Vec<String> = t.blocked_by.iter().map(ToString::to_string).collect();
                out.push_str(&format!("**Blocked by:** {}\n", ids.join(", ")));
            }
            if !t.blocks.is_empty() {
                let ids: Vec<String> = t.blocks.iter().map(ToString::to_string).collect();
                out.push_str(&format!("**Blocks:** {}\n", ids.join(", ")));
            }
            out.push_str("**Description:**\n");
            out.push_str(&t.description);
            out.push_str("\n\n");
        }
        out
    }

    /// Parse the markdown grammar in §6.3, replacing the manager's in-memory table
    /// wholesale. A `pending` task carrying an `**Owner:**` field (stale from a
    /// crashed session) has its owner stripped on import per §4.B's invariant repair.
    #[must_use]
    pub fn from_markdown(markdown: &str, sink: Box<dyn EventSink>) -> Self {
        let mut manager = Self::new(sink);
        manager.tasks.clear();

        let mut current: Option<ManagedTask> = None;
        let mut in_description = false;
        let mut max_numeric = 0u64;

        for line in markdown.lines() {
            if let Some(rest) = line.strip_prefix("## [") {
                if let Some(mut task) = current.take() {
                    // `to_markdown` always terminates a description block with a
                    // single blank separator line, which the `in_description`
                    // branch below has just appended as a trailing "\n" — strip it
                    // so the round-trip is lossless on `description` (§8).
                    if task.description.ends_with('\n') {
                        task.description.pop();
                    }
                    manager.tasks.insert(task.id.clone(), task);
                }
                in_description = false;
                let Some((sigil_part, header_rest)) = rest.split_once("] ") else {
                    continue;
                };
                let status = match sigil_part {
                    " " => ManagerStatus::Pending,
                    "~" => ManagerStatus::InProgress,
                    "x" => ManagerStatus::Completed,
                    _ => ManagerStatus::Pending,
                };
                let (id_part, subject) = header_rest.split_once(": ").unwrap_or((header_rest, ""));
                let id = TaskId::normalize(id_part);
                max_numeric = max_numeric.max(numeric_suffix(id.as_str()));
                current = Some(ManagedTask {
                    id,
                    subject: subject.to_string(),
                    description: String::new(),
                    status,
                    owner: None,
                    blocked_by: Vec::new(),
                    blocks: Vec::new(),
                    metadata: HashMap::new(),
                    updated_at: Utc::now(),
                });
            } else if let Some(owner) = line.strip_prefix("**Owner:** ") {
                if let Some(task) = current.as_mut() {
                    task.owner = Some(owner.to_string());
                }
            } else if let Some(rest) = line.strip_prefix("**Blocked by:** ") {
                if let Some(task) = current.as_mut() {
                    task.blocked_by = rest.split(", ").filter(|s| !s.is_empty()).map(TaskId::normalize).collect();
                }
            } else if let Some(rest) = line.strip_prefix("**Blocks:** ") {
                if let Some(task) = current.as_mut() {
                    task.blocks = rest.split(", ").filter(|s| !s.is_empty()).map(TaskId::normalize).collect();
                }
            } else if line.starts_with("**Description:**") {
                in_description = true;
            } else if line.starts_with("**Status:**") {
                // Status is already derived from the checkbox sigil; field kept for
                // human readability only, not re-parsed.
            } else if in_description {
                if let Some(task) = current.as_mut() {
                    if !task.description.is_empty() {
                        task.description.push('\n');
                    }
                    task.description.push_str(line);
                }
            }
        }
        if let Some(mut task) = current.take() {
            if task.description.ends_with('\n') {
                task.description.pop();
            }
            manager.tasks.insert(task.id.clone(), task);
        }

        // Invariant repair: a pending task carrying an owner is stale (§4.B).
        for task in manager.tasks.values_mut() {
            if task.status == ManagerStatus::Pending && task.owner.is_some() {
                task.owner = None;
            }
        }

        manager.next_id = max_numeric + 1;
        manager
    }
}

fn numeric_suffix(id: &str) -> u64 {
    id.rsplit('-')
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::NullEventSink;

    fn manager() -> TaskManager {
        TaskManager::new(Box::new(NullEventSink))
    }

    #[test]
    fn create_allocates_monotonic_shorthand_ids() {
        let mut m = manager();
        let a = m.create("A", "desc a");
        let b = m.create("B", "desc b");
        assert_eq!(a.as_str(), "task-1");
        assert_eq!(b.as_str(), "task-2");
    }

    #[test]
    fn claim_sets_in_progress_and_owner() {
        let mut m = manager();
        let id = m.create("A", "d");
        m.claim(id.as_str(), "worker-1").unwrap();
        let t = m.get(id.as_str()).unwrap();
        assert_eq!(t.status(), ManagerStatus::InProgress);
        assert_eq!(t.owner(), Some("worker-1"));
    }

    #[test]
    fn delete_scrubs_edges_from_other_tasks() {
        let mut m = manager();
        let a = m.create("A", "d");
        let b = m.create("B", "d");
        m.update(
            b.as_str(),
            TaskPatch {
                add_blocked_by: vec![a.clone()],
                ..TaskPatch::default()
            },
        )
        .unwrap();
        m.update(
            a.as_str(),
            TaskPatch {
                status: Some(ManagerStatus::Deleted),
                ..TaskPatch::default()
            },
        )
        .unwrap();
        assert!(m.get(b.as_str()).unwrap().blocked_by().is_empty());
        assert!(m.get(a.as_str()).is_none());
    }

    #[test]
    fn is_blocked_true_until_blocker_completes() {
        let mut m = manager();
        let a = m.create("A", "d");
        let b = m.create("B", "d");
        m.update(
            b.as_str(),
            TaskPatch {
                add_blocked_by: vec![a.clone()],
                ..TaskPatch::default()
            },
        )
        .unwrap();
        assert!(m.is_blocked(b.as_str()));
        m.complete(a.as_str()).unwrap();
        assert!(!m.is_blocked(b.as_str()));
    }

    #[test]
    fn reconcile_stale_in_progress_clears_inactive_owner() {
        let mut m = manager();
        let a = m.create("A", "d");
        m.claim(a.as_str(), "worker-1").unwrap();
        let later = Utc::now() + chrono::Duration::milliseconds(10_000);
        let outcome = m.reconcile_stale_in_progress(1_000, later, &[], "stale lease");
        assert_eq!(outcome.reconciled, 1);
        let t = m.get(a.as_str()).unwrap();
        assert_eq!(t.status(), ManagerStatus::Pending);
        assert!(t.owner().is_none());
        assert!(t.metadata().contains_key("recoveryReason"));
    }

    #[test]
    fn reconcile_stale_in_progress_keeps_active_owner() {
        let mut m = manager();
        let a = m.create("A", "d");
        m.claim(a.as_str(), "worker-1").unwrap();
        let later = Utc::now() + chrono::Duration::milliseconds(10_000);
        let outcome = m.reconcile_stale_in_progress(1_000, later, &["worker-1".to_string()], "stale lease");
        assert_eq!(outcome.reconciled, 0);
        assert_eq!(m.get(a.as_str()).unwrap().status(), ManagerStatus::InProgress);
    }

    #[test]
    fn markdown_round_trip_preserves_public_fields() {
        let mut m = manager();
        let a = m.create("Write parser", "Full description\nsecond line");
        let b = m.create("Write tests", "desc b");
        m.update(
            b.as_str(),
            TaskPatch {
                add_blocked_by: vec![a.clone()],
                ..TaskPatch::default()
            },
        )
        .unwrap();
        m.update(
            a.as_str(),
            TaskPatch {
                add_blocks: vec![b.clone()],
                ..TaskPatch::default()
            },
        )
        .unwrap();

        let markdown = m.to_markdown();
        let restored = TaskManager::from_markdown(&markdown, Box::new(NullEventSink));

        let orig_a = m.get(a.as_str()).unwrap();
        let restored_a = restored.get(a.as_str()).unwrap();
        assert_eq!(orig_a.subject(), restored_a.subject());
        assert_eq!(orig_a.blocks(), restored_a.blocks());
        assert_eq!(orig_a.description(), restored_a.description());

        let orig_b = m.get(b.as_str()).unwrap();
        let restored_b = restored.get(b.as_str()).unwrap();
        assert_eq!(orig_b.blocked_by(), restored_b.blocked_by());
        assert_eq!(orig_b.description(), restored_b.description());
    }

    #[test]
    fn stale_pending_owner_is_stripped_on_markdown_import() {
        let markdown = "# Tasks\n\n## [ ] task-1: Stale\n**Status:** pending\n**Owner:** worker-1\n**Description:**\nd\n\n";
        let restored = TaskManager::from_markdown(markdown, Box::new(NullEventSink));
        let t = restored.get("task-1").unwrap();
        assert_eq!(t.status(), ManagerStatus::Pending);
        assert!(t.owner().is_none());
    }
}
