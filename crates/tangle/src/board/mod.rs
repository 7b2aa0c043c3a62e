//! Dependency-gated task board.
//!
//! A [`TaskBoard`] owns the task records and a constrained [`GraphStore`]
//! holding their dependency edges (dependent -> dependency). Every mutation
//! validates first and mutates second, so a rejected operation leaves the
//! board untouched.
//!
//! # Lifecycle
//!
//! ```text
//! pending --(all deps completed)--> ready --claim--> in_progress --complete--> completed
//!    ^                                 |                  |                \-> failed
//!    \------(new unmet dependency)-----/                  \--release--> ready
//! ```
//!
//! `blocked` is never stored. It is reported for pending tasks that have a
//! failed task somewhere among their transitive dependencies.
//!
//! The board is not synchronized. [`SharedBoard`] wraps it in a lock and
//! handles persistence.

use crate::domain::{
    EdgeKind, NewTask, NodeId, Task, TaskFilter, TaskLabel, TaskState, TaskView,
};
use crate::error::{Error, Result};
use crate::graph::{reach, BlastRadius, GraphStore, DEFAULT_MAX_DEPTH};
use crate::storage::{canonical, LoadWarning};
use chrono::Utc;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

mod shared;

pub use shared::{LoadState, SharedBoard, StorageStatus};

/// Outcome of completing a task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Completion {
    /// The task after completion
    pub task: Task,

    /// Direct dependents that became ready, by priority (highest first)
    pub newly_ready: Vec<NodeId>,

    /// Direct dependents still waiting, by priority (highest first)
    pub still_blocked: Vec<NodeId>,
}

/// A blocked task and the failed dependencies responsible.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockedTask {
    /// The blocked task
    #[serde(flatten)]
    pub view: TaskView,

    /// Failed tasks among its transitive dependencies
    pub failed_dependencies: Vec<NodeId>,
}

/// Task counts per label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BoardStats {
    /// All tasks
    pub total: usize,
    /// Pending and not blocked
    pub pending: usize,
    /// Claimable
    pub ready: usize,
    /// Claimed
    pub in_progress: usize,
    /// Finished successfully
    pub completed: usize,
    /// Finished unsuccessfully
    pub failed: usize,
    /// Pending behind a failure
    pub blocked: usize,
    /// Dependency edges
    pub dependencies: usize,
}

/// Point-in-time copy of the board for persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardSnapshot {
    /// Board revision the snapshot was taken at
    pub revision: u64,

    /// Every task, sorted by id
    pub tasks: Vec<Task>,
}

/// Tasks plus their constrained dependency graph.
#[derive(Debug, Clone)]
pub struct TaskBoard {
    tasks: HashMap<NodeId, Task>,
    graph: GraphStore,
    revision: u64,
    max_depth: usize,
}

impl Default for TaskBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskBoard {
    /// Create an empty board.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_DEPTH)
    }

    /// Create an empty board with a custom traversal bound for queries.
    #[must_use]
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            tasks: HashMap::new(),
            graph: GraphStore::constrained(),
            revision: 0,
            max_depth,
        }
    }

    /// Rebuild a board from stored records.
    ///
    /// Duplicate records, dependencies on unknown tasks and dependencies that
    /// would close a cycle are skipped and reported. Readiness of pending and
    /// ready tasks is re-derived from the loaded dependency states.
    #[must_use]
    pub fn from_tasks(tasks: Vec<Task>, max_depth: usize) -> (Self, Vec<LoadWarning>) {
        let mut board = Self::with_max_depth(max_depth);
        let mut warnings = Vec::new();
        let mut pending_edges: Vec<(NodeId, Vec<NodeId>)> = Vec::new();

        for mut task in tasks {
            if board.tasks.contains_key(&task.id) {
                warnings.push(LoadWarning::DuplicateTask { id: task.id });
                continue;
            }
            let mut deps = std::mem::take(&mut task.dependencies);
            deps.sort();
            deps.dedup();

            board.graph.add_node(task.id.clone());
            pending_edges.push((task.id.clone(), deps));
            board.tasks.insert(task.id.clone(), task);
        }

        // Sorted so the edge dropped from a stored cycle is always the same one
        pending_edges.sort_by(|a, b| a.0.cmp(&b.0));

        for (id, deps) in pending_edges {
            let mut kept = Vec::with_capacity(deps.len());
            for dep in deps {
                if !board.tasks.contains_key(&dep) {
                    warnings.push(LoadWarning::OrphanedDependency {
                        from: id.clone(),
                        to: dep,
                    });
                    continue;
                }
                match board.graph.add_edge(&id, &dep, Some(EdgeKind::DependsOn)) {
                    Ok(_) => kept.push(dep),
                    Err(Error::CycleWouldForm { .. }) => {
                        warnings.push(LoadWarning::CyclicDependency {
                            from: id.clone(),
                            to: dep,
                        });
                    }
                    Err(_) => {
                        warnings.push(LoadWarning::OrphanedDependency {
                            from: id.clone(),
                            to: dep,
                        });
                    }
                }
            }
            if let Some(task) = board.tasks.get_mut(&id) {
                task.dependencies = kept;
            }
        }

        let ids: Vec<NodeId> = board.tasks.keys().cloned().collect();
        for id in &ids {
            board.refresh(id);
        }

        (board, warnings)
    }

    /// Copy every task for persistence.
    #[must_use]
    pub fn snapshot(&self) -> BoardSnapshot {
        let tasks: Vec<Task> = self.tasks.values().cloned().collect();
        BoardSnapshot {
            revision: self.revision,
            tasks: canonical(&tasks),
        }
    }

    /// Monotonic mutation counter.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Traversal bound used by queries.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// The dependency graph (read-only).
    #[must_use]
    pub fn graph(&self) -> &GraphStore {
        &self.graph
    }

    /// Number of tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the board has no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    fn task(&self, id: &NodeId) -> Result<&Task> {
        self.tasks
            .get(id)
            .ok_or_else(|| Error::NodeNotFound(id.clone()))
    }

    fn task_mut(&mut self, id: &NodeId) -> Result<&mut Task> {
        self.tasks
            .get_mut(id)
            .ok_or_else(|| Error::NodeNotFound(id.clone()))
    }

    // ========== Transitions ==========

    /// Create a task.
    ///
    /// The task starts `pending` and becomes `ready` immediately if it has no
    /// dependencies or all of them are already completed. Repeated dependency
    /// ids are collapsed.
    ///
    /// # Errors
    ///
    /// - `Error::MalformedInput` for an empty id or dependency id
    /// - `Error::AlreadyExists` if the id is taken
    /// - `Error::NodeNotFound` if a dependency does not exist
    /// - `Error::CycleWouldForm` if the task lists itself as a dependency
    pub fn create(&mut self, new_task: NewTask) -> Result<Task> {
        // === Phase 1: validation (no mutations) ===
        let id = NodeId::parse(&new_task.id)?;
        if self.tasks.contains_key(&id) {
            return Err(Error::AlreadyExists(id));
        }

        let mut deps: Vec<NodeId> = Vec::with_capacity(new_task.dependencies.len());
        for raw in &new_task.dependencies {
            let dep = NodeId::parse(raw)?;
            if dep != id && !self.tasks.contains_key(&dep) {
                return Err(Error::NodeNotFound(dep));
            }
            if !deps.contains(&dep) {
                deps.push(dep);
            }
        }

        // === Phase 2: graph insertion, rolled back on failure ===
        self.graph.add_node(id.clone());
        for dep in &deps {
            if let Err(e) = self.graph.add_edge(&id, dep, Some(EdgeKind::DependsOn)) {
                // The node was added above, so removal cannot fail
                let _ = self.graph.remove_node(&id);
                return Err(e);
            }
        }

        // === Phase 3: commit ===
        deps.sort();
        let task = Task {
            id: id.clone(),
            description: new_task.description,
            priority: new_task.priority,
            state: TaskState::Pending,
            dependencies: deps,
            claimant: None,
            created_at: Utc::now(),
            claimed_at: None,
            completed_at: None,
            result: None,
        };
        self.tasks.insert(id.clone(), task);
        self.refresh(&id);
        self.touch();

        let created = self.task(&id)?.clone();
        info!(task = %id, state = %created.state, deps = created.dependencies.len(), "created task");
        Ok(created)
    }

    /// Re-evaluate readiness of a pending or ready task.
    ///
    /// A task is `ready` iff every dependency is `completed`. Claimed and
    /// finished tasks are left as they are. Returns the resulting state.
    ///
    /// # Errors
    ///
    /// Returns `Error::NodeNotFound` if the task doesn't exist.
    pub fn recompute_readiness(&mut self, id: &NodeId) -> Result<TaskState> {
        self.task(id)?;
        let (before, after) = self.refresh(id);
        if before != after {
            self.touch();
        }
        Ok(after)
    }

    /// Apply the readiness rule, returning `(before, after)` states.
    fn refresh(&mut self, id: &NodeId) -> (TaskState, TaskState) {
        let met = self.dependencies_met(id);
        let Some(task) = self.tasks.get_mut(id) else {
            return (TaskState::Pending, TaskState::Pending);
        };

        let before = task.state;
        if matches!(before, TaskState::Pending | TaskState::Ready) {
            task.state = if met {
                TaskState::Ready
            } else {
                TaskState::Pending
            };
            if task.state != before {
                debug!(task = %id, from = %before, to = %task.state, "readiness changed");
            }
        }
        (before, task.state)
    }

    fn dependencies_met(&self, id: &NodeId) -> bool {
        self.tasks.get(id).is_some_and(|task| {
            task.dependencies.iter().all(|dep| {
                self.tasks
                    .get(dep)
                    .is_some_and(|d| d.state == TaskState::Completed)
            })
        })
    }

    /// Claim a ready task for `agent`.
    ///
    /// This is the single check-and-set that makes claims exclusive; callers
    /// sharing a board must hold its write lock across the call.
    ///
    /// # Errors
    ///
    /// - `Error::MalformedInput` if `agent` is empty
    /// - `Error::NodeNotFound` if the task doesn't exist
    /// - `Error::AlreadyClaimed` if another claim is active
    /// - `Error::NotReady` if the task is pending, blocked or finished
    pub fn claim(&mut self, id: &NodeId, agent: &str) -> Result<Task> {
        let agent = agent.trim();
        if agent.is_empty() {
            return Err(Error::MalformedInput("agent id cannot be empty".to_string()));
        }

        let task = self.task(id)?;
        match task.state {
            TaskState::Ready => {}
            TaskState::InProgress => {
                return Err(Error::AlreadyClaimed {
                    id: id.clone(),
                    claimant: task.claimant.clone().unwrap_or_default(),
                });
            }
            TaskState::Pending | TaskState::Completed | TaskState::Failed => {
                return Err(Error::NotReady {
                    id: id.clone(),
                    label: self.label_of(task),
                });
            }
        }

        let task = self.task_mut(id)?;
        task.state = TaskState::InProgress;
        task.claimant = Some(agent.to_string());
        task.claimed_at = Some(Utc::now());
        let claimed = task.clone();
        self.touch();

        info!(task = %id, agent = %agent, "claimed task");
        Ok(claimed)
    }

    /// Finish a claimed task and re-evaluate its direct dependents.
    ///
    /// If `agent` is given it must match the claimant.
    ///
    /// # Errors
    ///
    /// - `Error::NodeNotFound` if the task doesn't exist
    /// - `Error::NotInProgress` if the task is not claimed
    /// - `Error::AlreadyClaimed` if `agent` is not the claimant
    pub fn complete(
        &mut self,
        id: &NodeId,
        result: Option<serde_json::Value>,
        success: bool,
        agent: Option<&str>,
    ) -> Result<Completion> {
        let task = self.task(id)?;
        if task.state != TaskState::InProgress {
            return Err(Error::NotInProgress {
                id: id.clone(),
                label: self.label_of(task),
            });
        }
        if let Some(agent) = agent
            && task.claimant.as_deref() != Some(agent.trim())
        {
            return Err(Error::AlreadyClaimed {
                id: id.clone(),
                claimant: task.claimant.clone().unwrap_or_default(),
            });
        }

        let task = self.task_mut(id)?;
        task.state = if success {
            TaskState::Completed
        } else {
            TaskState::Failed
        };
        task.completed_at = Some(Utc::now());
        task.result = result;
        let finished = task.clone();

        let mut newly_ready = Vec::new();
        let mut still_blocked = Vec::new();
        for dependent in self.graph.reverse(id)? {
            match self.refresh(&dependent) {
                (before, TaskState::Ready) if before != TaskState::Ready => {
                    newly_ready.push(dependent);
                }
                (_, TaskState::Pending) => still_blocked.push(dependent),
                _ => {}
            }
        }
        self.sort_by_priority(&mut newly_ready);
        self.sort_by_priority(&mut still_blocked);
        self.touch();

        info!(
            task = %id,
            success,
            newly_ready = newly_ready.len(),
            still_blocked = still_blocked.len(),
            "completed task"
        );
        Ok(Completion {
            task: finished,
            newly_ready,
            still_blocked,
        })
    }

    /// Give up a claim, returning the task to `ready`.
    ///
    /// # Errors
    ///
    /// - `Error::NodeNotFound` if the task doesn't exist
    /// - `Error::NotInProgress` if the task is not claimed
    /// - `Error::AlreadyClaimed` if `agent` is not the claimant
    pub fn release(&mut self, id: &NodeId, agent: &str) -> Result<Task> {
        let task = self.task(id)?;
        if task.state != TaskState::InProgress {
            return Err(Error::NotInProgress {
                id: id.clone(),
                label: self.label_of(task),
            });
        }
        if task.claimant.as_deref() != Some(agent.trim()) {
            return Err(Error::AlreadyClaimed {
                id: id.clone(),
                claimant: task.claimant.clone().unwrap_or_default(),
            });
        }

        let task = self.task_mut(id)?;
        task.state = TaskState::Pending;
        task.claimant = None;
        task.claimed_at = None;
        self.refresh(id);
        self.touch();

        info!(task = %id, agent = %agent.trim(), "released task");
        self.task(id).cloned()
    }

    /// Make `id` depend on `dependency`.
    ///
    /// A ready task with a new unmet dependency drops back to pending.
    ///
    /// # Errors
    ///
    /// - `Error::NodeNotFound` if either task doesn't exist
    /// - `Error::DuplicateEdge` if the dependency already exists
    /// - `Error::CycleWouldForm` if `id` is reachable from `dependency`
    pub fn add_dependency(&mut self, id: &NodeId, dependency: &NodeId) -> Result<Task> {
        self.task(id)?;
        self.task(dependency)?;
        if self.graph.has_edge(id, dependency) {
            return Err(Error::DuplicateEdge {
                from: id.clone(),
                to: dependency.clone(),
            });
        }

        // Check and commit happen in one call under the caller's lock
        self.graph
            .add_edge(id, dependency, Some(EdgeKind::DependsOn))?;

        let task = self.task_mut(id)?;
        task.dependencies.push(dependency.clone());
        task.dependencies.sort();
        self.refresh(id);
        self.touch();

        info!(task = %id, dependency = %dependency, "added dependency");
        self.task(id).cloned()
    }

    /// Drop the dependency `id -> dependency`.
    ///
    /// # Errors
    ///
    /// - `Error::NodeNotFound` if either task doesn't exist
    /// - `Error::DependencyNotFound` if there is no such dependency
    pub fn remove_dependency(&mut self, id: &NodeId, dependency: &NodeId) -> Result<Task> {
        self.task(id)?;
        self.task(dependency)?;
        self.graph.remove_edge(id, dependency)?;

        let task = self.task_mut(id)?;
        task.dependencies.retain(|dep| dep != dependency);
        self.refresh(id);
        self.touch();

        info!(task = %id, dependency = %dependency, "removed dependency");
        self.task(id).cloned()
    }

    /// Delete a task nothing depends on.
    ///
    /// # Errors
    ///
    /// - `Error::NodeNotFound` if the task doesn't exist
    /// - `Error::HasDependents` if other tasks depend on it
    pub fn delete(&mut self, id: &NodeId) -> Result<Task> {
        self.task(id)?;
        let dependents = self.graph.reverse(id)?;
        if !dependents.is_empty() {
            return Err(Error::HasDependents {
                id: id.clone(),
                dependents,
            });
        }

        self.graph.remove_node(id)?;
        let removed = self
            .tasks
            .remove(id)
            .ok_or_else(|| Error::NodeNotFound(id.clone()))?;
        self.touch();

        info!(task = %id, "deleted task");
        Ok(removed)
    }

    // ========== Queries ==========

    /// Look up a task.
    #[must_use]
    pub fn get(&self, id: &NodeId) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// A task with its reported label and unmet dependencies.
    ///
    /// # Errors
    ///
    /// Returns `Error::NodeNotFound` if the task doesn't exist.
    pub fn view(&self, id: &NodeId) -> Result<TaskView> {
        Ok(self.view_of(self.task(id)?))
    }

    /// Reported label of a task.
    ///
    /// # Errors
    ///
    /// Returns `Error::NodeNotFound` if the task doesn't exist.
    pub fn label(&self, id: &NodeId) -> Result<TaskLabel> {
        Ok(self.label_of(self.task(id)?))
    }

    fn label_of(&self, task: &Task) -> TaskLabel {
        if task.state == TaskState::Pending && !self.failed_ancestors(&task.id).is_empty() {
            TaskLabel::Blocked
        } else {
            TaskLabel::from(task.state)
        }
    }

    fn view_of(&self, task: &Task) -> TaskView {
        let waiting_on = task
            .dependencies
            .iter()
            .filter(|dep| {
                self.tasks
                    .get(*dep)
                    .is_none_or(|d| d.state != TaskState::Completed)
            })
            .cloned()
            .collect();
        TaskView {
            task: task.clone(),
            label: self.label_of(task),
            waiting_on,
        }
    }

    /// Failed tasks among the transitive dependencies of `id`, sorted by id.
    ///
    /// Walks the whole dependency closure; `max_depth` does not apply, so a
    /// failure any number of levels up still blocks the task.
    fn failed_ancestors(&self, id: &NodeId) -> Vec<NodeId> {
        let mut seen: HashSet<&NodeId> = HashSet::new();
        let mut stack: Vec<&NodeId> = vec![id];
        let mut failed = Vec::new();

        while let Some(current) = stack.pop() {
            let Some(task) = self.tasks.get(current) else {
                continue;
            };
            for dep in &task.dependencies {
                if !seen.insert(dep) {
                    continue;
                }
                if self
                    .tasks
                    .get(dep)
                    .is_some_and(|t| t.state == TaskState::Failed)
                {
                    failed.push(dep.clone());
                }
                stack.push(dep);
            }
        }

        failed.sort();
        failed
    }

    /// Tasks matching the filter, highest priority first.
    #[must_use]
    pub fn list(&self, filter: &TaskFilter) -> Vec<TaskView> {
        let mut views: Vec<TaskView> = self
            .tasks
            .values()
            .filter(|task| {
                filter
                    .claimant
                    .as_ref()
                    .is_none_or(|claimant| task.claimant.as_ref() == Some(claimant))
            })
            .map(|task| self.view_of(task))
            .filter(|view| filter.label.is_none_or(|label| view.label == label))
            .collect();

        views.sort_by(|a, b| {
            b.task
                .priority
                .cmp(&a.task.priority)
                .then_with(|| a.task.id.cmp(&b.task.id))
        });
        if let Some(limit) = filter.limit {
            views.truncate(limit);
        }
        views
    }

    /// Claimable tasks: highest priority first, then oldest, then id.
    #[must_use]
    pub fn ready(&self, limit: Option<usize>) -> Vec<Task> {
        let mut ready: Vec<Task> = self
            .tasks
            .values()
            .filter(|task| task.state == TaskState::Ready)
            .cloned()
            .collect();
        ready.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        if let Some(limit) = limit {
            ready.truncate(limit);
        }
        ready
    }

    /// Pending tasks behind a failed dependency, sorted by id.
    #[must_use]
    pub fn blocked(&self) -> Vec<BlockedTask> {
        let mut blocked: Vec<BlockedTask> = self
            .tasks
            .values()
            .filter(|task| task.state == TaskState::Pending)
            .filter_map(|task| {
                let failed = self.failed_ancestors(&task.id);
                (!failed.is_empty()).then(|| BlockedTask {
                    view: self.view_of(task),
                    failed_dependencies: failed,
                })
            })
            .collect();
        blocked.sort_by(|a, b| a.view.task.id.cmp(&b.view.task.id));
        blocked
    }

    /// Counts per label.
    #[must_use]
    pub fn stats(&self) -> BoardStats {
        let mut stats = BoardStats {
            total: self.tasks.len(),
            dependencies: self.graph.edge_count(),
            ..BoardStats::default()
        };
        for task in self.tasks.values() {
            match self.label_of(task) {
                TaskLabel::Pending => stats.pending += 1,
                TaskLabel::Ready => stats.ready += 1,
                TaskLabel::InProgress => stats.in_progress += 1,
                TaskLabel::Completed => stats.completed += 1,
                TaskLabel::Failed => stats.failed += 1,
                TaskLabel::Blocked => stats.blocked += 1,
            }
        }
        stats
    }

    /// Direct dependents of a task, sorted by id.
    ///
    /// # Errors
    ///
    /// Returns `Error::NodeNotFound` if the task doesn't exist.
    pub fn dependents(&self, id: &NodeId) -> Result<Vec<NodeId>> {
        self.graph.reverse(id)
    }

    /// Every task that transitively waits on `id`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NodeNotFound` if the task doesn't exist.
    pub fn blast_radius(&self, id: &NodeId) -> Result<BlastRadius> {
        reach::blast_radius(&self.graph, id, self.max_depth)
    }

    /// Transitive dependencies of a task with their depth.
    ///
    /// # Errors
    ///
    /// Returns `Error::NodeNotFound` if the task doesn't exist.
    pub fn dependency_tree(&self, id: &NodeId) -> Result<Vec<(NodeId, usize)>> {
        reach::dependency_tree(&self.graph, id, self.max_depth)
    }

    fn sort_by_priority(&self, ids: &mut [NodeId]) {
        ids.sort_by_key(|id| {
            (
                Reverse(self.tasks.get(id).map_or(i64::MIN, |t| t.priority)),
                id.clone(),
            )
        });
    }
}
