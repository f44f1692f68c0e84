//! Process — the ordered task set of one conversation, its scheduling indexes and GC

use crate::task::Task;
use ghost_core::{Error, Result, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Task tree of one session. Tasks are kept most-recently-touched first.
///
/// Invariants: `root` and `current` always name stored tasks; a DEPENDING
/// task points at an existing task which lists it in `callbacks`.
/// `round == 0` is a fresh process, `round < 0` a quitting one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Process {
    pub pid: String,
    pub sid: String,
    pub root: String,
    pub current: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub round: i64,
    tasks: Vec<Task>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Process {
    pub fn new(sid: impl Into<String>, pid: impl Into<String>, root: Task) -> Self {
        let tid = root.tid.clone();
        let mut process = Self {
            pid: pid.into(),
            sid: sid.into(),
            root: tid.clone(),
            current: tid,
            parent_id: None,
            round: 0,
            tasks: vec![root],
            index: HashMap::new(),
        };
        process.rebuild_index();
        process
    }

    /// Decode a stored process blob and restore the position index.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut process: Self = serde_json::from_slice(bytes)?;
        process.rebuild_index();
        if !process.index.contains_key(&process.root) {
            return Err(Error::logic(format!(
                "process {} lost its root task {}",
                process.pid, process.root
            )));
        }
        if !process.index.contains_key(&process.current) {
            process.current = process.root.clone();
        }
        Ok(process)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.tid.clone(), i))
            .collect();
    }

    // -- rounds -------------------------------------------------------------

    pub fn is_new(&self) -> bool {
        self.round == 0
    }

    pub fn is_quiting(&self) -> bool {
        self.round < 0
    }

    pub fn add_round(&mut self) {
        if !self.is_quiting() {
            self.round += 1;
        }
    }

    pub fn quit(&mut self) {
        if !self.is_quiting() {
            self.round = -self.round.max(1);
        }
    }

    // -- tasks --------------------------------------------------------------

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn has_task(&self, tid: &str) -> bool {
        self.index.contains_key(tid)
    }

    pub fn get_task(&self, tid: &str) -> Option<&Task> {
        self.index.get(tid).map(|&i| &self.tasks[i])
    }

    pub fn get_task_mut(&mut self, tid: &str) -> Option<&mut Task> {
        match self.index.get(tid) {
            Some(&i) => Some(&mut self.tasks[i]),
            None => None,
        }
    }

    pub fn task(&self, tid: &str) -> Result<&Task> {
        self.get_task(tid)
            .ok_or_else(|| Error::logic(format!("task {} not in process {}", tid, self.pid)))
    }

    pub fn task_mut(&mut self, tid: &str) -> Result<&mut Task> {
        let pid = self.pid.clone();
        self.get_task_mut(tid)
            .ok_or_else(|| Error::logic(format!("task {} not in process {}", tid, pid)))
    }

    pub fn root_task(&self) -> Result<&Task> {
        self.task(&self.root)
    }

    pub fn current_task(&self) -> Result<&Task> {
        self.task(&self.current)
    }

    /// Insert or replace a task, moving it to the front.
    pub fn store_task(&mut self, task: Task) {
        if let Some(i) = self.index.get(&task.tid).copied() {
            self.tasks.remove(i);
        }
        self.tasks.insert(0, task);
        self.rebuild_index();
    }

    /// Replace a stored task without moving it. Returns false if it is unknown.
    pub fn replace_task(&mut self, task: Task) -> bool {
        match self.index.get(&task.tid) {
            Some(&i) => {
                self.tasks[i] = task;
                true
            }
            None => false,
        }
    }

    /// Move an existing task to the front without changing it.
    pub fn touch(&mut self, tid: &str) {
        if let Some(i) = self.index.get(tid).copied() {
            let task = self.tasks.remove(i);
            self.tasks.insert(0, task);
            self.rebuild_index();
        }
    }

    pub fn set_current(&mut self, tid: &str) -> Result<()> {
        if !self.has_task(tid) {
            return Err(Error::logic(format!("cannot focus missing task {}", tid)));
        }
        self.current = tid.to_string();
        Ok(())
    }

    fn remove_tasks(&mut self, tids: &HashSet<String>) {
        if tids.is_empty() {
            return;
        }
        self.tasks.retain(|t| !tids.contains(&t.tid));
        for task in &mut self.tasks {
            task.callbacks.retain(|c| !tids.contains(c));
        }
        self.rebuild_index();
    }

    // -- dependency edges ---------------------------------------------------

    /// Record that `tid` waits on `target`.
    pub fn link_depending(&mut self, tid: &str, target: &str) -> Result<()> {
        if tid == target {
            return Err(Error::logic(format!("task {} cannot depend on itself", tid)));
        }
        self.unlink_depending(tid);
        self.task_mut(target)?.callbacks.insert(tid.to_string());
        let task = self.task_mut(tid)?;
        task.depending = Some(target.to_string());
        task.status = TaskStatus::Depending;
        Ok(())
    }

    /// Drop the depending edge of `tid`, if any. Returns the former target.
    pub fn unlink_depending(&mut self, tid: &str) -> Option<String> {
        let target = self.get_task_mut(tid)?.depending.take()?;
        if let Some(t) = self.get_task_mut(&target) {
            t.callbacks.remove(tid);
        }
        Some(target)
    }

    /// Tasks that (transitively) wait on `tid`, nearest first.
    pub fn ancestors(&self, tid: &str) -> Vec<&Task> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: Vec<&str> = vec![tid];
        let mut found = Vec::new();
        while let Some(next) = queue.pop() {
            let Some(task) = self.get_task(next) else { continue };
            for caller in &task.callbacks {
                if seen.insert(caller.as_str()) {
                    if let Some(t) = self.get_task(caller) {
                        found.push(t);
                        queue.push(caller.as_str());
                    }
                }
            }
        }
        found
    }

    pub fn waiting_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Waiting)
    }

    // -- scheduling ---------------------------------------------------------

    /// Most recently touched task that needs the scheduler's attention.
    pub fn fallback(&self) -> Option<&Task> {
        self.tasks.iter().find(|t| {
            matches!(
                t.status,
                TaskStatus::Preempting
                    | TaskStatus::Canceling
                    | TaskStatus::Failing
                    | TaskStatus::Running
                    | TaskStatus::New
            )
        })
    }

    // -- garbage collection -------------------------------------------------

    /// Drop finished, dead, orphaned and surplus tasks. Returns the removed tids.
    ///
    /// Root, current and tasks a live task depends on always survive.
    pub fn gc(&mut self, max_tasks: usize) -> Vec<String> {
        let mut removed = Vec::new();
        for _ in 0..2 {
            let dropped = self.gc_pass(max_tasks);
            if dropped.is_empty() {
                break;
            }
            removed.extend(dropped);
        }
        if !removed.is_empty() {
            debug!(pid = %self.pid, removed = removed.len(), remaining = self.tasks.len(), "process gc");
        }
        removed
    }

    fn gc_pass(&mut self, max_tasks: usize) -> Vec<String> {
        // target -> live dependents
        let mut depended_by: HashMap<&str, usize> = HashMap::new();
        for task in &self.tasks {
            if let Some(target) = &task.depending {
                if !task.is_final() {
                    *depended_by.entry(target.as_str()).or_default() += 1;
                }
            }
        }

        let mut protected: HashSet<String> = HashSet::new();
        let mut drop: HashSet<String> = HashSet::new();
        let mut forgettable: Vec<String> = Vec::new();
        for task in self.tasks.iter().rev() {
            let tid = task.tid.as_str();
            if tid == self.root || tid == self.current || depended_by.contains_key(tid) {
                protected.insert(task.tid.clone());
                continue;
            }
            let orphaned = task
                .depending
                .as_deref()
                .is_some_and(|target| !self.index.contains_key(target));
            if task.is_final() || orphaned {
                drop.insert(task.tid.clone());
            } else if task.is_forgettable() {
                forgettable.push(task.tid.clone());
            }
        }

        let survivors = self.tasks.len() - drop.len();
        if survivors > max_tasks {
            drop.extend(forgettable);
            // LRU over what is left: keep the most recent unprotected tasks that fit.
            let budget = max_tasks.saturating_sub(protected.len());
            let mut kept = 0usize;
            for task in &self.tasks {
                if protected.contains(&task.tid) || drop.contains(&task.tid) {
                    continue;
                }
                if kept < budget {
                    kept += 1;
                } else {
                    drop.insert(task.tid.clone());
                }
            }
        }

        let removed: Vec<String> = self
            .tasks
            .iter()
            .filter(|t| drop.contains(&t.tid))
            .map(|t| t.tid.clone())
            .collect();
        self.remove_tasks(&drop);
        removed
    }
}
