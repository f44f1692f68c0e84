//! Runtime — per-turn cache of processes over the backing storage
//!
//! Reads go through the cache; writes stay in the cache until `finish`
//! commits them (or discards them when the turn failed). The process lock
//! is a lease in storage so a crashed turn eventually releases it.

use crate::process::Process;
use crate::storage::{process_key, process_lock_key, task_key, Storage};
use crate::task::Task;
use ghost_core::{Error, GhostConfig, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct Runtime {
    sid: String,
    storage: Arc<dyn Storage>,
    config: Arc<GhostConfig>,
    processes: HashMap<String, Process>,
    /// pid -> whether this turn holds the lock
    locks: HashMap<String, bool>,
    rewound: HashSet<String>,
}

impl Runtime {
    pub fn new(sid: impl Into<String>, storage: Arc<dyn Storage>, config: Arc<GhostConfig>) -> Self {
        Self {
            sid: sid.into(),
            storage,
            config,
            processes: HashMap::new(),
            locks: HashMap::new(),
            rewound: HashSet::new(),
        }
    }

    pub fn sid(&self) -> &str {
        &self.sid
    }

    /// Acquire the process lease. Repeated calls within a turn reuse the first answer.
    pub fn lock_process(&mut self, pid: &str) -> Result<()> {
        let held = match self.locks.get(pid) {
            Some(held) => *held,
            None => {
                let key = process_lock_key(&self.sid, pid);
                let held = self.storage.lock(&key, self.config.lock_ttl())?;
                self.locks.insert(pid.to_string(), held);
                held
            }
        };
        if held {
            Ok(())
        } else {
            Err(Error::busy(pid))
        }
    }

    /// Cached process, loading it from storage on first access.
    pub fn get_process(&mut self, pid: &str) -> Result<Option<&mut Process>> {
        if !self.processes.contains_key(pid) {
            if let Some(process) = self.load_process(pid)? {
                self.processes.insert(pid.to_string(), process);
            }
        }
        Ok(self.processes.get_mut(pid))
    }

    pub fn process_mut(&mut self, pid: &str) -> Result<&mut Process> {
        self.get_process(pid)?
            .ok_or_else(|| Error::logic(format!("process {} is not loaded", pid)))
    }

    fn load_process(&self, pid: &str) -> Result<Option<Process>> {
        let Some(bytes) = self.storage.get(&process_key(&self.sid, pid))? else {
            return Ok(None);
        };
        let mut process = Process::decode(&bytes)?;
        // long-term tasks are saved on their own and may be fresher than the blob
        let long_term: Vec<String> = process
            .tasks()
            .iter()
            .filter(|t| t.overdue != 0)
            .map(|t| t.tid.clone())
            .collect();
        for tid in long_term {
            if let Some(task) = self.get_task(&tid)? {
                process.replace_task(task);
            }
        }
        debug!(pid, tasks = process.len(), "process loaded");
        Ok(Some(process))
    }

    pub fn store_process(&mut self, process: Process) {
        self.rewound.remove(&process.pid);
        self.processes.insert(process.pid.clone(), process);
    }

    /// Long-term task record straight from storage.
    pub fn get_task(&self, tid: &str) -> Result<Option<Task>> {
        match self.storage.get(&task_key(tid))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Forget this turn's changes to `pid`. Later reads reload the stored state
    /// and nothing is written back for it.
    pub fn rewind(&mut self, pid: &str) {
        self.processes.remove(pid);
        self.rewound.insert(pid.to_string());
    }

    pub fn is_rewound(&self, pid: &str) -> bool {
        self.rewound.contains(pid)
    }

    /// Commit (or discard, when `failed`) the cached state and release locks.
    pub fn finish(&mut self, failed: bool) -> Result<()> {
        let committed = if failed { Ok(()) } else { self.commit() };
        let unlocked = self.unlock_all();
        self.processes.clear();
        committed.and(unlocked)
    }

    fn commit(&mut self) -> Result<()> {
        let max_tasks = self.config.process_max_tasks;
        for (pid, process) in self.processes.iter_mut() {
            if self.rewound.contains(pid) {
                continue;
            }
            let key = process_key(&self.sid, pid);
            if process.is_quiting() {
                self.storage.remove(&[key.as_str()])?;
                debug!(pid = %pid, "process quit, removed");
                continue;
            }
            process.gc(max_tasks);
            let overdue = process.root_task()?.overdue;
            let ttl = if overdue > 0 {
                Duration::from_secs(overdue as u64)
            } else {
                self.config.default_process_ttl()
            };
            self.storage.set(&key, &process.encode()?, Some(ttl))?;
            for task in process.tasks().iter().filter(|t| t.overdue != 0) {
                let ttl = (task.overdue > 0).then(|| Duration::from_secs(task.overdue as u64));
                self.storage
                    .set(&task_key(&task.tid), &serde_json::to_vec(task)?, ttl)?;
            }
            debug!(pid = %pid, round = process.round, tasks = process.len(), "process saved");
        }
        Ok(())
    }

    fn unlock_all(&mut self) -> Result<()> {
        let mut result = Ok(());
        for (pid, held) in self.locks.drain() {
            if !held {
                continue;
            }
            if let Err(e) = self.storage.unlock(&process_lock_key(&self.sid, &pid)) {
                warn!(pid = %pid, error = %e, "failed to release process lock");
                result = Err(e);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use ghost_core::{TaskStatus, Url};

    fn runtime(storage: Arc<MemoryStorage>) -> Runtime {
        Runtime::new("s1", storage, Arc::new(GhostConfig::default()))
    }

    fn process() -> Process {
        Process::new("s1", "p1", Task::new("root", Url::new("root")))
    }

    #[test]
    fn busy_when_lock_is_held_elsewhere() {
        let storage = Arc::new(MemoryStorage::new());
        let mut a = runtime(storage.clone());
        let mut b = runtime(storage.clone());
        a.lock_process("p1").unwrap();
        a.lock_process("p1").unwrap();
        assert!(matches!(b.lock_process("p1"), Err(Error::Busy { .. })));
        a.finish(false).unwrap();
        let mut c = runtime(storage);
        c.lock_process("p1").unwrap();
    }

    #[test]
    fn finish_persists_and_failed_discards() {
        let storage = Arc::new(MemoryStorage::new());
        let mut rt = runtime(storage.clone());
        rt.store_process(process());
        rt.finish(true).unwrap();
        assert!(storage.is_empty());

        let mut rt = runtime(storage.clone());
        rt.store_process(process());
        rt.finish(false).unwrap();
        let mut rt = runtime(storage);
        assert_eq!(rt.process_mut("p1").unwrap().root, "root");
    }

    #[test]
    fn rewind_skips_commit() {
        let storage = Arc::new(MemoryStorage::new());
        let mut rt = runtime(storage.clone());
        rt.store_process(process());
        rt.finish(false).unwrap();
        let before = storage.get(&process_key("s1", "p1")).unwrap();

        let mut rt = runtime(storage.clone());
        rt.process_mut("p1").unwrap().add_round();
        rt.rewind("p1");
        assert_eq!(rt.process_mut("p1").unwrap().round, 0);
        rt.process_mut("p1").unwrap().add_round();
        rt.finish(false).unwrap();
        assert_eq!(storage.get(&process_key("s1", "p1")).unwrap(), before);
    }

    #[test]
    fn quitting_process_is_removed() {
        let storage = Arc::new(MemoryStorage::new());
        let mut rt = runtime(storage.clone());
        rt.store_process(process());
        rt.finish(false).unwrap();

        let mut rt = runtime(storage.clone());
        rt.process_mut("p1").unwrap().quit();
        rt.finish(false).unwrap();
        assert!(storage.get(&process_key("s1", "p1")).unwrap().is_none());
    }

    #[test]
    fn long_term_tasks_saved_separately_and_preferred_on_load() {
        let storage = Arc::new(MemoryStorage::new());
        let mut p = process();
        let mut memo = Task::new("memo", Url::new("memo"));
        memo.overdue = 3600;
        memo.status = TaskStatus::Waiting;
        p.store_task(memo);
        let mut rt = runtime(storage.clone());
        rt.store_process(p);
        rt.finish(false).unwrap();
        assert!(storage.get(&task_key("memo")).unwrap().is_some());
        assert!(storage.get(&task_key("root")).unwrap().is_none());

        // another process updated the long-term record since
        let mut fresher = runtime(storage.clone()).get_task("memo").unwrap().unwrap();
        fresher.vars = serde_json::json!({"n": 2});
        storage
            .set(&task_key("memo"), &serde_json::to_vec(&fresher).unwrap(), None)
            .unwrap();

        let mut rt = runtime(storage);
        let p = rt.process_mut("p1").unwrap();
        assert_eq!(p.get_task("memo").unwrap().vars["n"], 2);
    }
}
