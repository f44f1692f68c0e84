//! Operators that move tasks through their lifecycle

use super::{fire, Op, Operator, Withdraw};
use crate::context::Context;
use crate::mindset::Event;
use crate::task::Attention;
use ghost_core::{Result, SignalCode, TaskStatus};
use serde_json::Value;
use tracing::{debug, info};

/// Enter a task.
#[derive(Debug)]
pub struct Activate {
    tid: String,
}

impl Activate {
    pub fn new(tid: impl Into<String>) -> Self {
        Self { tid: tid.into() }
    }
}

impl Operator for Activate {
    fn name(&self) -> &'static str {
        "Activate"
    }

    fn operate(&mut self, ctx: &mut Context) -> Result<Option<Op>> {
        let tid = self.tid.clone();
        let process = ctx.process_mut()?;
        process.set_current(&tid)?;
        let task = process.task(&tid)?;
        let status = task.status;
        let depending = task.depending.clone();

        let event = match status {
            TaskStatus::New => {
                process.task_mut(&tid)?.status = TaskStatus::Running;
                Event::Activating
            }
            TaskStatus::Finished | TaskStatus::Dead => {
                let task = process.task_mut(&tid)?;
                let stage = task.url.stage.clone();
                task.restart(&stage);
                Event::Activating
            }
            TaskStatus::Preempting | TaskStatus::Depending | TaskStatus::Yielding => {
                let target = depending.and_then(|d| process.get_task(&d).map(|t| (d, t.status, t.result.clone())));
                match target {
                    Some((from, TaskStatus::Finished, result)) => {
                        process.unlink_depending(&tid);
                        process.task_mut(&tid)?.status = TaskStatus::Running;
                        Event::Callback {
                            from,
                            result: result.unwrap_or(Value::Null),
                        }
                    }
                    Some((from, TaskStatus::Dead, _)) => {
                        return Ok(Some(
                            Withdraw::cancel(tid, format!("dependency {} is dead", from)).boxed(),
                        ));
                    }
                    _ => {
                        process.unlink_depending(&tid);
                        process.task_mut(&tid)?.status = TaskStatus::Running;
                        Event::Preempted
                    }
                }
            }
            _ => {
                process.task_mut(&tid)?.status = TaskStatus::Running;
                Event::Activating
            }
        };
        fire(ctx, &tid, event)
    }

    fn fallback(&mut self, _ctx: &mut Context) -> Result<Option<Op>> {
        Ok(Some(Await::new(self.tid.clone()).boxed()))
    }
}

/// Move a task through its stage stack.
#[derive(Debug)]
pub struct Forward {
    tid: String,
    stages: Vec<String>,
}

impl Forward {
    pub fn new(tid: impl Into<String>, stages: Vec<String>) -> Self {
        Self {
            tid: tid.into(),
            stages,
        }
    }
}

impl Operator for Forward {
    fn name(&self) -> &'static str {
        "Forward"
    }

    fn operate(&mut self, ctx: &mut Context) -> Result<Option<Op>> {
        let task = ctx.process_mut()?.task_mut(&self.tid)?;
        let mut forwards = std::mem::take(&mut self.stages);
        forwards.append(&mut task.forwards);
        if forwards.is_empty() {
            return Ok(Some(Finish::new(self.tid.clone(), None).boxed()));
        }
        let next = forwards.remove(0);
        task.forwards = forwards;
        task.url.stage = next;
        Ok(Some(Activate::new(self.tid.clone()).boxed()))
    }
}

/// Park a task and install the attentions of its stage.
#[derive(Debug)]
pub struct Await {
    tid: String,
    only: Option<Vec<String>>,
    exclude: Vec<String>,
}

impl Await {
    pub fn new(tid: impl Into<String>) -> Self {
        Self {
            tid: tid.into(),
            only: None,
            exclude: Vec::new(),
        }
    }

    /// Listen only for these reactions.
    pub fn only(mut self, reactions: &[&str]) -> Self {
        self.only = Some(reactions.iter().map(|r| r.to_string()).collect());
        self
    }

    pub fn exclude(mut self, reactions: &[&str]) -> Self {
        self.exclude = reactions.iter().map(|r| r.to_string()).collect();
        self
    }

    fn wanted(&self, reaction: &str) -> bool {
        let included = self
            .only
            .as_ref()
            .map_or(true, |only| only.iter().any(|r| r == reaction));
        included && !self.exclude.iter().any(|r| r == reaction)
    }
}

impl Operator for Await {
    fn name(&self) -> &'static str {
        "Await"
    }

    fn operate(&mut self, ctx: &mut Context) -> Result<Option<Op>> {
        let url = ctx.process()?.task(&self.tid)?.url.clone();
        let stage = ctx.mindset().stage(&url)?;
        let attentions: Vec<Attention> = stage
            .reactions()
            .into_iter()
            .filter(|r| self.wanted(&r.name))
            .map(|r| Attention {
                to: url.clone(),
                intentions: r.intentions,
                reaction: r.name,
                level: r.level,
            })
            .collect();

        let process = ctx.process_mut()?;
        let mut task = process.task(&self.tid)?.clone();
        task.status = TaskStatus::Waiting;
        task.attentions = attentions;
        process.store_task(task);
        process.set_current(&self.tid)?;
        Ok(None)
    }
}

/// Abandon this turn's changes.
#[derive(Debug, Default)]
pub struct Rewind {
    repeat: bool,
}

impl Rewind {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewind and re-await the stored current task.
    pub fn repeat() -> Self {
        Self { repeat: true }
    }
}

impl Operator for Rewind {
    fn name(&self) -> &'static str {
        "Rewind"
    }

    fn operate(&mut self, ctx: &mut Context) -> Result<Option<Op>> {
        ctx.rewind();
        if !self.repeat {
            return Ok(None);
        }
        let pid = ctx.pid().to_string();
        let current = ctx
            .runtime_mut()
            .get_process(&pid)?
            .map(|p| p.current.clone());
        Ok(current.map(|tid| Await::new(tid).boxed()))
    }
}

/// Mark a task finished and wake the tasks waiting on it.
#[derive(Debug)]
pub struct Finish {
    tid: String,
    result: Option<Value>,
}

impl Finish {
    pub fn new(tid: impl Into<String>, result: Option<Value>) -> Self {
        Self {
            tid: tid.into(),
            result,
        }
    }
}

impl Operator for Finish {
    fn name(&self) -> &'static str {
        "Finish"
    }

    fn operate(&mut self, ctx: &mut Context) -> Result<Option<Op>> {
        let process = ctx.process_mut()?;
        process.unlink_depending(&self.tid);
        let mut task = process.task(&self.tid)?.clone();
        task.forwards.clear();
        task.attentions.clear();
        task.status = TaskStatus::Finished;
        if self.result.is_some() {
            task.result = self.result.take();
        }
        let callbacks: Vec<String> = task.callbacks.iter().cloned().collect();
        process.store_task(task);
        for caller in &callbacks {
            if let Some(t) = process.get_task_mut(caller) {
                if !t.is_final() {
                    t.status = TaskStatus::Preempting;
                }
            }
        }
        debug!(tid = %self.tid, callbacks = callbacks.len(), "task finished");
        Ok(Some(Schedule.boxed()))
    }
}

/// Make `tid` wait for the task addressed by `target`.
#[derive(Debug)]
pub struct DependOn {
    tid: String,
    target: ghost_core::Url,
}

impl DependOn {
    pub fn new(tid: impl Into<String>, target: ghost_core::Url) -> Self {
        Self {
            tid: tid.into(),
            target,
        }
    }
}

impl Operator for DependOn {
    fn name(&self) -> &'static str {
        "DependOn"
    }

    fn operate(&mut self, ctx: &mut Context) -> Result<Option<Op>> {
        let target = ctx.get_or_create_task(&self.target)?;
        let process = ctx.process_mut()?;
        let (status, result) = {
            let t = process.task(&target)?;
            (t.status, t.result.clone())
        };
        match status {
            TaskStatus::Finished => {
                process.task_mut(&self.tid)?.status = TaskStatus::Running;
                process.set_current(&self.tid)?;
                fire(
                    ctx,
                    &self.tid,
                    Event::Callback {
                        from: target,
                        result: result.unwrap_or(Value::Null),
                    },
                )
            }
            TaskStatus::Dead => Ok(Some(
                Withdraw::cancel(self.tid.clone(), format!("dependency {} is dead", target)).boxed(),
            )),
            TaskStatus::Yielding => {
                process.link_depending(&self.tid, &target)?;
                Ok(Some(Schedule.boxed()))
            }
            _ => {
                process.link_depending(&self.tid, &target)?;
                Ok(Some(Activate::new(target).boxed()))
            }
        }
    }

    fn fallback(&mut self, _ctx: &mut Context) -> Result<Option<Op>> {
        Ok(Some(Await::new(self.tid.clone()).boxed()))
    }
}

/// Pick what runs next once a task gave up control.
#[derive(Debug)]
pub struct Schedule;

impl Operator for Schedule {
    fn name(&self) -> &'static str {
        "Schedule"
    }

    fn operate(&mut self, ctx: &mut Context) -> Result<Option<Op>> {
        let process = ctx.process_mut()?;
        if process.is_quiting() {
            ctx.send_signal(SignalCode::Quit);
            return Ok(None);
        }
        if let Some(task) = process.fallback() {
            let tid = task.tid.clone();
            let next = match task.status {
                TaskStatus::Canceling => Withdraw::cancel(tid, "canceled by dependency").boxed(),
                TaskStatus::Failing => Withdraw::fail(tid, "failed by dependency").boxed(),
                _ => Activate::new(tid).boxed(),
            };
            return Ok(Some(next));
        }

        let root = process.root_task()?;
        if root.is_final() {
            let snapshot = root.to_tasked();
            let parent = process.parent_id.clone();
            process.quit();
            if let Some(parent) = parent {
                ctx.send_tasked(&parent, snapshot);
            }
            info!(pid = %ctx.pid(), "root task is over, quitting");
            ctx.send_signal(SignalCode::Quit);
            return Ok(None);
        }

        let waiting = process.waiting_tasks().next().map(|t| t.tid.clone());
        if let Some(tid) = waiting {
            process.set_current(&tid)?;
        }
        Ok(None)
    }
}

/// Hand a task's work to another turn.
///
/// With `callback` and a parent process, the task's snapshot goes back to the
/// parent as FINISHED and the task dies here. Otherwise the task yields to its
/// own process and resumes from an async tasked input.
#[derive(Debug)]
pub struct YieldTo {
    tid: String,
    callback: bool,
    result: Option<Value>,
}

impl YieldTo {
    pub fn new(tid: impl Into<String>) -> Self {
        Self {
            tid: tid.into(),
            callback: false,
            result: None,
        }
    }

    pub fn callback(tid: impl Into<String>, result: Option<Value>) -> Self {
        Self {
            tid: tid.into(),
            callback: true,
            result,
        }
    }
}

impl Operator for YieldTo {
    fn name(&self) -> &'static str {
        "YieldTo"
    }

    fn operate(&mut self, ctx: &mut Context) -> Result<Option<Op>> {
        let pid = ctx.pid().to_string();
        let process = ctx.process_mut()?;
        let parent = process.parent_id.clone();
        let is_root = process.root == self.tid;
        let task = process.task_mut(&self.tid)?;

        if let (true, Some(parent)) = (self.callback, parent) {
            let mut snapshot = task.to_tasked();
            snapshot.status = TaskStatus::Finished;
            if self.result.is_some() {
                snapshot.result = self.result.take();
            }
            task.status = TaskStatus::Dead;
            if is_root {
                process.quit();
            }
            ctx.send_tasked(&parent, snapshot);
        } else {
            task.status = TaskStatus::Yielding;
            let snapshot = task.to_tasked();
            ctx.send_tasked(&pid, snapshot);
        }
        debug!(tid = %self.tid, callback = self.callback, "task yielded");
        Ok(Some(Schedule.boxed()))
    }
}
