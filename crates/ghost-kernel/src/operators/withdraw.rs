//! Cancel / Fail / Quit — tear a task down and cascade to the tasks waiting on it

use super::{fire, Op, Operator, Schedule};
use crate::context::Context;
use crate::mindset::Event;
use ghost_core::{Result, TaskStatus};
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WithdrawKind {
    Cancel,
    Fail,
    Quit,
}

#[derive(Debug)]
pub struct Withdraw {
    kind: WithdrawKind,
    tid: String,
    reason: String,
}

impl Withdraw {
    pub fn new(kind: WithdrawKind, tid: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind,
            tid: tid.into(),
            reason: reason.into(),
        }
    }

    pub fn cancel(tid: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(WithdrawKind::Cancel, tid, reason)
    }

    pub fn fail(tid: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(WithdrawKind::Fail, tid, reason)
    }

    pub fn quit(tid: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(WithdrawKind::Quit, tid, reason)
    }

    fn event(&self) -> Event {
        let reason = self.reason.clone();
        match self.kind {
            WithdrawKind::Cancel => Event::Canceling { reason },
            WithdrawKind::Fail => Event::Failing { reason },
            WithdrawKind::Quit => Event::Quiting { reason },
        }
    }

    /// Status the tasks waiting on this one move to.
    fn cascade(&self) -> TaskStatus {
        match self.kind {
            WithdrawKind::Fail => TaskStatus::Failing,
            WithdrawKind::Cancel | WithdrawKind::Quit => TaskStatus::Canceling,
        }
    }
}

impl Operator for Withdraw {
    fn name(&self) -> &'static str {
        match self.kind {
            WithdrawKind::Cancel => "Cancel",
            WithdrawKind::Fail => "Fail",
            WithdrawKind::Quit => "Quit",
        }
    }

    /// The stage may take over by returning an operator.
    fn intercept(&mut self, ctx: &mut Context) -> Result<Option<Op>> {
        let missing = !ctx.process()?.has_task(&self.tid);
        if missing {
            return Ok(None);
        }
        fire(ctx, &self.tid, self.event())
    }

    fn operate(&mut self, ctx: &mut Context) -> Result<Option<Op>> {
        let cascade = self.cascade();
        let process = ctx.process_mut()?;
        if self.kind == WithdrawKind::Quit {
            process.quit();
        }
        if process.has_task(&self.tid) {
            process.unlink_depending(&self.tid);
            let mut task = process.task(&self.tid)?.clone();
            task.status = TaskStatus::Dead;
            task.attentions.clear();
            task.forwards.clear();
            let callbacks: Vec<String> = task.callbacks.iter().cloned().collect();
            process.store_task(task);
            for caller in &callbacks {
                if let Some(t) = process.get_task_mut(caller) {
                    if !t.is_final() {
                        t.status = cascade;
                    }
                }
            }
            debug!(op = self.name(), tid = %self.tid, reason = %self.reason, callbacks = callbacks.len(), "task withdrawn");
        }
        Ok(Some(Schedule.boxed()))
    }
}
