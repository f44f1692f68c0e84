//! Operators — the atomic state transitions the kernel trampolines through
//!
//! An operator runs as `intercept` → `operate` → `fallback`; the first phase
//! that returns an operator wins and becomes the kernel's next step.

mod flow;
mod input;
mod withdraw;

pub use flow::{Activate, Await, DependOn, Finish, Forward, Rewind, Schedule, YieldTo};
pub use input::{Intending, ReceiveInput, TaskedMessage, UnhandledInput};
pub use withdraw::{Withdraw, WithdrawKind};

use crate::context::Context;
use crate::mindset::Event;
use ghost_core::{Error, Result};
use std::collections::VecDeque;
use std::fmt;
use tracing::debug;

pub type Op = Box<dyn Operator>;

pub trait Operator: Send + fmt::Debug {
    fn name(&self) -> &'static str;

    fn intercept(&mut self, _ctx: &mut Context) -> Result<Option<Op>> {
        Ok(None)
    }

    fn operate(&mut self, ctx: &mut Context) -> Result<Option<Op>>;

    fn fallback(&mut self, _ctx: &mut Context) -> Result<Option<Op>> {
        Ok(None)
    }

    fn run(mut self: Box<Self>, ctx: &mut Context) -> Result<Option<Op>> {
        if let Some(next) = self.intercept(ctx)? {
            return Ok(Some(next));
        }
        if let Some(next) = self.operate(ctx)? {
            return Ok(Some(next));
        }
        self.fallback(ctx)
    }

    /// Chains rewrite themselves every step and are exempt from loop detection.
    fn is_chain(&self) -> bool {
        false
    }

    fn boxed(self) -> Op
    where
        Self: Sized + 'static,
    {
        Box::new(self)
    }
}

/// Ordered list of operators. Each step runs the head and splices whatever
/// it returns in front of the rest.
#[derive(Debug)]
pub struct Chain {
    ops: VecDeque<Op>,
}

impl Chain {
    pub fn new(ops: impl IntoIterator<Item = Op>) -> Self {
        Self {
            ops: ops.into_iter().collect(),
        }
    }
}

impl Operator for Chain {
    fn name(&self) -> &'static str {
        "Chain"
    }

    fn operate(&mut self, _ctx: &mut Context) -> Result<Option<Op>> {
        Ok(None)
    }

    fn run(mut self: Box<Self>, ctx: &mut Context) -> Result<Option<Op>> {
        let Some(head) = self.ops.pop_front() else {
            return Ok(None);
        };
        let name = head.name();
        let description = format!("{:?}", head);
        if let Some(next) = head.run(ctx)? {
            if !next.is_chain() && format!("{:?}", next) == description {
                return Err(Error::OperatorLoop(name.to_string()));
            }
            self.ops.push_front(next);
        }
        match self.ops.len() {
            0 => Ok(None),
            1 => Ok(self.ops.pop_front()),
            _ => Ok(Some(self)),
        }
    }

    fn is_chain(&self) -> bool {
        true
    }
}

/// Deliver `event` to the stage of task `tid` and merge the thought back.
pub(crate) fn fire(ctx: &mut Context, tid: &str, event: Event) -> Result<Option<Op>> {
    let task = ctx.process()?.task(tid)?.clone();
    let stage = ctx.mindset().stage(&task.url)?;
    let mut thought = task.to_thought();
    debug!(tid, url = %task.url, event = event.name(), "fire");
    let next = stage.on_event(ctx, &mut thought, &event)?;

    let pid = ctx.pid().to_string();
    // the stage may have rewound the turn, in which case there is nothing to merge into
    if let Some(process) = ctx.runtime_mut().get_process(&pid)? {
        if let Some(mut task) = process.get_task(tid).cloned() {
            task.merge_thought(thought);
            process.store_task(task);
        }
    }
    Ok(next)
}
