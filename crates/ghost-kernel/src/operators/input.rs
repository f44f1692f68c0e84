//! Operators that turn an incoming message into task work

use super::{fire, Activate, Await, Chain, Finish, Forward, Op, Operator, Withdraw};
use crate::context::Context;
use crate::focus::Matched;
use crate::mindset::Event;
use crate::task::{Attention, Task};
use ghost_core::{Error, Result, TaskLevel, TaskStatus, Tasked};
use tracing::debug;

/// Entry point of every turn.
#[derive(Debug, Default)]
pub struct ReceiveInput {
    /// Second pass after a new process activated its root.
    resumed: bool,
}

impl ReceiveInput {
    pub fn new() -> Self {
        Self::default()
    }

    fn resume() -> Self {
        Self { resumed: true }
    }

    /// Candidate attentions in priority order: forward, then backward.
    fn tiers(process: &crate::process::Process) -> Result<(Vec<Attention>, Vec<Attention>)> {
        let current = process.current_task()?;
        let forward = if current.is_final() {
            Vec::new()
        } else {
            current.attentions.clone()
        };

        let mut backward = Vec::new();
        let root = process.root_task()?;
        if root.tid != current.tid && !root.is_final() {
            backward.extend(
                root.attentions
                    .iter()
                    .filter(|a| a.level > TaskLevel::Private)
                    .cloned(),
            );
        }
        let peers: Vec<&Task> = match current.level {
            TaskLevel::Private => Vec::new(),
            TaskLevel::Protected => process
                .ancestors(&current.tid)
                .into_iter()
                .filter(|t| t.status == TaskStatus::Waiting)
                .collect(),
            TaskLevel::Public => process.waiting_tasks().collect(),
        };
        for peer in peers {
            if peer.tid == current.tid || peer.tid == root.tid {
                continue;
            }
            backward.extend(
                peer.attentions
                    .iter()
                    .filter(|a| a.level > TaskLevel::Private)
                    .cloned(),
            );
        }
        Ok((forward, backward))
    }
}

impl Operator for ReceiveInput {
    fn name(&self) -> &'static str {
        "ReceiveInput"
    }

    fn operate(&mut self, ctx: &mut Context) -> Result<Option<Op>> {
        if let Some(tasked) = ctx.input().tasked_payload().cloned() {
            ctx.process_mut()?.add_round();
            return Ok(Some(TaskedMessage::new(tasked).boxed()));
        }

        let process = ctx.process_mut()?;
        if process.is_quiting() {
            return Ok(None);
        }
        if process.is_new() {
            process.add_round();
            let root = process.root.clone();
            return Ok(Some(
                Chain::new([Activate::new(root).boxed(), ReceiveInput::resume().boxed()]).boxed(),
            ));
        }
        if !self.resumed {
            process.add_round();
        }

        let current = process.current_task()?;
        let (current_tid, current_level) = (current.tid.clone(), current.level);
        let (forward, backward) = Self::tiers(process)?;

        let focus = ctx.focus();
        let input = ctx.input();
        let matched = focus
            .match_attentions(input, &forward.iter().collect::<Vec<_>>())
            .or_else(|| focus.match_attentions(input, &backward.iter().collect::<Vec<_>>()))
            .or_else(|| {
                (current_level == TaskLevel::Public)
                    .then(|| focus.match_globals(input))
                    .flatten()
            });

        match matched {
            Some(matched) => {
                debug!(kind = %matched.intention.kind, reaction = ?matched.reaction, "input matched");
                Ok(Some(Intending::new(matched).boxed()))
            }
            None => Ok(Some(UnhandledInput::new(current_tid).boxed())),
        }
    }
}

/// No attention claimed the input; the current task receives it.
#[derive(Debug)]
pub struct UnhandledInput {
    tid: String,
}

impl UnhandledInput {
    pub fn new(tid: impl Into<String>) -> Self {
        Self { tid: tid.into() }
    }
}

impl Operator for UnhandledInput {
    fn name(&self) -> &'static str {
        "UnhandledInput"
    }

    fn operate(&mut self, ctx: &mut Context) -> Result<Option<Op>> {
        fire(ctx, &self.tid, Event::Received)
    }

    fn fallback(&mut self, _ctx: &mut Context) -> Result<Option<Op>> {
        Ok(Some(Await::new(self.tid.clone()).boxed()))
    }
}

/// An attention or global intention matched the input.
#[derive(Debug)]
pub struct Intending {
    matched: Matched,
    /// Task the reaction was delivered to, for the default continuation.
    reacted: Option<String>,
}

impl Intending {
    pub fn new(matched: Matched) -> Self {
        Self {
            matched,
            reacted: None,
        }
    }
}

impl Operator for Intending {
    fn name(&self) -> &'static str {
        "Intending"
    }

    fn intercept(&mut self, ctx: &mut Context) -> Result<Option<Op>> {
        match self.matched.action.clone() {
            Some(action) => action.act(ctx, &self.matched.params),
            None => Ok(None),
        }
    }

    fn operate(&mut self, ctx: &mut Context) -> Result<Option<Op>> {
        let Some(target) = self.matched.target.clone() else {
            return Ok(None);
        };
        // attentions address tasks by url; a task bootstrapped from a snapshot may carry a foreign tid
        let known = ctx
            .process()?
            .tasks()
            .iter()
            .find(|t| t.url == target)
            .map(|t| t.tid.clone());
        let tid = match known {
            Some(tid) => tid,
            None => ctx.task_id(&target)?,
        };
        let reaction = self.matched.reaction.clone();
        let process = ctx.process_mut()?;

        if !process.has_task(&tid) {
            let mut task = ctx.new_task(&target)?;
            if !target.has_stage() {
                ctx.process_mut()?.store_task(task);
                return Ok(Some(Activate::new(tid).boxed()));
            }
            task.status = TaskStatus::Running;
            ctx.process_mut()?.store_task(task);
        } else {
            process.task_mut(&tid)?.status = TaskStatus::Running;
        }
        ctx.process_mut()?.set_current(&tid)?;
        self.reacted = Some(tid.clone());

        let Some(name) = reaction else {
            return Ok(Some(Activate::new(tid).boxed()));
        };
        fire(
            ctx,
            &tid,
            Event::Reaction {
                name,
                params: self.matched.params.clone(),
            },
        )
    }

    fn fallback(&mut self, ctx: &mut Context) -> Result<Option<Op>> {
        let tid = match self.reacted.clone() {
            Some(tid) => tid,
            None => ctx.process()?.current.clone(),
        };
        Ok(Some(Await::new(tid).boxed()))
    }
}

/// A task snapshot arrived as input.
#[derive(Debug)]
pub struct TaskedMessage {
    tasked: Tasked,
}

impl TaskedMessage {
    pub fn new(tasked: Tasked) -> Self {
        Self { tasked }
    }
}

impl Operator for TaskedMessage {
    fn name(&self) -> &'static str {
        "TaskedMessage"
    }

    fn operate(&mut self, ctx: &mut Context) -> Result<Option<Op>> {
        let url = self.tasked.url();
        if url.think.is_empty() {
            return Err(Error::context("tasked message without think"));
        }
        let tid = match &self.tasked.tid {
            Some(tid) => tid.clone(),
            None => ctx.task_id(&url)?,
        };
        let existing = ctx.process()?.get_task(&tid).cloned();
        let mut task = match existing {
            Some(task) => task,
            None => {
                let mut task = ctx.new_task(&url)?;
                task.tid = tid.clone();
                task
            }
        };
        task.merge_tasked(&self.tasked);
        let status = task.status;
        ctx.process_mut()?.store_task(task);
        debug!(tid = %tid, status = %status, "tasked merged");

        let next = match status {
            TaskStatus::Dead => Withdraw::cancel(tid, "canceled by tasked message").boxed(),
            TaskStatus::Waiting => Await::new(tid).boxed(),
            TaskStatus::Finished => Finish::new(tid, self.tasked.result.clone()).boxed(),
            _ => Forward::new(tid, vec![self.tasked.stage.clone()]).boxed(),
        };
        Ok(Some(next))
    }
}
