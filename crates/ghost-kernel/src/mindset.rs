//! Mindset — resolves Think names to their stage machines
//!
//! A Think is a named finite-state machine; each Stage handles events and
//! declares the reactions a waiting task listens for. Thinks are registered
//! directly, or described by a `ThinkMeta{id, kind, config}` blob that the
//! driver registered for `kind` turns into a Think on first use.

use crate::context::Context;
use crate::operators::Op;
use crate::task::{Intention, Task, Thought};
use dashmap::DashMap;
use ghost_core::{Error, Result, TaskLevel, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Events delivered to stage code. Exactly one fires per operator.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Activating,
    Preempted,
    /// Input no attention claimed, delivered to the current task.
    Received,
    /// A task this one depended on has finished.
    Callback { from: String, result: Value },
    /// A matched attention or intention named this reaction.
    Reaction { name: String, params: Value },
    Canceling { reason: String },
    Failing { reason: String },
    Quiting { reason: String },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Activating => "on_activating",
            Self::Preempted => "on_preempted",
            Self::Received => "on_received",
            Self::Callback { .. } => "on_callback",
            Self::Reaction { .. } => "on_reaction",
            Self::Canceling { .. } => "on_canceling",
            Self::Failing { .. } => "on_failing",
            Self::Quiting { .. } => "on_quiting",
        }
    }
}

/// A named handler a stage exposes to intentions.
#[derive(Clone, Debug, PartialEq)]
pub struct Reaction {
    pub name: String,
    pub intentions: Vec<Intention>,
    pub level: TaskLevel,
}

impl Reaction {
    pub fn new(name: impl Into<String>, intentions: Vec<Intention>) -> Self {
        Self {
            name: name.into(),
            intentions,
            level: TaskLevel::Private,
        }
    }

    pub fn with_level(mut self, level: TaskLevel) -> Self {
        self.level = level;
        self
    }
}

pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    fn reactions(&self) -> Vec<Reaction> {
        Vec::new()
    }

    /// Handle one event. Returning `None` lets the firing operator continue
    /// with its default (usually `Await`).
    fn on_event(&self, ctx: &mut Context, thought: &mut Thought, event: &Event) -> Result<Option<Op>>;
}

pub trait Think: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Stage by name; the empty name is the default stage.
    fn stage(&self, name: &str) -> Option<Arc<dyn Stage>>;

    fn stage_names(&self) -> Vec<String>;

    fn default_level(&self) -> TaskLevel {
        TaskLevel::Public
    }

    /// Seconds a task of this Think outlives its process (0 = process lifetime).
    fn default_overdue(&self) -> i64 {
        0
    }

    /// Task id for `url` inside process `pid`.
    fn new_task_id(&self, url: &Url, pid: &str) -> String {
        url.new_id(&[("process_id", pid)], &[], true)
    }

    fn new_task(&self, url: &Url, pid: &str) -> Task {
        let mut task = Task::new(self.new_task_id(url, pid), url.clone());
        task.level = self.default_level();
        task.overdue = self.default_overdue();
        task
    }
}

// ---------------------------------------------------------------------------
// Closure-backed building blocks
// ---------------------------------------------------------------------------

type StageHandler = dyn Fn(&mut Context, &mut Thought, &Event) -> Result<Option<Op>> + Send + Sync;

/// Stage backed by a closure.
pub struct FnStage {
    name: String,
    reactions: Vec<Reaction>,
    handler: Box<StageHandler>,
}

impl FnStage {
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut Context, &mut Thought, &Event) -> Result<Option<Op>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            reactions: Vec::new(),
            handler: Box::new(handler),
        }
    }

    pub fn with_reaction(mut self, reaction: Reaction) -> Self {
        self.reactions.push(reaction);
        self
    }
}

impl Stage for FnStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn reactions(&self) -> Vec<Reaction> {
        self.reactions.clone()
    }

    fn on_event(&self, ctx: &mut Context, thought: &mut Thought, event: &Event) -> Result<Option<Op>> {
        (self.handler)(ctx, thought, event)
    }
}

/// Think assembled from stages.
pub struct BasicThink {
    name: String,
    description: String,
    stages: HashMap<String, Arc<dyn Stage>>,
    level: TaskLevel,
    overdue: i64,
    singleton: bool,
}

impl BasicThink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            stages: HashMap::new(),
            level: TaskLevel::Public,
            overdue: 0,
            singleton: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.insert(stage.name().to_string(), Arc::new(stage));
        self
    }

    pub fn with_level(mut self, level: TaskLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_overdue(mut self, overdue: i64) -> Self {
        self.overdue = overdue;
        self
    }

    /// One task per process regardless of args.
    pub fn singleton(mut self) -> Self {
        self.singleton = true;
        self
    }
}

impl Think for BasicThink {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn stage(&self, name: &str) -> Option<Arc<dyn Stage>> {
        self.stages.get(name).cloned()
    }

    fn stage_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stages.keys().cloned().collect();
        names.sort();
        names
    }

    fn default_level(&self) -> TaskLevel {
        self.level
    }

    fn default_overdue(&self) -> i64 {
        self.overdue
    }

    fn new_task_id(&self, url: &Url, pid: &str) -> String {
        url.new_id(&[("process_id", pid)], &[], !self.singleton)
    }
}

// ---------------------------------------------------------------------------
// Drivers and the registry
// ---------------------------------------------------------------------------

/// Serialized description of a Think, rebuilt by the driver registered for `kind`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ThinkMeta {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub config: Value,
}

pub trait ThinkDriver: Send + Sync {
    fn kind(&self) -> &str;

    fn build(&self, meta: &ThinkMeta) -> Result<Arc<dyn Think>>;
}

#[derive(Default)]
pub struct Mindset {
    thinks: DashMap<String, Arc<dyn Think>>,
    metas: HashMap<String, ThinkMeta>,
    drivers: HashMap<String, Arc<dyn ThinkDriver>>,
}

impl Mindset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a Think. Replaces any existing Think with the same name.
    pub fn register(&mut self, think: impl Think + 'static) {
        self.register_arc(Arc::new(think));
    }

    pub fn register_arc(&mut self, think: Arc<dyn Think>) {
        self.metas.remove(think.name());
        self.thinks.insert(think.name().to_string(), think);
    }

    pub fn register_driver(&mut self, driver: impl ThinkDriver + 'static) {
        self.drivers
            .insert(driver.kind().to_string(), Arc::new(driver));
    }

    /// Register a meta blob; its driver must already be registered.
    pub fn register_meta(&mut self, meta: ThinkMeta) -> Result<()> {
        if !self.drivers.contains_key(&meta.kind) {
            return Err(Error::Bootstrap(format!(
                "no think driver for kind '{}' (think '{}')",
                meta.kind, meta.id
            )));
        }
        self.thinks.remove(&meta.id);
        self.metas.insert(meta.id.clone(), meta);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.thinks.contains_key(name) || self.metas.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .thinks
            .iter()
            .map(|e| e.key().clone())
            .chain(self.metas.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Resolve a Think, building it from its meta on first use.
    pub fn fetch(&self, name: &str) -> Result<Arc<dyn Think>> {
        if let Some(think) = self.thinks.get(name) {
            return Ok(think.clone());
        }
        let meta = self
            .metas
            .get(name)
            .ok_or_else(|| Error::MindsetNotFound(name.to_string()))?;
        let driver = self
            .drivers
            .get(&meta.kind)
            .ok_or_else(|| Error::MindsetNotFound(format!("{} (driver {})", name, meta.kind)))?;
        let think = driver.build(meta)?;
        debug!(think = name, kind = %meta.kind, "think built from meta");
        self.thinks.insert(name.to_string(), think.clone());
        Ok(think)
    }

    /// Stage addressed by `url`.
    pub fn stage(&self, url: &Url) -> Result<Arc<dyn Stage>> {
        let think = self.fetch(&url.think)?;
        think
            .stage(&url.stage)
            .ok_or_else(|| Error::MindsetNotFound(url.to_string()))
    }
}
