//! Task records, attentions and the transient Thought projection

use ghost_core::{Result, TaskLevel, TaskStatus, Tasked, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// A matchable pattern. `kind` selects the intention driver that understands `pattern`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Intention {
    pub kind: String,
    #[serde(default)]
    pub pattern: Value,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl Intention {
    pub fn new(kind: impl Into<String>, pattern: Value) -> Self {
        Self {
            kind: kind.into(),
            pattern,
            description: String::new(),
        }
    }

    /// `/name args…` on a text message.
    pub fn command(name: impl Into<String>) -> Self {
        Self::new(crate::focus::COMMAND_LINE, Value::String(name.into()))
    }

    /// Regular expression over text content; named groups become params.
    pub fn regex(pattern: impl Into<String>) -> Self {
        Self::new(crate::focus::REGEX, Value::String(pattern.into()))
    }

    /// Any text message.
    pub fn any_text() -> Self {
        Self::new(crate::focus::ANY_TEXT, Value::Null)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Listener installed by a waiting task so later inputs can route back into it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Attention {
    pub to: Url,
    pub intentions: Vec<Intention>,
    pub reaction: String,
    #[serde(default)]
    pub level: TaskLevel,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub tid: String,
    pub url: Url,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub level: TaskLevel,
    /// Negative priority marks a task as forgettable for GC.
    #[serde(default)]
    pub priority: i32,
    /// Seconds the task outlives its process; 0 means it rides in the process blob only.
    #[serde(default)]
    pub overdue: i64,
    #[serde(default)]
    pub forwards: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depending: Option<String>,
    /// Tasks waiting on this one.
    #[serde(default)]
    pub callbacks: BTreeSet<String>,
    #[serde(default)]
    pub attentions: Vec<Attention>,
    #[serde(default)]
    pub vars: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl Task {
    pub fn new(tid: impl Into<String>, url: Url) -> Self {
        Self {
            tid: tid.into(),
            url,
            status: TaskStatus::New,
            level: TaskLevel::default(),
            priority: 0,
            overdue: 0,
            forwards: Vec::new(),
            depending: None,
            callbacks: BTreeSet::new(),
            attentions: Vec::new(),
            vars: Value::Null,
            result: None,
        }
    }

    pub fn stage(&self) -> &str {
        &self.url.stage
    }

    pub fn is_final(&self) -> bool {
        self.status.is_final()
    }

    /// Running tasks with negative priority may be evicted by GC.
    pub fn is_forgettable(&self) -> bool {
        self.status == TaskStatus::Running && self.priority < 0
    }

    /// Reset a finished or dead task so it can run again at `stage`.
    pub fn restart(&mut self, stage: &str) {
        self.url.stage = stage.to_string();
        self.status = TaskStatus::Running;
        self.forwards.clear();
        self.depending = None;
        self.attentions.clear();
        self.result = None;
    }

    /// Snapshot of this task as a control-plane message.
    pub fn to_tasked(&self) -> Tasked {
        Tasked {
            think: self.url.think.clone(),
            stage: self.url.stage.clone(),
            status: self.status,
            args: self.url.args.clone(),
            vars: self.vars.clone(),
            overdue: self.overdue,
            tid: Some(self.tid.clone()),
            result: self.result.clone(),
        }
    }

    /// Merge a tasked snapshot into this task.
    pub fn merge_tasked(&mut self, tasked: &Tasked) {
        self.url = tasked.url();
        self.status = tasked.status;
        self.overdue = tasked.overdue;
        if !tasked.vars.is_null() {
            self.vars = tasked.vars.clone();
        }
        if tasked.result.is_some() {
            self.result = tasked.result.clone();
        }
    }

    pub fn to_thought(&self) -> Thought {
        Thought {
            tid: self.tid.clone(),
            url: self.url.clone(),
            level: self.level,
            status: self.status,
            priority: self.priority,
            overdue: self.overdue,
            vars: self.vars.clone(),
        }
    }

    /// Write back what stage code is allowed to change. Status stays operator-owned.
    pub fn merge_thought(&mut self, thought: Thought) {
        self.level = thought.level;
        self.priority = thought.priority;
        self.overdue = thought.overdue;
        self.vars = thought.vars;
    }
}

/// Transient projection of a task handed to stage code while an event fires.
#[derive(Clone, Debug, PartialEq)]
pub struct Thought {
    pub tid: String,
    pub url: Url,
    pub level: TaskLevel,
    pub status: TaskStatus,
    pub priority: i32,
    pub overdue: i64,
    vars: Value,
}

impl Thought {
    /// Decode vars; an unset value yields `T::default()`.
    pub fn vars<T: DeserializeOwned + Default>(&self) -> Result<T> {
        if self.vars.is_null() {
            return Ok(T::default());
        }
        Ok(serde_json::from_value(self.vars.clone())?)
    }

    pub fn set_vars<T: Serialize>(&mut self, vars: &T) -> Result<()> {
        self.vars = serde_json::to_value(vars)?;
        Ok(())
    }

    pub fn raw_vars(&self) -> &Value {
        &self.vars
    }
}
