//! scripted — thinks described by configuration instead of code
//!
//! A scripted think is a `ThinkMeta` of kind `scripted` whose config lists
//! stages. Each stage can reply on activation, on unhandled text and on
//! callbacks, declares reactions, and names the step taken afterwards:
//!
//! ```toml
//! [[thinks]]
//! id = "weather"
//! kind = "scripted"
//!
//! [[thinks.config.stages]]
//! name = ""
//! on_activating = ["Which city?"]
//!
//! [[thinks.config.stages.reactions]]
//! name = "city"
//! intentions = [{ kind = "regex", pattern = "^(?P<city>\\w+)$" }]
//! replies = ["It is sunny in {city}."]
//! then = { op = "finish" }
//! ```
//!
//! Reaction params are merged into the task vars; replies substitute
//! `{name}` from the vars and `{text}` from the input.

use ghost_core::{Error, Result, TaskLevel, Url};
use ghost_kernel::operators::{DependOn, Finish, Forward, Withdraw};
use ghost_kernel::{
    BasicThink, Context, Event, Intention, Op, Operator, Reaction, Stage, Think, ThinkDriver,
    ThinkMeta, Thought,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

pub const KIND: &str = "scripted";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    pub description: String,
    pub level: TaskLevel,
    pub singleton: bool,
    pub overdue: i64,
    pub stages: Vec<StageScript>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StageScript {
    pub name: String,
    pub on_activating: Vec<String>,
    pub on_received: Vec<String>,
    pub on_callback: Vec<String>,
    pub reactions: Vec<ReactionScript>,
    /// Step after activation; waiting when absent.
    pub then: Option<Step>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReactionScript {
    pub name: String,
    pub intentions: Vec<Intention>,
    #[serde(default = "private")]
    pub level: TaskLevel,
    #[serde(default)]
    pub replies: Vec<String>,
    #[serde(default)]
    pub then: Option<Step>,
}

fn private() -> TaskLevel {
    TaskLevel::Private
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Await,
    Forward { stages: Vec<String> },
    /// Finish with the task vars as result.
    Finish,
    Cancel,
    Quit,
    DependOn { think: String },
}

impl Step {
    fn into_op(self, thought: &Thought) -> Option<Op> {
        let tid = thought.tid.clone();
        match self {
            Step::Await => None,
            Step::Forward { stages } => Some(Forward::new(tid, stages).boxed()),
            Step::Finish => Some(Finish::new(tid, Some(thought.raw_vars().clone())).boxed()),
            Step::Cancel => Some(Withdraw::cancel(tid, "script canceled").boxed()),
            Step::Quit => Some(Withdraw::quit(tid, "script quit").boxed()),
            Step::DependOn { think } => Some(DependOn::new(tid, Url::new(think)).boxed()),
        }
    }
}

/// Replace `{key}` with vars entries and `{text}` with the input text.
pub fn render(template: &str, vars: &Value, text: Option<&str>) -> String {
    let mut out = template.to_string();
    if let Some(text) = text {
        out = out.replace("{text}", text);
    }
    if let Some(vars) = vars.as_object() {
        for (key, value) in vars {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out = out.replace(&format!("{{{}}}", key), &value);
        }
    }
    out
}

pub struct ScriptedStage {
    script: StageScript,
}

impl ScriptedStage {
    pub fn new(script: StageScript) -> Self {
        Self { script }
    }

    fn reply(ctx: &mut Context, lines: &[String], vars: &Value) {
        let text = ctx.text().map(str::to_string);
        for line in lines {
            ctx.send_text(render(line, vars, text.as_deref()));
        }
    }
}

impl Stage for ScriptedStage {
    fn name(&self) -> &str {
        &self.script.name
    }

    fn reactions(&self) -> Vec<Reaction> {
        self.script
            .reactions
            .iter()
            .map(|r| Reaction::new(r.name.clone(), r.intentions.clone()).with_level(r.level))
            .collect()
    }

    fn on_event(&self, ctx: &mut Context, thought: &mut Thought, event: &Event) -> Result<Option<Op>> {
        match event {
            Event::Activating | Event::Preempted => {
                Self::reply(ctx, &self.script.on_activating, thought.raw_vars());
                Ok(self.script.then.clone().and_then(|s| s.into_op(thought)))
            }
            Event::Received => {
                Self::reply(ctx, &self.script.on_received, thought.raw_vars());
                Ok(None)
            }
            Event::Callback { from, result } => {
                let mut vars: Map<String, Value> = thought.vars()?;
                vars.insert("callback".into(), result.clone());
                thought.set_vars(&vars)?;
                debug!(tid = %thought.tid, from = %from, "script callback");
                Self::reply(ctx, &self.script.on_callback, thought.raw_vars());
                Ok(None)
            }
            Event::Reaction { name, params } => {
                let Some(reaction) = self.script.reactions.iter().find(|r| &r.name == name) else {
                    return Err(Error::logic(format!(
                        "stage '{}' has no reaction '{}'",
                        self.script.name, name
                    )));
                };
                let mut vars: Map<String, Value> = thought.vars()?;
                if let Some(params) = params.as_object() {
                    vars.extend(params.clone());
                }
                thought.set_vars(&vars)?;
                Self::reply(ctx, &reaction.replies, thought.raw_vars());
                Ok(reaction.then.clone().and_then(|s| s.into_op(thought)))
            }
            Event::Canceling { .. } | Event::Failing { .. } | Event::Quiting { .. } => Ok(None),
        }
    }
}

/// Builds scripted thinks from their metas.
pub struct ScriptedDriver;

impl ScriptedDriver {
    fn validate(meta: &ThinkMeta, config: &ScriptConfig) -> Result<()> {
        let names: HashSet<&str> = config.stages.iter().map(|s| s.name.as_str()).collect();
        if !names.contains("") {
            return Err(Error::Bootstrap(format!(
                "scripted think '{}' has no default stage",
                meta.id
            )));
        }
        let steps = config.stages.iter().flat_map(|s| {
            s.then
                .iter()
                .chain(s.reactions.iter().filter_map(|r| r.then.as_ref()))
        });
        for step in steps {
            if let Step::Forward { stages } = step {
                if let Some(missing) = stages.iter().find(|s| !names.contains(s.as_str())) {
                    return Err(Error::Bootstrap(format!(
                        "scripted think '{}' forwards to unknown stage '{}'",
                        meta.id, missing
                    )));
                }
            }
        }
        Ok(())
    }
}

impl ThinkDriver for ScriptedDriver {
    fn kind(&self) -> &str {
        KIND
    }

    fn build(&self, meta: &ThinkMeta) -> Result<Arc<dyn Think>> {
        let config: ScriptConfig = serde_json::from_value(meta.config.clone())
            .map_err(|e| Error::Bootstrap(format!("scripted think '{}': {}", meta.id, e)))?;
        Self::validate(meta, &config)?;

        let mut think = BasicThink::new(meta.id.clone())
            .with_description(config.description.clone())
            .with_level(config.level)
            .with_overdue(config.overdue);
        if config.singleton {
            think = think.singleton();
        }
        for stage in config.stages {
            think = think.with_stage(ScriptedStage::new(stage));
        }
        Ok(Arc::new(think))
    }
}
