//! Focus — intention drivers and the matcher that routes input to attentions
//!
//! Each driver understands one intention `kind`. Candidates are grouped by
//! kind and the drivers are asked in registration order; the first match wins.
//! Global intentions are wildcards tried only when the current task is public.

use crate::context::Context;
use crate::operators::Op;
use crate::task::{Attention, Intention};
use dashmap::DashMap;
use ghost_core::{Input, Result, Url};
use regex::Regex;
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

pub const COMMAND_LINE: &str = "command_line";
pub const REGEX: &str = "regex";
pub const ANY_TEXT: &str = "any_text";

/// Understands one intention kind. Returns match params, or `None`.
pub trait IntentionDriver: Send + Sync {
    fn kind(&self) -> &str;

    fn match_intention(&self, input: &Input, intention: &Intention) -> Option<Value>;
}

/// Custom behavior attached to a global intention (commands like `/help`).
pub trait IntentionAction: Send + Sync {
    fn act(&self, ctx: &mut Context, params: &Value) -> Result<Option<Op>>;
}

impl<F> IntentionAction for F
where
    F: Fn(&mut Context, &Value) -> Result<Option<Op>> + Send + Sync,
{
    fn act(&self, ctx: &mut Context, params: &Value) -> Result<Option<Op>> {
        self(ctx, params)
    }
}

/// Intention that applies regardless of installed attentions.
#[derive(Clone)]
pub struct GlobalIntention {
    pub intention: Intention,
    pub target: Option<Url>,
    pub reaction: Option<String>,
    pub action: Option<Arc<dyn IntentionAction>>,
}

impl GlobalIntention {
    /// Route matches to `reaction` on the task addressed by `target`.
    pub fn route(intention: Intention, target: Url, reaction: impl Into<String>) -> Self {
        Self {
            intention,
            target: Some(target),
            reaction: Some(reaction.into()),
            action: None,
        }
    }

    /// Run `action` on match.
    pub fn action(intention: Intention, action: impl IntentionAction + 'static) -> Self {
        Self {
            intention,
            target: None,
            reaction: None,
            action: Some(Arc::new(action)),
        }
    }
}

impl fmt::Debug for GlobalIntention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalIntention")
            .field("intention", &self.intention)
            .field("target", &self.target)
            .field("reaction", &self.reaction)
            .field("action", &self.action.is_some())
            .finish()
    }
}

/// A successful match.
#[derive(Clone)]
pub struct Matched {
    pub intention: Intention,
    pub target: Option<Url>,
    pub reaction: Option<String>,
    pub params: Value,
    pub action: Option<Arc<dyn IntentionAction>>,
}

impl fmt::Debug for Matched {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matched")
            .field("kind", &self.intention.kind)
            .field("pattern", &self.intention.pattern)
            .field("target", &self.target.as_ref().map(|u| u.to_string()))
            .field("reaction", &self.reaction)
            .field("params", &self.params)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Built-in drivers
// ---------------------------------------------------------------------------

/// `/name arg…` where the pattern is the command name (leading slash optional).
pub struct CommandLineDriver;

impl CommandLineDriver {
    /// Split a command line into its name and arguments.
    pub fn parse(line: &str) -> Option<(&str, Vec<&str>)> {
        let rest = line.trim().strip_prefix('/')?;
        let mut parts = rest.split_whitespace();
        let name = parts.next()?;
        Some((name, parts.collect()))
    }
}

impl IntentionDriver for CommandLineDriver {
    fn kind(&self) -> &str {
        COMMAND_LINE
    }

    fn match_intention(&self, input: &Input, intention: &Intention) -> Option<Value> {
        let expected = intention.pattern.as_str()?.trim_start_matches('/');
        let (name, args) = Self::parse(input.text_content()?)?;
        if name != expected {
            return None;
        }
        Some(json!({ "command": name, "args": args }))
    }
}

/// Regular expression over text content; named groups become params.
#[derive(Default)]
pub struct RegexDriver {
    compiled: DashMap<String, Option<Regex>>,
}

impl RegexDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn compile(&self, pattern: &str) -> Option<Regex> {
        if let Some(cached) = self.compiled.get(pattern) {
            return cached.clone();
        }
        let compiled = match Regex::new(pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(pattern, error = %e, "invalid regex intention");
                None
            }
        };
        self.compiled.insert(pattern.to_string(), compiled.clone());
        compiled
    }
}

impl IntentionDriver for RegexDriver {
    fn kind(&self) -> &str {
        REGEX
    }

    fn match_intention(&self, input: &Input, intention: &Intention) -> Option<Value> {
        let re = self.compile(intention.pattern.as_str()?)?;
        let text = input.text_content()?;
        let captures = re.captures(text)?;
        let mut params = Map::new();
        for name in re.capture_names().flatten() {
            if let Some(m) = captures.name(name) {
                params.insert(name.to_string(), Value::String(m.as_str().to_string()));
            }
        }
        Some(Value::Object(params))
    }
}

/// Matches any text message.
pub struct AnyTextDriver;

impl IntentionDriver for AnyTextDriver {
    fn kind(&self) -> &str {
        ANY_TEXT
    }

    fn match_intention(&self, input: &Input, _intention: &Intention) -> Option<Value> {
        input.text_content().map(|t| json!({ "content": t }))
    }
}

// ---------------------------------------------------------------------------
// Focus
// ---------------------------------------------------------------------------

pub struct Focus {
    drivers: Vec<Arc<dyn IntentionDriver>>,
    globals: Vec<GlobalIntention>,
}

impl Default for Focus {
    fn default() -> Self {
        let mut focus = Self::empty();
        focus.register_driver(CommandLineDriver);
        focus.register_driver(RegexDriver::new());
        focus.register_driver(AnyTextDriver);
        focus
    }
}

impl Focus {
    /// Focus with the built-in drivers.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn empty() -> Self {
        Self {
            drivers: Vec::new(),
            globals: Vec::new(),
        }
    }

    /// Register a driver. A driver for an existing kind replaces it in place.
    pub fn register_driver(&mut self, driver: impl IntentionDriver + 'static) {
        let driver: Arc<dyn IntentionDriver> = Arc::new(driver);
        match self.drivers.iter().position(|d| d.kind() == driver.kind()) {
            Some(i) => self.drivers[i] = driver,
            None => self.drivers.push(driver),
        }
    }

    pub fn register_global(&mut self, global: GlobalIntention) {
        self.globals.push(global);
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.drivers.iter().map(|d| d.kind()).collect()
    }

    pub fn globals(&self) -> &[GlobalIntention] {
        &self.globals
    }

    /// Global command intentions as `(name, description)`.
    pub fn commands(&self) -> Vec<(String, String)> {
        self.globals
            .iter()
            .filter(|g| g.intention.kind == COMMAND_LINE)
            .filter_map(|g| {
                let name = g.intention.pattern.as_str()?.trim_start_matches('/');
                Some((name.to_string(), g.intention.description.clone()))
            })
            .collect()
    }

    fn driver(&self, kind: &str) -> Option<&Arc<dyn IntentionDriver>> {
        self.drivers.iter().find(|d| d.kind() == kind)
    }

    /// Match `input` against one tier of attentions.
    pub fn match_attentions(&self, input: &Input, attentions: &[&Attention]) -> Option<Matched> {
        for driver in &self.drivers {
            for attention in attentions {
                for intention in attention.intentions.iter().filter(|i| i.kind == driver.kind()) {
                    if let Some(params) = driver.match_intention(input, intention) {
                        return Some(Matched {
                            intention: intention.clone(),
                            target: Some(attention.to.clone()),
                            reaction: Some(attention.reaction.clone()),
                            params,
                            action: None,
                        });
                    }
                }
            }
        }
        None
    }

    /// Match `input` against the global intentions.
    pub fn match_globals(&self, input: &Input) -> Option<Matched> {
        for driver in &self.drivers {
            for global in self.globals.iter().filter(|g| g.intention.kind == driver.kind()) {
                if let Some(params) = driver.match_intention(input, &global.intention) {
                    return Some(Matched {
                        intention: global.intention.clone(),
                        target: global.target.clone(),
                        reaction: global.reaction.clone(),
                        params,
                        action: global.action.clone(),
                    });
                }
            }
        }
        None
    }

    /// Whether some registered driver understands `kind`.
    pub fn supports(&self, kind: &str) -> bool {
        self.driver(kind).is_some()
    }
}
