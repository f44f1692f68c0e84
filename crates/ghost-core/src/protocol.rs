//! Input/Output envelopes exchanged between shells and the ghost
//!
//! Wire format (JSON):
//!
//! Shell → Ghost:
//!   { "mid": "…", "payload": { "body": { "text": { "content": "hi" } } },
//!     "trace": { "clone_id": "c1", "session_id": "s1" } }
//!
//! Ghost → Shell:
//!   { "mid": "…", "input_mid": "…", "trace": { … },
//!     "payload": { "tid": "…", "body": { "text": { "content": "hello world!" } } },
//!     "is_async": false }
//!
//! `payload.body` is keyed by message kind. The kinds the kernel understands
//! (`text`, `tasked`, `error`, `signal`) are typed; shell-defined kinds are
//! kept verbatim in `events`.

use crate::types::{new_mid, TaskStatus};
use crate::url::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Message kinds
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Text {
    pub content: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub markdown: bool,
}

/// Snapshot of a task travelling as a message (control plane).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Tasked {
    pub think: String,
    #[serde(default)]
    pub stage: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub args: BTreeMap<String, Value>,
    #[serde(default)]
    pub vars: Value,
    #[serde(default)]
    pub overdue: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl Tasked {
    pub fn url(&self) -> Url {
        Url {
            think: self.think.clone(),
            stage: self.stage.clone(),
            args: self.args.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ErrorInfo {
    pub errcode: i32,
    pub errmsg: String,
    /// RFC 3339 timestamp of the failure.
    pub at: String,
    #[serde(default)]
    pub stack_info: String,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalCode {
    Quit,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    pub code: SignalCode,
}

/// Kind-keyed message body.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct MessageBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<Text>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasked: Option<Tasked>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<Signal>,
    /// Shell-defined kinds.
    #[serde(flatten)]
    pub events: BTreeMap<String, Value>,
}

impl MessageBody {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            text: Some(Text {
                content: content.into(),
                markdown: false,
            }),
            ..Default::default()
        }
    }

    pub fn markdown(content: impl Into<String>) -> Self {
        Self {
            text: Some(Text {
                content: content.into(),
                markdown: true,
            }),
            ..Default::default()
        }
    }

    pub fn tasked(tasked: Tasked) -> Self {
        Self {
            tasked: Some(tasked),
            ..Default::default()
        }
    }

    pub fn error(info: ErrorInfo) -> Self {
        Self {
            error: Some(info),
            ..Default::default()
        }
    }

    pub fn signal(code: SignalCode) -> Self {
        Self {
            signal: Some(Signal { code }),
            ..Default::default()
        }
    }

    pub fn event(kind: impl Into<String>, data: Value) -> Self {
        let mut events = BTreeMap::new();
        events.insert(kind.into(), data);
        Self {
            events,
            ..Default::default()
        }
    }

    /// Message kinds present in this body, typed kinds first.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds = Vec::new();
        if self.text.is_some() {
            kinds.push("text");
        }
        if self.tasked.is_some() {
            kinds.push("tasked");
        }
        if self.error.is_some() {
            kinds.push("error");
        }
        if self.signal.is_some() {
            kinds.push("signal");
        }
        kinds.extend(self.events.keys().map(|k| k.as_str()));
        kinds
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Payload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tid: Option<String>,
    #[serde(default)]
    pub body: MessageBody,
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Trace {
    #[serde(default)]
    pub clone_id: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub shell_id: String,
    #[serde(default)]
    pub shell_kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<String>,
    /// Process that spawned the addressed one; set only when bootstrapping a child.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub subject_id: String,
}

impl Trace {
    pub fn new(clone_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            clone_id: clone_id.into(),
            session_id: session_id.into(),
            ..Default::default()
        }
    }

    /// Process addressed by this trace; the session id doubles as the main process id.
    pub fn process_id(&self) -> &str {
        self.process_id.as_deref().unwrap_or(&self.session_id)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Input {
    pub mid: String,
    #[serde(default)]
    pub payload: Payload,
    pub trace: Trace,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell_env: Option<serde_json::Map<String, Value>>,
    #[serde(default)]
    pub stateless: bool,
    #[serde(default)]
    pub is_async: bool,
}

impl Input {
    pub fn new(trace: Trace, body: MessageBody) -> Self {
        Self {
            mid: new_mid(),
            payload: Payload { tid: None, body },
            trace,
            url: None,
            shell_env: None,
            stateless: false,
            is_async: false,
        }
    }

    pub fn text(trace: Trace, content: impl Into<String>) -> Self {
        Self::new(trace, MessageBody::text(content))
    }

    pub fn tasked(trace: Trace, tasked: Tasked) -> Self {
        Self::new(trace, MessageBody::tasked(tasked))
    }

    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    pub fn with_process_id(mut self, process_id: impl Into<String>) -> Self {
        self.trace.process_id = Some(process_id.into());
        self
    }

    pub fn stateless(mut self) -> Self {
        self.stateless = true;
        self
    }

    pub fn into_async(mut self) -> Self {
        self.is_async = true;
        self
    }

    pub fn text_content(&self) -> Option<&str> {
        self.payload.body.text.as_ref().map(|t| t.content.as_str())
    }

    pub fn tasked_payload(&self) -> Option<&Tasked> {
        self.payload.body.tasked.as_ref()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Output {
    pub mid: String,
    pub input_mid: String,
    pub trace: Trace,
    pub payload: Payload,
    #[serde(default)]
    pub is_async: bool,
}

impl Output {
    /// Output answering `input`, inheriting its trace and async flag.
    pub fn reply(input: &Input, tid: Option<String>, body: MessageBody) -> Self {
        Self {
            mid: new_mid(),
            input_mid: input.mid.clone(),
            trace: input.trace.clone(),
            payload: Payload { tid, body },
            is_async: input.is_async,
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.payload.body.text.as_ref().map(|t| t.content.as_str())
    }

    pub fn error(&self) -> Option<&ErrorInfo> {
        self.payload.body.error.as_ref()
    }

    pub fn is_quit(&self) -> bool {
        matches!(
            self.payload.body.signal,
            Some(Signal {
                code: SignalCode::Quit
            })
        )
    }
}
