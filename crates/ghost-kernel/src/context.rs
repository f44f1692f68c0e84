//! Context — everything one turn needs: the input, the runtime, registries and outputs
//!
//! Built per `Ghost::respond` call. Creating it takes the process lock and
//! loads (or bootstraps) the addressed process; `finish` commits or discards.

use crate::focus::Focus;
use crate::mindset::{Mindset, Think};
use crate::process::Process;
use crate::runtime::Runtime;
use crate::storage::Storage;
use crate::task::Task;
use ghost_core::{
    ErrorInfo, Error, GhostConfig, Input, MessageBody, Output, Result, SignalCode, TaskStatus,
    Tasked, Trace, Url,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Shared, read-mostly services a ghost hands to every turn.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<GhostConfig>,
    pub mindset: Arc<Mindset>,
    pub focus: Arc<Focus>,
    pub storage: Arc<dyn Storage>,
}

pub struct Context {
    input: Input,
    pid: String,
    runtime: Runtime,
    services: Services,
    outputs: Vec<Output>,
    async_inputs: Vec<Input>,
    operators: Vec<String>,
}

impl Context {
    /// Lock the addressed process and load it, bootstrapping a new one if needed.
    pub fn new(input: Input, services: &Services) -> Result<Self> {
        let pid = input.trace.process_id().to_string();
        let runtime = Runtime::new(
            input.trace.session_id.clone(),
            services.storage.clone(),
            services.config.clone(),
        );
        let mut ctx = Self {
            input,
            pid,
            runtime,
            services: services.clone(),
            outputs: Vec::new(),
            async_inputs: Vec::new(),
            operators: Vec::new(),
        };
        if let Err(e) = ctx.runtime.lock_process(&ctx.pid) {
            let _ = ctx.runtime.finish(true);
            return Err(e);
        }
        if let Err(e) = ctx.ensure_process() {
            let _ = ctx.runtime.finish(true);
            return Err(e);
        }
        Ok(ctx)
    }

    fn ensure_process(&mut self) -> Result<()> {
        if self.runtime.get_process(&self.pid)?.is_some() {
            return Ok(());
        }
        let tasked = self.input.tasked_payload();
        let url = self
            .input
            .url
            .clone()
            .or_else(|| tasked.map(Tasked::url))
            .unwrap_or_else(|| self.services.config.root_url.clone());
        let think = self.think(&url.think)?;
        let mut root = think.new_task(&url, &self.pid);
        if let Some(tid) = tasked.and_then(|t| t.tid.clone()) {
            root.tid = tid;
        }
        let mut process = Process::new(self.runtime.sid(), &self.pid, root);
        process.parent_id = self.input.trace.parent_id.clone();
        info!(pid = %self.pid, root = %url, "process created");
        self.runtime.store_process(process);
        Ok(())
    }

    // -- accessors ----------------------------------------------------------

    pub fn input(&self) -> &Input {
        &self.input
    }

    /// Text content of the input, if it carries any.
    pub fn text(&self) -> Option<&str> {
        self.input.text_content()
    }

    pub fn pid(&self) -> &str {
        &self.pid
    }

    pub fn config(&self) -> &GhostConfig {
        &self.services.config
    }

    pub fn mindset(&self) -> &Mindset {
        &self.services.mindset
    }

    pub fn focus(&self) -> &Focus {
        &self.services.focus
    }

    pub fn think(&self, name: &str) -> Result<Arc<dyn Think>> {
        self.services.mindset.fetch(name)
    }

    pub fn process(&mut self) -> Result<&Process> {
        Ok(self.runtime.process_mut(&self.pid)?)
    }

    pub fn process_mut(&mut self) -> Result<&mut Process> {
        self.runtime.process_mut(&self.pid)
    }

    pub fn runtime_mut(&mut self) -> &mut Runtime {
        &mut self.runtime
    }

    // -- tasks --------------------------------------------------------------

    /// Id the task addressed by `url` has (or would have) in this process.
    pub fn task_id(&self, url: &Url) -> Result<String> {
        Ok(self.think(&url.think)?.new_task_id(url, &self.pid))
    }

    /// Fresh task for `url`, not yet stored.
    pub fn new_task(&self, url: &Url) -> Result<Task> {
        Ok(self.think(&url.think)?.new_task(url, &self.pid))
    }

    /// Task addressed by `url`, created and stored if missing. Returns its tid.
    pub fn get_or_create_task(&mut self, url: &Url) -> Result<String> {
        let tid = self.task_id(url)?;
        if !self.process()?.has_task(&tid) {
            let task = self.new_task(url)?;
            self.process_mut()?.store_task(task);
        }
        Ok(tid)
    }

    /// Drop every change this turn made to the process.
    pub fn rewind(&mut self) {
        debug!(pid = %self.pid, "rewind");
        self.runtime.rewind(&self.pid);
    }

    // -- outputs ------------------------------------------------------------

    pub fn send(&mut self, body: MessageBody) {
        let tid = self
            .runtime
            .get_process(&self.pid)
            .ok()
            .flatten()
            .map(|p| p.current.clone());
        self.outputs.push(Output::reply(&self.input, tid, body));
    }

    pub fn send_text(&mut self, content: impl Into<String>) {
        self.send(MessageBody::text(content));
    }

    pub fn send_markdown(&mut self, content: impl Into<String>) {
        self.send(MessageBody::markdown(content));
    }

    pub fn send_signal(&mut self, code: SignalCode) {
        self.send(MessageBody::signal(code));
    }

    /// User-visible error output.
    pub fn send_error(&mut self, errcode: i32, errmsg: impl Into<String>) {
        self.send(MessageBody::error(ErrorInfo {
            errcode,
            errmsg: errmsg.into(),
            at: chrono::Utc::now().to_rfc3339(),
            stack_info: String::new(),
        }));
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn take_outputs(&mut self) -> Vec<Output> {
        std::mem::take(&mut self.outputs)
    }

    // -- async inputs -------------------------------------------------------

    /// Queue an input for a later turn. Delivered only if this turn commits;
    /// a rewind discards it along with the process changes.
    pub fn async_input(&mut self, input: Input) {
        self.async_inputs.push(input.into_async());
    }

    /// Queue a task snapshot for the process `pid`.
    pub fn send_tasked(&mut self, pid: &str, tasked: Tasked) {
        let mut trace: Trace = self.input.trace.clone();
        trace.process_id = Some(pid.to_string());
        trace.parent_id = None;
        self.async_input(Input::tasked(trace, tasked));
    }

    /// Start `url` in a child process. The task is recorded here as YIELDING
    /// under the returned tid; the child reports back by yielding to its parent.
    pub fn spawn(&mut self, url: &Url, child_pid: &str) -> Result<String> {
        if child_pid == self.pid {
            return Err(Error::logic("a process cannot spawn itself"));
        }
        let mut task = self.new_task(url)?;
        task.status = TaskStatus::Yielding;
        let tid = task.tid.clone();
        let mut tasked = task.to_tasked();
        tasked.status = TaskStatus::New;
        self.process_mut()?.store_task(task);

        let mut trace = self.input.trace.clone();
        trace.process_id = Some(child_pid.to_string());
        trace.parent_id = Some(self.pid.clone());
        self.async_input(Input::tasked(trace, tasked));
        Ok(tid)
    }

    // -- operator trace -----------------------------------------------------

    pub fn record_operator(&mut self, description: String) {
        self.operators.push(description);
    }

    pub fn operator_trace(&self) -> &[String] {
        &self.operators
    }

    /// Commit (or discard) the turn. Returns the async inputs to dispatch,
    /// which are dropped when the turn failed or was rewound.
    pub fn finish(&mut self, failed: bool) -> Result<Vec<Input>> {
        let rewound = self.runtime.is_rewound(&self.pid);
        let inputs = std::mem::take(&mut self.async_inputs);
        self.runtime.finish(failed)?;
        if failed || rewound {
            if !inputs.is_empty() {
                debug!(pid = %self.pid, dropped = inputs.len(), "async inputs discarded");
            }
            return Ok(Vec::new());
        }
        Ok(inputs)
    }
}
