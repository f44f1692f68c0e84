//! Ghost — the respond pipeline and its builder

use crate::context::{Context, Services};
use crate::focus::Focus;
use crate::kernel::OperatorKernel;
use crate::messenger::MessageQueue;
use crate::middleware::{ExceptionHandlerMiddleware, Middleware, Next, StatelessMiddleware};
use crate::mindset::Mindset;
use crate::storage::{MemoryStorage, Storage};
use chrono::Utc;
use ghost_core::{Error, ErrorInfo, GhostConfig, Input, MessageBody, Output, Result};
use std::sync::Arc;
use tracing::{error, info, info_span};

pub struct Ghost {
    services: Services,
    kernel: OperatorKernel,
    middleware: Vec<Arc<dyn Middleware>>,
    queue: Arc<MessageQueue>,
}

impl Ghost {
    pub fn builder(config: GhostConfig) -> GhostBuilder {
        GhostBuilder::new(config)
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

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.services.storage
    }

    /// Queue receiving the async inputs produced by committed turns.
    pub fn queue(&self) -> &Arc<MessageQueue> {
        &self.queue
    }

    /// Run one turn. Always returns at least one output on failure: a single error output.
    pub fn respond(&self, input: Input) -> Vec<Output> {
        let span = info_span!(
            "respond",
            mid = %input.mid,
            clone_id = %input.trace.clone_id,
            session_id = %input.trace.session_id
        );
        let _enter = span.enter();

        if input.trace.clone_id.is_empty() {
            let err = Error::context("input trace has no clone_id");
            return vec![self.error_output(&input, &err, "")];
        }

        let mut ctx = match Context::new(input.clone(), &self.services) {
            Ok(ctx) => ctx,
            Err(e) => {
                info!(error = %e, "turn rejected");
                return vec![self.error_output(&input, &e, "")];
            }
        };

        let result = Next::new(&self.middleware, &self.kernel).run(&mut ctx);
        let failed = result.is_err();
        let trace = ctx.operator_trace().join("\n");
        let outputs = ctx.take_outputs();
        let committed = ctx.finish(failed);

        if let Err(e) = result {
            error!(errcode = e.errcode(), error = %e, "turn failed");
            return vec![self.error_output(&input, &e, &trace)];
        }
        match committed {
            Ok(async_inputs) => {
                for async_input in async_inputs {
                    if let Err(e) = self.queue.push_input(async_input) {
                        error!(error = %e, "dropping async input");
                    }
                }
                outputs
            }
            Err(e) => {
                error!(error = %e, "failed to commit turn");
                vec![self.error_output(&input, &e, &trace)]
            }
        }
    }

    fn error_output(&self, input: &Input, err: &Error, trace: &str) -> Output {
        let errmsg = match err {
            Error::Busy { .. } => self.services.config.on_busy.clone(),
            _ => err.to_string(),
        };
        let stack_info: String = trace
            .chars()
            .take(self.services.config.stack_info_limit)
            .collect();
        Output::reply(
            input,
            None,
            MessageBody::error(ErrorInfo {
                errcode: err.errcode(),
                errmsg,
                at: Utc::now().to_rfc3339(),
                stack_info,
            }),
        )
    }
}

pub struct GhostBuilder {
    config: GhostConfig,
    mindset: Mindset,
    focus: Focus,
    storage: Option<Arc<dyn Storage>>,
    queue: Option<Arc<MessageQueue>>,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl GhostBuilder {
    pub fn new(config: GhostConfig) -> Self {
        Self {
            config,
            mindset: Mindset::new(),
            focus: Focus::new(),
            storage: None,
            queue: None,
            middleware: Vec::new(),
        }
    }

    pub fn mindset(mut self, mindset: Mindset) -> Self {
        self.mindset = mindset;
        self
    }

    pub fn focus(mut self, focus: Focus) -> Self {
        self.focus = focus;
        self
    }

    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn queue(mut self, queue: Arc<MessageQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Extra middleware, run after the built-in exception and stateless handlers.
    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn build(self) -> Result<Ghost> {
        if self.config.max_operators == 0 {
            return Err(Error::Bootstrap("max_operators must be positive".into()));
        }
        let root = &self.config.root_url.think;
        if let Err(e) = self.mindset.fetch(root) {
            return Err(Error::Bootstrap(format!("root think '{}': {}", root, e)));
        }

        let mut middleware: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(ExceptionHandlerMiddleware),
            Arc::new(StatelessMiddleware),
        ];
        middleware.extend(self.middleware);
        info!(
            root = %self.config.root_url,
            thinks = self.mindset.names().len(),
            middleware = middleware.len(),
            "ghost built"
        );

        Ok(Ghost {
            kernel: OperatorKernel::new(self.config.max_operators),
            services: Services {
                config: Arc::new(self.config),
                mindset: Arc::new(self.mindset),
                focus: Arc::new(self.focus),
                storage: self
                    .storage
                    .unwrap_or_else(|| Arc::new(MemoryStorage::new()) as Arc<dyn Storage>),
            },
            middleware,
            queue: self.queue.unwrap_or_else(|| Arc::new(MessageQueue::new())),
        })
    }
}
