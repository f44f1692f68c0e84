//! Middleware wrapped around the kernel run of every turn

use crate::context::Context;
use crate::kernel::OperatorKernel;
use crate::operators::{Operator, ReceiveInput};
use ghost_core::{Error, Result};
use std::sync::Arc;
use tracing::{debug, warn};

pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    fn handle(&self, ctx: &mut Context, next: Next<'_>) -> Result<()>;
}

/// The rest of the pipeline; the kernel sits at the end.
pub struct Next<'a> {
    rest: &'a [Arc<dyn Middleware>],
    kernel: &'a OperatorKernel,
}

impl<'a> Next<'a> {
    pub fn new(rest: &'a [Arc<dyn Middleware>], kernel: &'a OperatorKernel) -> Self {
        Self { rest, kernel }
    }

    pub fn run(self, ctx: &mut Context) -> Result<()> {
        match self.rest.split_first() {
            Some((middleware, rest)) => middleware.handle(
                ctx,
                Next {
                    rest,
                    kernel: self.kernel,
                },
            ),
            None => self.kernel.run(ctx, ReceiveInput::new().boxed()),
        }
    }
}

/// Turns recoverable errors into a user-visible message and rewinds the turn.
/// Fatal errors keep propagating.
pub struct ExceptionHandlerMiddleware;

impl Middleware for ExceptionHandlerMiddleware {
    fn name(&self) -> &str {
        "exception_handler"
    }

    fn handle(&self, ctx: &mut Context, next: Next<'_>) -> Result<()> {
        let err = match next.run(ctx) {
            Ok(()) => return Ok(()),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => e,
        };
        warn!(pid = %ctx.pid(), errcode = err.errcode(), error = %err, "turn failed, rewinding");
        ctx.rewind();
        match &err {
            Error::Context { code, message } => ctx.send_error(*code, message.clone()),
            Error::Busy { .. } => {
                let text = ctx.config().on_busy.clone();
                ctx.send_text(text);
            }
            _ => {
                let text = ctx.config().on_error.clone();
                ctx.send_text(text);
            }
        }
        Ok(())
    }
}

/// Stateless inputs never persist process changes.
pub struct StatelessMiddleware;

impl Middleware for StatelessMiddleware {
    fn name(&self) -> &str {
        "stateless"
    }

    fn handle(&self, ctx: &mut Context, next: Next<'_>) -> Result<()> {
        let result = next.run(ctx);
        if ctx.input().stateless {
            debug!(pid = %ctx.pid(), "stateless input, discarding process changes");
            ctx.rewind();
        }
        result
    }
}
