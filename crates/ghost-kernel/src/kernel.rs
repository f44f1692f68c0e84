//! OperatorKernel — runs operators until one returns nothing

use crate::context::Context;
use crate::operators::Op;
use ghost_core::{Error, Result};
use tracing::{debug, error};

pub struct OperatorKernel {
    max_operators: usize,
}

impl OperatorKernel {
    pub fn new(max_operators: usize) -> Self {
        Self { max_operators }
    }

    pub fn max_operators(&self) -> usize {
        self.max_operators
    }

    /// Trampoline from `seed`. Every step is recorded in the context's operator trace.
    pub fn run(&self, ctx: &mut Context, seed: Op) -> Result<()> {
        let mut op = seed;
        let mut steps = 0usize;
        loop {
            steps += 1;
            if steps > self.max_operators {
                let trace = ctx.operator_trace().join("\n");
                error!(limit = self.max_operators, trace = %trace, "operator stack overflow");
                return Err(Error::StackOverflow {
                    limit: self.max_operators,
                    trace,
                });
            }
            let name = op.name();
            let description = format!("{:?}", op);
            ctx.record_operator(description.clone());

            let next = match op.run(ctx) {
                Ok(next) => next,
                Err(e) => {
                    error!(op = name, error = %e, trace = %ctx.operator_trace().join("\n"), "operator failed");
                    return Err(e);
                }
            };
            match next {
                Some(next) => {
                    if !next.is_chain() && format!("{:?}", next) == description {
                        error!(op = name, trace = %ctx.operator_trace().join("\n"), "operator returned itself");
                        return Err(Error::OperatorLoop(name.to_string()));
                    }
                    op = next;
                }
                None => break,
            }
        }
        debug!(steps, trace = %ctx.operator_trace().join(" -> "), "turn done");
        Ok(())
    }
}
