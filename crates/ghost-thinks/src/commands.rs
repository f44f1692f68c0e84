//! Global slash commands

use ghost_core::{Result, Url};
use ghost_kernel::operators::{Rewind, Withdraw};
use ghost_kernel::{Context, GlobalIntention, Intention, IntentionAction, Op, Operator};
use serde_json::Value;

/// `/help` — list the registered commands, leaving the process untouched.
pub struct HelpCommand;

impl IntentionAction for HelpCommand {
    fn act(&self, ctx: &mut Context, _params: &Value) -> Result<Option<Op>> {
        let mut lines = vec!["**Commands**".to_string(), String::new()];
        for (name, description) in ctx.focus().commands() {
            if description.is_empty() {
                lines.push(format!("- `/{}`", name));
            } else {
                lines.push(format!("- `/{}` {}", name, description));
            }
        }
        ctx.send_markdown(lines.join("\n"));
        Ok(Some(Rewind::new().boxed()))
    }
}

/// `/cancel` — cancel the current task.
pub struct CancelCommand;

impl IntentionAction for CancelCommand {
    fn act(&self, ctx: &mut Context, _params: &Value) -> Result<Option<Op>> {
        let current = ctx.process()?.current.clone();
        Ok(Some(Withdraw::cancel(current, "canceled by user").boxed()))
    }
}

/// `/quit` — end the whole process.
pub struct QuitCommand;

impl IntentionAction for QuitCommand {
    fn act(&self, ctx: &mut Context, _params: &Value) -> Result<Option<Op>> {
        let current = ctx.process()?.current.clone();
        Ok(Some(Withdraw::quit(current, "quit by user").boxed()))
    }
}

/// `/{name}` routed to `reaction` on the task addressed by `target`.
pub fn route(name: &str, description: &str, target: Url, reaction: &str) -> GlobalIntention {
    GlobalIntention::route(
        Intention::command(name).with_description(description),
        target,
        reaction,
    )
}

pub fn builtin() -> Vec<GlobalIntention> {
    vec![
        GlobalIntention::action(
            Intention::command("help").with_description("list available commands"),
            HelpCommand,
        ),
        GlobalIntention::action(
            Intention::command("cancel").with_description("cancel the current task"),
            CancelCommand,
        ),
        GlobalIntention::action(
            Intention::command("quit").with_description("end the conversation"),
            QuitCommand,
        ),
    ]
}
