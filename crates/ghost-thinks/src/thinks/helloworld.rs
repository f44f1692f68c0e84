//! helloworld — the default root think

use ghost_core::Result;
use ghost_kernel::operators::Await;
use ghost_kernel::{BasicThink, Context, Event, Op, Operator, Stage, Thought};

pub const NAME: &str = "helloworld";

pub struct HelloWorldStage;

impl Stage for HelloWorldStage {
    fn name(&self) -> &str {
        ""
    }

    fn on_event(&self, ctx: &mut Context, thought: &mut Thought, event: &Event) -> Result<Option<Op>> {
        match event {
            Event::Activating | Event::Preempted => ctx.send_text("hello world!"),
            Event::Received => {
                if let Some(text) = ctx.text().map(str::to_string) {
                    ctx.send_text(format!("you said: {}", text));
                }
                ctx.send_text("I can only speak hello world!");
            }
            _ => return Ok(None),
        }
        Ok(Some(Await::new(thought.tid.clone()).boxed()))
    }
}

pub fn think() -> BasicThink {
    BasicThink::new(NAME)
        .with_description("replies hello world to everything")
        .with_stage(HelloWorldStage)
}
