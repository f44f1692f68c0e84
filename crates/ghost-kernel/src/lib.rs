//! Ghost Kernel - Operator trampoline, task processes and the respond pipeline

pub mod context;
pub mod focus;
pub mod ghost;
pub mod kernel;
pub mod messenger;
pub mod middleware;
pub mod mindset;
pub mod operators;
pub mod process;
pub mod runtime;
pub mod storage;
pub mod task;

pub use context::{Context, Services};
pub use focus::{Focus, GlobalIntention, IntentionAction, IntentionDriver, Matched};
pub use ghost::{Ghost, GhostBuilder};
pub use kernel::OperatorKernel;
pub use messenger::{AsyncMessenger, MessageQueue, SyncMessenger};
pub use middleware::{ExceptionHandlerMiddleware, Middleware, Next, StatelessMiddleware};
pub use mindset::{
    BasicThink, Event, FnStage, Mindset, Reaction, Stage, Think, ThinkDriver, ThinkMeta,
};
pub use operators::{Op, Operator};
pub use process::Process;
pub use runtime::Runtime;
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use task::{Attention, Intention, Task, Thought};
