//! Error types for the ghost runtime

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("process {pid} is busy")]
    Busy { pid: String },

    #[error("unexpected error: {0}")]
    Unexpected(String),

    #[error("{message}")]
    Context { code: i32, message: String },

    #[error("mindset not found: {0}")]
    MindsetNotFound(String),

    #[error("stackoverflow: more than {limit} operators in one turn")]
    StackOverflow { limit: usize, trace: String },

    #[error("operator loop: {0} returned itself")]
    OperatorLoop(String),

    #[error("logic error: {0}")]
    Logic(String),

    #[error("bootstrap error: {0}")]
    Bootstrap(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod codes {
    pub const CONTEXT: i32 = 400;
    pub const MINDSET_NOT_FOUND: i32 = 404;
    pub const BUSY: i32 = 423;
    pub const UNEXPECTED: i32 = 500;
    pub const STORAGE: i32 = 503;
    pub const STACK_OVERFLOW: i32 = 508;
    pub const OPERATOR_LOOP: i32 = 509;
    pub const LOGIC: i32 = 510;
    pub const BOOTSTRAP: i32 = 511;
}

impl Error {
    pub fn busy(pid: impl Into<String>) -> Self {
        Self::Busy { pid: pid.into() }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// User-visible error raised from stage code.
    pub fn context(message: impl Into<String>) -> Self {
        Self::Context {
            code: codes::CONTEXT,
            message: message.into(),
        }
    }

    pub fn context_with_code(code: i32, message: impl Into<String>) -> Self {
        Self::Context {
            code,
            message: message.into(),
        }
    }

    pub fn logic(message: impl Into<String>) -> Self {
        Self::Logic(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    pub fn errcode(&self) -> i32 {
        match self {
            Self::Busy { .. } => codes::BUSY,
            Self::Unexpected(_) => codes::UNEXPECTED,
            Self::Context { code, .. } => *code,
            Self::MindsetNotFound(_) => codes::MINDSET_NOT_FOUND,
            Self::StackOverflow { .. } => codes::STACK_OVERFLOW,
            Self::OperatorLoop(_) => codes::OPERATOR_LOOP,
            Self::Logic(_) => codes::LOGIC,
            Self::Bootstrap(_) => codes::BOOTSTRAP,
            Self::Storage(_) => codes::STORAGE,
            Self::Config(_) | Self::Io(_) | Self::Json(_) => codes::UNEXPECTED,
        }
    }

    /// Fatal errors abort the turn; the exception middleware never swallows them.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MindsetNotFound(_)
                | Self::StackOverflow { .. }
                | Self::OperatorLoop(_)
                | Self::Logic(_)
                | Self::Bootstrap(_)
        )
    }
}
