//! Ghost Core - Types, wire protocol, configuration and error handling

pub mod config;
pub mod error;
pub mod protocol;
pub mod types;
pub mod url;

pub use config::GhostConfig;
pub use error::{codes, Error, Result};
pub use protocol::*;
pub use types::*;
pub use url::Url;
