//! Console shell: stdin lines in, rendered outputs out

use ghost_core::{GhostConfig, Input, Output, Trace};
use ghost_kernel::{FileStorage, Ghost, MemoryStorage, Storage, SyncMessenger};
use ghost_thinks::{default_focus, default_mindset, ThinkCatalog};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub const SHELL_KIND: &str = "console";

#[derive(Debug, Clone, Default)]
pub struct ConsoleOptions {
    pub session: String,
    /// TOML file holding both the ghost config and `[[thinks]]` entries.
    pub config: Option<PathBuf>,
    /// Directory for file-backed storage; in-memory when absent.
    pub store: Option<PathBuf>,
}

impl ConsoleOptions {
    pub fn load_config(&self) -> GhostConfig {
        self.config
            .as_deref()
            .map(GhostConfig::load)
            .unwrap_or_default()
    }
}

/// Wire a ghost from the console options.
pub fn build_ghost(options: &ConsoleOptions) -> anyhow::Result<Ghost> {
    let config = options.load_config();
    let mut mindset = default_mindset();
    if let Some(path) = options.config.as_deref().filter(|p| p.exists()) {
        let count = ThinkCatalog::load(path)?.register(&mut mindset)?;
        info!(count, path = %path.display(), "thinks loaded");
    }
    let storage: Arc<dyn Storage> = match &options.store {
        Some(dir) => Arc::new(FileStorage::new(dir)?),
        None => Arc::new(MemoryStorage::new()),
    };
    let ghost = Ghost::builder(config)
        .mindset(mindset)
        .focus(default_focus())
        .storage(storage)
        .build()?;
    Ok(ghost)
}

/// Rendered result of one console line.
#[derive(Debug, Default, PartialEq)]
pub struct Turn {
    pub lines: Vec<String>,
    pub quit: bool,
}

pub struct Console {
    messenger: SyncMessenger,
    trace: Trace,
}

impl Console {
    pub fn new(ghost: Arc<Ghost>, session: &str) -> Self {
        let trace = Trace {
            shell_id: format!("{}-{}", SHELL_KIND, session),
            shell_kind: SHELL_KIND.to_string(),
            ..Trace::new(SHELL_KIND, session)
        };
        Self {
            messenger: SyncMessenger::new(ghost),
            trace,
        }
    }

    /// Send one line and run every async input it queued.
    pub fn handle_line(&self, line: &str) -> Turn {
        let mut outputs = self.messenger.send(Input::text(self.trace.clone(), line));
        outputs.extend(self.messenger.drain());

        let mut turn = Turn::default();
        for output in &outputs {
            if output.is_quit() && output.trace.process_id() == self.trace.process_id() {
                turn.quit = true;
            }
            if let Some(line) = render(output) {
                turn.lines.push(line);
            }
        }
        turn
    }
}

/// Text and error payloads are shown; everything else is silent.
pub fn render(output: &Output) -> Option<String> {
    if let Some(text) = output.text() {
        return Some(text.to_string());
    }
    output
        .error()
        .map(|e| format!("[error {}] {}", e.errcode, e.errmsg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ghost_core::{ErrorInfo, MessageBody};

    #[test]
    fn render_shows_text_and_errors() {
        let input = Input::text(Trace::new("c", "s"), "hi");
        let text = Output::reply(&input, None, MessageBody::text("hello"));
        assert_eq!(render(&text).as_deref(), Some("hello"));

        let error = Output::reply(
            &input,
            None,
            MessageBody::error(ErrorInfo {
                errcode: 423,
                errmsg: "busy".into(),
                ..Default::default()
            }),
        );
        assert_eq!(render(&error).as_deref(), Some("[error 423] busy"));

        let quit = Output::reply(&input, None, MessageBody::signal(ghost_core::SignalCode::Quit));
        assert_eq!(render(&quit), None);
    }

    #[test]
    fn missing_config_uses_defaults() {
        let options = ConsoleOptions {
            session: "s".into(),
            config: Some(PathBuf::from("/nonexistent/ghost.toml")),
            store: None,
        };
        assert_eq!(options.load_config().max_operators, 100);
        assert!(build_ghost(&options).is_ok());
    }
}
