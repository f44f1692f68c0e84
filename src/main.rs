//! ghost-console — talk to a ghost from the terminal
//!
//! Usage:
//!   ghost-console chat --session S          → chat on stdin/stdout
//!   ghost-console chat --store ~/.ghost     → persist processes on disk
//!   ghost-console config --config ghost.toml → print the effective config

use clap::{Parser, Subcommand};
use ghostkernel::console::{build_ghost, Console, ConsoleOptions};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "ghost-console",
    about = "Console shell for the ghost runtime kernel",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the ghost on stdin/stdout
    Chat {
        /// Session id (also the main process id)
        #[arg(short, long, default_value = "console")]
        session: String,
        /// Config file (TOML, may also declare [[thinks]])
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Directory for file-backed process storage
        #[arg(long)]
        store: Option<PathBuf>,
        /// Write logs to a file (in addition to stderr)
        #[arg(long)]
        log_file: Option<PathBuf>,
    },
    /// Print the effective configuration
    Config {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Chat {
            session,
            config,
            store,
            log_file,
        } => {
            let _guard = init_tracing(log_file.as_deref())?;
            let options = ConsoleOptions {
                session,
                config,
                store,
            };
            chat(&options)?;
        }
        Commands::Config { config } => {
            let options = ConsoleOptions {
                config,
                ..Default::default()
            };
            print!("{}", options.load_config().to_toml());
        }
    }

    Ok(())
}

fn chat(options: &ConsoleOptions) -> anyhow::Result<()> {
    let ghost = Arc::new(build_ghost(options)?);
    let console = Console::new(ghost, &options.session);
    tracing::info!(session = %options.session, "console ready");

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let turn = console.handle_line(line);
        for text in &turn.lines {
            writeln!(stdout, "{}", text)?;
        }
        stdout.flush()?;
        if turn.quit {
            break;
        }
    }
    Ok(())
}

fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match log_file {
        Some(path) => {
            let name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("invalid log file: {}", path.display()))?;
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "ghost=info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(guard)
}
