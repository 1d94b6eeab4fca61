use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use copilot_chat::{app, Config};

#[derive(Parser)]
#[command(name = "copilot-chat")]
#[command(version)]
#[command(about = "Chat with GitHub Copilot from the terminal", long_about = None)]
struct Cli {
    /// Write debug logs to the log file
    #[arg(short, long)]
    debug: bool,

    /// Log file used with --debug
    #[arg(long, default_value = "copilot-chat.log")]
    log_file: PathBuf,

    /// Config file (defaults to ~/.copilot-chat/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Model to request instead of the configured one
    #[arg(short, long)]
    model: Option<String>,
}

/// The terminal belongs to the UI, so logs only ever go to a file.
fn init_logging(path: &Path) -> Result<WorkerGuard> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("invalid log file path: {}", path.display()))?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("copilot_chat=debug")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _guard = if cli.debug {
        Some(init_logging(&cli.log_file)?)
    } else {
        None
    };

    let config = Config::load(cli.config.as_deref())?.with_model_override(cli.model);
    tracing::debug!(?config, "Loaded configuration");

    app::run(config).await
}
