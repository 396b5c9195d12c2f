use anyhow::Result;
use clap::Parser;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt, reload};

use tender_core::{Daemon, DaemonConfig};

#[derive(Parser)]
#[command(name = "tenderd")]
#[command(about = "Watch a directory for JSON instructions and run them")]
struct Cli {
    /// Path to the JSON config file. Missing or malformed → built-in defaults.
    #[arg(short, long, env = "TENDERD_CONFIG", default_value = "tenderd.json")]
    config: PathBuf,
}

/// stdout と同じ内容を書くファイル用 layer（ANSI なし）
type FileLayer = fmt::Layer<Registry, fmt::format::DefaultFields, fmt::format::Format, Mutex<File>>;
type FileHandle = reload::Handle<Option<FileLayer>, Registry>;

#[tokio::main]
async fn main() -> Result<()> {
    // ファイル出力先は設定を読むまで分からないので、空の reload layer を先に入れておく
    let (file_layer, file_handle) = reload::Layer::new(None::<FileLayer>);
    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            EnvFilter::from_default_env()
                .add_directive("tender_core=info".parse()?)
                .add_directive("tenderd=info".parse()?),
        )
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = DaemonConfig::load(&cli.config);
    if let Some(path) = &config.log_file {
        attach_log_file(&file_handle, path)?;
    }
    let daemon = Daemon::from_config(&config)?;

    let shutdown = CancellationToken::new();
    let escalate = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone(), escalate.clone()));

    let report = daemon.run(shutdown, escalate).await?;
    info!(
        succeeded = report.counts.succeeded,
        failed = report.counts.failed,
        crashed = report.counts.crashed,
        released = report.released.len(),
        escalated = report.escalated,
        "tenderd exited"
    );
    Ok(())
}

/// Append every log line to `path` as well. An unopenable file is a warning,
/// not a startup failure.
fn attach_log_file(handle: &FileHandle, path: &Path) -> Result<()> {
    let file = match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => file,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "log file not writable, logging to stdout only");
            return Ok(());
        }
    };
    handle.reload(Some(
        fmt::layer().with_ansi(false).with_writer(Mutex::new(file)),
    ))?;
    info!(path = %path.display(), "logging to file");
    Ok(())
}

/// 1 回目のシグナルで drain、2 回目で未着手分をキャンセル
async fn watch_signals(shutdown: CancellationToken, escalate: CancellationToken) {
    if let Err(e) = termination().await {
        warn!(error = %e, "signal handler unavailable");
        return;
    }
    info!("signal received, finishing in-flight work (send again to stop sooner)");
    shutdown.cancel();

    if let Err(e) = termination().await {
        warn!(error = %e, "signal handler unavailable");
        return;
    }
    info!("second signal received, cancelling queued work");
    escalate.cancel();
}

#[cfg(unix)]
async fn termination() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = term.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn termination() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
