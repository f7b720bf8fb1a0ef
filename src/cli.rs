use crate::engine::HttpEngine;
use crate::logging::{self, LogTarget};
use crate::model::{SessionConfig, SessionEvent, SessionView};
use crate::orchestrator::{run_controller, UiCommand};
use crate::storage::{FileHintStore, HintStore};
use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "mining-control",
    version,
    about = "Start/stop a local mining engine and watch its hashrate"
)]
pub struct Cli {
    /// Base URL of the mining engine's local API
    #[arg(long, default_value = "http://127.0.0.1:3777")]
    pub engine_url: String,

    /// Reconcile with the engine, print the session as JSON and exit (no TUI)
    #[arg(long, conflicts_with = "text")]
    pub json: bool,

    /// Stream session changes as text lines and print a summary at exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Timeout for start/stop commands and state queries
    #[arg(long, default_value = "10s")]
    pub request_timeout: humantime::Duration,

    /// How long to wait for the first metric before posting a notice (0s disables)
    #[arg(long, default_value = "30s")]
    pub warmup_notice: humantime::Duration,

    /// Where to persist the last-known running state
    #[arg(long)]
    pub hint_file: Option<PathBuf>,

    /// Forget the persisted running state before starting
    #[arg(long)]
    pub reset_hint: bool,

    /// Stop the engine when quitting if it is starting or running
    #[arg(long)]
    pub stop_on_exit: bool,

    /// Use --start-on-launch true to start an idle engine once its state is known
    #[arg(long, default_value_t = false, action = clap::ArgAction::Set)]
    pub start_on_launch: bool,

    /// Log filter (e.g. debug, mining_control=trace); overrides RUST_LOG
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    fn uses_tui(&self) -> bool {
        cfg!(feature = "tui") && !self.json && !self.text
    }
}

pub async fn run(args: Cli) -> Result<()> {
    let target = if args.uses_tui() {
        LogTarget::File
    } else {
        LogTarget::Stderr
    };
    // Logging is best-effort; a broken log dir must not keep the engine unreachable.
    let _log_guard = match logging::init(target, args.log_level.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("warning: logging disabled: {e}");
            None
        }
    };

    let cfg = build_config(&args);
    let hints = build_hint_store(&cfg)?;
    if args.reset_hint {
        hints
            .clear()
            .with_context(|| format!("failed to reset session hint at {}", hints.path().display()))?;
        tracing::info!("session hint cleared");
    }

    if args.json {
        return run_json(cfg, hints).await;
    }
    if args.uses_tui() {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(cfg, hints).await;
        }
    }
    run_text(cfg, hints).await
}

/// Build a `SessionConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> SessionConfig {
    let warmup_notice = Duration::from(args.warmup_notice);
    SessionConfig {
        engine_url: args.engine_url.clone(),
        request_timeout: Duration::from(args.request_timeout),
        warmup_notice: (!warmup_notice.is_zero()).then_some(warmup_notice),
        hint_path: args.hint_file.clone(),
        stop_on_exit: args.stop_on_exit,
        start_on_launch: args.start_on_launch,
        user_agent: format!("mining-control/{}", env!("CARGO_PKG_VERSION")),
    }
}

/// Resolve the hint file from the config, falling back to the data directory.
pub fn build_hint_store(cfg: &SessionConfig) -> Result<FileHintStore> {
    let path = match cfg.hint_path.clone() {
        Some(p) => p,
        None => FileHintStore::default_path().context("cannot locate session hint file")?,
    };
    Ok(FileHintStore::new(path))
}

#[derive(Serialize)]
struct JsonReport<'a> {
    config: &'a SessionConfig,
    session: &'a crate::model::MiningSession,
    view: SessionView,
}

async fn run_json(cfg: SessionConfig, hints: FileHintStore) -> Result<()> {
    let engine = Arc::new(HttpEngine::new(&cfg)?);
    let session = crate::session::reconcile_once(&engine, &hints).await;

    let report = JsonReport {
        config: &cfg,
        session: session.snapshot(),
        view: session.view(),
    };
    let out = serde_json::to_string_pretty(&report)?;
    let (out_tx, out_handle) = spawn_output_writer();
    let _ = out_tx.send(OutputLine::Stdout(out));
    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

fn timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "-".to_string())
}

async fn run_text(cfg: SessionConfig, hints: FileHintStore) -> Result<()> {
    let engine = Arc::new(HttpEngine::new(&cfg)?);
    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<SessionEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    let handle =
        tokio::spawn(async move { run_controller(&cfg, engine, hints, evt_tx, cmd_rx).await });

    // Ctrl-C asks the controller to wind down; the loop below drains until it does.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cmd_tx.send(UiCommand::Quit);
        }
    });

    let mut samples: Vec<f64> = Vec::new();
    let mut last_line = String::new();
    while let Some(ev) = evt_rx.recv().await {
        let line = match ev {
            SessionEvent::Changed { view } => {
                let line = crate::text_summary::describe_view(&view);
                if line == last_line {
                    continue;
                }
                last_line = line.clone();
                line
            }
            SessionEvent::RateSample { hashrate } => {
                samples.push(hashrate);
                continue;
            }
            SessionEvent::CommandFailed { command, error } => {
                format!("{command} failed: {error}")
            }
            SessionEvent::Info(info) => info.to_message(),
        };
        let _ = out_tx.send(OutputLine::Stderr(format!("{} {line}", timestamp())));
    }

    let session = handle.await.context("session controller task failed")??;
    let summary = crate::text_summary::build_text_summary(&session, &samples);
    for line in summary.lines {
        let _ = out_tx.send(OutputLine::Stdout(line));
    }
    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}
