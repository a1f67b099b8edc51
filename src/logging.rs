use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use time::macros::format_description;
use time::OffsetDateTime;
use tokio::sync::mpsc::UnboundedSender;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{filter::filter_fn, fmt, prelude::*, EnvFilter};

use crate::config::APP_NAME;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const TRANSCRIPT_CAPACITY: usize = 1000;
const TRANSCRIPT_TARGET: &str = "transcript";

/// Default location of the diagnostic log file.
pub fn default_log_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
        .join("raggen-ui.log")
}

/// Install the global tracing subscriber.
///
/// - Respects `RUST_LOG` (defaults to `info`).
/// - Always writes to `log_file` when it can be opened.
/// - Adds a compact stderr layer when `stderr` is set (non-interactive mode only). Transcript
///   lines are left out of it; text mode prints those itself.
pub fn init_tracing(log_file: &Path, stderr: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = configure_file_writer(log_file).map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact()
    });
    let stderr_layer = stderr.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .with_filter(filter_fn(|meta| meta.target() != TRANSCRIPT_TARGET))
    });

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init();
}

fn configure_file_writer(path: &Path) -> Option<NonBlocking> {
    if let Some(dir) = path.parent() {
        if let Err(err) = std::fs::create_dir_all(dir) {
            eprintln!("Failed to create log directory {}: {err}", dir.display());
            return None;
        }
    }
    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
    {
        Ok(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let _ = LOG_GUARD.set(guard);
            Some(non_blocking)
        }
        Err(err) => {
            eprintln!("Failed to open log file {}: {err}", path.display());
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptLine {
    pub level: Level,
    pub text: String,
}

#[derive(Default)]
struct Inner {
    lines: VecDeque<TranscriptLine>,
    subscriber: Option<UnboundedSender<TranscriptLine>>,
}

/// Shared handle to the visible transcript.
#[derive(Clone, Default)]
pub struct Transcript {
    inner: Arc<Mutex<Inner>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward every future line to `tx` as well (used by the non-interactive mode).
    pub fn subscribe(&self, tx: UnboundedSender<TranscriptLine>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.subscriber = Some(tx);
        }
    }

    /// Stop forwarding; the subscriber's receiver then sees the channel close.
    pub fn unsubscribe(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.subscriber = None;
        }
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.push(Level::Info, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.push(Level::Warn, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.push(Level::Error, message.as_ref());
    }

    fn push(&self, level: Level, message: &str) {
        let message = message.trim_end();
        if message.trim().is_empty() {
            return;
        }
        match level {
            Level::Info => tracing::info!(target: TRANSCRIPT_TARGET, "{message}"),
            Level::Warn => tracing::warn!(target: TRANSCRIPT_TARGET, "{message}"),
            Level::Error => tracing::error!(target: TRANSCRIPT_TARGET, "{message}"),
        }

        let line = TranscriptLine {
            level,
            text: format!("{}: {message}", timestamp()),
        };
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        if let Some(tx) = &inner.subscriber {
            let _ = tx.send(line.clone());
        }
        inner.lines.push_back(line);
        if inner.lines.len() > TRANSCRIPT_CAPACITY {
            inner.lines.pop_front();
        }
    }

    /// Copy of the retained lines, oldest first.
    pub fn lines(&self) -> Vec<TranscriptLine> {
        self.inner
            .lock()
            .map(|inner| inner.lines.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.lines.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.text.contains(needle))
    }
}

fn timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second]"
    ))
    .unwrap_or_else(|_| "now".into())
}
