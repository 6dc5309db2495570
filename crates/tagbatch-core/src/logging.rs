//! Logging init: `[YYYY-MM-DD HH:MM:SS] message` lines appended to the
//! progress log file and mirrored on the console.
//!
//! The subscriber is process-wide. [`init_logging`] returns a [`LogGuard`]
//! that owns the open file and flushes it when dropped at shutdown.

use anyhow::Result;
use chrono::Local;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Event format: bracketed local timestamp, then the message and fields.
/// Warnings and errors carry a level tag after the timestamp.
#[derive(Debug, Clone, Copy, Default)]
pub struct BracketedTimestamp;

impl<S, N> FormatEvent<S, N> for BracketedTimestamp
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(writer, "[{}] ", Local::now().format(TIMESTAMP_FORMAT))?;
        match *event.metadata().level() {
            Level::ERROR => write!(writer, "ERROR: ")?,
            Level::WARN => write!(writer, "WARN: ")?,
            _ => {}
        }
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Where log lines are mirrored besides the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Console {
    #[default]
    Stdout,
    Stderr,
}

/// Shared append handle; every event is one `write` on the same file.
struct SharedFile(Arc<File>);

impl<'a> MakeWriter<'a> for SharedFile {
    type Writer = &'a File;

    fn make_writer(&'a self) -> Self::Writer {
        &self.0
    }
}

/// Keeps the log file open for the life of the process.
#[must_use = "dropping the guard flushes and releases the log file"]
#[derive(Debug)]
pub struct LogGuard {
    file: Option<Arc<File>>,
    path: PathBuf,
}

impl LogGuard {
    /// `false` when the log file could not be opened and only the console is used.
    pub fn has_file(&self) -> bool {
        self.file.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        if let Some(file) = &self.file {
            let mut f: &File = file;
            let _ = f.flush();
            let _ = file.sync_data();
        }
    }
}

/// Open `path` for appending, creating parent directories as needed.
pub fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize logging to `log_file` and the console.
///
/// If the file cannot be opened, logging continues on the console only and a
/// warning is emitted. Errors only if a global subscriber is already set.
pub fn init_logging(log_file: &Path, console: Console) -> Result<LogGuard> {
    let (file, open_err) = match open_log_file(log_file) {
        Ok(f) => (Some(Arc::new(f)), None),
        Err(e) => (None, Some(e)),
    };

    let file_layer = file.as_ref().map(|f| {
        tracing_subscriber::fmt::layer()
            .event_format(BracketedTimestamp)
            .with_ansi(false)
            .with_writer(SharedFile(Arc::clone(f)))
    });
    let console_writer = match console {
        Console::Stdout => BoxMakeWriter::new(io::stdout),
        Console::Stderr => BoxMakeWriter::new(io::stderr),
    };
    let console_layer = tracing_subscriber::fmt::layer()
        .event_format(BracketedTimestamp)
        .with_ansi(false)
        .with_writer(console_writer);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(file_layer)
        .with(console_layer)
        .try_init()?;

    match open_err {
        None => tracing::debug!("logging to {}", log_file.display()),
        Some(e) => tracing::warn!(
            "cannot open log file {} ({}); logging to console only",
            log_file.display(),
            e
        ),
    }

    Ok(LogGuard {
        file,
        path: log_file.to_path_buf(),
    })
}
