//! CLI for tagbatch.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tagbatch_core::config::{self, BatchConfig};
use tagbatch_core::logging::{self, Console};

use commands::{run_batch, run_completions, run_man, run_status};

/// Top-level CLI. Without a subcommand, runs the batch.
#[derive(Debug, Parser)]
#[command(name = "tagbatch")]
#[command(
    about = "Feed a music library to the tagging analysis queue one artist at a time",
    long_about = None
)]
pub struct Cli {
    /// Config file (TOML). Defaults to $TAGBATCH_CONFIG or ~/.config/tagbatch/config.toml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Library root; overrides MUSIC_DIR.
    #[arg(long, global = true, value_name = "DIR")]
    pub music_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Process every artist folder in order (the default).
    Run {
        /// Ask the submission program to only report what it would queue.
        #[arg(long)]
        dry_run: bool,
        /// Only process this artist folder. Repeatable.
        #[arg(long = "artist", value_name = "NAME")]
        artists: Vec<String>,
    },

    /// Show per-artist track and completion counts without submitting.
    Status {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Print shell completions.
    Completions {
        /// Target shell.
        shell: clap_complete::Shell,
    },

    /// Print the man page (roff).
    Man,
}

impl Cli {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        let command = cli.command.unwrap_or(CliCommand::Run {
            dry_run: false,
            artists: Vec::new(),
        });

        // These need neither config nor logging.
        match &command {
            CliCommand::Completions { shell } => return run_completions(*shell),
            CliCommand::Man => return run_man(),
            _ => {}
        }

        let mut cfg = config::load(cli.config.as_deref())?;
        if let Some(dir) = cli.music_dir {
            cfg.music_dir = Some(dir);
        }
        if let CliCommand::Run { dry_run: true, .. } = &command {
            cfg.dry_run = true;
        }
        cfg.validate()?;

        // Keep stdout clean for `status` output.
        let console = match &command {
            CliCommand::Status { .. } => Console::Stderr,
            _ => Console::Stdout,
        };
        let _log_guard = logging::init_logging(&cfg.log_file, console)?;
        tracing::debug!("loaded config: {:?}", cfg);

        match command {
            CliCommand::Run { artists, .. } => run_batch(&cfg, artists).await,
            CliCommand::Status { json } => run_status(&cfg, json).await,
            CliCommand::Completions { .. } | CliCommand::Man => Ok(()),
        }
    }
}

/// Config summary logged once at startup.
pub(crate) fn describe(cfg: &BatchConfig) -> String {
    format!(
        "music_dir={} delay={}s poll={}s grace={}s queue={} store={} dry_run={} on_query_failure={:?} on_submit_failure={:?}",
        cfg.music_dir
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
        cfg.delay_between_artists_secs,
        cfg.poll_interval_secs,
        cfg.grace_period_secs,
        cfg.queue_name,
        cfg.store_path().display(),
        cfg.dry_run,
        cfg.query_failure_policy,
        cfg.submit_failure_policy,
    )
}

#[cfg(test)]
mod tests;
