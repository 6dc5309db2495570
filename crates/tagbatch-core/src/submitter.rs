//! Job submission: run the external seeding program for one artist.
//!
//! The program enqueues analysis jobs and exits; the work itself happens in
//! the backend afterwards. Every output line is forwarded to the log and the
//! exit status comes back as a [`SubmissionResult`] so the caller decides
//! what a failure means.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::io;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

/// How the submission program finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "result", content = "detail")]
pub enum SubmissionResult {
    Succeeded,
    /// Exited with a non-zero status code.
    ExitedWith(i32),
    /// Terminated by a signal, no exit code.
    Terminated,
    /// Could not be started or waited on.
    LaunchFailed(String),
}

impl SubmissionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, SubmissionResult::Succeeded)
    }
}

impl fmt::Display for SubmissionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionResult::Succeeded => write!(f, "succeeded"),
            SubmissionResult::ExitedWith(code) => write!(f, "exited with code {}", code),
            SubmissionResult::Terminated => write!(f, "terminated by signal"),
            SubmissionResult::LaunchFailed(reason) => write!(f, "could not run: {}", reason),
        }
    }
}

/// Submits all eligible files of one artist to the backend.
#[async_trait]
pub trait JobSubmitter: Send + Sync {
    async fn submit(&self, segment: &str) -> SubmissionResult;
}

/// Runs `<program> <args..> --artist <name> [--dry-run]`.
#[derive(Debug, Clone)]
pub struct CommandSubmitter {
    program: String,
    args: Vec<String>,
    dry_run: bool,
}

impl CommandSubmitter {
    pub fn new(program: impl Into<String>, args: Vec<String>, dry_run: bool) -> Self {
        Self {
            program: program.into(),
            args,
            dry_run,
        }
    }

    /// Build from a program-plus-arguments list; `None` if it is empty.
    pub fn from_command_line(command: &[String], dry_run: bool) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program.clone(), args.to_vec(), dry_run))
    }

    /// Full argument list passed for `segment`.
    pub fn args_for(&self, segment: &str) -> Vec<String> {
        let mut args = self.args.clone();
        args.push("--artist".to_string());
        args.push(segment.to_string());
        if self.dry_run {
            args.push("--dry-run".to_string());
        }
        args
    }

    async fn run(&self, segment: &str) -> io::Result<(ExitStatus, io::Result<()>)> {
        let mut child = Command::new(&self.program)
            .args(self.args_for(segment))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (out, err) = tokio::join!(forward_lines(stdout, false), forward_lines(stderr, true));
        let status = child.wait().await?;
        Ok((status, out.and(err)))
    }

    /// The exit status decides the result; a lost output stream is only logged.
    fn settle(&self, run: io::Result<(ExitStatus, io::Result<()>)>) -> SubmissionResult {
        let (status, output) = match run {
            Ok(done) => done,
            Err(e) => return SubmissionResult::LaunchFailed(format!("{}: {}", self.program, e)),
        };
        if let Err(e) = output {
            tracing::warn!("lost output of {}: {}", self.program, e);
        }
        if status.success() {
            SubmissionResult::Succeeded
        } else {
            match status.code() {
                Some(code) => SubmissionResult::ExitedWith(code),
                None => SubmissionResult::Terminated,
            }
        }
    }
}

#[async_trait]
impl JobSubmitter for CommandSubmitter {
    async fn submit(&self, segment: &str) -> SubmissionResult {
        let run = self.run(segment).await;
        self.settle(run)
    }
}

/// Log each line of a child stream. Invalid UTF-8 is replaced, not fatal.
async fn forward_lines<R>(reader: Option<R>, is_stderr: bool) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(());
    };
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        if is_stderr {
            tracing::warn!("  {}", line);
        } else {
            tracing::info!("  {}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str, dry_run: bool) -> CommandSubmitter {
        // `sh -c <script> sh --artist <name> [--dry-run]`: $1 = --artist, $2 = name.
        CommandSubmitter::new(
            "sh",
            vec!["-c".to_string(), script.to_string(), "sh".to_string()],
            dry_run,
        )
    }

    #[test]
    fn args_carry_artist_selector_and_dry_run() {
        let cmd = vec!["python".to_string(), "seed.py".to_string()];
        let s = CommandSubmitter::from_command_line(&cmd, false).unwrap();
        assert_eq!(s.args_for("Alpha"), vec!["seed.py", "--artist", "Alpha"]);

        let s = CommandSubmitter::from_command_line(&cmd, true).unwrap();
        assert_eq!(
            s.args_for("Sigur Rós"),
            vec!["seed.py", "--artist", "Sigur Rós", "--dry-run"]
        );

        assert!(CommandSubmitter::from_command_line(&[], false).is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn zero_exit_is_success() {
        let s = sh(r#"test "$1" = --artist && test "$2" = "Alpha" && echo "Found 10 music files""#, false);
        assert_eq!(s.submit("Alpha").await, SubmissionResult::Succeeded);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_reported_not_swallowed() {
        let s = sh("echo partial output; echo oops >&2; exit 3", false);
        assert_eq!(s.submit("Alpha").await, SubmissionResult::ExitedWith(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dry_run_flag_is_forwarded() {
        let s = sh(r#"test "$3" = --dry-run"#, true);
        assert!(s.submit("Alpha").await.is_success());
        let s = sh(r#"test "$3" = --dry-run"#, false);
        assert_eq!(s.submit("Alpha").await, SubmissionResult::ExitedWith(1));
    }

    #[tokio::test]
    async fn missing_program_is_launch_failure() {
        let s = CommandSubmitter::new("/nonexistent/tagbatch-seed", Vec::new(), false);
        match s.submit("Alpha").await {
            SubmissionResult::LaunchFailed(reason) => {
                assert!(reason.contains("/nonexistent/tagbatch-seed"))
            }
            other => panic!("expected LaunchFailed, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn exit_status_wins_over_lost_output() {
        use std::os::unix::process::ExitStatusExt;

        let s = CommandSubmitter::new("seed", Vec::new(), false);
        let broken = || Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));

        assert_eq!(
            s.settle(Ok((ExitStatus::from_raw(0), broken()))),
            SubmissionResult::Succeeded
        );
        // Raw wait status: exit code in the high byte.
        assert_eq!(
            s.settle(Ok((ExitStatus::from_raw(2 << 8), broken()))),
            SubmissionResult::ExitedWith(2)
        );
        assert_eq!(
            s.settle(Ok((ExitStatus::from_raw(9), Ok(())))),
            SubmissionResult::Terminated
        );
        assert!(matches!(
            s.settle(Err(io::Error::new(io::ErrorKind::NotFound, "no such file"))),
            SubmissionResult::LaunchFailed(_)
        ));
    }
}
