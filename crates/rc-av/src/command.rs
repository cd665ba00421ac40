//! Running ffmpeg and ffprobe as child processes.
//!
//! Two modes: [`ToolCommand::output`] collects everything and fails on a
//! non-zero exit, [`ToolCommand::stream_stderr`] feeds stderr to a callback
//! line by line and leaves the exit status to the caller. ffmpeg reports
//! both progress and banners on stderr, so stdout is never streamed.

use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// How a streamed run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// Exited by itself, successfully or not.
    Exited(ExitStatus),
    /// Stopped through the cancellation token and reaped.
    Cancelled,
    /// Killed by us after the timeout passed or stderr became unreadable.
    Aborted(String),
}

/// One invocation of an external tool.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<OsString>,
    timeout: Duration,
    kill_grace: Duration,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    pub fn arg(&mut self, arg: impl AsRef<OsStr>) -> &mut Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self.arg(arg);
        }
        self
    }

    /// Upper bound on the whole run; the process is terminated past it.
    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    /// Time between SIGTERM and SIGKILL when the run is stopped early.
    pub fn kill_grace(&mut self, grace: Duration) -> &mut Self {
        self.kill_grace = grace;
        self
    }

    fn tool_name(&self) -> String {
        self.program
            .file_name()
            .unwrap_or(self.program.as_os_str())
            .to_string_lossy()
            .into_owned()
    }

    fn fail(&self, message: impl Into<String>) -> rc_core::Error {
        rc_core::Error::tool(self.tool_name(), message)
    }

    fn spawn(&self, stdout: Stdio) -> rc_core::Result<Child> {
        tracing::trace!(tool = %self.tool_name(), args = ?self.args, "spawning");
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.fail(format!("failed to spawn: {e}")))
    }

    /// Run to completion and collect both output streams.
    ///
    /// A non-zero exit is an error carrying the trimmed stderr. On timeout
    /// the child is dropped, and with it killed.
    pub async fn output(&self) -> rc_core::Result<ToolOutput> {
        let child = self.spawn(Stdio::piped())?;
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| self.fail(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| self.fail(format!("waiting for process: {e}")))?;

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            return Err(self.fail(format!("{}: {}", output.status, stderr.trim())));
        }
        Ok(ToolOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr,
        })
    }

    /// Run while handing each stderr line to `on_line`.
    ///
    /// Lines are split on `\n` and decoded lossily, so stray Latin-1 bytes
    /// never stop the pipe from being drained. When `cancel` fires, the
    /// timeout passes or stderr fails, the child gets SIGTERM, then SIGKILL
    /// after the kill grace. The child is always reaped before this
    /// returns. Only a failed spawn is an error.
    pub async fn stream_stderr(
        &self,
        mut on_line: impl FnMut(&str),
        cancel: &CancellationToken,
    ) -> rc_core::Result<RunOutcome> {
        let mut child = self.spawn(Stdio::null())?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| self.fail("stderr was not captured"))?;
        let mut lines = BufReader::new(stderr).split(b'\n');
        let mut reading = true;

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    terminate(&mut child, self.kill_grace).await;
                    return Ok(RunOutcome::Cancelled);
                }
                _ = &mut deadline => {
                    terminate(&mut child, self.kill_grace).await;
                    return Ok(RunOutcome::Aborted(format!("timed out after {:?}", self.timeout)));
                }
                next = lines.next_segment(), if reading => match next {
                    Ok(Some(raw)) => {
                        let line = String::from_utf8_lossy(&raw);
                        on_line(line.strip_suffix('\r').unwrap_or(&line));
                    }
                    Ok(None) => reading = false,
                    Err(e) => {
                        tracing::warn!(tool = %self.tool_name(), "stderr read failed: {e}");
                        terminate(&mut child, self.kill_grace).await;
                        return Ok(RunOutcome::Aborted(format!("stderr read failed: {e}")));
                    }
                },
                status = child.wait(), if !reading => {
                    return status
                        .map(RunOutcome::Exited)
                        .map_err(|e| self.fail(format!("waiting for process: {e}")));
                }
            }
        }
    }
}

async fn terminate(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    if let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if kill(Pid::from_raw(pid), Signal::SIGTERM).is_ok()
            && matches!(tokio::time::timeout(grace, child.wait()).await, Ok(Ok(_)))
        {
            return;
        }
    }
    #[cfg(not(unix))]
    let _ = grace;

    if let Err(e) = child.kill().await {
        tracing::warn!("failed to kill child process: {e}");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ToolCommand {
        let mut cmd = ToolCommand::new("sh");
        cmd.args(["-c", script]);
        cmd
    }

    #[tokio::test]
    async fn output_collects_stdout() {
        let out = sh("printf 'ffprobe json'").output().await.unwrap();
        assert!(out.status.success());
        assert_eq!(out.stdout, "ffprobe json");
    }

    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let err = sh("echo 'Invalid data found' >&2; exit 1")
            .output()
            .await
            .unwrap_err()
            .to_string();
        assert!(err.starts_with("sh: "), "{err}");
        assert!(err.contains("Invalid data found"), "{err}");
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let err = ToolCommand::new("/nonexistent/ffmpeg")
            .output()
            .await
            .unwrap_err()
            .to_string();
        assert!(err.starts_with("ffmpeg: failed to spawn"), "{err}");
    }

    #[tokio::test]
    async fn output_times_out() {
        let err = sh("sleep 10")
            .timeout(Duration::from_millis(100))
            .output()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn stderr_lines_arrive_in_order() {
        let mut seen = Vec::new();
        let outcome = sh("echo frame=1 >&2; echo progress=end >&2; exit 3")
            .stream_stderr(|line| seen.push(line.to_owned()), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(seen, ["frame=1", "progress=end"]);
        assert!(matches!(outcome, RunOutcome::Exited(s) if s.code() == Some(3)));
    }

    #[tokio::test]
    async fn invalid_utf8_keeps_the_pipe_drained() {
        // Enough output to fill a pipe if nobody reads it.
        let script = "printf 'Input #0, from \\047caf\\351.mkv\\047:\\n' >&2; \
                      i=0; while [ $i -lt 3000 ]; do \
                      echo \"out_time_us=$i progress=continue padding padding padding\" >&2; \
                      i=$((i+1)); done; exit 0";
        let mut seen = Vec::new();
        let outcome = tokio::time::timeout(
            Duration::from_secs(20),
            sh(script).stream_stderr(|line| seen.push(line.to_owned()), &CancellationToken::new()),
        )
        .await
        .expect("child blocked on a full stderr pipe")
        .unwrap();

        assert!(matches!(outcome, RunOutcome::Exited(s) if s.success()));
        assert_eq!(seen.len(), 3001);
        assert_eq!(seen[0], "Input #0, from 'caf\u{fffd}.mkv':");
        assert!(seen[3000].starts_with("out_time_us=2999"));
    }

    #[tokio::test]
    async fn streamed_timeout_aborts() {
        let outcome = sh("sleep 30")
            .timeout(Duration::from_millis(100))
            .kill_grace(Duration::from_millis(200))
            .stream_stderr(|_| {}, &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(outcome, RunOutcome::Aborted(reason) if reason.contains("timed out")));
    }

    #[tokio::test]
    async fn cancel_stops_a_running_process() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let outcome = sh("sleep 30")
            .kill_grace(Duration::from_secs(1))
            .stream_stderr(|_| {}, &cancel)
            .await
            .unwrap();

        assert!(matches!(outcome, RunOutcome::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn sigterm_ignored_escalates_to_kill() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let started = std::time::Instant::now();
        let outcome = sh("trap '' TERM; sleep 30")
            .kill_grace(Duration::from_millis(200))
            .stream_stderr(|_| {}, &cancel)
            .await
            .unwrap();
        assert!(matches!(outcome, RunOutcome::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
