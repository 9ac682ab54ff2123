//! Script verification by subprocess execution.
//!
//! A verification runs one script generation under the configured interpreter
//! with a wall-clock ceiling. Every outcome, including launch failures and
//! timeouts, is reported as a [`VerificationResult`] value.
use crate::schema::{FailureReason, VerificationResult};
use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);
/// Time allowed to flush output after the script exits at the deadline.
const STREAM_GRACE: Duration = Duration::from_millis(250);
const READ_CHUNK_BYTES: usize = 8192;

#[derive(Debug, Clone)]
pub struct ScriptVerifier {
    interpreter: Vec<String>,
    timeout: Duration,
}

impl ScriptVerifier {
    pub fn new(interpreter: Vec<String>, timeout: Duration) -> Self {
        Self {
            interpreter,
            timeout,
        }
    }

    pub fn verify(&self, script: &Path) -> VerificationResult {
        if !script.exists() {
            return VerificationResult::process_error(format!(
                "script file not found: {}",
                script.display()
            ));
        }
        tracing::info!(script = %script.display(), "verifying script");
        let result = match self.run(script) {
            Ok(result) => result,
            Err(err) => VerificationResult::process_error(format!("{err:#}")),
        };
        tracing::info!(
            elapsed_ms = result.duration_ms,
            succeeded = result.succeeded,
            reason = ?result.failure_reason,
            exit_code = ?result.exit_code,
            "verification complete"
        );
        result
    }

    fn run(&self, script: &Path) -> Result<VerificationResult> {
        let (program, args) = self
            .interpreter
            .split_first()
            .ok_or_else(|| anyhow!("interpreter command is empty"))?;
        let program =
            which::which(program).with_context(|| format!("resolve interpreter {program}"))?;
        let script = std::path::absolute(script)
            .with_context(|| format!("resolve script path {}", script.display()))?;

        let mut cmd = Command::new(&program);
        cmd.args(args)
            .arg(&script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own process group so a timeout can take down the installer too.
            cmd.process_group(0);
        }

        let start = Instant::now();
        let deadline = start + self.timeout;
        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawn {} {}", program.display(), script.display()))?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let waited = self.wait_with_deadline(&mut child, deadline);
        if matches!(waited, Ok(Some(_))) {
            // Background jobs the script left behind still hold the pipes.
            kill_process_group(&child);
        }
        let streams_deadline = deadline.max(Instant::now() + STREAM_GRACE);
        let (stdout, stdout_closed) = collect(&stdout, streams_deadline);
        let (stderr, stderr_closed) = collect(&stderr, streams_deadline);
        let duration_ms = start.elapsed().as_millis();

        let result = match waited? {
            Some(status) if stdout_closed && stderr_closed => {
                finished_result(status, stdout, stderr, duration_ms)
            }
            Some(_) => {
                tracing::warn!(
                    timeout_secs = self.timeout.as_secs(),
                    "script exited but its output stayed open"
                );
                self.timed_out(stdout, stderr, duration_ms)
            }
            None => self.timed_out(stdout, stderr, duration_ms),
        };
        Ok(result)
    }

    fn timed_out(&self, stdout: String, stderr: String, duration_ms: u128) -> VerificationResult {
        VerificationResult {
            succeeded: false,
            failure_reason: FailureReason::Timeout,
            exit_code: None,
            exit_signal: None,
            stdout,
            stderr,
            message: format!("script timed out after {} seconds", self.timeout.as_secs()),
            duration_ms,
        }
    }

    /// Poll until exit or deadline; `None` means the child was killed on timeout.
    fn wait_with_deadline(
        &self,
        child: &mut Child,
        deadline: Instant,
    ) -> Result<Option<ExitStatus>> {
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(Some(status)),
                Ok(None) => {}
                Err(err) => {
                    terminate(child);
                    return Err(err).context("check script status");
                }
            }
            if Instant::now() > deadline {
                tracing::warn!(timeout_secs = self.timeout.as_secs(), "script timed out");
                terminate(child);
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

fn finished_result(
    status: ExitStatus,
    stdout: String,
    stderr: String,
    duration_ms: u128,
) -> VerificationResult {
    let succeeded = status.success();
    VerificationResult {
        succeeded,
        failure_reason: if succeeded {
            FailureReason::None
        } else {
            FailureReason::NonZeroExit
        },
        exit_code: status.code(),
        exit_signal: exit_signal(&status),
        stdout,
        stderr,
        message: String::new(),
        duration_ms,
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

fn terminate(child: &mut Child) {
    kill_process_group(child);
    let _ = child.kill();
    let _ = child.wait();
}

fn kill_process_group(child: &Child) {
    #[cfg(unix)]
    {
        if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: signals the process group created for this child at spawn.
            unsafe {
                libc::kill(-pgid, libc::SIGKILL);
            }
        }
    }
    #[cfg(not(unix))]
    let _ = child;
}

/// Forward pipe contents in chunks so a caller can stop waiting at any time
/// and keep what arrived so far.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let Some(mut pipe) = pipe else {
            return;
        };
        let mut chunk = [0u8; READ_CHUNK_BYTES];
        loop {
            match pipe.read(&mut chunk) {
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(chunk[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}

/// Gather output until the pipe closes or `deadline` passes.
/// The flag is `false` when the pipe was still open at the deadline.
fn collect(chunks: &Receiver<Vec<u8>>, deadline: Instant) -> (String, bool) {
    let mut bytes = Vec::new();
    let closed = loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match chunks.recv_timeout(remaining) {
            Ok(chunk) => bytes.extend(chunk),
            Err(RecvTimeoutError::Disconnected) => break true,
            Err(RecvTimeoutError::Timeout) => break false,
        }
    };
    (String::from_utf8_lossy(&bytes).to_string(), closed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn find_in_path(name: &str) -> Option<PathBuf> {
        let path_var = std::env::var_os("PATH")?;
        for dir in std::env::split_paths(&path_var) {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }

    fn sh_verifier(timeout: Duration) -> Option<ScriptVerifier> {
        find_in_path("sh")?;
        Some(ScriptVerifier::new(vec!["sh".to_string()], timeout))
    }

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).expect("write script");
        path
    }

    #[test]
    fn missing_script_is_process_error() {
        let verifier = ScriptVerifier::new(
            vec!["interpreter-that-does-not-exist".to_string()],
            Duration::from_secs(1),
        );
        let result = verifier.verify(Path::new("/nonexistent/install_v9.sh"));
        assert!(!result.succeeded);
        assert_eq!(result.failure_reason, FailureReason::ProcessError);
        assert!(result.message.contains("not found"));
        assert_eq!(result.duration_ms, 0);
    }

    #[test]
    fn zero_exit_succeeds() {
        let Some(verifier) = sh_verifier(Duration::from_secs(30)) else {
            return;
        };
        let dir = tempfile::tempdir().expect("tempdir");
        let path = script(dir.path(), "ok.sh", "echo installed\nexit 0\n");

        let result = verifier.verify(&path);

        assert!(result.succeeded);
        assert_eq!(result.failure_reason, FailureReason::None);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout.trim(), "installed");
    }

    #[test]
    fn non_zero_exit_keeps_both_streams() {
        let Some(verifier) = sh_verifier(Duration::from_secs(30)) else {
            return;
        };
        let dir = tempfile::tempdir().expect("tempdir");
        let path = script(
            dir.path(),
            "fail.sh",
            "echo progress\necho 'ElementNotFoundError: Next' >&2\nexit 3\n",
        );

        let result = verifier.verify(&path);

        assert!(!result.succeeded);
        assert_eq!(result.failure_reason, FailureReason::NonZeroExit);
        assert_eq!(result.exit_code, Some(3));
        assert!(result.stdout.contains("progress"));
        assert!(result.stderr.contains("ElementNotFoundError"));
        assert!(result.diagnostic().contains("Output: progress"));
    }

    #[test]
    fn timeout_kills_the_script() {
        let Some(verifier) = sh_verifier(Duration::from_secs(1)) else {
            return;
        };
        let dir = tempfile::tempdir().expect("tempdir");
        let path = script(dir.path(), "hang.sh", "echo started\nsleep 30\n");

        let start = Instant::now();
        let result = verifier.verify(&path);

        assert!(start.elapsed() < Duration::from_secs(20));
        assert!(!result.succeeded);
        assert_eq!(result.failure_reason, FailureReason::Timeout);
        assert_eq!(result.exit_code, None);
        assert!(result.diagnostic().contains("timed out"));
    }

    #[test]
    fn background_job_does_not_outlive_the_script() {
        let Some(verifier) = sh_verifier(Duration::from_secs(2)) else {
            return;
        };
        let dir = tempfile::tempdir().expect("tempdir");
        let path = script(dir.path(), "bg.sh", "(sleep 15) &\necho launched\nexit 0\n");

        let start = Instant::now();
        let result = verifier.verify(&path);

        assert!(
            start.elapsed() < Duration::from_secs(8),
            "verify took {:?}",
            start.elapsed()
        );
        assert!(result.succeeded);
        assert_eq!(result.stdout.trim(), "launched");
    }

    #[test]
    fn detached_descendant_holding_output_times_out() {
        let Some(verifier) = sh_verifier(Duration::from_secs(1)) else {
            return;
        };
        if find_in_path("setsid").is_none() {
            return;
        }
        let dir = tempfile::tempdir().expect("tempdir");
        let path = script(
            dir.path(),
            "detached.sh",
            "echo before\nsetsid sleep 15 &\nexit 0\n",
        );

        let start = Instant::now();
        let result = verifier.verify(&path);

        assert!(
            start.elapsed() < Duration::from_secs(8),
            "verify took {:?}",
            start.elapsed()
        );
        assert!(!result.succeeded);
        assert_eq!(result.failure_reason, FailureReason::Timeout);
        assert!(result.stdout.contains("before"));
    }

    #[test]
    fn unresolvable_interpreter_is_process_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = script(dir.path(), "ok.sh", "exit 0\n");
        let verifier = ScriptVerifier::new(
            vec!["interpreter-that-does-not-exist".to_string()],
            Duration::from_secs(1),
        );

        let result = verifier.verify(&path);

        assert_eq!(result.failure_reason, FailureReason::ProcessError);
        assert!(result.message.contains("resolve interpreter"));
    }
}
