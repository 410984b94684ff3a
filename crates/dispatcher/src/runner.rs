//! Process Runner — spawn one external command, stream merged output,
//! report exit.

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Grace period between SIGTERM and a hard kill on cancellation.
pub const CANCEL_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// How a command's process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Exited normally with the given exit code.
    Normal(i32),
    /// Killed by a signal, named (e.g. "SIGKILL").
    Signal(String),
    /// The child process could not be started at all.
    SpawnFailure(String),
}

impl Termination {
    /// A spawn failure is reported as normalTermination=false, code=-1.
    pub fn normal_termination(&self) -> bool {
        matches!(self, Termination::Normal(_))
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Termination::Normal(code) => *code,
            Termination::Signal(_) | Termination::SpawnFailure(_) => -1,
        }
    }
}

/// A chunk-then-completion event from a running command.
#[derive(Debug, Clone)]
pub enum RunnerEvent {
    /// A block of merged stdout/stderr bytes, UTF-8 lossy-decoded, delivered
    /// as the OS hands it over rather than line-buffered.
    Chunk(String),
    Completed(Termination),
}

/// Spawn `command` via the shell, stream its merged output, and report
/// completion. Returns immediately; consume `rx` for output and the
/// terminal [`RunnerEvent::Completed`].
///
/// `cancel` lets the caller request termination: SIGTERM first, then a
/// hard kill after [`CANCEL_GRACE_PERIOD`] if the process is still alive.
pub fn run(command: String, workdir: Option<PathBuf>, cancel: CancellationToken) -> mpsc::Receiver<RunnerEvent> {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&command);
        if let Some(dir) = &workdir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(command = %command, error = %e, "failed to spawn command");
                let _ = tx.send(RunnerEvent::Completed(Termination::SpawnFailure(e.to_string()))).await;
                return;
            }
        };

        let pid = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Merge stdout and stderr into one ordered stream by forwarding both
        // into the same channel from two reader tasks. True OS-level
        // interleaving of two separate pipes can't be reconstructed
        // exactly; this delivers chunks as each pipe becomes readable,
        // which is the same best-effort merge any line-buffered `2>&1`
        // redirection provides in practice.
        let out_tx = tx.clone();
        let out_task = stdout.map(|s| tokio::spawn(forward_chunks(s, out_tx)));
        let err_tx = tx.clone();
        let err_task = stderr.map(|s| tokio::spawn(forward_chunks(s, err_tx)));

        let termination = tokio::select! {
            status = child.wait() => status_to_termination(status),
            _ = cancel.cancelled() => {
                cancel_child(pid, &mut child).await
            }
        };

        if let Some(t) = out_task {
            let _ = t.await;
        }
        if let Some(t) = err_task {
            let _ = t.await;
        }

        let _ = tx.send(RunnerEvent::Completed(termination)).await;
    });
    rx
}

async fn forward_chunks(mut reader: impl AsyncRead + Unpin, tx: mpsc::Sender<RunnerEvent>) {
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let text = String::from_utf8_lossy(&buf[..n]).into_owned();
                if tx.send(RunnerEvent::Chunk(text)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(error = %e, "error reading child output");
                break;
            }
        }
    }
}

fn status_to_termination(status: std::io::Result<std::process::ExitStatus>) -> Termination {
    match status {
        Ok(status) => {
            #[cfg(unix)]
            {
                use std::os::unix::process::ExitStatusExt;
                if let Some(signal) = status.signal() {
                    return Termination::Signal(signal_name(signal));
                }
            }
            Termination::Normal(status.code().unwrap_or(-1))
        }
        Err(e) => Termination::SpawnFailure(e.to_string()),
    }
}

#[cfg(unix)]
fn signal_name(signal: i32) -> String {
    Signal::try_from(signal).map(|s| s.to_string()).unwrap_or_else(|_| format!("signal {signal}"))
}

async fn cancel_child(pid: Option<u32>, child: &mut tokio::process::Child) -> Termination {
    if let Some(pid) = pid {
        debug!(pid, "sending SIGTERM to job process");
        let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }

    let graceful = tokio::time::timeout(CANCEL_GRACE_PERIOD, child.wait()).await;
    match graceful {
        Ok(status) => status_to_termination(status),
        Err(_) => {
            warn!(?pid, "grace period elapsed, killing job process");
            let _ = child.kill().await;
            match child.wait().await {
                Ok(status) => status_to_termination(Ok(status)),
                Err(_) => Termination::Signal("SIGKILL".to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn drain(mut rx: mpsc::Receiver<RunnerEvent>) -> (String, Termination) {
        let mut text = String::new();
        let mut termination = None;
        while let Some(event) = rx.recv().await {
            match event {
                RunnerEvent::Chunk(chunk) => text.push_str(&chunk),
                RunnerEvent::Completed(t) => termination = Some(t),
            }
        }
        (text, termination.expect("runner must always emit a Completed event"))
    }

    #[tokio::test]
    async fn merges_stdout_and_reports_normal_exit() {
        let rx = run("echo hello".to_string(), None, CancellationToken::new());
        let (text, termination) = drain(rx).await;
        assert_eq!(text, "hello\n");
        assert_eq!(termination, Termination::Normal(0));
        assert!(termination.normal_termination());
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported() {
        let rx = run("exit 7".to_string(), None, CancellationToken::new());
        let (_, termination) = drain(rx).await;
        assert_eq!(termination, Termination::Normal(7));
        assert!(termination.normal_termination());
    }

    #[tokio::test]
    async fn spawn_failure_reports_code_minus_one() {
        let rx = run(
            "".to_string(),
            Some(PathBuf::from("/does/not/exist")),
            CancellationToken::new(),
        );
        let (_, termination) = drain(rx).await;
        assert_eq!(termination.exit_code(), -1);
        assert!(!termination.normal_termination());
    }

    #[tokio::test]
    async fn cancellation_kills_within_grace_period() {
        let cancel = CancellationToken::new();
        let rx = run("sleep 60".to_string(), None, cancel.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        let start = tokio::time::Instant::now();
        let (_, termination) = drain(rx).await;
        assert!(start.elapsed() < CANCEL_GRACE_PERIOD + Duration::from_secs(1));
        assert!(!termination.normal_termination());
    }
}
