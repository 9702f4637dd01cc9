//! Bounded execution of external commands.
//!
//! Every command the monitor runs can hang: `wsl.exe` in particular blocks
//! forever once the VM stops answering. [`run_bounded`] spawns the command,
//! drains stdout and stderr on two separate tasks while waiting for the
//! exit, and kills and reaps the child once the timeout elapses. The child
//! is also spawned with `kill_on_drop` so an error or a cancelled future
//! cannot leave it behind.

use std::{
    process::{ExitStatus, Stdio},
    time::{Duration, Instant},
};

use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::{Child, Command},
    task::JoinHandle,
};

use crate::health::types::ProbeResult;

/// What the probe expects the distribution to print.
pub const EXPECTED_OUTPUT: &str = "ok";

/// How long to wait for the output pipes to close (or a killed child to be
/// reaped) once the main wait is over. Grandchildren may inherit the pipes
/// and keep them open after the direct child exits.
const GRACE: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct BoundedOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

#[derive(Debug)]
pub enum Bounded {
    Exited(BoundedOutput),
    TimedOut,
}

fn drain<R>(reader: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut reader) = reader {
            if let Err(e) = reader.read_to_end(&mut buf).await {
                log::debug!("Stopped reading child output: {e}");
            }
        }
        buf
    })
}

async fn collect(mut handle: JoinHandle<Vec<u8>>) -> Vec<u8> {
    match tokio::time::timeout(GRACE, &mut handle).await {
        Ok(Ok(buf)) => buf,
        Ok(Err(e)) => {
            log::warn!("Output reader task failed: {e}");
            Vec::new()
        }
        Err(_) => {
            handle.abort();
            Vec::new()
        }
    }
}

/// Best effort. Failures to kill are only logged.
async fn terminate(child: &mut Child) {
    let pid = child.id();
    if let Err(e) = child.start_kill() {
        log::debug!("Unable to kill child {pid:?}: {e}");
    }
    if tokio::time::timeout(GRACE, child.wait()).await.is_err() {
        log::warn!("Child {pid:?} was killed but has not exited yet");
    }
}

/// Runs `command` for at most `timeout`. Stdin is closed, stdout and stderr
/// are captured.
pub async fn run_bounded(mut command: Command, timeout: Duration) -> std::io::Result<Bounded> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn()?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => Ok(Bounded::Exited(BoundedOutput {
            status,
            stdout: collect(stdout).await,
            stderr: collect(stderr).await,
        })),
        Ok(Err(e)) => {
            terminate(&mut child).await;
            stdout.abort();
            stderr.abort();
            Err(e)
        }
        Err(_) => {
            terminate(&mut child).await;
            stdout.abort();
            stderr.abort();
            Ok(Bounded::TimedOut)
        }
    }
}

/// `wsl.exe -d <target> -- echo ok`
pub fn probe_command(target: &str) -> Command {
    let mut command = Command::new("wsl.exe");
    command.args(["-d", target, "--", "echo", EXPECTED_OUTPUT]);
    command
}

/// Runs the connectivity probe. Never fails: every outcome, including a
/// command that could not be started, is described by the returned
/// [`ProbeResult`].
pub async fn run_probe(command: Command, timeout: Duration) -> ProbeResult {
    let start = Instant::now();
    let outcome = run_bounded(command, timeout).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(Bounded::Exited(out)) => {
            let output = String::from_utf8_lossy(&out.stdout).trim().to_string();
            let mut error = String::from_utf8_lossy(&out.stderr).trim().to_string();
            let success = out.status.success() && output == EXPECTED_OUTPUT;
            if !success && error.is_empty() {
                error = match out.status.code() {
                    Some(code) if code != 0 => format!("Exited with code {code}"),
                    Some(_) => format!("Unexpected output {output:?}"),
                    None => "Terminated by a signal".to_string(),
                };
            }
            ProbeResult {
                success,
                duration_ms,
                output,
                error,
                timed_out: false,
            }
        }
        Ok(Bounded::TimedOut) => ProbeResult::timed_out(duration_ms, timeout),
        Err(e) => ProbeResult::failed(duration_ms, e),
    }
}
