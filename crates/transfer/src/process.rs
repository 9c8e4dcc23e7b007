//! Child process execution with output capture
//!
//! Stdout and stderr are read concurrently as raw byte lines until both reach
//! EOF, so a chatty child never blocks on a full pipe. Bytes that are not
//! valid UTF-8 are replaced rather than dropped. Every line is forwarded to
//! tracing at debug level, handed to an optional observer, and accumulated
//! into one buffer. The child is spawned with `kill_on_drop` so dropping the
//! future (cancellation, timeout) terminates it.

use std::process::Stdio;
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::{AttemptOutput, Result, TransferError};

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn name(self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

/// Spawn `cmd`, wait for it to exit, and return its exit code and output.
///
/// `label` tags the forwarded output lines (usually the credential id).
pub async fn run_and_capture(cmd: Command, label: &str) -> Result<AttemptOutput> {
    run_and_observe(cmd, label, |_| {}).await
}

/// Like [`run_and_capture`], calling `on_line` with every output line as it
/// arrives (trailing newline stripped).
pub async fn run_and_observe<F>(mut cmd: Command, label: &str, mut on_line: F) -> Result<AttemptOutput>
where
    F: FnMut(&str) + Send,
{
    let binary = cmd.as_std().get_program().to_string_lossy().into_owned();
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let started = Instant::now();
    let mut child = cmd.spawn().map_err(|e| TransferError::Spawn {
        binary: binary.clone(),
        reason: e.to_string(),
    })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| TransferError::Io("stdout not captured".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| TransferError::Io("stderr not captured".into()))?;

    let mut stdout = BufReader::new(stdout);
    let mut stderr = BufReader::new(stderr);
    let mut stdout_buf = Vec::new();
    let mut stderr_buf = Vec::new();
    let mut stdout_done = false;
    let mut stderr_done = false;
    let mut output = String::new();

    while !stdout_done || !stderr_done {
        // read_until keeps partial data in the buffer, so losing the race
        // against the other stream drops nothing.
        let (stream, read) = tokio::select! {
            read = stdout.read_until(b'\n', &mut stdout_buf), if !stdout_done => (Stream::Stdout, read),
            read = stderr.read_until(b'\n', &mut stderr_buf), if !stderr_done => (Stream::Stderr, read),
        };
        let (buf, done) = match stream {
            Stream::Stdout => (&mut stdout_buf, &mut stdout_done),
            Stream::Stderr => (&mut stderr_buf, &mut stderr_done),
        };

        match read {
            Ok(0) => *done = true,
            Ok(_) => {
                let text = String::from_utf8_lossy(buf);
                let line = text.trim_end_matches(['\n', '\r']);
                debug!(label, stream = stream.name(), "{line}");
                on_line(line);
                output.push_str(line);
                output.push('\n');
                buf.clear();
            }
            Err(e) => {
                // An undrained pipe would stall the child, so stop it instead.
                warn!(label, stream = stream.name(), error = %e, "output read failed, killing process");
                *done = true;
                if let Err(e) = child.start_kill() {
                    debug!(label, error = %e, "kill after read failure");
                }
            }
        }
    }

    let status = child
        .wait()
        .await
        .map_err(|e| TransferError::Io(format!("waiting for {binary}: {e}")))?;

    let exit_code = status.code();
    if exit_code.is_none() {
        warn!(label, binary, "process terminated by signal");
    }

    Ok(AttemptOutput {
        exit_code,
        output,
        duration: started.elapsed(),
    })
}
