//! Output draining for supervised processes.
//!
//! Each child gets two background tasks, one per pipe. A task exclusively
//! owns its stream handle, forwards every line to the parent's matching
//! stream prefixed with the process name, and exits when the stream reaches
//! EOF. Leaving a pipe unread can stall the child once the pipe buffer
//! fills, so the tasks run for the whole life of the process and never
//! participate in control decisions.

use std::fmt;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::debug;

/// Stream type (stdout or stderr).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamType::Stdout => write!(f, "stdout"),
            StreamType::Stderr => write!(f, "stderr"),
        }
    }
}

/// Take the child's stdout/stderr pipes and spawn a drainer task for each.
///
/// Returns the task handles so the owner can await them after the process
/// exits. Pipes that were not captured are skipped.
pub fn spawn_output_drainers(name: &str, child: &mut Child) -> Vec<JoinHandle<()>> {
    let mut tasks = Vec::with_capacity(2);

    if let Some(stdout) = child.stdout.take() {
        tasks.push(tokio::spawn(drain_stream(
            stdout,
            name.to_string(),
            StreamType::Stdout,
        )));
    }

    if let Some(stderr) = child.stderr.take() {
        tasks.push(tokio::spawn(drain_stream(
            stderr,
            name.to_string(),
            StreamType::Stderr,
        )));
    }

    tasks
}

async fn drain_stream(
    stream: impl AsyncRead + Unpin + Send + 'static,
    name: String,
    stream_type: StreamType,
) {
    let reader = BufReader::new(stream);
    let mut lines = reader.lines();
    let mut line_count = 0u64;

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                line_count += 1;
                forward_line(&name, stream_type, &line);
            }
            Ok(None) => break, // EOF: child closed the pipe
            Err(e) => {
                debug!(
                    process = %name,
                    stream = %stream_type,
                    error = %e,
                    "Error reading from child stream"
                );
                break;
            }
        }
    }

    debug!(
        process = %name,
        stream = %stream_type,
        lines = line_count,
        "Output drainer finished"
    );
}

/// Write one prefixed line to the parent stream matching the child stream.
///
/// Write errors (e.g. a closed pipe on the parent side) are swallowed: losing
/// a log line must never take down the drainer or the child.
fn forward_line(name: &str, stream_type: StreamType, line: &str) {
    match stream_type {
        StreamType::Stdout => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            let _ = writeln!(out, "[{}] {}", name, line);
            let _ = out.flush();
        }
        StreamType::Stderr => {
            let stderr = std::io::stderr();
            let mut err = stderr.lock();
            let _ = writeln!(err, "[{}] {}", name, line);
            let _ = err.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_type_display() {
        assert_eq!(StreamType::Stdout.to_string(), "stdout");
        assert_eq!(StreamType::Stderr.to_string(), "stderr");
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_drainers_finish_at_eof() {
        use std::process::Stdio;
        use tokio::process::Command;

        let mut child = Command::new("sh")
            .arg("-c")
            .arg("echo out-line; echo err-line >&2")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();

        let tasks = spawn_output_drainers("test", &mut child);
        assert_eq!(tasks.len(), 2);

        child.wait().await.unwrap();
        for task in tasks {
            tokio::time::timeout(std::time::Duration::from_secs(5), task)
                .await
                .expect("drainer did not finish after child exit")
                .unwrap();
        }
    }
}
