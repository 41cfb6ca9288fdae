//! Microphone backed by an external recorder process
//!
//! The recorder encodes the default input device and writes the stream to
//! stdout. Releasing the lease sends SIGTERM so the recorder can finish its
//! container and exit on its own. The child is spawned with `kill_on_drop`,
//! which covers a recorder that ignores the request and every other path.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::SessionError;

use super::{AudioChunk, CaptureDevice, Microphone, MicrophoneLease};

const READ_CHUNK: usize = 16 * 1024;

/// Microphone that records by spawning a command line
#[derive(Debug, Clone)]
pub struct RecorderMicrophone {
    program: String,
    args: Vec<String>,
}

impl RecorderMicrophone {
    /// Build from a full command line: program followed by its arguments
    pub fn new(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

#[async_trait]
impl Microphone for RecorderMicrophone {
    async fn acquire(&self) -> Result<MicrophoneLease, SessionError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                warn!(program = %self.program, ?e, "failed to start recorder");
                SessionError::PermissionDenied(format!("could not start {}: {e}", self.program))
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            SessionError::PermissionDenied("recorder has no output stream".into())
        })?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(forward_output(stdout, tx));

        info!(pid = child.id(), program = %self.program, "recorder started");
        Ok(MicrophoneLease::new(rx, RecorderProcess { child }))
    }
}

/// Running recorder child
struct RecorderProcess {
    child: Child,
}

impl CaptureDevice for RecorderProcess {
    fn stop(&mut self) {
        // None once the child has been reaped
        let Some(pid) = self.child.id() else {
            return;
        };

        #[cfg(unix)]
        {
            // SAFETY: kill(2) has no memory-safety preconditions; the pid
            // belongs to our unreaped child, so it cannot have been reused.
            let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
            if rc == 0 {
                debug!(pid, "recorder asked to stop");
                return;
            }
            warn!(pid, error = %std::io::Error::last_os_error(), "failed to signal recorder");
        }

        if let Err(e) = self.child.start_kill() {
            warn!(pid, ?e, "failed to kill recorder");
        }
    }
}

/// Forward recorder output as chunks until the stream closes
async fn forward_output(mut stdout: ChildStdout, tx: mpsc::UnboundedSender<AudioChunk>) {
    let mut total = 0usize;
    loop {
        let mut buf = vec![0u8; READ_CHUNK];
        match stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                buf.truncate(n);
                total += n;
                if tx.send(buf).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(?e, "recorder output read failed");
                break;
            }
        }
    }
    debug!(bytes = total, "recorder output closed");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_empty_command_is_rejected() {
        assert!(RecorderMicrophone::new(&[]).is_none());
    }

    #[tokio::test]
    async fn test_missing_program_is_permission_denied() {
        let mic = RecorderMicrophone::new(&["definitely-not-a-recorder-binary".to_string()]).unwrap();
        let err = mic.acquire().await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_recorder_output_becomes_chunks() {
        let mic = RecorderMicrophone::new(&[
            "sh".to_string(),
            "-c".to_string(),
            "printf webm-bytes".to_string(),
        ])
        .unwrap();
        let lease = mic.acquire().await.unwrap();
        // Let the short-lived process write before the lease stops it
        tokio::time::sleep(Duration::from_millis(200)).await;

        let chunks = lease.release(Duration::from_secs(2)).await;
        assert_eq!(chunks.concat(), b"webm-bytes".to_vec());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_written_on_stop_is_captured() {
        // Stands in for a muxer that writes its trailer when terminated
        let script = "trap 'printf TRAILER; exit 0' INT TERM; printf HEADER; \
                      while :; do sleep 0.05; done";
        let mic = RecorderMicrophone::new(&["sh".to_string(), "-c".to_string(), script.to_string()])
            .unwrap();
        let lease = mic.acquire().await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let chunks = lease.release(Duration::from_secs(2)).await;
        assert_eq!(String::from_utf8(chunks.concat()).unwrap(), "HEADERTRAILER");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_recorder_ignoring_stop_is_bounded() {
        let script = "trap '' INT TERM; printf HEADER; while :; do sleep 0.05; done";
        let mic = RecorderMicrophone::new(&["sh".to_string(), "-c".to_string(), script.to_string()])
            .unwrap();
        let lease = mic.acquire().await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let started = std::time::Instant::now();
        let chunks = lease.release(Duration::from_millis(500)).await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(chunks.concat(), b"HEADER".to_vec());
    }
}
