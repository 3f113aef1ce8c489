//! Handle for one spawned worker process.

use std::process::Stdio;
use std::time::Duration;

use log::{debug, warn};
use tokio::process::{Child, Command};

/// Owns a spawned worker process and its lifecycle operations.
pub struct WorkerHandle {
    child: Child,
    port: u16,
}

impl WorkerHandle {
    /// Spawn the worker binary with the reserved port as its final argument.
    ///
    /// The worker binds its command channel on loopback only; stdio is
    /// discarded.
    pub fn spawn(binary: &str, args: &[String], port: u16) -> std::io::Result<Self> {
        let child = Command::new(binary)
            .args(args)
            .arg(port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        debug!(
            "Spawned worker on port {} (pid={})",
            port,
            child.id().unwrap_or(0)
        );
        Ok(Self { child, port })
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Whether the process has not yet exited.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Terminate the worker: graceful stop first, then force-kill after the
    /// grace period.
    ///
    /// Safe to call on an already-dead process; "already exited" is success.
    pub async fn shutdown(&mut self, grace: Duration) {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!("Worker on port {} already exited ({})", self.port, status);
                return;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Could not check worker on port {}: {}", self.port, e);
            }
        }

        self.send_term();

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!("Worker on port {} exited ({})", self.port, status);
            }
            Ok(Err(e)) => {
                // wait() failing means the process is gone already.
                debug!("Worker on port {} wait failed: {}", self.port, e);
            }
            Err(_) => {
                warn!(
                    "Worker on port {} did not exit within {:?}, killing",
                    self.port, grace
                );
                if let Err(e) = self.child.kill().await {
                    warn!("Failed to kill worker on port {}: {}", self.port, e);
                }
            }
        }
    }

    /// Send SIGTERM. Tokio's `kill` is SIGKILL-only, so the graceful signal
    /// goes through libc.
    fn send_term(&self) {
        if let Some(pid) = self.child.id() {
            // SAFETY: plain kill(2) on a pid we own.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }
    }
}
