//! Synchronous request/reply client for worker command channels, plus the
//! readiness prober.

use std::io;
use std::time::Duration;

use log::debug;
use serde_json::{Value, json};
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::time::Instant;
use umbra_protocol::wire;

use crate::error::ProxyError;

/// How long each individual readiness probe may take.
const PROBE_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(2);
/// Pause between readiness probe attempts.
const PROBE_INTERVAL: Duration = Duration::from_millis(500);

/// Proxies one message pair at a time to a worker's loopback address.
///
/// Each exchange opens a fresh connection: strict request/reply, no
/// pipelining. The payload passes through opaquely in both directions.
#[derive(Debug, Clone)]
pub struct WorkerClient {
    /// Per-call deadline for forwarded commands.
    timeout: Duration,
}

impl WorkerClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Send one message and wait for the single reply.
    ///
    /// No retries here: the readiness prober retries, ordinary command
    /// forwarding does not.
    pub async fn send(&self, port: u16, message: &Value) -> Result<Value, ProxyError> {
        self.send_with_timeout(port, message, self.timeout).await
    }

    async fn send_with_timeout(
        &self,
        port: u16,
        message: &Value,
        deadline: Duration,
    ) -> Result<Value, ProxyError> {
        match tokio::time::timeout(deadline, exchange(port, message)).await {
            Ok(result) => result,
            Err(_) => Err(ProxyError::Timeout(deadline)),
        }
    }

    /// Poll the worker with `ping` until it answers a success envelope or
    /// the hard deadline elapses. Returns whether the worker became ready.
    pub async fn wait_for_ready(&self, port: u16, deadline: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            match self
                .send_with_timeout(port, &json!({"command": "ping"}), PROBE_ATTEMPT_TIMEOUT)
                .await
            {
                Ok(response)
                    if response
                        .get("success")
                        .and_then(Value::as_bool)
                        .unwrap_or(false) =>
                {
                    return true;
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Readiness probe on port {} not answered yet: {}", port, e);
                }
            }
            tokio::time::sleep(PROBE_INTERVAL).await;
        }
        false
    }
}

/// One connect / write / read cycle.
async fn exchange(port: u16, message: &Value) -> Result<Value, ProxyError> {
    let stream = TcpStream::connect(("127.0.0.1", port))
        .await
        .map_err(|source| ProxyError::Unreachable { port, source })?;
    let (read_half, mut write_half) = stream.into_split();

    wire::write_message(&mut write_half, message)
        .await
        .map_err(|source| ProxyError::Unreachable { port, source })?;

    let mut reader = BufReader::new(read_half);
    match wire::read_message::<_, Value>(&mut reader).await {
        Ok(Some(response)) => Ok(response),
        Ok(None) => Err(ProxyError::Protocol(
            "connection closed before a response arrived".to_string(),
        )),
        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
            Err(ProxyError::Protocol(e.to_string()))
        }
        Err(source) => Err(ProxyError::Unreachable { port, source }),
    }
}
