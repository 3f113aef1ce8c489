//! The worker serve loop.
//!
//! Binds loopback only and serves strict request/reply: one connection at a
//! time, one response line per request line. The manager is the only client
//! and never pipelines.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use umbra_protocol::{CommandRequest, Envelope, wire};

use crate::commands::{CommandRegistry, WorkerContext};

/// Bind the command channel and serve until the process is terminated.
pub async fn serve(port: u16, registry: CommandRegistry) -> Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("binding command channel on 127.0.0.1:{}", port))?;
    info!("Worker listening on 127.0.0.1:{}", port);

    let mut ctx = WorkerContext::default();
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Accept failed: {}", e);
                continue;
            }
        };
        debug!("Connection from {}", peer);
        if let Err(e) = serve_connection(stream, &registry, &mut ctx).await {
            warn!("Connection ended with error: {:#}", e);
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    registry: &CommandRegistry,
    ctx: &mut WorkerContext,
) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    loop {
        let request: CommandRequest = match wire::read_message(&mut reader).await {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(()), // peer closed
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                // Malformed request still gets a reply; the channel is
                // request/reply and the peer is waiting.
                wire::write_message(
                    &mut write_half,
                    &Envelope::err(format!("malformed request: {}", e)),
                )
                .await
                .context("replying to malformed request")?;
                continue;
            }
            Err(e) => return Err(e).context("reading request"),
        };

        let response = registry.dispatch(ctx, request);
        wire::write_message(&mut write_half, &response)
            .await
            .context("writing response")?;
    }
}
