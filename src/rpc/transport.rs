//! TCP transport layer for the RPC server.
//!
//! Newline-delimited JSON framing. Each connection is handled in its own task
//! and also receives daemon events as JSON-RPC notifications.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::methods::MethodHandler;
use super::protocol::{Notification, Request, Response};

pub struct Transport {
    bind_addr: SocketAddr,
    handler: Arc<MethodHandler>,
}

impl Transport {
    pub fn new(bind_addr: SocketAddr, handler: MethodHandler) -> Self {
        Self {
            bind_addr,
            handler: Arc::new(handler),
        }
    }

    /// Accept connections until `shutdown` is cancelled.
    pub async fn listen(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "RPC server listening");

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            debug!(peer = %peer_addr, "Client connected");
                            let handler = self.handler.clone();
                            let shutdown = shutdown.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, peer_addr, handler, shutdown).await {
                                    debug!(peer = %peer_addr, error = %e, "Connection error");
                                }
                                debug!(peer = %peer_addr, "Client disconnected");
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("RPC server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<MethodHandler>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut events = handler.subscribe();
    // read_until appends, so a read cancelled by an event branch keeps its
    // partial frame in `frame`.
    let mut frame = Vec::new();

    loop {
        tokio::select! {
            read = reader.read_until(b'\n', &mut frame) => {
                if read? == 0 {
                    // EOF - client disconnected
                    break;
                }
                let response = match std::str::from_utf8(&frame) {
                    Ok(line) => process_line(&handler, peer_addr, line.trim()).await,
                    Err(e) => {
                        warn!(peer = %peer_addr, error = %e, "Request is not valid UTF-8");
                        Some(Response::parse_error())
                    }
                };
                frame.clear();
                if let Some(response) = response {
                    write_json(&mut writer, &response).await?;
                }
            }
            event = events.recv() => match event {
                Ok(event) => write_json(&mut writer, &Notification::from_event(&event)).await?,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(peer = %peer_addr, skipped, "Client lagging behind events");
                }
                Err(RecvError::Closed) => break,
            },
            _ = shutdown.cancelled() => break,
        }
    }

    Ok(())
}

/// Handle one framed line. Returns None when no response is due.
async fn process_line(
    handler: &MethodHandler,
    peer_addr: SocketAddr,
    line: &str,
) -> Option<Response> {
    if line.is_empty() {
        return None;
    }

    let request = match serde_json::from_str::<Request>(line) {
        Ok(request) => request,
        Err(e) => {
            warn!(peer = %peer_addr, error = %e, "Parse error");
            return Some(Response::parse_error());
        }
    };

    if let Err(msg) = request.validate() {
        warn!(peer = %peer_addr, error = msg, "Invalid request");
        let id = request.id.clone().unwrap_or(serde_json::Value::Null);
        return Some(Response::invalid_request(id));
    }

    if request.is_notification() {
        debug!(peer = %peer_addr, method = %request.method, "Notification received");
        handler.handle(request).await;
        return None;
    }

    Some(handler.handle(request).await)
}

async fn write_json<W, T>(writer: &mut W, message: &T) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let mut json = serde_json::to_string(message)?;
    json.push('\n');
    writer.write_all(json.as_bytes()).await?;
    Ok(())
}
