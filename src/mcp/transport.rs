//! Line-delimited JSON-RPC transport.
//!
//! One message per line. Requests are handled concurrently; responses are
//! written by the serving task in completion order, so a slow analysis does
//! not hold up a `ping`.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::protocol::{JsonRpcError, McpRequest, McpResponse, JSONRPC_VERSION};
use crate::types::Result;

const RESPONSE_BUFFER: usize = 64;

/// Anything that can answer MCP requests.
#[async_trait]
pub trait McpHandler: Send + Sync {
    /// `None` for notifications.
    async fn handle_request(&self, request: McpRequest) -> Option<McpResponse>;
}

/// Decode one line into a request, or the error response owed for it.
pub fn decode_line(line: &str) -> std::result::Result<McpRequest, McpResponse> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| McpResponse::error(None, JsonRpcError::parse_error(format!("Parse error: {e}"))))?;
    let id = value.get("id").cloned().filter(|id| !id.is_null());
    let request: McpRequest = serde_json::from_value(value)
        .map_err(|e| McpResponse::error(id.clone(), JsonRpcError::invalid_request(e.to_string())))?;
    if request.jsonrpc != JSONRPC_VERSION {
        return Err(McpResponse::error(
            id,
            JsonRpcError::invalid_request(format!("unsupported jsonrpc version '{}'", request.jsonrpc)),
        ));
    }
    Ok(request)
}

/// Serves a handler over stdin/stdout until EOF or cancellation.
#[derive(Debug)]
pub struct StdioServer<H> {
    handler: Arc<H>,
    cancel: CancellationToken,
}

impl<H: McpHandler + 'static> StdioServer<H> {
    pub fn new(handler: Arc<H>) -> Self {
        Self {
            handler,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops [`serve`](Self::serve) when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub async fn serve(&self) -> Result<()> {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        self.serve_io(stdin, tokio::io::stdout()).await
    }

    /// Serve over arbitrary streams.
    ///
    /// On EOF, requests already in flight are answered before returning. On
    /// cancellation they are aborted.
    pub async fn serve_io<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracing::info!("MCP stdio transport started");
        let mut lines = reader.lines();
        let (tx, mut rx) = mpsc::channel::<McpResponse>(RESPONSE_BUFFER);
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::info!(in_flight = tasks.len(), "transport cancelled");
                    tasks.abort_all();
                    break;
                }
                Some(response) = rx.recv() => {
                    write_response(&mut writer, &response).await?;
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            tracing::error!(error = %e, "request task panicked");
                        }
                    }
                }
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        tracing::debug!(in_flight = tasks.len(), "input closed");
                        break;
                    };
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    tracing::trace!(request = %line, "received");
                    match decode_line(line) {
                        Ok(request) => {
                            let handler = Arc::clone(&self.handler);
                            let tx = tx.clone();
                            tasks.spawn(async move {
                                if let Some(response) = handler.handle_request(request).await {
                                    // Receiver gone means the transport is shutting down.
                                    let _ = tx.send(response).await;
                                }
                            });
                        }
                        Err(response) => {
                            tracing::warn!(line = %line, "rejected malformed message");
                            write_response(&mut writer, &response).await?;
                        }
                    }
                }
            }
        }

        drop(tx);
        while let Some(response) = rx.recv().await {
            write_response(&mut writer, &response).await?;
        }
        while tasks.join_next().await.is_some() {}
        tracing::info!("MCP stdio transport stopped");
        Ok(())
    }
}

async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &McpResponse) -> Result<()> {
    let mut encoded = serde_json::to_vec(response)?;
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}
