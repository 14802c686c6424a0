//! Bounded-retry startup connection.
//!
//! State machine: `Connecting{attempt}` moves to `Connected` on a successful
//! probe, or to `Failed` once the attempt budget is spent. A missing API key
//! fails immediately without probing.

use std::time::Duration;

use super::StashGateway;
use crate::types::{Error, Result, StashConfig};

/// Where the startup connection currently stands.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Connecting { attempt: u32 },
    Connected { version: String },
    Failed { attempts: u32, last_error: Error },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }
}

/// Drives the startup probe against a gateway.
#[derive(Debug, Clone)]
pub struct Connector {
    endpoint: String,
    has_api_key: bool,
    max_attempts: u32,
    delay: Duration,
    state: ConnectionState,
}

impl Connector {
    pub fn new(config: &StashConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            has_api_key: !config.api_key.trim().is_empty(),
            max_attempts: config.connect_retries.max(1),
            delay: config.connect_delay,
            state: ConnectionState::Connecting { attempt: 0 },
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Probe `gateway` until it answers or the attempt budget is spent.
    ///
    /// Sleeps `connect_delay` between attempts, never after the last one.
    /// Returns the gateway on success; the error is startup-fatal.
    pub async fn connect<G: StashGateway>(&mut self, gateway: G) -> Result<G> {
        if !self.has_api_key {
            let err = Error::config("STASH_API_KEY is required");
            self.state = ConnectionState::Failed {
                attempts: 0,
                last_error: err.clone(),
            };
            tracing::error!("refusing to connect: STASH_API_KEY is not set");
            return Err(err);
        }

        let mut last_error = Error::internal("no connection attempt made");
        for attempt in 1..=self.max_attempts {
            self.state = ConnectionState::Connecting { attempt };
            tracing::info!(
                attempt,
                max = self.max_attempts,
                endpoint = %self.endpoint,
                "connecting to stash"
            );
            match gateway.version().await {
                Ok(version) => {
                    tracing::info!(endpoint = %self.endpoint, %version, "connected to stash");
                    self.state = ConnectionState::Connected { version };
                    return Ok(gateway);
                }
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "connection attempt failed");
                    last_error = err;
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.delay).await;
                    }
                }
            }
        }

        tracing::error!(
            attempts = self.max_attempts,
            error = %last_error,
            "failed to connect to stash"
        );
        self.state = ConnectionState::Failed {
            attempts: self.max_attempts,
            last_error: last_error.clone(),
        };
        Err(last_error)
    }
}
