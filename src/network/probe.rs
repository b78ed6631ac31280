//! TCP reachability probe used as the default connectivity source.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tracing::trace;

use super::source::{ConnectivitySource, ConnectivityState, SourceCallback, Unsubscribe};
use crate::error::OffsyncError;

/// Polls a TCP endpoint and reports each result.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    target: String,
    interval: Duration,
    timeout: Duration,
}

impl TcpProbe {
    /// Probe `target` (host:port) every `interval`, giving each attempt
    /// `timeout` to connect.
    #[must_use]
    pub fn new(target: impl Into<String>, interval: Duration, timeout: Duration) -> Self {
        Self {
            target: target.into(),
            interval,
            timeout,
        }
    }

    /// The probed endpoint.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Attempt one connection.
    pub async fn check(&self) -> bool {
        probe(&self.target, self.timeout).await
    }

    fn observation(&self, online: bool) -> ConnectivityState {
        ConnectivityState {
            online,
            transport: Some(format!("tcp:{}", self.target)),
        }
    }
}

async fn probe(target: &str, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(target)).await,
        Ok(Ok(_))
    )
}

impl ConnectivitySource for TcpProbe {
    fn current_state(&self) -> Option<ConnectivityState> {
        None
    }

    fn subscribe(&self, callback: SourceCallback) -> Result<Unsubscribe, OffsyncError> {
        let handle = Handle::try_current()
            .map_err(|e| OffsyncError::Network(format!("probe needs a tokio runtime: {e}")))?;

        let probe_cfg = self.clone();
        let task = handle.spawn(async move {
            loop {
                let online = probe(&probe_cfg.target, probe_cfg.timeout).await;
                trace!(target = %probe_cfg.target, online, "probe result");
                callback(probe_cfg.observation(online));
                tokio::time::sleep(probe_cfg.interval).await;
            }
        });

        Ok(Box::new(move || task.abort()))
    }
}
