//! The four client operations over one registry.

use greennet_shared::{DeliveredMessage, OutboundMessage};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::ServerConfig;
use crate::dispatch::{dispatch, DispatchReport};
use crate::error::RelayError;
use crate::registry::Registry;
use crate::token::Token;

/// Relay state shared by every request handler and the janitor.
pub struct Relay {
    registry: Registry,
    poll_timeout: Duration,
    idle_timeout: Duration,
    max_open_channels: usize,
}

impl Relay {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            registry: Registry::new(config.position_seed),
            poll_timeout: config.poll_timeout,
            idle_timeout: config.idle_timeout,
            max_open_channels: config.max_open_channels,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn register(&self) -> Result<Token, RelayError> {
        let session = self.registry.create()?;
        tracing::info!(
            "Session {} registered at {:?} ({} live)",
            session.token(),
            session.position(),
            self.registry.len()
        );
        Ok(session.token().clone())
    }

    /// Replace the session's open set. Returns the number of distinct channels.
    pub fn open(&self, token: &str, channels: &[u16]) -> Result<usize, RelayError> {
        let session = self.registry.lookup(token)?;
        let stored = session.set_open_channels(channels, self.max_open_channels)?;
        tracing::debug!(
            "Session {} listening on {} channels",
            session.token(),
            stored
        );
        Ok(stored)
    }

    /// Drain the mailbox, or wait up to the poll timeout for messages.
    pub async fn listen(&self, token: &str) -> Result<Vec<DeliveredMessage>, RelayError> {
        // The handle keeps the session alive for this call even if the
        // janitor evicts it meanwhile; the registry lock is not held.
        let session = self.registry.lookup(token)?;
        Ok(session.listen(self.poll_timeout).await)
    }

    pub fn transmit(
        &self,
        token: &str,
        messages: &[OutboundMessage],
    ) -> Result<DispatchReport, RelayError> {
        let sender = self.registry.lookup(token)?;
        let report = dispatch(&self.registry, &sender, messages);
        tracing::debug!(
            "Session {} transmitted {} messages: {} delivered to {} sessions, {} woken",
            sender.token(),
            messages.len(),
            report.delivered,
            report.recipients,
            report.woken
        );
        Ok(report)
    }

    /// Evict sessions idle past the idle timeout. Returns how many went.
    pub fn sweep(&self, now: Instant) -> usize {
        let evicted = self.registry.evict_idle(now, self.idle_timeout);
        for session in &evicted {
            tracing::info!("Session {} evicted after inactivity", session.token());
        }
        evicted.len()
    }
}
