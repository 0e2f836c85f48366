//! Application Ports
//!
//! Trait seams between the application layer and infrastructure. The
//! coordinator talks to the stream through `SubscriptionTransport`, so
//! its state machine is testable with a mock transport.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;

use crate::domain::subscription::SubscriptionSet;

/// Errors surfaced by a subscription transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No connection is currently established.
    #[error("not connected")]
    NotConnected,

    /// Connected but the authentication handshake has not completed.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The request could not be written to the connection.
    #[error("send failed: {0}")]
    Send(String),
}

/// Outbound subscription operations on the market data stream.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SubscriptionTransport: Send + Sync {
    /// Request subscription to every (channel, symbol) pair in the set.
    ///
    /// Success means the request was written to the connection, not that
    /// the server acknowledged it; acknowledgement arrives as a
    /// subscription message on the inbound stream.
    async fn subscribe(&self, set: &SubscriptionSet) -> Result<(), TransportError>;

    /// Request removal of every (channel, symbol) pair in the set.
    async fn unsubscribe(&self, set: &SubscriptionSet) -> Result<(), TransportError>;
}
