//! Alpaca WebSocket Adapter
//!
//! Implements the market data stream client and its supporting pieces:
//!
//! - `messages`: Wire message types (JSON) and canonical conversion
//! - `codec`: Tolerant batch decoding
//! - `auth`: Authentication handshake state machine
//! - `heartbeat`: Connection liveness monitoring
//! - `reconnect`: Exponential backoff policy
//! - `client`: Connection lifecycle and frame loop

pub mod auth;
pub mod client;
pub mod codec;
pub mod heartbeat;
pub mod messages;
pub mod reconnect;

pub use auth::Credentials;
pub use client::{StreamClient, StreamClientConfig, StreamClientError, StreamHandle};
