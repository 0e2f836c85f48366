//! Stream Client
//!
//! Owns the single WebSocket connection to Alpaca's market data stream:
//! connect, authenticate, serve subscribe requests, read frames, and
//! reconnect with exponential backoff when the connection drops.
//!
//! Decoded data messages and connection lifecycle events flow through one
//! mpsc channel in arrival order, so downstream consumers observe
//! lifecycle transitions interleaved correctly with the data.
//!
//! # Stream URL
//!
//! `wss://stream.data.alpaca.markets/v2/<feed>` where feed is `sip`,
//! `iex`, or `test`. Market data URLs are the same for paper and live
//! trading accounts.
//!
//! # Fatal Errors
//!
//! Authentication rejections (error codes 401-404) are fatal: retrying
//! with the same credentials would fail identically, so the client stops
//! instead of reconnecting.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::application::ports::{SubscriptionTransport, TransportError};
use crate::domain::market_data::{CanonicalMessage, ConnectionEvent, ConnectionPhase};
use crate::domain::subscription::SubscriptionSet;

use super::auth::{AuthError, AuthHandler, Credentials};
use super::codec::{CodecError, JsonCodec};
use super::heartbeat::{HeartbeatConfig, HeartbeatSignal, HeartbeatWatchdog, LivenessState};
use super::messages::{SubscriptionRequest, WireMessage};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the stream client.
#[derive(Debug, thiserror::Error)]
pub enum StreamClientError {
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    ConnectionFailed(String),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Authentication failed. Fatal: the client does not reconnect.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(#[from] AuthError),

    /// Codec error on an unparseable frame.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Connection closed by the server or the stream ended.
    #[error("connection closed")]
    ConnectionClosed,

    /// The canonical message channel closed; the pipeline is gone.
    #[error("message channel closed")]
    ChannelClosed,

    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts exceeded")]
    MaxReconnectAttemptsExceeded,
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the stream client.
#[derive(Debug, Clone)]
pub struct StreamClientConfig {
    /// WebSocket URL.
    pub url: String,
    /// API credentials.
    pub credentials: Credentials,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
    /// Heartbeat configuration.
    pub heartbeat: HeartbeatConfig,
}

impl StreamClientConfig {
    /// Create a new configuration.
    #[must_use]
    pub fn new(url: String, credentials: Credentials) -> Self {
        Self {
            url,
            credentials,
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }

    /// Create configuration for a named feed ("sip", "iex", "test").
    #[must_use]
    pub fn for_feed(credentials: Credentials, feed: &str) -> Self {
        Self::new(
            format!("wss://stream.data.alpaca.markets/v2/{feed}"),
            credentials,
        )
    }
}

// =============================================================================
// Client Commands
// =============================================================================

/// Commands the handle sends to the client task.
#[derive(Debug)]
enum ClientCommand {
    Subscribe(SubscriptionSet, oneshot::Sender<Result<(), TransportError>>),
    Unsubscribe(SubscriptionSet, oneshot::Sender<Result<(), TransportError>>),
}

/// Handle for issuing subscription requests to a running client.
///
/// Cheap to clone. Requests fail fast with the current connection phase
/// when the stream is not ready, so the coordinator can reschedule
/// without waiting on a dead socket.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    cmd_tx: mpsc::Sender<ClientCommand>,
    phase: Arc<RwLock<ConnectionPhase>>,
}

impl StreamHandle {
    /// Current connection phase.
    #[must_use]
    pub fn phase(&self) -> ConnectionPhase {
        *self.phase.read()
    }

    async fn send_command<F>(&self, make: F) -> Result<(), TransportError>
    where
        F: FnOnce(oneshot::Sender<Result<(), TransportError>>) -> ClientCommand,
    {
        match self.phase() {
            ConnectionPhase::Connecting
            | ConnectionPhase::Disconnected
            | ConnectionPhase::Reconnecting => {
                return Err(TransportError::NotConnected);
            }
            ConnectionPhase::Connected => return Err(TransportError::NotAuthenticated),
            ConnectionPhase::Authenticated | ConnectionPhase::Subscribed => {}
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(make(reply_tx))
            .await
            .map_err(|_| TransportError::Send("client task stopped".to_string()))?;
        reply_rx
            .await
            .map_err(|_| TransportError::Send("client task dropped request".to_string()))?
    }
}

#[async_trait]
impl SubscriptionTransport for StreamHandle {
    async fn subscribe(&self, set: &SubscriptionSet) -> Result<(), TransportError> {
        let set = set.clone();
        self.send_command(move |reply| ClientCommand::Subscribe(set, reply))
            .await
    }

    async fn unsubscribe(&self, set: &SubscriptionSet) -> Result<(), TransportError> {
        let set = set.clone();
        self.send_command(move |reply| ClientCommand::Unsubscribe(set, reply))
            .await
    }
}

// =============================================================================
// Stream Client
// =============================================================================

/// WebSocket client for the market data stream.
///
/// Manages the full connection lifecycle: authentication, heartbeat
/// monitoring, subscription writes, and automatic reconnection. The
/// client never resubscribes on its own after a reconnect; the
/// coordinator observes the lifecycle events and drives resubscription.
pub struct StreamClient {
    config: StreamClientConfig,
    codec: JsonCodec,
    msg_tx: mpsc::Sender<CanonicalMessage>,
    cmd_rx: mpsc::Receiver<ClientCommand>,
    phase: Arc<RwLock<ConnectionPhase>>,
    cancel: CancellationToken,
}

impl StreamClient {
    /// Create a new client and its subscription handle.
    #[must_use]
    pub fn new(
        config: StreamClientConfig,
        msg_tx: mpsc::Sender<CanonicalMessage>,
        cancel: CancellationToken,
    ) -> (Self, StreamHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let phase = Arc::new(RwLock::new(ConnectionPhase::Disconnected));
        let handle = StreamHandle {
            cmd_tx,
            phase: Arc::clone(&phase),
        };
        let client = Self {
            config,
            codec: JsonCodec::new(),
            msg_tx,
            cmd_rx,
            phase,
            cancel,
        };
        (client, handle)
    }

    /// Run the connection loop until cancelled or a fatal error occurs.
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationFailed` when the server rejects the
    /// credentials, and `MaxReconnectAttemptsExceeded` when a bounded
    /// reconnect budget runs out. Both are fatal; transient connection
    /// errors are retried internally.
    pub async fn run(mut self) -> Result<(), StreamClientError> {
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                info!("stream client cancelled");
                return Ok(());
            }

            match self.connect_and_run(&mut policy).await {
                Ok(()) => {
                    info!("stream connection closed gracefully");
                    return Ok(());
                }
                Err(err @ StreamClientError::AuthenticationFailed(_)) => {
                    error!(error = %err, "authentication rejected, not reconnecting");
                    Self::publish_phase(
                        &self.phase,
                        &self.msg_tx,
                        ConnectionPhase::Disconnected,
                        policy.attempt_count(),
                    )
                    .await;
                    return Err(err);
                }
                Err(StreamClientError::ChannelClosed) => {
                    info!("pipeline gone, stopping stream client");
                    return Ok(());
                }
                Err(err) => {
                    warn!(error = %err, "stream connection error");
                    Self::publish_phase(
                        &self.phase,
                        &self.msg_tx,
                        ConnectionPhase::Disconnected,
                        policy.attempt_count(),
                    )
                    .await;

                    let Some(delay) = policy.next_delay() else {
                        return Err(StreamClientError::MaxReconnectAttemptsExceeded);
                    };
                    let attempt = policy.attempt_count();
                    info!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting");
                    Self::publish_phase(
                        &self.phase,
                        &self.msg_tx,
                        ConnectionPhase::Reconnecting,
                        attempt,
                    )
                    .await;

                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            info!("stream client cancelled during reconnect delay");
                            return Ok(());
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Update the shared phase and publish the lifecycle event in-band.
    async fn publish_phase(
        phase_slot: &RwLock<ConnectionPhase>,
        msg_tx: &mpsc::Sender<CanonicalMessage>,
        phase: ConnectionPhase,
        attempt: u32,
    ) {
        *phase_slot.write() = phase;
        let event = CanonicalMessage::Connection(ConnectionEvent { phase, attempt });
        let _ = msg_tx.send(event).await;
    }

    /// Connect and process frames until an error or cancellation.
    async fn connect_and_run(
        &mut self,
        policy: &mut ReconnectPolicy,
    ) -> Result<(), StreamClientError> {
        info!(url = %self.config.url, "connecting to market data stream");
        Self::publish_phase(
            &self.phase,
            &self.msg_tx,
            ConnectionPhase::Connecting,
            policy.attempt_count(),
        )
        .await;

        let (ws_stream, _response) = tokio_tungstenite::connect_async(&self.config.url).await?;
        let (mut write, mut read) = ws_stream.split();

        let codec = &self.codec;
        let msg_tx = &self.msg_tx;
        let phase = &self.phase;
        let cancel = &self.cancel;
        let cmd_rx = &mut self.cmd_rx;

        let mut auth_handler = AuthHandler::new(self.config.credentials.clone());

        let liveness = Arc::new(LivenessState::new());
        let (heartbeat_tx, mut heartbeat_rx) = mpsc::channel::<HeartbeatSignal>(10);
        let heartbeat_cancel = CancellationToken::new();
        let watchdog = HeartbeatWatchdog::new(
            self.config.heartbeat.clone(),
            Arc::clone(&liveness),
            heartbeat_tx,
            heartbeat_cancel.clone(),
        );
        let _watchdog_handle = tokio::spawn(watchdog.run());

        let result = loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    break Ok(());
                }
                signal = heartbeat_rx.recv() => {
                    match signal {
                        Some(HeartbeatSignal::Ping) => {
                            liveness.ping_sent();
                            write.send(Message::Ping(vec![].into())).await?;
                        }
                        Some(HeartbeatSignal::Dead) => {
                            warn!("heartbeat timeout, dropping connection");
                            break Err(StreamClientError::ConnectionClosed);
                        }
                        None => {
                            debug!("heartbeat channel closed");
                        }
                    }
                }
                command = cmd_rx.recv() => {
                    let Some(command) = command else {
                        // All handles dropped; keep streaming regardless.
                        continue;
                    };
                    Self::handle_command(&mut write, &auth_handler, command).await;
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            liveness.record_activity();
                            if let Err(err) = Self::handle_text_frame(
                                codec,
                                msg_tx,
                                phase,
                                &text,
                                &mut auth_handler,
                                &mut write,
                                policy,
                            )
                            .await
                            {
                                break Err(err);
                            }
                        }
                        Some(Ok(Message::Pong(_))) => {
                            liveness.record_activity();
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) => {
                            info!("server sent close frame");
                            break Err(StreamClientError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {
                            // Binary frames are not part of this protocol.
                        }
                        Some(Err(err)) => {
                            break Err(err.into());
                        }
                        None => {
                            info!("WebSocket stream ended");
                            break Err(StreamClientError::ConnectionClosed);
                        }
                    }
                }
            }
        };

        heartbeat_cancel.cancel();
        result
    }

    /// Serve one subscription command from the handle.
    async fn handle_command<W>(write: &mut W, auth_handler: &AuthHandler, command: ClientCommand)
    where
        W: SinkExt<Message> + Unpin,
        W::Error: std::fmt::Display,
    {
        let (request, reply) = match command {
            ClientCommand::Subscribe(set, reply) => (SubscriptionRequest::subscribe(&set), reply),
            ClientCommand::Unsubscribe(set, reply) => {
                (SubscriptionRequest::unsubscribe(&set), reply)
            }
        };

        if !auth_handler.is_authenticated() {
            let _ = reply.send(Err(TransportError::NotAuthenticated));
            return;
        }

        let result = match serde_json::to_string(&request) {
            Ok(json) => {
                debug!(
                    quotes = request.quotes.len(),
                    bars = request.bars.len(),
                    statuses = request.statuses.len(),
                    action = %request.action,
                    "sending subscription request"
                );
                write
                    .send(Message::Text(json.into()))
                    .await
                    .map_err(|e| TransportError::Send(e.to_string()))
            }
            Err(e) => Err(TransportError::Send(e.to_string())),
        };

        let _ = reply.send(result);
    }

    /// Process one text frame: control messages drive the handshake,
    /// data messages are forwarded in order.
    #[allow(clippy::too_many_arguments)]
    async fn handle_text_frame<W>(
        codec: &JsonCodec,
        msg_tx: &mpsc::Sender<CanonicalMessage>,
        phase: &RwLock<ConnectionPhase>,
        text: &str,
        auth_handler: &mut AuthHandler,
        write: &mut W,
        policy: &mut ReconnectPolicy,
    ) -> Result<(), StreamClientError>
    where
        W: SinkExt<Message> + Unpin,
        W::Error: std::fmt::Display,
    {
        let messages = codec.decode(text)?;

        for msg in messages {
            match msg {
                WireMessage::Success(success) => {
                    let authenticated = auth_handler.on_success(&success)?;

                    if authenticated {
                        info!("stream authenticated");
                        // A completed handshake proves the endpoint is
                        // healthy; the next disconnect starts the backoff
                        // schedule from the beginning.
                        policy.reset();
                        Self::publish_phase(phase, msg_tx, ConnectionPhase::Authenticated, 0)
                            .await;
                    } else {
                        Self::publish_phase(
                            phase,
                            msg_tx,
                            ConnectionPhase::Connected,
                            policy.attempt_count(),
                        )
                        .await;

                        let auth_request = auth_handler.create_auth_request();
                        let json = serde_json::to_string(&auth_request).map_err(|e| {
                            StreamClientError::ConnectionFailed(format!(
                                "failed to serialize auth: {e}"
                            ))
                        })?;
                        write.send(Message::Text(json.into())).await.map_err(|e| {
                            StreamClientError::ConnectionFailed(format!(
                                "failed to send auth: {e}"
                            ))
                        })?;
                    }
                }
                WireMessage::Error(error_msg) => {
                    error!(code = error_msg.code, msg = %error_msg.msg, "stream error");

                    if error_msg.is_auth_error() && !auth_handler.is_authenticated() {
                        return Err(auth_handler.on_error(&error_msg).into());
                    }
                    if error_msg.is_rate_limit_error() {
                        warn!(code = error_msg.code, "rate limited by stream");
                    }
                }
                WireMessage::Subscription(sub) => {
                    debug!(pairs = sub.pair_count(), "subscription confirmed");
                    Self::publish_phase(phase, msg_tx, ConnectionPhase::Subscribed, 0).await;
                }
                data => {
                    if let Some(canonical) = data.into_canonical() {
                        msg_tx
                            .send(canonical)
                            .await
                            .map_err(|_| StreamClientError::ChannelClosed)?;
                    } else {
                        trace!("control message with no canonical form");
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> StreamClientConfig {
        let creds = Credentials::new("key", "secret").unwrap();
        StreamClientConfig::for_feed(creds, "test")
    }

    #[test]
    fn config_for_feed_builds_url() {
        let config = test_config();
        assert_eq!(config.url, "wss://stream.data.alpaca.markets/v2/test");
    }

    #[test]
    fn new_client_starts_disconnected() {
        let (msg_tx, _msg_rx) = mpsc::channel(8);
        let (_client, handle) = StreamClient::new(test_config(), msg_tx, CancellationToken::new());

        assert_eq!(handle.phase(), ConnectionPhase::Disconnected);
    }

    #[tokio::test]
    async fn handle_fails_fast_when_disconnected() {
        let (msg_tx, _msg_rx) = mpsc::channel(8);
        let (_client, handle) = StreamClient::new(test_config(), msg_tx, CancellationToken::new());

        let set = SubscriptionSet::new();
        let result = handle.subscribe(&set).await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn handle_fails_fast_pre_auth() {
        let (msg_tx, _msg_rx) = mpsc::channel(8);
        let (client, handle) = StreamClient::new(test_config(), msg_tx, CancellationToken::new());
        *client.phase.write() = ConnectionPhase::Connected;

        let set = SubscriptionSet::new();
        let result = handle.subscribe(&set).await;
        assert!(matches!(result, Err(TransportError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn handle_errors_when_client_task_gone() {
        let (msg_tx, _msg_rx) = mpsc::channel(8);
        let (client, handle) = StreamClient::new(test_config(), msg_tx, CancellationToken::new());
        *client.phase.write() = ConnectionPhase::Authenticated;
        drop(client);

        let set = SubscriptionSet::new();
        let result = handle.subscribe(&set).await;
        assert!(matches!(result, Err(TransportError::Send(_))));
    }

    #[tokio::test]
    async fn auth_rejection_is_fatal() {
        let (msg_tx, _msg_rx) = mpsc::channel(8);
        let phase = RwLock::new(ConnectionPhase::Connected);
        let mut auth_handler = AuthHandler::new(Credentials::new("key", "secret").unwrap());
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
        let mut write = futures_util::sink::drain();

        let frame = r#"{"T":"error","code":402,"msg":"auth failed"}"#;
        let result = StreamClient::handle_text_frame(
            &JsonCodec::new(),
            &msg_tx,
            &phase,
            frame,
            &mut auth_handler,
            &mut write,
            &mut policy,
        )
        .await;

        assert!(matches!(
            result,
            Err(StreamClientError::AuthenticationFailed(
                AuthError::InvalidCredentials
            ))
        ));
    }

    #[tokio::test]
    async fn post_auth_errors_are_not_fatal() {
        let (msg_tx, _msg_rx) = mpsc::channel(8);
        let phase = RwLock::new(ConnectionPhase::Authenticated);
        let mut auth_handler = AuthHandler::new(Credentials::new("key", "secret").unwrap());
        let connected = serde_json::from_str(r#"{"T":"success","msg":"connected"}"#).unwrap();
        let authenticated =
            serde_json::from_str(r#"{"T":"success","msg":"authenticated"}"#).unwrap();
        let _ = auth_handler.on_success(&connected).unwrap();
        let _ = auth_handler.on_success(&authenticated).unwrap();
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
        let mut write = futures_util::sink::drain();

        let frame = r#"{"T":"error","code":405,"msg":"symbol limit exceeded"}"#;
        let result = StreamClient::handle_text_frame(
            &JsonCodec::new(),
            &msg_tx,
            &phase,
            frame,
            &mut auth_handler,
            &mut write,
            &mut policy,
        )
        .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn authenticated_ack_resets_backoff_and_publishes_phase() {
        let (msg_tx, mut msg_rx) = mpsc::channel(8);
        let phase = RwLock::new(ConnectionPhase::Connected);
        let mut auth_handler = AuthHandler::new(Credentials::new("key", "secret").unwrap());
        let connected = serde_json::from_str(r#"{"T":"success","msg":"connected"}"#).unwrap();
        let _ = auth_handler.on_success(&connected).unwrap();
        let _ = auth_handler.create_auth_request();
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
        let _ = policy.next_delay();
        let _ = policy.next_delay();
        let mut write = futures_util::sink::drain();

        let frame = r#"{"T":"success","msg":"authenticated"}"#;
        StreamClient::handle_text_frame(
            &JsonCodec::new(),
            &msg_tx,
            &phase,
            frame,
            &mut auth_handler,
            &mut write,
            &mut policy,
        )
        .await
        .unwrap();

        assert_eq!(policy.attempt_count(), 0);
        assert_eq!(*phase.read(), ConnectionPhase::Authenticated);

        let event = msg_rx.recv().await.unwrap();
        let CanonicalMessage::Connection(conn) = event else {
            panic!("expected connection event");
        };
        assert_eq!(conn.phase, ConnectionPhase::Authenticated);
    }
}
