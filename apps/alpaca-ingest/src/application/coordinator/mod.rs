//! Subscription Coordinator
//!
//! Drives the server-side subscription set toward the configured one,
//! one connection epoch at a time. A fresh epoch begins at every
//! `connected` lifecycle event; after the matching `authenticated` event
//! the coordinator waits a fixed short delay (letting the handshake
//! settle) and then issues a single subscribe request. Failed attempts
//! are retried on the same delay, without bound, until the epoch ends or
//! the request goes through.
//!
//! At most one subscribe attempt is ever outstanding per epoch; a new
//! `connected` event cancels any pending attempt for the old epoch.
//! Connection-loss phases (`connecting`, `reconnecting`, `disconnected`)
//! also cancel a pending attempt early rather than being ignored: the
//! socket the attempt was scheduled for is already gone, and the next
//! epoch's `authenticated` event reschedules from scratch.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::dispatch::OutboundEvent;
use crate::application::ports::SubscriptionTransport;
use crate::domain::market_data::{CanonicalMessage, ConnectionPhase};
use crate::domain::subscription::SubscriptionSet;

/// Default settle delay between authentication and the subscribe attempt.
pub const DEFAULT_SUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Converges the server-side subscription set on the desired set.
#[derive(Debug)]
pub struct SubscriptionCoordinator<T: SubscriptionTransport> {
    desired: SubscriptionSet,
    transport: Arc<T>,
    subscribe_delay: Duration,
    /// Set once the subscribe request for the current epoch succeeded.
    subscribed: bool,
    /// Deadline of the pending subscribe attempt, if one is scheduled.
    next_attempt: Option<Instant>,
}

impl<T: SubscriptionTransport> SubscriptionCoordinator<T> {
    /// Create a coordinator for a desired set over a transport.
    #[must_use]
    pub fn new(desired: SubscriptionSet, transport: Arc<T>, subscribe_delay: Duration) -> Self {
        Self {
            desired,
            transport,
            subscribe_delay,
            subscribed: false,
            next_attempt: None,
        }
    }

    /// React to a connection lifecycle phase.
    pub fn on_phase(&mut self, phase: ConnectionPhase) {
        match phase {
            ConnectionPhase::Connected => {
                // New epoch: whatever we had subscribed is gone with the
                // old connection.
                self.subscribed = false;
                self.next_attempt = None;
                debug!("new connection epoch, subscription state cleared");
            }
            ConnectionPhase::Authenticated => {
                if !self.subscribed && self.next_attempt.is_none() {
                    self.next_attempt = Some(Instant::now() + self.subscribe_delay);
                    debug!(delay_ms = self.subscribe_delay.as_millis() as u64, "subscribe scheduled");
                }
            }
            ConnectionPhase::Connecting
            | ConnectionPhase::Disconnected
            | ConnectionPhase::Reconnecting => {
                self.next_attempt = None;
            }
            ConnectionPhase::Subscribed => {}
        }
    }

    /// Issue the pending subscribe attempt.
    ///
    /// On failure the attempt is rescheduled after the same delay; retry
    /// is unbounded within the epoch.
    pub async fn attempt_subscribe(&mut self) {
        self.next_attempt = None;
        if self.subscribed {
            return;
        }
        if self.desired.is_empty() {
            info!("no symbols configured, nothing to subscribe");
            self.subscribed = true;
            return;
        }
        match self.transport.subscribe(&self.desired).await {
            Ok(()) => {
                info!(pairs = self.desired.len(), "subscribe request sent");
                self.subscribed = true;
            }
            Err(err) => {
                warn!(error = %err, "subscribe attempt failed, will retry");
                self.next_attempt = Some(Instant::now() + self.subscribe_delay);
            }
        }
    }

    /// Whether the current epoch's subscribe request has gone through.
    #[must_use]
    pub const fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Whether a subscribe attempt is currently scheduled.
    #[must_use]
    pub const fn has_pending_attempt(&self) -> bool {
        self.next_attempt.is_some()
    }

    /// Run the coordinator against the hub's connection topic until
    /// cancelled.
    pub async fn run(
        mut self,
        mut events: broadcast::Receiver<OutboundEvent>,
        cancel: CancellationToken,
    ) {
        info!(pairs = self.desired.len(), "subscription coordinator started");
        loop {
            let pending = self.next_attempt;
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("subscription coordinator shutting down");
                    break;
                }
                event = events.recv() => {
                    match event {
                        Ok(event) => {
                            if let CanonicalMessage::Connection(conn) = event.message {
                                self.on_phase(conn.phase);
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            // Connection events are rare; lagging here means
                            // the hub capacity is badly undersized.
                            warn!(missed, "coordinator lagged on connection events");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!("connection event channel closed");
                            break;
                        }
                    }
                }
                () = async {
                    match pending {
                        Some(deadline) => tokio::time::sleep_until(deadline).await,
                        None => std::future::pending().await,
                    }
                } => {
                    self.attempt_subscribe().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::application::ports::{MockSubscriptionTransport, TransportError};
    use crate::domain::market_data::SymbolAllowList;

    use super::*;

    fn desired() -> SubscriptionSet {
        SubscriptionSet::desired_for(&SymbolAllowList::new(["AAPL".to_string()]))
    }

    #[tokio::test]
    async fn subscribes_once_after_auth() {
        let mut transport = MockSubscriptionTransport::new();
        transport.expect_subscribe().times(1).returning(|_| Ok(()));

        let mut coord =
            SubscriptionCoordinator::new(desired(), Arc::new(transport), Duration::from_secs(1));

        coord.on_phase(ConnectionPhase::Connected);
        coord.on_phase(ConnectionPhase::Authenticated);
        assert!(coord.has_pending_attempt());

        coord.attempt_subscribe().await;
        assert!(coord.is_subscribed());
        assert!(!coord.has_pending_attempt());
    }

    #[tokio::test]
    async fn repeated_auth_events_schedule_single_attempt() {
        let mut coord = SubscriptionCoordinator::new(
            desired(),
            Arc::new(MockSubscriptionTransport::new()),
            Duration::from_secs(1),
        );

        coord.on_phase(ConnectionPhase::Connected);
        coord.on_phase(ConnectionPhase::Authenticated);
        let first = coord.next_attempt;
        coord.on_phase(ConnectionPhase::Authenticated);

        assert_eq!(coord.next_attempt, first);
    }

    #[tokio::test]
    async fn no_reschedule_once_subscribed() {
        let mut transport = MockSubscriptionTransport::new();
        transport.expect_subscribe().times(1).returning(|_| Ok(()));

        let mut coord =
            SubscriptionCoordinator::new(desired(), Arc::new(transport), Duration::from_secs(1));

        coord.on_phase(ConnectionPhase::Connected);
        coord.on_phase(ConnectionPhase::Authenticated);
        coord.attempt_subscribe().await;

        // A stray authenticated event in the same epoch must not
        // schedule another attempt.
        coord.on_phase(ConnectionPhase::Authenticated);
        assert!(!coord.has_pending_attempt());
    }

    #[tokio::test]
    async fn reconnect_starts_fresh_epoch() {
        let mut transport = MockSubscriptionTransport::new();
        transport.expect_subscribe().times(2).returning(|_| Ok(()));

        let mut coord =
            SubscriptionCoordinator::new(desired(), Arc::new(transport), Duration::from_secs(1));

        coord.on_phase(ConnectionPhase::Connected);
        coord.on_phase(ConnectionPhase::Authenticated);
        coord.attempt_subscribe().await;
        assert!(coord.is_subscribed());

        // Connection drops and comes back.
        coord.on_phase(ConnectionPhase::Connected);
        assert!(!coord.is_subscribed());
        coord.on_phase(ConnectionPhase::Authenticated);
        coord.attempt_subscribe().await;
        assert!(coord.is_subscribed());
    }

    #[tokio::test]
    async fn failed_attempt_is_rescheduled() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        let mut transport = MockSubscriptionTransport::new();
        transport.expect_subscribe().returning(|_| {
            if CALLS.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(TransportError::NotConnected)
            } else {
                Ok(())
            }
        });

        let mut coord =
            SubscriptionCoordinator::new(desired(), Arc::new(transport), Duration::from_secs(1));

        coord.on_phase(ConnectionPhase::Connected);
        coord.on_phase(ConnectionPhase::Authenticated);

        coord.attempt_subscribe().await;
        assert!(!coord.is_subscribed());
        assert!(coord.has_pending_attempt());

        coord.attempt_subscribe().await;
        assert!(coord.is_subscribed());
    }

    #[tokio::test]
    async fn new_epoch_cancels_pending_attempt() {
        let mut coord = SubscriptionCoordinator::new(
            desired(),
            Arc::new(MockSubscriptionTransport::new()),
            Duration::from_secs(1),
        );

        coord.on_phase(ConnectionPhase::Connected);
        coord.on_phase(ConnectionPhase::Authenticated);
        assert!(coord.has_pending_attempt());

        coord.on_phase(ConnectionPhase::Connected);
        assert!(!coord.has_pending_attempt());
    }

    #[tokio::test]
    async fn connection_loss_cancels_pending_attempt() {
        for phase in [
            ConnectionPhase::Connecting,
            ConnectionPhase::Reconnecting,
            ConnectionPhase::Disconnected,
        ] {
            let mut coord = SubscriptionCoordinator::new(
                desired(),
                Arc::new(MockSubscriptionTransport::new()),
                Duration::from_secs(1),
            );

            coord.on_phase(ConnectionPhase::Connected);
            coord.on_phase(ConnectionPhase::Authenticated);
            assert!(coord.has_pending_attempt());

            coord.on_phase(phase);
            assert!(!coord.has_pending_attempt());
        }
    }

    #[tokio::test]
    async fn empty_desired_set_skips_transport() {
        // No expectations on the mock: any subscribe call would panic.
        let transport = Arc::new(MockSubscriptionTransport::new());
        let mut coord =
            SubscriptionCoordinator::new(SubscriptionSet::new(), transport, Duration::from_secs(1));

        coord.on_phase(ConnectionPhase::Connected);
        coord.on_phase(ConnectionPhase::Authenticated);
        coord.attempt_subscribe().await;
        assert!(coord.is_subscribed());
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_subscribes_after_delay() {
        let mut transport = MockSubscriptionTransport::new();
        transport.expect_subscribe().times(1).returning(|_| Ok(()));

        let coord =
            SubscriptionCoordinator::new(desired(), Arc::new(transport), Duration::from_secs(1));

        let (tx, rx) = broadcast::channel(16);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(coord.run(rx, cancel.clone()));

        for phase in [ConnectionPhase::Connected, ConnectionPhase::Authenticated] {
            tx.send(OutboundEvent {
                kind: crate::application::dispatch::EventKind::Connection,
                symbol: None,
                message: CanonicalMessage::Connection(
                    crate::domain::market_data::ConnectionEvent { phase, attempt: 0 },
                ),
            })
            .unwrap();
        }

        // Paused clock: sleeps resolve as soon as all tasks are idle.
        tokio::time::sleep(Duration::from_secs(2)).await;

        cancel.cancel();
        handle.await.unwrap();
    }
}
