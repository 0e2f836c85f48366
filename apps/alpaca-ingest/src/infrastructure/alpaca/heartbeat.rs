//! Connection Liveness Watchdog
//!
//! Alpaca's stream is chatty when markets are open and silent otherwise,
//! so liveness cannot be inferred from data frames alone. The watchdog
//! pings on a fixed cadence and treats ANY inbound frame, data or pong,
//! as proof of life. Only a ping that stays unanswered past the idle
//! timeout declares the connection dead, which hands control to the
//! reconnect policy instead of idling on a dead socket.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Ping cadence and dead-connection threshold.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Interval between outbound pings.
    pub ping_interval: Duration,
    /// How long the socket may stay silent after a ping before the
    /// connection is declared dead.
    pub idle_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(20),
            idle_timeout: Duration::from_secs(20),
        }
    }
}

impl HeartbeatConfig {
    /// Build a config from explicit values.
    #[must_use]
    pub const fn new(ping_interval: Duration, idle_timeout: Duration) -> Self {
        Self {
            ping_interval,
            idle_timeout,
        }
    }
}

/// What the watchdog asks of the connection loop.
#[derive(Debug, Clone)]
pub enum HeartbeatSignal {
    /// Write a ping frame to the socket.
    Ping,
    /// The socket stayed silent past the idle timeout; tear it down.
    Dead,
}

/// Liveness record shared between the watchdog and the read loop.
///
/// The read loop calls [`record_activity`](Self::record_activity) for
/// every inbound frame it sees; the watchdog only consults the record
/// while a ping is outstanding.
#[derive(Debug)]
pub struct LivenessState {
    last_activity: RwLock<Instant>,
    awaiting_pong: AtomicBool,
}

impl Default for LivenessState {
    fn default() -> Self {
        Self::new()
    }
}

impl LivenessState {
    /// Fresh state; the connection counts as just-heard-from.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_activity: RwLock::new(Instant::now()),
            awaiting_pong: AtomicBool::new(false),
        }
    }

    /// Note inbound traffic. Clears any outstanding ping, whether the
    /// frame was the matching pong or ordinary data.
    pub fn record_activity(&self) {
        *self.last_activity.write() = Instant::now();
        self.awaiting_pong.store(false, Ordering::SeqCst);
    }

    /// Note that a ping went out and its answer is pending.
    pub fn ping_sent(&self) {
        self.awaiting_pong.store(true, Ordering::SeqCst);
    }

    /// Whether a ping is outstanding.
    #[must_use]
    pub fn is_awaiting_pong(&self) -> bool {
        self.awaiting_pong.load(Ordering::SeqCst)
    }

    /// Time since the socket last produced a frame.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_activity.read().elapsed()
    }
}

/// Periodic liveness check over a shared [`LivenessState`].
pub struct HeartbeatWatchdog {
    config: HeartbeatConfig,
    state: Arc<LivenessState>,
    signal_tx: mpsc::Sender<HeartbeatSignal>,
    cancel: CancellationToken,
}

impl HeartbeatWatchdog {
    /// Create a watchdog bound to one connection's liveness state.
    #[must_use]
    pub const fn new(
        config: HeartbeatConfig,
        state: Arc<LivenessState>,
        signal_tx: mpsc::Sender<HeartbeatSignal>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            signal_tx,
            cancel,
        }
    }

    /// Tick until cancelled or the connection is declared dead.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.config.ping_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    debug!("liveness watchdog cancelled");
                    return;
                }
                _ = ticker.tick() => {}
            }

            if self.state.is_awaiting_pong() {
                let idle = self.state.idle_for();
                if idle > self.config.idle_timeout {
                    warn!(
                        idle_secs = idle.as_secs(),
                        timeout_secs = self.config.idle_timeout.as_secs(),
                        "no traffic since last ping, declaring connection dead"
                    );
                    let _ = self.signal_tx.send(HeartbeatSignal::Dead).await;
                    return;
                }
            }

            if self.signal_tx.send(HeartbeatSignal::Ping).await.is_err() {
                debug!("signal channel closed, liveness watchdog stopping");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = HeartbeatConfig::default();
        assert_eq!(config.ping_interval, Duration::from_secs(20));
        assert_eq!(config.idle_timeout, Duration::from_secs(20));
    }

    #[test]
    fn any_activity_clears_outstanding_ping() {
        let state = LivenessState::new();
        state.ping_sent();
        assert!(state.is_awaiting_pong());

        state.record_activity();
        assert!(!state.is_awaiting_pong());
    }

    #[tokio::test]
    async fn watchdog_requests_pings_on_cadence() {
        let config = HeartbeatConfig::new(Duration::from_millis(50), Duration::from_secs(1));
        let state = Arc::new(LivenessState::new());
        let (signal_tx, mut signal_rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();

        let watchdog = HeartbeatWatchdog::new(config, state, signal_tx, cancel.clone());
        let handle = tokio::spawn(watchdog.run());

        let signal = tokio::time::timeout(Duration::from_millis(200), signal_rx.recv())
            .await
            .expect("should receive signal")
            .expect("channel should not close");
        assert!(matches!(signal, HeartbeatSignal::Ping));

        cancel.cancel();
        handle.await.expect("task should complete");
    }

    #[tokio::test]
    async fn silent_socket_is_declared_dead() {
        let config = HeartbeatConfig::new(Duration::from_millis(50), Duration::from_millis(100));
        let state = Arc::new(LivenessState::new());
        let (signal_tx, mut signal_rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();

        let watchdog = HeartbeatWatchdog::new(config, state.clone(), signal_tx, cancel.clone());

        state.ping_sent();
        {
            *state.last_activity.write() = Instant::now()
                .checked_sub(Duration::from_millis(200))
                .unwrap();
        }

        let handle = tokio::spawn(watchdog.run());

        let mut declared_dead = false;
        while let Ok(Some(signal)) =
            tokio::time::timeout(Duration::from_millis(500), signal_rx.recv()).await
        {
            if matches!(signal, HeartbeatSignal::Dead) {
                declared_dead = true;
                break;
            }
        }
        assert!(declared_dead, "should declare the connection dead");

        cancel.cancel();
        let _ = tokio::time::timeout(Duration::from_millis(100), handle).await;
    }

    #[tokio::test]
    async fn data_traffic_keeps_connection_alive() {
        let config = HeartbeatConfig::new(Duration::from_millis(30), Duration::from_millis(60));
        let state = Arc::new(LivenessState::new());
        let (signal_tx, mut signal_rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();

        let watchdog = HeartbeatWatchdog::new(config, state.clone(), signal_tx, cancel.clone());
        let handle = tokio::spawn(watchdog.run());

        // Never answer with a pong, only simulate data frames.
        let deadline = Instant::now() + Duration::from_millis(250);
        while Instant::now() < deadline {
            match tokio::time::timeout(Duration::from_millis(100), signal_rx.recv()).await {
                Ok(Some(HeartbeatSignal::Ping)) => state.record_activity(),
                Ok(Some(HeartbeatSignal::Dead)) => panic!("live connection declared dead"),
                Ok(None) | Err(_) => break,
            }
        }

        cancel.cancel();
        handle.await.expect("task should complete");
    }

    #[tokio::test]
    async fn watchdog_stops_on_cancellation() {
        let config = HeartbeatConfig::new(Duration::from_secs(10), Duration::from_secs(10));
        let state = Arc::new(LivenessState::new());
        let (signal_tx, _signal_rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();

        let watchdog = HeartbeatWatchdog::new(config, state, signal_tx, cancel.clone());
        let handle = tokio::spawn(watchdog.run());

        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_millis(100), handle).await;
        assert!(result.is_ok(), "watchdog should shut down on cancellation");
    }
}
