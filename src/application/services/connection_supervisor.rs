//! Connection supervisor - owns the gateway session and its reconnect policy

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::domain::traits::{Gateway, GatewayEvent, GatewayFault, SessionInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    ReconnectScheduled,
}

/// Keeps the single gateway session alive.
///
/// Only unreachable-host faults are retried, after a fixed delay and with no
/// cap on attempts. At most one reconnect timer is pending at any time: the
/// state check and the switch to `ReconnectScheduled` happen under one lock.
pub struct ConnectionSupervisor {
    gateway: Arc<dyn Gateway>,
    events: mpsc::Sender<GatewayEvent>,
    reconnect_delay: Duration,
    state: Mutex<ConnectionState>,
    attempts: AtomicU64,
}

impl ConnectionSupervisor {
    pub fn new(gateway: Arc<dyn Gateway>, events: mpsc::Sender<GatewayEvent>, reconnect_delay: Duration) -> Self {
        Self {
            gateway,
            events,
            reconnect_delay,
            state: Mutex::new(ConnectionState::Disconnected),
            attempts: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> ConnectionState {
        *self.lock()
    }

    /// Number of reconnects scheduled since the last successful handshake
    pub fn pending_attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Start a session. Ignored unless disconnected; a pending reconnect
    /// timer owns the next attempt.
    pub async fn login(self: &Arc<Self>) -> Result<(), GatewayFault> {
        if !self.transition(ConnectionState::Disconnected) {
            return Ok(());
        }
        self.connect().await
    }

    /// Called by the armed timer when its delay has elapsed
    pub(crate) async fn fire_reconnect(self: &Arc<Self>) -> Result<(), GatewayFault> {
        if !self.transition(ConnectionState::ReconnectScheduled) {
            return Ok(());
        }
        self.connect().await
    }

    /// Switch `from -> Connecting` under the lock
    fn transition(&self, from: ConnectionState) -> bool {
        let mut state = self.lock();
        if *state != from {
            tracing::debug!("Connect ignored while {:?}", *state);
            return false;
        }
        *state = ConnectionState::Connecting;
        true
    }

    async fn connect(self: &Arc<Self>) -> Result<(), GatewayFault> {
        tracing::info!("Connecting to {} gateway", self.gateway.name());
        match self.gateway.connect(self.events.clone()).await {
            Ok(()) => Ok(()),
            Err(fault) => {
                self.on_fault(fault.clone());
                Err(fault)
            }
        }
    }

    /// Handshake completed
    pub fn on_ready(&self, session: &SessionInfo) {
        let mut state = self.lock();
        if *state == ConnectionState::Connecting {
            *state = ConnectionState::Connected;
            self.attempts.store(0, Ordering::SeqCst);
            tracing::info!("Connected as @{} ({})", session.username, session.id);
        } else {
            tracing::debug!("Ready signal ignored while {:?}", *state);
        }
    }

    /// Protocol-level failure reported by the gateway
    pub fn on_fault(self: &Arc<Self>, fault: GatewayFault) {
        let mut state = self.lock();

        if !fault.kind.is_recoverable() {
            tracing::error!("Gateway fault, not reconnecting: {}", fault);
            if matches!(*state, ConnectionState::Connected | ConnectionState::Connecting) {
                *state = ConnectionState::Disconnected;
            }
            return;
        }

        let current = *state;
        match current {
            ConnectionState::Connected | ConnectionState::Connecting => {
                *state = ConnectionState::ReconnectScheduled;
                drop(state);
                tracing::warn!(
                    "Lost connection to gateway ({}); reconnecting in {}s",
                    fault,
                    self.reconnect_delay.as_secs_f32()
                );
                self.arm_reconnect();
            }
            ConnectionState::ReconnectScheduled => {
                tracing::debug!("Reconnect already pending, ignoring: {}", fault);
            }
            ConnectionState::Disconnected => {
                tracing::debug!("Fault while disconnected, ignoring: {}", fault);
            }
        }
    }

    fn arm_reconnect(self: &Arc<Self>) {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self.reconnect_delay;
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tracing::info!("Reconnect attempt {}", attempt);
            if let Err(e) = this.fire_reconnect().await {
                tracing::debug!("Reconnect attempt {} failed: {}", attempt, e);
            }
        });
    }
}
