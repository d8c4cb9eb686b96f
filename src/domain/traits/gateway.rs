use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::application::errors::BotError;
use crate::domain::entities::{ChannelRef, InboundMessage, Member, OutboundMessage};

/// Classification of a protocol-level failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// Name resolution failed; the gateway host cannot be reached right now
    HostUnreachable,
    Timeout,
    Unauthorized,
    Protocol,
    Other,
}

impl FaultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultKind::HostUnreachable => "host unreachable",
            FaultKind::Timeout => "timeout",
            FaultKind::Unauthorized => "unauthorized",
            FaultKind::Protocol => "protocol",
            FaultKind::Other => "other",
        }
    }

    /// Only unreachable-host faults are treated as transient
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FaultKind::HostUnreachable)
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct GatewayFault {
    pub kind: FaultKind,
    pub message: String,
}

impl GatewayFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn host_unreachable(message: impl Into<String>) -> Self {
        Self::new(FaultKind::HostUnreachable, message)
    }
}

/// Identity reported by the gateway once the handshake completes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: String,
    pub username: String,
}

/// Lifecycle and traffic events, delivered one at a time on a single stream
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    Ready(SessionInfo),
    Message(InboundMessage),
    Fault(GatewayFault),
}

/// Gateway trait - the remote messaging platform's session.
///
/// `connect` starts a session that reports back through `events`: a
/// `Ready` once the handshake succeeds, then `Message`s, and a `Fault`
/// when the session dies.
#[async_trait]
pub trait Gateway: Send + Sync {
    fn name(&self) -> &str;

    async fn connect(&self, events: mpsc::Sender<GatewayEvent>) -> Result<(), GatewayFault>;

    async fn send(&self, channel: &ChannelRef, content: &OutboundMessage) -> Result<(), BotError>;

    /// Profile and permissions of a user inside a group, if they are a member
    async fn member(&self, group_id: &str, user_id: &str) -> Result<Option<Member>, BotError>;
}
