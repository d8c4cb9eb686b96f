//! Message dispatcher - Routes inbound messages to registered commands

use std::sync::Arc;

use tokio::sync::mpsc;

use super::middleware::{Gate, GateContext, Rejection};
use super::parser::MessageParser;
use crate::application::errors::CommandError;
use crate::application::services::{AuditLog, ConnectionSupervisor};
use crate::domain::entities::{Command, CommandContext, CommandRegistry, InboundMessage, OutboundMessage, Permissions};
use crate::domain::traits::{Gateway, GatewayEvent};

/// Shown when a command fails for reasons the user cannot fix
pub const GENERIC_FAILURE: &str = "Something went wrong while running that command.";

/// How one inbound message was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not a command, or an unknown one
    Ignored,
    Rejected(Rejection),
    /// Handler returned a validation error, shown to the user
    InvalidInput,
    Failed,
    Executed,
}

/// Message dispatcher - resolves, gates, executes and audits commands
pub struct Dispatcher {
    parser: MessageParser,
    registry: Arc<CommandRegistry>,
    gateway: Arc<dyn Gateway>,
    gates: Vec<Box<dyn Gate>>,
    audit: Option<AuditLog>,
}

impl Dispatcher {
    pub fn new(prefix: impl Into<String>, registry: Arc<CommandRegistry>, gateway: Arc<dyn Gateway>) -> Self {
        Self {
            parser: MessageParser::new(prefix),
            registry,
            gateway,
            gates: Vec::new(),
            audit: None,
        }
    }

    /// Append gates; they run in the order they were added
    pub fn with_gates(mut self, gates: Vec<Box<dyn Gate>>) -> Self {
        self.gates.extend(gates);
        self
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    /// Consume gateway events until the stream closes. Lifecycle events go to
    /// the supervisor; each message is dispatched on its own task so a slow
    /// command never holds up the next message.
    pub async fn run(self: Arc<Self>, supervisor: Arc<ConnectionSupervisor>, mut events: mpsc::Receiver<GatewayEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                GatewayEvent::Ready(session) => supervisor.on_ready(&session),
                GatewayEvent::Fault(fault) => supervisor.on_fault(fault),
                GatewayEvent::Message(message) => {
                    let this = Arc::clone(&self);
                    tokio::spawn(async move {
                        this.dispatch(message).await;
                    });
                }
            }
        }
        tracing::info!("Gateway event stream closed");
    }

    /// Handle one inbound message end to end. Never fails: every error ends
    /// in a log line, a notice to the user, or both.
    pub async fn dispatch(&self, message: InboundMessage) -> DispatchOutcome {
        let Some(invocation) = self.parser.parse(&message.text) else {
            return DispatchOutcome::Ignored;
        };
        let Some(command) = self.registry.resolve(invocation.token) else {
            tracing::trace!("Unknown command token: {}", invocation.token);
            return DispatchOutcome::Ignored;
        };
        let command = Arc::clone(command);
        let args: Vec<String> = invocation.args.iter().map(|s| s.to_string()).collect();

        tracing::debug!(
            message_id = %message.id,
            command = %command.id,
            "Dispatching command from {}",
            message.author.id
        );

        let permissions = match self.author_permissions(&command, &message).await {
            Ok(permissions) => permissions,
            Err(e) => {
                tracing::error!("Permission lookup for {} failed: {}", message.author.id, e);
                self.reply(&message, OutboundMessage::text(GENERIC_FAILURE)).await;
                return DispatchOutcome::Failed;
            }
        };

        let gate_ctx = GateContext {
            command: command.as_ref(),
            message: &message,
            permissions,
        };
        if let Err(rejection) = self.gates.iter().try_for_each(|gate| gate.check(&gate_ctx)) {
            self.reply(&message, OutboundMessage::text(rejection.notice())).await;
            return DispatchOutcome::Rejected(rejection);
        }

        let Some(handler) = command.handler.clone() else {
            tracing::error!("Command {} has no handler", command.id);
            self.reply(&message, OutboundMessage::text(GENERIC_FAILURE)).await;
            return DispatchOutcome::Failed;
        };

        let ctx = CommandContext {
            message: message.clone(),
            args,
            registry: Arc::clone(&self.registry),
            gateway: Arc::clone(&self.gateway),
        };

        // A panicking handler is contained to its own task
        let result = tokio::spawn(async move { handler.execute(ctx).await }).await;

        match result {
            Ok(Ok(reply)) => {
                for content in &reply {
                    self.reply(&message, content.clone()).await;
                }
                self.record(&command, &message).await;
                DispatchOutcome::Executed
            }
            Ok(Err(CommandError::InvalidArgs(notice))) => {
                self.reply(&message, OutboundMessage::text(notice)).await;
                DispatchOutcome::InvalidInput
            }
            Ok(Err(e)) => {
                tracing::error!("Command {} failed: {}", command.id, e);
                self.reply(&message, OutboundMessage::text(GENERIC_FAILURE)).await;
                DispatchOutcome::Failed
            }
            Err(e) => {
                tracing::error!("Command {} panicked: {}", command.id, e);
                self.reply(&message, OutboundMessage::text(GENERIC_FAILURE)).await;
                DispatchOutcome::Failed
            }
        }
    }

    /// Looks the author up only when the command needs permissions and the
    /// message came from a group; outside a group nothing is held.
    async fn author_permissions(
        &self,
        command: &Command,
        message: &InboundMessage,
    ) -> Result<Option<Permissions>, crate::application::errors::BotError> {
        if command.permissions.is_empty() {
            return Ok(None);
        }
        let Some(group_id) = message.group_id.as_deref() else {
            return Ok(Some(Permissions::NONE));
        };
        let member = self.gateway.member(group_id, &message.author.id).await?;
        Ok(Some(member.map(|m| m.permissions).unwrap_or(Permissions::NONE)))
    }

    async fn record(&self, command: &Command, message: &InboundMessage) {
        let (Some(audit), Some(group_id)) = (&self.audit, message.group_id.as_deref()) else {
            return;
        };
        if !command.audited {
            return;
        }
        audit
            .record_invocation(group_id, &message.author.id, Some(command.id.as_str()), Some(message.text.as_str()))
            .await;
    }

    async fn reply(&self, message: &InboundMessage, content: OutboundMessage) {
        if let Err(e) = self.gateway.send(&message.channel, &content).await {
            tracing::error!("Failed to send message to {}: {}", message.channel, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::errors::{BotError, StorageError};
    use crate::application::messaging::middleware::default_gates;
    use crate::domain::entities::{ChannelRef, Member, User};
    use crate::domain::traits::{GatewayFault, QueryResult, StorageGateway};
    use crate::infrastructure::database::SqliteStore;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingGateway {
        sent: Mutex<Vec<String>>,
        permissions: Mutex<Option<Permissions>>,
    }

    impl RecordingGateway {
        fn with_permissions(permissions: Permissions) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                permissions: Mutex::new(Some(permissions)),
            }
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Gateway for RecordingGateway {
        fn name(&self) -> &str {
            "recording"
        }

        async fn connect(&self, _events: mpsc::Sender<GatewayEvent>) -> Result<(), GatewayFault> {
            Ok(())
        }

        async fn send(&self, _channel: &ChannelRef, content: &OutboundMessage) -> Result<(), BotError> {
            self.sent.lock().unwrap().push(content.render_plain());
            Ok(())
        }

        async fn member(&self, _group_id: &str, user_id: &str) -> Result<Option<Member>, BotError> {
            Ok(self
                .permissions
                .lock()
                .unwrap()
                .map(|p| Member::new(User::new(user_id), p)))
        }
    }

    fn registry() -> Arc<CommandRegistry> {
        let mut registry = CommandRegistry::new();
        registry
            .register_all(vec![
                Command::new("ping").with_fn(|_| Ok(vec![OutboundMessage::text("Pong!")])),
                Command::new("purge")
                    .group_only()
                    .with_permissions(Permissions::MANAGE_MESSAGES)
                    .with_fn(|ctx| Ok(vec![OutboundMessage::text(format!("purged {}", ctx.args.join(" ")))])),
                Command::new("boom").with_fn(|_| Err(CommandError::Storage(StorageError::Pool("down".into())))),
                Command::new("strict").with_fn(|_| Err(CommandError::InvalidArgs("Usage: !strict <n>".into()))),
                Command::new("panic").with_fn(|_| panic!("handler bug")),
                Command::new("quiet").without_audit().with_fn(|_| Ok(vec![])),
            ])
            .unwrap();
        Arc::new(registry)
    }

    async fn audit_log() -> AuditLog {
        let log = AuditLog::new(Arc::new(SqliteStore::open_in_memory().unwrap()));
        log.ensure_schema().await.unwrap();
        log
    }

    struct UnavailableStore;

    #[async_trait]
    impl StorageGateway for UnavailableStore {
        async fn execute(&self, _query: &str, _params: Vec<Value>) -> Result<QueryResult, StorageError> {
            Err(StorageError::Pool("database is locked".into()))
        }
    }

    fn build_dispatcher(gateway: Arc<RecordingGateway>, audit: AuditLog) -> Dispatcher {
        Dispatcher::new("!", registry(), gateway)
            .with_gates(default_gates(None))
            .with_audit(audit)
    }

    fn group_message(text: &str) -> InboundMessage {
        InboundMessage::new(ChannelRef::new("c1"), User::new("u1"), text).in_group("g1")
    }

    #[tokio::test]
    async fn test_ordinary_traffic_is_ignored_silently() {
        let gateway = Arc::new(RecordingGateway::default());
        let audit = audit_log().await;
        let dispatcher = build_dispatcher(gateway.clone(), audit.clone());

        assert_eq!(dispatcher.dispatch(group_message("hello all")).await, DispatchOutcome::Ignored);
        assert_eq!(dispatcher.dispatch(group_message("!nosuchcommand")).await, DispatchOutcome::Ignored);
        assert_eq!(dispatcher.dispatch(group_message("!PING")).await, DispatchOutcome::Ignored);
        assert!(gateway.sent().is_empty());
        assert!(audit.entries("g1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_success_replies_and_audits() {
        let gateway = Arc::new(RecordingGateway::default());
        let audit = audit_log().await;
        let dispatcher = build_dispatcher(gateway.clone(), audit.clone());

        assert_eq!(dispatcher.dispatch(group_message("!ping")).await, DispatchOutcome::Executed);
        assert_eq!(gateway.sent(), vec!["Pong!"]);

        let entries = audit.entries("g1").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].command_id.as_deref(), Some("ping"));
        assert_eq!(entries[0].message.as_deref(), Some("!ping"));
        assert_eq!(entries[0].user_id, "u1");
    }

    #[tokio::test]
    async fn test_outside_group_runs_without_audit() {
        let gateway = Arc::new(RecordingGateway::default());
        let audit = audit_log().await;
        let dispatcher = build_dispatcher(gateway.clone(), audit.clone());

        let dm = InboundMessage::new(ChannelRef::new("dm"), User::new("u1"), "!ping");
        assert_eq!(dispatcher.dispatch(dm).await, DispatchOutcome::Executed);
        assert_eq!(dispatcher.dispatch(group_message("!quiet")).await, DispatchOutcome::Executed);
        assert!(audit.entries("g1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_group_only_command_rejected_in_dm() {
        let gateway = Arc::new(RecordingGateway::with_permissions(Permissions::all()));
        let dispatcher = build_dispatcher(gateway.clone(), audit_log().await);

        let dm = InboundMessage::new(ChannelRef::new("dm"), User::new("u1"), "!purge 10");
        assert_eq!(dispatcher.dispatch(dm).await, DispatchOutcome::Rejected(Rejection::GroupOnly));
        assert_eq!(gateway.sent(), vec![Rejection::GroupOnly.notice()]);
    }

    #[tokio::test]
    async fn test_permission_gate() {
        let gateway = Arc::new(RecordingGateway::with_permissions(Permissions::SEND_MESSAGES));
        let audit = audit_log().await;
        let dispatcher = build_dispatcher(gateway.clone(), audit.clone());

        let outcome = dispatcher.dispatch(group_message("!purge 10")).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Rejected(Rejection::MissingPermissions(Permissions::MANAGE_MESSAGES))
        );
        assert!(audit.entries("g1").await.unwrap().is_empty());

        let gateway = Arc::new(RecordingGateway::with_permissions(
            Permissions::SEND_MESSAGES | Permissions::MANAGE_MESSAGES,
        ));
        let dispatcher = build_dispatcher(gateway.clone(), audit.clone());
        assert_eq!(dispatcher.dispatch(group_message("!purge 10")).await, DispatchOutcome::Executed);
        assert_eq!(gateway.sent(), vec!["purged 10"]);
    }

    #[tokio::test]
    async fn test_non_member_holds_no_permissions() {
        let gateway = Arc::new(RecordingGateway::default());
        let dispatcher = build_dispatcher(gateway.clone(), audit_log().await);
        assert!(matches!(
            dispatcher.dispatch(group_message("!purge")).await,
            DispatchOutcome::Rejected(Rejection::MissingPermissions(_))
        ));
    }

    #[tokio::test]
    async fn test_handler_failures_are_contained() {
        let gateway = Arc::new(RecordingGateway::default());
        let audit = audit_log().await;
        let dispatcher = build_dispatcher(gateway.clone(), audit.clone());

        assert_eq!(dispatcher.dispatch(group_message("!boom")).await, DispatchOutcome::Failed);
        assert_eq!(dispatcher.dispatch(group_message("!panic")).await, DispatchOutcome::Failed);
        assert_eq!(dispatcher.dispatch(group_message("!strict x")).await, DispatchOutcome::InvalidInput);
        assert_eq!(
            gateway.sent(),
            vec![GENERIC_FAILURE, GENERIC_FAILURE, "Usage: !strict <n>"]
        );
        assert!(audit.entries("g1").await.unwrap().is_empty());

        // still dispatching afterwards
        assert_eq!(dispatcher.dispatch(group_message("!ping")).await, DispatchOutcome::Executed);
    }

    #[tokio::test]
    async fn test_audit_write_failure_keeps_success() {
        let gateway = Arc::new(RecordingGateway::default());
        let audit = AuditLog::new(Arc::new(UnavailableStore));
        let dispatcher = build_dispatcher(gateway.clone(), audit);

        assert_eq!(dispatcher.dispatch(group_message("!ping")).await, DispatchOutcome::Executed);
        let sent = gateway.sent();
        assert_eq!(sent, vec!["Pong!"]);
        assert!(!sent.iter().any(|s| s == GENERIC_FAILURE));
    }

    #[tokio::test]
    async fn test_run_loop_routes_events() {
        let gateway = Arc::new(RecordingGateway::default());
        let (tx, rx) = mpsc::channel(8);
        let supervisor = Arc::new(ConnectionSupervisor::new(
            gateway.clone(),
            tx.clone(),
            std::time::Duration::from_secs(5),
        ));
        supervisor.login().await.unwrap();

        let dispatcher = Arc::new(build_dispatcher(gateway.clone(), audit_log().await));
        let loop_handle = tokio::spawn(Arc::clone(&dispatcher).run(Arc::clone(&supervisor), rx));

        tx.send(GatewayEvent::Ready(crate::domain::traits::SessionInfo {
            id: "1".into(),
            username: "warden".into(),
        }))
        .await
        .unwrap();
        tx.send(GatewayEvent::Message(group_message("!ping"))).await.unwrap();

        for _ in 0..100 {
            if !gateway.sent().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(gateway.sent(), vec!["Pong!"]);
        assert_eq!(supervisor.state(), crate::application::services::ConnectionState::Connected);

        drop(tx);
        drop(supervisor);
        loop_handle.abort();
    }
}
