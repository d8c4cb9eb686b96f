//! End-to-end dispatch through the loaded extensions

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use warden_bot::application::errors::BotError;
use warden_bot::application::messaging::{default_gates, DispatchOutcome, Dispatcher, RateLimitGate, GENERIC_FAILURE};
use warden_bot::application::services::{AuditLog, ConnectionState, ConnectionSupervisor};
use warden_bot::domain::entities::{
    ChannelRef, Command, CommandRegistry, InboundMessage, Member, OutboundMessage, Permissions, User,
};
use warden_bot::domain::traits::{Gateway, GatewayEvent, GatewayFault, SessionInfo};
use warden_bot::extensions::ExtensionManager;
use warden_bot::infrastructure::database::SqliteStore;

const GROUP: &str = "g1";

#[derive(Default)]
struct RecordingGateway {
    sent: Mutex<Vec<String>>,
    members: Mutex<HashMap<String, Member>>,
}

impl RecordingGateway {
    fn with_member(self, id: &str, username: &str, permissions: Permissions) -> Self {
        self.members.lock().unwrap().insert(
            id.to_string(),
            Member::new(User::new(id).with_username(username), permissions),
        );
        self
    }

    fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

#[async_trait]
impl Gateway for RecordingGateway {
    fn name(&self) -> &str {
        "recording"
    }

    async fn connect(&self, events: mpsc::Sender<GatewayEvent>) -> Result<(), GatewayFault> {
        let _ = events
            .send(GatewayEvent::Ready(SessionInfo {
                id: "bot".to_string(),
                username: "warden".to_string(),
            }))
            .await;
        Ok(())
    }

    async fn send(&self, _channel: &ChannelRef, content: &OutboundMessage) -> Result<(), BotError> {
        self.sent.lock().unwrap().push(content.render_plain());
        Ok(())
    }

    async fn member(&self, _group_id: &str, user_id: &str) -> Result<Option<Member>, BotError> {
        Ok(self.members.lock().unwrap().get(user_id).cloned())
    }
}

struct Harness {
    gateway: Arc<RecordingGateway>,
    dispatcher: Dispatcher,
}

impl Harness {
    async fn new(rate_limit: Option<RateLimitGate>) -> Self {
        let gateway = Arc::new(
            RecordingGateway::default()
                .with_member("1", "admin", Permissions::MANAGE_GROUP | Permissions::SEND_MESSAGES)
                .with_member("2", "member", Permissions::SEND_MESSAGES),
        );
        let audit = AuditLog::new(Arc::new(SqliteStore::open_in_memory().unwrap()));

        let mut registry = CommandRegistry::new();
        let mut extensions = ExtensionManager::builtin(audit.clone());
        extensions
            .load_all(&["core".to_string(), "audit-log".to_string()], &mut registry)
            .await
            .unwrap();
        registry
            .register(Command::new("warn").with_fn(|ctx| {
                Ok(vec![OutboundMessage::text(format!("warned {}", ctx.args.join(" ")))])
            }))
            .unwrap();

        let dispatcher = Dispatcher::new("!", Arc::new(registry), gateway.clone())
            .with_gates(default_gates(rate_limit))
            .with_audit(audit);
        Self { gateway, dispatcher }
    }

    async fn send(&self, author: &str, text: &str) -> DispatchOutcome {
        let message = InboundMessage::new(ChannelRef::new("c1"), User::new(author), text).in_group(GROUP);
        self.dispatcher.dispatch(message).await
    }
}

#[tokio::test]
async fn test_audit_list_and_detail_flow() {
    let h = Harness::new(None).await;

    assert_eq!(h.send("1", "!auditlog").await, DispatchOutcome::Executed);
    // the listing itself is the first recorded invocation
    assert_eq!(h.gateway.take_sent(), vec!["No audit log entries for this group yet."]);

    assert_eq!(h.send("2", "!warn spammer").await, DispatchOutcome::Executed);
    assert_eq!(h.send("2", "just chatting").await, DispatchOutcome::Ignored);
    assert_eq!(h.send("2", "!unknown").await, DispatchOutcome::Ignored);
    h.gateway.take_sent();

    assert_eq!(h.send("1", "!logs").await, DispatchOutcome::Executed);
    let sent = h.gateway.take_sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("#1 Audit log\n"));
    assert!(sent[0].contains("by @admin (1)"));
    assert!(sent[0].contains("#2 warn\n"));
    assert!(sent[0].contains("by @member (2)"));
    assert!(sent[0].ends_with("-- Page 1/1"));

    assert_eq!(h.send("1", "!audit 2").await, DispatchOutcome::Executed);
    let sent = h.gateway.take_sent();
    assert!(sent[0].starts_with("== Audit entry #2 =="));
    assert!(sent[0].contains("Message: !warn spammer"));

    assert_eq!(h.send("1", "!audit 999").await, DispatchOutcome::Executed);
    assert_eq!(h.gateway.take_sent(), vec!["No audit log entry with id 999 in this group."]);
}

#[tokio::test]
async fn test_gates_and_usage_errors() {
    let h = Harness::new(None).await;

    assert!(matches!(h.send("2", "!auditlog").await, DispatchOutcome::Rejected(_)));
    let sent = h.gateway.take_sent();
    assert!(sent[0].contains("Manage Group"));

    let dm = InboundMessage::new(ChannelRef::new("dm"), User::new("1"), "!auditlog");
    assert!(matches!(h.dispatcher.dispatch(dm).await, DispatchOutcome::Rejected(_)));
    h.gateway.take_sent();

    assert_eq!(h.send("1", "!auditlog latest").await, DispatchOutcome::InvalidInput);
    let sent = h.gateway.take_sent();
    assert!(sent[0].contains("Usage: auditlog [entry id]"));
    assert!(!sent[0].contains(GENERIC_FAILURE));
}

#[tokio::test]
async fn test_rate_limit_rejects_burst() {
    let h = Harness::new(Some(RateLimitGate::new(2, 60))).await;

    assert_eq!(h.send("2", "!ping").await, DispatchOutcome::Executed);
    assert_eq!(h.send("2", "!ping").await, DispatchOutcome::Executed);
    assert!(matches!(h.send("2", "!ping").await, DispatchOutcome::Rejected(_)));
    // other users have their own window
    assert_eq!(h.send("1", "!ping").await, DispatchOutcome::Executed);

    let sent = h.gateway.take_sent();
    assert_eq!(sent[0], "Pong!");
    assert!(sent[2].starts_with("You're going too fast."));
}

#[tokio::test]
async fn test_run_loop_connects_and_dispatches() {
    let h = Harness::new(None).await;
    let gateway = Arc::clone(&h.gateway);
    let dispatcher = Arc::new(h.dispatcher);

    let (tx, rx) = mpsc::channel(16);
    let supervisor = Arc::new(ConnectionSupervisor::new(
        gateway.clone(),
        tx.clone(),
        Duration::from_secs(5),
    ));
    let run = tokio::spawn(Arc::clone(&dispatcher).run(Arc::clone(&supervisor), rx));

    supervisor.login().await.unwrap();
    let message = InboundMessage::new(ChannelRef::new("c1"), User::new("2"), "!ping").in_group(GROUP);
    tx.send(GatewayEvent::Message(message)).await.unwrap();

    for _ in 0..100 {
        if supervisor.state() == ConnectionState::Connected && !gateway.sent.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(supervisor.state(), ConnectionState::Connected);
    assert_eq!(gateway.take_sent(), vec!["Pong!"]);

    run.abort();
}
