//! Console gateway for development/testing

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::application::errors::BotError;
use crate::domain::entities::{ChannelRef, InboundMessage, Member, OutboundMessage, Permissions, User};
use crate::domain::traits::{FaultKind, Gateway, GatewayEvent, GatewayFault, SessionInfo};

const CONSOLE_CHANNEL: &str = "console";

/// Reads stdin lines as messages from one local user inside one synthetic
/// group. That user holds every permission.
pub struct ConsoleGateway {
    bot_name: String,
    group_id: String,
    user: User,
    reader_started: AtomicBool,
}

impl ConsoleGateway {
    pub fn new(bot_name: impl Into<String>) -> Self {
        Self {
            bot_name: bot_name.into(),
            group_id: "console".to_string(),
            user: User::new("0").with_username("operator"),
            reader_started: AtomicBool::new(false),
        }
    }

    fn message(&self, line: String) -> InboundMessage {
        InboundMessage::new(ChannelRef::new(CONSOLE_CHANNEL), self.user.clone(), line).in_group(self.group_id.clone())
    }
}

#[async_trait]
impl Gateway for ConsoleGateway {
    fn name(&self) -> &str {
        "console"
    }

    async fn connect(&self, events: mpsc::Sender<GatewayEvent>) -> Result<(), GatewayFault> {
        tracing::info!("Starting console gateway (dev mode)");
        events
            .send(GatewayEvent::Ready(SessionInfo {
                id: "console".to_string(),
                username: self.bot_name.clone(),
            }))
            .await
            .map_err(|e| GatewayFault::new(FaultKind::Other, e.to_string()))?;

        // stdin can only be read by one task
        if self.reader_started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let template = self.message(String::new());
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => {
                        let mut message = template.clone();
                        message.id = uuid::Uuid::new_v4().to_string();
                        message.timestamp = chrono::Utc::now();
                        message.text = line;
                        if events.send(GatewayEvent::Message(message)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        tracing::info!("Console input closed");
                        break;
                    }
                    Err(e) => {
                        let _ = events
                            .send(GatewayEvent::Fault(GatewayFault::new(FaultKind::Other, e.to_string())))
                            .await;
                        break;
                    }
                }
            }
        });
        Ok(())
    }

    async fn send(&self, _channel: &ChannelRef, content: &OutboundMessage) -> Result<(), BotError> {
        println!("[BOT] {}", content.render_plain());
        Ok(())
    }

    async fn member(&self, _group_id: &str, user_id: &str) -> Result<Option<Member>, BotError> {
        let user = if user_id == self.user.id {
            self.user.clone()
        } else {
            User::new(user_id)
        };
        Ok(Some(Member::new(user, Permissions::all())))
    }
}
