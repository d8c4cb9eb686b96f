//! Telegram gateway - long-polling Bot API session

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::application::errors::BotError;
use crate::application::formatting::truncate;
use crate::domain::entities::{ChannelRef, InboundMessage, Member, OutboundMessage, Permissions, User};
use crate::domain::traits::{FaultKind, Gateway, GatewayEvent, GatewayFault, SessionInfo};

/// Telegram API base URL
const API_BASE: &str = "https://api.telegram.org";

/// Long-poll duration for getUpdates
const POLL_TIMEOUT_SECS: i64 = 30;

/// Telegram rejects messages longer than this
const MAX_MESSAGE_CHARS: usize = 4096;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<TgMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgMessage {
    pub message_id: i64,
    pub from: Option<TgUser>,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl From<TgUser> for User {
    fn from(u: TgUser) -> Self {
        User {
            id: u.id.to_string(),
            username: u.username,
            first_name: u.first_name,
            last_name: u.last_name,
            is_bot: u.is_bot,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Chat {
    fn is_group(&self) -> bool {
        matches!(self.kind.as_str(), "group" | "supergroup")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMember {
    pub status: String,
    pub user: TgUser,
    #[serde(default)]
    pub can_manage_chat: bool,
    #[serde(default)]
    pub can_delete_messages: bool,
    #[serde(default)]
    pub can_restrict_members: bool,
    #[serde(default)]
    pub can_change_info: bool,
    pub can_send_messages: Option<bool>,
}

impl ChatMember {
    /// `None` for users who are no longer in the chat
    pub fn permissions(&self) -> Option<Permissions> {
        match self.status.as_str() {
            "creator" => Some(Permissions::all()),
            "administrator" => {
                let mut perms = Permissions::SEND_MESSAGES;
                if self.can_delete_messages {
                    perms |= Permissions::MANAGE_MESSAGES;
                }
                if self.can_restrict_members {
                    perms |= Permissions::MODERATE_MEMBERS;
                }
                if self.can_manage_chat && self.can_change_info {
                    perms |= Permissions::MANAGE_GROUP;
                }
                Some(perms)
            }
            "member" => Some(Permissions::SEND_MESSAGES),
            "restricted" if self.can_send_messages.unwrap_or(false) => Some(Permissions::SEND_MESSAGES),
            "restricted" => Some(Permissions::NONE),
            _ => None,
        }
    }
}

/// True when an error message describes a failed DNS lookup
pub fn is_name_resolution_failure(text: &str) -> bool {
    let text = text.to_lowercase();
    [
        "dns error",
        "failed to lookup address",
        "name or service not known",
        "no such host",
        "temporary failure in name resolution",
        "nodename nor servname provided",
    ]
    .iter()
    .any(|needle| text.contains(needle))
}

fn classify(err: &reqwest::Error) -> FaultKind {
    if err.is_timeout() {
        return FaultKind::Timeout;
    }
    if err.is_connect() {
        let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
        while let Some(e) = source {
            if is_name_resolution_failure(&e.to_string()) {
                return FaultKind::HostUnreachable;
            }
            source = e.source();
        }
        return FaultKind::Other;
    }
    if err.is_decode() {
        return FaultKind::Protocol;
    }
    FaultKind::Other
}

fn classify_status(status: StatusCode) -> FaultKind {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => FaultKind::Unauthorized,
        _ => FaultKind::Protocol,
    }
}

fn fault(err: reqwest::Error) -> GatewayFault {
    GatewayFault::new(classify(&err), err.to_string())
}

/// Thin client for the Bot API methods the gateway uses
#[derive(Clone)]
struct Api {
    client: Client,
    base_url: String,
}

impl Api {
    fn new(token: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: format!("{}/bot{}", API_BASE, token),
        }
    }

    async fn call<Req, Res>(&self, method: &str, request: &Req) -> Result<Res, GatewayFault>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, method);
        let response = self.client.post(&url).json(request).send().await.map_err(fault)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayFault::new(
                classify_status(status),
                format!("{} returned {}: {}", method, status, body),
            ));
        }

        let data: ApiResponse<Res> = response.json().await.map_err(fault)?;
        match (data.ok, data.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(GatewayFault::new(
                FaultKind::Protocol,
                data.description.unwrap_or_else(|| format!("{} failed", method)),
            )),
        }
    }

    async fn get_me(&self) -> Result<TgUser, GatewayFault> {
        self.call("getMe", &serde_json::json!({})).await
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, GatewayFault> {
        #[derive(Serialize)]
        struct GetUpdatesRequest {
            offset: i64,
            timeout: i64,
            allowed_updates: Vec<&'static str>,
        }

        let request = GetUpdatesRequest {
            offset,
            timeout: POLL_TIMEOUT_SECS,
            allowed_updates: vec!["message"],
        };
        self.call("getUpdates", &request).await
    }
}

/// Telegram gateway
pub struct TelegramGateway {
    api: Api,
    offset: Arc<AtomicI64>,
    session: Arc<AtomicU64>,
}

impl TelegramGateway {
    pub fn new(token: impl AsRef<str>) -> Self {
        Self {
            api: Api::new(token.as_ref()),
            offset: Arc::new(AtomicI64::new(0)),
            session: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get the next update offset
    pub fn get_next_offset(updates: &[Update]) -> Option<i64> {
        updates.iter().map(|u| u.update_id + 1).max()
    }

    /// Text messages with a known sender become inbound messages
    pub fn to_inbound(update: Update) -> Option<InboundMessage> {
        let msg = update.message?;
        let text = msg.text?;
        let author: User = msg.from?.into();
        let message = InboundMessage::new(ChannelRef::new(msg.chat.id.to_string()), author, text);
        if msg.chat.is_group() {
            Some(message.in_group(msg.chat.id.to_string()))
        } else {
            Some(message)
        }
    }
}

#[async_trait]
impl Gateway for TelegramGateway {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn connect(&self, events: mpsc::Sender<GatewayEvent>) -> Result<(), GatewayFault> {
        let me = self.api.get_me().await?;
        let session = self.session.fetch_add(1, Ordering::SeqCst) + 1;

        events
            .send(GatewayEvent::Ready(SessionInfo {
                id: me.id.to_string(),
                username: me.username.unwrap_or_else(|| "unknown".to_string()),
            }))
            .await
            .map_err(|e| GatewayFault::new(FaultKind::Other, e.to_string()))?;

        let api = self.api.clone();
        let offset = Arc::clone(&self.offset);
        let current = Arc::clone(&self.session);
        tokio::spawn(async move {
            tracing::info!("Starting message loop (session {})", session);
            // a newer session replaces this loop
            while current.load(Ordering::SeqCst) == session {
                match api.get_updates(offset.load(Ordering::SeqCst)).await {
                    Ok(updates) => {
                        if let Some(next) = TelegramGateway::get_next_offset(&updates) {
                            offset.store(next, Ordering::SeqCst);
                        }
                        for update in updates {
                            let Some(message) = TelegramGateway::to_inbound(update) else {
                                continue;
                            };
                            if events.send(GatewayEvent::Message(message)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(fault) => {
                        let _ = events.send(GatewayEvent::Fault(fault)).await;
                        return;
                    }
                }
            }
        });

        Ok(())
    }

    async fn send(&self, channel: &ChannelRef, content: &OutboundMessage) -> Result<(), BotError> {
        #[derive(Serialize)]
        struct SendMessageRequest<'a> {
            chat_id: &'a str,
            text: String,
        }

        let request = SendMessageRequest {
            chat_id: channel.as_str(),
            text: truncate(&content.render_plain(), MAX_MESSAGE_CHARS, "…", false),
        };
        self.api
            .call::<_, serde_json::Value>("sendMessage", &request)
            .await
            .map(|_| ())
            .map_err(|f| BotError::Network(f.to_string()))
    }

    async fn member(&self, group_id: &str, user_id: &str) -> Result<Option<Member>, BotError> {
        let request = serde_json::json!({ "chat_id": group_id, "user_id": user_id });
        match self.api.call::<_, ChatMember>("getChatMember", &request).await {
            Ok(member) => {
                let permissions = member.permissions();
                Ok(permissions.map(|p| Member::new(member.user.into(), p)))
            }
            // unknown user or chat
            Err(f) if f.kind == FaultKind::Protocol && f.message.contains("400") => Ok(None),
            Err(f) => Err(BotError::Gateway(f)),
        }
    }
}
