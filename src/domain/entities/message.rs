use std::fmt;

use chrono::{DateTime, Utc};

use super::User;

/// Opaque reference to the place a message came from and replies go to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelRef(pub String);

impl ChannelRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message delivered by the gateway
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: String,
    /// Set when the message was posted inside a group (guild, supergroup...)
    pub group_id: Option<String>,
    pub author: User,
    pub channel: ChannelRef,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(channel: ChannelRef, author: User, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            group_id: None,
            author,
            channel,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn in_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn is_in_group(&self) -> bool {
        self.group_id.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Styled summary block. Gateways without rich formatting fall back to
/// [`Embed::render_plain`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Embed {
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub fields: Vec<EmbedField>,
    pub footer: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub color: Option<u32>,
}

impl Embed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn render_plain(&self) -> String {
        let mut out = Vec::new();
        if let Some(ref title) = self.title {
            out.push(format!("== {} ==", title));
        }
        if let Some(ref author) = self.author {
            out.push(format!("by {}", author));
        }
        if let Some(ref description) = self.description {
            out.push(description.trim_end().to_string());
        }
        for field in &self.fields {
            out.push(format!("{}: {}", field.name, field.value));
        }
        match (&self.footer, self.timestamp) {
            (Some(footer), Some(ts)) => out.push(format!("-- {} | {}", footer, ts.format("%Y-%m-%d %H:%M:%S UTC"))),
            (Some(footer), None) => out.push(format!("-- {}", footer)),
            (None, Some(ts)) => out.push(format!("-- {}", ts.format("%Y-%m-%d %H:%M:%S UTC"))),
            (None, None) => {}
        }
        out.join("\n")
    }
}

/// Content sent back through the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Text(String),
    Embed(Embed),
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        OutboundMessage::Text(text.into())
    }

    pub fn render_plain(&self) -> String {
        match self {
            OutboundMessage::Text(text) => text.clone(),
            OutboundMessage::Embed(embed) => embed.render_plain(),
        }
    }
}

impl From<Embed> for OutboundMessage {
    fn from(embed: Embed) -> Self {
        OutboundMessage::Embed(embed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embed_render_plain() {
        let embed = Embed::new()
            .title("Audit log")
            .description("line one\n")
            .field("Command", "ping", true)
            .footer("Page 1/2");
        assert_eq!(
            embed.render_plain(),
            "== Audit log ==\nline one\nCommand: ping\n-- Page 1/2"
        );
    }

    #[test]
    fn test_inbound_group_context() {
        let msg = InboundMessage::new(ChannelRef::new("c1"), User::new("u1"), "!ping");
        assert!(!msg.is_in_group());
        assert!(msg.in_group("g1").is_in_group());
    }
}
