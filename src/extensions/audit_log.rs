//! Audit log extension - browse the per-group record of command invocations

use std::collections::HashMap;

use async_trait::async_trait;

use super::Extension;
use crate::application::errors::{BotError, CommandError};
use crate::application::formatting::{paginate, truncate};
use crate::application::services::AuditLog;
use crate::domain::entities::{
    AuditLogEntry, Command, CommandContext, CommandHandler, CommandRegistry, CommandReply, Embed, OutboundMessage,
    Permissions,
};

/// Rendered characters per list page
pub const LIST_PAGE_CAPACITY: usize = 2048;

/// Longest message text shown in detail mode
pub const FIELD_CAPACITY: usize = 1024;

const USAGE: &str = "auditlog [entry id]";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";
const EMBED_COLOR: u32 = 0x5865F2;

pub struct AuditLogExtension {
    audit: AuditLog,
}

impl AuditLogExtension {
    pub fn new(audit: AuditLog) -> Self {
        Self { audit }
    }
}

#[async_trait]
impl Extension for AuditLogExtension {
    fn name(&self) -> &str {
        "audit-log"
    }

    fn description(&self) -> &str {
        "Per-group history of executed commands"
    }

    async fn setup(&self) -> Result<(), BotError> {
        self.audit.ensure_schema().await?;
        Ok(())
    }

    fn commands(&self) -> Vec<Command> {
        vec![AuditLogCommand::command(self.audit.clone())]
    }
}

/// Lists a group's audit entries, or shows one in detail
pub struct AuditLogCommand {
    audit: AuditLog,
}

impl AuditLogCommand {
    pub fn new(audit: AuditLog) -> Self {
        Self { audit }
    }

    pub fn command(audit: AuditLog) -> Command {
        Command::new("auditlog")
            .with_name("Audit log")
            .with_category("moderation")
            .with_description("Show the commands run in this group")
            .with_aliases(["audit", "logs"])
            .with_usage(USAGE)
            .group_only()
            .with_permissions(Permissions::MANAGE_GROUP)
            .with_handler(Self::new(audit))
    }

    async fn list(&self, ctx: &CommandContext, group_id: &str) -> Result<CommandReply, CommandError> {
        let entries = self.audit.entries(group_id).await?;
        if entries.is_empty() {
            return Ok(vec![OutboundMessage::text("No audit log entries for this group yet.")]);
        }

        let mut tags = UserTags::new(ctx, group_id);
        let mut blocks = Vec::with_capacity(entries.len());
        for entry in &entries {
            let tag = tags.get(&entry.user_id).await;
            blocks.push(format!(
                "#{} {}\n{} by {} ({})",
                entry.id,
                command_label(&ctx.registry, entry.command_id.as_deref()),
                entry.created_at.format(TIMESTAMP_FORMAT),
                tag,
                entry.user_id
            ));
        }

        let pages = paginate(blocks, LIST_PAGE_CAPACITY);
        let total = pages.len();
        Ok(pages
            .into_iter()
            .enumerate()
            .map(|(i, page)| {
                Embed::new()
                    .title("Audit log")
                    .description(page.render())
                    .footer(format!("Page {}/{}", i + 1, total))
                    .color(EMBED_COLOR)
                    .into()
            })
            .collect())
    }

    async fn detail(&self, ctx: &CommandContext, group_id: &str, id: i64) -> Result<CommandReply, CommandError> {
        let Some(entry) = self.audit.entry(group_id, id).await? else {
            return Ok(vec![OutboundMessage::text(format!(
                "No audit log entry with id {} in this group.",
                id
            ))]);
        };

        let tag = UserTags::new(ctx, group_id).get(&entry.user_id).await;
        Ok(vec![detail_embed(&ctx.registry, &entry, &tag).into()])
    }
}

#[async_trait]
impl CommandHandler for AuditLogCommand {
    async fn execute(&self, ctx: CommandContext) -> Result<CommandReply, CommandError> {
        let group_id = ctx
            .group_id()
            .ok_or_else(|| CommandError::ExecutionFailed("audit log needs a group".to_string()))?
            .to_string();

        match ctx.args.as_slice() {
            [] => self.list(&ctx, &group_id).await,
            [arg] => match arg.parse::<i64>() {
                Ok(id) => self.detail(&ctx, &group_id, id).await,
                Err(_) => Err(usage_error(arg)),
            },
            [_, extra, ..] => Err(usage_error(extra)),
        }
    }
}

fn usage_error(arg: &str) -> CommandError {
    CommandError::InvalidArgs(format!("`{}` is not an entry id. Usage: {}", arg, USAGE))
}

/// Display name for a stored command id. The command may have been removed
/// since the entry was written.
fn command_label(registry: &CommandRegistry, command_id: Option<&str>) -> String {
    match command_id {
        Some(id) => registry
            .find_by_id(id)
            .map(|command| command.name.clone())
            .unwrap_or_else(|| id.to_string()),
        None => "(unknown)".to_string(),
    }
}

fn detail_embed(registry: &CommandRegistry, entry: &AuditLogEntry, tag: &str) -> Embed {
    let command = match entry.command_id.as_deref() {
        Some(id) => format!("{} (`{}`)", command_label(registry, Some(id)), id),
        None => command_label(registry, None),
    };
    let message = match entry.message.as_deref() {
        Some(text) if !text.is_empty() => truncate(text, FIELD_CAPACITY, "…", false),
        _ => "(no message)".to_string(),
    };

    Embed::new()
        .title(format!("Audit entry #{}", entry.id))
        .author(tag)
        .field("Command", command, true)
        .field("User", format!("{} ({})", tag, entry.user_id), true)
        .field("Message", message, false)
        .timestamp(entry.created_at)
        .color(EMBED_COLOR)
}

/// Resolves each distinct user once per invocation
struct UserTags<'a> {
    ctx: &'a CommandContext,
    group_id: &'a str,
    cache: HashMap<String, String>,
}

impl<'a> UserTags<'a> {
    fn new(ctx: &'a CommandContext, group_id: &'a str) -> Self {
        Self {
            ctx,
            group_id,
            cache: HashMap::new(),
        }
    }

    async fn get(&mut self, user_id: &str) -> String {
        if let Some(tag) = self.cache.get(user_id) {
            return tag.clone();
        }

        let tag = match self.ctx.gateway.member(self.group_id, user_id).await {
            Ok(Some(member)) => member.user.tag(),
            Ok(None) => user_id.to_string(),
            Err(e) => {
                tracing::debug!("Could not resolve user {}: {}", user_id, e);
                user_id.to_string()
            }
        };
        self.cache.insert(user_id.to_string(), tag.clone());
        tag
    }
}
