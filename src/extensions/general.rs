//! Core extension - help and ping

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::Extension;
use crate::application::errors::CommandError;
use crate::domain::entities::{Command, CommandContext, CommandReply, Embed, OutboundMessage};

pub struct CoreExtension;

#[async_trait]
impl Extension for CoreExtension {
    fn name(&self) -> &str {
        "core"
    }

    fn description(&self) -> &str {
        "Help and connectivity check"
    }

    fn commands(&self) -> Vec<Command> {
        vec![
            Command::new("help")
                .with_name("Help")
                .with_description("List commands, or show details for one")
                .with_aliases(["commands", "h"])
                .with_usage("help [command]")
                .without_audit()
                .with_fn(help),
            Command::new("ping")
                .with_name("Ping")
                .with_description("Check the bot is responding")
                .without_audit()
                .with_fn(|_| Ok(vec![OutboundMessage::text("Pong!")])),
        ]
    }
}

fn help(ctx: &CommandContext) -> Result<CommandReply, CommandError> {
    let Some(token) = ctx.args.first() else {
        return Ok(vec![overview(ctx).into()]);
    };

    let Some(command) = ctx.registry.resolve(token) else {
        return Ok(vec![OutboundMessage::text(format!("Unknown command `{}`.", token))]);
    };

    let mut embed = Embed::new()
        .title(command.name.clone())
        .description(command.description.clone().unwrap_or_else(|| "No description.".to_string()))
        .field("Usage", command.usage.clone().unwrap_or_else(|| command.id.clone()), false);
    if !command.aliases.is_empty() {
        embed = embed.field("Aliases", command.aliases.join(", "), true);
    }
    if !command.permissions.is_empty() {
        embed = embed.field("Requires", command.permissions.to_string(), true);
    }
    if command.group_only {
        embed = embed.field("Where", "groups only", true);
    }
    Ok(vec![embed.into()])
}

fn overview(ctx: &CommandContext) -> Embed {
    let mut by_category: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for command in ctx.registry.all() {
        let line = match command.description {
            Some(ref desc) => format!("{} - {}", command.id, desc),
            None => command.id.clone(),
        };
        by_category.entry(command.category.as_str()).or_default().push(line);
    }

    by_category
        .into_iter()
        .fold(Embed::new().title("Commands"), |embed, (category, lines)| {
            embed.field(category, lines.join("\n"), false)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::errors::BotError;
    use crate::domain::entities::{ChannelRef, CommandRegistry, InboundMessage, Member, Permissions, User};
    use crate::domain::traits::{Gateway, GatewayEvent, GatewayFault};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    struct NullGateway;

    #[async_trait]
    impl Gateway for NullGateway {
        fn name(&self) -> &str {
            "null"
        }

        async fn connect(&self, _events: mpsc::Sender<GatewayEvent>) -> Result<(), GatewayFault> {
            Ok(())
        }

        async fn send(&self, _channel: &ChannelRef, _content: &OutboundMessage) -> Result<(), BotError> {
            Ok(())
        }

        async fn member(&self, _group_id: &str, _user_id: &str) -> Result<Option<Member>, BotError> {
            Ok(None)
        }
    }

    fn context(args: &[&str]) -> CommandContext {
        let mut registry = CommandRegistry::new();
        registry.register_all(CoreExtension.commands()).unwrap();
        registry
            .register(
                Command::new("purge")
                    .with_category("moderation")
                    .with_aliases(["clean"])
                    .with_permissions(Permissions::MANAGE_MESSAGES)
                    .group_only()
                    .with_fn(|_| Ok(vec![])),
            )
            .unwrap();

        CommandContext {
            message: InboundMessage::new(ChannelRef::new("c"), User::new("u"), "!help"),
            args: args.iter().map(|s| s.to_string()).collect(),
            registry: Arc::new(registry),
            gateway: Arc::new(NullGateway),
        }
    }

    fn render(reply: CommandReply) -> String {
        assert_eq!(reply.len(), 1);
        reply[0].render_plain()
    }

    #[test]
    fn test_help_groups_by_category() {
        let text = render(help(&context(&[])).unwrap());
        assert!(text.starts_with("== Commands =="));
        assert!(text.contains("general: help - List commands"));
        assert!(text.contains("moderation: purge"));
    }

    #[test]
    fn test_help_for_one_command() {
        let text = render(help(&context(&["clean"])).unwrap());
        assert!(text.contains("== purge =="));
        assert!(text.contains("Aliases: clean"));
        assert!(text.contains("Requires: Manage Messages"));
        assert!(text.contains("Where: groups only"));
    }

    #[test]
    fn test_help_unknown_command() {
        let text = render(help(&context(&["nope"])).unwrap());
        assert_eq!(text, "Unknown command `nope`.");
    }
}
