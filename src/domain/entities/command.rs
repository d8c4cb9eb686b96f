use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::{InboundMessage, OutboundMessage, Permissions};
use crate::application::errors::{CommandError, ConfigError};
use crate::domain::traits::Gateway;

/// Messages a handler wants sent back, in order
pub type CommandReply = Vec<OutboundMessage>;

/// Everything a handler gets to work with for one invocation
#[derive(Clone)]
pub struct CommandContext {
    pub message: InboundMessage,
    pub args: Vec<String>,
    pub registry: Arc<CommandRegistry>,
    pub gateway: Arc<dyn Gateway>,
}

impl CommandContext {
    pub fn group_id(&self) -> Option<&str> {
        self.message.group_id.as_deref()
    }
}

/// Executable body of a command
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn execute(&self, ctx: CommandContext) -> Result<CommandReply, CommandError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> CommandHandler for FnHandler<F>
where
    F: Fn(&CommandContext) -> Result<CommandReply, CommandError> + Send + Sync + 'static,
{
    async fn execute(&self, ctx: CommandContext) -> Result<CommandReply, CommandError> {
        (self.0)(&ctx)
    }
}

/// Represents a bot command
pub struct Command {
    pub id: String,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub aliases: Vec<String>,
    pub usage: Option<String>,
    /// Requires a group context
    pub group_only: bool,
    pub permissions: Permissions,
    /// Write an audit entry after a successful run
    pub audited: bool,
    pub handler: Option<Arc<dyn CommandHandler>>,
}

impl Command {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            category: "general".to_string(),
            description: None,
            aliases: Vec::new(),
            usage: None,
            group_only: false,
            permissions: Permissions::NONE,
            audited: true,
            handler: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn group_only(mut self) -> Self {
        self.group_only = true;
        self
    }

    pub fn without_audit(mut self) -> Self {
        self.audited = false;
        self
    }

    pub fn with_handler<H: CommandHandler + 'static>(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Bind a synchronous closure as the handler
    pub fn with_fn<F>(self, f: F) -> Self
    where
        F: Fn(&CommandContext) -> Result<CommandReply, CommandError> + Send + Sync + 'static,
    {
        self.with_handler(FnHandler(f))
    }

    /// The id followed by the declared aliases, without repeats
    pub fn all_aliases(&self) -> Vec<&str> {
        let mut out: Vec<&str> = vec![self.id.as_str()];
        for alias in &self.aliases {
            if !out.contains(&alias.as_str()) {
                out.push(alias);
            }
        }
        out
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.id)
            .field("aliases", &self.aliases)
            .field("group_only", &self.group_only)
            .field("permissions", &self.permissions)
            .finish_non_exhaustive()
    }
}

/// Command registry keyed by id and by every alias.
///
/// Populated during extension load, then frozen behind an `Arc` for the
/// lifetime of the process.
#[derive(Default)]
pub struct CommandRegistry {
    commands: Vec<Arc<Command>>,
    aliases: HashMap<String, usize>,
    ids: HashMap<String, usize>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, command: Command) -> Result<(), ConfigError> {
        self.register_all(vec![command])
    }

    /// Register a batch atomically: either every command lands or none does.
    pub fn register_all(&mut self, commands: Vec<Command>) -> Result<(), ConfigError> {
        let mut pending: HashMap<&str, &str> = HashMap::new();
        for command in &commands {
            if command.handler.is_none() {
                return Err(ConfigError::MissingHandler(command.id.clone()));
            }
            for alias in command.all_aliases() {
                if let Some(&idx) = self.aliases.get(alias) {
                    return Err(ConfigError::DuplicateAlias {
                        alias: alias.to_string(),
                        existing: self.commands[idx].id.clone(),
                        incoming: command.id.clone(),
                    });
                }
                if let Some(existing) = pending.insert(alias, command.id.as_str()) {
                    return Err(ConfigError::DuplicateAlias {
                        alias: alias.to_string(),
                        existing: existing.to_string(),
                        incoming: command.id.clone(),
                    });
                }
            }
        }

        for command in commands {
            let idx = self.commands.len();
            for alias in command.all_aliases() {
                self.aliases.insert(alias.to_string(), idx);
            }
            self.ids.insert(command.id.clone(), idx);
            tracing::debug!("Registered command: {}", command.id);
            self.commands.push(Arc::new(command));
        }
        Ok(())
    }

    /// Exact, case-sensitive alias lookup
    pub fn resolve(&self, token: &str) -> Option<&Arc<Command>> {
        self.aliases.get(token).map(|&idx| &self.commands[idx])
    }

    /// Lookup by canonical id, used for ids read back from storage
    pub fn find_by_id(&self, id: &str) -> Option<&Arc<Command>> {
        self.ids.get(id).map(|&idx| &self.commands[idx])
    }

    /// Commands in registration order
    pub fn all(&self) -> impl Iterator<Item = &Arc<Command>> {
        self.commands.iter()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
