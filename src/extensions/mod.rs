//! Extension system - bundles of commands with a setup/shutdown lifecycle

pub mod audit_log;
pub mod general;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::application::errors::{BotError, ConfigError};
use crate::application::services::AuditLog;
use crate::domain::entities::{Command, CommandRegistry};

pub use self::audit_log::{AuditLogCommand, AuditLogExtension};
pub use self::general::CoreExtension;

/// A named group of commands loaded at startup
#[async_trait]
pub trait Extension: Send + Sync {
    /// Unique identifier, matched against `extensions.enabled`
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Runs once before the extension's commands are registered
    async fn setup(&self) -> Result<(), BotError> {
        Ok(())
    }

    fn commands(&self) -> Vec<Command>;

    /// Runs on process exit
    async fn shutdown(&self) {}
}

/// Knows every available extension and loads the enabled ones
#[derive(Default)]
pub struct ExtensionManager {
    available: Vec<Arc<dyn Extension>>,
    loaded: Vec<Arc<dyn Extension>>,
}

impl ExtensionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager with the extensions shipped in this crate
    pub fn builtin(audit: AuditLog) -> Self {
        let mut manager = Self::new();
        manager.available.push(Arc::new(CoreExtension));
        manager.available.push(Arc::new(AuditLogExtension::new(audit)));
        manager
    }

    /// Make an extension available for loading
    pub fn register<E: Extension + 'static>(&mut self, extension: E) -> Result<(), ConfigError> {
        if self.available.iter().any(|e| e.name() == extension.name()) {
            return Err(ConfigError::InvalidValue(format!(
                "extension '{}' already registered",
                extension.name()
            )));
        }
        self.available.push(Arc::new(extension));
        Ok(())
    }

    /// Set up each enabled extension in order and register its commands as
    /// one batch. The first failure aborts the load.
    pub async fn load_all(&mut self, enabled: &[String], registry: &mut CommandRegistry) -> Result<(), BotError> {
        for name in enabled {
            let extension = self
                .available
                .iter()
                .find(|e| e.name() == name)
                .cloned()
                .ok_or_else(|| ConfigError::InvalidValue(format!("unknown extension '{}'", name)))?;

            if self.loaded.iter().any(|e| e.name() == name) {
                tracing::warn!("Extension {} listed twice, skipping", name);
                continue;
            }

            extension
                .setup()
                .await
                .map_err(|e| BotError::Extension(format!("{}: {}", name, e)))?;

            let commands = extension.commands();
            let count = commands.len();
            registry.register_all(commands)?;

            info!("Loaded extension {} ({} command(s))", name, count);
            self.loaded.push(extension);
        }
        Ok(())
    }

    /// Names of loaded extensions, in load order
    pub fn loaded(&self) -> Vec<&str> {
        self.loaded.iter().map(|e| e.name()).collect()
    }

    /// Shut down loaded extensions in reverse load order
    pub async fn shutdown_all(&mut self) {
        while let Some(extension) = self.loaded.pop() {
            extension.shutdown().await;
            info!("Unloaded extension {}", extension.name());
        }
    }
}
