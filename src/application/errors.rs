//! Application layer errors

use thiserror::Error;

use crate::domain::traits::GatewayFault;

/// General bot errors
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Gateway fault: {0}")]
    Gateway(#[from] GatewayFault),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Extension error: {0}")]
    Extension(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Command execution errors
#[derive(Error, Debug)]
pub enum CommandError {
    /// Malformed user input; the message is shown to the user as-is
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Cannot decode column '{field}': {reason}")]
    Decode { field: String, reason: String },

    #[error("Storage task failed: {0}")]
    Join(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Alias '{alias}' of command '{incoming}' is already taken by '{existing}'")]
    DuplicateAlias {
        alias: String,
        existing: String,
        incoming: String,
    },

    #[error("Command '{0}' has no handler")]
    MissingHandler(String),
}
