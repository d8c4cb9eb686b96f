//! Infrastructure layer - External concerns
//!
//! This layer contains:
//! - Config: Configuration loading
//! - Database: SQLite pool and storage gateway
//! - Adapters: Platform integrations (Console, Telegram)

pub mod adapters;
pub mod config;
pub mod database;
