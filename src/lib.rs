//! warden-bot - a moderation bot with a supervised gateway connection,
//! gated command dispatch and a per-group audit log

pub mod application;
pub mod domain;
pub mod extensions;
pub mod infrastructure;
