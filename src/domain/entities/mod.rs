//! Domain entities

pub mod audit;
pub mod command;
pub mod message;
pub mod permissions;
pub mod user;

pub use audit::AuditLogEntry;
pub use command::{Command, CommandContext, CommandHandler, CommandRegistry, CommandReply};
pub use message::{ChannelRef, Embed, EmbedField, InboundMessage, OutboundMessage};
pub use permissions::Permissions;
pub use user::{Member, User};
