//! Gateway adapters - Platform integrations

pub mod console;
pub mod telegram;

pub use console::ConsoleGateway;
pub use telegram::TelegramGateway;
