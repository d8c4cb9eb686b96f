//! Application layer - Use cases and business logic
//!
//! This layer contains:
//! - Services: Connection supervision, audit log access
//! - Errors: Error taxonomy shared across layers
//! - Messaging: Message parsing, gates, dispatching
//! - Formatting: Pagination and truncation of output text

pub mod errors;
pub mod formatting;
pub mod messaging;
pub mod services;
