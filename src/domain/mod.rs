//! Domain layer - Core business objects and the seams to the outside world
//!
//! This layer contains:
//! - Entities: Commands, messages, users, audit entries
//! - Traits: Abstractions for infrastructure (Gateway, StorageGateway)

pub mod entities;
pub mod traits;
