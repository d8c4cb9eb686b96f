//! Domain traits - Abstractions for infrastructure implementations

pub mod gateway;
pub mod store;

pub use gateway::{FaultKind, Gateway, GatewayEvent, GatewayFault, SessionInfo};
pub use store::{QueryResult, Row, StorageGateway};
