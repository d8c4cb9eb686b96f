//! Application services - Business logic orchestration

pub mod audit_log;
pub mod connection_supervisor;

pub use audit_log::AuditLog;
pub use connection_supervisor::{ConnectionState, ConnectionSupervisor};
