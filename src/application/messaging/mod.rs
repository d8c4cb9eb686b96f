//! Message handling - Event-driven message processing

pub mod dispatcher;
pub mod middleware;
pub mod parser;

pub use dispatcher::{DispatchOutcome, Dispatcher, GENERIC_FAILURE};
pub use middleware::{default_gates, Gate, GateContext, GroupOnlyGate, PermissionGate, RateLimitGate, Rejection};
pub use parser::{Invocation, MessageParser};
