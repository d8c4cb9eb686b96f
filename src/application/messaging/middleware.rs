//! Gates evaluated between command resolution and execution

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::domain::entities::{Command, InboundMessage, Permissions};

/// What a gate gets to look at
#[derive(Debug, Clone, Copy)]
pub struct GateContext<'a> {
    pub command: &'a Command,
    pub message: &'a InboundMessage,
    /// Permissions of the author in the message's group, when they were
    /// looked up
    pub permissions: Option<Permissions>,
}

/// Why a command was not run. Every variant is shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    GroupOnly,
    MissingPermissions(Permissions),
    RateLimited { retry_after: Duration },
}

impl Rejection {
    pub fn notice(&self) -> String {
        match self {
            Rejection::GroupOnly => "This command can only be used inside a group.".to_string(),
            Rejection::MissingPermissions(missing) => {
                format!("You need the following permission(s) to use this command: {}", missing)
            }
            Rejection::RateLimited { retry_after } => format!(
                "You're going too fast. Try again in {}s.",
                retry_after.as_secs().max(1)
            ),
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.notice())
    }
}

/// A check that can stop a resolved command from running
pub trait Gate: Send + Sync {
    fn name(&self) -> &str;

    fn check(&self, ctx: &GateContext<'_>) -> Result<(), Rejection>;
}

/// Rejects group-only commands sent outside a group
pub struct GroupOnlyGate;

impl Gate for GroupOnlyGate {
    fn name(&self) -> &str {
        "group-only"
    }

    fn check(&self, ctx: &GateContext<'_>) -> Result<(), Rejection> {
        if ctx.command.group_only && !ctx.message.is_in_group() {
            return Err(Rejection::GroupOnly);
        }
        Ok(())
    }
}

/// Rejects authors whose permission set does not cover the command's
pub struct PermissionGate;

impl Gate for PermissionGate {
    fn name(&self) -> &str {
        "permission"
    }

    fn check(&self, ctx: &GateContext<'_>) -> Result<(), Rejection> {
        let required = ctx.command.permissions;
        if required.is_empty() {
            return Ok(());
        }
        let held = ctx.permissions.unwrap_or(Permissions::NONE);
        if held.satisfies(required) {
            Ok(())
        } else {
            Err(Rejection::MissingPermissions(held.missing(required)))
        }
    }
}

/// Sliding-window limit on command invocations per user
pub struct RateLimitGate {
    state: Mutex<Windows>,
    max_requests: u32,
    window: Duration,
}

#[derive(Default)]
struct Windows {
    requests: HashMap<String, Vec<Instant>>,
    last_sweep: Option<Instant>,
}

impl RateLimitGate {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            state: Mutex::new(Windows::default()),
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }

    fn check_rate_limit(&self, key: &str, now: Instant) -> Result<(), Rejection> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.sweep(&mut state, now);

        let times = state.requests.entry(key.to_string()).or_default();

        // Remove old requests outside the window
        times.retain(|&t| now.duration_since(t) < self.window);

        if times.len() >= self.max_requests as usize {
            let retry_after = times
                .first()
                .map(|t| self.window.saturating_sub(now.duration_since(*t)))
                .unwrap_or(self.window);

            return Err(Rejection::RateLimited { retry_after });
        }

        times.push(now);
        Ok(())
    }

    /// Drop users with no request left in the window, at most once per window
    fn sweep(&self, state: &mut Windows, now: Instant) {
        match state.last_sweep {
            Some(last) if now.duration_since(last) < self.window => return,
            _ => state.last_sweep = Some(now),
        }
        let window = self.window;
        state
            .requests
            .retain(|_, times| times.iter().any(|&t| now.duration_since(t) < window));
    }

    /// Users currently holding a window
    pub fn tracked_users(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).requests.len()
    }
}

impl Gate for RateLimitGate {
    fn name(&self) -> &str {
        "rate-limit"
    }

    fn check(&self, ctx: &GateContext<'_>) -> Result<(), Rejection> {
        self.check_rate_limit(&ctx.message.author.id, Instant::now())
    }
}

/// The gates every command passes, in order: context, permissions, rate
pub fn default_gates(rate_limit: Option<RateLimitGate>) -> Vec<Box<dyn Gate>> {
    let mut gates: Vec<Box<dyn Gate>> = vec![Box::new(GroupOnlyGate), Box::new(PermissionGate)];
    if let Some(limiter) = rate_limit {
        gates.push(Box::new(limiter));
    }
    gates
}
