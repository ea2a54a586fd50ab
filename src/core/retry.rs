//! Purpose: Bound each transport call with timeout budgets and a retry policy.
//! Exports: `RetryPolicy`, `Deadline`, `execute_with_retry`.
//! Role: Shared governor for bulk chunk dispatch and cursor page fetches.
//! Invariants: Only transient failures are retried; semantic failures surface at once.
//! Invariants: An exceeded overall deadline stops further attempts and is never retried.
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::core::command::Command;
use crate::core::error::{Error, ErrorKind};
use crate::core::response::ApiResponse;
use crate::core::transport::Transport;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    /// Service error codes treated as transient, in addition to descriptors
    /// the service itself flags retryable.
    pub retryable_codes: BTreeSet<String>,
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
            retryable_codes: BTreeSet::new(),
        }
    }

    /// A policy that never retries; every failure surfaces on first attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
            retryable_codes: BTreeSet::new(),
        }
    }

    pub fn is_transient(&self, err: &Error) -> bool {
        match err.kind() {
            ErrorKind::Transport | ErrorKind::Timeout => true,
            ErrorKind::Service => {
                err.is_retryable()
                    || err
                        .code()
                        .is_some_and(|code| self.retryable_codes.contains(code))
            }
            _ => false,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Overall-operation budget shared across every wire call of one high-level call.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    pub fn none() -> Self {
        Self { at: None }
    }

    pub fn within(budget: Duration) -> Self {
        Self {
            at: Some(Instant::now() + budget),
        }
    }

    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        match timeout {
            Some(budget) => Self::within(budget),
            None => Self::none(),
        }
    }

    pub fn expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Clamp a wait to the remaining budget.
    pub fn clamp(&self, wait: Duration) -> Duration {
        let Some(at) = self.at else {
            return wait;
        };
        let now = Instant::now();
        if now >= at {
            return Duration::ZERO;
        }
        wait.min(at - now)
    }

    pub fn exceeded_error(&self, command: &Command) -> Error {
        Error::new(ErrorKind::Timeout)
            .with_message("operation deadline exceeded")
            .with_command(command.name())
    }
}

/// Run one command through the transport, retrying transient failures up to
/// the policy limit. A response that parsed cleanly but carries only
/// transient-classified error descriptors and no partial status is also
/// retried; anything with recorded partial work is returned as-is so the
/// caller can aggregate it without risking duplicate side effects.
pub fn execute_with_retry(
    transport: &dyn Transport,
    command: &Command,
    request_timeout: Duration,
    deadline: Deadline,
    policy: &RetryPolicy,
) -> Result<ApiResponse, Error> {
    let mut attempt = 0u32;
    loop {
        if deadline.expired() {
            return Err(deadline.exceeded_error(command));
        }
        attempt += 1;
        let timeout = deadline.clamp(request_timeout).max(Duration::from_millis(1));
        match transport.execute(command, timeout) {
            Ok(response) => {
                if attempt < policy.max_attempts && retryable_response(&response, policy) {
                    warn!(
                        command = command.name(),
                        attempt, "retrying transient service error"
                    );
                    std::thread::sleep(deadline.clamp(policy.backoff));
                    continue;
                }
                return Ok(response);
            }
            Err(err) => {
                if attempt >= policy.max_attempts || !policy.is_transient(&err) {
                    return Err(err);
                }
                debug!(
                    command = command.name(),
                    attempt,
                    error = %err,
                    "retrying transient failure"
                );
                std::thread::sleep(deadline.clamp(policy.backoff));
            }
        }
    }
}

fn retryable_response(response: &ApiResponse, policy: &RetryPolicy) -> bool {
    if response.errors.is_empty() || response.status.is_some() {
        return false;
    }
    response
        .errors
        .iter()
        .all(|descriptor| policy.is_transient(&descriptor.to_error()))
}
