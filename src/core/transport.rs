//! Purpose: Define the sole network boundary consumed by the engine.
//! Exports: `Transport`.
//! Role: Seam between orchestration (core) and the HTTP adapter (api) or test doubles.
//! Invariants: `execute` performs exactly one wire call for one command.
//! Invariants: Implementations are shared read-only across concurrent dispatches.
use std::time::Duration;

use crate::core::command::Command;
use crate::core::error::Error;
use crate::core::response::ApiResponse;

pub trait Transport: Send + Sync {
    /// Execute one command against the service, bounded by `timeout`.
    fn execute(&self, command: &Command, timeout: Duration) -> Result<ApiResponse, Error>;
}
