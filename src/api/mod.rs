//! Purpose: Define the stable public Rust API boundary for the Quiver client.
//! Exports: Client handles, operation options, results, cursor, and transport seam.
//! Role: Public, additive-only surface; hides the core engine modules.
//! Invariants: This module is the only public path to core types.
//! Invariants: Internal modules remain private and are not directly exposed.

mod client;
mod http;
mod options;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::command::{Command, CommandTarget, WriteModel};
pub use crate::core::cursor::{CursorState, FindCursor};
pub use crate::core::dispatch::DEFAULT_CONCURRENCY;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::outcome::{
    BulkOutcome, BulkWriteResult, CumulativeError, DeleteResult, InsertManyResult, UpdateResult,
};
pub use crate::core::response::{ApiResponse, ErrorDescriptor, ResponseData};
pub use crate::core::retry::RetryPolicy;
pub use crate::core::transport::Transport;
pub use client::{ApiResult, Client, Collection, Database};
pub use http::HttpTransport;
pub use options::{
    BulkWriteOptions, CreateCollectionOptions, DeleteManyOptions, FindOptions, InsertManyOptions,
    UpdateOptions, VectorMetric, DEFAULT_CHUNK_SIZE, DEFAULT_REQUEST_TIMEOUT,
};
