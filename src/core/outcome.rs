//! Purpose: Fold per-chunk outcomes into typed aggregate results.
//! Exports: `ChunkOutcome`, `BulkOutcome`, `CumulativeError`, per-operation results
//! and their aggregators.
//! Role: Turns the dispatcher's raw chunk results into the caller-facing surface.
//! Invariants: Aggregation consumes outcomes in chunk-start order; counts and ids
//! accumulated from completed chunks survive later failures.
//! Invariants: Insert aggregation preserves the input-position → id mapping.
use std::collections::BTreeMap;

use serde_json::Value;

use crate::core::error::Error;
use crate::core::response::ApiResponse;

/// Result of one dispatched chunk, tagged with its position in the plan.
#[derive(Debug)]
pub struct ChunkOutcome {
    pub index: usize,
    pub result: Result<ApiResponse, Error>,
}

/// Partial-failure record: everything that succeeded plus every error seen.
#[derive(Debug)]
pub struct CumulativeError<R> {
    pub partial: R,
    pub errors: Vec<Error>,
}

/// Tagged outcome of a multi-command operation. Callers pattern-match instead
/// of digging through an exception hierarchy.
#[derive(Debug)]
pub enum BulkOutcome<R> {
    Success(R),
    Partial(CumulativeError<R>),
    Fatal(Error),
}

impl<R> BulkOutcome<R> {
    pub fn is_success(&self) -> bool {
        matches!(self, BulkOutcome::Success(_))
    }

    pub fn success(self) -> Option<R> {
        match self {
            BulkOutcome::Success(result) => Some(result),
            _ => None,
        }
    }

    pub fn errors(&self) -> &[Error] {
        match self {
            BulkOutcome::Success(_) => &[],
            BulkOutcome::Partial(cumulative) => &cumulative.errors,
            BulkOutcome::Fatal(err) => std::slice::from_ref(err),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct InsertManyResult {
    /// Assigned ids keyed by position in the caller's input.
    pub inserted_ids: BTreeMap<usize, Value>,
}

impl InsertManyResult {
    /// Ids in input order, for callers that only need the list.
    pub fn ids_in_order(&self) -> Vec<Value> {
        self.inserted_ids.values().cloned().collect()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_id: Option<Value>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BulkWriteResult {
    pub inserted_count: u64,
    pub matched_count: u64,
    pub modified_count: u64,
    pub deleted_count: u64,
    /// Upserted ids keyed by the position of the originating write model.
    pub upserted_ids: BTreeMap<usize, Value>,
}

/// `chunk_offsets[i]` is the input position of chunk `i`'s first document;
/// its length is the total chunk count of the plan.
pub fn aggregate_insert_many(
    outcomes: Vec<ChunkOutcome>,
    chunk_offsets: &[usize],
) -> BulkOutcome<InsertManyResult> {
    let mut result = InsertManyResult::default();
    let mut errors = Vec::new();

    for outcome in &outcomes {
        let offset = chunk_offsets[outcome.index];
        match &outcome.result {
            Ok(response) => {
                for (position, id) in response.inserted_ids().into_iter().enumerate() {
                    result.inserted_ids.insert(offset + position, id);
                }
                errors.extend(response.errors.iter().map(|descriptor| descriptor.to_error()));
            }
            Err(err) => errors.push(clone_error(err)),
        }
    }

    if errors.is_empty() && outcomes.len() == chunk_offsets.len() {
        BulkOutcome::Success(result)
    } else {
        BulkOutcome::Partial(CumulativeError {
            partial: result,
            errors,
        })
    }
}

pub fn aggregate_update(outcomes: Vec<ChunkOutcome>, complete: bool) -> BulkOutcome<UpdateResult> {
    let mut result = UpdateResult::default();
    let mut errors = Vec::new();

    for outcome in &outcomes {
        match &outcome.result {
            Ok(response) => {
                result.matched_count += response.status_u64("matchedCount").unwrap_or(0);
                result.modified_count += response.status_u64("modifiedCount").unwrap_or(0);
                if let Some(id) = response.status_value("upsertedId") {
                    result.upserted_id = Some(id.clone());
                }
                errors.extend(response.errors.iter().map(|descriptor| descriptor.to_error()));
            }
            Err(err) => errors.push(clone_error(err)),
        }
    }

    if errors.is_empty() && complete {
        BulkOutcome::Success(result)
    } else {
        BulkOutcome::Partial(CumulativeError {
            partial: result,
            errors,
        })
    }
}

pub fn aggregate_delete(outcomes: Vec<ChunkOutcome>, complete: bool) -> BulkOutcome<DeleteResult> {
    let mut result = DeleteResult::default();
    let mut errors = Vec::new();

    for outcome in &outcomes {
        match &outcome.result {
            Ok(response) => {
                result.deleted_count += response.status_u64("deletedCount").unwrap_or(0);
                errors.extend(response.errors.iter().map(|descriptor| descriptor.to_error()));
            }
            Err(err) => errors.push(clone_error(err)),
        }
    }

    if errors.is_empty() && complete {
        BulkOutcome::Success(result)
    } else {
        BulkOutcome::Partial(CumulativeError {
            partial: result,
            errors,
        })
    }
}

/// One outcome per write model, indexed by input position.
pub fn aggregate_bulk_write(
    outcomes: Vec<ChunkOutcome>,
    model_count: usize,
) -> BulkOutcome<BulkWriteResult> {
    let mut result = BulkWriteResult::default();
    let mut errors = Vec::new();

    for outcome in &outcomes {
        match &outcome.result {
            Ok(response) => {
                result.inserted_count += response.inserted_ids().len() as u64;
                result.matched_count += response.status_u64("matchedCount").unwrap_or(0);
                result.modified_count += response.status_u64("modifiedCount").unwrap_or(0);
                result.deleted_count += response.status_u64("deletedCount").unwrap_or(0);
                if let Some(id) = response.status_value("upsertedId") {
                    result.upserted_ids.insert(outcome.index, id.clone());
                }
                errors.extend(response.errors.iter().map(|descriptor| descriptor.to_error()));
            }
            Err(err) => errors.push(clone_error(err)),
        }
    }

    if errors.is_empty() && outcomes.len() == model_count {
        BulkOutcome::Success(result)
    } else {
        BulkOutcome::Partial(CumulativeError {
            partial: result,
            errors,
        })
    }
}

// Error keeps its boxed source unclonable; aggregation reports context only.
fn clone_error(err: &Error) -> Error {
    let mut clone = Error::new(err.kind()).with_retryable(err.is_retryable());
    if let Some(message) = err.message() {
        clone = clone.with_message(message);
    }
    if let Some(hint) = err.hint() {
        clone = clone.with_hint(hint);
    }
    if let Some(code) = err.code() {
        clone = clone.with_code(code);
    }
    if let Some(status) = err.status() {
        clone = clone.with_status(status);
    }
    clone
}
