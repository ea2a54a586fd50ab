//! Purpose: Define the public client surface: `Client`, `Database`, `Collection`.
//! Exports: `ApiResult`, `Client`, `Database`, `Collection`.
//! Role: Stable boundary composing plan → dispatch → aggregate for bulk calls
//! and constructing cursors for reads.
//! Invariants: Every operation validates locally before any wire call.
//! Invariants: Handles share one transport read-only; all mutable state lives
//! in per-call or per-cursor objects.
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::http::HttpTransport;
use super::options::{
    BulkWriteOptions, CreateCollectionOptions, DeleteManyOptions, FindOptions, InsertManyOptions,
    UpdateOptions, DEFAULT_REQUEST_TIMEOUT,
};
use crate::core::command::{Command, CommandTarget, WriteModel};
use crate::core::cursor::FindCursor;
use crate::core::dispatch::{dispatch_chunks, DispatchOptions};
use crate::core::error::{Error, ErrorKind};
use crate::core::outcome::{
    aggregate_bulk_write, aggregate_delete, aggregate_insert_many, aggregate_update, BulkOutcome,
    BulkWriteResult, ChunkOutcome, DeleteResult, InsertManyResult, UpdateResult,
};
use crate::core::plan::plan_chunks;
use crate::core::response::ApiResponse;
use crate::core::retry::{execute_with_retry, Deadline, RetryPolicy};
use crate::core::transport::Transport;

pub type ApiResult<T> = Result<T, Error>;

/// Entry point holding the shared transport and call-wide defaults.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    request_timeout: Duration,
    policy: RetryPolicy,
}

impl Client {
    pub fn new(base_url: impl Into<String>) -> ApiResult<Self> {
        let transport = HttpTransport::new(base_url)?;
        Ok(Self::with_transport(Arc::new(transport)))
    }

    pub fn with_token(base_url: impl Into<String>, token: impl Into<String>) -> ApiResult<Self> {
        let transport = HttpTransport::new(base_url)?.with_token(token);
        Ok(Self::with_transport(Arc::new(transport)))
    }

    /// Build a client over any transport implementation. This is the seam the
    /// engine is tested through and the hook for custom adapters.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            policy: RetryPolicy::new(),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn database(&self, keyspace: impl Into<String>) -> Database {
        Database {
            transport: self.transport.clone(),
            keyspace: keyspace.into(),
            request_timeout: self.request_timeout,
            policy: self.policy.clone(),
        }
    }
}

/// Handle on one keyspace; owns the thin admin wrappers.
#[derive(Clone)]
pub struct Database {
    transport: Arc<dyn Transport>,
    keyspace: String,
    request_timeout: Duration,
    policy: RetryPolicy,
}

impl Database {
    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn collection(&self, name: impl Into<String>) -> Collection {
        Collection {
            transport: self.transport.clone(),
            target: CommandTarget::collection(self.keyspace.clone(), name),
            request_timeout: self.request_timeout,
            policy: self.policy.clone(),
        }
    }

    pub fn create_collection(
        &self,
        name: impl Into<String>,
        options: &CreateCollectionOptions,
    ) -> ApiResult<Collection> {
        options.validate()?;
        let name = name.into();
        let command = Command::create_collection(
            CommandTarget::keyspace(self.keyspace.clone()),
            name.clone(),
            options.to_command_options(),
        );
        run_command(
            self.transport.as_ref(),
            &command,
            self.request_timeout,
            &self.policy,
        )?;
        Ok(self.collection(name))
    }

    pub fn delete_collection(&self, name: impl Into<String>) -> ApiResult<()> {
        let command =
            Command::delete_collection(CommandTarget::keyspace(self.keyspace.clone()), name);
        run_command(
            self.transport.as_ref(),
            &command,
            self.request_timeout,
            &self.policy,
        )?;
        Ok(())
    }

    pub fn list_collection_names(&self) -> ApiResult<Vec<String>> {
        let command = Command::find_collections(CommandTarget::keyspace(self.keyspace.clone()));
        let response = run_command(
            self.transport.as_ref(),
            &command,
            self.request_timeout,
            &self.policy,
        )?;
        let names = match response.status_value("collections") {
            Some(Value::Array(entries)) => entries
                .iter()
                .filter_map(|entry| entry.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };
        Ok(names)
    }
}

/// Handle on one collection; every operation of the caller-facing surface.
#[derive(Clone)]
pub struct Collection {
    transport: Arc<dyn Transport>,
    target: CommandTarget,
    request_timeout: Duration,
    policy: RetryPolicy,
}

impl Collection {
    pub fn name(&self) -> &str {
        self.target.collection_name().unwrap_or_default()
    }

    pub fn insert_one(&self, document: Value) -> ApiResult<Value> {
        let command = Command::insert_one(self.target.clone(), document);
        let response = self.run(&command)?;
        response.inserted_ids().into_iter().next().ok_or_else(|| {
            Error::new(ErrorKind::Internal)
                .with_message("insert response carried no inserted id")
                .with_command("insertOne")
        })
    }

    /// Insert a batch, chunked to the service's per-request ceiling and
    /// dispatched per the ordered/unordered semantics of `options`.
    pub fn insert_many(
        &self,
        documents: Vec<Value>,
        options: &InsertManyOptions,
    ) -> BulkOutcome<InsertManyResult> {
        if let Err(err) = options.validate() {
            return BulkOutcome::Fatal(err);
        }
        if documents.is_empty() {
            return BulkOutcome::Success(InsertManyResult::default());
        }
        let chunks = match plan_chunks(documents, options.chunk_size) {
            Ok(chunks) => chunks,
            Err(err) => return BulkOutcome::Fatal(err),
        };
        let mut offsets = Vec::with_capacity(chunks.len());
        let mut offset = 0;
        for chunk in &chunks {
            offsets.push(offset);
            offset += chunk.len();
        }
        let commands: Vec<Command> = chunks
            .into_iter()
            .map(|chunk| Command::insert_many(self.target.clone(), chunk, options.ordered))
            .collect();

        let dispatch = DispatchOptions {
            ordered: options.ordered,
            concurrency: options.effective_concurrency(),
            request_timeout: self.request_timeout,
            deadline: Deadline::from_timeout(options.overall_timeout),
        };
        let outcomes = dispatch_chunks(self.transport.as_ref(), &commands, &dispatch, &self.policy);
        aggregate_insert_many(outcomes, &offsets)
    }

    pub fn find(&self, options: &FindOptions) -> ApiResult<FindCursor> {
        options.validate()?;
        let mut cursor = FindCursor::new(
            self.transport.clone(),
            self.target.clone(),
            self.request_timeout,
            self.policy.clone(),
        );
        if let Some(filter) = &options.filter {
            cursor = cursor.with_filter(filter.clone())?;
        }
        if let Some(vector) = &options.vector {
            cursor = cursor.with_vector(vector.clone())?;
        } else if let Some(sort) = &options.sort {
            cursor = cursor.with_sort(sort.clone())?;
        }
        if let Some(projection) = &options.projection {
            cursor = cursor.with_projection(projection.clone())?;
        }
        if let Some(limit) = options.limit {
            cursor = cursor.with_limit(limit)?;
        }
        if options.include_similarity {
            cursor = cursor.with_include_similarity(true)?;
        }
        if let Some(budget) = options.overall_timeout {
            cursor = cursor.with_overall_timeout(budget)?;
        }
        Ok(cursor)
    }

    pub fn find_one(&self, options: &FindOptions) -> ApiResult<Option<Value>> {
        options.validate()?;
        let mut command_options = serde_json::Map::new();
        if options.include_similarity {
            command_options.insert("includeSimilarity".to_string(), Value::Bool(true));
        }
        let sort = match &options.vector {
            Some(vector) => {
                let components: Vec<Value> = vector
                    .iter()
                    .map(|component| Value::from(f64::from(*component)))
                    .collect();
                Some(serde_json::json!({"$vector": components}))
            }
            None => options.sort.clone(),
        };
        let command = Command::find_one(
            self.target.clone(),
            options.filter.clone(),
            sort,
            options.projection.clone(),
            command_options,
        );
        let response = self.run(&command)?;
        Ok(response.data.and_then(|data| data.document))
    }

    pub fn update_one(
        &self,
        filter: Value,
        update: Value,
        options: &UpdateOptions,
    ) -> ApiResult<UpdateResult> {
        let command = Command::update_one(self.target.clone(), filter, update, options.upsert);
        let response = self.run(&command)?;
        Ok(UpdateResult {
            matched_count: response.status_u64("matchedCount").unwrap_or(0),
            modified_count: response.status_u64("modifiedCount").unwrap_or(0),
            upserted_id: response.status_value("upsertedId").cloned(),
        })
    }

    /// Update every match, following the service's `moreData` continuation
    /// until the filter is drained. Counts accumulated before a mid-loop
    /// failure are reported in the partial result.
    pub fn update_many(
        &self,
        filter: Value,
        update: Value,
        options: &UpdateOptions,
    ) -> BulkOutcome<UpdateResult> {
        let command = Command::update_many(self.target.clone(), filter, update, options.upsert);
        let (outcomes, complete) = self.drain_more_data(&command, options.overall_timeout);
        aggregate_update(outcomes, complete)
    }

    pub fn delete_one(&self, filter: Value) -> ApiResult<DeleteResult> {
        let command = Command::delete_one(self.target.clone(), filter);
        let response = self.run(&command)?;
        Ok(DeleteResult {
            deleted_count: response.status_u64("deletedCount").unwrap_or(0),
        })
    }

    /// Delete every match, following `moreData` continuations as for
    /// `update_many`.
    pub fn delete_many(
        &self,
        filter: Value,
        options: &DeleteManyOptions,
    ) -> BulkOutcome<DeleteResult> {
        let command = Command::delete_many(self.target.clone(), filter);
        let (outcomes, complete) = self.drain_more_data(&command, options.overall_timeout);
        aggregate_delete(outcomes, complete)
    }

    pub fn count_documents(&self, filter: Option<Value>) -> ApiResult<u64> {
        let command = Command::count_documents(self.target.clone(), filter);
        let response = self.run(&command)?;
        if response.status_bool("moreData") {
            return Err(Error::new(ErrorKind::Service)
                .with_message("count exceeded the server ceiling")
                .with_command("countDocuments")
                .with_collection(self.name()));
        }
        response.status_u64("count").ok_or_else(|| {
            Error::new(ErrorKind::Internal)
                .with_message("count response carried no count")
                .with_command("countDocuments")
        })
    }

    /// Run a heterogeneous batch of write models, one command each, keyed by
    /// input position.
    pub fn bulk_write(
        &self,
        models: Vec<WriteModel>,
        options: &BulkWriteOptions,
    ) -> BulkOutcome<BulkWriteResult> {
        if let Err(err) = options.validate() {
            return BulkOutcome::Fatal(err);
        }
        if models.is_empty() {
            return BulkOutcome::Success(BulkWriteResult::default());
        }
        let model_count = models.len();
        let commands: Vec<Command> = models
            .into_iter()
            .map(|model| model.into_command(self.target.clone()))
            .collect();

        let dispatch = DispatchOptions {
            ordered: options.ordered,
            concurrency: options.effective_concurrency(),
            request_timeout: self.request_timeout,
            deadline: Deadline::from_timeout(options.overall_timeout),
        };
        let outcomes = dispatch_chunks(self.transport.as_ref(), &commands, &dispatch, &self.policy);
        aggregate_bulk_write(outcomes, model_count)
    }

    fn run(&self, command: &Command) -> ApiResult<ApiResponse> {
        run_command(
            self.transport.as_ref(),
            command,
            self.request_timeout,
            &self.policy,
        )
        .map_err(|err| err.with_collection(self.name()))
    }

    /// Re-issue one command while the service reports `moreData`, collecting
    /// an outcome per iteration. Returns the outcomes and whether the loop
    /// drained to completion.
    fn drain_more_data(
        &self,
        command: &Command,
        overall_timeout: Option<Duration>,
    ) -> (Vec<ChunkOutcome>, bool) {
        let deadline = Deadline::from_timeout(overall_timeout);
        let mut outcomes = Vec::new();
        let mut index = 0;
        loop {
            if deadline.expired() {
                outcomes.push(ChunkOutcome {
                    index,
                    result: Err(deadline.exceeded_error(command)),
                });
                return (outcomes, false);
            }
            match execute_with_retry(
                self.transport.as_ref(),
                command,
                self.request_timeout,
                deadline,
                &self.policy,
            ) {
                Ok(response) => {
                    let more = response.status_bool("moreData");
                    let failed = response.has_errors();
                    outcomes.push(ChunkOutcome {
                        index,
                        result: Ok(response),
                    });
                    if failed {
                        return (outcomes, false);
                    }
                    if !more {
                        return (outcomes, true);
                    }
                    index += 1;
                }
                Err(err) => {
                    outcomes.push(ChunkOutcome {
                        index,
                        result: Err(err.with_command(command.name())),
                    });
                    return (outcomes, false);
                }
            }
        }
    }
}

fn run_command(
    transport: &dyn Transport,
    command: &Command,
    request_timeout: Duration,
    policy: &RetryPolicy,
) -> ApiResult<ApiResponse> {
    let response = execute_with_retry(transport, command, request_timeout, Deadline::none(), policy)
        .map_err(|err| err.with_command(command.name()))?;
    if let Some(err) = response.error() {
        return Err(err.with_command(command.name()));
    }
    Ok(response)
}
