//! Purpose: Per-operation option structs with local, fail-fast validation.
//! Exports: option types for insert/find/update/delete/bulk-write and
//! collection creation, plus shared defaults.
//! Role: The enumerated configuration surface; every recognized key is a field.
//! Invariants: `validate` rejects malformed or mutually exclusive settings
//! before any command is built or dispatched.
use std::time::Duration;

use serde_json::{Map, Value};

use crate::core::dispatch::DEFAULT_CONCURRENCY;
use crate::core::error::{Error, ErrorKind};

/// Service-advertised maximum documents per insert request.
pub const DEFAULT_CHUNK_SIZE: usize = 50;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct InsertManyOptions {
    /// Stop-on-first-failure, sequential-script semantics when true.
    pub ordered: bool,
    /// Worker bound for unordered dispatch; `None` resolves to the default
    /// (and to 1 when ordered).
    pub concurrency: Option<usize>,
    /// Override for the per-request document ceiling; rarely needed.
    pub chunk_size: usize,
    pub overall_timeout: Option<Duration>,
}

impl InsertManyOptions {
    pub fn new() -> Self {
        Self {
            ordered: false,
            concurrency: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            overall_timeout: None,
        }
    }

    pub fn ordered() -> Self {
        Self {
            ordered: true,
            ..Self::new()
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.chunk_size == 0 {
            return Err(
                Error::new(ErrorKind::Validation).with_message("chunk size must be positive")
            );
        }
        validate_concurrency(self.ordered, self.concurrency)
    }

    pub fn effective_concurrency(&self) -> usize {
        resolve_concurrency(self.ordered, self.concurrency)
    }
}

impl Default for InsertManyOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct BulkWriteOptions {
    pub ordered: bool,
    pub concurrency: Option<usize>,
    pub overall_timeout: Option<Duration>,
}

impl BulkWriteOptions {
    pub fn new() -> Self {
        Self {
            ordered: false,
            concurrency: None,
            overall_timeout: None,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        validate_concurrency(self.ordered, self.concurrency)
    }

    pub fn effective_concurrency(&self) -> usize {
        resolve_concurrency(self.ordered, self.concurrency)
    }
}

impl Default for BulkWriteOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Default)]
pub struct UpdateOptions {
    /// Insert a new document when the filter matches nothing.
    pub upsert: bool,
    pub overall_timeout: Option<Duration>,
}

impl UpdateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert() -> Self {
        Self {
            upsert: true,
            overall_timeout: None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct DeleteManyOptions {
    pub overall_timeout: Option<Duration>,
}

impl DeleteManyOptions {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Clone, Debug, Default)]
pub struct FindOptions {
    pub filter: Option<Value>,
    /// Field-based sort; mutually exclusive with `vector`.
    pub sort: Option<Value>,
    /// Vector-similarity sort; the service ranks, the client never re-sorts.
    pub vector: Option<Vec<f32>>,
    pub projection: Option<Value>,
    /// Overall item cap, enforced by the cursor independent of page size.
    pub limit: Option<usize>,
    /// Attach a `$similarity` score to each document; requires `vector`.
    pub include_similarity: bool,
    pub overall_timeout: Option<Duration>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.limit == Some(0) {
            return Err(Error::new(ErrorKind::Validation).with_message("limit must be positive"));
        }
        if self.sort.is_some() && self.vector.is_some() {
            return Err(Error::new(ErrorKind::Validation)
                .with_message("sort and vector are mutually exclusive")
                .with_hint("Use vector for similarity search or sort for field ordering."));
        }
        if self.include_similarity && self.vector.is_none() {
            return Err(Error::new(ErrorKind::Validation)
                .with_message("includeSimilarity requires a vector sort"));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VectorMetric {
    Cosine,
    DotProduct,
    Euclidean,
}

impl VectorMetric {
    pub fn as_str(self) -> &'static str {
        match self {
            VectorMetric::Cosine => "cosine",
            VectorMetric::DotProduct => "dot_product",
            VectorMetric::Euclidean => "euclidean",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct CreateCollectionOptions {
    /// Vector dimension; enables similarity search on the collection.
    pub dimension: Option<usize>,
    pub metric: Option<VectorMetric>,
    /// Indexing policy document, e.g. `{"deny": ["blob"]}`.
    pub indexing: Option<Value>,
}

impl CreateCollectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.metric.is_some() && self.dimension.is_none() {
            return Err(Error::new(ErrorKind::Validation)
                .with_message("a similarity metric requires a vector dimension"));
        }
        if self.dimension == Some(0) {
            return Err(
                Error::new(ErrorKind::Validation).with_message("vector dimension must be positive")
            );
        }
        Ok(())
    }

    pub fn to_command_options(&self) -> Map<String, Value> {
        let mut options = Map::new();
        if let Some(dimension) = self.dimension {
            let mut vector = Map::new();
            vector.insert("dimension".to_string(), Value::from(dimension as u64));
            if let Some(metric) = self.metric {
                vector.insert("metric".to_string(), Value::String(metric.as_str().into()));
            }
            options.insert("vector".to_string(), Value::Object(vector));
        }
        if let Some(indexing) = &self.indexing {
            options.insert("indexing".to_string(), indexing.clone());
        }
        options
    }
}

fn validate_concurrency(ordered: bool, concurrency: Option<usize>) -> Result<(), Error> {
    match concurrency {
        Some(0) => {
            Err(Error::new(ErrorKind::Validation).with_message("concurrency must be positive"))
        }
        Some(workers) if ordered && workers > 1 => Err(Error::new(ErrorKind::Validation)
            .with_message("ordered dispatch requires concurrency 1")
            .with_hint("Drop the concurrency override or use unordered semantics.")),
        _ => Ok(()),
    }
}

fn resolve_concurrency(ordered: bool, concurrency: Option<usize>) -> usize {
    if ordered {
        1
    } else {
        concurrency.unwrap_or(DEFAULT_CONCURRENCY)
    }
}
