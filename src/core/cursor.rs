//! Purpose: Lazy, pull-based iteration over paginated find results.
//! Exports: `FindCursor`, `CursorState`.
//! Role: Stateful page-following engine behind every find operation.
//! Invariants: Page fetches are strictly sequential per cursor; the continuation
//! token of page K is required to request page K+1.
//! Invariants: Find parameters are frozen once iteration starts; results are
//! yielded in service order, never re-sorted.
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::debug;

use crate::core::command::{Command, CommandTarget};
use crate::core::error::{Error, ErrorKind};
use crate::core::retry::{execute_with_retry, Deadline, RetryPolicy};
use crate::core::transport::Transport;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CursorState {
    NotStarted,
    Started,
    Exhausted,
    Closed,
}

/// A finite, forward-only cursor over one find operation. Sharing a cursor
/// across threads requires external synchronization; every advance needs
/// `&mut self` and a cursor never has two page fetches in flight.
pub struct FindCursor {
    transport: Arc<dyn Transport>,
    target: CommandTarget,
    filter: Option<Value>,
    sort: Option<Value>,
    projection: Option<Value>,
    include_similarity: bool,
    limit: Option<usize>,
    request_timeout: Duration,
    deadline: Deadline,
    policy: RetryPolicy,
    state: CursorState,
    buffer: VecDeque<Value>,
    page_state: Option<String>,
    yielded: usize,
    fetches: usize,
}

impl std::fmt::Debug for FindCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FindCursor")
            .field("target", &self.target)
            .field("filter", &self.filter)
            .field("sort", &self.sort)
            .field("projection", &self.projection)
            .field("include_similarity", &self.include_similarity)
            .field("limit", &self.limit)
            .field("request_timeout", &self.request_timeout)
            .field("deadline", &self.deadline)
            .field("policy", &self.policy)
            .field("state", &self.state)
            .field("buffer", &self.buffer)
            .field("page_state", &self.page_state)
            .field("yielded", &self.yielded)
            .field("fetches", &self.fetches)
            .finish()
    }
}

impl FindCursor {
    pub fn new(
        transport: Arc<dyn Transport>,
        target: CommandTarget,
        request_timeout: Duration,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            target,
            filter: None,
            sort: None,
            projection: None,
            include_similarity: false,
            limit: None,
            request_timeout,
            deadline: Deadline::none(),
            policy,
            state: CursorState::NotStarted,
            buffer: VecDeque::new(),
            page_state: None,
            yielded: 0,
            fetches: 0,
        }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Number of page fetches issued so far.
    pub fn pages_fetched(&self) -> usize {
        self.fetches
    }

    pub fn with_filter(mut self, filter: Value) -> Result<Self, Error> {
        self.ensure_not_started("filter")?;
        self.filter = Some(filter);
        Ok(self)
    }

    pub fn with_sort(mut self, sort: Value) -> Result<Self, Error> {
        self.ensure_not_started("sort")?;
        self.sort = Some(sort);
        Ok(self)
    }

    /// Vector-similarity sort; the service ranks, the cursor only follows.
    pub fn with_vector(mut self, vector: Vec<f32>) -> Result<Self, Error> {
        self.ensure_not_started("vector sort")?;
        let components: Vec<Value> = vector.into_iter().map(|v| Value::from(f64::from(v))).collect();
        let mut sort = Map::new();
        sort.insert("$vector".to_string(), Value::Array(components));
        self.sort = Some(Value::Object(sort));
        Ok(self)
    }

    pub fn with_projection(mut self, projection: Value) -> Result<Self, Error> {
        self.ensure_not_started("projection")?;
        self.projection = Some(projection);
        Ok(self)
    }

    pub fn with_limit(mut self, limit: usize) -> Result<Self, Error> {
        self.ensure_not_started("limit")?;
        if limit == 0 {
            return Err(
                Error::new(ErrorKind::Validation).with_message("cursor limit must be positive")
            );
        }
        self.limit = Some(limit);
        Ok(self)
    }

    pub fn with_include_similarity(mut self, include: bool) -> Result<Self, Error> {
        self.ensure_not_started("similarity option")?;
        self.include_similarity = include;
        Ok(self)
    }

    pub fn with_overall_timeout(mut self, budget: Duration) -> Result<Self, Error> {
        self.ensure_not_started("overall timeout")?;
        self.deadline = Deadline::within(budget);
        Ok(self)
    }

    /// Pull the next document, fetching the next page when the buffer drains.
    /// Exhausted and closed cursors yield `None`; a fresh find call is
    /// required to iterate again.
    pub fn next_document(&mut self) -> Result<Option<Value>, Error> {
        loop {
            match self.state {
                CursorState::Exhausted | CursorState::Closed => return Ok(None),
                CursorState::NotStarted | CursorState::Started => {}
            }
            if self.limit.is_some_and(|limit| self.yielded >= limit) {
                self.state = CursorState::Exhausted;
                self.buffer.clear();
                return Ok(None);
            }
            if let Some(document) = self.buffer.pop_front() {
                self.yielded += 1;
                return Ok(Some(document));
            }
            if self.state == CursorState::Started && self.page_state.is_none() {
                self.state = CursorState::Exhausted;
                return Ok(None);
            }
            self.fetch_page()?;
        }
    }

    /// Collect every remaining document into a vector.
    pub fn collect_documents(mut self) -> Result<Vec<Value>, Error> {
        let mut documents = Vec::new();
        while let Some(document) = self.next_document()? {
            documents.push(document);
        }
        Ok(documents)
    }

    /// Stop iterating; frees the buffer and refuses further fetches.
    pub fn close(&mut self) {
        self.state = CursorState::Closed;
        self.buffer.clear();
        self.page_state = None;
    }

    fn ensure_not_started(&self, what: &str) -> Result<(), Error> {
        if self.state == CursorState::NotStarted {
            return Ok(());
        }
        Err(Error::new(ErrorKind::State)
            .with_message(format!("cannot change {what} after cursor iteration started")))
    }

    fn fetch_page(&mut self) -> Result<(), Error> {
        self.state = CursorState::Started;
        let mut options = Map::new();
        if let Some(limit) = self.limit {
            options.insert("limit".to_string(), Value::from(limit as u64));
        }
        if self.include_similarity {
            options.insert("includeSimilarity".to_string(), Value::Bool(true));
        }
        if let Some(page_state) = &self.page_state {
            options.insert("pageState".to_string(), Value::String(page_state.clone()));
        }
        let command = Command::find(
            self.target.clone(),
            self.filter.clone(),
            self.sort.clone(),
            self.projection.clone(),
            options,
        );

        let response = execute_with_retry(
            self.transport.as_ref(),
            &command,
            self.request_timeout,
            self.deadline,
            &self.policy,
        )?;
        if let Some(err) = response.error() {
            return Err(err
                .with_command("find")
                .with_collection(self.target.collection_name().unwrap_or_default()));
        }
        let data = response.data.ok_or_else(|| {
            Error::new(ErrorKind::Internal)
                .with_message("find response carried neither data nor errors")
        })?;

        self.fetches += 1;
        debug!(
            documents = data.documents.len(),
            more = data.next_page_state.is_some(),
            "fetched cursor page"
        );
        self.page_state = data.next_page_state;
        self.buffer.extend(data.documents);
        Ok(())
    }
}

impl Iterator for FindCursor {
    type Item = Result<Value, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_document().transpose()
    }
}
