//! Purpose: Execute planned chunks with bounded concurrency and ordered/unordered semantics.
//! Exports: `DispatchOptions`, `dispatch_chunks`, `DEFAULT_CONCURRENCY`.
//! Role: Worker layer between the chunk planner and the retry governor.
//! Invariants: Ordered mode keeps one chunk in flight and halts at the first failure;
//! later chunks are never attempted.
//! Invariants: Unordered mode attempts every chunk and reports outcomes in
//! chunk-start order regardless of completion order.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tracing::debug;

use crate::core::command::Command;
use crate::core::outcome::ChunkOutcome;
use crate::core::retry::{execute_with_retry, Deadline, RetryPolicy};
use crate::core::transport::Transport;
use std::time::Duration;

pub const DEFAULT_CONCURRENCY: usize = 8;

#[derive(Clone, Debug)]
pub struct DispatchOptions {
    pub ordered: bool,
    pub concurrency: usize,
    pub request_timeout: Duration,
    pub deadline: Deadline,
}

/// Run every command of a chunk plan through the governor. The returned
/// outcomes are sorted by chunk index; in ordered mode the list stops at the
/// first failing chunk.
pub fn dispatch_chunks(
    transport: &dyn Transport,
    commands: &[Command],
    options: &DispatchOptions,
    policy: &RetryPolicy,
) -> Vec<ChunkOutcome> {
    if commands.is_empty() {
        return Vec::new();
    }
    if options.ordered {
        dispatch_ordered(transport, commands, options, policy)
    } else {
        dispatch_unordered(transport, commands, options, policy)
    }
}

fn dispatch_ordered(
    transport: &dyn Transport,
    commands: &[Command],
    options: &DispatchOptions,
    policy: &RetryPolicy,
) -> Vec<ChunkOutcome> {
    let mut outcomes = Vec::with_capacity(commands.len());
    for (index, command) in commands.iter().enumerate() {
        if options.deadline.expired() {
            outcomes.push(ChunkOutcome {
                index,
                result: Err(options.deadline.exceeded_error(command)),
            });
            break;
        }
        let result = execute_with_retry(
            transport,
            command,
            options.request_timeout,
            options.deadline,
            policy,
        );
        let failed = match &result {
            Err(_) => true,
            Ok(response) => response.has_errors(),
        };
        outcomes.push(ChunkOutcome { index, result });
        if failed {
            debug!(chunk = index, "ordered dispatch halted at failing chunk");
            break;
        }
    }
    outcomes
}

fn dispatch_unordered(
    transport: &dyn Transport,
    commands: &[Command],
    options: &DispatchOptions,
    policy: &RetryPolicy,
) -> Vec<ChunkOutcome> {
    let workers = options.concurrency.clamp(1, commands.len());
    let next = AtomicUsize::new(0);
    let slots: Mutex<Vec<Option<ChunkOutcome>>> =
        Mutex::new((0..commands.len()).map(|_| None).collect());

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let index = next.fetch_add(1, Ordering::Relaxed);
                if index >= commands.len() {
                    break;
                }
                let command = &commands[index];
                let result = if options.deadline.expired() {
                    debug!(chunk = index, "deadline exceeded before chunk dispatch");
                    Err(options.deadline.exceeded_error(command))
                } else {
                    execute_with_retry(
                        transport,
                        command,
                        options.request_timeout,
                        options.deadline,
                        policy,
                    )
                };
                slots.lock().expect("outcome slots")[index] = Some(ChunkOutcome { index, result });
            });
        }
    });

    slots
        .into_inner()
        .expect("outcome slots")
        .into_iter()
        .flatten()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{dispatch_chunks, DispatchOptions};
    use crate::core::command::{Command, CommandTarget};
    use crate::core::error::{Error, ErrorKind};
    use crate::core::response::ApiResponse;
    use crate::core::retry::{Deadline, RetryPolicy};
    use crate::core::transport::Transport;
    use serde_json::{from_value, json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Fails any chunk whose first document carries `"fail": true`; records
    /// which chunks it saw and the peak number of in-flight calls.
    struct ChunkedTransport {
        seen: Mutex<Vec<u64>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ChunkedTransport {
        fn new() -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        fn seen(&self) -> Vec<u64> {
            let mut seen = self.seen.lock().expect("seen").clone();
            seen.sort_unstable();
            seen
        }
    }

    impl Transport for ChunkedTransport {
        fn execute(&self, command: &Command, _timeout: Duration) -> Result<ApiResponse, Error> {
            let body = command.body();
            let first = &body["insertMany"]["documents"][0];
            let chunk = first["chunk"].as_u64().expect("chunk marker");
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
            self.seen.lock().expect("seen").push(chunk);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if first["fail"].as_bool().unwrap_or(false) {
                return Err(Error::new(ErrorKind::Service)
                    .with_message(format!("chunk {chunk} rejected")));
            }
            Ok(from_value(json!({"status": {"insertedIds": [chunk]}})).expect("response"))
        }
    }

    fn chunk_command(chunk: u64, fail: bool) -> Command {
        let doc: Value = json!({"chunk": chunk, "fail": fail});
        Command::insert_many(CommandTarget::collection("app", "events"), vec![doc], false)
    }

    fn options(ordered: bool, concurrency: usize) -> DispatchOptions {
        DispatchOptions {
            ordered,
            concurrency,
            request_timeout: Duration::from_secs(1),
            deadline: Deadline::none(),
        }
    }

    #[test]
    fn unordered_attempts_every_chunk_and_sorts_outcomes() {
        let transport = ChunkedTransport::new();
        let commands = vec![
            chunk_command(0, true),
            chunk_command(1, false),
            chunk_command(2, true),
            chunk_command(3, false),
        ];
        let outcomes = dispatch_chunks(
            &transport,
            &commands,
            &options(false, 3),
            &RetryPolicy::none(),
        );

        assert_eq!(transport.seen(), vec![0, 1, 2, 3]);
        assert_eq!(outcomes.len(), 4);
        let indices: Vec<usize> = outcomes.iter().map(|outcome| outcome.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!(outcomes[0].result.is_err());
        assert!(outcomes[1].result.is_ok());
        assert!(outcomes[2].result.is_err());
        assert!(outcomes[3].result.is_ok());
    }

    #[test]
    fn unordered_respects_concurrency_bound() {
        let transport = ChunkedTransport::new();
        let commands: Vec<Command> = (0..8).map(|chunk| chunk_command(chunk, false)).collect();
        dispatch_chunks(
            &transport,
            &commands,
            &options(false, 2),
            &RetryPolicy::none(),
        );
        assert!(transport.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(transport.seen().len(), 8);
    }

    #[test]
    fn ordered_halts_at_first_failure() {
        let transport = ChunkedTransport::new();
        let commands = vec![
            chunk_command(0, false),
            chunk_command(1, true),
            chunk_command(2, false),
        ];
        let outcomes = dispatch_chunks(
            &transport,
            &commands,
            &options(true, 1),
            &RetryPolicy::none(),
        );

        assert_eq!(transport.seen(), vec![0, 1]);
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].result.is_ok());
        assert!(outcomes[1].result.is_err());
    }

    #[test]
    fn expired_deadline_blocks_all_dispatch() {
        let transport = ChunkedTransport::new();
        let commands = vec![chunk_command(0, false), chunk_command(1, false)];
        let mut opts = options(false, 2);
        opts.deadline = Deadline::within(Duration::ZERO);
        let outcomes = dispatch_chunks(&transport, &commands, &opts, &RetryPolicy::none());

        assert!(transport.seen().is_empty());
        assert_eq!(outcomes.len(), 2);
        for outcome in &outcomes {
            let err = outcome.result.as_ref().expect_err("timeout");
            assert_eq!(err.kind(), ErrorKind::Timeout);
        }
    }

    #[test]
    fn empty_plan_dispatches_nothing() {
        let transport = ChunkedTransport::new();
        let outcomes = dispatch_chunks(&transport, &[], &options(false, 4), &RetryPolicy::none());
        assert!(outcomes.is_empty());
        assert!(transport.seen().is_empty());
    }
}
