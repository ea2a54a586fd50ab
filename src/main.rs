//! Purpose: `quiver` CLI entry point and command dispatch.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Results are emitted as JSON on stdout, one value per line.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind};
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

use quiver_client::api::{
    BulkOutcome, Client, CreateCollectionOptions, DeleteManyOptions, Error, ErrorKind, FindOptions,
    HttpTransport, InsertManyOptions, VectorMetric, to_exit_code,
};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err(Error::new(ErrorKind::Validation)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Run with --help for usage."));
            }
        },
    };

    let client = build_client(&cli)?;
    let database = client.database(&cli.keyspace);

    match cli.command {
        Command::Insert {
            collection,
            documents,
            file,
            ordered,
            chunk_size,
            concurrency,
            overall_timeout,
        } => {
            let documents = read_documents(documents, file)?;
            let mut options = InsertManyOptions {
                ordered,
                concurrency,
                overall_timeout: overall_timeout.map(Duration::from_secs),
                ..InsertManyOptions::new()
            };
            if let Some(chunk_size) = chunk_size {
                options.chunk_size = chunk_size;
            }
            match database.collection(collection).insert_many(documents, &options) {
                BulkOutcome::Success(result) => {
                    emit_json(&json!({"insertedIds": result.ids_in_order()}));
                    Ok(RunOutcome::ok())
                }
                BulkOutcome::Partial(cumulative) => {
                    emit_json(&json!({
                        "insertedIds": cumulative.partial.ids_in_order(),
                        "errors": errors_json(&cumulative.errors),
                    }));
                    Err(first_error(cumulative.errors))
                }
                BulkOutcome::Fatal(err) => Err(err),
            }
        }
        Command::Find {
            collection,
            filter,
            sort,
            vector,
            projection,
            limit,
            similarity,
        } => {
            let options = FindOptions {
                filter: parse_json_arg(filter.as_deref(), "filter")?,
                sort: parse_json_arg(sort.as_deref(), "sort")?,
                vector: vector.as_deref().map(parse_vector).transpose()?,
                projection: parse_json_arg(projection.as_deref(), "projection")?,
                limit,
                include_similarity: similarity,
                overall_timeout: None,
            };
            let cursor = database.collection(collection).find(&options)?;
            for document in cursor {
                emit_json(&document?);
            }
            Ok(RunOutcome::ok())
        }
        Command::Count { collection, filter } => {
            let filter = parse_json_arg(filter.as_deref(), "filter")?;
            let count = database.collection(collection).count_documents(filter)?;
            emit_json(&json!({"count": count}));
            Ok(RunOutcome::ok())
        }
        Command::Delete {
            collection,
            filter,
            one,
        } => {
            let filter = parse_json(&filter, "filter")?;
            let collection = database.collection(collection);
            if one {
                let result = collection.delete_one(filter)?;
                emit_json(&json!({"deletedCount": result.deleted_count}));
                return Ok(RunOutcome::ok());
            }
            match collection.delete_many(filter, &DeleteManyOptions::new()) {
                BulkOutcome::Success(result) => {
                    emit_json(&json!({"deletedCount": result.deleted_count}));
                    Ok(RunOutcome::ok())
                }
                BulkOutcome::Partial(cumulative) => {
                    emit_json(&json!({
                        "deletedCount": cumulative.partial.deleted_count,
                        "errors": errors_json(&cumulative.errors),
                    }));
                    Err(first_error(cumulative.errors))
                }
                BulkOutcome::Fatal(err) => Err(err),
            }
        }
        Command::Collections { command } => match command {
            CollectionsCommand::List => {
                let names = database.list_collection_names()?;
                emit_json(&json!({"collections": names}));
                Ok(RunOutcome::ok())
            }
            CollectionsCommand::Create {
                name,
                dimension,
                metric,
            } => {
                let options = CreateCollectionOptions {
                    dimension,
                    metric: metric.map(MetricCli::into_metric),
                    indexing: None,
                };
                database.create_collection(name.as_str(), &options)?;
                emit_json(&json!({"created": name}));
                Ok(RunOutcome::ok())
            }
            CollectionsCommand::Delete { name } => {
                database.delete_collection(name.as_str())?;
                emit_json(&json!({"deleted": name}));
                Ok(RunOutcome::ok())
            }
        },
    }
}

#[derive(Parser)]
#[command(
    name = "quiver",
    version,
    about = "Client for the Quiver Data API",
    help_template = r#"{about-with-newline}
{before-help}USAGE
  {usage}

COMMANDS
{subcommands}

OPTIONS
{options}

{after-help}
"#,
    before_help = r#"Documents are JSON. Every command posts to one keyspace of a Quiver endpoint.

Mental model:
  - `insert` writes documents (chunked, bounded concurrency)
  - `find` streams matching documents (lazy pages)
  - `delete` removes matching documents
"#,
    after_help = r#"EXAMPLES
  $ quiver --url http://localhost:8181 collections create events --dimension 3
  $ quiver --url http://localhost:8181 insert events '{"kind":"login"}' '{"kind":"logout"}'
  $ quiver --url http://localhost:8181 find events --vector 0.1,0.2,0.3 --similarity --limit 5
  $ quiver --url http://localhost:8181 count events --filter '{"kind":"login"}'

LEARN MORE
  $ quiver <command> --help"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        help = "Base URL of the Quiver endpoint, e.g. https://db.example.com",
        value_hint = ValueHint::Url
    )]
    url: String,
    #[arg(long, default_value = "default", help = "Keyspace addressed by every command")]
    keyspace: String,
    #[arg(
        long,
        help = "Bearer token (dev-only; prefer --token-file)",
        conflicts_with = "token_file",
        help_heading = "Auth/TLS"
    )]
    token: Option<String>,
    #[arg(
        long,
        value_name = "PATH",
        help = "Read the bearer token from a file",
        value_hint = ValueHint::FilePath,
        help_heading = "Auth/TLS"
    )]
    token_file: Option<PathBuf>,
    #[arg(
        long = "tls-ca",
        value_name = "PATH",
        help = "Trust this PEM CA/certificate for TLS",
        value_hint = ValueHint::FilePath,
        help_heading = "Auth/TLS"
    )]
    tls_ca: Option<PathBuf>,
    #[arg(long, value_name = "SECONDS", help = "Per-request timeout (default 30)")]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(
        arg_required_else_help = true,
        about = "Insert documents into a collection",
        after_help = r#"EXAMPLES
  $ quiver --url $URL insert events '{"kind":"login"}'
  $ quiver --url $URL insert events -f documents.json --ordered
  $ quiver --url $URL insert events -f events.jsonl --chunk-size 20 --concurrency 4

NOTES
  - Unordered (default): every chunk is attempted; all failures are reported together
  - `--ordered` stops at the first failing chunk, like a sequential script
  - On partial failure the inserted ids so far are still printed"#
    )]
    Insert {
        #[arg(help = "Target collection")]
        collection: String,
        #[arg(help = "Inline JSON documents")]
        documents: Vec<String>,
        #[arg(
            short = 'f',
            long = "file",
            help = "Read documents from a file (JSON array or JSON Lines)",
            conflicts_with = "documents",
            value_hint = ValueHint::FilePath
        )]
        file: Option<PathBuf>,
        #[arg(long, help = "Stop at the first failing chunk")]
        ordered: bool,
        #[arg(long, value_name = "N", help = "Documents per request (default 50)")]
        chunk_size: Option<usize>,
        #[arg(long, value_name = "N", help = "Concurrent requests for unordered inserts")]
        concurrency: Option<usize>,
        #[arg(long, value_name = "SECONDS", help = "Overall deadline for the whole insert")]
        overall_timeout: Option<u64>,
    },
    #[command(
        about = "Find documents, streaming one JSON document per line",
        after_help = r#"EXAMPLES
  $ quiver --url $URL find events --filter '{"kind":"login"}' --limit 10
  $ quiver --url $URL find events --sort '{"at":-1}' --projection '{"kind":1}'
  $ quiver --url $URL find events --vector 0.1,0.2,0.3 --similarity

NOTES
  - `--vector` asks the service for similarity order; the client never re-sorts
  - `--similarity` attaches a $similarity score to each document (requires --vector)"#
    )]
    Find {
        #[arg(help = "Target collection")]
        collection: String,
        #[arg(long, help = "JSON filter document")]
        filter: Option<String>,
        #[arg(long, help = "JSON sort document (conflicts with --vector)")]
        sort: Option<String>,
        #[arg(long, value_name = "F32,F32,...", help = "Query vector for similarity search")]
        vector: Option<String>,
        #[arg(long, help = "JSON projection document")]
        projection: Option<String>,
        #[arg(long, value_name = "N", help = "Stop after N documents")]
        limit: Option<usize>,
        #[arg(long, help = "Include a $similarity score per document")]
        similarity: bool,
    },
    #[command(about = "Count documents matching a filter")]
    Count {
        #[arg(help = "Target collection")]
        collection: String,
        #[arg(long, help = "JSON filter document")]
        filter: Option<String>,
    },
    #[command(
        arg_required_else_help = true,
        about = "Delete documents matching a filter",
        after_help = r#"EXAMPLES
  $ quiver --url $URL delete events --filter '{"stale":true}'
  $ quiver --url $URL delete events --filter '{"_id":"a1"}' --one"#
    )]
    Delete {
        #[arg(help = "Target collection")]
        collection: String,
        #[arg(long, help = "JSON filter document")]
        filter: String,
        #[arg(long, help = "Delete at most one document")]
        one: bool,
    },
    #[command(arg_required_else_help = true, about = "Manage collections in the keyspace")]
    Collections {
        #[command(subcommand)]
        command: CollectionsCommand,
    },
}

#[derive(Subcommand)]
enum CollectionsCommand {
    #[command(about = "List collection names")]
    List,
    #[command(about = "Create a collection, optionally vector-enabled")]
    Create {
        #[arg(help = "Collection name")]
        name: String,
        #[arg(long, value_name = "N", help = "Vector dimension; enables similarity search")]
        dimension: Option<usize>,
        #[arg(long, value_enum, help = "Similarity metric (requires --dimension)")]
        metric: Option<MetricCli>,
    },
    #[command(about = "Delete a collection and its documents")]
    Delete {
        #[arg(help = "Collection name")]
        name: String,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum MetricCli {
    Cosine,
    DotProduct,
    Euclidean,
}

impl MetricCli {
    fn into_metric(self) -> VectorMetric {
        match self {
            MetricCli::Cosine => VectorMetric::Cosine,
            MetricCli::DotProduct => VectorMetric::DotProduct,
            MetricCli::Euclidean => VectorMetric::Euclidean,
        }
    }
}

fn build_client(cli: &Cli) -> Result<Client, Error> {
    let mut transport = HttpTransport::new(cli.url.clone())?;
    if let Some(path) = &cli.tls_ca {
        transport = transport.with_tls_ca_file(path)?;
    }
    if let Some(token) = resolve_token(cli)? {
        transport = transport.with_token(token);
    }
    let mut client = Client::with_transport(Arc::new(transport));
    if let Some(timeout) = cli.timeout {
        client = client.with_request_timeout(Duration::from_secs(timeout));
    }
    Ok(client)
}

fn resolve_token(cli: &Cli) -> Result<Option<String>, Error> {
    if let Some(token) = &cli.token {
        return Ok(Some(token.clone()));
    }
    let Some(path) = &cli.token_file else {
        return Ok(None);
    };
    let raw = std::fs::read_to_string(path).map_err(|err| {
        Error::new(ErrorKind::Validation)
            .with_message(format!("failed to read token file {}", path.display()))
            .with_source(err)
    })?;
    let token = raw.trim();
    if token.is_empty() {
        return Err(Error::new(ErrorKind::Validation)
            .with_message(format!("token file {} is empty", path.display())));
    }
    Ok(Some(token.to_string()))
}

fn read_documents(inline: Vec<String>, file: Option<PathBuf>) -> Result<Vec<Value>, Error> {
    if let Some(path) = file {
        let raw = std::fs::read_to_string(&path).map_err(|err| {
            Error::new(ErrorKind::Validation)
                .with_message(format!("failed to read {}", path.display()))
                .with_source(err)
        })?;
        return parse_document_stream(&raw);
    }
    if inline.is_empty() {
        return Err(Error::new(ErrorKind::Validation)
            .with_message("no documents given")
            .with_hint("Pass inline JSON documents or --file."));
    }
    inline
        .iter()
        .map(|raw| parse_json(raw, "document"))
        .collect()
}

/// Accepts one JSON value (an array is a batch) or JSON Lines.
fn parse_document_stream(raw: &str) -> Result<Vec<Value>, Error> {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return Ok(match value {
            Value::Array(documents) => documents,
            other => vec![other],
        });
    }
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| parse_json(line, "document"))
        .collect()
}

fn parse_json(raw: &str, what: &str) -> Result<Value, Error> {
    serde_json::from_str(raw).map_err(|err| {
        Error::new(ErrorKind::Validation)
            .with_message(format!("invalid JSON {what}"))
            .with_hint(format!("Could not parse: {raw}"))
            .with_source(err)
    })
}

fn parse_json_arg(raw: Option<&str>, what: &str) -> Result<Option<Value>, Error> {
    raw.map(|raw| parse_json(raw, what)).transpose()
}

fn parse_vector(raw: &str) -> Result<Vec<f32>, Error> {
    raw.split(',')
        .map(str::trim)
        .map(|component| {
            component.parse::<f32>().map_err(|err| {
                Error::new(ErrorKind::Validation)
                    .with_message(format!("invalid vector component {component:?}"))
                    .with_hint("Pass comma-separated numbers, e.g. --vector 0.1,0.2,0.3")
                    .with_source(err)
            })
        })
        .collect()
}

fn first_error(errors: Vec<Error>) -> Error {
    errors.into_iter().next().unwrap_or_else(|| {
        Error::new(ErrorKind::Internal).with_message("bulk operation incomplete")
    })
}

fn emit_json(value: &Value) {
    let json = serde_json::to_string(value)
        .unwrap_or_else(|_| "{\"error\":{\"kind\":\"Internal\"}}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(code) = err.code() {
        lines.push(format!("code: {code}"));
    }
    if let Some(status) = err.status() {
        lines.push(format!("http status: {status}"));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(code) = err.code() {
        inner.insert("code".to_string(), json!(code));
    }
    if let Some(status) = err.status() {
        inner.insert("status".to_string(), json!(status));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn errors_json(errors: &[Error]) -> Vec<Value> {
    errors.iter().map(error_json).collect()
}

fn error_message(err: &Error) -> String {
    err.message()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{:?} error", err.kind()))
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        causes.push(cause.to_string());
        source = cause.source();
    }
    causes
}

fn clap_error_summary(err: &clap::Error) -> String {
    err.to_string()
        .lines()
        .next()
        .unwrap_or("invalid arguments")
        .trim_start_matches("error: ")
        .to_string()
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::{error_json, parse_document_stream, parse_vector};
    use quiver_client::api::{Error, ErrorKind};
    use serde_json::json;

    #[test]
    fn parse_vector_accepts_comma_list() {
        assert_eq!(
            parse_vector("0.1, 0.2,0.3").expect("vector"),
            vec![0.1, 0.2, 0.3]
        );
    }

    #[test]
    fn parse_vector_rejects_garbage() {
        let err = parse_vector("0.1,x").expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn document_stream_detects_array_and_jsonl() {
        let array = parse_document_stream(r#"[{"a":1},{"a":2}]"#).expect("array");
        assert_eq!(array.len(), 2);

        let jsonl = parse_document_stream("{\"a\":1}\n\n{\"a\":2}\n").expect("jsonl");
        assert_eq!(jsonl, vec![json!({"a":1}), json!({"a":2})]);

        let single = parse_document_stream(r#"{"a":1}"#).expect("single");
        assert_eq!(single.len(), 1);
    }

    #[test]
    fn error_json_carries_context() {
        let err = Error::new(ErrorKind::Service)
            .with_message("rejected")
            .with_code("INVALID_FILTER")
            .with_status(422);
        let value = error_json(&err);
        assert_eq!(value["error"]["kind"], json!("Service"));
        assert_eq!(value["error"]["code"], json!("INVALID_FILTER"));
        assert_eq!(value["error"]["status"], json!(422));
    }
}
