//! Purpose: Shared test harness for driving the public API without a server.
//! Role: Scripted in-process transport standing in for the wire peer.
//! Invariants: Handlers see commands in dispatch order per call index.
//! Invariants: Request bodies are recorded before the handler runs.
#![allow(dead_code)]
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use quiver_client::api::{ApiResponse, Client, Collection, Command, Error, Transport};
use serde_json::Value;

type Handler = dyn Fn(&Command, usize) -> Result<ApiResponse, Error> + Send + Sync;

/// Transport double driven by a closure; `call` is the zero-based index of
/// the wire call, counted across retries.
pub struct ScriptedTransport {
    handler: Box<Handler>,
    requests: Mutex<Vec<Value>>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&Command, usize) -> Result<ApiResponse, Error> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn request_bodies(&self) -> Vec<Value> {
        self.requests.lock().expect("requests").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, command: &Command, _timeout: Duration) -> Result<ApiResponse, Error> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().expect("requests").push(command.body());
        (self.handler)(command, call)
    }
}

pub fn response(body: Value) -> ApiResponse {
    serde_json::from_value(body).expect("scripted response")
}

pub fn events_collection(transport: Arc<ScriptedTransport>) -> Collection {
    Client::with_transport(transport)
        .database("app")
        .collection("events")
}

pub fn client(transport: Arc<ScriptedTransport>) -> Client {
    Client::with_transport(transport)
}
