//! Request loop: framed requests in, framed responses out.
//!
//! Each tool request is served on its own thread, so a `stop_debug` is not queued
//! behind a command that waits for a running program. Requests to the same session
//! are serialized by the session itself (a second caller gets a `busy` error).

use crate::driver::error::Error;
use crate::driver::registry::SessionRegistry;
use crate::ui::tools::{self, Tool};
use crate::ui::transport::Transport;
use anyhow::Context;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Name of the command that ends the request loop.
pub const SHUTDOWN: &str = "shutdown";

/// Simple file-based tracer for request/response traffic.
#[derive(Clone)]
pub struct FileTracer {
    file: Arc<Mutex<std::fs::File>>,
}

impl FileTracer {
    pub fn new(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open trace file {}", path.display()))?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }

    fn line(&self, text: &str) {
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{text}");
        }
    }
}

/// Request envelope.
#[derive(Debug, Deserialize)]
struct Request {
    seq: i64,
    #[serde(rename = "type")]
    r#type: String,
    command: String,
    #[serde(default)]
    arguments: Value,
}

/// Response envelope. `body` carries the tool payload, or `{"error": ...}` when
/// `success` is false.
#[derive(Debug, Serialize)]
struct Response {
    seq: i64,
    #[serde(rename = "type")]
    r#type: &'static str,
    request_seq: i64,
    success: bool,
    command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    body: Value,
}

struct Shared {
    transport: Arc<dyn Transport>,
    registry: Arc<SessionRegistry>,
    tracer: Option<FileTracer>,
    seq: AtomicI64,
}

impl Shared {
    fn send(&self, request_seq: i64, command: String, result: Result<Value, Value>) {
        let (success, message, body) = match result {
            Ok(body) => (true, None, body),
            Err(body) => {
                let message = body["error"]["message"].as_str().map(ToString::to_string);
                (false, message, body)
            }
        };
        let response = Response {
            seq: self.seq.fetch_add(1, Ordering::SeqCst) + 1,
            r#type: "response",
            request_seq,
            success,
            command,
            message,
            body,
        };

        let value = match serde_json::to_value(&response) {
            Ok(v) => v,
            Err(e) => {
                warn!(target: "server", "serialize response: {e:#}");
                return;
            }
        };
        if let Some(tracer) = &self.tracer {
            tracer.line(&format!("-> {value}"));
        }
        if let Err(e) = self.transport.write_message(&value) {
            warn!(target: "server", "write response: {e:#}");
        }
    }

    fn handle(&self, tool: Tool, request: Request) {
        debug!(target: "server", "request {} {}", request.seq, request.command);
        let result = tools::call(&self.registry, tool, request.arguments)
            .map_err(|e| tools::error_payload(&e));
        self.send(request.seq, request.command, result);
    }
}

fn unknown_command(command: &str) -> Value {
    json!({"error": {"kind": "unknown_command", "message": format!("unknown command: {command}")}})
}

/// Serves requests from a transport until a shutdown request or EOF.
pub struct Server {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl Server {
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<SessionRegistry>,
        tracer: Option<FileTracer>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                registry,
                tracer,
                seq: AtomicI64::new(0),
            }),
            workers: vec![],
        }
    }

    /// Run the request loop. All sessions are stopped before return.
    pub fn run(mut self) -> anyhow::Result<()> {
        let result = self.serve();
        self.shutdown();
        result
    }

    fn serve(&mut self) -> anyhow::Result<()> {
        loop {
            let Some(message) = self.shared.transport.read_message()? else {
                info!(target: "server", "input closed");
                return Ok(());
            };
            if let Some(tracer) = &self.shared.tracer {
                tracer.line(&format!("<- {message}"));
            }

            let request: Request = match serde_json::from_value(message.clone()) {
                Ok(request) => request,
                Err(e) => {
                    let seq = message["seq"].as_i64().unwrap_or(0);
                    let command = message["command"].as_str().unwrap_or_default().to_string();
                    let err = Error::Validation(format!("malformed request: {e}"));
                    self.shared
                        .send(seq, command, Err(tools::error_payload(&err)));
                    continue;
                }
            };
            if request.r#type != "request" {
                warn!(target: "server", "skip message of type {}", request.r#type);
                continue;
            }

            if request.command == SHUTDOWN {
                self.shutdown();
                self.shared
                    .send(request.seq, request.command, Ok(json!({"status": "shutdown"})));
                return Ok(());
            }

            let tool = match request.command.parse::<Tool>() {
                Ok(tool) => tool,
                Err(_) => {
                    let body = unknown_command(&request.command);
                    self.shared.send(request.seq, request.command, Err(body));
                    continue;
                }
            };

            self.workers.retain(|w| !w.is_finished());
            let shared = self.shared.clone();
            self.workers
                .push(thread::spawn(move || shared.handle(tool, request)));
        }
    }

    /// Stop all sessions, this unblocks workers waiting for a prompt. Sessions
    /// started by workers in the meantime are stopped after the join.
    fn shutdown(&mut self) {
        self.shared.registry.shutdown();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!(target: "server", "request worker panicked");
            }
        }
        self.shared.registry.shutdown();
    }
}
