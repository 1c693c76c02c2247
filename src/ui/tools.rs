//! Tool-call boundary: every exposed operation takes JSON arguments and returns a JSON
//! payload. Failures are turned into `{"error": {"kind", "message"}}` by the caller
//! with [`error_payload`].

use crate::driver::config::CONFIG_FILE;
use crate::driver::error::Error;
use crate::driver::extract::Location;
use crate::driver::page::paginate;
use crate::driver::process::Mode;
use crate::driver::registry::SessionRegistry;
use crate::driver::session::StopReport;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::time::Duration;
use strum_macros::{Display, EnumIter, EnumString};

/// Exposed operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Tool {
    StartDebug,
    StopDebug,
    RestartDebug,
    SessionState,
    SetBreakpoint,
    RemoveBreakpoint,
    ListBreakpoints,
    EnableBreakpoint,
    DisableBreakpoint,
    ContinueExecution,
    Step,
    Next,
    ReturnFromFunction,
    Until,
    WhereStack,
    Backtrace,
    Up,
    Down,
    ListSource,
    ListVariables,
    InspectVariable,
    Evaluate,
    WriteConfig,
}

fn args<T: DeserializeOwned>(arguments: Value) -> Result<T, Error> {
    // tools without arguments may receive `null`
    let arguments = match arguments {
        Value::Null => Value::Object(Map::new()),
        v => v,
    };
    serde_json::from_value(arguments).map_err(|e| Error::Validation(format!("bad arguments: {e}")))
}

fn default_mode() -> Mode {
    Mode::Script
}

fn default_count() -> usize {
    1
}

fn default_range() -> u32 {
    5
}

#[derive(Deserialize)]
struct StartArgs {
    target: String,
    #[serde(default = "default_mode")]
    mode: Mode,
    #[serde(default)]
    args: Vec<String>,
}

#[derive(Deserialize)]
struct SessionArgs {
    session_id: String,
}

#[derive(Deserialize)]
struct SetBreakpointArgs {
    session_id: String,
    file: String,
    line: Option<u32>,
    function: Option<String>,
    condition: Option<String>,
    #[serde(default)]
    temporary: bool,
}

#[derive(Deserialize)]
struct BreakpointArgs {
    session_id: String,
    breakpoint_id: u32,
}

#[derive(Deserialize)]
struct PageArgs {
    session_id: String,
    limit: Option<usize>,
    #[serde(default)]
    offset: usize,
}

#[derive(Deserialize)]
struct ExecArgs {
    session_id: String,
    timeout_ms: Option<u64>,
}

#[derive(Deserialize)]
struct UntilArgs {
    session_id: String,
    line: Option<u32>,
    timeout_ms: Option<u64>,
}

#[derive(Deserialize)]
struct MoveArgs {
    session_id: String,
    #[serde(default = "default_count")]
    count: usize,
}

#[derive(Deserialize)]
struct SourceArgs {
    session_id: String,
    line: Option<u32>,
    #[serde(default = "default_range")]
    range: u32,
    limit: Option<usize>,
    #[serde(default)]
    offset: usize,
}

#[derive(Deserialize)]
struct VariablesArgs {
    session_id: String,
    #[serde(default)]
    include_globals: bool,
    frame: Option<usize>,
    limit: Option<usize>,
    #[serde(default)]
    offset: usize,
}

#[derive(Deserialize)]
struct InspectArgs {
    session_id: String,
    name: String,
    frame: Option<usize>,
    limit: Option<usize>,
    #[serde(default)]
    offset: usize,
}

#[derive(Deserialize)]
struct EvaluateArgs {
    session_id: String,
    expression: String,
    frame: Option<usize>,
}

#[derive(Deserialize)]
struct WriteConfigArgs {
    path: Option<PathBuf>,
}

fn location_json(location: &Option<Location>) -> Value {
    match location {
        Some(l) => json!({"file": l.file, "line": l.line, "function": l.function}),
        None => json!({"file": null, "line": null, "function": null}),
    }
}

/// Step result: location, state and optional step details.
fn step_json(report: StopReport, location_key: &str) -> Value {
    let mut body = Map::new();
    body.insert(location_key.to_string(), location_json(&report.location));
    body.insert("state".to_string(), json!(report.state));
    if let Some(function) = report.entered_function {
        body.insert("entered_function".to_string(), json!(function));
    }
    if let Some(value) = report.return_value {
        body.insert("return_value".to_string(), json!(value));
    }
    if let Some(exception) = report.exception {
        body.insert("exception".to_string(), json!(exception));
    }
    if let Some(status) = report.exit_status {
        body.insert("exit_status".to_string(), json!(status));
    }
    if !report.output.is_empty() {
        body.insert("output".to_string(), json!(report.output));
    }
    Value::Object(body)
}

fn timeout(ms: Option<u64>) -> Option<Duration> {
    ms.map(Duration::from_millis)
}

/// Structured failure payload.
pub fn error_payload(err: &Error) -> Value {
    json!({"error": {"kind": err.kind(), "message": err.to_string()}})
}

/// Run a tool against the registry.
pub fn call(registry: &SessionRegistry, tool: Tool, arguments: Value) -> Result<Value, Error> {
    let page_limit = |limit: Option<usize>| limit.or(registry.config().default_page_limit);

    let result = match tool {
        Tool::StartDebug => {
            let a: StartArgs = args(arguments)?;
            let session = registry.start(&a.target, a.mode, a.args)?;
            let info = session.info();
            json!({
                "status": "started",
                "session_id": info.session_id,
                "state": info.state,
                "location": location_json(&info.location),
            })
        }
        Tool::StopDebug => {
            let a: SessionArgs = args(arguments)?;
            registry.stop(&a.session_id)?;
            json!({"status": "stopped"})
        }
        Tool::RestartDebug => {
            let a: SessionArgs = args(arguments)?;
            let session = registry.restart(&a.session_id)?;
            json!({"status": "restarted", "session_id": session.id()})
        }
        Tool::SessionState => {
            let a: SessionArgs = args(arguments)?;
            serde_json::to_value(registry.get(&a.session_id)?.info())?
        }
        Tool::SetBreakpoint => {
            let a: SetBreakpointArgs = args(arguments)?;
            let brkpt = registry.get(&a.session_id)?.set_breakpoint(
                &a.file,
                a.line,
                a.function.as_deref(),
                a.condition.as_deref(),
                a.temporary,
            )?;
            json!({
                "breakpoint_id": brkpt.id,
                "location": {"file": brkpt.file, "line": brkpt.line},
            })
        }
        Tool::RemoveBreakpoint => {
            let a: BreakpointArgs = args(arguments)?;
            let brkpt = registry
                .get(&a.session_id)?
                .remove_breakpoint(a.breakpoint_id)?;
            json!({"status": "removed", "breakpoint_id": brkpt.id})
        }
        Tool::EnableBreakpoint | Tool::DisableBreakpoint => {
            let a: BreakpointArgs = args(arguments)?;
            let session = registry.get(&a.session_id)?;
            let brkpt = if tool == Tool::EnableBreakpoint {
                session.enable_breakpoint(a.breakpoint_id)?
            } else {
                session.disable_breakpoint(a.breakpoint_id)?
            };
            json!({"breakpoint_id": brkpt.id, "enabled": brkpt.enabled})
        }
        Tool::ListBreakpoints => {
            let a: PageArgs = args(arguments)?;
            let breakpoints = registry.get(&a.session_id)?.breakpoints()?;
            serde_json::to_value(paginate(breakpoints, a.offset, page_limit(a.limit)))?
        }
        Tool::ContinueExecution => {
            let a: ExecArgs = args(arguments)?;
            let report = registry
                .get(&a.session_id)?
                .continue_execution(timeout(a.timeout_ms))?;
            let reason = report.reason;
            let breakpoint_id = report.breakpoint_id;
            let mut body = step_json(report, "stopped_at");
            body["reason"] = json!(reason);
            if let Some(id) = breakpoint_id {
                body["breakpoint_id"] = json!(id);
            }
            body
        }
        Tool::Step => {
            let a: ExecArgs = args(arguments)?;
            let report = registry.get(&a.session_id)?.step_into(timeout(a.timeout_ms))?;
            step_json(report, "location")
        }
        Tool::Next => {
            let a: ExecArgs = args(arguments)?;
            let report = registry.get(&a.session_id)?.step_over(timeout(a.timeout_ms))?;
            step_json(report, "location")
        }
        Tool::ReturnFromFunction => {
            let a: ExecArgs = args(arguments)?;
            let report = registry.get(&a.session_id)?.step_out(timeout(a.timeout_ms))?;
            step_json(report, "location")
        }
        Tool::Until => {
            let a: UntilArgs = args(arguments)?;
            let report = registry
                .get(&a.session_id)?
                .until(a.line, timeout(a.timeout_ms))?;
            step_json(report, "location")
        }
        Tool::WhereStack | Tool::Backtrace => {
            let a: PageArgs = args(arguments)?;
            let frames = registry.get(&a.session_id)?.backtrace()?;
            serde_json::to_value(paginate(frames, a.offset, page_limit(a.limit)))?
        }
        Tool::Up | Tool::Down => {
            let a: MoveArgs = args(arguments)?;
            let session = registry.get(&a.session_id)?;
            let frame = if tool == Tool::Up {
                session.frame_up(a.count)?
            } else {
                session.frame_down(a.count)?
            };
            json!({"frame": frame})
        }
        Tool::ListSource => {
            let a: SourceArgs = args(arguments)?;
            let listing = registry.get(&a.session_id)?.source(a.line, a.range)?;
            let page = paginate(listing.lines, a.offset, page_limit(a.limit));
            json!({
                "items": page.items,
                "current_line": listing.current_line,
                "pagination": page.pagination,
            })
        }
        Tool::ListVariables => {
            let a: VariablesArgs = args(arguments)?;
            let listing = registry
                .get(&a.session_id)?
                .variables(a.include_globals, a.frame)?;
            let limit = page_limit(a.limit);
            let mut body = json!({"locals": paginate(listing.locals, a.offset, limit)});
            if let Some(globals) = listing.globals {
                body["globals"] = serde_json::to_value(paginate(globals, a.offset, limit))?;
            }
            body
        }
        Tool::InspectVariable => {
            let a: InspectArgs = args(arguments)?;
            let details = registry
                .get(&a.session_id)?
                .inspect_variable(&a.name, a.frame)?;
            json!({
                "name": details.name,
                "value": details.value,
                "type": details.type_name,
                "repr": details.repr,
                "attributes": paginate(details.attributes, a.offset, page_limit(a.limit)),
            })
        }
        Tool::Evaluate => {
            let a: EvaluateArgs = args(arguments)?;
            let evaluation = registry
                .get(&a.session_id)?
                .evaluate(&a.expression, a.frame)?;
            serde_json::to_value(evaluation)?
        }
        Tool::WriteConfig => {
            let a: WriteConfigArgs = args(arguments)?;
            let path = a
                .path
                .unwrap_or_else(|| registry.config().working_dir().join(CONFIG_FILE));
            registry.config().save(&path)?;
            json!({"status": "written", "path": path})
        }
    };
    Ok(result)
}
