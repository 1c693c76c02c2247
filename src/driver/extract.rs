//! Extractors turn the lines collected for one command into structured data.
//!
//! Every extractor is a pure function over `&[OutputLine]`. Stderr lines are ignored
//! (the prompt parser already looked for tracebacks there), lines that match nothing
//! are skipped. A `*** ` line right before the prompt is the debugger refusing a command
//! and is reported as [`ParseError::Rejected`], the same text printed earlier is program
//! output.

use crate::driver::output::OutputLine;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::str::FromStr;

static REJECTED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\*\*\* (.*)$").expect("must compile"));
static FRAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(> |  )(.+)\((\d+)\)([^\s()]*)\(\)(?:->(.*))?$").expect("must compile")
});
static CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-> ?(.*)$").expect("must compile"));
static BREAKPOINT_SET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Breakpoint (\S+) at (.+):(\S+)$").expect("must compile"));
static BREAKPOINT_ACK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(Deleted|Enabled|Disabled) breakpoint (\S+) at (.+):(\S+)$").expect("must compile")
});
static BREAK_ROW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\S+)\s+breakpoint\s+(keep|del)\s+(yes|no)\s+at (.+):(\S+)$").expect("must compile")
});
static BREAK_HITS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s+breakpoint already hit (\S+) times?$").expect("must compile")
});
static BREAK_COND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s+stop only if (.+)$").expect("must compile"));
static SOURCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+) ?([B ])(->|>>)?\t(.*)$").expect("must compile"));
static EXCEPTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:Internal )?([A-Za-z_][\w.]*(?:Error|Exception|Warning|Interrupt|Exit|StopIteration))(?::\s.*)?$")
        .expect("must compile")
});

const CALL_MARKER: &str = "--Call--";
const RETURN_MARKER: &str = "--Return--";
const NO_BREAKPOINTS: &str = "No breakpoints.";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("{0}")]
    Rejected(String),
    #[error("no {0} found in debugger output")]
    Missing(&'static str),
    #[error("malformed {field}: {value:?}")]
    Number { field: &'static str, value: String },
}

fn number<T: FromStr>(field: &'static str, value: &str) -> Result<T, ParseError> {
    value.parse::<T>().map_err(|_| ParseError::Number {
        field,
        value: value.to_string(),
    })
}

fn stdout(lines: &[OutputLine]) -> impl Iterator<Item = &str> {
    lines.iter().filter(|l| l.is_stdout()).map(|l| l.text())
}

/// Return error if the debugger refused a command.
pub fn rejection(lines: &[OutputLine]) -> Result<(), ParseError> {
    match stdout(lines).last().and_then(|l| REJECTED_RE.captures(l)) {
        Some(c) => Err(ParseError::Rejected(c[1].trim().to_string())),
        None => Ok(()),
    }
}

/// Program position reported by the debugger after it stops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub function: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip)]
    pub return_value: Option<String>,
}

/// One frame of a `where` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackFrame {
    /// 0 is the innermost frame.
    pub index: usize,
    pub file: String,
    pub line: u32,
    pub function: String,
    pub code: Option<String>,
    /// Frame selected by the debugger.
    pub current: bool,
}

struct RawFrame {
    current: bool,
    location: Location,
}

fn frames(lines: &[OutputLine]) -> Result<Vec<RawFrame>, ParseError> {
    let mut result: Vec<RawFrame> = vec![];
    for line in stdout(lines) {
        if let Some(c) = FRAME_RE.captures(line) {
            result.push(RawFrame {
                current: &c[1] == "> ",
                location: Location {
                    file: c[2].to_string(),
                    line: number("line number", &c[3])?,
                    function: c[4].to_string(),
                    code: None,
                    return_value: c.get(5).map(|m| m.as_str().to_string()),
                },
            });
            continue;
        }
        if let (Some(c), Some(last)) = (CODE_RE.captures(line), result.last_mut()) {
            if last.location.code.is_none() {
                last.location.code = Some(c[1].to_string());
            }
        }
    }
    Ok(result)
}

/// Current position from an output of a navigation command (`up`, `down`, ...).
pub fn location(lines: &[OutputLine]) -> Result<Location, ParseError> {
    rejection(lines)?;
    frames(lines)?
        .into_iter()
        .rev()
        .find(|f| f.current)
        .map(|f| f.location)
        .ok_or(ParseError::Missing("location"))
}

/// Stack from the `where` command output, innermost frame first.
pub fn stack(lines: &[OutputLine]) -> Result<Vec<StackFrame>, ParseError> {
    rejection(lines)?;
    let raw = frames(lines)?;
    if raw.is_empty() {
        return Err(ParseError::Missing("stack frame"));
    }
    Ok(raw
        .into_iter()
        .rev()
        .enumerate()
        .map(|(index, f)| StackFrame {
            index,
            file: f.location.file,
            line: f.location.line,
            function: f.location.function,
            code: f.location.code,
            current: f.current,
        })
        .collect())
}

/// What happened while the program was running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopEvent {
    pub location: Option<Location>,
    /// `--Call--` marker seen, a new function was entered.
    pub called: bool,
    /// `--Return--` marker seen, function is about to return.
    pub returned: bool,
    /// Exception type reported before the stop.
    pub exception: Option<String>,
    /// Debugger ids of temporary breakpoints that were removed.
    pub deleted_breakpoints: Vec<u32>,
    /// Unrecognized stdout lines, mostly the program own output.
    pub output: Vec<String>,
}

/// Stop event after an execution command (`continue`, `step`, `next`, `return`, `until`).
/// Location is optional because the program may end without reporting a position.
pub fn stop_event(lines: &[OutputLine]) -> Result<StopEvent, ParseError> {
    rejection(lines)?;

    let mut event = StopEvent {
        location: None,
        called: false,
        returned: false,
        exception: None,
        deleted_breakpoints: vec![],
        output: vec![],
    };
    for line in stdout(lines) {
        match line {
            CALL_MARKER => event.called = true,
            RETURN_MARKER => event.returned = true,
            _ => {
                if let Some(c) = BREAKPOINT_ACK_RE.captures(line) {
                    if &c[1] == "Deleted" {
                        event.deleted_breakpoints.push(number("breakpoint number", &c[2])?);
                    }
                } else if let Some(c) = EXCEPTION_RE.captures(line) {
                    event.exception = Some(c[1].to_string());
                } else if !FRAME_RE.is_match(line) && !CODE_RE.is_match(line) {
                    event.output.push(line.to_string());
                }
            }
        }
    }
    event.location = frames(lines)?
        .into_iter()
        .rev()
        .find(|f| f.current)
        .map(|f| f.location);
    Ok(event)
}

/// Exception type closing the last traceback. Unlike other extractors it looks at stderr
/// too, an uncaught exception traceback is printed there.
pub fn raised_exception(lines: &[OutputLine]) -> Option<String> {
    lines
        .iter()
        .rev()
        .find_map(|l| EXCEPTION_RE.captures(l.text()).map(|c| c[1].to_string()))
}

/// Debugger confirmation of a new breakpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointCreated {
    pub number: u32,
    pub file: String,
    pub line: u32,
}

pub fn breakpoint_created(lines: &[OutputLine]) -> Result<BreakpointCreated, ParseError> {
    rejection(lines)?;
    let c = stdout(lines)
        .find_map(|l| BREAKPOINT_SET_RE.captures(l))
        .ok_or(ParseError::Missing("breakpoint confirmation"))?;
    Ok(BreakpointCreated {
        number: number("breakpoint number", &c[1])?,
        file: c[2].to_string(),
        line: number("line number", &c[3])?,
    })
}

/// Debugger number of a breakpoint from a `clear`, `enable` or `disable` confirmation.
pub fn breakpoint_ack(lines: &[OutputLine]) -> Result<u32, ParseError> {
    rejection(lines)?;
    let c = stdout(lines)
        .find_map(|l| BREAKPOINT_ACK_RE.captures(l))
        .ok_or(ParseError::Missing("breakpoint confirmation"))?;
    number("breakpoint number", &c[2])
}

/// Row of the `break` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointRow {
    pub number: u32,
    pub temporary: bool,
    pub enabled: bool,
    pub file: String,
    pub line: u32,
    pub condition: Option<String>,
    pub hits: u32,
}

pub fn breakpoint_table(lines: &[OutputLine]) -> Result<Vec<BreakpointRow>, ParseError> {
    rejection(lines)?;
    let mut rows: Vec<BreakpointRow> = vec![];
    for line in stdout(lines) {
        if line == NO_BREAKPOINTS {
            return Ok(vec![]);
        }
        if let Some(c) = BREAK_ROW_RE.captures(line) {
            rows.push(BreakpointRow {
                number: number("breakpoint number", &c[1])?,
                temporary: &c[2] == "del",
                enabled: &c[3] == "yes",
                file: c[4].to_string(),
                line: number("line number", &c[5])?,
                condition: None,
                hits: 0,
            });
        } else if let Some(last) = rows.last_mut() {
            if let Some(c) = BREAK_HITS_RE.captures(line) {
                last.hits = number("hit count", &c[1])?;
            } else if let Some(c) = BREAK_COND_RE.captures(line) {
                last.condition = Some(c[1].to_string());
            }
        }
    }
    Ok(rows)
}

/// Line of a `list` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLine {
    pub line: u32,
    pub text: String,
    pub current: bool,
    pub breakpoint: bool,
}

pub fn source(lines: &[OutputLine]) -> Result<Vec<SourceLine>, ParseError> {
    rejection(lines)?;
    stdout(lines)
        .filter_map(|l| SOURCE_RE.captures(l))
        .map(|c| {
            Ok(SourceLine {
                line: number("line number", &c[1])?,
                text: c[4].to_string(),
                current: c.get(3).map(|m| m.as_str()) == Some("->"),
                breakpoint: &c[2] == "B",
            })
        })
        .collect()
}

/// Printed value of a `p` like command, multiline values are joined back.
pub fn value(lines: &[OutputLine]) -> Result<String, ParseError> {
    rejection(lines)?;
    printed(lines)
}

/// Text printed by the program itself, a `*** ` prefix is kept as is.
pub fn printed(lines: &[OutputLine]) -> Result<String, ParseError> {
    let text = stdout(lines).collect::<Vec<_>>().join("\n");
    if text.is_empty() {
        return Err(ParseError::Missing("value"));
    }
    Ok(text)
}

/// Type name printed by `p type(x).__name__`, the repr quotes are removed.
pub fn type_name(lines: &[OutputLine]) -> Result<String, ParseError> {
    let v = value(lines)?;
    let v = v.trim();
    Ok(v.strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .unwrap_or(v)
        .to_string())
}

/// Entry of a scope dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Variable {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub value: String,
}

/// Parse `name\ttype\tvalue` lines, values with newlines in their repr continue on
/// lines without tabs.
pub fn variables(lines: &[OutputLine]) -> Result<Vec<Variable>, ParseError> {
    rejection(lines)?;
    let mut vars: Vec<Variable> = vec![];
    for line in stdout(lines) {
        let mut parts = line.splitn(3, '\t');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(name), Some(type_name), Some(value)) => vars.push(Variable {
                name: name.to_string(),
                type_name: type_name.to_string(),
                value: value.to_string(),
            }),
            _ => {
                if let Some(last) = vars.last_mut() {
                    last.value.push('\n');
                    last.value.push_str(line);
                }
            }
        }
    }
    Ok(vars)
}

/// Public attribute of an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// Parse `name\tvalue` lines.
pub fn attributes(lines: &[OutputLine]) -> Result<Vec<Attribute>, ParseError> {
    rejection(lines)?;
    let mut attrs: Vec<Attribute> = vec![];
    for line in stdout(lines) {
        match line.split_once('\t') {
            Some((name, value)) => attrs.push(Attribute {
                name: name.to_string(),
                value: value.to_string(),
            }),
            None => {
                if let Some(last) = attrs.last_mut() {
                    last.value.push('\n');
                    last.value.push_str(line);
                }
            }
        }
    }
    Ok(attrs)
}
