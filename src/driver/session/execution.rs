use crate::driver::command;
use crate::driver::error::Error;
use crate::driver::extract::{self, Location, StopEvent};
use crate::driver::prompt::{ParserState, Terminal};
use crate::driver::session::{CommandOutcome, DebugSession, Exclusive};
use serde::Serialize;
use std::time::Duration;
use strum_macros::Display;

/// Why the program stopped after an execution command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Breakpoint,
    Return,
    Exception,
    End,
    Unknown,
}

/// Where and why the program stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReport {
    pub state: ParserState,
    pub location: Option<Location>,
    pub reason: StopReason,
    /// Session id of a breakpoint that caused the stop.
    pub breakpoint_id: Option<u32>,
    /// Function entered by a step into.
    pub entered_function: Option<String>,
    pub return_value: Option<String>,
    pub exception: Option<String>,
    pub exit_status: Option<i32>,
    /// Program output printed while running.
    pub output: Vec<String>,
}

enum Resume {
    Continue,
    StepInto,
    StepOver,
    StepOut,
    Until(Option<u32>),
}

impl Resume {
    fn command(&self) -> String {
        match self {
            Resume::Continue => command::r#continue(),
            Resume::StepInto => command::step_into(),
            Resume::StepOver => command::step_over(),
            Resume::StepOut => command::step_out(),
            Resume::Until(line) => command::until(*line),
        }
    }
}

impl Exclusive<'_> {
    fn resume(&mut self, how: Resume, timeout: Option<Duration>) -> Result<StopReport, Error> {
        let outcome = self.execute(&how.command(), extract::stop_event, timeout)?;
        let CommandOutcome {
            state,
            terminal,
            value,
            lines,
        } = outcome;

        // a process that ended may leave nothing to parse
        let mut event = value.unwrap_or_else(|| StopEvent {
            location: None,
            called: false,
            returned: false,
            exception: None,
            deleted_breakpoints: vec![],
            output: vec![],
        });
        if terminal == Some(Terminal::Crashed) && event.exception.is_none() {
            event.exception = extract::raised_exception(&lines);
        }
        if state != ParserState::AtPrompt {
            // keep the traceback of a dead process
            event.output = lines.iter().map(|l| l.text().to_string()).collect();
        }

        // a temporary breakpoint is reported as deleted together with its hit
        let breakpoint_id = match (&how, terminal, &event.location) {
            (Resume::Continue, None, Some(location)) => self.inner.breakpoints.record_hit(location),
            _ => None,
        };
        self.inner.breakpoints.remove_by_number(&event.deleted_breakpoints);
        self.inner.frame_index = 0;
        self.inner.location = event.location.clone();

        Ok(StopReport {
            state,
            reason: stop_reason(terminal, &event, breakpoint_id),
            entered_function: event
                .called
                .then(|| event.location.as_ref().map(|l| l.function.clone()))
                .flatten(),
            return_value: event
                .returned
                .then(|| event.location.as_ref().and_then(|l| l.return_value.clone()))
                .flatten(),
            exit_status: match terminal {
                Some(Terminal::Exited(code)) => code,
                _ => None,
            },
            location: event.location,
            breakpoint_id,
            exception: event.exception,
            output: event.output,
        })
    }
}

fn stop_reason(terminal: Option<Terminal>, event: &StopEvent, breakpoint: Option<u32>) -> StopReason {
    match terminal {
        Some(Terminal::Crashed) => StopReason::Exception,
        Some(Terminal::Exited(_)) => StopReason::End,
        None if event.exception.is_some() => StopReason::Exception,
        None if breakpoint.is_some() => StopReason::Breakpoint,
        None if event.returned => StopReason::Return,
        None => StopReason::Unknown,
    }
}

impl DebugSession {
    /// Continue until a breakpoint, an exception or the program end.
    pub fn continue_execution(&self, timeout: Option<Duration>) -> Result<StopReport, Error> {
        self.lock()?.resume(Resume::Continue, timeout)
    }

    /// Execute current line, stop in a called function.
    pub fn step_into(&self, timeout: Option<Duration>) -> Result<StopReport, Error> {
        self.lock()?.resume(Resume::StepInto, timeout)
    }

    /// Execute current line, do not stop in called functions.
    pub fn step_over(&self, timeout: Option<Duration>) -> Result<StopReport, Error> {
        self.lock()?.resume(Resume::StepOver, timeout)
    }

    /// Continue until the current function returns.
    pub fn step_out(&self, timeout: Option<Duration>) -> Result<StopReport, Error> {
        self.lock()?.resume(Resume::StepOut, timeout)
    }

    /// Continue until a line greater than current (or `line`) is reached in the current frame.
    pub fn until(&self, line: Option<u32>, timeout: Option<Duration>) -> Result<StopReport, Error> {
        self.lock()?.resume(Resume::Until(line), timeout)
    }
}
