//! Debug session: one debugger process and the command/response bridge to it.

mod breakpoints;
mod execution;
mod inspect;

pub use execution::{StopReason, StopReport};
pub use inspect::{Evaluation, SourceListing, VariableDetails, VariableListing};

use crate::driver::breakpoint::BreakpointTable;
use crate::driver::command;
use crate::driver::error::{Error, LaunchError};
use crate::driver::extract::{Location, ParseError};
use crate::driver::output::{Handle, OutputEvent, OutputLine, OutputStreamProcessor, StreamType};
use crate::driver::process::{Child, Installed, LaunchSpec, Mode};
use crate::driver::prompt::{Batch, ParserState, PromptParser, Terminal};
use crate::{muted_error, mux_debug, mux_info, mux_warn, weak_error};
use itertools::Itertools;
use serde::Serialize;
use std::collections::VecDeque;
use std::io::Write;
use std::process::ChildStdin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::{Duration, Instant};

/// How long to wait for stderr leftovers after the debugger stdout closed.
const STDERR_TAIL: Duration = Duration::from_millis(100);

/// Deadlines of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// First prompt after spawn.
    pub startup: Duration,
    /// Default deadline of a single command.
    pub command: Duration,
    /// Grace period between SIGTERM and SIGKILL.
    pub terminate: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            startup: Duration::from_secs(10),
            command: Duration::from_secs(5),
            terminate: Duration::from_secs(5),
        }
    }
}

/// Result of a raw command.
#[derive(Debug)]
pub struct CommandOutcome<T> {
    /// Parser state after the command.
    pub state: ParserState,
    /// Program end or crash observed while the command was running.
    pub terminal: Option<Terminal>,
    /// Extracted value. Always present if the debugger is back at its prompt, for an
    /// ended process this is what the extractor could salvage.
    pub value: Option<T>,
    pub lines: Vec<OutputLine>,
}

impl<T> CommandOutcome<T> {
    /// Return extracted value or an error describing why the process did not produce it.
    pub fn require(self) -> Result<T, Error> {
        match self.value {
            Some(value) => Ok(value),
            None if self.state == ParserState::Crashed => Err(Error::ProcessCrashed(
                self.lines.iter().map(|l| l.text()).join("\n"),
            )),
            None => Err(Error::SessionTerminated(self.state)),
        }
    }
}

/// Point in time view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub state: ParserState,
    pub mode: Mode,
    pub target: String,
    pub working_directory: String,
    pub pid: u32,
    pub location: Option<Location>,
    pub frame_index: usize,
    pub breakpoints: usize,
}

#[derive(Debug, Clone)]
struct Status {
    state: ParserState,
    location: Option<Location>,
    frame_index: usize,
    breakpoints: usize,
}

struct Process {
    child: Child<Installed>,
    readers: Vec<Handle>,
}

/// Everything a command in flight owns.
struct Inner {
    stdin: ChildStdin,
    events: Receiver<OutputEvent>,
    /// Events received while draining late output, they belong to the future.
    backlog: VecDeque<OutputEvent>,
    parser: PromptParser,
    stderr_closed: bool,
    breakpoints: BreakpointTable,
    frame_index: usize,
    location: Option<Location>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Debugger process together with its output readers and bookkeeping.
///
/// At most one command is in flight: every command takes the session [`Exclusive`] guard,
/// a concurrent attempt gets [`Error::Busy`]. [`DebugSession::stop`] never waits for
/// that guard, a pending command is woken up by an interrupt event instead.
pub struct DebugSession {
    id: String,
    spec: LaunchSpec,
    timeouts: Timeouts,
    pid: u32,
    inner: Mutex<Inner>,
    process: Mutex<Process>,
    status: Mutex<Status>,
    interrupt: Sender<OutputEvent>,
    stopped: AtomicBool,
}

impl DebugSession {
    /// Spawn a debugger and wait for its first prompt.
    /// Breakpoint ids of the session start after `breakpoint_base`.
    pub fn start(
        id: impl Into<String>,
        spec: LaunchSpec,
        timeouts: Timeouts,
        breakpoint_base: u32,
    ) -> Result<Self, Error> {
        let id = id.into();
        let (child, io) = Child::new(spec.clone()).install()?;
        let pid = child.pid();

        let (tx, rx) = mpsc::channel();
        let readers = vec![
            OutputStreamProcessor::new(StreamType::StdOut).run(io.stdout, tx.clone()),
            OutputStreamProcessor::new(StreamType::StdErr).run(io.stderr, tx.clone()),
        ];

        let session = Self {
            id,
            spec,
            timeouts,
            pid,
            inner: Mutex::new(Inner {
                stdin: io.stdin,
                events: rx,
                backlog: VecDeque::new(),
                parser: PromptParser::new(),
                stderr_closed: false,
                breakpoints: BreakpointTable::new(breakpoint_base),
                frame_index: 0,
                location: None,
            }),
            process: Mutex::new(Process { child, readers }),
            status: Mutex::new(Status {
                state: ParserState::Starting,
                location: None,
                frame_index: 0,
                breakpoints: 0,
            }),
            interrupt: tx,
            stopped: AtomicBool::new(false),
        };

        if let Err(e) = session.await_startup() {
            mux_warn!(target: "driver", "session {} failed to start: {e}", session.id);
            session.stop();
            return Err(e);
        }
        mux_info!(target: "driver", "session {} is ready (pid {pid})", session.id);
        Ok(session)
    }

    fn await_startup(&self) -> Result<(), Error> {
        let mut ex = self.lock()?;
        let startup = self.timeouts.startup;
        match ex.wait_prompt(startup) {
            Ok(batch) if ex.inner.parser.is_ready() => {
                ex.inner.location = crate::driver::extract::location(&batch.lines).ok();
                Ok(())
            }
            Ok(batch) => Err(LaunchError::StartupCrash {
                output: batch.lines.iter().map(|l| l.text()).join("\n"),
            }
            .into()),
            Err(Error::Timeout(timeout_ms)) => Err(LaunchError::StartupTimeout {
                timeout_ms,
                output: ex
                    .inner
                    .parser
                    .take_batch()
                    .lines
                    .iter()
                    .map(|l| l.text())
                    .join("\n"),
            }
            .into()),
            Err(e) => Err(e),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Launch specification, used to start the same program again.
    pub fn spec(&self) -> &LaunchSpec {
        &self.spec
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn state(&self) -> ParserState {
        lock(&self.status).state
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn info(&self) -> SessionInfo {
        let status = lock(&self.status).clone();
        SessionInfo {
            session_id: self.id.clone(),
            state: status.state,
            mode: self.spec.mode,
            target: self.spec.target.clone(),
            working_directory: self.spec.cwd.to_string_lossy().to_string(),
            pid: self.pid,
            location: status.location,
            frame_index: status.frame_index,
            breakpoints: status.breakpoints,
        }
    }

    /// Take the command guard, fail fast if another command is in flight.
    pub fn lock(&self) -> Result<Exclusive<'_>, Error> {
        let inner = match self.inner.try_lock() {
            Ok(inner) => inner,
            Err(TryLockError::WouldBlock) => return Err(Error::Busy(self.id.clone())),
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
        };
        Ok(Exclusive {
            session: self,
            inner,
        })
    }

    /// Write a command and wait for the debugger to settle. `extractor` turns the
    /// command output into a value, `timeout` defaults to the session command timeout.
    pub fn send_command<T>(
        &self,
        text: &str,
        extractor: impl FnOnce(&[OutputLine]) -> Result<T, ParseError>,
        timeout: Option<Duration>,
    ) -> Result<CommandOutcome<T>, Error> {
        self.lock()?.execute(text, extractor, timeout)
    }

    /// Base for breakpoint ids of a restarted session. Waits for a command in flight.
    pub fn next_breakpoint_base(&self) -> u32 {
        lock(&self.inner).breakpoints.next_id_base()
    }

    /// Terminate the debugger: SIGTERM, bounded wait, SIGKILL. A pending command ends
    /// with [`Error::SessionTerminated`]. Calling it again does nothing.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        _ = self.interrupt.send(OutputEvent::Interrupt);

        let mut process = lock(&self.process);
        if let Some(status) = weak_error!(
            process.child.terminate(self.timeouts.terminate),
            "terminate debugger:"
        ) {
            mux_info!(target: "driver", "session {} process exited: {status}", self.id);
        }
        process.readers.iter_mut().for_each(|r| r.stop());

        let mut status = lock(&self.status);
        if !matches!(status.state, ParserState::Crashed | ParserState::Hung) {
            status.state = ParserState::Exited;
        }
    }

    /// Exit status of an ended process (`Some(true)` for success), kill it if it
    /// still runs after the grace period.
    fn reap(&self) -> Option<bool> {
        let mut process = lock(&self.process);
        match weak_error!(process.child.wait_timeout(self.timeouts.terminate))? {
            Some(status) => {
                mux_info!(target: "driver", "session {} process exited: {status}", self.id);
                Some(status.success())
            }
            None => {
                muted_error!(process.child.kill());
                Some(false)
            }
        }
    }

    fn kill(&self) {
        let mut process = lock(&self.process);
        weak_error!(process.child.kill(), "kill debugger:");
    }
}

impl Drop for DebugSession {
    fn drop(&mut self) {
        self.stop()
    }
}

/// Exclusive access to a session for one or more commands.
/// Composite operations (evaluate in another frame, for example) hold one guard for
/// all of their commands so nothing can interleave.
pub struct Exclusive<'a> {
    session: &'a DebugSession,
    inner: MutexGuard<'a, Inner>,
}

impl Exclusive<'_> {
    /// Write a command and wait for a prompt, process end or timeout.
    pub fn execute<T>(
        &mut self,
        text: &str,
        extractor: impl FnOnce(&[OutputLine]) -> Result<T, ParseError>,
        timeout: Option<Duration>,
    ) -> Result<CommandOutcome<T>, Error> {
        command::validate(text)?;
        self.ensure_ready()?;

        mux_debug!(target: "driver", "session {} <- {text}", self.session.id);
        if let Err(e) = writeln!(self.inner.stdin, "{text}").and_then(|_| self.inner.stdin.flush()) {
            mux_warn!(target: "driver", "session {} write command: {e}", self.session.id);
            self.ensure_ready()?;
            return Err(Error::SessionTerminated(self.inner.parser.state()));
        }
        self.inner.parser.command_sent();
        self.publish();

        let timeout = timeout.unwrap_or(self.session.timeouts.command);
        let batch = self.wait_prompt(timeout)?;
        let state = self.inner.parser.state();

        let value = if state == ParserState::AtPrompt {
            Some(extractor(&batch.lines)?)
        } else {
            extractor(&batch.lines).ok()
        };
        Ok(CommandOutcome {
            state,
            terminal: batch.terminal,
            value,
            lines: batch.lines,
        })
    }

    /// Handle events that arrived between commands and check that the debugger is
    /// waiting at its prompt.
    fn ensure_ready(&mut self) -> Result<(), Error> {
        loop {
            let event = match self.inner.backlog.pop_front() {
                Some(event) => event,
                None => match self.inner.events.try_recv() {
                    Ok(event) => event,
                    Err(_) => break,
                },
            };
            match event {
                OutputEvent::Line(line) => {
                    mux_debug!(target: "driver", "session {} output between commands: {}", self.session.id, line.text())
                }
                OutputEvent::Closed(StreamType::StdOut) => {
                    let success = self.session.reap();
                    self.inner.parser.stream_closed(success);
                }
                OutputEvent::Closed(StreamType::StdErr) => self.inner.stderr_closed = true,
                OutputEvent::Interrupt => self.inner.parser.stopped(),
            }
        }

        if self.session.is_stopped() || !self.inner.parser.is_ready() {
            return Err(Error::SessionTerminated(self.inner.parser.state()));
        }
        Ok(())
    }

    fn next_event(&mut self, deadline: Instant) -> Result<OutputEvent, RecvTimeoutError> {
        if let Some(event) = self.inner.backlog.pop_front() {
            return Ok(event);
        }
        self.inner
            .events
            .recv_timeout(deadline.saturating_duration_since(Instant::now()))
    }

    /// Consume output until the debugger is ready, the process ends or the deadline passes.
    fn wait_prompt(&mut self, timeout: Duration) -> Result<Batch, Error> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.next_event(deadline) {
                Ok(OutputEvent::Line(line)) => {
                    if let Some(state) = self.inner.parser.feed(line) {
                        mux_debug!(target: "driver", "session {} state -> {state}", self.session.id);
                    }
                    if self.inner.parser.is_ready() {
                        self.drain_late_output();
                        return Ok(self.inner.parser.take_batch());
                    }
                }
                Ok(OutputEvent::Closed(StreamType::StdOut)) | Err(RecvTimeoutError::Disconnected) => {
                    let success = self.session.reap();
                    let state = self.inner.parser.stream_closed(success);
                    mux_info!(target: "driver", "session {} debugger output closed, state {state}", self.session.id);
                    self.collect_stderr_tail();
                    return Ok(self.inner.parser.take_batch());
                }
                Ok(OutputEvent::Closed(StreamType::StdErr)) => self.inner.stderr_closed = true,
                Ok(OutputEvent::Interrupt) => {
                    self.inner.parser.stopped();
                    return Err(Error::SessionTerminated(self.inner.parser.state()));
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.inner.parser.timed_out();
                    let timeout_ms = timeout.as_millis() as u64;
                    mux_warn!(target: "driver", "session {} no prompt within {timeout_ms} ms, kill debugger", self.session.id);
                    self.session.kill();
                    return Err(Error::Timeout(timeout_ms));
                }
            }
        }
    }

    /// Stderr is read by its own thread, its lines may be queued right after the prompt.
    fn drain_late_output(&mut self) {
        while let Ok(event) = self.inner.events.try_recv() {
            match event {
                OutputEvent::Line(line @ OutputLine::Err(_)) if self.inner.backlog.is_empty() => {
                    self.inner.parser.feed_late(line)
                }
                event => self.inner.backlog.push_back(event),
            }
        }
    }

    fn collect_stderr_tail(&mut self) {
        let deadline = Instant::now() + STDERR_TAIL;
        while !self.inner.stderr_closed {
            match self.next_event(deadline) {
                Ok(OutputEvent::Line(line)) => self.inner.parser.feed_late(line),
                Ok(OutputEvent::Closed(StreamType::StdErr)) => self.inner.stderr_closed = true,
                Ok(_) => {}
                Err(_) => break,
            }
        }
    }

    /// Make current state visible to callers without the guard.
    fn publish(&self) {
        let mut status = lock(&self.session.status);
        status.state = self.inner.parser.state();
        status.location = self.inner.location.clone();
        status.frame_index = self.inner.frame_index;
        status.breakpoints = self.inner.breakpoints.len();
    }
}

impl Drop for Exclusive<'_> {
    fn drop(&mut self) {
        self.publish()
    }
}
