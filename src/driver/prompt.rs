//! Debugger readiness detection.
//!
//! Every textual marker the debugger uses to announce its state lives here: the prompt,
//! uncaught exception tracebacks, post-mortem entry and program end banners. A change of
//! the debugger output format must be a local update of this module.

use crate::driver::output::OutputLine;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use strum_macros::Display;

static PROMPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\((?:Pdb|Pdb\+\+)\) ?$").expect("must compile"));
static TRACEBACK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Traceback \(most recent call last\):").expect("must compile"));
static POST_MORTEM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Uncaught exception\. Entering post mortem debugging").expect("must compile")
});
static FINISHED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:The program finished and will be restarted|Post mortem debugger finished\.)")
        .expect("must compile")
});
static SYS_EXIT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^The program exited via sys\.exit\(\)\. Exit status: (.*)$").expect("must compile")
});

/// Debugger state as observed from its output.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParserState {
    /// Process spawned, no prompt seen yet.
    Starting,
    /// Debugger is idle and ready for a command.
    AtPrompt,
    /// A command was sent, output is being produced.
    Running,
    /// Debugged program (or the process) finished normally.
    Exited,
    /// Process died with a non-zero status or an uncaught exception was reported.
    Crashed,
    /// No prompt within a deadline, process was killed.
    Hung,
}

impl ParserState {
    /// True for states from which no more prompt is expected.
    pub fn is_final(self) -> bool {
        matches!(self, ParserState::Hung)
    }
}

/// Noteworthy event observed while a command was running.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "snake_case", tag = "event", content = "exit_status")]
pub enum Terminal {
    /// Program finished, optional status from `sys.exit()`.
    Exited(Option<i32>),
    /// Uncaught exception or abnormal process exit.
    Crashed,
}

impl Terminal {
    fn merge(current: Option<Terminal>, new: Terminal) -> Terminal {
        match (current, new) {
            (Some(Terminal::Crashed), _) | (_, Terminal::Crashed) => Terminal::Crashed,
            (_, exited) => exited,
        }
    }

    pub fn state(self) -> ParserState {
        match self {
            Terminal::Exited(_) => ParserState::Exited,
            Terminal::Crashed => ParserState::Crashed,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum LineKind<'a> {
    /// Prompt, with text printed before it on the same line.
    Prompt(&'a str),
    Traceback,
    PostMortem,
    Finished(Option<i32>),
    Output,
}

fn classify(line: &OutputLine) -> LineKind<'_> {
    let text = line.text();
    match line {
        OutputLine::Out(_) => {
            if let Some(m) = PROMPT_RE.find(text) {
                return LineKind::Prompt(&text[..m.start()]);
            }
            if TRACEBACK_RE.is_match(text) {
                return LineKind::Traceback;
            }
            if POST_MORTEM_RE.is_match(text) {
                return LineKind::PostMortem;
            }
            if FINISHED_RE.is_match(text) {
                return LineKind::Finished(None);
            }
            if let Some(c) = SYS_EXIT_RE.captures(text) {
                return LineKind::Finished(c[1].trim().parse::<i32>().ok());
            }
            LineKind::Output
        }
        // stderr can't carry a prompt, but uncaught exceptions are printed there
        OutputLine::Err(_) if TRACEBACK_RE.is_match(text) => LineKind::Traceback,
        OutputLine::Err(_) => LineKind::Output,
    }
}

/// Lines collected for one command together with the events seen among them.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Batch {
    pub lines: Vec<OutputLine>,
    pub terminal: Option<Terminal>,
}

/// Stateful classifier of debugger output.
#[derive(Debug)]
pub struct PromptParser {
    state: ParserState,
    batch: Batch,
}

impl Default for PromptParser {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Starting,
            batch: Batch::default(),
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Return true if debugger is ready for the next command.
    pub fn is_ready(&self) -> bool {
        self.state == ParserState::AtPrompt
    }

    /// A command was written to the debugger, start a new batch.
    pub fn command_sent(&mut self) {
        self.state = ParserState::Running;
        self.batch = Batch::default();
    }

    /// Classify next line. Return a new state if line caused a transition.
    pub fn feed(&mut self, line: OutputLine) -> Option<ParserState> {
        if self.state.is_final() {
            self.batch.lines.push(line);
            return None;
        }

        let before = self.state;
        match classify(&line) {
            LineKind::Prompt(prefix) => {
                if !prefix.trim().is_empty() {
                    self.batch.lines.push(OutputLine::Out(prefix.to_string()));
                }
                // post-mortem and restarted programs surface a prompt again
                self.state = ParserState::AtPrompt;
                return (before != self.state).then_some(self.state);
            }
            LineKind::Traceback | LineKind::PostMortem => self.observe(Terminal::Crashed),
            LineKind::Finished(status) => self.observe(Terminal::Exited(status)),
            LineKind::Output => {}
        }
        self.batch.lines.push(line);
        (before != self.state).then_some(self.state)
    }

    /// Stderr line that arrived after the prompt but belongs to the finished command.
    /// State is kept, a traceback is only recorded in the batch.
    pub fn feed_late(&mut self, line: OutputLine) {
        if matches!(classify(&line), LineKind::Traceback) {
            self.batch.terminal = Some(Terminal::merge(self.batch.terminal, Terminal::Crashed));
        }
        self.batch.lines.push(line);
    }

    fn observe(&mut self, event: Terminal) {
        let merged = Terminal::merge(self.batch.terminal, event);
        self.batch.terminal = Some(merged);
        self.state = merged.state();
    }

    /// Stdout of the process closed, `success` is an exit status of a process if known.
    pub fn stream_closed(&mut self, success: Option<bool>) -> ParserState {
        if self.state.is_final() {
            return self.state;
        }
        let event = match success {
            Some(true) if self.batch.terminal != Some(Terminal::Crashed) => {
                Terminal::Exited(self.batch.terminal.and_then(|t| match t {
                    Terminal::Exited(code) => code,
                    Terminal::Crashed => None,
                }))
            }
            _ => Terminal::Crashed,
        };
        self.batch.terminal = Some(event);
        self.state = event.state();
        self.state
    }

    /// No prompt within a deadline.
    pub fn timed_out(&mut self) -> ParserState {
        self.state = ParserState::Hung;
        self.state
    }

    /// Session was stopped on request.
    pub fn stopped(&mut self) {
        if !self.state.is_final() {
            self.state = ParserState::Exited;
        }
    }

    /// Take collected lines, parser keeps its state.
    pub fn take_batch(&mut self) -> Batch {
        std::mem::take(&mut self.batch)
    }
}
