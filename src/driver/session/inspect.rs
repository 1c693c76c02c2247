use crate::driver::command::{self, Scope};
use crate::driver::error::Error;
use crate::driver::extract::{self, Attribute, SourceLine, StackFrame, Variable};
use crate::driver::session::{DebugSession, Exclusive};
use serde::Serialize;
use std::cmp::Ordering;

/// Lines around a position in the current frame file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceListing {
    pub lines: Vec<SourceLine>,
    pub current_line: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableListing {
    pub locals: Vec<Variable>,
    pub globals: Option<Vec<Variable>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableDetails {
    pub name: String,
    /// `str()` of a value.
    pub value: String,
    pub type_name: String,
    pub repr: String,
    pub attributes: Vec<Attribute>,
}

/// Result of an expression evaluation. An expression that raised is not a session
/// failure, the exception text goes to `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Evaluation {
    Value {
        result: String,
        #[serde(rename = "type")]
        type_name: String,
    },
    Error {
        error: String,
    },
}

impl Exclusive<'_> {
    fn stack(&mut self) -> Result<Vec<StackFrame>, Error> {
        let frames = self
            .execute(&command::backtrace(), extract::stack, None)?
            .require()?;
        if let Some(current) = frames.iter().find(|f| f.current) {
            self.inner.frame_index = current.index;
        }
        Ok(frames)
    }

    /// Move `count` frames toward the outermost (`up`) or innermost frame.
    fn move_frame(&mut self, count: usize, up: bool) -> Result<StackFrame, Error> {
        let cmd = if up {
            command::up(count)
        } else {
            command::down(count)
        };
        let location = self.execute(&cmd, extract::location, None)?.require()?;
        self.inner.location = Some(location);

        // debugger clamps the move, real position is in a fresh stack
        let frames = self.stack()?;
        frames
            .into_iter()
            .find(|f| f.current)
            .ok_or(Error::ParseFailure(extract::ParseError::Missing("current frame")))
    }

    fn goto_frame(&mut self, index: usize) -> Result<(), Error> {
        let current = self.inner.frame_index;
        match index.cmp(&current) {
            Ordering::Greater => {
                self.move_frame(index - current, true)?;
            }
            Ordering::Less => {
                self.move_frame(current - index, false)?;
            }
            Ordering::Equal => {}
        }
        Ok(())
    }

    /// Select frame `index`, return the index to go back to.
    fn select_frame(&mut self, index: usize) -> Result<usize, Error> {
        let back = self.inner.frame_index;
        self.goto_frame(index)?;
        if self.inner.frame_index != index {
            let outermost = self.inner.frame_index;
            self.goto_frame(back)?;
            return Err(Error::Validation(format!(
                "frame {index} does not exist, outermost frame is {outermost}"
            )));
        }
        Ok(back)
    }

    /// Run `f` in frame `index` (current frame if `None`) and go back.
    fn in_frame<T>(
        &mut self,
        index: Option<usize>,
        f: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let Some(index) = index else {
            return f(self);
        };
        let back = self.select_frame(index)?;
        let result = f(self);
        self.goto_frame(back)?;
        result
    }

    fn evaluate(&mut self, expr: &str) -> Result<Evaluation, Error> {
        command::validate(expr)?;
        let result = match self.execute(&command::print(expr), extract::value, None) {
            Ok(outcome) => outcome.require()?,
            Err(Error::Rejected(error)) => return Ok(Evaluation::Error { error }),
            Err(e) => return Err(e),
        };
        let type_name = self
            .execute(&command::type_name(expr), extract::type_name, None)?
            .require()?;
        Ok(Evaluation::Value { result, type_name })
    }

    fn scope(&mut self, scope: Scope) -> Result<Vec<Variable>, Error> {
        let vars = self
            .execute(&command::dump_scope(scope), extract::variables, None)?
            .require()?;
        Ok(match scope {
            Scope::Locals => vars,
            Scope::Globals => vars
                .into_iter()
                .filter(|v| !v.name.starts_with("__"))
                .collect(),
        })
    }

    fn inspect(&mut self, name: &str) -> Result<VariableDetails, Error> {
        command::validate(name)?;
        let repr = self
            .execute(&command::print(name), extract::value, None)?
            .require()?;
        // name is known to resolve, `str` output is taken verbatim
        let value = self
            .execute(&command::print_str(name), extract::printed, None)?
            .require()?;
        let type_name = self
            .execute(&command::type_name(name), extract::type_name, None)?
            .require()?;
        let attributes = self
            .execute(&command::dump_attributes(name), extract::attributes, None)?
            .require()?;
        Ok(VariableDetails {
            name: name.to_string(),
            value,
            type_name,
            repr,
            attributes,
        })
    }

    fn source(&mut self, line: Option<u32>, range: u32) -> Result<SourceListing, Error> {
        let current_line = self.inner.location.as_ref().map(|l| l.line);
        let center = line.or(current_line).unwrap_or(1);
        let lines = self
            .execute(
                &command::list(center.saturating_sub(range), center.saturating_add(range)),
                extract::source,
                None,
            )?
            .require()?;
        Ok(SourceListing {
            lines,
            current_line,
        })
    }
}

impl DebugSession {
    /// Current stack, frame 0 is the innermost one.
    pub fn backtrace(&self) -> Result<Vec<StackFrame>, Error> {
        self.lock()?.stack()
    }

    /// Select a caller frame.
    pub fn frame_up(&self, count: usize) -> Result<StackFrame, Error> {
        self.lock()?.move_frame(count.max(1), true)
    }

    /// Select a callee frame.
    pub fn frame_down(&self, count: usize) -> Result<StackFrame, Error> {
        self.lock()?.move_frame(count.max(1), false)
    }

    /// Source around `line`, or around the current line.
    pub fn source(&self, line: Option<u32>, range: u32) -> Result<SourceListing, Error> {
        self.lock()?.source(line, range)
    }

    /// Evaluate expression in frame `frame` or in the current one.
    pub fn evaluate(&self, expr: &str, frame: Option<usize>) -> Result<Evaluation, Error> {
        self.lock()?.in_frame(frame, |ex| ex.evaluate(expr))
    }

    /// Variables of a frame, sorted by name.
    pub fn variables(
        &self,
        include_globals: bool,
        frame: Option<usize>,
    ) -> Result<VariableListing, Error> {
        self.lock()?.in_frame(frame, |ex| {
            Ok(VariableListing {
                locals: ex.scope(Scope::Locals)?,
                globals: include_globals
                    .then(|| ex.scope(Scope::Globals))
                    .transpose()?,
            })
        })
    }

    /// Value, type and public attributes of a variable.
    pub fn inspect_variable(
        &self,
        name: &str,
        frame: Option<usize>,
    ) -> Result<VariableDetails, Error> {
        self.lock()?.in_frame(frame, |ex| ex.inspect(name))
    }
}
