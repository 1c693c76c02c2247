use crate::driver::breakpoint::{Breakpoint, BreakpointRequest};
use crate::driver::command::{self, BreakpointTarget};
use crate::driver::error::Error;
use crate::driver::extract;
use crate::driver::session::{DebugSession, Exclusive};

impl Exclusive<'_> {
    /// Debugger number of a breakpoint, validation error for unknown ids.
    fn breakpoint_number(&self, id: u32) -> Result<u32, Error> {
        self.inner
            .breakpoints
            .get(id)
            .map(|b| b.number)
            .ok_or_else(|| Error::Validation(format!("unknown breakpoint id {id}")))
    }

    fn set_breakpoint(
        &mut self,
        file: &str,
        line: Option<u32>,
        function: Option<&str>,
        condition: Option<&str>,
        temporary: bool,
    ) -> Result<Breakpoint, Error> {
        let target = match (line, function) {
            (Some(line), _) => BreakpointTarget::Line(file.to_string(), line),
            (None, Some(function)) => BreakpointTarget::Function(function.to_string()),
            (None, None) => {
                return Err(Error::Validation(
                    "either line or function must be specified".to_string(),
                ))
            }
        };
        if let Some(cond) = condition {
            command::validate(cond)?;
        }

        let created = self
            .execute(
                &command::set_breakpoint(&target, condition, temporary),
                extract::breakpoint_created,
                None,
            )?
            .require()?;
        let request = BreakpointRequest {
            function: function.filter(|_| line.is_none()).map(ToString::to_string),
            condition: condition.map(ToString::to_string),
            temporary,
        };
        Ok(self.inner.breakpoints.insert(created, request).clone())
    }

    fn remove_breakpoint(&mut self, id: u32) -> Result<Breakpoint, Error> {
        let number = self.breakpoint_number(id)?;
        self.execute(
            &command::clear_breakpoint(number),
            extract::breakpoint_ack,
            None,
        )?
        .require()?;
        self.inner
            .breakpoints
            .remove(id)
            .ok_or_else(|| Error::Validation(format!("unknown breakpoint id {id}")))
    }

    fn toggle_breakpoint(&mut self, id: u32, enable: bool) -> Result<Breakpoint, Error> {
        let number = self.breakpoint_number(id)?;
        let cmd = if enable {
            command::enable_breakpoint(number)
        } else {
            command::disable_breakpoint(number)
        };
        self.execute(&cmd, extract::breakpoint_ack, None)?.require()?;
        self.inner
            .breakpoints
            .set_enabled(id, enable)
            .cloned()
            .ok_or_else(|| Error::Validation(format!("unknown breakpoint id {id}")))
    }

    fn breakpoints_snapshot(&mut self) -> Result<Vec<Breakpoint>, Error> {
        let rows = self
            .execute(
                &command::list_breakpoints(),
                extract::breakpoint_table,
                None,
            )?
            .require()?;
        self.inner.breakpoints.sync(&rows);
        Ok(self.inner.breakpoints.snapshot())
    }
}

impl DebugSession {
    /// Set a breakpoint at `file:line`, or at a function if no line given.
    pub fn set_breakpoint(
        &self,
        file: &str,
        line: Option<u32>,
        function: Option<&str>,
        condition: Option<&str>,
        temporary: bool,
    ) -> Result<Breakpoint, Error> {
        self.lock()?
            .set_breakpoint(file, line, function, condition, temporary)
    }

    pub fn remove_breakpoint(&self, id: u32) -> Result<Breakpoint, Error> {
        self.lock()?.remove_breakpoint(id)
    }

    pub fn enable_breakpoint(&self, id: u32) -> Result<Breakpoint, Error> {
        self.lock()?.toggle_breakpoint(id, true)
    }

    pub fn disable_breakpoint(&self, id: u32) -> Result<Breakpoint, Error> {
        self.lock()?.toggle_breakpoint(id, false)
    }

    /// All breakpoints ordered by id, hit counts refreshed from the debugger.
    pub fn breakpoints(&self) -> Result<Vec<Breakpoint>, Error> {
        self.lock()?.breakpoints_snapshot()
    }
}
