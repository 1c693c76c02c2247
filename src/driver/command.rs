//! Text of the commands written to the debugger, one function per command kind.

use crate::driver::error::Error;

/// Where a breakpoint should be placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointTarget {
    Line(String, u32),
    /// Function name, resolved by the debugger in the current file or namespace.
    Function(String),
}

/// Check that text is a single debugger command line.
pub fn validate(text: &str) -> Result<(), Error> {
    if text.trim().is_empty() {
        return Err(Error::Validation("empty debugger command".to_string()));
    }
    if text.contains(['\n', '\r']) {
        return Err(Error::Validation(
            "debugger command must be a single line".to_string(),
        ));
    }
    Ok(())
}

pub fn set_breakpoint(target: &BreakpointTarget, condition: Option<&str>, temporary: bool) -> String {
    let cmd = if temporary { "tbreak" } else { "break" };
    let location = match target {
        BreakpointTarget::Line(file, line) => format!("{file}:{line}"),
        BreakpointTarget::Function(name) => name.clone(),
    };
    match condition {
        Some(cond) => format!("{cmd} {location}, {cond}"),
        None => format!("{cmd} {location}"),
    }
}

pub fn clear_breakpoint(number: u32) -> String {
    format!("clear {number}")
}

pub fn enable_breakpoint(number: u32) -> String {
    format!("enable {number}")
}

pub fn disable_breakpoint(number: u32) -> String {
    format!("disable {number}")
}

pub fn list_breakpoints() -> String {
    "break".to_string()
}

pub fn r#continue() -> String {
    "continue".to_string()
}

pub fn step_into() -> String {
    "step".to_string()
}

pub fn step_over() -> String {
    "next".to_string()
}

pub fn step_out() -> String {
    "return".to_string()
}

pub fn until(line: Option<u32>) -> String {
    match line {
        Some(line) => format!("until {line}"),
        None => "until".to_string(),
    }
}

pub fn backtrace() -> String {
    "where".to_string()
}

pub fn up(count: usize) -> String {
    format!("up {count}")
}

pub fn down(count: usize) -> String {
    format!("down {count}")
}

/// List lines `first..=last`.
pub fn list(first: u32, last: u32) -> String {
    format!("list {}, {}", first.max(1), last.max(first.max(1)))
}

/// `repr` of an expression.
pub fn print(expr: &str) -> String {
    format!("p {expr}")
}

/// `str` of an expression.
pub fn print_str(expr: &str) -> String {
    format!("!print({expr})")
}

pub fn type_name(expr: &str) -> String {
    format!("p type({expr}).__name__")
}

/// Which namespace of the current frame to dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Locals,
    Globals,
}

/// Dump a namespace as `name\ttype\trepr` lines sorted by name.
pub fn dump_scope(scope: Scope) -> String {
    let ns = match scope {
        Scope::Locals => "locals()",
        Scope::Globals => "globals()",
    };
    format!(
        r#"!print("\n".join(f"{{__k}}\t{{type(__v).__name__}}\t{{__v!r:.200}}" for __k, __v in sorted({ns}.items())))"#
    )
}

/// Dump public attributes of an expression as `name\trepr` lines.
pub fn dump_attributes(expr: &str) -> String {
    format!(
        r#"!print("\n".join(f"{{__a}}\t{{getattr(__o, __a, None)!r:.200}}" for __o in [{expr}] for __a in dir(__o) if not __a.startswith("_")))"#
    )
}
