use crate::driver::extract::ParseError;
use crate::driver::prompt::ParserState;
use std::io;

/// Reasons why a debugger process could not be brought to its first prompt.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("python interpreter not found: {0}")]
    InterpreterNotFound(String),
    #[error("debug target not found: {0}")]
    TargetNotFound(String),
    #[error("working directory not found: {0}")]
    WorkingDirNotFound(String),
    #[error("spawn debugger process: {0}")]
    Spawn(#[source] io::Error),
    #[error("failed to get initial prompt within {timeout_ms} ms. Output: {output}")]
    StartupTimeout { timeout_ms: u64, output: String },
    #[error("debugger process exited before the first prompt. Output: {output}")]
    StartupCrash { output: String },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- process lifecycle errors ----------------------------------
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error("no debugger prompt within {0} ms, process killed")]
    Timeout(u64),
    #[error("debugger process crashed: {0}")]
    ProcessCrashed(String),
    #[error("debugger process is gone (state {0})")]
    SessionTerminated(ParserState),

    // --------------------------------- session errors --------------------------------------------
    #[error("session {0} is busy with another command")]
    Busy(String),
    #[error("session {0} not found")]
    SessionNotFound(String),

    // --------------------------------- request errors --------------------------------------------
    #[error("{0}")]
    Validation(String),
    #[error("debugger rejected command: {0}")]
    Rejected(String),
    #[error("unable to parse debugger output: {0}")]
    ParseFailure(ParseError),

    // --------------------------------- generic errors --------------------------------------------
    #[error(transparent)]
    IO(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::Rejected(msg) => Error::Rejected(msg),
            e => Error::ParseFailure(e),
        }
    }
}

impl Error {
    /// Stable error kind, used as a machine readable tag in structured error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Launch(_) => "launch_error",
            Error::Timeout(_) => "timeout",
            Error::ProcessCrashed(_) => "process_crashed",
            Error::SessionTerminated(_) => "session_terminated",
            Error::Busy(_) => "busy",
            Error::SessionNotFound(_) => "session_not_found",
            Error::Validation(_) => "validation_error",
            Error::Rejected(_) => "rejected",
            Error::ParseFailure(_) => "parse_failure",
            Error::IO(_) => "io_error",
            Error::Json(_) => "validation_error",
        }
    }

    /// Return true if the session process is no longer usable after this error.
    pub fn is_terminal(&self) -> bool {
        match self {
            Error::Launch(_) => true,
            Error::Timeout(_) => true,
            Error::ProcessCrashed(_) => true,
            Error::SessionTerminated(_) => true,
            Error::Busy(_) => false,
            Error::SessionNotFound(_) => false,
            Error::Validation(_) => false,
            Error::Rejected(_) => false,
            Error::ParseFailure(_) => false,
            Error::IO(_) => false,
            Error::Json(_) => false,
        }
    }
}

#[macro_export]
macro_rules! _error {
    ($log_fn: path, $res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "driver", "{:#}", e);
                None
            }
        }
    };
    ($log_fn: path, $res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "driver", concat!($msg, " {:#}"), e);
                None
            }
        }
    };
}

/// Transforms `Result` into `Option` and logs an error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        $crate::_error!(log::warn, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::warn, $res, $msg)
    };
}

/// Transforms `Result` into `Option` and put error into debug logs if it occurs.
#[macro_export]
macro_rules! muted_error {
    ($res: expr) => {
        $crate::_error!(log::debug, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::debug, $res, $msg)
    };
}
