//! Session driver: runs an interactive pdb as a child process and turns its
//! line-oriented dialogue into typed results.
//!
//! Leaves first: [`process`] spawns the debugger, [`output`] reads its streams,
//! [`prompt`] decides when the debugger waits for input, [`extract`] parses command
//! output, [`session`] bridges commands and responses, [`registry`] owns sessions.

pub mod breakpoint;
pub mod command;
pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod page;
pub mod process;
pub mod prompt;
pub mod registry;
pub mod session;

pub use breakpoint::Breakpoint;
pub use config::Config;
pub use error::{Error, LaunchError};
pub use page::{paginate, Page, Pagination};
pub use process::{LaunchSpec, Mode};
pub use prompt::ParserState;
pub use registry::SessionRegistry;
pub use session::{DebugSession, SessionInfo, StopReason, StopReport, Timeouts};
