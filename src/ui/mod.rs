//! The tool-call surface over a framed JSON transport.

pub mod server;
pub mod tools;
pub mod transport;
