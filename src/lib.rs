#![forbid(unsafe_code)]

//! `acp-mux`: one editor connection, many agent sessions.

pub mod acp;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod output;
pub mod protocol;
pub mod session;
pub mod workspace;

pub use config::ProxyConfig;
pub use dispatcher::{Dispatcher, DispatcherSettings};
pub use errors::{AppError, Result};
