//! HTTP API module.
//!
//! This module provides the HTTP server, API types and log streaming for the
//! rollbook backend.

pub mod logs;
pub mod server;
pub mod types;

pub use logs::*;
pub use server::{router, start_server};
pub use types::*;
