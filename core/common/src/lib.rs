//! Common utilities and types shared across the reportsync crates.
//!
//! This module provides foundational types that are used throughout the codebase:
//! the error taxonomy, spreadsheet value types, credential configuration and the
//! bounded-wait helpers used during client bootstrap.

pub mod config;
pub mod context;
pub mod error;
pub mod retry;
pub mod types;

pub use config::Credentials;
pub use context::CallContext;
pub use error::{Error, Result};
pub use retry::{await_ready, RetryConfig, RetryExecutor};
pub use types::{CellValue, SensitiveString, SheetMatrix};
