//! Common utilities and types shared across drivekv crates.
//!
//! This module provides the error taxonomy and the validated identifiers
//! used by the transport, the record store and the CLI.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{AppId, FolderName};
