//! Drive access layer for drivekv.
//!
//! This module provides the seams the record store talks through and their
//! implementations:
//! - [`Transport`]: authenticated GET/POST/PUT/DELETE against the drive API
//! - [`Authenticator`]: bearer token acquisition
//! - [`paths`]: the app-folder path conventions
//! - [`graph`]: the Microsoft Graph transport and OAuth2 login
//! - [`MemoryDrive`]: an in-memory drive for tests
//!
//! # Design Principles
//! - No retries: every failure reaches the caller unchanged
//! - Uniform errors: non-2xx statuses map to the same error variants everywhere

pub mod auth;
pub mod graph;
pub mod memory;
pub mod paths;
pub mod transport;

pub use auth::{Authenticator, StaticToken};
pub use graph::{AuthConfig, GraphTransport, LoginPrompt, OAuthAuthenticator, Tokens};
pub use memory::{MemoryDrive, Method};
pub use transport::{ChildrenPage, DriveItem, Transport};
