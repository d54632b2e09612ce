//! Microsoft Graph (OneDrive) backend.
//!
//! This module provides:
//! - An authenticated REST transport for the Graph API
//! - OAuth2 authorization-code login with PKCE and silent refresh

pub mod auth;
pub mod client;

pub use auth::{
    parse_authorization_response, AuthConfig, AuthManager, LoginPrompt, OAuthAuthenticator,
    PendingLogin, Tokens,
};
pub use client::GraphTransport;
