//! Authenticator trait definition.

use async_trait::async_trait;

use drivekv_common::{Error, Result};

/// Source of bearer tokens for the drive API.
///
/// Refresh and interactive login are the implementation's concern; the
/// record store asks for a token once per handle and never retries.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Return a token from the current session, logging in if there is none.
    ///
    /// # Errors
    /// - [`Error::Auth`] when login fails or is cancelled
    async fn get_token(&self) -> Result<String>;

    /// Force an interactive login and return the fresh token.
    async fn login(&self) -> Result<String>;
}

/// Authenticator that hands out a token obtained elsewhere.
#[derive(Debug, Clone)]
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    /// Wrap an existing access token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl Authenticator for StaticToken {
    async fn get_token(&self) -> Result<String> {
        if self.token.is_empty() {
            return Err(Error::Auth("No access token provided".to_string()));
        }
        Ok(self.token.clone())
    }

    async fn login(&self) -> Result<String> {
        self.get_token().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token() {
        let auth = StaticToken::new("abc");
        assert_eq!(auth.get_token().await.unwrap(), "abc");
        assert_eq!(auth.login().await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_empty_static_token_fails() {
        let auth = StaticToken::new("");
        assert!(matches!(auth.get_token().await, Err(Error::Auth(_))));
    }
}
