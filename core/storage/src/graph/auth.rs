//! OAuth2 authentication and token management for Microsoft Graph.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use oauth2::basic::BasicClient;
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken, Scope, TokenResponse,
    TokenUrl,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use url::Url;

use drivekv_common::{AppId, Error, Result};

use crate::auth::Authenticator;

/// Microsoft identity platform host.
const LOGIN_HOST: &str = "https://login.microsoftonline.com";
/// Tenant used when none is configured (personal and work accounts).
const DEFAULT_TENANT: &str = "common";
/// Redirect URL registered for native clients.
const NATIVE_REDIRECT_URL: &str = "https://login.microsoftonline.com/common/oauth2/nativeclient";

/// Scopes needed to read and write the app folder and keep a refresh token.
const SCOPES: &[&str] = &["User.Read", "Files.ReadWrite.AppFolder", "offline_access"];

type GraphOAuthClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// OAuth2 tokens with expiration tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tokens {
    /// Access token for API requests.
    pub access_token: String,
    /// Refresh token, present when `offline_access` was granted.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// When the access token expires.
    pub expires_at: DateTime<Utc>,
}

impl Tokens {
    /// Check if the access token is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        // Consider expired if less than 5 minutes remaining
        self.expires_at < Utc::now() + Duration::minutes(5)
    }

    fn from_response(
        response: &impl TokenResponse,
        previous_refresh: Option<&str>,
    ) -> Self {
        let expires_in = response
            .expires_in()
            .unwrap_or_else(|| std::time::Duration::from_secs(3600));
        let expires_at =
            Utc::now() + Duration::from_std(expires_in).unwrap_or_else(|_| Duration::hours(1));

        Self {
            access_token: response.access_token().secret().clone(),
            // Refresh tokens may or may not be rotated on refresh
            refresh_token: response
                .refresh_token()
                .map(|t| t.secret().clone())
                .or_else(|| previous_refresh.map(str::to_string)),
            expires_at,
        }
    }
}

/// Configuration for OAuth2 authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Application (client) ID from the app registration.
    pub client_id: String,
    /// Redirect URL registered for the application.
    #[serde(default = "default_redirect_url")]
    pub redirect_url: String,
    /// Directory tenant (`common`, `consumers`, `organizations` or a tenant ID).
    #[serde(default = "default_tenant")]
    pub tenant: String,
}

fn default_redirect_url() -> String {
    NATIVE_REDIRECT_URL.to_string()
}

fn default_tenant() -> String {
    DEFAULT_TENANT.to_string()
}

impl AuthConfig {
    /// Configuration for a public native client with the default tenant.
    pub fn new(app_id: &AppId) -> Self {
        Self {
            client_id: app_id.as_str().to_string(),
            redirect_url: default_redirect_url(),
            tenant: default_tenant(),
        }
    }

    /// Set the redirect URL.
    pub fn with_redirect_url(mut self, redirect_url: impl Into<String>) -> Self {
        self.redirect_url = redirect_url.into();
        self
    }

    /// Set the tenant.
    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = tenant.into();
        self
    }

    fn authorize_url(&self) -> String {
        format!("{}/{}/oauth2/v2.0/authorize", LOGIN_HOST, self.tenant)
    }

    fn token_url(&self) -> String {
        format!("{}/{}/oauth2/v2.0/token", LOGIN_HOST, self.tenant)
    }
}

/// An authorization request waiting for the user to come back with a code.
pub struct PendingLogin {
    /// URL the user must visit.
    pub url: String,
    /// CSRF state expected on the redirect.
    pub state: String,
    verifier: PkceCodeVerifier,
}

/// OAuth2 authentication manager for the Microsoft identity platform.
pub struct AuthManager {
    client: GraphOAuthClient,
    http: oauth2::reqwest::Client,
    config: AuthConfig,
}

impl AuthManager {
    /// Create a new authentication manager.
    ///
    /// # Errors
    /// - Endpoint or redirect URL is malformed
    pub fn new(config: AuthConfig) -> Result<Self> {
        let client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_auth_type(AuthType::RequestBody)
            .set_auth_uri(
                AuthUrl::new(config.authorize_url())
                    .map_err(|e| Error::InvalidInput(format!("Invalid auth URL: {}", e)))?,
            )
            .set_token_uri(
                TokenUrl::new(config.token_url())
                    .map_err(|e| Error::InvalidInput(format!("Invalid token URL: {}", e)))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(config.redirect_url.clone())
                    .map_err(|e| Error::InvalidInput(format!("Invalid redirect URL: {}", e)))?,
            );

        // Token endpoints must not follow redirects (SSRF)
        let http = oauth2::reqwest::ClientBuilder::new()
            .redirect(oauth2::reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Auth(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            http,
            config,
        })
    }

    /// Start an authorization-code flow with PKCE.
    pub fn begin_login(&self) -> PendingLogin {
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        let (url, csrf_token) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(SCOPES.iter().map(|s| Scope::new(s.to_string())))
            .set_pkce_challenge(challenge)
            .url();

        PendingLogin {
            url: url.to_string(),
            state: csrf_token.secret().clone(),
            verifier,
        }
    }

    /// Exchange an authorization code for tokens.
    ///
    /// # Errors
    /// - Invalid or expired authorization code
    /// - Network errors
    pub async fn exchange_code(&self, code: &str, pending: PendingLogin) -> Result<Tokens> {
        let response = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(pending.verifier)
            .request_async(&self.http)
            .await
            .map_err(|e| Error::Auth(format!("Token exchange failed: {}", e)))?;

        Ok(Tokens::from_response(&response, None))
    }

    /// Refresh an access token using the refresh token.
    ///
    /// # Errors
    /// - Invalid or revoked refresh token
    /// - Network errors
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<Tokens> {
        let response = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| Error::Auth(format!("Token refresh failed: {}", e)))?;

        Ok(Tokens::from_response(&response, Some(refresh_token)))
    }

    /// Get the current configuration.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }
}

/// Interactive half of the login: shows the authorization URL to the user.
#[async_trait]
pub trait LoginPrompt: Send + Sync {
    /// Present `url` and return what the user brings back, either the full
    /// redirect URL or the bare authorization code.
    async fn authorize(&self, url: &str) -> Result<String>;
}

/// Extract the authorization code from the user's answer.
///
/// Accepts a redirect URL (checked against `expected_state`) or a bare code.
pub fn parse_authorization_response(answer: &str, expected_state: &str) -> Result<String> {
    let answer = answer.trim();
    if answer.is_empty() {
        return Err(Error::Auth("Login cancelled".to_string()));
    }

    let Ok(url) = Url::parse(answer) else {
        return Ok(answer.to_string());
    };

    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut description = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(Error::Auth(match description {
            Some(description) => format!("{}: {}", error, description),
            None => error,
        }));
    }
    if state.as_deref() != Some(expected_state) {
        return Err(Error::Auth("State mismatch in redirect URL".to_string()));
    }
    code.ok_or_else(|| Error::Auth("Redirect URL carries no authorization code".to_string()))
}

/// Authenticator backed by the OAuth2 authorization-code flow.
///
/// Keeps the current tokens in memory, refreshes them silently when they
/// are about to expire, and falls back to an interactive login through the
/// [`LoginPrompt`].
pub struct OAuthAuthenticator {
    manager: AuthManager,
    prompt: Arc<dyn LoginPrompt>,
    tokens: RwLock<Option<Tokens>>,
}

impl OAuthAuthenticator {
    /// Create an authenticator with no session.
    pub fn new(manager: AuthManager, prompt: Arc<dyn LoginPrompt>) -> Self {
        Self {
            manager,
            prompt,
            tokens: RwLock::new(None),
        }
    }

    /// Restore a previously persisted session.
    pub fn with_tokens(self, tokens: Tokens) -> Self {
        Self {
            tokens: RwLock::new(Some(tokens)),
            ..self
        }
    }

    /// Get the current tokens (useful for persistence).
    pub async fn tokens(&self) -> Option<Tokens> {
        self.tokens.read().await.clone()
    }

    async fn interactive_login(&self) -> Result<Tokens> {
        let pending = self.manager.begin_login();
        let answer = self.prompt.authorize(&pending.url).await?;
        let code = parse_authorization_response(&answer, &pending.state)?;
        let tokens = self.manager.exchange_code(&code, pending).await?;
        info!("Signed in, token valid until {}", tokens.expires_at);
        Ok(tokens)
    }
}

#[async_trait]
impl Authenticator for OAuthAuthenticator {
    async fn get_token(&self) -> Result<String> {
        {
            let tokens = self.tokens.read().await;
            if let Some(tokens) = tokens.as_ref().filter(|t| !t.is_expired()) {
                return Ok(tokens.access_token.clone());
            }
        }

        let mut tokens = self.tokens.write().await;

        // Double-check after acquiring write lock
        if let Some(current) = tokens.as_ref().filter(|t| !t.is_expired()) {
            return Ok(current.access_token.clone());
        }

        let refresh = tokens.as_ref().and_then(|t| t.refresh_token.clone());
        if let Some(refresh) = refresh {
            info!("Refreshing expired access token");
            match self.manager.refresh_token(&refresh).await {
                Ok(fresh) => {
                    let access = fresh.access_token.clone();
                    *tokens = Some(fresh);
                    return Ok(access);
                }
                Err(err) => warn!("Silent refresh failed, falling back to login: {}", err),
            }
        }

        let fresh = self.interactive_login().await?;
        let access = fresh.access_token.clone();
        *tokens = Some(fresh);
        Ok(access)
    }

    async fn login(&self) -> Result<String> {
        let mut tokens = self.tokens.write().await;
        let fresh = self.interactive_login().await?;
        let access = fresh.access_token.clone();
        *tokens = Some(fresh);
        Ok(access)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn manager() -> AuthManager {
        AuthManager::new(AuthConfig::new(&AppId::new("test_id").unwrap())).unwrap()
    }

    struct CancelPrompt {
        calls: AtomicU32,
    }

    #[async_trait]
    impl LoginPrompt for CancelPrompt {
        async fn authorize(&self, _url: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("https://login.microsoftonline.com/common/oauth2/nativeclient?error=access_denied&error_description=user+cancelled".to_string())
        }
    }

    #[test]
    fn test_tokens_expiration() {
        let tokens = Tokens {
            access_token: "test".to_string(),
            refresh_token: None,
            expires_at: Utc::now() - Duration::hours(1),
        };
        assert!(tokens.is_expired());

        let near = Tokens {
            expires_at: Utc::now() + Duration::minutes(4),
            ..tokens.clone()
        };
        assert!(near.is_expired());

        let valid = Tokens {
            expires_at: Utc::now() + Duration::hours(1),
            ..tokens
        };
        assert!(!valid.is_expired());
    }

    #[test]
    fn test_auth_config_defaults_from_json() {
        let config: AuthConfig = serde_json::from_str(r#"{"client_id": "abc"}"#).unwrap();
        assert_eq!(config.tenant, "common");
        assert_eq!(config.redirect_url, NATIVE_REDIRECT_URL);
    }

    #[test]
    fn test_authorization_url_generation() {
        let pending = manager().begin_login();

        assert!(pending.url.starts_with(
            "https://login.microsoftonline.com/common/oauth2/v2.0/authorize"
        ));
        assert!(pending.url.contains("client_id=test_id"));
        assert!(pending.url.contains("Files.ReadWrite.AppFolder"));
        assert!(pending.url.contains("code_challenge="));
        assert!(pending.url.contains(&format!("state={}", pending.state)));
    }

    #[test]
    fn test_parse_redirect_with_code() {
        let code = parse_authorization_response(
            "https://login.microsoftonline.com/common/oauth2/nativeclient?code=M.abc&state=xyz",
            "xyz",
        )
        .unwrap();
        assert_eq!(code, "M.abc");
    }

    #[test]
    fn test_parse_bare_code() {
        assert_eq!(parse_authorization_response("  M.abc \n", "xyz").unwrap(), "M.abc");
    }

    #[test]
    fn test_parse_rejects_state_mismatch() {
        let result = parse_authorization_response(
            "https://localhost/callback?code=M.abc&state=other",
            "xyz",
        );
        assert!(matches!(result, Err(Error::Auth(_))));
    }

    #[test]
    fn test_parse_empty_answer_is_cancel() {
        assert!(matches!(
            parse_authorization_response("", "xyz"),
            Err(Error::Auth(_))
        ));
    }

    #[tokio::test]
    async fn test_valid_session_skips_prompt() {
        let prompt = Arc::new(CancelPrompt {
            calls: AtomicU32::new(0),
        });
        let auth = OAuthAuthenticator::new(manager(), prompt.clone()).with_tokens(Tokens {
            access_token: "cached".to_string(),
            refresh_token: None,
            expires_at: Utc::now() + Duration::hours(1),
        });

        assert_eq!(auth.get_token().await.unwrap(), "cached");
        assert_eq!(prompt.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancelled_login_is_auth_error() {
        let prompt = Arc::new(CancelPrompt {
            calls: AtomicU32::new(0),
        });
        let auth = OAuthAuthenticator::new(manager(), prompt.clone());

        let err = auth.get_token().await.unwrap_err();
        assert!(matches!(err, Error::Auth(ref msg) if msg.contains("access_denied")));
        assert_eq!(prompt.calls.load(Ordering::SeqCst), 1);
        assert!(auth.tokens().await.is_none());
    }
}
