//! Terminal login prompt.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use drivekv_common::{Error, Result};
use drivekv_storage::LoginPrompt;

/// Opens the authorization page in the browser and reads the redirect URL
/// back from stdin.
pub struct TerminalPrompt;

#[async_trait]
impl LoginPrompt for TerminalPrompt {
    async fn authorize(&self, url: &str) -> Result<String> {
        eprintln!("Sign in to OneDrive at:\n\n  {}\n", url);
        if let Err(e) = open::that(url) {
            debug!("Could not open browser: {}", e);
        }
        eprintln!("After signing in, paste the URL of the blank page you land on:");

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .map_err(|e| Error::Auth(format!("Failed to read answer: {}", e)))?;

        Ok(line.trim().to_string())
    }
}
