//! Persisted sign-in sessions.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use drivekv_common::AppId;
use drivekv_storage::Tokens;

/// Token cache on disk, one file per application id.
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    /// Store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under the user's configuration directory.
    pub fn default_location() -> Result<Self> {
        let base = dirs::config_dir().context("No configuration directory on this platform")?;
        Ok(Self::new(base.join("drivekv")))
    }

    fn path(&self, app_id: &AppId) -> PathBuf {
        let safe: String = app_id
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("session-{}.json", safe))
    }

    /// Load the saved session, if any.
    pub fn load(&self, app_id: &AppId) -> Result<Option<Tokens>> {
        let path = self.path(app_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let tokens = serde_json::from_str(&content)
            .with_context(|| format!("Corrupt session file {}", path.display()))?;
        Ok(Some(tokens))
    }

    /// Save the session, replacing any previous one.
    pub fn save(&self, app_id: &AppId, tokens: &Tokens) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let path = self.path(app_id);
        write_private(&path, &serde_json::to_string_pretty(tokens)?)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Forget the saved session.
    pub fn clear(&self, app_id: &AppId) -> Result<bool> {
        let path = self.path(app_id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).with_context(|| format!("Failed to remove {}", path.display()))?;
        Ok(true)
    }
}

#[cfg(unix)]
fn write_private(path: &Path, content: &str) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(content.as_bytes())
}

#[cfg(not(unix))]
fn write_private(path: &Path, content: &str) -> std::io::Result<()> {
    fs::write(path, content)
}
