//! Store configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use drivekv_common::{AppId, Error, FolderName, Result};

/// Default extension of record files.
const DEFAULT_FILE_EXTENSION: &str = ".json";

/// Order of the two phases of a full-replace save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveStrategy {
    /// Delete every remote file, then write the current records.
    #[default]
    DeleteFirst,
    /// Write the current records under fresh names, then delete the files
    /// that existed before the save started.
    WriteFirst,
}

/// Configuration of a record store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Application (client) ID.
    pub app_id: AppId,
    /// Folder under the app root that holds the record files.
    pub folder_name: FolderName,
    /// Extension appended to generated file names.
    #[serde(default = "default_file_extension")]
    pub file_extension: String,
    /// Upper bound on concurrent requests per fan-out (unbounded when unset).
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    /// Phase order used by `save()`.
    #[serde(default)]
    pub save_strategy: SaveStrategy,
}

fn default_file_extension() -> String {
    DEFAULT_FILE_EXTENSION.to_string()
}

impl StoreConfig {
    /// Create a configuration with default settings.
    pub fn new(app_id: AppId, folder_name: FolderName) -> Self {
        Self {
            app_id,
            folder_name,
            file_extension: default_file_extension(),
            max_concurrency: None,
            save_strategy: SaveStrategy::default(),
        }
    }

    /// Set the record file extension.
    pub fn with_file_extension(mut self, extension: impl Into<String>) -> Self {
        self.file_extension = extension.into();
        self
    }

    /// Cap the number of in-flight requests per fan-out.
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    /// Set the save strategy.
    pub fn with_save_strategy(mut self, strategy: SaveStrategy) -> Self {
        self.save_strategy = strategy;
        self
    }

    /// Load and validate a JSON configuration file.
    ///
    /// # Errors
    /// - File cannot be read
    /// - Content is not a valid configuration
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings that serde cannot.
    pub fn validate(&self) -> Result<()> {
        let ext = &self.file_extension;
        if !ext.starts_with('.') || ext.len() < 2 {
            return Err(Error::Config(format!(
                "File extension must start with '.' and be non-empty: {:?}",
                ext
            )));
        }
        if FolderName::new(format!("x{}", ext)).is_err() {
            return Err(Error::Config(format!(
                "File extension contains reserved characters: {:?}",
                ext
            )));
        }
        if self.max_concurrency == Some(0) {
            return Err(Error::Config(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
