//! Database handle: the public entry point of the record store.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use drivekv_common::{AppId, Error, FolderName, Result};
use drivekv_storage::{Authenticator, Transport};

use crate::config::StoreConfig;
use crate::provisioner::ensure_folder;
use crate::records::{RecordStore, Records, WriteAck};

/// Lifecycle state of a [`Database`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// `init()` has not completed successfully.
    Uninitialized,
    /// Folder provisioned, token cached and the first load done.
    Ready,
}

/// Key-value database stored as one file per record in the app folder.
///
/// The in-memory mapping is the working copy: callers read and mutate it
/// freely, then persist it with [`save`](Self::save), which rewrites every
/// remote file. Top-level calls must be serialized by the caller.
///
/// # Example
/// ```no_run
/// # async fn demo() -> drivekv_common::Result<()> {
/// use std::sync::Arc;
/// use drivekv_common::{AppId, FolderName};
/// use drivekv_storage::{GraphTransport, StaticToken};
/// use drivekv_store::{Database, StoreConfig};
///
/// let config = StoreConfig::new(AppId::new("client-id")?, FolderName::new("settings")?);
/// let mut db = Database::new(
///     config,
///     Arc::new(GraphTransport::new()?),
///     Arc::new(StaticToken::new("access-token")),
/// );
/// db.init().await?;
/// db.set("theme", &"dark")?;
/// db.save().await?;
/// # Ok(())
/// # }
/// ```
pub struct Database {
    config: StoreConfig,
    transport: Arc<dyn Transport>,
    authenticator: Arc<dyn Authenticator>,
    token: Option<String>,
    status: Status,
    records: Records,
}

impl Database {
    /// Create an uninitialized handle.
    pub fn new(
        config: StoreConfig,
        transport: Arc<dyn Transport>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            config,
            transport,
            authenticator,
            token: None,
            status: Status::Uninitialized,
            records: Records::new(),
        }
    }

    /// Current lifecycle state.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Check if `init()` has completed.
    pub fn is_ready(&self) -> bool {
        self.status == Status::Ready
    }

    /// Application identifier.
    pub fn app_id(&self) -> &AppId {
        &self.config.app_id
    }

    /// Folder holding the record files.
    pub fn folder_name(&self) -> &FolderName {
        &self.config.folder_name
    }

    /// Get the configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Authenticate, provision the folder and load every record.
    ///
    /// # Postconditions
    /// - On success the handle is `Ready` and holds the loaded records
    /// - On failure the handle is `Uninitialized` with no cached token
    ///
    /// # Errors
    /// - Login failed or was cancelled
    /// - Folder provisioning failed
    /// - The initial load failed
    pub async fn init(&mut self) -> Result<&Records> {
        self.config.validate()?;
        self.status = Status::Uninitialized;
        self.token = None;

        let token = self.authenticator.get_token().await?;

        if let Err(err) = ensure_folder(&*self.transport, &token, &self.config.folder_name).await {
            warn!("Provisioning '{}' failed: {}", self.config.folder_name, err);
            return Err(err);
        }

        let records =
            RecordStore::from_config(self.transport.clone(), token.clone(), &self.config)
                .load_all()
                .await?;

        self.token = Some(token);
        self.records = records;
        self.status = Status::Ready;
        info!(
            "Database '{}' ready with {} records",
            self.config.folder_name,
            self.records.len()
        );
        Ok(&self.records)
    }

    /// Re-read every record from the drive, replacing the in-memory mapping.
    ///
    /// The mapping is left untouched when the load fails.
    ///
    /// # Errors
    /// - [`Error::NotInitialized`] before a successful `init()`
    /// - Listing, download or parse failure of any file
    pub async fn load(&mut self) -> Result<&Records> {
        let records = self.store()?.load_all().await?;
        self.records = records;
        Ok(&self.records)
    }

    /// Replace the remote folder content with the in-memory mapping.
    ///
    /// # Errors
    /// - [`Error::NotInitialized`] before a successful `init()`
    /// - Any delete or write failure; see [`RecordStore::replace_all`]
    pub async fn save(&self) -> Result<Vec<WriteAck>> {
        let acks = self
            .store()?
            .replace_all(&self.records, self.config.save_strategy)
            .await?;
        info!(
            "Saved {} records to '{}'",
            acks.len(),
            self.config.folder_name
        );
        Ok(acks)
    }

    /// Record store bound to the cached token.
    ///
    /// # Errors
    /// - [`Error::NotInitialized`] before a successful `init()`
    pub fn store(&self) -> Result<RecordStore> {
        match (&self.status, &self.token) {
            (Status::Ready, Some(token)) => Ok(RecordStore::from_config(
                self.transport.clone(),
                token.clone(),
                &self.config,
            )),
            _ => Err(Error::NotInitialized),
        }
    }

    /// The in-memory mapping.
    pub fn records(&self) -> &Records {
        &self.records
    }

    /// Mutable access to the in-memory mapping.
    pub fn records_mut(&mut self) -> &mut Records {
        &mut self.records
    }

    /// Get a raw value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.records.get(key)
    }

    /// Get a value deserialized into `T`.
    ///
    /// # Errors
    /// - The stored value does not match `T`
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.records
            .get(key)
            .map(|value| {
                T::deserialize(value)
                    .map_err(|e| Error::Parse(format!("Record '{}': {}", key, e)))
            })
            .transpose()
    }

    /// Set a value, returning the previous one.
    ///
    /// # Errors
    /// - `value` cannot be represented as JSON
    pub fn set<T: Serialize + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<Option<Value>> {
        let key = key.into();
        let value = serde_json::to_value(value)
            .map_err(|e| Error::InvalidInput(format!("Record '{}': {}", key, e)))?;
        Ok(self.records.insert(key, value))
    }

    /// Remove a value, returning it.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.records.remove(key)
    }

    /// Remove every value from the in-memory mapping.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Number of records in memory.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if there are no records in memory.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
