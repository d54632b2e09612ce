//! Record-to-file mapping over the app folder.
//!
//! Every record lives in its own file named by the store, never by the key.
//! The three single-file primitives (`read_record_file`,
//! `create_record_file`, `delete_record_file`) are the only requests that
//! touch record content; full load and full-replace save are concurrent
//! compositions of them.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use drivekv_common::{FolderName, Result};
use drivekv_storage::{paths, ChildrenPage, DriveItem, Transport};

use crate::config::{SaveStrategy, StoreConfig};
use crate::envelope::Envelope;
use crate::fanout::fan_out;

/// In-memory key to value mapping.
pub type Records = HashMap<String, Value>;

/// Acknowledgement of one written record file.
#[derive(Debug, Clone, Serialize)]
pub struct WriteAck {
    /// Generated file name.
    pub file_name: String,
    /// Key of the record stored in the file.
    pub key: String,
    /// Drive item returned by the upload.
    pub response: Value,
}

/// Record file operations for one folder, bound to a bearer token.
///
/// Cloning is cheap; clones share the transport.
#[derive(Clone)]
pub struct RecordStore {
    transport: Arc<dyn Transport>,
    token: Arc<str>,
    folder: FolderName,
    file_extension: String,
    max_concurrency: Option<usize>,
}

impl RecordStore {
    /// Create a store with default file naming and unbounded fan-out.
    pub fn new(transport: Arc<dyn Transport>, token: impl Into<String>, folder: FolderName) -> Self {
        Self {
            transport,
            token: Arc::from(token.into()),
            folder,
            file_extension: ".json".to_string(),
            max_concurrency: None,
        }
    }

    /// Create a store using the naming and concurrency settings of `config`.
    pub fn from_config(
        transport: Arc<dyn Transport>,
        token: impl Into<String>,
        config: &StoreConfig,
    ) -> Self {
        Self {
            file_extension: config.file_extension.clone(),
            max_concurrency: config.max_concurrency,
            ..Self::new(transport, token, config.folder_name.clone())
        }
    }

    /// Folder this store operates on.
    pub fn folder(&self) -> &FolderName {
        &self.folder
    }

    /// List every file directly under the folder, following pagination.
    ///
    /// Sub-folders are skipped.
    pub async fn list_record_files(&self) -> Result<Vec<DriveItem>> {
        let mut items = Vec::new();
        let mut path = paths::folder_children(&self.folder);

        loop {
            let page = ChildrenPage::from_value(self.transport.get(&self.token, &path).await?)?;
            items.extend(page.value.into_iter().filter(|item| !item.is_folder()));

            match page.next_link {
                Some(link) => path = paths::relative_link(&link)?,
                None => break,
            }
        }

        debug!("Listed {} record files in '{}'", items.len(), self.folder);
        Ok(items)
    }

    /// Download one file and return its JSON content.
    pub async fn read_record_file(&self, file_name: &str) -> Result<Value> {
        self.transport
            .get(&self.token, &paths::file_content(&self.folder, file_name))
            .await
    }

    /// Upload one record file, replacing any file of the same name.
    pub async fn create_record_file(&self, file_name: &str, envelope: &Envelope) -> Result<Value> {
        self.transport
            .put(
                &self.token,
                &paths::file_content(&self.folder, file_name),
                envelope.to_body()?,
            )
            .await
    }

    /// Delete one file.
    pub async fn delete_record_file(&self, file_name: &str) -> Result<()> {
        self.transport
            .delete(&self.token, &paths::file_item(&self.folder, file_name))
            .await
    }

    /// Read every record file and rebuild the mapping.
    ///
    /// Files are fetched concurrently and inserted in completion order, so
    /// when two files carry the same key the one that settles last wins.
    /// Any failed fetch or malformed file fails the whole load.
    pub async fn load_all(&self) -> Result<Records> {
        let names = self.list_record_files().await?.into_iter().map(|item| item.name);

        let envelopes = fan_out(self.max_concurrency, names, |name| {
            let store = self.clone();
            async move { Envelope::from_value(store.read_record_file(&name).await?) }
        })
        .await?;

        let mut records = Records::with_capacity(envelopes.len());
        for envelope in envelopes {
            if records.insert(envelope.name.clone(), envelope.value).is_some() {
                warn!("Duplicate record '{}' in '{}'", envelope.name, self.folder);
            }
        }

        info!("Loaded {} records from '{}'", records.len(), self.folder);
        Ok(records)
    }

    /// Delete every file currently in the folder. Returns the count.
    pub async fn delete_all(&self) -> Result<usize> {
        let names: Vec<String> = self
            .list_record_files()
            .await?
            .into_iter()
            .map(|item| item.name)
            .collect();
        self.delete_files(names).await
    }

    async fn delete_files(&self, names: Vec<String>) -> Result<usize> {
        let deleted = fan_out(self.max_concurrency, names, |name| {
            let store = self.clone();
            async move { store.delete_record_file(&name).await }
        })
        .await?;

        debug!("Deleted {} record files from '{}'", deleted.len(), self.folder);
        Ok(deleted.len())
    }

    /// Write one file per record under freshly generated names.
    ///
    /// Names are `{generation}-{index}{extension}` with a random generation
    /// per call, so they never collide with files from earlier saves. Files
    /// written before a failure stay on the drive.
    pub async fn write_all(&self, records: &Records) -> Result<Vec<WriteAck>> {
        let generation = Uuid::new_v4().simple().to_string();
        let generation = &generation[..12];

        let jobs: Vec<(String, Envelope)> = records
            .iter()
            .enumerate()
            .map(|(index, (key, value))| {
                (
                    format!("{}-{}{}", generation, index, self.file_extension),
                    Envelope::new(key.clone(), value.clone()),
                )
            })
            .collect();

        let acks = fan_out(self.max_concurrency, jobs, |(file_name, envelope)| {
            let store = self.clone();
            async move {
                let response = store.create_record_file(&file_name, &envelope).await?;
                Ok(WriteAck {
                    file_name,
                    key: envelope.name,
                    response,
                })
            }
        })
        .await?;

        debug!("Wrote {} record files to '{}'", acks.len(), self.folder);
        Ok(acks)
    }

    /// Replace the folder's content with `records`.
    ///
    /// With [`SaveStrategy::DeleteFirst`] a failed delete phase aborts before
    /// anything is written, and a failed write phase leaves fewer files than
    /// records. With [`SaveStrategy::WriteFirst`] the previous files are only
    /// deleted after every write succeeded.
    pub async fn replace_all(
        &self,
        records: &Records,
        strategy: SaveStrategy,
    ) -> Result<Vec<WriteAck>> {
        match strategy {
            SaveStrategy::DeleteFirst => {
                self.delete_all().await?;
                self.write_all(records).await
            }
            SaveStrategy::WriteFirst => {
                let stale: Vec<String> = self
                    .list_record_files()
                    .await?
                    .into_iter()
                    .map(|item| item.name)
                    .collect();
                let acks = self.write_all(records).await?;
                self.delete_files(stale).await?;
                Ok(acks)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drivekv_common::Error;
    use drivekv_storage::{MemoryDrive, Method};
    use serde_json::json;
    use std::time::Duration;

    fn store(drive: &MemoryDrive) -> RecordStore {
        RecordStore::new(
            Arc::new(drive.clone()),
            "token",
            FolderName::new("app").unwrap(),
        )
    }

    #[tokio::test]
    async fn test_single_file_primitives() {
        let drive = MemoryDrive::new();
        let store = store(&drive);

        store
            .create_record_file("0.json", &Envelope::new("k", json!([1, 2])))
            .await
            .unwrap();
        let content = store.read_record_file("0.json").await.unwrap();
        assert_eq!(content, json!({"name": "k", "value": [1, 2]}));

        store.delete_record_file("0.json").await.unwrap();
        assert!(drive.files("app").is_empty());
        assert_eq!(
            store.read_record_file("0.json").await.unwrap_err().status(),
            Some(404)
        );
    }

    #[tokio::test]
    async fn test_listing_skips_folders_and_follows_pages() {
        let drive = MemoryDrive::new().with_page_size(2);
        for i in 0..5 {
            drive.insert_file("app", &format!("{}.json", i), format!(r#"{{"name":"k{}","value":{}}}"#, i, i));
        }

        let records = store(&drive).load_all().await.unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(records["k3"], json!(3));
    }

    #[tokio::test]
    async fn test_malformed_file_fails_load() {
        let drive = MemoryDrive::new();
        drive.insert_file("app", "0.json", r#"{"name":"ok","value":1}"#);
        drive.insert_file("app", "1.json", "not json");

        let err = store(&drive).load_all().await.unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[tokio::test]
    async fn test_write_all_uses_fresh_names() {
        let drive = MemoryDrive::new();
        let store = store(&drive);
        let records: Records = [("a".to_string(), json!(1)), ("b".to_string(), json!(2))]
            .into_iter()
            .collect();

        let first: Vec<String> = store
            .write_all(&records)
            .await
            .unwrap()
            .into_iter()
            .map(|ack| ack.file_name)
            .collect();
        let second: Vec<String> = store
            .write_all(&records)
            .await
            .unwrap()
            .into_iter()
            .map(|ack| ack.file_name)
            .collect();

        assert_eq!(drive.files("app").len(), 4);
        assert!(first.iter().all(|name| !second.contains(name)));
        assert!(first.iter().all(|name| name.ends_with(".json")));
    }

    #[tokio::test]
    async fn test_delete_first_aborts_on_delete_failure() {
        let drive = MemoryDrive::new();
        drive.insert_file("app", "old.json", r#"{"name":"old","value":0}"#);
        drive.fail_when(Method::Delete, |_, _| true, 423, "Locked");
        let records: Records = [("new".to_string(), json!(1))].into_iter().collect();

        let err = store(&drive)
            .replace_all(&records, SaveStrategy::DeleteFirst)
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(423));
        assert_eq!(drive.request_count(Method::Put), 0);
        assert_eq!(drive.files("app").len(), 1);
    }

    #[tokio::test]
    async fn test_write_first_keeps_old_files_on_write_failure() {
        let drive = MemoryDrive::new();
        drive.insert_file("app", "old.json", r#"{"name":"old","value":0}"#);
        drive.fail_when(Method::Put, |_, _| true, 503, "Service Unavailable");
        let records: Records = [("new".to_string(), json!(1))].into_iter().collect();

        let err = store(&drive)
            .replace_all(&records, SaveStrategy::WriteFirst)
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(503));
        assert_eq!(drive.request_count(Method::Delete), 0);
        assert!(drive.files("app").contains_key("old.json"));
    }

    #[tokio::test]
    async fn test_write_first_replaces_everything() {
        let drive = MemoryDrive::new();
        drive.insert_file("app", "old.json", r#"{"name":"old","value":0}"#);
        let store = store(&drive);
        let records: Records = [("new".to_string(), json!(1))].into_iter().collect();

        store
            .replace_all(&records, SaveStrategy::WriteFirst)
            .await
            .unwrap();

        let files = drive.files("app");
        assert_eq!(files.len(), 1);
        assert!(!files.contains_key("old.json"));
        assert_eq!(store.load_all().await.unwrap(), records);
    }

    #[tokio::test]
    async fn test_concurrency_limit_still_completes() {
        let drive = MemoryDrive::new();
        drive.delay_when(Method::Put, |_, _| true, Duration::from_millis(5));
        let store = RecordStore::from_config(
            Arc::new(drive.clone()),
            "token",
            &StoreConfig::new(
                drivekv_common::AppId::new("client").unwrap(),
                FolderName::new("app").unwrap(),
            )
            .with_max_concurrency(2)
            .with_file_extension(".rec"),
        );
        let records: Records = (0..7).map(|i| (format!("k{}", i), json!(i))).collect();

        let acks = store.write_all(&records).await.unwrap();

        assert_eq!(acks.len(), 7);
        assert!(drive.files("app").keys().all(|name| name.ends_with(".rec")));
    }
}
