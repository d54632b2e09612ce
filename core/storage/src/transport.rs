//! Transport trait definition.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use drivekv_common::{Error, Result};

/// A drive item as returned in a children listing.
///
/// Only the fields the record store needs are kept; unknown fields are
/// ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveItem {
    /// Drive item ID.
    #[serde(default)]
    pub id: String,
    /// Item name within its parent folder.
    pub name: String,
    /// Size in bytes.
    #[serde(default)]
    pub size: Option<u64>,
    /// Present when the item is a folder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<Value>,
}

impl DriveItem {
    /// Check if this is a folder.
    pub fn is_folder(&self) -> bool {
        self.folder.is_some()
    }
}

/// One page of a children listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ChildrenPage {
    /// Items on this page.
    #[serde(default)]
    pub value: Vec<DriveItem>,
    /// Absolute URL of the next page, if the listing continues.
    #[serde(rename = "@odata.nextLink", default)]
    pub next_link: Option<String>,
}

impl ChildrenPage {
    /// Decode a listing response.
    ///
    /// # Errors
    /// - Response is not a children collection
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| Error::Parse(format!("Invalid children listing: {}", e)))
    }
}

/// Authenticated request layer against the drive API.
///
/// `path` is relative to the API base (for example
/// `me/drive/special/approot/children`). Every call carries
/// `Authorization: Bearer <token>`. Any status outside `200..300` is
/// returned as [`Error::Transport`], except `401` which becomes
/// [`Error::Unauthorized`]. Empty success bodies decode to `Value::Null`.
///
/// Implementations must not retry.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Get the transport name (e.g., "graph", "memory").
    fn name(&self) -> &str;

    /// GET `path` and parse the body as JSON.
    async fn get(&self, token: &str, path: &str) -> Result<Value>;

    /// POST a JSON body (`Content-Type: application/json`).
    async fn post(&self, token: &str, path: &str, body: &Value) -> Result<Value>;

    /// PUT a raw body (`Content-Type: text/plain`).
    async fn put(&self, token: &str, path: &str, body: String) -> Result<Value>;

    /// DELETE `path`.
    async fn delete(&self, token: &str, path: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_children_page_parsing() {
        let page = ChildrenPage::from_value(json!({
            "value": [
                {"id": "A1", "name": "0.json", "size": 31, "file": {"mimeType": "application/json"}},
                {"id": "B2", "name": "nested", "folder": {"childCount": 0}}
            ],
            "@odata.nextLink": "https://graph.microsoft.com/v1.0/next"
        }))
        .unwrap();

        assert_eq!(page.value.len(), 2);
        assert!(!page.value[0].is_folder());
        assert!(page.value[1].is_folder());
        assert_eq!(page.next_link.as_deref(), Some("https://graph.microsoft.com/v1.0/next"));
    }

    #[test]
    fn test_children_page_rejects_garbage() {
        assert!(matches!(
            ChildrenPage::from_value(json!({"value": 3})),
            Err(Error::Parse(_))
        ));
    }
}
