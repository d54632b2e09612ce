//! Common types used throughout drivekv.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Characters OneDrive refuses in item names.
const RESERVED_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Application (client) identifier registered with the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AppId(String);

impl AppId {
    /// Create a new AppId from a string.
    ///
    /// # Errors
    /// - Returns error if id is empty or whitespace
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(crate::Error::InvalidInput(
                "AppId cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AppId {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::new(value)
    }
}

impl From<AppId> for String {
    fn from(value: AppId) -> Self {
        value.0
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of the folder inside the drive's app root that holds the records.
///
/// The name is a single path segment: it cannot be empty, cannot contain
/// separators or characters OneDrive reserves, and cannot end in a dot
/// or a space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FolderName(String);

impl FolderName {
    /// Create a validated folder name.
    ///
    /// # Errors
    /// - Returns error if the name is not a valid single drive item name
    pub fn new(name: impl Into<String>) -> crate::Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(crate::Error::InvalidInput(
                "Folder name cannot be empty".to_string(),
            ));
        }
        if let Some(c) = name.chars().find(|c| RESERVED_CHARS.contains(c)) {
            return Err(crate::Error::InvalidInput(format!(
                "Folder name cannot contain '{}'",
                c
            )));
        }
        if name.ends_with('.') || name.ends_with(' ') {
            return Err(crate::Error::InvalidInput(
                "Folder name cannot end with '.' or ' '".to_string(),
            ));
        }
        Ok(Self(name))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FolderName {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::new(value)
    }
}

impl From<FolderName> for String {
    fn from(value: FolderName) -> Self {
        value.0
    }
}

impl fmt::Display for FolderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_app_id_creation() {
        let id = AppId::new("00000000-aaaa-bbbb").unwrap();
        assert_eq!(id.as_str(), "00000000-aaaa-bbbb");
    }

    #[test]
    fn test_app_id_empty_fails() {
        assert!(AppId::new("").is_err());
        assert!(AppId::new("   ").is_err());
    }

    #[test]
    fn test_app_id_serde() {
        let id: AppId = serde_json::from_str("\"client\"").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"client\"");
        assert!(serde_json::from_str::<AppId>("\"\"").is_err());
        assert!(serde_json::from_str::<AppId>("\"  \"").is_err());
    }

    #[test]
    fn test_folder_name_rejects_separators() {
        assert!(FolderName::new("a/b").is_err());
        assert!(FolderName::new("a\\b").is_err());
        assert!(FolderName::new("a:b").is_err());
    }

    #[test]
    fn test_folder_name_rejects_trailing_dot() {
        assert!(FolderName::new("settings.").is_err());
        assert!(FolderName::new("settings ").is_err());
    }

    #[test]
    fn test_folder_name_serde() {
        let name: FolderName = serde_json::from_str("\"my-app\"").unwrap();
        assert_eq!(name.as_str(), "my-app");
        assert!(serde_json::from_str::<FolderName>("\"bad/name\"").is_err());
    }

    proptest! {
        #[test]
        fn folder_name_accepts_plain_segments(name in "[A-Za-z0-9_-][A-Za-z0-9 ._-]{0,30}[A-Za-z0-9_-]") {
            prop_assert!(FolderName::new(name).is_ok());
        }
    }
}
