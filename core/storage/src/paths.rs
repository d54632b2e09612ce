//! Remote path conventions for the OneDrive app folder.
//!
//! All paths are relative to [`GRAPH_BASE`]. The record folder lives
//! directly under the drive's special `approot` folder; files are addressed
//! with the `:/{path}:` item-path syntax.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use drivekv_common::{Error, FolderName, Result};

/// Microsoft Graph API base URL, with trailing slash.
pub const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0/";

/// Request annotation selecting what happens when an item name is taken.
pub const CONFLICT_BEHAVIOR: &str = "@microsoft.graph.conflictBehavior";

/// Special folder scoped to the registered application.
const APP_ROOT: &str = "me/drive/special/approot";

/// Everything except RFC 3986 unreserved characters is escaped.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

fn encode(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}

/// Children collection of the app root, used to provision the folder.
pub fn app_root_children() -> String {
    format!("{APP_ROOT}/children")
}

/// Children collection of the record folder.
pub fn folder_children(folder: &FolderName) -> String {
    format!("{APP_ROOT}:/{}:/children", encode(folder.as_str()))
}

/// Content of a single file inside the record folder.
pub fn file_content(folder: &FolderName, file_name: &str) -> String {
    format!(
        "{APP_ROOT}:/{}/{}:/content",
        encode(folder.as_str()),
        encode(file_name)
    )
}

/// Item address of a single file, used for deletion.
pub fn file_item(folder: &FolderName, file_name: &str) -> String {
    format!(
        "{APP_ROOT}:/{}/{}:/",
        encode(folder.as_str()),
        encode(file_name)
    )
}

/// Turn an absolute `@odata.nextLink` back into a base-relative path.
///
/// # Errors
/// - The link points outside the Graph API
pub fn relative_link(link: &str) -> Result<String> {
    link.strip_prefix(GRAPH_BASE)
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidInput(format!("Refusing to follow foreign link: {}", link)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder() -> FolderName {
        FolderName::new("notes").unwrap()
    }

    #[test]
    fn test_plain_paths_are_unchanged() {
        assert_eq!(app_root_children(), "me/drive/special/approot/children");
        assert_eq!(
            folder_children(&folder()),
            "me/drive/special/approot:/notes:/children"
        );
        assert_eq!(
            file_content(&folder(), "0.json"),
            "me/drive/special/approot:/notes/0.json:/content"
        );
        assert_eq!(
            file_item(&folder(), "0.json"),
            "me/drive/special/approot:/notes/0.json:/"
        );
    }

    #[test]
    fn test_segments_are_escaped() {
        let folder = FolderName::new("My Notes#1").unwrap();
        assert_eq!(
            folder_children(&folder),
            "me/drive/special/approot:/My%20Notes%231:/children"
        );
    }

    #[test]
    fn test_relative_link() {
        let link = "https://graph.microsoft.com/v1.0/me/drive/items/X/children?$skiptoken=2";
        assert_eq!(
            relative_link(link).unwrap(),
            "me/drive/items/X/children?$skiptoken=2"
        );
        assert!(relative_link("https://evil.example/v1.0/me").is_err());
    }
}
