//! Folder provisioning under the app root.

use serde_json::json;
use tracing::debug;

use drivekv_common::{Error, FolderName, Result};
use drivekv_storage::{paths, Transport};

/// Make sure the record folder exists under the app root.
///
/// The request asks the drive to fail on a name clash rather than rename, so
/// creating a folder that already exists answers `409 Conflict` and the call
/// returns `Ok`. Repeated calls leave exactly one folder behind.
///
/// # Errors
/// - Any other transport failure (network, auth rejection, quota)
pub async fn ensure_folder(
    transport: &dyn Transport,
    token: &str,
    folder: &FolderName,
) -> Result<()> {
    let body = json!({
        "name": folder.as_str(),
        "folder": {},
        paths::CONFLICT_BEHAVIOR: "fail",
    });

    match transport.post(token, &paths::app_root_children(), &body).await {
        Ok(_) => {
            debug!("Created app folder '{}'", folder);
            Ok(())
        }
        Err(Error::Transport { status: 409, .. }) => {
            debug!("App folder '{}' already exists", folder);
            Ok(())
        }
        Err(err) => Err(err),
    }
}
