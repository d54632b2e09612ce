//! Key-value record store for drivekv.
//!
//! Each record is one small JSON file `{"name": key, "value": payload}` inside
//! a folder under the application's private drive folder. The store always
//! loads the whole folder and always saves by replacing every file.
//!
//! # Layers
//! - [`Database`]: lifecycle (`init`/`load`/`save`) and the in-memory mapping
//! - [`RecordStore`]: token-bound bulk and per-file operations
//! - [`ensure_folder`]: idempotent folder provisioning
//!
//! Remote access goes through [`drivekv_storage::Transport`], so the store runs
//! unchanged against the Graph API or an in-memory drive.

pub mod config;
pub mod database;
pub mod envelope;
mod fanout;
pub mod provisioner;
pub mod records;

pub use config::{SaveStrategy, StoreConfig};
pub use database::{Database, Status};
pub use envelope::Envelope;
pub use provisioner::ensure_folder;
pub use records::{RecordStore, Records, WriteAck};
