//! coldstore-core: types, configuration and errors shared by every coldstore crate

pub mod config;
pub mod error;
pub mod types;

pub use config::ColdstoreConfig;
pub use error::{Attribution, ColdstoreError, ColdstoreResult, ServiceError, ServiceErrorKind};
pub use types::{ArchiveId, JobId, PartSize, UploadId, MIB};
