//! File system storage management
//!
//! Handles the directory root, path confinement and upload storage.

pub mod filesystem;
pub mod operations;
pub mod results;
pub mod root;
pub mod validation;

pub use operations::{prepare_file_storage, store_upload};
pub use results::{IngestResult, UploadTarget};
pub use root::DirectoryRoot;
