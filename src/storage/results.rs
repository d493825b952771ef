//! Storage result types
//!
//! Defines result structures returned by storage operations.

use std::path::PathBuf;

/// A validated upload destination.
///
/// The parent of `path` exists and lies under the directory root, and
/// `path` itself is not a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub virtual_path: String,
    pub path: PathBuf,
    pub length: u64,
}

/// Summary of a completed raw-ingest session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestResult {
    pub path: PathBuf,
    pub bytes_received: u64,
}
