//! Protocol engines the share delegates to
//!
//! FTP and SFTP state machines come from their crates, SMB from an external
//! server process. Each binding adapts the shared identity policy and
//! directory root to the engine's own interfaces.

pub mod ftp;
pub mod keys;
pub mod sftp;
pub mod smb;
