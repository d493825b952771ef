//! Server middleware
//!
//! Cross-protocol logging.

pub mod logging;
