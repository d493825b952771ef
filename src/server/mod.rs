//! Listener infrastructure
//!
//! Socket binding, the per-connection accept loop shared by the in-house
//! protocols, and the dispatch from a [`ListenerConfig`] to a running
//! protocol engine.

pub mod config;
pub mod core;
pub mod runner;

pub use config::ListenerConfig;
pub use core::{BACKLOG, ConnectionHandler, ProtocolListener, bind, probe_bind};
pub use runner::run_listener;
