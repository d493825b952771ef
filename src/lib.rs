pub mod auth;
pub mod cli;
pub mod config;
pub mod engines;
pub mod error;
pub mod http;
pub mod ingest;
pub mod middleware;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod supervisor;
pub mod utils;

pub use server::{ConnectionHandler, ListenerConfig, ProtocolListener, run_listener};
pub use supervisor::Supervisor;
