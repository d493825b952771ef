//! Logging middleware
//!
//! Log lines whose format does not depend on the protocol engine that
//! produced them.

use log::{debug, error, info};
use std::net::SocketAddr;

use crate::protocol::Protocol;

pub const ACCESS_TARGET: &str = "rax_share::http::access";

/// Log an HTTP request: peer address, request line, status code.
pub fn log_request(peer: &SocketAddr, request_line: &str, status: u16) {
    info!(target: ACCESS_TARGET, "{} \"{}\" {}", peer.ip(), request_line, status);
}

/// Log a client connection
pub fn log_connection(protocol: Protocol, peer: &SocketAddr) {
    debug!("{} connection from {}", protocol, peer);
}

pub fn log_listener_started(protocol: Protocol, addr: &SocketAddr) {
    info!("Started {} listener on {}", protocol, addr);
}

pub fn log_listener_failure(protocol: Protocol, addr: &SocketAddr, kind: &str, detail: &str) {
    error!("{} listener on {} failed ({}): {}", protocol, addr, kind, detail);
}
