//! Listener configuration
//!
//! The immutable settings one protocol listener is constructed with.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::ingest::IDLE_TIMEOUT;
use crate::protocol::Protocol;

pub const DEFAULT_SHARE_NAME: &str = "rax";
pub const DEFAULT_SMB_COMMAND: &str = "impacket-smbserver";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    pub protocol: Protocol,
    pub address: IpAddr,
    pub port: u16,
    pub directory: PathBuf,
    /// SFTP host key. Missing or unreadable means an ephemeral key.
    pub key_path: Option<PathBuf>,
    pub share_name: String,
    pub smb_command: String,
    pub idle_timeout: Duration,
}

impl ListenerConfig {
    pub fn new(protocol: Protocol, address: IpAddr, port: u16, directory: PathBuf) -> Self {
        Self {
            protocol,
            address,
            port,
            directory,
            key_path: None,
            share_name: DEFAULT_SHARE_NAME.to_string(),
            smb_command: DEFAULT_SMB_COMMAND.to_string(),
            idle_timeout: IDLE_TIMEOUT,
        }
    }

    /// Loopback listener on an ephemeral port, for tests and probes.
    pub fn local(protocol: Protocol, directory: PathBuf) -> Self {
        Self::new(protocol, IpAddr::V4(Ipv4Addr::LOCALHOST), 0, directory)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}
