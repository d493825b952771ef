//! Raw ingest listener
//!
//! Receive-only protocol: every connection becomes one new file under the
//! directory root, named by the server. No framing, no acknowledgement.

pub mod session;

use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;

use crate::auth::{Credential, Operation, SharedPolicy};
use crate::error::{AuthError, ShareError};
use crate::server::ConnectionHandler;

pub use session::{IngestSession, IngestState};

pub const CHUNK_SIZE: usize = 1024;
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct IngestHandler {
    policy: SharedPolicy,
    idle_timeout: Duration,
}

impl IngestHandler {
    pub fn new(policy: SharedPolicy) -> Self {
        Self {
            policy,
            idle_timeout: IDLE_TIMEOUT,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}

#[async_trait]
impl ConnectionHandler for IngestHandler {
    async fn handle(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), ShareError> {
        let identity = self.policy.authenticate(&Credential::None { user: "" })?;
        if !self.policy.authorize(&identity, Operation::Write) {
            return Err(AuthError::Rejected(identity.name().to_string()).into());
        }

        let root = self.policy.resolve_home(&identity);
        let mut session = IngestSession::accept(root, peer, self.idle_timeout);
        session.receive(stream).await?;
        Ok(())
    }
}
