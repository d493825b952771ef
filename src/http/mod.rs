//! HTTP listener
//!
//! A static-file responder (GET/HEAD) extended with PUT uploads, written
//! directly against the TCP stream.

pub mod handlers;
pub mod listing;
pub mod parser;
pub mod responses;
pub mod session;

use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;

use crate::auth::{IdentityPolicy, SharedPolicy};
use crate::error::ShareError;
use crate::server::ConnectionHandler;

pub use parser::{Method, Request};
pub use responses::{Response, Status};

/// Per-read timeout while receiving an upload body.
pub const DEFAULT_BODY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct HttpHandler {
    policy: SharedPolicy,
    body_timeout: Duration,
}

impl HttpHandler {
    pub fn new(policy: SharedPolicy) -> Self {
        Self {
            policy,
            body_timeout: DEFAULT_BODY_TIMEOUT,
        }
    }

    pub fn with_body_timeout(mut self, body_timeout: Duration) -> Self {
        self.body_timeout = body_timeout;
        self
    }

    pub fn policy(&self) -> &dyn IdentityPolicy {
        self.policy.as_ref()
    }

    pub fn body_timeout(&self) -> Duration {
        self.body_timeout
    }
}

#[async_trait]
impl ConnectionHandler for HttpHandler {
    async fn handle(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), ShareError> {
        session::handle_connection(stream, peer, self).await
    }
}
