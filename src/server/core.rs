use async_trait::async_trait;
use log::{error, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket, TcpStream};

use crate::error::{ListenerError, ShareError};
use crate::middleware::logging::{log_connection, log_listener_started};
use crate::protocol::Protocol;

/// Pending-connection backlog of every listener.
pub const BACKLOG: u32 = 10;

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Per-protocol session logic. One call per accepted connection; the
/// handler owns the stream until it returns.
#[async_trait]
pub trait ConnectionHandler: Send + Sync + 'static {
    async fn handle(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), ShareError>;
}

/// Binds `addr` with the listener backlog.
pub fn bind(protocol: Protocol, addr: SocketAddr) -> Result<TcpListener, ListenerError> {
    let bind_error = |source: io::Error| ListenerError::Bind {
        protocol,
        addr,
        source,
    };

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(bind_error)?;

    socket.set_reuseaddr(true).map_err(bind_error)?;
    socket.bind(addr).map_err(bind_error)?;
    socket.listen(BACKLOG).map_err(bind_error)
}

/// Checks that `addr` can be bound, for engines that bind their own socket.
pub fn probe_bind(protocol: Protocol, addr: SocketAddr) -> Result<(), ListenerError> {
    std::net::TcpListener::bind(addr)
        .map(drop)
        .map_err(|source| ListenerError::Bind {
            protocol,
            addr,
            source,
        })
}

/// A bound socket plus the handler its connections are dispatched to.
pub struct ProtocolListener<H> {
    protocol: Protocol,
    listener: TcpListener,
    handler: Arc<H>,
}

impl<H: ConnectionHandler> ProtocolListener<H> {
    pub fn bind(protocol: Protocol, addr: SocketAddr, handler: H) -> Result<Self, ListenerError> {
        let listener = bind(protocol, addr)?;
        log_listener_started(protocol, &listener.local_addr()?);

        Ok(Self {
            protocol,
            listener,
            handler: Arc::new(handler),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Every connection runs in its own task; none waits for
    /// another.
    pub async fn serve(self) -> Result<(), ListenerError> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    log_connection(self.protocol, &peer);
                    let handler = Arc::clone(&self.handler);
                    let protocol = self.protocol;

                    tokio::spawn(async move {
                        if let Err(e) = handler.handle(stream, peer).await {
                            warn!("{} session with {} failed: {}", protocol, peer, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting {} connection: {}", self.protocol, e);
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }
    }
}
