//! Ingest session state machine: `Accepted -> Receiving -> Closed`.

use log::{debug, info};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;

use crate::ingest::CHUNK_SIZE;
use crate::storage::{DirectoryRoot, IngestResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    Accepted,
    Receiving,
    Closed,
}

#[derive(Debug)]
pub struct IngestSession {
    peer: SocketAddr,
    path: PathBuf,
    idle_timeout: Duration,
    state: IngestState,
    bytes_received: u64,
}

impl IngestSession {
    /// Picks the destination file; the peer has no say in its name.
    pub fn accept(root: &DirectoryRoot, peer: SocketAddr, idle_timeout: Duration) -> Self {
        Self {
            peer,
            path: root.unique_file(),
            idle_timeout,
            state: IngestState::Accepted,
            bytes_received: 0,
        }
    }

    pub fn state(&self) -> IngestState {
        self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends everything the peer sends to the session file until the peer
    /// closes or stays silent for the idle timeout.
    pub async fn receive<R>(&mut self, mut stream: R) -> std::io::Result<IngestResult>
    where
        R: AsyncRead + Unpin,
    {
        let mut file = File::create(&self.path).await?;
        self.state = IngestState::Receiving;
        debug!(
            "Receiving from {} into {}",
            self.peer,
            self.path.display()
        );

        let mut buffer = [0u8; CHUNK_SIZE];
        let outcome = loop {
            let n = match timeout(self.idle_timeout, stream.read(&mut buffer)).await {
                Err(_) => {
                    debug!("{} idle for {:?}, closing", self.peer, self.idle_timeout);
                    break Ok(());
                }
                Ok(Ok(0)) => break Ok(()),
                Ok(Ok(n)) => n,
                Ok(Err(e)) => break Err(e),
            };

            if let Err(e) = file.write_all(&buffer[..n]).await {
                break Err(e);
            }
            self.bytes_received += n as u64;
        };

        file.flush().await?;
        self.state = IngestState::Closed;
        outcome?;

        info!(
            "Ingested {} bytes from {} into {}",
            self.bytes_received,
            self.peer,
            self.path.display()
        );

        Ok(IngestResult {
            path: self.path.clone(),
            bytes_received: self.bytes_received,
        })
    }
}
