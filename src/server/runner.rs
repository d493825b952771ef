use log::debug;

use crate::auth::PermissiveIdentityPolicy;
use crate::engines::{ftp, sftp::SftpHandler, smb};
use crate::error::ListenerError;
use crate::http::HttpHandler;
use crate::ingest::IngestHandler;
use crate::protocol::Protocol;
use crate::server::{ListenerConfig, ProtocolListener};
use crate::storage::DirectoryRoot;

/// Runs one protocol listener until it fails. Each process runs exactly
/// one of these.
pub async fn run_listener(config: &ListenerConfig) -> Result<(), ListenerError> {
    let root = DirectoryRoot::open(&config.directory)?;
    debug!(
        "{} listener serving {}",
        config.protocol,
        root.path().display()
    );

    let policy = PermissiveIdentityPolicy::shared(root);
    let addr = config.socket_addr();

    match config.protocol {
        Protocol::Http => {
            ProtocolListener::bind(Protocol::Http, addr, HttpHandler::new(policy))?
                .serve()
                .await
        }
        Protocol::Ingest => {
            let handler = IngestHandler::new(policy).with_idle_timeout(config.idle_timeout);
            ProtocolListener::bind(Protocol::Ingest, addr, handler)?
                .serve()
                .await
        }
        Protocol::Sftp => {
            let handler = SftpHandler::new(policy, config.key_path.as_deref());
            ProtocolListener::bind(Protocol::Sftp, addr, handler)?
                .serve()
                .await
        }
        Protocol::Ftp => ftp::serve(addr, policy).await,
        Protocol::Smb => smb::serve(config, policy).await,
    }
}
