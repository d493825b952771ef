//! SFTP over SSH
//!
//! `russh` runs the SSH transport on connections accepted by our own
//! [`ProtocolListener`](crate::server::ProtocolListener); the `sftp`
//! subsystem is served by `russh-sftp` against [`SftpFilesystem`], which
//! resolves every path through the directory root.

use async_trait::async_trait;
use log::{debug, info};
use russh::server::{Auth, Msg, Session};
use russh::{Channel, ChannelId};
use russh_sftp::protocol::{
    Attrs, Data, File, FileAttributes, Handle, Name, OpenFlags, Status, StatusCode, Version,
};
use std::collections::HashMap;
use std::io::{self, ErrorKind, SeekFrom};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::auth::{Credential, Identity, Operation, SharedPolicy};
use crate::engines::keys::load_or_generate_host_key;
use crate::error::{ConfinementError, ShareError};
use crate::server::ConnectionHandler;
use crate::storage::DirectoryRoot;

const TARGET: &str = "rax_share::engines::sftp";

/// Largest chunk returned by a single READ.
const MAX_READ_LEN: u32 = 256 * 1024;

const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(3600);

/// Per-listener SSH state: host key and identity policy.
pub struct SftpHandler {
    config: Arc<russh::server::Config>,
    policy: SharedPolicy,
}

impl SftpHandler {
    pub fn new(policy: SharedPolicy, key_path: Option<&Path>) -> Self {
        let config = russh::server::Config {
            keys: vec![load_or_generate_host_key(key_path)],
            auth_rejection_time: Duration::from_secs(0),
            auth_rejection_time_initial: Some(Duration::from_secs(0)),
            inactivity_timeout: Some(INACTIVITY_TIMEOUT),
            ..Default::default()
        };

        Self {
            config: Arc::new(config),
            policy,
        }
    }
}

#[async_trait]
impl ConnectionHandler for SftpHandler {
    async fn handle(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), ShareError> {
        let session = SshSession::new(Arc::clone(&self.policy), peer);
        let running = russh::server::run_stream(Arc::clone(&self.config), stream, session)
            .await
            .map_err(|e| ShareError::ProtocolError(format!("SSH handshake: {}", e)))?;

        running
            .await
            .map_err(|e| ShareError::ProtocolError(format!("SSH session: {}", e)))?;
        debug!(target: TARGET, "SSH session with {} closed", peer);
        Ok(())
    }
}

/// One SSH connection.
pub struct SshSession {
    policy: SharedPolicy,
    peer: SocketAddr,
    identity: Option<Identity>,
    channels: HashMap<ChannelId, Channel<Msg>>,
}

impl SshSession {
    fn new(policy: SharedPolicy, peer: SocketAddr) -> Self {
        Self {
            policy,
            peer,
            identity: None,
            channels: HashMap::new(),
        }
    }

    fn admit(&mut self, credential: Credential<'_>) -> Auth {
        match self.policy.authenticate(&credential) {
            Ok(identity) => {
                debug!(
                    target: TARGET,
                    "{} logged in as {:?} ({})",
                    self.peer,
                    credential.user(),
                    identity.name()
                );
                self.identity = Some(identity);
                Auth::Accept
            }
            Err(e) => {
                debug!(target: TARGET, "{} refused: {}", self.peer, e);
                Auth::Reject {
                    proceed_with_methods: None,
                }
            }
        }
    }
}

#[async_trait]
impl russh::server::Handler for SshSession {
    type Error = russh::Error;

    async fn auth_none(&mut self, user: &str) -> Result<Auth, Self::Error> {
        Ok(self.admit(Credential::None { user }))
    }

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        Ok(self.admit(Credential::Password { user, password }))
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        _public_key: &russh_keys::key::PublicKey,
    ) -> Result<Auth, Self::Error> {
        Ok(self.admit(Credential::PublicKey { user }))
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.channels.insert(channel.id(), channel);
        Ok(true)
    }

    async fn subsystem_request(
        &mut self,
        channel_id: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let channel = self.channels.remove(&channel_id);
        match (name, channel, self.identity.clone()) {
            ("sftp", Some(channel), Some(identity)) => {
                let _ = session.channel_success(channel_id);
                info!(target: TARGET, "SFTP subsystem started for {}", self.peer);
                let filesystem = SftpFilesystem::new(Arc::clone(&self.policy), identity);
                russh_sftp::server::run(channel.into_stream(), filesystem).await;
            }
            (other, _, _) => {
                debug!(target: TARGET, "Refusing subsystem {:?} from {}", other, self.peer);
                let _ = session.channel_failure(channel_id);
            }
        }
        Ok(())
    }
}

enum OpenHandle {
    File(fs::File),
    Dir { path: PathBuf, listed: bool },
}

/// SFTP filesystem operations, confined to the identity's home.
pub struct SftpFilesystem {
    policy: SharedPolicy,
    identity: Identity,
    handles: HashMap<String, OpenHandle>,
    next_handle: u64,
}

impl SftpFilesystem {
    pub fn new(policy: SharedPolicy, identity: Identity) -> Self {
        Self {
            policy,
            identity,
            handles: HashMap::new(),
            next_handle: 0,
        }
    }

    fn root(&self) -> &DirectoryRoot {
        self.policy.resolve_home(&self.identity)
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StatusCode> {
        self.root().resolve_confined(path).map_err(confinement_status)
    }

    fn allow(&self, operation: Operation) -> Result<(), StatusCode> {
        if self.policy.authorize(&self.identity, operation) {
            Ok(())
        } else {
            Err(StatusCode::PermissionDenied)
        }
    }

    fn insert(&mut self, handle: OpenHandle) -> String {
        self.next_handle += 1;
        let key = self.next_handle.to_string();
        self.handles.insert(key.clone(), handle);
        key
    }

    fn file(&mut self, handle: &str) -> Result<&mut fs::File, StatusCode> {
        match self.handles.get_mut(handle) {
            Some(OpenHandle::File(file)) => Ok(file),
            _ => Err(StatusCode::Failure),
        }
    }
}

fn ok_status(id: u32) -> Status {
    Status {
        id,
        status_code: StatusCode::Ok,
        error_message: "Ok".to_string(),
        language_tag: "en-US".to_string(),
    }
}

fn io_status(error: io::Error) -> StatusCode {
    match error.kind() {
        ErrorKind::NotFound => StatusCode::NoSuchFile,
        ErrorKind::PermissionDenied => StatusCode::PermissionDenied,
        _ => StatusCode::Failure,
    }
}

fn confinement_status(error: ConfinementError) -> StatusCode {
    match error {
        ConfinementError::Escape(_) => StatusCode::PermissionDenied,
        ConfinementError::IoError(e) => io_status(e),
        _ => StatusCode::NoSuchFile,
    }
}

#[async_trait]
impl russh_sftp::server::Handler for SftpFilesystem {
    type Error = StatusCode;

    fn unimplemented(&self) -> Self::Error {
        StatusCode::OpUnsupported
    }

    async fn init(
        &mut self,
        version: u32,
        _extensions: HashMap<String, String>,
    ) -> Result<Version, Self::Error> {
        debug!(target: TARGET, "SFTP client version {}", version);
        Ok(Version::new())
    }

    async fn open(
        &mut self,
        id: u32,
        filename: String,
        pflags: OpenFlags,
        _attrs: FileAttributes,
    ) -> Result<Handle, Self::Error> {
        let path = self.resolve(&filename)?;
        let writing = pflags.intersects(
            OpenFlags::WRITE | OpenFlags::APPEND | OpenFlags::CREATE | OpenFlags::TRUNCATE,
        );
        self.allow(if writing {
            Operation::Write
        } else {
            Operation::Read
        })?;

        let create = pflags.contains(OpenFlags::CREATE);
        let file = fs::OpenOptions::new()
            .read(pflags.contains(OpenFlags::READ) || !writing)
            .write(pflags.contains(OpenFlags::WRITE))
            .append(pflags.contains(OpenFlags::APPEND))
            .create(create)
            .create_new(create && pflags.contains(OpenFlags::EXCLUDE))
            .truncate(pflags.contains(OpenFlags::TRUNCATE))
            .open(&path)
            .await
            .map_err(io_status)?;

        Ok(Handle {
            id,
            handle: self.insert(OpenHandle::File(file)),
        })
    }

    async fn close(&mut self, id: u32, handle: String) -> Result<Status, Self::Error> {
        match self.handles.remove(&handle) {
            Some(OpenHandle::File(mut file)) => {
                file.flush().await.map_err(io_status)?;
                Ok(ok_status(id))
            }
            Some(OpenHandle::Dir { .. }) => Ok(ok_status(id)),
            None => Err(StatusCode::Failure),
        }
    }

    async fn read(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        len: u32,
    ) -> Result<Data, Self::Error> {
        let file = self.file(&handle)?;
        file.seek(SeekFrom::Start(offset)).await.map_err(io_status)?;

        let mut data = vec![0u8; len.min(MAX_READ_LEN) as usize];
        let n = file.read(&mut data).await.map_err(io_status)?;
        if n == 0 && !data.is_empty() {
            return Err(StatusCode::Eof);
        }
        data.truncate(n);
        Ok(Data { id, data })
    }

    async fn write(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<Status, Self::Error> {
        let file = self.file(&handle)?;
        file.seek(SeekFrom::Start(offset)).await.map_err(io_status)?;
        file.write_all(&data).await.map_err(io_status)?;
        Ok(ok_status(id))
    }

    async fn stat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        let path = self.resolve(&path)?;
        let metadata = fs::metadata(&path).await.map_err(io_status)?;
        Ok(Attrs {
            id,
            attrs: FileAttributes::from(&metadata),
        })
    }

    async fn lstat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        let path = self.resolve(&path)?;
        let metadata = fs::symlink_metadata(&path).await.map_err(io_status)?;
        Ok(Attrs {
            id,
            attrs: FileAttributes::from(&metadata),
        })
    }

    async fn fstat(&mut self, id: u32, handle: String) -> Result<Attrs, Self::Error> {
        let metadata = match self.handles.get(&handle) {
            Some(OpenHandle::File(file)) => file.metadata().await,
            Some(OpenHandle::Dir { path, .. }) => fs::metadata(path).await,
            None => return Err(StatusCode::Failure),
        }
        .map_err(io_status)?;

        Ok(Attrs {
            id,
            attrs: FileAttributes::from(&metadata),
        })
    }

    async fn setstat(
        &mut self,
        id: u32,
        path: String,
        _attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        let path = self.resolve(&path)?;
        self.allow(Operation::SetAttributes)?;
        fs::metadata(&path).await.map_err(io_status)?;
        Ok(ok_status(id))
    }

    async fn fsetstat(
        &mut self,
        id: u32,
        handle: String,
        _attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        self.allow(Operation::SetAttributes)?;
        if self.handles.contains_key(&handle) {
            Ok(ok_status(id))
        } else {
            Err(StatusCode::Failure)
        }
    }

    async fn opendir(&mut self, id: u32, path: String) -> Result<Handle, Self::Error> {
        let path = self.resolve(&path)?;
        self.allow(Operation::List)?;
        let metadata = fs::metadata(&path).await.map_err(io_status)?;
        if !metadata.is_dir() {
            return Err(StatusCode::NoSuchFile);
        }

        Ok(Handle {
            id,
            handle: self.insert(OpenHandle::Dir {
                path,
                listed: false,
            }),
        })
    }

    async fn readdir(&mut self, id: u32, handle: String) -> Result<Name, Self::Error> {
        let path = match self.handles.get_mut(&handle) {
            Some(OpenHandle::Dir { listed: true, .. }) => return Err(StatusCode::Eof),
            Some(OpenHandle::Dir { path, listed }) => {
                *listed = true;
                path.clone()
            }
            _ => return Err(StatusCode::Failure),
        };

        let mut files = Vec::new();
        let mut entries = fs::read_dir(&path).await.map_err(io_status)?;
        while let Some(entry) = entries.next_entry().await.map_err(io_status)? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let attrs = match entry.metadata().await {
                Ok(metadata) => FileAttributes::from(&metadata),
                Err(_) => FileAttributes::default(),
            };
            files.push(File::new(name, attrs));
        }

        Ok(Name { id, files })
    }

    async fn remove(&mut self, id: u32, filename: String) -> Result<Status, Self::Error> {
        let path = self.resolve(&filename)?;
        self.allow(Operation::Delete)?;
        fs::remove_file(&path).await.map_err(io_status)?;
        Ok(ok_status(id))
    }

    async fn mkdir(
        &mut self,
        id: u32,
        path: String,
        _attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        let path = self.resolve(&path)?;
        self.allow(Operation::MakeDir)?;
        fs::create_dir(&path).await.map_err(io_status)?;
        Ok(ok_status(id))
    }

    async fn rmdir(&mut self, id: u32, path: String) -> Result<Status, Self::Error> {
        let path = self.resolve(&path)?;
        if path == self.root().path() {
            return Err(StatusCode::PermissionDenied);
        }
        self.allow(Operation::RemoveDir)?;
        fs::remove_dir(&path).await.map_err(io_status)?;
        Ok(ok_status(id))
    }

    async fn realpath(&mut self, id: u32, path: String) -> Result<Name, Self::Error> {
        let resolved = self.resolve(&path)?;
        let virtual_path = self.root().to_virtual(&resolved);
        Ok(Name {
            id,
            files: vec![File::dummy(virtual_path)],
        })
    }

    async fn rename(
        &mut self,
        id: u32,
        oldpath: String,
        newpath: String,
    ) -> Result<Status, Self::Error> {
        let from = self.resolve(&oldpath)?;
        let to = self.resolve(&newpath)?;
        self.allow(Operation::Rename)?;
        fs::rename(&from, &to).await.map_err(io_status)?;
        Ok(ok_status(id))
    }
}
