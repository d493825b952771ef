//! Error types
//!
//! Defines domain-specific error types for each layer of the share server.

use std::fmt;
use std::io;
use std::net::SocketAddr;

use crate::protocol::Protocol;

/// Errors raised while resolving client paths against the served directory.
#[derive(Debug)]
pub enum ConfinementError {
    /// The path would leave the directory root.
    Escape(String),
    InvalidPath(String),
    NotADirectory(String),
    ReadOnly(String),
    IoError(io::Error),
}

impl fmt::Display for ConfinementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfinementError::Escape(p) => write!(f, "Path escapes directory root: {}", p),
            ConfinementError::InvalidPath(p) => write!(f, "Invalid path: {}", p),
            ConfinementError::NotADirectory(p) => write!(f, "Not a directory: {}", p),
            ConfinementError::ReadOnly(p) => write!(f, "Directory is not writable: {}", p),
            ConfinementError::IoError(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for ConfinementError {}

impl From<io::Error> for ConfinementError {
    fn from(error: io::Error) -> Self {
        ConfinementError::IoError(error)
    }
}

/// Errors raised while accepting an HTTP upload.
#[derive(Debug)]
pub enum UploadError {
    TargetIsDirectory(String),
    ParentMissing(String),
    LengthRequired,
    BadLength(String),
    /// The peer closed before the declared number of bytes arrived.
    Truncated { expected: u64, received: u64 },
    TimedOut,
    Confinement(ConfinementError),
    IoError(io::Error),
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadError::TargetIsDirectory(p) => write!(f, "Upload target is a directory: {}", p),
            UploadError::ParentMissing(p) => write!(f, "Parent directory does not exist: {}", p),
            UploadError::LengthRequired => write!(f, "Content-Length header required"),
            UploadError::BadLength(v) => write!(f, "Invalid Content-Length: {}", v),
            UploadError::Truncated { expected, received } => {
                write!(f, "Body ended after {} of {} bytes", received, expected)
            }
            UploadError::TimedOut => write!(f, "Timed out waiting for request body"),
            UploadError::Confinement(e) => write!(f, "{}", e),
            UploadError::IoError(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for UploadError {}

impl From<io::Error> for UploadError {
    fn from(error: io::Error) -> Self {
        UploadError::IoError(error)
    }
}

impl From<ConfinementError> for UploadError {
    fn from(error: ConfinementError) -> Self {
        UploadError::Confinement(error)
    }
}

/// Errors raised while reading an HTTP request head.
#[derive(Debug)]
pub enum RequestError {
    LineTooLong,
    TooManyHeaders,
    BadRequestLine(String),
    BadHeader(String),
    BadEncoding(String),
    IoError(io::Error),
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::LineTooLong => write!(f, "Request line or header too long"),
            RequestError::TooManyHeaders => write!(f, "Too many headers"),
            RequestError::BadRequestLine(l) => write!(f, "Malformed request line: {}", l),
            RequestError::BadHeader(h) => write!(f, "Malformed header: {}", h),
            RequestError::BadEncoding(p) => write!(f, "Undecodable path: {}", p),
            RequestError::IoError(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for RequestError {}

impl From<io::Error> for RequestError {
    fn from(error: io::Error) -> Self {
        RequestError::IoError(error)
    }
}

/// Authentication errors. The permissive policy never produces one, other
/// policies may.
#[derive(Debug)]
pub enum AuthError {
    Rejected(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::Rejected(u) => write!(f, "Credentials rejected for: {}", u),
        }
    }
}

impl std::error::Error for AuthError {}

/// Errors that end a protocol listener.
#[derive(Debug)]
pub enum ListenerError {
    Bind {
        protocol: Protocol,
        addr: SocketAddr,
        source: io::Error,
    },
    Engine {
        protocol: Protocol,
        message: String,
    },
    Root(ConfinementError),
    IoError(io::Error),
}

impl ListenerError {
    /// Short failure-kind label used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            ListenerError::Bind { .. } => "BindFailure",
            ListenerError::Engine { .. } => "EngineFailure",
            ListenerError::Root(_) => "InvalidRoot",
            ListenerError::IoError(_) => "IoFailure",
        }
    }
}

impl fmt::Display for ListenerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerError::Bind {
                protocol,
                addr,
                source,
            } => write!(f, "{} failed to bind {}: {}", protocol, addr, source),
            ListenerError::Engine { protocol, message } => {
                write!(f, "{} engine failed: {}", protocol, message)
            }
            ListenerError::Root(e) => write!(f, "Directory root rejected: {}", e),
            ListenerError::IoError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {}

impl From<io::Error> for ListenerError {
    fn from(error: io::Error) -> Self {
        ListenerError::IoError(error)
    }
}

impl From<ConfinementError> for ListenerError {
    fn from(error: ConfinementError) -> Self {
        ListenerError::Root(error)
    }
}

/// Supervisor-level errors.
#[derive(Debug)]
pub enum SupervisorError {
    Config(String),
    Spawn(Protocol, io::Error),
    Signal(io::Error),
}

impl fmt::Display for SupervisorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorError::Config(msg) => write!(f, "Configuration error: {}", msg),
            SupervisorError::Spawn(protocol, e) => {
                write!(f, "Failed to start {} listener process: {}", protocol, e)
            }
            SupervisorError::Signal(e) => write!(f, "Failed to install signal handler: {}", e),
        }
    }
}

impl std::error::Error for SupervisorError {}

/// General error that encompasses all error types
#[derive(Debug)]
pub enum ShareError {
    Confinement(ConfinementError),
    Upload(UploadError),
    Request(RequestError),
    Auth(AuthError),
    Listener(ListenerError),
    IoError(io::Error),
    ProtocolError(String),
}

impl fmt::Display for ShareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShareError::Confinement(e) => write!(f, "Confinement error: {}", e),
            ShareError::Upload(e) => write!(f, "Upload error: {}", e),
            ShareError::Request(e) => write!(f, "Request error: {}", e),
            ShareError::Auth(e) => write!(f, "Authentication error: {}", e),
            ShareError::Listener(e) => write!(f, "Listener error: {}", e),
            ShareError::IoError(e) => write!(f, "I/O error: {}", e),
            ShareError::ProtocolError(e) => write!(f, "Protocol error: {}", e),
        }
    }
}

impl std::error::Error for ShareError {}

impl From<ConfinementError> for ShareError {
    fn from(error: ConfinementError) -> Self {
        ShareError::Confinement(error)
    }
}

impl From<UploadError> for ShareError {
    fn from(error: UploadError) -> Self {
        ShareError::Upload(error)
    }
}

impl From<RequestError> for ShareError {
    fn from(error: RequestError) -> Self {
        ShareError::Request(error)
    }
}

impl From<AuthError> for ShareError {
    fn from(error: AuthError) -> Self {
        ShareError::Auth(error)
    }
}

impl From<ListenerError> for ShareError {
    fn from(error: ListenerError) -> Self {
        ShareError::Listener(error)
    }
}

impl From<io::Error> for ShareError {
    fn from(error: io::Error) -> Self {
        ShareError::IoError(error)
    }
}
