//! Supported file-transfer protocols
//!
//! Every listener the supervisor starts serves exactly one of these.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Ftp,
    Smb,
    Sftp,
    /// Raw TCP ingest: bytes in, file out.
    Ingest,
}

impl Protocol {
    pub const ALL: [Protocol; 5] = [
        Protocol::Ftp,
        Protocol::Http,
        Protocol::Smb,
        Protocol::Sftp,
        Protocol::Ingest,
    ];

    /// Display name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Http => "HTTP",
            Protocol::Ftp => "FTP",
            Protocol::Smb => "SMB",
            Protocol::Sftp => "SFTP",
            Protocol::Ingest => "INGEST",
        }
    }

    /// Lowercase form accepted on the command line and in config files.
    pub fn as_arg(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Ftp => "ftp",
            Protocol::Smb => "smb",
            Protocol::Sftp => "sftp",
            Protocol::Ingest => "ingest",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Http => 8000,
            Protocol::Ftp => 2121,
            Protocol::Smb => 4455,
            Protocol::Sftp => 2222,
            Protocol::Ingest => 9001,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "ftp" => Ok(Protocol::Ftp),
            "smb" => Ok(Protocol::Smb),
            "sftp" => Ok(Protocol::Sftp),
            "ingest" | "nc" | "raw" => Ok(Protocol::Ingest),
            other => Err(format!("unknown protocol: {}", other)),
        }
    }
}
