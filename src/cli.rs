//! Command-line interface

use clap::{ArgAction, Args, Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::ServiceConfig;
use crate::protocol::Protocol;
use crate::server::ListenerConfig;
use crate::server::config::{DEFAULT_SHARE_NAME, DEFAULT_SMB_COMMAND};

#[derive(Debug, Parser)]
#[command(
    name = "rax-share",
    version,
    about = "Serve one directory over HTTP, FTP, SMB, SFTP and raw TCP at once",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub run: RunArgs,

    /// Raise log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a single protocol listener in this process
    #[command(hide = true)]
    Listener(ListenerArgs),
}

#[derive(Debug, Default, Args)]
pub struct RunArgs {
    /// Directory to serve files from [default: .]
    #[arg(short = 'd', long = "dir")]
    pub dir: Option<PathBuf>,

    /// IP address to serve from [default: 0.0.0.0]
    #[arg(short = 'l', long = "lhost")]
    pub address: Option<IpAddr>,

    /// Private key used for SFTP
    #[arg(short = 'k', long = "key")]
    pub key: Option<PathBuf>,

    /// Port used for HTTP
    #[arg(long = "http", value_name = "HTTP_PORT")]
    pub http: Option<u16>,

    /// Port used for FTP
    #[arg(long = "ftp", value_name = "FTP_PORT")]
    pub ftp: Option<u16>,

    /// Port used for SMB
    #[arg(long = "smb", value_name = "SMB_PORT")]
    pub smb: Option<u16>,

    /// Port used for SFTP
    #[arg(long = "sftp", value_name = "SFTP_PORT")]
    pub sftp: Option<u16>,

    /// Port used for raw TCP ingest
    #[arg(long = "ingest", value_name = "INGEST_PORT")]
    pub ingest: Option<u16>,

    /// Start only these protocols
    #[arg(long = "only", value_delimiter = ',', value_name = "PROTOCOL")]
    pub only: Vec<Protocol>,

    /// Stop every listener as soon as one fails
    #[arg(long = "fail-fast")]
    pub fail_fast: bool,

    /// Configuration file [default: ./rax-share.toml if present]
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
}

impl RunArgs {
    /// Applies flags given on the command line over `config`.
    pub fn apply(&self, config: &mut ServiceConfig) {
        if let Some(dir) = &self.dir {
            config.directory = dir.clone();
        }
        if let Some(address) = self.address {
            config.address = address.to_string();
        }
        if let Some(key) = &self.key {
            config.key_path = Some(key.clone());
        }

        let ports = [
            (Protocol::Http, self.http),
            (Protocol::Ftp, self.ftp),
            (Protocol::Smb, self.smb),
            (Protocol::Sftp, self.sftp),
            (Protocol::Ingest, self.ingest),
        ];
        for (protocol, port) in ports {
            if let Some(port) = port {
                config.ports.set_port(protocol, port);
            }
        }

        if !self.only.is_empty() {
            config.enabled = self.only.clone();
        }
        if self.fail_fast {
            config.fail_fast = true;
        }
    }
}

#[derive(Debug, Args)]
pub struct ListenerArgs {
    #[arg(long)]
    pub protocol: Protocol,

    #[arg(long)]
    pub address: IpAddr,

    #[arg(long)]
    pub port: u16,

    #[arg(long = "dir")]
    pub dir: PathBuf,

    #[arg(long = "key")]
    pub key: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_SHARE_NAME)]
    pub share_name: String,

    #[arg(long, default_value = DEFAULT_SMB_COMMAND)]
    pub smb_command: String,

    #[arg(long, default_value_t = 5)]
    pub idle_timeout_secs: u64,

    /// Started by the supervisor: stop on stdin EOF, ignore interrupts
    #[arg(long)]
    pub supervised: bool,
}

impl ListenerArgs {
    pub fn to_config(&self) -> ListenerConfig {
        ListenerConfig {
            protocol: self.protocol,
            address: self.address,
            port: self.port,
            directory: self.dir.clone(),
            key_path: self.key.clone(),
            share_name: self.share_name.clone(),
            smb_command: self.smb_command.clone(),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
        }
    }
}
