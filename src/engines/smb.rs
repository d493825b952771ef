//! SMB via an external `smbserver`
//!
//! The listener process owns the server process and takes it down with it.

use log::{debug, warn};
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::auth::{Identity, SharedPolicy};
use crate::error::ListenerError;
use crate::middleware::logging::log_listener_started;
use crate::protocol::Protocol;
use crate::server::{ListenerConfig, probe_bind};

const TARGET: &str = "rax_share::engines::smb";

/// Program and arguments that serve `root` as the configured share.
///
/// `smb_command` may carry leading arguments of its own, e.g.
/// `python3 /opt/impacket/smbserver.py`.
pub fn smb_command_line(config: &ListenerConfig, root: &Path) -> Option<(OsString, Vec<OsString>)> {
    let mut words = config.smb_command.split_whitespace();
    let program = OsString::from(words.next()?);

    let mut args: Vec<OsString> = words.map(OsString::from).collect();
    args.push("-smb2support".into());
    args.push("-ip".into());
    args.push(config.address.to_string().into());
    args.push("-port".into());
    args.push(config.port.to_string().into());
    args.push(config.share_name.clone().into());
    args.push(root.as_os_str().to_os_string());

    Some((program, args))
}

/// Runs the SMB server until it exits. It is expected to run for as long
/// as the listener does, so any exit is an engine failure.
pub async fn serve(config: &ListenerConfig, policy: SharedPolicy) -> Result<(), ListenerError> {
    let addr = config.socket_addr();
    probe_bind(Protocol::Smb, addr)?;

    let engine_error = |message: String| ListenerError::Engine {
        protocol: Protocol::Smb,
        message,
    };

    let root = policy.resolve_home(&Identity::anonymous());
    let (program, args) = smb_command_line(config, root.path())
        .ok_or_else(|| engine_error("empty SMB server command".to_string()))?;
    debug!(target: TARGET, "Launching {:?} {:?}", program, args);

    let mut child = Command::new(&program)
        .args(&args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| engine_error(format!("cannot launch {:?}: {}", program, e)))?;

    log_listener_started(Protocol::Smb, &addr);

    let status = child.wait().await?;
    warn!(target: TARGET, "SMB server {:?} exited: {}", program, status);
    Err(engine_error(format!("{:?} exited with {}", program, status)))
}
