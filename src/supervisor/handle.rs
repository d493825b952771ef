//! Listener handles
//!
//! The supervisor's view of one listener process.

use log::{debug, warn};
use std::ffi::OsString;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot};

use crate::error::SupervisorError;
use crate::protocol::Protocol;
use crate::server::ListenerConfig;
use crate::utils::logging::LOG_SPEC_ENV;

const TARGET: &str = "rax_share::supervisor";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Created,
    Running,
    Stopping,
    Stopped,
}

impl ListenerState {
    pub fn can_transition_to(self, next: ListenerState) -> bool {
        use ListenerState::*;
        matches!(
            (self, next),
            (Created, Running)
                | (Created, Stopped)
                | (Running, Stopping)
                | (Running, Stopped)
                | (Stopping, Stopped)
        )
    }
}

/// How a listener process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerExit {
    /// Exited with status 0.
    Clean,
    /// Still alive after the grace period and killed.
    Killed,
    /// Non-zero exit, or killed by a signal (`None`).
    Failed(Option<i32>),
}

impl ListenerExit {
    fn from_status(status: io::Result<ExitStatus>) -> Self {
        match status {
            Ok(status) if status.success() => ListenerExit::Clean,
            Ok(status) => ListenerExit::Failed(status.code()),
            Err(_) => ListenerExit::Failed(None),
        }
    }
}

/// Exit notification sent to the supervisor: handle index plus outcome.
pub type ExitEvent = (usize, ListenerExit);

/// Arguments that make this binary run `config` as a supervised listener.
pub fn listener_args(config: &ListenerConfig) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "listener".into(),
        "--protocol".into(),
        config.protocol.as_arg().into(),
        "--address".into(),
        config.address.to_string().into(),
        "--port".into(),
        config.port.to_string().into(),
        "--dir".into(),
        config.directory.as_os_str().to_os_string(),
        "--share-name".into(),
        config.share_name.clone().into(),
        "--smb-command".into(),
        config.smb_command.clone().into(),
        "--idle-timeout-secs".into(),
        config.idle_timeout.as_secs().to_string().into(),
        "--supervised".into(),
    ];
    if let Some(key) = &config.key_path {
        args.push("--key".into());
        args.push(key.as_os_str().to_os_string());
    }
    args
}

pub struct ListenerHandle {
    config: ListenerConfig,
    state: ListenerState,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl ListenerHandle {
    pub fn new(config: ListenerConfig) -> Self {
        Self {
            config,
            state: ListenerState::Created,
            stop_tx: None,
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.config.protocol
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.config.socket_addr()
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    /// Moves to `next` if allowed. Invalid transitions are ignored.
    pub fn transition(&mut self, next: ListenerState) -> bool {
        if self.state.can_transition_to(next) {
            self.state = next;
            true
        } else {
            debug!(
                target: TARGET,
                "Ignoring {} listener transition {:?} -> {:?}",
                self.config.protocol,
                self.state,
                next
            );
            false
        }
    }

    /// Launches the listener process. Its exit is reported on `events`.
    pub fn start(
        &mut self,
        program: &Path,
        log_spec: &str,
        grace_period: Duration,
        index: usize,
        events: mpsc::UnboundedSender<ExitEvent>,
    ) -> Result<(), SupervisorError> {
        if self.state != ListenerState::Created {
            return Ok(());
        }

        let mut command = Command::new(program);
        command
            .args(listener_args(&self.config))
            .env(LOG_SPEC_ENV, log_spec)
            .stdin(Stdio::piped())
            .kill_on_drop(true);

        // Own process group: a terminal interrupt goes to the supervisor only.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| SupervisorError::Spawn(self.config.protocol, e))?;
        let stdin = child.stdin.take();

        let (stop_tx, stop_rx) = oneshot::channel();
        self.stop_tx = Some(stop_tx);
        self.transition(ListenerState::Running);

        tokio::spawn(watch(
            child,
            stdin,
            stop_rx,
            grace_period,
            self.config.protocol,
            index,
            events,
        ));
        Ok(())
    }

    /// Asks the listener process to stop.
    pub fn stop(&mut self) {
        match self.state {
            ListenerState::Created => {
                self.transition(ListenerState::Stopped);
            }
            ListenerState::Running => {
                self.transition(ListenerState::Stopping);
                if let Some(stop_tx) = self.stop_tx.take() {
                    let _ = stop_tx.send(());
                }
            }
            ListenerState::Stopping | ListenerState::Stopped => {}
        }
    }
}

/// Waits for the child to exit on its own, or closes its stdin on request
/// and kills it once the grace period runs out.
async fn watch(
    mut child: Child,
    stdin: Option<ChildStdin>,
    stop_rx: oneshot::Receiver<()>,
    grace_period: Duration,
    protocol: Protocol,
    index: usize,
    events: mpsc::UnboundedSender<ExitEvent>,
) {
    let exit = tokio::select! {
        status = child.wait() => ListenerExit::from_status(status),
        _ = stop_rx => {
            drop(stdin);
            match tokio::time::timeout(grace_period, child.wait()).await {
                Ok(status) => ListenerExit::from_status(status),
                Err(_) => {
                    warn!(
                        target: TARGET,
                        "{} listener still running after {:?}, killing it",
                        protocol,
                        grace_period
                    );
                    kill_process_group(&child);
                    let _ = child.kill().await;
                    ListenerExit::Killed
                }
            }
        }
    };

    let _ = events.send((index, exit));
}

/// The listener leads its own process group, so this also reaches helpers
/// it spawned (the SMB server).
#[cfg(unix)]
fn kill_process_group(child: &Child) {
    let Some(pid) = child.id() else { return };
    // SAFETY: killpg only sends a signal to the group led by our child.
    if unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) } != 0 {
        debug!(
            target: TARGET,
            "killpg({}) failed: {}",
            pid,
            io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}
