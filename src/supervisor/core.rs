use log::{error, info, warn};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, mpsc};

use crate::config::ServiceConfig;
use crate::error::SupervisorError;
use crate::error::handlers::{EXIT_CLEAN, EXIT_LISTENER_FAILED, exit_code_kind};
use crate::middleware::logging::log_listener_failure;
use crate::protocol::Protocol;
use crate::server::ListenerConfig;
use crate::storage::DirectoryRoot;
use crate::supervisor::handle::{ListenerExit, ListenerHandle, ListenerState};

const TARGET: &str = "rax_share::supervisor";

/// Stops a running [`Supervisor`] from another task.
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<Notify>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.notify_one();
    }
}

/// What happened to the listeners over one [`Supervisor::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub started: Vec<Protocol>,
    pub failed: Vec<Protocol>,
}

impl RunSummary {
    pub fn exit_code(&self) -> i32 {
        if self.failed.is_empty() {
            EXIT_CLEAN
        } else {
            EXIT_LISTENER_FAILED
        }
    }
}

/// Owns one listener process per enabled protocol.
pub struct Supervisor {
    handles: Vec<ListenerHandle>,
    program: PathBuf,
    log_spec: String,
    fail_fast: bool,
    grace_period: Duration,
    stop_signal: Arc<Notify>,
}

impl Supervisor {
    /// Validates the directory root and builds one handle per enabled
    /// protocol. Nothing is started yet.
    pub fn configure(config: &ServiceConfig, log_spec: &str) -> Result<Self, SupervisorError> {
        config
            .validate()
            .map_err(|e| SupervisorError::Config(e.to_string()))?;

        let root = DirectoryRoot::open(&config.directory).map_err(|e| {
            SupervisorError::Config(format!("{}: {}", config.directory.display(), e))
        })?;
        let listeners = config
            .listener_configs(root.path())
            .map_err(|e| SupervisorError::Config(e.to_string()))?;

        let program = std::env::current_exe()
            .map_err(|e| SupervisorError::Config(format!("cannot locate own executable: {}", e)))?;

        Ok(Self::with_listeners(
            listeners,
            program,
            log_spec,
            config.fail_fast,
            config.grace_period(),
        ))
    }

    /// Supervisor over explicit listener configs, re-executing `program`
    /// for each listener process.
    pub fn with_listeners(
        listeners: Vec<ListenerConfig>,
        program: PathBuf,
        log_spec: &str,
        fail_fast: bool,
        grace_period: Duration,
    ) -> Self {
        Self {
            handles: listeners.into_iter().map(ListenerHandle::new).collect(),
            program,
            log_spec: log_spec.to_string(),
            fail_fast,
            grace_period,
            stop_signal: Arc::new(Notify::new()),
        }
    }

    pub fn handles(&self) -> &[ListenerHandle] {
        &self.handles
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.stop_signal))
    }

    /// Signals every listener to stop.
    pub fn stop(&mut self) {
        for handle in &mut self.handles {
            handle.stop();
        }
    }

    /// Starts every listener and waits until all of them have exited.
    ///
    /// Listeners end on their own (failure), on interrupt or terminate
    /// signals, or through a [`StopHandle`].
    pub async fn run(&mut self) -> Result<RunSummary, SupervisorError> {
        let mut summary = RunSummary::default();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        for index in 0..self.handles.len() {
            let handle = &mut self.handles[index];
            let protocol = handle.protocol();
            match handle.start(
                &self.program,
                &self.log_spec,
                self.grace_period,
                index,
                events_tx.clone(),
            ) {
                Ok(()) => summary.started.push(protocol),
                Err(e) => {
                    error!(target: TARGET, "{}", e);
                    handle.transition(ListenerState::Stopped);
                    summary.failed.push(protocol);
                    if self.fail_fast {
                        self.stop();
                        break;
                    }
                }
            }
        }
        drop(events_tx);

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);
        let mut signals_armed = true;

        loop {
            tokio::select! {
                event = events_rx.recv() => {
                    let Some((index, exit)) = event else { break };
                    self.on_exit(index, exit, &mut summary);
                }
                result = &mut shutdown, if signals_armed => {
                    signals_armed = false;
                    match result {
                        Ok(()) => {
                            info!(target: TARGET, "Shutdown requested, stopping listeners");
                            self.stop();
                        }
                        Err(e) => warn!(target: TARGET, "{}", SupervisorError::Signal(e)),
                    }
                }
                _ = self.stop_signal.notified() => {
                    info!(target: TARGET, "Stop requested, stopping listeners");
                    self.stop();
                }
            }
        }

        Ok(summary)
    }

    fn on_exit(&mut self, index: usize, exit: ListenerExit, summary: &mut RunSummary) {
        let Some(handle) = self.handles.get_mut(index) else {
            return;
        };
        let requested = handle.state() == ListenerState::Stopping;
        let protocol = handle.protocol();
        let addr = handle.socket_addr();
        handle.transition(ListenerState::Stopped);

        match exit {
            ListenerExit::Failed(code) => {
                log_listener_failure(
                    protocol,
                    &addr,
                    exit_code_kind(code),
                    &format!("listener process exited with {:?}", code),
                );
                summary.failed.push(protocol);
                if self.fail_fast {
                    warn!(target: TARGET, "Stopping all listeners after {} failure", protocol);
                    self.stop();
                }
            }
            ListenerExit::Clean if !requested => {
                warn!(target: TARGET, "{} listener on {} exited unexpectedly", protocol, addr);
                summary.failed.push(protocol);
                if self.fail_fast {
                    self.stop();
                }
            }
            ListenerExit::Killed => {
                info!(target: TARGET, "{} listener on {} killed", protocol, addr)
            }
            ListenerExit::Clean => info!(target: TARGET, "{} listener on {} stopped", protocol, addr),
        }
    }
}

/// Resolves on the first interrupt or terminate signal.
#[cfg(unix)]
async fn shutdown_signal() -> io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> io::Result<()> {
    tokio::signal::ctrl_c().await
}
