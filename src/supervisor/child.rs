//! Listener process entry point
//!
//! Runs one listener inside a process started by the supervisor. The
//! supervisor holds the other end of this process's stdin; end-of-file on
//! stdin is the stop request.

use log::{debug, info, warn};
use tokio::io::AsyncReadExt;

use crate::error::handlers::{EXIT_CLEAN, listener_exit_code};
use crate::middleware::logging::log_listener_failure;
use crate::server::{ListenerConfig, run_listener};

const TARGET: &str = "rax_share::supervisor";

/// Runs `config` until it fails or, when `supervised`, until the supervisor
/// closes stdin. Returns the process exit code.
pub async fn run_child(config: ListenerConfig, supervised: bool) -> i32 {
    let addr = config.socket_addr();
    if supervised {
        ignore_interrupts();
    }

    let result = tokio::select! {
        result = run_listener(&config) => result,
        _ = stop_requested(supervised) => {
            info!(target: TARGET, "{} listener on {} stopping", config.protocol, addr);
            return EXIT_CLEAN;
        }
    };

    match result {
        Ok(()) => EXIT_CLEAN,
        Err(e) => {
            log_listener_failure(config.protocol, &addr, e.kind(), &e.to_string());
            listener_exit_code(&e)
        }
    }
}

/// Interrupts are the supervisor's business; a listener keeps serving until
/// it is told to stop. The handler is registered before this returns.
#[cfg(unix)]
fn ignore_interrupts() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = match signal(SignalKind::interrupt()) {
        Ok(interrupt) => interrupt,
        Err(e) => {
            warn!(target: TARGET, "Cannot intercept interrupts: {}", e);
            return;
        }
    };
    tokio::spawn(async move {
        while interrupt.recv().await.is_some() {
            debug!(target: TARGET, "Ignoring interrupt in listener process");
        }
    });
}

#[cfg(not(unix))]
fn ignore_interrupts() {
    tokio::spawn(async {
        loop {
            match tokio::signal::ctrl_c().await {
                Ok(()) => debug!(target: TARGET, "Ignoring interrupt in listener process"),
                Err(e) => {
                    warn!(target: TARGET, "Cannot intercept interrupts: {}", e);
                    break;
                }
            }
        }
    });
}

/// Resolves when stdin reaches end-of-file or, on unix, on a terminate
/// signal. Unsupervised listeners run until interrupted.
async fn stop_requested(supervised: bool) {
    if !supervised {
        let _ = tokio::signal::ctrl_c().await;
        return;
    }

    tokio::select! {
        _ = stdin_closed() => {}
        _ = terminated() => {}
    }
}

async fn stdin_closed() {
    let mut stdin = tokio::io::stdin();
    let mut buf = [0u8; 64];
    loop {
        match stdin.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => continue,
        }
    }
}

#[cfg(unix)]
async fn terminated() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            terminate.recv().await;
        }
        Err(e) => {
            warn!(target: TARGET, "Cannot intercept terminate signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminated() {
    std::future::pending::<()>().await;
}
