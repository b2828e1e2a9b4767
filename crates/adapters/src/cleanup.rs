// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process tracking and shutdown cleanup.
//!
//! Every spawned child registers its pid here; SIGINT/SIGTERM walk the
//! registry, terminate gracefully, then force-kill after a grace period and
//! run the registered cleanup callbacks. Cleanup is idempotent and
//! tolerates children that already exited.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Grace period between SIGTERM and SIGKILL.
pub const KILL_GRACE: Duration = Duration::from_secs(1);

/// Tracks live child processes by pid.
#[derive(Default)]
pub struct ProcessRegistry {
    children: Mutex<HashMap<u32, String>>,
}

impl ProcessRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, pid: u32, label: impl Into<String>) {
        self.children.lock().insert(pid, label.into());
    }

    pub fn unregister(&self, pid: u32) {
        self.children.lock().remove(&pid);
    }

    pub fn len(&self) -> usize {
        self.children.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.lock().is_empty()
    }

    /// Terminate every tracked child: graceful signal, grace period, then
    /// forced kill. Safe to call repeatedly.
    pub async fn shutdown_all(&self) {
        let children: Vec<(u32, String)> = {
            let mut map = self.children.lock();
            map.drain().collect()
        };
        if children.is_empty() {
            return;
        }
        for (pid, label) in &children {
            tracing::info!(pid, label = %label, "terminating child");
            terminate(*pid);
        }
        tokio::time::sleep(KILL_GRACE).await;
        for (pid, _) in &children {
            force_kill(*pid);
        }
    }
}

#[cfg(unix)]
fn terminate(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
}

#[cfg(unix)]
fn force_kill(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    let target = Pid::from_raw(pid as i32);
    // Only escalate if the child is still around
    if kill(target, None).is_ok() {
        let _ = kill(target, Signal::SIGKILL);
    }
}

#[cfg(windows)]
fn terminate(pid: u32) {
    // Windows has no SIGTERM; the forced tree-kill below does the work
    let _ = pid;
}

#[cfg(windows)]
fn force_kill(pid: u32) {
    // taskkill kills the whole process tree
    let _ = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .output();
}

type CleanupFn = Box<dyn FnOnce() + Send>;

/// Callbacks to run on shutdown (flush queues, release locks).
#[derive(Default)]
pub struct CleanupRegistry {
    callbacks: Mutex<Vec<(String, CleanupFn)>>,
}

impl CleanupRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, label: impl Into<String>, callback: impl FnOnce() + Send + 'static) {
        self.callbacks.lock().push((label.into(), Box::new(callback)));
    }

    /// Run all callbacks once. A second call is a no-op.
    pub fn run_all(&self) {
        let callbacks: Vec<(String, CleanupFn)> = {
            let mut list = self.callbacks.lock();
            list.drain(..).collect()
        };
        for (label, callback) in callbacks {
            tracing::debug!(label = %label, "running cleanup callback");
            callback();
        }
    }
}

/// Wire SIGINT/SIGTERM to process termination and cleanup callbacks.
///
/// Returns a handle; aborting it detaches the signal listener.
#[cfg(unix)]
pub fn install_signal_handlers(
    processes: Arc<ProcessRegistry>,
    cleanups: Arc<CleanupRegistry>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGINT handler");
                return;
            }
        };
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                return;
            }
        };
        tokio::select! {
            _ = sigint.recv() => tracing::info!("received SIGINT"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        }
        processes.shutdown_all().await;
        cleanups.run_all();
        std::process::exit(130);
    })
}

/// Ctrl-C handling for platforms without Unix signals.
#[cfg(not(unix))]
pub fn install_signal_handlers(
    processes: Arc<ProcessRegistry>,
    cleanups: Arc<CleanupRegistry>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received ctrl-c");
            processes.shutdown_all().await;
            cleanups.run_all();
            std::process::exit(130);
        }
    })
}

#[cfg(test)]
#[path = "cleanup_tests.rs"]
mod tests;
