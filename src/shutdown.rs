//! Interrupt Handling
//!
//! SIGINT/SIGTERM are turned into a flag instead of killing the process, so
//! the scheduler can stop between devices and never in the middle of moving
//! a finished file into place.
//!
//! In daemon mode SIGHUP is turned into a [`ReloadSignal`] that asks for the
//! configuration to be read again between cycles.

use std::future::pending;

use tokio::sync::watch;
use tracing::{info, warn};

/// Observes whether shutdown was requested
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

/// Requests shutdown on a manually created signal
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

impl ShutdownSignal {
    /// Installs process signal handlers and returns the matching signal
    pub fn listen() -> Self {
        let (trigger, signal) = Self::manual();
        tokio::spawn(async move {
            wait_for_signal().await;
            info!("Shutdown requested, stopping after the current step");
            trigger.trigger();
        });
        signal
    }

    /// A signal fired only through the returned trigger
    pub fn manual() -> (ShutdownTrigger, Self) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger { tx }, Self { rx })
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is requested; never resolves if it cannot be
    pub async fn wait(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                pending::<()>().await;
            }
        }
    }
}

/// Observes configuration reload requests
pub struct ReloadSignal {
    rx: watch::Receiver<u64>,
}

/// Requests a reload on a manually created signal
pub struct ReloadTrigger {
    tx: watch::Sender<u64>,
}

impl ReloadTrigger {
    pub fn trigger(&self) {
        self.tx.send_modify(|requests| *requests += 1);
    }
}

impl ReloadSignal {
    /// Forwards SIGHUP into the returned signal (Unix only)
    pub fn listen() -> Self {
        let (trigger, signal) = Self::manual();

        #[cfg(unix)]
        tokio::spawn(forward_hangups(trigger));

        #[cfg(not(unix))]
        drop(trigger);

        signal
    }

    pub fn manual() -> (ReloadTrigger, Self) {
        let (tx, rx) = watch::channel(0);
        (ReloadTrigger { tx }, Self { rx })
    }

    /// Resolves on the next unseen reload request
    ///
    /// Requests that arrive while nobody waits are not lost. Never resolves
    /// once the trigger is gone.
    pub async fn wait(&mut self) {
        if self.rx.changed().await.is_err() {
            pending::<()>().await;
        }
    }
}

#[cfg(unix)]
async fn forward_hangups(trigger: ReloadTrigger) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            warn!("Cannot listen for SIGHUP, configuration reload disabled: {}", e);
            return;
        }
    };

    while hangup.recv().await.is_some() {
        info!("Received SIGHUP, reloading configuration before the next cycle");
        trigger.trigger();
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if let Err(e) = result {
                            warn!("Cannot listen for interrupts: {}", e);
                            terminate.recv().await;
                        }
                    }
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                ctrl_c_or_pending().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c_or_pending().await;
    }
}

async fn ctrl_c_or_pending() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for interrupts: {}", e);
        pending::<()>().await;
    }
}
