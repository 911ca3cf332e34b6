//! Shutdown Coordination
//!
//! Turns process signals into a cancellation token that the rest of the
//! application can watch. The first signal requests a graceful stop; a
//! second one exits immediately.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Coordinates graceful shutdown across the application
#[derive(Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    shutdown_requested: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled once shutdown is requested
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn trigger_shutdown(&self) {
        // Release pairs with the Acquire load in is_shutdown_requested()
        self.shutdown_requested.store(true, Ordering::Release);
        self.token.cancel();
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }

    /// Resolves once shutdown has been requested
    pub async fn requested(&self) {
        self.token.cancelled().await
    }

    /// Listen for termination signals on the current runtime
    pub fn install_signal_handlers(&self) {
        setup_signal_handlers(self.clone());
    }
}

fn on_signal(coordinator: &ShutdownCoordinator, signal_count: &AtomicUsize, name: &str) {
    let prev = signal_count.fetch_add(1, Ordering::AcqRel);
    if prev >= 1 {
        log::warn!("{} received again; exiting", name);
        std::process::exit(130);
    }
    log::info!("{} received; shutting down", name);
    coordinator.trigger_shutdown();
}

fn setup_signal_handlers(coordinator: ShutdownCoordinator) {
    let signal_count = Arc::new(AtomicUsize::new(0));

    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }

        use tokio::signal::unix::{signal, SignalKind};
        let signals = [
            (SignalKind::interrupt(), "SIGINT"),
            (SignalKind::terminate(), "SIGTERM"),
            (SignalKind::hangup(), "SIGHUP"),
        ];

        for (kind, name) in signals {
            let coordinator = coordinator.clone();
            let count = signal_count.clone();
            tokio::spawn(async move {
                match signal(kind) {
                    Ok(mut sig) => {
                        while sig.recv().await.is_some() {
                            on_signal(&coordinator, &count, name);
                        }
                    }
                    Err(e) => log::debug!("Cannot listen for {}: {}", name, e),
                }
            });
        }
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                on_signal(&coordinator, &signal_count, "Ctrl-C");
            }
        });
    }
}
