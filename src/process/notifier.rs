// src/process/notifier.rs

//! SIGCHLD latch.
//!
//! The signal handler itself is tokio's: it only records that the signal
//! arrived. A listener task then sets the latch. The latch is advisory; the
//! reaper's blocking waits remain the source of truth for child state.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Shared view of the latch. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct DeathLatch {
    fired: Arc<AtomicBool>,
    deliveries: Arc<AtomicUsize>,
}

impl DeathLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one SIGCHLD delivery.
    pub fn record(&self) {
        self.fired.store(true, Ordering::SeqCst);
        self.deliveries.fetch_add(1, Ordering::SeqCst);
    }

    /// Whether at least one child has terminated since installation.
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Number of deliveries observed. Signals coalesce, so this is a lower
    /// bound on the number of terminated children.
    pub fn deliveries(&self) -> usize {
        self.deliveries.load(Ordering::SeqCst)
    }
}

/// Owns the SIGCHLD listener for one orchestrator run.
#[derive(Debug, Default)]
pub struct DeathNotifier {
    latch: DeathLatch,
    listener: Option<JoinHandle<()>>,
}

impl DeathNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latch(&self) -> DeathLatch {
        self.latch.clone()
    }

    pub fn is_installed(&self) -> bool {
        self.listener.is_some()
    }

    /// Start listening for SIGCHLD. Must run inside a tokio runtime.
    ///
    /// Installing twice is a no-op.
    pub fn install(&mut self) -> io::Result<()> {
        if self.listener.is_some() {
            return Ok(());
        }

        let mut stream = signal(SignalKind::child())?;
        let latch = self.latch.clone();

        self.listener = Some(tokio::spawn(async move {
            while stream.recv().await.is_some() {
                latch.record();
                trace!(deliveries = latch.deliveries(), "SIGCHLD delivered");
            }
            debug!("SIGCHLD listener ended");
        }));

        Ok(())
    }
}

impl Drop for DeathNotifier {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}
