//! Crypto readiness barrier.
//!
//! Unlock must not derive a key before the crypto capability is usable.
//! The [`ReadinessGate`] is awaited with a bounded timeout; its
//! [`ReadinessSignal`] flips it to ready exactly once.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::VaultError;

/// Sending half: marks the capability ready.
#[derive(Debug)]
pub struct ReadinessSignal {
    tx: watch::Sender<bool>,
}

impl ReadinessSignal {
    /// Flip the gate to ready. Idempotent.
    pub fn mark_ready(&self) {
        self.tx.send_replace(true);
    }
}

/// Receiving half, cheap to clone.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    rx: watch::Receiver<bool>,
    /// Sender held open by [`ReadinessGate::pending`].
    hold: Option<Arc<watch::Sender<bool>>>,
}

impl ReadinessGate {
    /// A pending gate and the signal that opens it.
    #[must_use]
    pub fn channel() -> (ReadinessSignal, Self) {
        let (tx, rx) = watch::channel(false);
        (ReadinessSignal { tx }, Self { rx, hold: None })
    }

    /// A gate that is already open.
    #[must_use]
    pub fn ready() -> Self {
        let (tx, rx) = watch::channel(true);
        drop(tx);
        Self { rx, hold: None }
    }

    /// A gate that never opens.
    #[must_use]
    pub fn pending() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            hold: Some(Arc::new(tx)),
        }
    }

    /// A gate that opens once the crypto-core self-test passes.
    ///
    /// Inside a tokio runtime the test runs on a blocking task; otherwise
    /// it runs before this returns. A failing self-test leaves the gate
    /// closed for good.
    #[must_use]
    pub fn self_tested() -> Self {
        let (signal, gate) = Self::channel();
        let check = move || match sdm_crypto_core::selftest::run() {
            Ok(()) => {
                tracing::debug!("crypto self-test passed");
                signal.mark_ready();
            }
            Err(e) => tracing::error!("crypto self-test failed: {e}"),
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => drop(handle.spawn_blocking(check)),
            Err(_) => check(),
        }
        gate
    }

    /// Whether the gate is open right now.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the gate opens, at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::CryptoNotReady`] if the gate is still closed
    /// after `timeout`, or can no longer open.
    pub async fn wait(&self, timeout: Duration) -> Result<(), VaultError> {
        let mut rx = self.rx.clone();
        let opened = tokio::time::timeout(timeout, async move {
            rx.wait_for(|ready| *ready).await.is_ok()
        })
        .await
        .unwrap_or(false);

        if opened {
            Ok(())
        } else {
            Err(VaultError::CryptoNotReady {
                waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
