//! Optional external mirror of newly added items.
//!
//! When configured, every successful add is forwarded as
//! `{"type": "<kind>", "data": <item>}` to a sink. Publishing never blocks
//! the vault and its failures never reach the caller.
//!
//! The event carries the **plaintext** item. Nothing is mirrored unless a
//! sink is explicitly configured.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinSet;

use crate::items::{ItemKind, VaultItem};

/// One mirrored addition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorEvent {
    /// Kind of the added item.
    #[serde(rename = "type")]
    pub kind: ItemKind,
    /// The item as added, id included.
    pub data: VaultItem,
}

impl MirrorEvent {
    /// Event for `item`.
    #[must_use]
    pub fn added(item: VaultItem) -> Self {
        Self {
            kind: item.kind(),
            data: item,
        }
    }
}

/// Fire-and-forget receiver of [`MirrorEvent`]s.
pub trait MirrorSink: Send + Sync {
    /// Hand off `event`. Must return promptly.
    fn publish(&self, event: MirrorEvent);
}

/// POSTs each event as JSON to a fixed URL on a background task.
///
/// Clones share the client and the set of in-flight deliveries, so a
/// short-lived process can [`flush`](Self::flush) before exiting.
#[derive(Debug, Clone)]
pub struct HttpMirror {
    client: reqwest::Client,
    url: String,
    in_flight: Arc<Mutex<Deliveries>>,
}

/// Deliveries still running. Dropping the last handle aborts them.
#[derive(Debug, Default)]
struct Deliveries(JoinSet<()>);

impl Deliveries {
    fn reap(&mut self) -> usize {
        while self.0.try_join_next().is_some() {}
        self.0.len()
    }
}

impl Drop for Deliveries {
    fn drop(&mut self) {
        let abandoned = self.reap();
        if abandoned > 0 {
            tracing::warn!(abandoned, "mirror deliveries dropped before completion");
        }
    }
}

impl HttpMirror {
    /// Mirror to `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            in_flight: Arc::default(),
        }
    }

    /// Target URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Number of deliveries not yet finished.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.in_flight.lock().map_or(0, |mut set| set.reap())
    }

    /// Wait for in-flight deliveries, at most `timeout`. Whatever is still
    /// pending afterwards is abandoned (and logged).
    pub async fn flush(&self, timeout: Duration) {
        let mut pending = match self.in_flight.lock() {
            Ok(mut set) => std::mem::take(&mut *set),
            Err(_) => return,
        };
        let _ = tokio::time::timeout(timeout, async {
            while pending.0.join_next().await.is_some() {}
        })
        .await;
    }
}

impl MirrorSink for HttpMirror {
    fn publish(&self, event: MirrorEvent) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(kind = %event.kind, "no async runtime, mirror event dropped");
            return;
        };

        let client = self.client.clone();
        let url = self.url.clone();
        let delivery = async move {
            let kind = event.kind;
            match client.post(&url).json(&event).send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::debug!(%kind, "mirror event delivered");
                }
                Ok(resp) => {
                    let status = resp.status();
                    tracing::warn!(%kind, %status, "mirror endpoint rejected event");
                }
                Err(e) => tracing::warn!(%kind, "mirror delivery failed: {e}"),
            }
        };

        match self.in_flight.lock() {
            Ok(mut set) => {
                set.reap();
                set.0.spawn_on(delivery, &handle);
            }
            Err(_) => drop(handle.spawn(delivery)),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
