//! Shutdown notifier: one-shot broadcast to shutdown watchers.
//!
//! Every `ShutdownWatch` call registers a [`Subscription`] with the process-wide
//! [`ShutdownNotifier`]. When the compositor starts shutting down the notifier
//! fires its latch once, resolving every pending subscription with exactly one
//! [`ShutdownWatchResponse`] and clearing the registry.
//!
//! ```text
//!            subscribe()                notify_shutdown()
//!   ─────────────────────▶ Pending ─────────────────────▶ Notified
//!                             │
//!                             │ Subscription dropped
//!                             ▼
//!                         Cancelled
//! ```
//!
//! Registration, cancellation and the broadcast sweep all hold the same
//! registry mutex. A subscription created after the latch has fired never
//! enters the registry and resolves immediately with the notification, so
//! every watcher of a shutting-down process observes exactly one event no
//! matter how its registration raced the trigger.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};

use futures::{Stream, StreamExt, future, stream};
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::ipc::types::ShutdownWatchResponse;

#[derive(Debug, Default)]
struct Registry {
    next_id: u64,
    fired: bool,
    pending: HashMap<u64, oneshot::Sender<ShutdownWatchResponse>>,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    // Every critical section leaves the registry consistent, so a panic
    // elsewhere does not invalidate it.
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-wide shutdown latch plus the registry of pending watchers.
///
/// Cheap to clone; all clones share one latch.
#[derive(Debug, Clone, Default)]
pub struct ShutdownNotifier {
    registry: Arc<Mutex<Registry>>,
}

impl ShutdownNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new watcher.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = oneshot::channel();
        let mut registry = lock(&self.registry);

        if registry.fired {
            let _ = tx.send(ShutdownWatchResponse {});
            debug!("shutdown watch registered after shutdown, resolving immediately");
            return Subscription {
                id: None,
                rx,
                registry: Weak::new(),
            };
        }

        let id = registry.next_id;
        registry.next_id += 1;
        registry.pending.insert(id, tx);
        debug!(id, pending = registry.pending.len(), "shutdown watch registered");

        Subscription {
            id: Some(id),
            rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Fire the latch and notify every pending watcher.
    ///
    /// Returns how many watchers were notified. Only the first call has any
    /// effect; later calls return 0.
    pub fn notify_shutdown(&self) -> usize {
        let mut registry = lock(&self.registry);
        if registry.fired {
            debug!("shutdown already broadcast, ignoring repeated trigger");
            return 0;
        }
        registry.fired = true;

        let delivered = registry
            .pending
            .drain()
            .map(|(_, tx)| tx.send(ShutdownWatchResponse {}))
            .filter(Result::is_ok)
            .count();
        info!(delivered, "shutdown broadcast to watchers");
        delivered
    }

    /// Whether the latch has fired.
    pub fn is_shutting_down(&self) -> bool {
        lock(&self.registry).fired
    }

    /// Number of watchers still waiting for a notification.
    pub fn pending_count(&self) -> usize {
        lock(&self.registry).pending.len()
    }
}

/// A single watcher's pending notification.
///
/// Resolves to `Some(ShutdownWatchResponse)` once shutdown is broadcast, or
/// `None` if every notifier handle was dropped without firing. Dropping an
/// unresolved subscription cancels it and removes its registry entry.
#[derive(Debug)]
#[must_use = "a subscription is cancelled as soon as it is dropped"]
pub struct Subscription {
    id: Option<u64>,
    rx: oneshot::Receiver<ShutdownWatchResponse>,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Adapt into a stream that yields at most one notification, then ends.
    pub fn into_stream(self) -> impl Stream<Item = ShutdownWatchResponse> + Send + 'static {
        stream::once(self).filter_map(future::ready)
    }
}

impl Future for Subscription {
    type Output = Option<ShutdownWatchResponse>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let result = std::task::ready!(Pin::new(&mut self.rx).poll(cx));
        // The sender is gone, so the registry no longer holds this entry.
        self.id = None;
        Poll::Ready(result.ok())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        if lock(&registry).pending.remove(&id).is_some() {
            debug!(id, "shutdown watch cancelled");
        }
    }
}
