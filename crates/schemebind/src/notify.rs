// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 schemebind contributors

//! Cross-instance change propagation.
//!
//! A mutation on one instance publishes a `{scheme, kind}` event; every
//! other instance re-reads the binding from the store (the source of
//! truth) and re-applies the mutation to its own live registry, never to
//! the store. An `Added`/`Updated` event whose binding has meanwhile been
//! deleted degrades to a local remove, which makes consumers idempotent
//! under out-of-order delivery for the same scheme, at the cost of one
//! extra read per notification.
//!
//! Delivery is fire-and-forget over a broadcast channel; an instance that
//! misses an event stays stale until its next bulk load or the next event
//! for the same scheme. That staleness window is documented behavior.

use crate::error::Result;
use crate::registry::SchemeRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// What happened to a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// A new scheme was bound
    Added,
    /// An existing scheme was replaced
    Updated,
    /// A scheme was unbound
    Deleted,
}

/// A binding mutation event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingChange {
    /// The mutated scheme
    pub scheme: String,
    /// The mutation kind
    pub kind: ChangeKind,
}

/// Fan-out publisher for binding mutations.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<BindingChange>,
}

impl ChangeNotifier {
    /// Create a notifier with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish a change. Fire-and-forget: having no subscribers is fine.
    pub fn publish(&self, change: BindingChange) {
        let _ = self.tx.send(change);
    }

    /// Subscribe to future changes
    pub fn subscribe(&self) -> broadcast::Receiver<BindingChange> {
        self.tx.subscribe()
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Applies received changes to a local registry.
pub struct ChangeListener {
    registry: Arc<SchemeRegistry>,
    rx: broadcast::Receiver<BindingChange>,
}

impl ChangeListener {
    /// Create a listener applying events to `registry`
    pub fn new(registry: Arc<SchemeRegistry>, rx: broadcast::Receiver<BindingChange>) -> Self {
        Self { registry, rx }
    }

    /// Apply one change: re-read the store and mirror the result locally.
    pub async fn apply(
        registry: &SchemeRegistry,
        change: &BindingChange,
        cancel: &CancellationToken,
    ) -> Result<()> {
        match change.kind {
            ChangeKind::Added | ChangeKind::Updated => {
                match registry.store().find_by_scheme(&change.scheme, cancel).await? {
                    Some(record) => registry.apply_remote(&record),
                    None => {
                        // Raced with a concurrent delete; converge to unbound.
                        registry.evict_local(&change.scheme);
                    }
                }
            }
            ChangeKind::Deleted => {
                registry.evict_local(&change.scheme);
            }
        }
        Ok(())
    }

    /// Consume events until the channel closes or `cancel` fires.
    ///
    /// Lagged receivers resynchronize per scheme on the next event; a
    /// failed store read only skips that one event.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                received = self.rx.recv() => match received {
                    Ok(change) => {
                        if let Err(e) = Self::apply(&self.registry, &change, &cancel).await {
                            tracing::warn!(scheme = %change.scheme, error = %e, "failed to apply change");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "change listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                },
            }
        }
    }
}
