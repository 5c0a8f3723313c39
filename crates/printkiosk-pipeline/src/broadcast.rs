// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Status broadcaster — fans job transitions out to subscribed observers.
//
// Each observer owns a bounded queue. Publishing never waits: a full queue
// loses that event for that observer only, and a closed queue is pruned.
// Late subscribers see only events published after they joined.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use printkiosk_core::error::Result;
use printkiosk_core::types::{Job, JobId, JobStatus};

/// One job transition, as seen by observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    pub at: DateTime<Utc>,
}

impl StatusEvent {
    /// The event announcing the status `job` is in now.
    pub fn current(job: &Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            error_detail: job.error_detail.clone(),
            at: job.entered_at(job.status).unwrap_or_else(Utc::now),
        }
    }

    /// Wire form for observer transports:
    /// `{"jobId":…,"status":…,"errorDetail"?:…,"at":…}`.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

pub type SubscriberId = u64;

#[derive(Debug, Default)]
struct Registry {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<StatusEvent>>>,
}

impl Registry {
    fn remove(&self, id: SubscriberId) -> bool {
        match self.subscribers.lock() {
            Ok(mut subs) => subs.remove(&id).is_some(),
            Err(poisoned) => poisoned.into_inner().remove(&id).is_some(),
        }
    }
}

/// Owned registry of observer channels. Cloning shares the registry.
#[derive(Debug, Clone)]
pub struct StatusBroadcaster {
    registry: Arc<Registry>,
    capacity: usize,
}

impl StatusBroadcaster {
    /// `capacity` is the number of undelivered events buffered per observer.
    pub fn new(capacity: usize) -> Self {
        Self {
            registry: Arc::new(Registry::default()),
            capacity: capacity.max(1),
        }
    }

    /// Join. The subscription leaves automatically when dropped.
    pub fn subscribe(&self) -> Subscription {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.capacity);
        match self.registry.subscribers.lock() {
            Ok(mut subs) => {
                subs.insert(id, tx);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(id, tx);
            }
        }
        debug!(subscriber = id, "observer subscribed");
        Subscription {
            id,
            receiver: rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Leave explicitly. Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.registry.remove(id);
        if removed {
            debug!(subscriber = id, "observer unsubscribed");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        match self.registry.subscribers.lock() {
            Ok(subs) => subs.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Deliver `event` to every current observer without waiting on any of
    /// them. Returns how many observers received it.
    pub fn publish(&self, event: &StatusEvent) -> usize {
        let mut subs = match self.registry.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, tx) in subs.iter() {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(subscriber = id, job_id = %event.job_id, status = %event.status, "observer queue full, event dropped");
                }
                Err(TrySendError::Closed(_)) => closed.push(*id),
            }
        }
        for id in closed {
            subs.remove(&id);
            debug!(subscriber = id, "pruned closed observer");
        }
        delivered
    }
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new(64)
    }
}

/// An observer's end of the broadcast.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<StatusEvent>,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next event, or `None` once the broadcaster is gone.
    pub async fn recv(&mut self) -> Option<StatusEvent> {
        self.receiver.recv().await
    }

    /// Next already-queued event, if any.
    pub fn try_recv(&mut self) -> Option<StatusEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}
