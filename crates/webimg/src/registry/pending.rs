use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use super::{OperationId, Subscription, SubscriptionId};
use crate::listener::OnProgress;
use crate::request::{RequestFlags, RequestKey};

/// One in-flight pipeline execution and everyone waiting on it.
pub(crate) struct PendingOperation {
    pub id: OperationId,
    pub key: RequestKey,
    pub cancel: CancellationToken,
    /// Cancelled once the job has stopped running, including any blocking
    /// decode still in progress when it was aborted
    pub finished: CancellationToken,
    pub subscribers: Vec<Subscription>,
}

impl PendingOperation {
    /// Flags governing the cache write: the result is only kept out of the
    /// cache when every remaining subscriber asked for `NO_CACHE`.
    pub fn write_flags(&self) -> RequestFlags {
        if self
            .subscribers
            .iter()
            .all(|s| s.flags.contains(RequestFlags::NO_CACHE))
        {
            RequestFlags::NO_CACHE
        } else {
            RequestFlags::empty()
        }
    }
}

/// Outcome of removing a subscription from its operation.
pub(crate) enum Detached {
    /// Subscription or operation no longer exists
    Missing,
    /// Other subscribers keep the operation alive
    Remaining(usize),
    /// The last subscriber left; the operation was removed and must be aborted
    Emptied(PendingOperation),
}

/// Handle on a newly registered operation.
pub(crate) struct Reservation {
    pub id: OperationId,
    pub finished: CancellationToken,
    /// Aborted job for the same key that has not stopped yet
    pub after: Option<CancellationToken>,
}

/// At most one operation per key.
///
/// An aborted operation leaves the table at once but its key stays reserved
/// in `draining` until the job actually stops, so a replacement operation
/// waits for it instead of overlapping.
#[derive(Default)]
pub(crate) struct PendingOperations {
    ops: HashMap<RequestKey, PendingOperation>,
    draining: HashMap<RequestKey, (OperationId, CancellationToken)>,
    next_id: OperationId,
}

impl PendingOperations {
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Join the operation already running for `key`, or hand the subscription
    /// back if there is none.
    pub fn attach(
        &mut self,
        key: &RequestKey,
        subscription: Subscription,
    ) -> Result<OperationId, Subscription> {
        match self.ops.get_mut(key) {
            Some(op) => {
                op.subscribers.push(subscription);
                Ok(op.id)
            }
            None => Err(subscription),
        }
    }

    /// Register a new operation for `key` with its first subscriber.
    pub fn create(
        &mut self,
        key: RequestKey,
        subscription: Subscription,
        cancel: CancellationToken,
    ) -> Reservation {
        self.next_id += 1;
        let id = self.next_id;
        let finished = CancellationToken::new();
        let after = self.draining(&key);
        let previous = self.ops.insert(
            key.clone(),
            PendingOperation {
                id,
                key,
                cancel,
                finished: finished.clone(),
                subscribers: vec![subscription],
            },
        );
        debug_assert!(previous.is_none(), "one pending operation per key");
        Reservation {
            id,
            finished,
            after,
        }
    }

    /// Token of the aborted job still running for `key`, if any
    pub fn draining(&self, key: &RequestKey) -> Option<CancellationToken> {
        self.draining
            .get(key)
            .map(|(_, finished)| finished)
            .filter(|finished| !finished.is_cancelled())
            .cloned()
    }

    /// Release the reservation an aborted job held on `key`.
    pub fn settle(&mut self, key: &RequestKey, id: OperationId) {
        if self.draining.get(key).is_some_and(|(owner, _)| *owner == id) {
            self.draining.remove(key);
        }
    }

    fn live(&self, key: &RequestKey, id: OperationId) -> Option<&PendingOperation> {
        self.ops.get(key).filter(|op| op.id == id)
    }

    pub fn detach(
        &mut self,
        key: &RequestKey,
        id: OperationId,
        subscription: SubscriptionId,
    ) -> Detached {
        let Some(op) = self.ops.get_mut(key).filter(|op| op.id == id) else {
            return Detached::Missing;
        };
        let before = op.subscribers.len();
        op.subscribers.retain(|s| s.id != subscription);
        if op.subscribers.len() == before {
            return Detached::Missing;
        }
        if !op.subscribers.is_empty() {
            return Detached::Remaining(op.subscribers.len());
        }
        match self.ops.remove(key) {
            Some(op) => {
                self.draining
                    .insert(op.key.clone(), (op.id, op.finished.clone()));
                Detached::Emptied(op)
            }
            None => Detached::Missing,
        }
    }

    pub fn write_flags(&self, key: &RequestKey, id: OperationId) -> Option<RequestFlags> {
        self.live(key, id).map(PendingOperation::write_flags)
    }

    pub fn progress_listeners(&self, key: &RequestKey, id: OperationId) -> Vec<OnProgress> {
        self.live(key, id)
            .map(|op| {
                op.subscribers
                    .iter()
                    .filter_map(|s| s.progress.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Remove a finished operation so its subscribers can be notified.
    pub fn take(&mut self, key: &RequestKey, id: OperationId) -> Option<PendingOperation> {
        self.live(key, id)?;
        self.ops.remove(key)
    }

    pub fn drain(&mut self) -> Vec<PendingOperation> {
        self.draining.clear();
        self.ops.drain().map(|(_, op)| op).collect()
    }
}
