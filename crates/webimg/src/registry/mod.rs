//! # Registry
//!
//! The coordination state of the loader: pending operations keyed by
//! [`RequestKey`] and tag bindings pointing into them. Both tables live in a
//! single [`Registry`] so they are always updated together under one lock.

mod pending;
mod tags;

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::debug;

use crate::error::LoadError;
use crate::image::Image;
use crate::listener::{Listener, OnProgress};
use crate::request::{RequestFlags, RequestKey, Tag};

pub(crate) use pending::{Detached, PendingOperation, PendingOperations};
pub(crate) use tags::{TagBinding, TagRegistry};

pub(crate) type OperationId = u64;
pub(crate) type SubscriptionId = u64;

pub(crate) type LoadResult = Result<Arc<Image>, LoadError>;

/// Where a subscriber's outcome is delivered.
pub(crate) enum Sink {
    Listener(Arc<dyn Listener>),
    Waiter(oneshot::Sender<LoadResult>),
}

/// One caller waiting on a pending operation.
pub(crate) struct Subscription {
    pub id: SubscriptionId,
    pub tag: Option<Tag>,
    pub flags: RequestFlags,
    pub sink: Sink,
    pub progress: Option<OnProgress>,
}

impl Subscription {
    /// Hand the outcome to the subscriber. Must be called without the
    /// registry lock held.
    pub fn deliver(self, outcome: &LoadResult) {
        match self.sink {
            Sink::Listener(listener) => match outcome {
                Ok(image) => listener.on_success(self.tag.as_ref(), image.clone()),
                Err(e) => listener.on_error(self.tag.as_ref(), e.clone()),
            },
            Sink::Waiter(tx) => {
                // Receiver gone means the blocking caller stopped waiting
                let _ = tx.send(outcome.clone());
            }
        }
    }
}

#[derive(Default)]
pub(crate) struct Registry {
    pub pending: PendingOperations,
    pub tags: TagRegistry,
    next_subscription: SubscriptionId,
    closed: bool,
}

impl Registry {
    pub fn next_subscription_id(&mut self) -> SubscriptionId {
        self.next_subscription += 1;
        self.next_subscription
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Detach whatever subscription `tag` is bound to. An operation left
    /// without subscribers is removed and its token cancelled.
    ///
    /// Returns true when an operation was aborted.
    pub fn cancel_tag(&mut self, tag: &Tag) -> bool {
        let Some(binding) = self.tags.unbind(tag) else {
            return false;
        };

        match self
            .pending
            .detach(&binding.key, binding.operation, binding.subscription)
        {
            Detached::Emptied(op) => {
                debug!(key = %op.key, tag = %tag, "Aborting operation without subscribers");
                op.cancel.cancel();
                true
            }
            Detached::Remaining(left) => {
                debug!(key = %binding.key, tag = %tag, remaining = left, "Detached subscriber");
                false
            }
            Detached::Missing => false,
        }
    }

    /// Remove a finished operation and release every tag bound to it.
    pub fn complete(&mut self, key: &RequestKey, operation: OperationId) -> Option<PendingOperation> {
        let op = self.pending.take(key, operation)?;
        for subscription in &op.subscribers {
            if let Some(tag) = &subscription.tag {
                self.tags.release(tag, subscription.id);
            }
        }
        Some(op)
    }

    /// Refuse further work and abort everything in flight. The returned
    /// operations are dropped by the caller outside the lock, which wakes
    /// blocking waiters.
    pub fn close(&mut self) -> Vec<PendingOperation> {
        self.closed = true;
        self.tags.clear();
        let ops = self.pending.drain();
        for op in &ops {
            op.cancel.cancel();
        }
        ops
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::listener::listener;

    fn key(name: &str) -> RequestKey {
        RequestKey::new(name, None)
    }

    fn subscription(registry: &mut Registry, tag: Option<&str>, flags: RequestFlags) -> Subscription {
        Subscription {
            id: registry.next_subscription_id(),
            tag: tag.map(Tag::from),
            flags,
            sink: Sink::Listener(Arc::new(crate::listener::NoopListener)),
            progress: None,
        }
    }

    fn bind(registry: &mut Registry, tag: &str, key: &RequestKey, op: OperationId, sub: SubscriptionId) {
        registry.tags.bind(
            Tag::from(tag),
            TagBinding {
                key: key.clone(),
                operation: op,
                subscription: sub,
            },
        );
    }

    #[test]
    fn test_attach_requires_existing_operation() {
        let mut registry = Registry::default();
        let k = key("a.png");
        let sub = subscription(&mut registry, None, RequestFlags::empty());

        let sub = registry.pending.attach(&k, sub).err().expect("no operation yet");
        let op = registry.pending.create(k.clone(), sub, CancellationToken::new()).id;

        let second = subscription(&mut registry, None, RequestFlags::empty());
        assert_eq!(registry.pending.attach(&k, second).ok(), Some(op));
        assert_eq!(registry.pending.len(), 1);
    }

    #[test]
    fn test_cancel_last_subscriber_aborts() {
        let mut registry = Registry::default();
        let k = key("a.png");
        let token = CancellationToken::new();
        let sub = subscription(&mut registry, Some("t"), RequestFlags::empty());
        let sub_id = sub.id;
        let op = registry.pending.create(k.clone(), sub, token.clone()).id;
        bind(&mut registry, "t", &k, op, sub_id);

        assert!(registry.cancel_tag(&Tag::from("t")));
        assert!(token.is_cancelled());
        assert_eq!(registry.pending.len(), 0);
        assert_eq!(registry.tags.len(), 0);
    }

    #[test]
    fn test_cancel_keeps_shared_operation_alive() {
        let mut registry = Registry::default();
        let k = key("a.png");
        let token = CancellationToken::new();

        let first = subscription(&mut registry, Some("t1"), RequestFlags::empty());
        let first_id = first.id;
        let op = registry.pending.create(k.clone(), first, token.clone()).id;
        bind(&mut registry, "t1", &k, op, first_id);

        let second = subscription(&mut registry, Some("t2"), RequestFlags::empty());
        let second_id = second.id;
        registry.pending.attach(&k, second).ok().unwrap();
        bind(&mut registry, "t2", &k, op, second_id);

        assert!(!registry.cancel_tag(&Tag::from("t1")));
        assert!(!token.is_cancelled());
        assert_eq!(registry.pending.len(), 1);
        assert_eq!(registry.tags.len(), 1);

        assert!(registry.cancel_tag(&Tag::from("t2")));
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_aborted_operation_reserves_key_until_finished() {
        let mut registry = Registry::default();
        let k = key("a.png");
        let sub = subscription(&mut registry, Some("t"), RequestFlags::empty());
        let sub_id = sub.id;
        let first = registry.pending.create(k.clone(), sub, CancellationToken::new());
        assert!(first.after.is_none());
        bind(&mut registry, "t", &k, first.id, sub_id);

        assert!(registry.cancel_tag(&Tag::from("t")));
        assert!(registry.pending.draining(&k).is_some());

        let sub = subscription(&mut registry, None, RequestFlags::empty());
        let second = registry.pending.create(k.clone(), sub, CancellationToken::new());
        let after = second.after.expect("waits for the aborted job");
        assert!(!after.is_cancelled());

        first.finished.cancel();
        assert!(after.is_cancelled());
        assert!(registry.pending.draining(&k).is_none());

        registry.pending.settle(&k, second.id);
        registry.pending.settle(&k, first.id);
        assert!(registry.pending.draining(&k).is_none());
    }

    #[test]
    fn test_cancel_unknown_tag_is_noop() {
        let mut registry = Registry::default();
        assert!(!registry.cancel_tag(&Tag::from("missing")));
    }

    #[test]
    fn test_write_flags_merge() {
        let mut registry = Registry::default();
        let k = key("a.png");
        let first = subscription(&mut registry, None, RequestFlags::NO_CACHE);
        let op = registry.pending.create(k.clone(), first, CancellationToken::new()).id;
        assert_eq!(
            registry.pending.write_flags(&k, op),
            Some(RequestFlags::NO_CACHE)
        );

        let second = subscription(&mut registry, None, RequestFlags::empty());
        registry.pending.attach(&k, second).ok().unwrap();
        assert_eq!(
            registry.pending.write_flags(&k, op),
            Some(RequestFlags::empty())
        );
        assert_eq!(registry.pending.write_flags(&k, op + 1), None);
    }

    #[test]
    fn test_complete_releases_only_own_bindings() {
        let mut registry = Registry::default();
        let (a, b) = (key("a.png"), key("b.png"));

        let sub_a = subscription(&mut registry, Some("t"), RequestFlags::empty());
        let sub_a_id = sub_a.id;
        let op_a = registry.pending.create(a.clone(), sub_a, CancellationToken::new()).id;
        bind(&mut registry, "t", &a, op_a, sub_a_id);

        // tag rebound to another operation before `a` completes
        let sub_b = subscription(&mut registry, Some("t"), RequestFlags::empty());
        let sub_b_id = sub_b.id;
        let op_b = registry.pending.create(b.clone(), sub_b, CancellationToken::new()).id;
        bind(&mut registry, "t", &b, op_b, sub_b_id);

        let done = registry.complete(&a, op_a).expect("operation a");
        assert_eq!(done.subscribers.len(), 1);
        assert_eq!(registry.tags.len(), 1);

        assert!(registry.complete(&a, op_a).is_none());
    }

    #[test]
    fn test_close_cancels_everything() {
        let mut registry = Registry::default();
        let token = CancellationToken::new();
        let sub = subscription(&mut registry, None, RequestFlags::empty());
        registry.pending.create(key("a.png"), sub, token.clone());

        let drained = registry.close();
        assert_eq!(drained.len(), 1);
        assert!(token.is_cancelled());
        assert!(registry.is_closed());
        assert_eq!(registry.pending.len(), 0);
    }

    #[test]
    fn test_deliver_routes_outcome() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = Subscription {
            id: 1,
            tag: Some(Tag::from("t")),
            flags: RequestFlags::empty(),
            sink: Sink::Listener(Arc::new(listener(move |tag, result| {
                sink.lock()
                    .unwrap()
                    .push((tag.cloned(), result.is_ok()));
            }))),
            progress: None,
        };
        sub.deliver(&Err(LoadError::Shutdown));
        assert_eq!(seen.lock().unwrap().as_slice(), &[(Some(Tag::from("t")), false)]);

        let (tx, mut rx) = oneshot::channel();
        let waiter = Subscription {
            id: 2,
            tag: None,
            flags: RequestFlags::empty(),
            sink: Sink::Waiter(tx),
            progress: None,
        };
        let image = Arc::new(Image::new(1, 1, vec![0u8; 4]));
        waiter.deliver(&Ok(image.clone()));
        assert!(Arc::ptr_eq(&rx.try_recv().unwrap().unwrap(), &image));
    }
}
