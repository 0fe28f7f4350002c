use std::collections::HashMap;

use super::{OperationId, SubscriptionId};
use crate::request::{RequestKey, Tag};

/// Where a tag's current subscription lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TagBinding {
    pub key: RequestKey,
    pub operation: OperationId,
    pub subscription: SubscriptionId,
}

/// Tag to subscription table, at most one binding per tag.
#[derive(Default)]
pub(crate) struct TagRegistry {
    bindings: HashMap<Tag, TagBinding>,
}

impl TagRegistry {
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Bind `tag`, returning the binding it replaced. Callers detach the old
    /// subscription before binding a new one.
    pub fn bind(&mut self, tag: Tag, binding: TagBinding) -> Option<TagBinding> {
        self.bindings.insert(tag, binding)
    }

    pub fn unbind(&mut self, tag: &Tag) -> Option<TagBinding> {
        self.bindings.remove(tag)
    }

    /// Drop the binding for `tag` only if it still points at `subscription`.
    pub fn release(&mut self, tag: &Tag, subscription: SubscriptionId) {
        if self
            .bindings
            .get(tag)
            .is_some_and(|b| b.subscription == subscription)
        {
            self.bindings.remove(tag);
        }
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
    }
}
