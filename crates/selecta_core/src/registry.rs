//! Open-instance registry
//!
//! Keeps at most one popover-style widget open per page. Each widget registers
//! a close callback under its [`InstanceKey`] at mount; when one opens it calls
//! [`OpenRegistry::notify_opened`], which runs every *other* registrant's
//! callback. Closing an already closed widget is a no-op, so the order in which
//! peers are notified does not matter.
//!
//! # Usage
//!
//! ```ignore
//! let registry = OpenRegistry::global();
//! registry.register(key.clone(), move || close_me());
//! // ... on open:
//! registry.notify_opened(&key);
//! // ... on unmount:
//! registry.unregister(&key);
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;

use crate::key::InstanceKey;

type CloseCallback = Rc<dyn Fn()>;

thread_local! {
    /// Registry shared by every page on this UI thread
    static GLOBAL_REGISTRY: OpenRegistry = OpenRegistry::new();
}

/// Page-wide open coordination
///
/// Cheap to clone; clones share the same registrations.
#[derive(Clone, Default)]
pub struct OpenRegistry {
    entries: Rc<RefCell<IndexMap<InstanceKey, CloseCallback, FxBuildHasher>>>,
}

impl OpenRegistry {
    /// A fresh registry, isolated from the global one
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry for the current UI thread, created on first use
    pub fn global() -> Self {
        GLOBAL_REGISTRY.with(Clone::clone)
    }

    /// Register (or replace) the close callback for `key`
    pub fn register<F>(&self, key: InstanceKey, on_close: F)
    where
        F: Fn() + 'static,
    {
        self.entries.borrow_mut().insert(key, Rc::new(on_close));
    }

    pub fn unregister(&self, key: &InstanceKey) -> bool {
        let removed = self.entries.borrow_mut().shift_remove(key);
        removed.is_some()
    }

    pub fn is_registered(&self, key: &InstanceKey) -> bool {
        self.entries.borrow().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// `key` opened: close everyone else
    ///
    /// Returns how many peers were notified. Callbacks run after the registry
    /// borrow is released, so they may register or unregister freely.
    pub fn notify_opened(&self, key: &InstanceKey) -> usize {
        let peers: Vec<CloseCallback> = self
            .entries
            .borrow()
            .iter()
            .filter(|(other, _)| *other != key)
            .map(|(_, on_close)| Rc::clone(on_close))
            .collect();

        tracing::trace!(instance = %key, peers = peers.len(), "instance opened");
        for on_close in &peers {
            on_close();
        }
        peers.len()
    }
}

impl std::fmt::Debug for OpenRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRegistry")
            .field("instances", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counter(registry: &OpenRegistry, key: &InstanceKey) -> Rc<Cell<u32>> {
        let closes = Rc::new(Cell::new(0));
        let closes_clone = closes.clone();
        registry.register(key.clone(), move || closes_clone.set(closes_clone.get() + 1));
        closes
    }

    #[test]
    fn test_notify_skips_originator() {
        let registry = OpenRegistry::new();
        let a = InstanceKey::explicit("a");
        let b = InstanceKey::explicit("b");
        let c = InstanceKey::explicit("c");
        let (ca, cb, cc) = (
            counter(&registry, &a),
            counter(&registry, &b),
            counter(&registry, &c),
        );

        assert_eq!(registry.notify_opened(&b), 2);
        assert_eq!((ca.get(), cb.get(), cc.get()), (1, 0, 1));
    }

    #[test]
    fn test_unregister() {
        let registry = OpenRegistry::new();
        let a = InstanceKey::explicit("a");
        let b = InstanceKey::explicit("b");
        let ca = counter(&registry, &a);
        counter(&registry, &b);

        assert!(registry.unregister(&a));
        assert!(!registry.unregister(&a));
        assert!(!registry.is_registered(&a));
        assert_eq!(registry.len(), 1);

        registry.notify_opened(&b);
        assert_eq!(ca.get(), 0);
    }

    #[test]
    fn test_callback_may_unregister_itself() {
        let registry = OpenRegistry::new();
        let a = InstanceKey::explicit("a");
        let b = InstanceKey::explicit("b");

        let registry_clone = registry.clone();
        let a_clone = a.clone();
        registry.register(a.clone(), move || {
            registry_clone.unregister(&a_clone);
        });
        counter(&registry, &b);

        registry.notify_opened(&b);
        assert!(!registry.is_registered(&a));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_global_is_shared_per_thread() {
        let key = InstanceKey::new("global-test");
        OpenRegistry::global().register(key.clone(), || {});
        assert!(OpenRegistry::global().is_registered(&key));
        OpenRegistry::global().unregister(&key);
        assert!(!OpenRegistry::global().is_registered(&key));
    }
}
