//! Outside-interaction detection
//!
//! Calls back once for every pointer down whose target is not inside a region
//! node. Listening starts at `attach` and stops when the guard is detached or
//! dropped, so mounting and unmounting a widget repeatedly never accumulates
//! page listeners.

use crate::events::event_types;
use crate::page::{ListenerId, NodeId, Page, WeakPage};

/// Guard for a page-level outside pointer-down listener
pub struct OutsideClick {
    page: WeakPage,
    listener: Option<ListenerId>,
}

impl OutsideClick {
    pub fn attach<F>(page: &Page, region: NodeId, on_outside: F) -> Self
    where
        F: Fn() + 'static,
    {
        let listener = page.add_listener(event_types::POINTER_DOWN, move |event| {
            if !event.is_within(region) {
                on_outside();
            }
        });
        Self {
            page: page.downgrade(),
            listener: Some(listener),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.listener.is_some()
    }

    /// Stop listening. Safe to call more than once.
    pub fn detach(&mut self) {
        if let (Some(listener), Some(page)) = (self.listener.take(), self.page.upgrade()) {
            page.remove_listener(listener);
        }
    }
}

impl Drop for OutsideClick {
    fn drop(&mut self) {
        self.detach();
    }
}
