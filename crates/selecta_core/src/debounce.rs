//! Debounced values
//!
//! `Debounced<V>` holds a rapidly changing input and exposes a *settled* copy
//! that only catches up once the input has stayed the same for `delay`. Every
//! `set` restarts the timer, so a burst of N inputs produces one settle.
//!
//! ```ignore
//! let query = Debounced::new(page.scheduler(), String::new(), Duration::from_millis(200));
//! query.on_settle(|q| println!("search for {q}"));
//! query.set("k".into());
//! query.set("ky".into());
//! page.advance(Duration::from_millis(200)); // prints "search for ky" once
//! ```

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::scheduler::{Scheduler, TimerId};

type SettleCallback<V> = Box<dyn FnMut(&V)>;

struct DebounceState<V> {
    latest: V,
    settled: V,
    delay: Duration,
    timer: Option<TimerId>,
    on_settle: Option<SettleCallback<V>>,
}

/// A value that settles `delay` after its last change
pub struct Debounced<V: Clone + PartialEq + 'static> {
    state: Rc<RefCell<DebounceState<V>>>,
    scheduler: Scheduler,
}

impl<V: Clone + PartialEq + 'static> Debounced<V> {
    pub fn new(scheduler: &Scheduler, initial: V, delay: Duration) -> Self {
        Self {
            state: Rc::new(RefCell::new(DebounceState {
                latest: initial.clone(),
                settled: initial,
                delay,
                timer: None,
                on_settle: None,
            })),
            scheduler: scheduler.clone(),
        }
    }

    /// Called with the new settled value, only when it differs from the previous one
    pub fn on_settle<F>(&self, callback: F)
    where
        F: FnMut(&V) + 'static,
    {
        self.state.borrow_mut().on_settle = Some(Box::new(callback));
    }

    /// Feed a new input value and restart the timer
    pub fn set(&self, value: V) {
        let delay = {
            let mut state = self.state.borrow_mut();
            state.latest = value;
            state.delay
        };
        self.cancel();

        let weak = Rc::downgrade(&self.state);
        let timer = self.scheduler.set_timeout(delay, move || settle(&weak));
        self.state.borrow_mut().timer = Some(timer);
    }

    /// Set both the input and the settled value right away, without notifying
    pub fn reset(&self, value: V) {
        self.cancel();
        let mut state = self.state.borrow_mut();
        state.latest = value.clone();
        state.settled = value;
    }

    /// Drop the pending settle, if any. The settled value stays where it was.
    pub fn cancel(&self) {
        let timer = self.state.borrow_mut().timer.take();
        if let Some(timer) = timer {
            self.scheduler.clear_timeout(timer);
        }
    }

    pub fn settled(&self) -> V {
        self.state.borrow().settled.clone()
    }

    /// Most recent input, settled or not
    pub fn latest(&self) -> V {
        self.state.borrow().latest.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.state.borrow().timer.is_some()
    }

    pub fn delay(&self) -> Duration {
        self.state.borrow().delay
    }

    /// Change the delay. Applies from the next `set`.
    pub fn set_delay(&self, delay: Duration) {
        self.state.borrow_mut().delay = delay;
    }
}

impl<V: Clone + PartialEq + 'static> Drop for Debounced<V> {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl<V: Clone + PartialEq + std::fmt::Debug + 'static> std::fmt::Debug for Debounced<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Debounced")
            .field("latest", &state.latest)
            .field("settled", &state.settled)
            .field("delay", &state.delay)
            .field("pending", &state.timer.is_some())
            .finish()
    }
}

fn settle<V: Clone + PartialEq>(weak: &Weak<RefCell<DebounceState<V>>>) {
    let Some(state) = weak.upgrade() else {
        return;
    };

    let (value, callback) = {
        let mut state = state.borrow_mut();
        state.timer = None;
        if state.latest == state.settled {
            return;
        }
        state.settled = state.latest.clone();
        (state.settled.clone(), state.on_settle.take())
    };

    // The callback runs unborrowed so it may read or set the value again
    if let Some(mut callback) = callback {
        callback(&value);
        let mut state = state.borrow_mut();
        if state.on_settle.is_none() {
            state.on_settle = Some(callback);
        }
    }
}
