//! Turn scheduler
//!
//! Single-threaded scheduler driving everything that happens "later" on a page:
//!
//! - **Timers**: `set_timeout` / `clear_timeout` against a virtual clock
//! - **Deferred hooks**: `defer` runs a callback after the current turn settles
//!   (the post-render hook list used for focus moves)
//! - **Local tasks**: `spawn_local` polls `!Send` futures, re-polling a task only
//!   after its waker fired
//!
//! Time only moves when the host calls [`Scheduler::advance`]. A frame loop
//! passes its frame delta; tests pass exact durations, which keeps every
//! debounce and async-search scenario deterministic.
//!
//! ```ignore
//! let scheduler = Scheduler::new();
//! scheduler.set_timeout(Duration::from_millis(200), || println!("settled"));
//! scheduler.advance(Duration::from_millis(200)); // prints "settled"
//! ```

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use futures::future::LocalBoxFuture;
use futures::task::{waker, ArcWake};
use futures::FutureExt;
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Handle to a pending timer
    pub struct TimerId;
    /// Handle to a spawned local task
    pub struct TaskId;
}

type Callback = Box<dyn FnOnce()>;

struct Timer {
    deadline: Duration,
    /// Insertion order, breaks deadline ties
    seq: u64,
    callback: Callback,
}

struct SchedulerInner {
    now: Duration,
    next_seq: u64,
    timers: SlotMap<TimerId, Timer>,
    deferred: VecDeque<Callback>,
    /// `None` while the task is being polled
    tasks: SlotMap<TaskId, Option<LocalBoxFuture<'static, ()>>>,
}

/// Queue of tasks whose waker fired since they were last polled
type ReadyQueue = Arc<Mutex<VecDeque<TaskId>>>;

struct TaskWaker {
    id: TaskId,
    ready: ReadyQueue,
}

impl ArcWake for TaskWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        let mut ready = arc_self
            .ready
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !ready.contains(&arc_self.id) {
            ready.push_back(arc_self.id);
        }
    }
}

/// Cheap-to-clone handle to a page's scheduler
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<RefCell<SchedulerInner>>,
    ready: ReadyQueue,
    running: Rc<Cell<bool>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(SchedulerInner {
                now: Duration::ZERO,
                next_seq: 0,
                timers: SlotMap::with_key(),
                deferred: VecDeque::new(),
                tasks: SlotMap::with_key(),
            })),
            ready: Arc::new(Mutex::new(VecDeque::new())),
            running: Rc::new(Cell::new(false)),
        }
    }

    /// Current virtual time
    pub fn now(&self) -> Duration {
        self.inner.borrow().now
    }

    /// Current virtual time in whole milliseconds
    pub fn now_ms(&self) -> u64 {
        self.now().as_millis() as u64
    }

    pub fn downgrade(&self) -> WeakScheduler {
        WeakScheduler {
            inner: Rc::downgrade(&self.inner),
            ready: Arc::clone(&self.ready),
            running: Rc::downgrade(&self.running),
        }
    }

    // =========================================================================
    // TIMERS
    // =========================================================================

    /// Run `callback` once `delay` has elapsed on the virtual clock
    pub fn set_timeout<F>(&self, delay: Duration, callback: F) -> TimerId
    where
        F: FnOnce() + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        let deadline = inner.now + delay;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.timers.insert(Timer {
            deadline,
            seq,
            callback: Box::new(callback),
        })
    }

    /// Cancel a pending timer. Returns false if it already fired or was cleared.
    pub fn clear_timeout(&self, id: TimerId) -> bool {
        let removed = self.inner.borrow_mut().timers.remove(id);
        removed.is_some()
    }

    pub fn pending_timers(&self) -> usize {
        self.inner.borrow().timers.len()
    }

    /// Future that completes once `delay` has elapsed on the virtual clock
    pub fn sleep(&self, delay: Duration) -> Sleep {
        Sleep {
            scheduler: self.downgrade(),
            deadline: self.now() + delay,
            shared: Rc::new(RefCell::new(SleepShared::default())),
            timer: None,
        }
    }

    // =========================================================================
    // DEFERRED HOOKS
    // =========================================================================

    /// Run `callback` after the current turn has settled
    ///
    /// Hooks run in FIFO order. A hook deferred from inside another hook runs
    /// in the same settle pass, after the ones already queued.
    pub fn defer<F>(&self, callback: F)
    where
        F: FnOnce() + 'static,
    {
        self.inner.borrow_mut().deferred.push_back(Box::new(callback));
    }

    pub fn pending_deferred(&self) -> usize {
        self.inner.borrow().deferred.len()
    }

    // =========================================================================
    // LOCAL TASKS
    // =========================================================================

    /// Spawn a `!Send` future on this scheduler
    ///
    /// The task is first polled on the next settle pass.
    pub fn spawn_local<F>(&self, future: F) -> TaskId
    where
        F: Future<Output = ()> + 'static,
    {
        let id = self.inner.borrow_mut().tasks.insert(Some(future.boxed_local()));
        self.push_ready(id);
        id
    }

    /// Drop a task without polling it again. Returns false if it already finished.
    pub fn cancel_task(&self, id: TaskId) -> bool {
        // Dropped outside the borrow: the future may own timers of its own
        let removed = self.inner.borrow_mut().tasks.remove(id);
        removed.is_some()
    }

    pub fn pending_tasks(&self) -> usize {
        self.inner.borrow().tasks.len()
    }

    // =========================================================================
    // DRIVING
    // =========================================================================

    /// Nothing queued, no live tasks, no timers
    pub fn is_idle(&self) -> bool {
        let inner = self.inner.borrow();
        inner.deferred.is_empty() && inner.tasks.is_empty() && inner.timers.is_empty()
    }

    /// Run deferred hooks, woken tasks and due timers until none are left
    ///
    /// Re-entrant calls (from inside a hook, task or timer) return immediately;
    /// the outer pass picks up whatever they queued.
    pub fn run_until_stalled(&self) {
        if self.running.replace(true) {
            return;
        }
        let _running = RunningGuard(Rc::clone(&self.running));

        loop {
            let mut progressed = false;

            while let Some(callback) = self.pop_deferred() {
                callback();
                progressed = true;
            }

            while let Some(id) = self.pop_ready() {
                progressed |= self.poll_task(id);
            }

            if let Some(callback) = self.take_due_timer() {
                callback();
                progressed = true;
            }

            if !progressed {
                break;
            }
        }
    }

    /// Move the virtual clock forward, firing every timer that falls due
    ///
    /// Timers fire in deadline order (ties in creation order) and observe
    /// `now()` equal to their own deadline, so timers scheduled from inside a
    /// callback fire within the same call if they fall before the target.
    pub fn advance(&self, delta: Duration) {
        if self.running.get() {
            tracing::warn!("Scheduler::advance called from inside a scheduled callback; ignored");
            return;
        }

        let target = self.now() + delta;
        self.run_until_stalled();

        while let Some(deadline) = self.next_deadline_within(target) {
            self.set_now(deadline);
            self.run_until_stalled();
        }

        self.set_now(target);
        self.run_until_stalled();
    }

    fn set_now(&self, time: Duration) {
        let mut inner = self.inner.borrow_mut();
        if time > inner.now {
            inner.now = time;
        }
    }

    fn next_deadline_within(&self, limit: Duration) -> Option<Duration> {
        self.inner
            .borrow()
            .timers
            .values()
            .map(|t| t.deadline)
            .filter(|deadline| *deadline <= limit)
            .min()
    }

    fn pop_deferred(&self) -> Option<Callback> {
        self.inner.borrow_mut().deferred.pop_front()
    }

    fn push_ready(&self, id: TaskId) {
        self.ready
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(id);
    }

    fn pop_ready(&self) -> Option<TaskId> {
        self.ready
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    fn take_due_timer(&self) -> Option<Callback> {
        let mut inner = self.inner.borrow_mut();
        let now = inner.now;
        let id = inner
            .timers
            .iter()
            .filter(|(_, timer)| timer.deadline <= now)
            .min_by_key(|(_, timer)| (timer.deadline, timer.seq))
            .map(|(id, _)| id)?;
        inner.timers.remove(id).map(|timer| timer.callback)
    }

    /// Poll one task. Returns false if the task no longer exists.
    fn poll_task(&self, id: TaskId) -> bool {
        let future = {
            let mut inner = self.inner.borrow_mut();
            inner.tasks.get_mut(id).and_then(Option::take)
        };
        let Some(mut future) = future else {
            return false;
        };

        let waker = waker(Arc::new(TaskWaker {
            id,
            ready: Arc::clone(&self.ready),
        }));
        let mut cx = Context::from_waker(&waker);

        match future.as_mut().poll(&mut cx) {
            Poll::Ready(()) => {
                let finished = self.inner.borrow_mut().tasks.remove(id);
                drop(finished);
            }
            Poll::Pending => {
                let mut inner = self.inner.borrow_mut();
                if let Some(slot) = inner.tasks.get_mut(id) {
                    *slot = Some(future);
                    return true;
                }
                // Cancelled while it was being polled
                drop(inner);
                drop(future);
            }
        }
        true
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Scheduler")
            .field("now", &inner.now)
            .field("timers", &inner.timers.len())
            .field("deferred", &inner.deferred.len())
            .field("tasks", &inner.tasks.len())
            .finish()
    }
}

struct RunningGuard(Rc<Cell<bool>>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Non-owning scheduler handle, for futures and callbacks stored inside the
/// scheduler itself
#[derive(Clone)]
pub struct WeakScheduler {
    inner: Weak<RefCell<SchedulerInner>>,
    ready: ReadyQueue,
    running: Weak<Cell<bool>>,
}

impl WeakScheduler {
    pub fn upgrade(&self) -> Option<Scheduler> {
        Some(Scheduler {
            inner: self.inner.upgrade()?,
            ready: Arc::clone(&self.ready),
            running: self.running.upgrade()?,
        })
    }
}

#[derive(Default)]
struct SleepShared {
    fired: bool,
    waker: Option<Waker>,
}

/// Future returned by [`Scheduler::sleep`]
///
/// Completes immediately if the scheduler has been dropped.
pub struct Sleep {
    scheduler: WeakScheduler,
    deadline: Duration,
    shared: Rc<RefCell<SleepShared>>,
    timer: Option<TimerId>,
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        let Some(scheduler) = this.scheduler.upgrade() else {
            return Poll::Ready(());
        };

        let now = scheduler.now();
        if this.shared.borrow().fired || now >= this.deadline {
            return Poll::Ready(());
        }

        this.shared.borrow_mut().waker = Some(cx.waker().clone());
        if this.timer.is_none() {
            let shared = Rc::clone(&this.shared);
            this.timer = Some(scheduler.set_timeout(this.deadline - now, move || {
                let waker = {
                    let mut shared = shared.borrow_mut();
                    shared.fired = true;
                    shared.waker.take()
                };
                if let Some(waker) = waker {
                    waker.wake();
                }
            }));
        }
        Poll::Pending
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        if let (Some(id), Some(scheduler)) = (self.timer.take(), self.scheduler.upgrade()) {
            scheduler.clear_timeout(id);
        }
    }
}
