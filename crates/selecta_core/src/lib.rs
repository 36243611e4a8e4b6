//! Selecta Core Runtime
//!
//! Headless substrate for Selecta widgets:
//!
//! - **Page**: node tree, focus tracking and bubbling event dispatch
//! - **Scheduler**: virtual clock, timers, post-render hooks and a local task executor
//! - **State Machines**: typed transition tables for interaction states
//! - **Coordination**: instance keys, the open-instance registry, debounced values
//!   and outside-interaction detection
//!
//! Everything here is single-threaded (`!Send`) and deterministic: time only
//! moves when the host calls [`Page::advance`].

pub mod debounce;
pub mod events;
pub mod fsm;
pub mod key;
pub mod outside;
pub mod page;
pub mod registry;
pub mod scheduler;

pub use debounce::Debounced;
pub use events::{event_types, Event, EventData, EventType, FocusOrigin, KeyCode, Modifiers, MouseButton};
pub use fsm::{StateMachine, StateMachineBuilder, Step, Transition};
pub use key::InstanceKey;
pub use outside::OutsideClick;
pub use page::{Focusable, Handler, ListenerId, NodeId, Page, PageError, WeakPage};
pub use registry::OpenRegistry;
pub use scheduler::{Scheduler, Sleep, TaskId, TimerId, WeakScheduler};
