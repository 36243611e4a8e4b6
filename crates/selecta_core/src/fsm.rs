//! State machine runtime
//!
//! Flat, typed state machines for widget interaction states. Transitions are
//! pure data: `send` returns the [`Step`] that was taken and the caller runs
//! whatever entry/exit work that step implies. Guards are plain functions of a
//! caller-supplied context, so a machine never captures widget state.
//!
//! ```ignore
//! #[derive(Clone, Copy, Debug, PartialEq, Eq)]
//! enum Phase { Closed, Open }
//! #[derive(Clone, Copy, Debug, PartialEq, Eq)]
//! enum Trigger { Toggle, Escape }
//!
//! let mut fsm = StateMachine::<Phase, Trigger, bool>::builder(Phase::Closed)
//!     .guarded(Phase::Closed, Trigger::Toggle, Phase::Open, |disabled| !disabled)
//!     .on(Phase::Open, Trigger::Toggle, Phase::Closed)
//!     .on(Phase::Open, Trigger::Escape, Phase::Closed)
//!     .build();
//!
//! assert!(fsm.send(Trigger::Toggle, &false).is_some());
//! ```

use std::collections::VecDeque;
use std::fmt::Debug;

use smallvec::SmallVec;

/// Transitions kept for debugging
const HISTORY_LIMIT: usize = 32;

/// Guard evaluated against the caller's context
pub type Guard<C> = fn(&C) -> bool;

/// A transition rule
pub struct Transition<S, E, C> {
    pub from: S,
    pub event: E,
    pub to: S,
    pub guard: Option<Guard<C>>,
}

/// A transition that was taken
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Step<S, E> {
    pub from: S,
    pub event: E,
    pub to: S,
}

impl<S: PartialEq, E> Step<S, E> {
    /// Whether the step changed state (self-transitions don't)
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Builder for [`StateMachine`]
pub struct StateMachineBuilder<S, E, C = ()> {
    initial: S,
    transitions: SmallVec<[Transition<S, E, C>; 8]>,
}

impl<S, E, C> StateMachineBuilder<S, E, C>
where
    S: Copy + PartialEq + Debug,
    E: Copy + PartialEq + Debug,
{
    pub fn new(initial: S) -> Self {
        Self {
            initial,
            transitions: SmallVec::new(),
        }
    }

    /// Add an unconditional transition
    pub fn on(mut self, from: S, event: E, to: S) -> Self {
        self.transitions.push(Transition {
            from,
            event,
            to,
            guard: None,
        });
        self
    }

    /// Add a transition that only fires when `guard` holds
    pub fn guarded(mut self, from: S, event: E, to: S, guard: Guard<C>) -> Self {
        self.transitions.push(Transition {
            from,
            event,
            to,
            guard: Some(guard),
        });
        self
    }

    /// The same event moves every state in `from` to `to`
    pub fn on_any(mut self, from: &[S], event: E, to: S) -> Self {
        for state in from {
            self = self.on(*state, event, to);
        }
        self
    }

    pub fn build(self) -> StateMachine<S, E, C> {
        StateMachine {
            current: self.initial,
            transitions: self.transitions,
            history: VecDeque::new(),
        }
    }
}

/// A state machine instance
pub struct StateMachine<S, E, C = ()> {
    current: S,
    transitions: SmallVec<[Transition<S, E, C>; 8]>,
    history: VecDeque<Step<S, E>>,
}

impl<S, E, C> StateMachine<S, E, C>
where
    S: Copy + PartialEq + Debug,
    E: Copy + PartialEq + Debug,
{
    pub fn builder(initial: S) -> StateMachineBuilder<S, E, C> {
        StateMachineBuilder::new(initial)
    }

    pub fn current(&self) -> S {
        self.current
    }

    pub fn is_in(&self, state: S) -> bool {
        self.current == state
    }

    /// Most recent transitions, oldest first
    pub fn history(&self) -> impl Iterator<Item = &Step<S, E>> {
        self.history.iter()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Whether `event` would trigger a transition right now
    pub fn can_send(&self, event: E, ctx: &C) -> bool {
        self.find(event, ctx).is_some()
    }

    /// Take the first matching transition, if any
    pub fn send(&mut self, event: E, ctx: &C) -> Option<Step<S, E>> {
        let to = self.find(event, ctx)?.to;
        let step = Step {
            from: self.current,
            event,
            to,
        };
        self.current = to;

        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(step);
        tracing::trace!(from = ?step.from, event = ?event, to = ?step.to, "fsm transition");
        Some(step)
    }

    fn find(&self, event: E, ctx: &C) -> Option<&Transition<S, E, C>> {
        self.transitions.iter().find(|t| {
            t.from == self.current && t.event == event && t.guard.map_or(true, |guard| guard(ctx))
        })
    }
}

impl<S: Debug, E, C> Debug for StateMachine<S, E, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachine")
            .field("current", &self.current)
            .field("transitions", &self.transitions.len())
            .finish()
    }
}
