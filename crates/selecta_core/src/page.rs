//! Headless page
//!
//! A `Page` is the document a widget lives in: a tree of nodes, the focused
//! node, per-node event handlers and page-level listeners. Input is fed in
//! through high-level methods (`click`, `key_down`, `input`, ...) that mimic
//! what a browser or windowing backend would dispatch, including the default
//! actions (focus follows pointer down, Tab moves focus).
//!
//! Every top-level input is one *turn*: the event is dispatched, then the
//! page's [`Scheduler`] runs deferred hooks, woken tasks and due timers until
//! nothing is left.
//!
//! # Example
//!
//! ```ignore
//! let page = Page::new();
//! let button = page.add_node(page.root(), Focusable::Tabbable)?;
//! page.on(button, event_types::CLICK, |_| println!("clicked"))?;
//! page.click(button)?;
//! ```

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use indexmap::IndexMap;
use rustc_hash::{FxBuildHasher, FxHashMap, FxHashSet};
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use thiserror::Error;

use crate::events::{event_types, Event, EventData, EventType, FocusOrigin, KeyCode, Modifiers, MouseButton};
use crate::registry::OpenRegistry;
use crate::scheduler::Scheduler;

new_key_type! {
    /// Node identifier
    pub struct NodeId;
}

/// Handle to a page-level listener
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Event handler callback
pub type Handler = Rc<dyn Fn(&mut Event)>;

/// Errors from page operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PageError {
    #[error("node {0:?} does not exist")]
    UnknownNode(NodeId),
    #[error("the page root cannot be removed")]
    RemoveRoot,
    #[error("no node has focus")]
    NoFocus,
}

/// How a node takes part in focus
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Focusable {
    /// Never receives focus
    #[default]
    None,
    /// Focusable by pointer and code, skipped by Tab (`tabindex="-1"`)
    Programmatic,
    /// In the Tab order
    Tabbable,
}

#[derive(Default)]
struct Node {
    parent: Option<NodeId>,
    children: SmallVec<[NodeId; 4]>,
    focusable: Focusable,
    disabled: bool,
}

struct PageInner {
    nodes: SlotMap<NodeId, Node>,
    root: NodeId,
    focused: Option<NodeId>,
    handlers: FxHashMap<(NodeId, EventType), SmallVec<[Handler; 2]>>,
    /// Insertion-ordered page-level listeners
    listeners: IndexMap<ListenerId, (EventType, Handler), FxBuildHasher>,
    next_listener: u64,
}

impl PageInner {
    fn node(&self, id: NodeId) -> Result<&Node, PageError> {
        self.nodes.get(id).ok_or(PageError::UnknownNode(id))
    }

    /// Target first, root last
    fn path(&self, id: NodeId) -> SmallVec<[NodeId; 8]> {
        let mut path = SmallVec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let Some(node) = self.nodes.get(node_id) else {
                break;
            };
            path.push(node_id);
            current = node.parent;
        }
        path
    }

    /// Disabled itself or through an ancestor
    fn is_disabled(&self, id: NodeId) -> bool {
        self.path(id)
            .iter()
            .any(|n| self.nodes.get(*n).is_some_and(|node| node.disabled))
    }

    fn can_focus(&self, id: NodeId) -> bool {
        self.nodes
            .get(id)
            .is_some_and(|node| node.focusable != Focusable::None)
            && !self.is_disabled(id)
    }

    fn focusable_ancestor(&self, id: NodeId) -> Option<NodeId> {
        self.path(id).into_iter().find(|n| self.can_focus(*n))
    }

    /// Tabbable nodes in document order
    fn tab_order(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            if node.focusable == Focusable::Tabbable && !self.is_disabled(id) {
                order.push(id);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        order
    }

    fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(node_id) = stack.pop() {
            if let Some(node) = self.nodes.get(node_id) {
                out.push(node_id);
                stack.extend(node.children.iter().copied());
            }
        }
        out
    }
}

struct PageShared {
    inner: RefCell<PageInner>,
    scheduler: Scheduler,
    registry: OpenRegistry,
    /// Nesting depth of input methods; the scheduler runs when it returns to 0
    depth: Cell<u32>,
}

/// Cheap-to-clone handle to a headless page
#[derive(Clone)]
pub struct Page {
    shared: Rc<PageShared>,
}

/// Non-owning page handle
#[derive(Clone)]
pub struct WeakPage {
    shared: Weak<PageShared>,
}

impl WeakPage {
    pub fn upgrade(&self) -> Option<Page> {
        self.shared.upgrade().map(|shared| Page { shared })
    }
}

impl Page {
    /// New page using this thread's global [`OpenRegistry`]
    pub fn new() -> Self {
        Self::with_registry(OpenRegistry::global())
    }

    /// New page with its own open-instance registry
    pub fn with_registry(registry: OpenRegistry) -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node::default());
        Self {
            shared: Rc::new(PageShared {
                inner: RefCell::new(PageInner {
                    nodes,
                    root,
                    focused: None,
                    handlers: FxHashMap::default(),
                    listeners: IndexMap::default(),
                    next_listener: 0,
                }),
                scheduler: Scheduler::new(),
                registry,
                depth: Cell::new(0),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakPage {
        WeakPage {
            shared: Rc::downgrade(&self.shared),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.shared.scheduler
    }

    pub fn registry(&self) -> &OpenRegistry {
        &self.shared.registry
    }

    pub fn root(&self) -> NodeId {
        self.shared.inner.borrow().root
    }

    pub fn focused(&self) -> Option<NodeId> {
        self.shared.inner.borrow().focused
    }

    pub fn now(&self) -> Duration {
        self.shared.scheduler.now()
    }

    /// Advance the virtual clock, firing due timers and resuming woken tasks
    pub fn advance(&self, delta: Duration) {
        self.shared.scheduler.advance(delta);
    }

    // =========================================================================
    // TREE
    // =========================================================================

    pub fn add_node(&self, parent: NodeId, focusable: Focusable) -> Result<NodeId, PageError> {
        let mut inner = self.shared.inner.borrow_mut();
        inner.node(parent)?;
        let id = inner.nodes.insert(Node {
            parent: Some(parent),
            focusable,
            ..Node::default()
        });
        if let Some(parent_node) = inner.nodes.get_mut(parent) {
            parent_node.children.push(id);
        }
        Ok(id)
    }

    /// Remove a node, its descendants and their handlers
    ///
    /// If focus was inside the removed subtree it is cleared without
    /// dispatching BLUR.
    pub fn remove_node(&self, id: NodeId) -> Result<(), PageError> {
        // Handlers are dropped after the borrow ends; they may own widget state
        let removed_handlers = {
            let mut inner = self.shared.inner.borrow_mut();
            if id == inner.root {
                return Err(PageError::RemoveRoot);
            }
            let parent = inner.node(id)?.parent;

            let subtree: FxHashSet<NodeId> = inner.subtree(id).into_iter().collect();
            if inner.focused.is_some_and(|f| subtree.contains(&f)) {
                tracing::trace!(?id, "focused node removed, clearing focus");
                inner.focused = None;
            }
            if let Some(parent_node) = parent.and_then(|p| inner.nodes.get_mut(p)) {
                parent_node.children.retain(|child| *child != id);
            }
            for node in &subtree {
                inner.nodes.remove(*node);
            }

            let keys: Vec<_> = inner
                .handlers
                .keys()
                .filter(|(node, _)| subtree.contains(node))
                .copied()
                .collect();
            keys.into_iter()
                .filter_map(|key| inner.handlers.remove(&key))
                .collect::<Vec<_>>()
        };
        drop(removed_handlers);
        Ok(())
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.shared.inner.borrow().nodes.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.shared.inner.borrow().nodes.len()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.shared.inner.borrow().nodes.get(id)?.parent
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.shared
            .inner
            .borrow()
            .nodes
            .get(id)
            .map(|node| node.children.to_vec())
            .unwrap_or_default()
    }

    /// Whether `node` is `ancestor` or one of its descendants
    pub fn is_within(&self, node: NodeId, ancestor: NodeId) -> bool {
        self.shared.inner.borrow().path(node).contains(&ancestor)
    }

    pub fn set_disabled(&self, id: NodeId, disabled: bool) -> Result<(), PageError> {
        let mut inner = self.shared.inner.borrow_mut();
        let node = inner.nodes.get_mut(id).ok_or(PageError::UnknownNode(id))?;
        node.disabled = disabled;
        Ok(())
    }

    pub fn is_disabled(&self, id: NodeId) -> bool {
        self.shared.inner.borrow().is_disabled(id)
    }

    // =========================================================================
    // HANDLERS & LISTENERS
    // =========================================================================

    /// Attach a handler to a node. Handlers live until the node is removed.
    pub fn on<F>(&self, id: NodeId, event_type: EventType, handler: F) -> Result<(), PageError>
    where
        F: Fn(&mut Event) + 'static,
    {
        let mut inner = self.shared.inner.borrow_mut();
        inner.node(id)?;
        inner
            .handlers
            .entry((id, event_type))
            .or_default()
            .push(Rc::new(handler));
        Ok(())
    }

    /// Attach a page-level listener, invoked after an event bubbled to the root
    pub fn add_listener<F>(&self, event_type: EventType, handler: F) -> ListenerId
    where
        F: Fn(&mut Event) + 'static,
    {
        let mut inner = self.shared.inner.borrow_mut();
        let id = ListenerId(inner.next_listener);
        inner.next_listener += 1;
        inner.listeners.insert(id, (event_type, Rc::new(handler)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let removed = self.shared.inner.borrow_mut().listeners.shift_remove(&id);
        removed.is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.shared.inner.borrow().listeners.len()
    }

    pub fn handler_count(&self) -> usize {
        self.shared
            .inner
            .borrow()
            .handlers
            .values()
            .map(SmallVec::len)
            .sum()
    }

    // =========================================================================
    // INPUT
    // =========================================================================

    /// Press the primary pointer button on `target`
    ///
    /// Unless a handler prevents the default action, focus moves to the
    /// nearest focusable ancestor of the target, or is cleared if none.
    pub fn pointer_down(&self, target: NodeId) -> Result<(), PageError> {
        self.turn(|| {
            self.ensure(target)?;
            let event = self.dispatch(Event::new(
                event_types::POINTER_DOWN,
                target,
                EventData::Pointer {
                    button: MouseButton::Left,
                },
            ));
            if !event.default_prevented && self.contains_node(target) {
                let next = self.shared.inner.borrow().focusable_ancestor(target);
                self.set_focus(next, FocusOrigin::Pointer);
            }
            Ok(())
        })
    }

    /// Pointer down, pointer up and CLICK on `target`
    ///
    /// CLICK is not dispatched to disabled nodes.
    pub fn click(&self, target: NodeId) -> Result<(), PageError> {
        self.turn(|| {
            self.pointer_down(target)?;
            if !self.contains_node(target) {
                return Ok(());
            }
            let pointer = EventData::Pointer {
                button: MouseButton::Left,
            };
            self.dispatch(Event::new(event_types::POINTER_UP, target, pointer.clone()));
            if self.contains_node(target) && !self.is_disabled(target) {
                self.dispatch(Event::new(event_types::CLICK, target, pointer));
            }
            Ok(())
        })
    }

    /// Pointer moves onto `target`
    pub fn hover(&self, target: NodeId) -> Result<(), PageError> {
        self.turn(|| {
            self.ensure(target)?;
            self.dispatch(Event::new(event_types::POINTER_ENTER, target, EventData::None));
            Ok(())
        })
    }

    /// Key press delivered to the focused node (the root if nothing is focused)
    pub fn key_down(&self, key: KeyCode) {
        self.key_down_with(key, Modifiers::NONE);
    }

    /// Key press with modifiers. An unprevented Tab moves focus.
    pub fn key_down_with(&self, key: KeyCode, modifiers: Modifiers) {
        self.turn(|| {
            let target = self.focused().unwrap_or_else(|| self.root());
            let event = self.dispatch(Event::new(
                event_types::KEY_DOWN,
                target,
                EventData::Key {
                    key,
                    modifiers,
                    repeat: false,
                },
            ));
            if key == KeyCode::TAB && !event.default_prevented {
                self.move_focus(modifiers.shift());
            }
        });
    }

    /// Tab to the next tabbable node
    pub fn tab(&self) {
        self.key_down(KeyCode::TAB);
    }

    /// Shift+Tab to the previous tabbable node
    pub fn shift_tab(&self) {
        self.key_down_with(KeyCode::TAB, Modifiers::new(true, false, false, false));
    }

    /// Replace the value of the focused text field
    pub fn input(&self, value: &str) -> Result<(), PageError> {
        self.turn(|| {
            let target = self.focused().ok_or(PageError::NoFocus)?;
            self.dispatch(Event::new(
                event_types::INPUT,
                target,
                EventData::Input {
                    value: value.to_string(),
                },
            ));
            Ok(())
        })
    }

    /// Move focus to `target`
    ///
    /// Ignored for nodes that cannot take focus.
    pub fn focus(&self, target: NodeId, origin: FocusOrigin) -> Result<(), PageError> {
        self.turn(|| {
            self.ensure(target)?;
            if self.shared.inner.borrow().can_focus(target) {
                self.set_focus(Some(target), origin);
            }
            Ok(())
        })
    }

    /// Clear focus, dispatching BLUR to the focused node
    pub fn blur(&self) {
        self.turn(|| self.set_focus(None, FocusOrigin::Programmatic));
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn ensure(&self, id: NodeId) -> Result<(), PageError> {
        self.shared.inner.borrow().node(id).map(|_| ())
    }

    /// Run `f` as one turn
    ///
    /// When the outermost turn ends the scheduler runs until stalled. Nested
    /// calls (from inside handlers or scheduled callbacks) just run `f`.
    pub fn turn<R>(&self, f: impl FnOnce() -> R) -> R {
        let depth = &self.shared.depth;
        depth.set(depth.get() + 1);
        let result = f();
        depth.set(depth.get() - 1);
        if depth.get() == 0 {
            self.shared.scheduler.run_until_stalled();
        }
        result
    }

    fn move_focus(&self, reverse: bool) {
        let next = {
            let inner = self.shared.inner.borrow();
            let order = inner.tab_order();
            if order.is_empty() {
                return;
            }
            let current = inner
                .focused
                .and_then(|f| order.iter().position(|n| *n == f));
            let index = match (current, reverse) {
                (None, false) => 0,
                (None, true) => order.len() - 1,
                (Some(i), false) => (i + 1) % order.len(),
                (Some(i), true) => (i + order.len() - 1) % order.len(),
            };
            order[index]
        };
        self.set_focus(Some(next), FocusOrigin::Keyboard);
    }

    /// BLUR on the old node (bubbling), then FOCUS on the new one
    fn set_focus(&self, next: Option<NodeId>, origin: FocusOrigin) {
        let previous = self.focused();
        if previous == next {
            return;
        }
        tracing::trace!(?previous, ?next, ?origin, "focus change");

        if let Some(prev) = previous {
            self.shared.inner.borrow_mut().focused = None;
            self.dispatch(Event::new(
                event_types::BLUR,
                prev,
                EventData::Focus {
                    origin,
                    related: next,
                },
            ));
        }

        let Some(next) = next else {
            return;
        };
        // A BLUR handler may have removed the node or moved focus itself
        if !self.contains_node(next) || self.focused().is_some() {
            return;
        }
        self.shared.inner.borrow_mut().focused = Some(next);
        self.dispatch(Event::new(
            event_types::FOCUS,
            next,
            EventData::Focus {
                origin,
                related: previous,
            },
        ));
    }

    fn handlers_for(&self, id: NodeId, event_type: EventType) -> SmallVec<[Handler; 2]> {
        self.shared
            .inner
            .borrow()
            .handlers
            .get(&(id, event_type))
            .cloned()
            .unwrap_or_default()
    }

    fn listeners_for(&self, event_type: EventType) -> SmallVec<[Handler; 4]> {
        self.shared
            .inner
            .borrow()
            .listeners
            .values()
            .filter(|(ty, _)| *ty == event_type)
            .map(|(_, handler)| Rc::clone(handler))
            .collect()
    }

    /// Deliver an event along its path
    ///
    /// Handlers are collected before they run, so they may freely mutate the
    /// page (add/remove nodes, move focus, dispatch nested events).
    fn dispatch(&self, mut event: Event) -> Event {
        event.path = self.shared.inner.borrow().path(event.target);
        event.timestamp = self.shared.scheduler.now_ms();

        let bubbles = bubbles(event.event_type);
        let path = event.path.clone();
        let stops = if bubbles { path.len() } else { path.len().min(1) };

        for &node in path.iter().take(stops) {
            let handlers = self.handlers_for(node, event.event_type);
            if handlers.is_empty() {
                continue;
            }
            event.current_target = node;
            for handler in handlers {
                handler(&mut event);
            }
            if event.propagation_stopped {
                return event;
            }
        }

        if bubbles {
            event.current_target = self.root();
            for listener in self.listeners_for(event.event_type) {
                listener(&mut event);
            }
        }
        event
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.inner.borrow();
        f.debug_struct("Page")
            .field("nodes", &inner.nodes.len())
            .field("focused", &inner.focused)
            .field("listeners", &inner.listeners.len())
            .field("scheduler", &self.shared.scheduler)
            .finish()
    }
}

/// FOCUS and POINTER_ENTER stay on their target, everything else bubbles
fn bubbles(event_type: EventType) -> bool {
    !matches!(event_type, event_types::FOCUS | event_types::POINTER_ENTER)
}
