//! Combobox component - searchable single selection
//!
//! A trigger button that opens a panel with an optional search field and a
//! listbox of options. The selection is controlled: the host passes the
//! current value in and receives the user's pick through `on_change`.
//!
//! Behavior:
//! - Opens on trigger click, ArrowDown/Enter/Space on the trigger, or keyboard
//!   (Tab) focus on the trigger
//! - Closes on Escape, a pointer down outside, focus leaving the widget, another
//!   combobox on the page opening, or committing a selection
//! - Search input is debounced; async search results are applied only if no
//!   newer search was started in the meantime
//!
//! # Example
//!
//! ```ignore
//! use selecta_cn::prelude::*;
//!
//! let page = Page::new();
//! let city = cn::combobox(cities.clone())
//!     .placeholder("Select your city")
//!     .debounce(Duration::from_millis(150))
//!     .mount(&page, page.root(), |city| println!("picked {city}"))?;
//!
//! page.click(city.trigger_node())?;
//! page.input("lv")?;
//! page.advance(Duration::from_millis(150));
//! assert_eq!(city.view().labels(), vec!["Lviv"]);
//! ```

pub mod search;
pub mod view;

#[cfg(test)]
mod tests;

use std::cell::RefCell;
use std::fmt::Display;
use std::rc::{Rc, Weak};
use std::time::Duration;

use selecta_core::{
    event_types, Debounced, Event, FocusOrigin, Focusable, InstanceKey, KeyCode, NodeId,
    OutsideClick, Page, PageError, StateMachine,
};

use crate::settings::ComboboxSettings;

pub use search::{
    filter_by_label, normalize_query, PendingSearch, SearchError, SearchFn, SearchOutcome,
    SearchRequest, SearchResolver, SearchResult,
};
pub use view::{ComboboxView, OptionView, PanelBody, PanelView, SearchView, TriggerView};

/// Derives the display text (and the equality key) of an item
pub type LabelFn<T> = Rc<dyn Fn(&T) -> String>;

/// Custom trigger content, given the current selection
pub type RenderSelectedFn<T> = Rc<dyn Fn(Option<&T>) -> String>;

/// Custom option content
pub type RenderItemFn<T> = Rc<dyn Fn(&ItemContext<'_, T>) -> String>;

type ChangeFn<T> = Rc<dyn Fn(Rc<T>)>;

/// What a custom option renderer gets to see
pub struct ItemContext<'a, T> {
    pub item: &'a T,
    pub index: usize,
    pub active: bool,
    pub selected: bool,
}

/// Open/closed lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Closed,
    Open,
}

/// Everything that can open or close the panel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// Primary click on the trigger
    Toggle,
    /// ArrowDown, Enter or Space while closed
    KeyOpen,
    /// Trigger focused by keyboard navigation
    KeyboardFocus,
    Escape,
    OutsidePointer,
    /// Focus moved outside the widget
    FocusLost,
    /// Another instance on the page opened
    PeerOpened,
    /// A selection was committed with close-on-select
    Commit,
}

struct Guards {
    disabled: bool,
}

fn enabled(guards: &Guards) -> bool {
    !guards.disabled
}

fn machine() -> StateMachine<Phase, Trigger, Guards> {
    StateMachine::builder(Phase::Closed)
        .guarded(Phase::Closed, Trigger::Toggle, Phase::Open, enabled)
        .guarded(Phase::Closed, Trigger::KeyOpen, Phase::Open, enabled)
        .guarded(Phase::Closed, Trigger::KeyboardFocus, Phase::Open, enabled)
        .guarded(Phase::Open, Trigger::Toggle, Phase::Closed, enabled)
        .on(Phase::Open, Trigger::Escape, Phase::Closed)
        .on(Phase::Open, Trigger::OutsidePointer, Phase::Closed)
        .on(Phase::Open, Trigger::FocusLost, Phase::Closed)
        .on(Phase::Open, Trigger::PeerOpened, Phase::Closed)
        .on(Phase::Open, Trigger::Commit, Phase::Closed)
        .build()
}

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Combobox configuration, consumed by [`ComboboxConfig::mount`]
pub struct ComboboxConfig<T: 'static> {
    key: InstanceKey,
    items: Vec<Rc<T>>,
    value: Option<Rc<T>>,
    get_label: LabelFn<T>,
    placeholder: String,
    render_item: Option<RenderItemFn<T>>,
    render_selected: Option<RenderSelectedFn<T>>,
    searchable: bool,
    search_placeholder: String,
    search_fn: Option<SearchFn<T>>,
    disabled: bool,
    close_on_select: bool,
    debounce: Duration,
    class_name: Option<String>,
    dropdown_class_name: Option<String>,
}

impl<T: Display + 'static> ComboboxConfig<T> {
    /// Items labelled with their `Display` output
    #[track_caller]
    pub fn new(items: impl IntoIterator<Item = Rc<T>>) -> Self {
        Self::with_label(items, |item: &T| item.to_string())
    }
}

impl<T: 'static> ComboboxConfig<T> {
    /// Items labelled by `get_label`
    #[track_caller]
    pub fn with_label<F>(items: impl IntoIterator<Item = Rc<T>>, get_label: F) -> Self
    where
        F: Fn(&T) -> String + 'static,
    {
        let settings = ComboboxSettings::default();
        Self {
            key: InstanceKey::new("combobox"),
            items: items.into_iter().collect(),
            value: None,
            get_label: Rc::new(get_label),
            placeholder: settings.placeholder,
            render_item: None,
            render_selected: None,
            searchable: settings.searchable,
            search_placeholder: settings.search_placeholder,
            search_fn: None,
            disabled: settings.disabled,
            close_on_select: settings.close_on_select,
            debounce: Duration::from_millis(settings.debounce_ms),
            class_name: None,
            dropdown_class_name: None,
        }
    }

    /// Use a fixed instance key instead of a generated one
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = InstanceKey::explicit(key);
        self
    }

    /// Initial selection
    pub fn value(mut self, value: Option<Rc<T>>) -> Self {
        self.value = value;
        self
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    pub fn render_item<F>(mut self, render: F) -> Self
    where
        F: Fn(&ItemContext<'_, T>) -> String + 'static,
    {
        self.render_item = Some(Rc::new(render));
        self
    }

    pub fn render_selected<F>(mut self, render: F) -> Self
    where
        F: Fn(Option<&T>) -> String + 'static,
    {
        self.render_selected = Some(Rc::new(render));
        self
    }

    pub fn searchable(mut self, searchable: bool) -> Self {
        self.searchable = searchable;
        self
    }

    pub fn search_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.search_placeholder = placeholder.into();
        self
    }

    /// Replace the built-in label filter
    pub fn search_fn(mut self, search_fn: SearchFn<T>) -> Self {
        self.search_fn = Some(search_fn);
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn close_on_select(mut self, close: bool) -> Self {
        self.close_on_select = close;
        self
    }

    /// How long the query must stay unchanged before it is searched
    pub fn debounce(mut self, delay: Duration) -> Self {
        self.debounce = delay;
        self
    }

    pub fn class_name(mut self, class: impl Into<String>) -> Self {
        self.class_name = Some(class.into());
        self
    }

    pub fn dropdown_class_name(mut self, class: impl Into<String>) -> Self {
        self.dropdown_class_name = Some(class.into());
        self
    }

    /// Apply shared presentation settings
    pub fn settings(mut self, settings: &ComboboxSettings) -> Self {
        self.placeholder = settings.placeholder.clone();
        self.search_placeholder = settings.search_placeholder.clone();
        self.searchable = settings.searchable;
        self.disabled = settings.disabled;
        self.close_on_select = settings.close_on_select;
        self.debounce = settings.debounce();
        if settings.class_name.is_some() {
            self.class_name = settings.class_name.clone();
        }
        if settings.dropdown_class_name.is_some() {
            self.dropdown_class_name = settings.dropdown_class_name.clone();
        }
        self
    }

    /// Create the widget's nodes under `parent` and start listening
    ///
    /// `on_change` receives the very `Rc` the item was supplied as.
    pub fn mount<F>(self, page: &Page, parent: NodeId, on_change: F) -> Result<Combobox<T>, PageError>
    where
        F: Fn(Rc<T>) + 'static,
    {
        let root = page.add_node(parent, Focusable::None)?;
        let trigger = page.add_node(root, Focusable::Tabbable)?;
        page.set_disabled(trigger, self.disabled)?;

        let debounced = Debounced::new(page.scheduler(), String::new(), self.debounce);
        let search = SearchResolver::new(page.scheduler(), &self.items);
        let key = self.key.clone();

        let inner = Rc::new_cyclic(|this| {
            RefCell::new(ComboboxInner {
                this: this.clone(),
                key: self.key,
                page: page.clone(),
                nodes: Nodes {
                    root,
                    trigger,
                    panel: None,
                },
                fsm: machine(),
                items: self.items,
                value: self.value,
                get_label: self.get_label,
                placeholder: self.placeholder,
                render_item: self.render_item,
                render_selected: self.render_selected,
                searchable: self.searchable,
                search_placeholder: self.search_placeholder,
                search_fn: self.search_fn,
                disabled: self.disabled,
                close_on_select: self.close_on_select,
                class_name: self.class_name,
                dropdown_class_name: self.dropdown_class_name,
                on_change: Rc::new(on_change),
                query: String::new(),
                debounced,
                active: None,
                search,
                suppress_focus_open: false,
                outside: None,
                mounted: true,
            })
        });

        let weak = Rc::downgrade(&inner);
        page.on(root, event_types::KEY_DOWN, handler(&weak, on_key_down))?;
        page.on(root, event_types::BLUR, handler(&weak, on_blur))?;
        page.on(trigger, event_types::CLICK, handler(&weak, on_trigger_click))?;
        page.on(trigger, event_types::FOCUS, handler(&weak, on_trigger_focus))?;

        let settle_weak = weak.clone();
        inner.borrow().debounced.on_settle(move |_: &String| {
            if let Some(this) = settle_weak.upgrade() {
                update(&this, |inner, _| inner.run_search());
            }
        });

        let outside = OutsideClick::attach(page, root, close_on(&weak, Trigger::OutsidePointer));
        page.registry()
            .register(key.clone(), close_on(&weak, Trigger::PeerOpened));
        inner.borrow_mut().outside = Some(outside);

        tracing::debug!(instance = %key, "combobox mounted");
        Ok(Combobox { inner })
    }
}

/// Create a combobox over `items`, labelled with their `Display` output
///
/// Chain builder methods, then [`ComboboxConfig::mount`] it on a page.
#[track_caller]
pub fn combobox<T: Display + 'static>(items: impl IntoIterator<Item = Rc<T>>) -> ComboboxConfig<T> {
    ComboboxConfig::new(items)
}

// =============================================================================
// WIDGET STATE
// =============================================================================

struct PanelNodes {
    panel: NodeId,
    search: Option<NodeId>,
    /// Container of the status row or the option rows
    list: NodeId,
    status: Option<NodeId>,
    options: Vec<NodeId>,
    /// Resolver revision the rows were built from
    revision: Option<u64>,
}

struct Nodes {
    root: NodeId,
    trigger: NodeId,
    /// Present only while open
    panel: Option<PanelNodes>,
}

/// Follow-up work that runs after the widget borrow is released
enum Command<T> {
    BroadcastOpened,
    Emit(Rc<T>),
    FocusTrigger,
    DeferFocusSearch,
    DeferRestoreTriggerFocus,
}

type Commands<T> = Vec<Command<T>>;

struct ComboboxInner<T: 'static> {
    this: Weak<RefCell<ComboboxInner<T>>>,
    key: InstanceKey,
    page: Page,
    nodes: Nodes,
    fsm: StateMachine<Phase, Trigger, Guards>,

    // Props
    items: Vec<Rc<T>>,
    value: Option<Rc<T>>,
    get_label: LabelFn<T>,
    placeholder: String,
    render_item: Option<RenderItemFn<T>>,
    render_selected: Option<RenderSelectedFn<T>>,
    searchable: bool,
    search_placeholder: String,
    search_fn: Option<SearchFn<T>>,
    disabled: bool,
    close_on_select: bool,
    class_name: Option<String>,
    dropdown_class_name: Option<String>,
    on_change: ChangeFn<T>,

    // Session
    query: String,
    debounced: Debounced<String>,
    active: Option<usize>,
    search: SearchResolver<T>,
    /// Set right before focus is moved back to the trigger by code
    suppress_focus_open: bool,
    outside: Option<OutsideClick>,
    mounted: bool,
}

impl<T: 'static> ComboboxInner<T> {
    fn label_of(&self, item: &T) -> String {
        (self.get_label)(item)
    }

    fn is_open(&self) -> bool {
        self.fsm.is_in(Phase::Open)
    }

    /// Feed a trigger to the state machine and run the entry work of the new state
    fn transition(&mut self, trigger: Trigger, commands: &mut Commands<T>) -> bool {
        let guards = Guards {
            disabled: self.disabled,
        };
        let Some(step) = self.fsm.send(trigger, &guards) else {
            return false;
        };

        tracing::debug!(instance = %self.key, ?trigger, from = ?step.from, to = ?step.to, "combobox transition");
        match step.to {
            Phase::Open => self.enter_open(commands),
            Phase::Closed => self.enter_closed(trigger, commands),
        }
        true
    }

    fn enter_open(&mut self, commands: &mut Commands<T>) {
        commands.push(Command::BroadcastOpened);
        self.query.clear();
        self.debounced.reset(String::new());
        self.active = None;
        self.search.reset(&self.items);
        if self.searchable {
            commands.push(Command::DeferFocusSearch);
        }
    }

    fn enter_closed(&mut self, trigger: Trigger, commands: &mut Commands<T>) {
        self.debounced.cancel();
        self.search.invalidate();
        if matches!(trigger, Trigger::Escape | Trigger::Commit) {
            self.suppress_focus_open = true;
            commands.push(Command::DeferRestoreTriggerFocus);
        }
    }

    /// Returns whether the key was consumed
    fn handle_key(&mut self, key: KeyCode, commands: &mut Commands<T>) -> bool {
        if !self.is_open() {
            let opens = matches!(key, KeyCode::DOWN | KeyCode::ENTER | KeyCode::SPACE);
            if opens {
                self.transition(Trigger::KeyOpen, commands);
            }
            return opens;
        }

        match key {
            KeyCode::ESCAPE => {
                self.transition(Trigger::Escape, commands);
            }
            KeyCode::DOWN => self.move_active(true),
            KeyCode::UP => self.move_active(false),
            KeyCode::ENTER => {
                if let Some(index) = self.active {
                    self.commit(index, commands);
                }
            }
            _ => return false,
        }
        true
    }

    /// Step the highlight, wrapping at both ends
    fn move_active(&mut self, forward: bool) {
        let len = self.search.results().len();
        if len == 0 {
            return;
        }
        let last = len - 1;
        self.active = Some(match (self.active, forward) {
            (Some(i), true) if i < last => i + 1,
            (_, true) => 0,
            (Some(i), false) if i > 0 && i <= last => i - 1,
            (_, false) => last,
        });
    }

    fn commit(&mut self, index: usize, commands: &mut Commands<T>) {
        let Some(item) = self.search.results().get(index).cloned() else {
            return;
        };
        tracing::debug!(instance = %self.key, index, label = %self.label_of(&item), "combobox commit");

        commands.push(Command::Emit(item));
        if self.close_on_select {
            self.transition(Trigger::Commit, commands);
        } else {
            commands.push(Command::FocusTrigger);
        }
    }

    /// Resolve the settled query against the items
    ///
    /// Results only matter while open; opening resets them anyway.
    fn run_search(&mut self) {
        if !self.is_open() {
            return;
        }
        let query = self.debounced.settled();
        let request = SearchRequest {
            query: &query,
            items: &self.items,
            searchable: self.searchable,
            search_fn: self.search_fn.as_ref(),
            label: &*self.get_label,
        };
        match self.search.resolve(request) {
            None => self.active = None,
            Some(pending) => self.spawn_search(pending),
        }
    }

    fn spawn_search(&mut self, pending: PendingSearch<T>) {
        let PendingSearch { generation, future } = pending;
        let weak = self.this.clone();
        let task = self.page.scheduler().spawn_local(async move {
            let result = future.await;
            if let Some(this) = weak.upgrade() {
                update(&this, |inner, _| {
                    if inner.search.finish(generation, result) && inner.search.last_error().is_none() {
                        inner.active = None;
                    }
                });
            }
        });
        self.search.track(task);
    }

    fn set_items(&mut self, items: Vec<Rc<T>>) {
        self.items = items;
        self.search.reset(&self.items);
        self.active = None;
        self.run_search();
    }

    /// Bring the page nodes in line with the current state
    fn sync_nodes(&mut self) -> Result<(), PageError> {
        let page = self.page.clone();
        let open = self.is_open();

        let stale = self
            .nodes
            .panel
            .as_ref()
            .is_some_and(|panel| !open || panel.search.is_some() != self.searchable);
        if stale {
            if let Some(panel) = self.nodes.panel.take() {
                page.remove_node(panel.panel)?;
            }
        }
        if !open {
            return Ok(());
        }

        if self.nodes.panel.is_none() {
            let panel = page.add_node(self.nodes.root, Focusable::Programmatic)?;
            let search = if self.searchable {
                let search = page.add_node(panel, Focusable::Tabbable)?;
                page.on(search, event_types::INPUT, handler(&self.this, on_search_input))?;
                Some(search)
            } else {
                None
            };
            let list = page.add_node(panel, Focusable::None)?;
            self.nodes.panel = Some(PanelNodes {
                panel,
                search,
                list,
                status: None,
                options: Vec::new(),
                revision: None,
            });
        }

        let revision = self.search.revision();
        let show_status = self.search.is_loading() || self.search.results().is_empty();
        let count = self.search.results().len();
        let Some(panel) = self.nodes.panel.as_mut() else {
            return Ok(());
        };
        if panel.revision == Some(revision) {
            return Ok(());
        }

        page.remove_node(panel.list)?;
        panel.list = page.add_node(panel.panel, Focusable::None)?;
        panel.status = None;
        panel.options.clear();
        if show_status {
            panel.status = Some(page.add_node(panel.list, Focusable::None)?);
        } else {
            for index in 0..count {
                let option = page.add_node(panel.list, Focusable::None)?;
                install_option_handlers(&page, &self.this, option, index)?;
                panel.options.push(option);
            }
        }
        panel.revision = Some(revision);
        Ok(())
    }

    fn view(&self) -> ComboboxView {
        let open = self.is_open();
        let selected_label = self.value.as_ref().map(|value| self.label_of(value));
        let panel_id = self.key.derive("listbox");

        let content = match (&self.render_selected, &self.value) {
            (Some(render), value) => render(value.as_deref()),
            (None, Some(value)) => self.label_of(value),
            (None, None) => self.placeholder.clone(),
        };

        let panel = open.then(|| {
            let body = if self.search.is_loading() {
                PanelBody::loading()
            } else if self.search.results().is_empty() {
                PanelBody::empty()
            } else {
                let options = self
                    .search
                    .results()
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        let label = self.label_of(item);
                        let active = self.active == Some(index);
                        let selected = selected_label.as_deref() == Some(label.as_str());
                        let content = match &self.render_item {
                            Some(render) => render(&ItemContext {
                                item,
                                index,
                                active,
                                selected,
                            }),
                            None => label.clone(),
                        };
                        OptionView {
                            key: format!("{label}{index}"),
                            index,
                            role: "option",
                            label,
                            content,
                            active,
                            selected,
                        }
                    })
                    .collect();
                PanelBody::Options { options }
            };

            let search_node = self.nodes.panel.as_ref().and_then(|panel| panel.search);
            PanelView {
                id: panel_id.clone(),
                class: self.dropdown_class_name.clone(),
                role: "listbox",
                search: self.searchable.then(|| SearchView {
                    value: self.query.clone(),
                    placeholder: self.search_placeholder.clone(),
                    focused: search_node.is_some() && self.page.focused() == search_node,
                }),
                body,
            }
        });

        ComboboxView {
            id: self.key.to_string(),
            class: self.class_name.clone(),
            trigger: TriggerView {
                content,
                is_placeholder: self.value.is_none(),
                expanded: open,
                disabled: self.disabled,
                controls: panel_id,
                has_popup: "listbox",
            },
            panel,
        }
    }

    fn teardown(&mut self) {
        if !self.mounted {
            return;
        }
        self.mounted = false;
        self.page.registry().unregister(&self.key);
        self.outside = None;
        self.debounced.cancel();
        self.search.invalidate();
        self.nodes.panel = None;
        if let Err(err) = self.page.remove_node(self.nodes.root) {
            tracing::debug!(instance = %self.key, %err, "combobox root already gone");
        }
        tracing::debug!(instance = %self.key, "combobox unmounted");
    }
}

impl<T: 'static> Drop for ComboboxInner<T> {
    fn drop(&mut self) {
        self.teardown();
    }
}

// =============================================================================
// DRIVING
// =============================================================================

type Shared<T> = Rc<RefCell<ComboboxInner<T>>>;

/// Mutate the widget, resync its nodes, then run the follow-up commands
fn update<T: 'static>(this: &Shared<T>, f: impl FnOnce(&mut ComboboxInner<T>, &mut Commands<T>)) {
    let mut commands = Vec::new();
    {
        let mut inner = this.borrow_mut();
        if !inner.mounted {
            return;
        }
        f(&mut *inner, &mut commands);
        if let Err(err) = inner.sync_nodes() {
            tracing::warn!(instance = %inner.key, %err, "failed to sync combobox nodes");
        }
    }
    if !commands.is_empty() {
        execute(this, commands);
    }
}

fn execute<T: 'static>(this: &Shared<T>, commands: Commands<T>) {
    let (page, key, trigger, on_change) = {
        let inner = this.borrow();
        (
            inner.page.clone(),
            inner.key.clone(),
            inner.nodes.trigger,
            Rc::clone(&inner.on_change),
        )
    };

    for command in commands {
        match command {
            Command::BroadcastOpened => {
                page.registry().notify_opened(&key);
            }
            Command::Emit(item) => on_change(item),
            Command::FocusTrigger => {
                if let Err(err) = page.focus(trigger, FocusOrigin::Programmatic) {
                    tracing::debug!(instance = %key, %err, "could not focus trigger");
                }
            }
            Command::DeferFocusSearch => {
                let weak = Rc::downgrade(this);
                page.scheduler().defer(move || focus_search(&weak));
            }
            Command::DeferRestoreTriggerFocus => {
                let weak = Rc::downgrade(this);
                page.scheduler().defer(move || restore_trigger_focus(&weak));
            }
        }
    }
}

fn focus_search<T: 'static>(weak: &Weak<RefCell<ComboboxInner<T>>>) {
    let Some(this) = weak.upgrade() else {
        return;
    };
    let target = {
        let inner = this.borrow();
        let search = inner.nodes.panel.as_ref().and_then(|panel| panel.search);
        match search {
            Some(search) if inner.mounted && inner.is_open() => Some((inner.page.clone(), search)),
            _ => None,
        }
    };
    if let Some((page, search)) = target {
        if let Err(err) = page.focus(search, FocusOrigin::Programmatic) {
            tracing::debug!(%err, "could not focus search input");
        }
    }
}

fn restore_trigger_focus<T: 'static>(weak: &Weak<RefCell<ComboboxInner<T>>>) {
    let Some(this) = weak.upgrade() else {
        return;
    };
    let (page, trigger) = {
        let inner = this.borrow();
        if !inner.mounted {
            return;
        }
        (inner.page.clone(), inner.nodes.trigger)
    };

    if page.focused() != Some(trigger) {
        if let Err(err) = page.focus(trigger, FocusOrigin::Programmatic) {
            tracing::debug!(%err, "could not restore trigger focus");
        }
    }
    // Consumed by the FOCUS handler if focus landed; nothing else may consume it
    this.borrow_mut().suppress_focus_open = false;
}

fn handler<T: 'static>(
    weak: &Weak<RefCell<ComboboxInner<T>>>,
    f: fn(&Shared<T>, &mut Event),
) -> impl Fn(&mut Event) + 'static {
    let weak = weak.clone();
    move |event| {
        if let Some(this) = weak.upgrade() {
            f(&this, event);
        }
    }
}

fn close_on<T: 'static>(weak: &Weak<RefCell<ComboboxInner<T>>>, trigger: Trigger) -> impl Fn() + 'static {
    let weak = weak.clone();
    move || {
        if let Some(this) = weak.upgrade() {
            update(&this, |inner, commands| {
                inner.transition(trigger, commands);
            });
        }
    }
}

fn on_key_down<T: 'static>(this: &Shared<T>, event: &mut Event) {
    let Some(key) = event.key() else {
        return;
    };
    let mut handled = false;
    update(this, |inner, commands| handled = inner.handle_key(key, commands));
    if handled {
        event.prevent_default();
    }
}

fn on_blur<T: 'static>(this: &Shared<T>, event: &mut Event) {
    let related = event.related();
    update(this, |inner, commands| {
        let inside = related.is_some_and(|node| inner.page.is_within(node, inner.nodes.root));
        if !inside {
            inner.transition(Trigger::FocusLost, commands);
        }
    });
}

fn on_trigger_click<T: 'static>(this: &Shared<T>, _event: &mut Event) {
    update(this, |inner, commands| {
        inner.transition(Trigger::Toggle, commands);
    });
}

fn on_trigger_focus<T: 'static>(this: &Shared<T>, event: &mut Event) {
    let keyboard = event.focus_origin() == Some(FocusOrigin::Keyboard);
    update(this, |inner, commands| {
        if std::mem::take(&mut inner.suppress_focus_open) {
            return;
        }
        if keyboard {
            inner.transition(Trigger::KeyboardFocus, commands);
        }
    });
}

fn on_search_input<T: 'static>(this: &Shared<T>, event: &mut Event) {
    let Some(value) = event.input_value().map(str::to_string) else {
        return;
    };
    update(this, |inner, _| {
        inner.query = value.clone();
        inner.debounced.set(value);
    });
}

fn install_option_handlers<T: 'static>(
    page: &Page,
    weak: &Weak<RefCell<ComboboxInner<T>>>,
    option: NodeId,
    index: usize,
) -> Result<(), PageError> {
    // Keep focus in the widget until the click lands
    page.on(option, event_types::POINTER_DOWN, |event| event.prevent_default())?;

    let hover = weak.clone();
    page.on(option, event_types::POINTER_ENTER, move |_| {
        if let Some(this) = hover.upgrade() {
            update(&this, |inner, _| {
                if index < inner.search.results().len() {
                    inner.active = Some(index);
                }
            });
        }
    })?;

    let click = weak.clone();
    page.on(option, event_types::CLICK, move |_| {
        if let Some(this) = click.upgrade() {
            update(&this, |inner, commands| inner.commit(index, commands));
        }
    })
}

// =============================================================================
// HANDLE
// =============================================================================

/// A mounted combobox
///
/// Cloning shares the same widget. The widget unmounts when the last handle
/// is dropped or [`Combobox::unmount`] is called.
pub struct Combobox<T: 'static> {
    inner: Shared<T>,
}

impl<T: 'static> Clone for Combobox<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Non-owning combobox handle, e.g. for use inside `on_change`
pub struct WeakCombobox<T: 'static> {
    inner: Weak<RefCell<ComboboxInner<T>>>,
}

impl<T: 'static> Clone for WeakCombobox<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> WeakCombobox<T> {
    pub fn upgrade(&self) -> Option<Combobox<T>> {
        self.inner.upgrade().map(|inner| Combobox { inner })
    }
}

impl<T: 'static> Combobox<T> {
    pub fn downgrade(&self) -> WeakCombobox<T> {
        WeakCombobox {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Apply a prop change as one page turn
    fn apply(&self, f: impl FnOnce(&mut ComboboxInner<T>, &mut Commands<T>)) {
        let page = self.inner.borrow().page.clone();
        page.turn(|| update(&self.inner, f));
    }

    pub fn key(&self) -> InstanceKey {
        self.inner.borrow().key.clone()
    }

    pub fn phase(&self) -> Phase {
        self.inner.borrow().fsm.current()
    }

    pub fn is_open(&self) -> bool {
        self.inner.borrow().is_open()
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.borrow().mounted
    }

    /// Current search text, as typed
    pub fn query(&self) -> String {
        self.inner.borrow().query.clone()
    }

    pub fn active_index(&self) -> Option<usize> {
        self.inner.borrow().active
    }

    pub fn results(&self) -> Vec<Rc<T>> {
        self.inner.borrow().search.results().to_vec()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.borrow().search.is_loading()
    }

    /// Most recent failure of the search function, until a search succeeds
    pub fn last_search_error(&self) -> Option<SearchError> {
        self.inner.borrow().search.last_error().cloned()
    }

    pub fn value(&self) -> Option<Rc<T>> {
        self.inner.borrow().value.clone()
    }

    pub fn items(&self) -> Vec<Rc<T>> {
        self.inner.borrow().items.clone()
    }

    pub fn view(&self) -> ComboboxView {
        self.inner.borrow().view()
    }

    pub fn root_node(&self) -> NodeId {
        self.inner.borrow().nodes.root
    }

    pub fn trigger_node(&self) -> NodeId {
        self.inner.borrow().nodes.trigger
    }

    pub fn panel_node(&self) -> Option<NodeId> {
        self.inner.borrow().nodes.panel.as_ref().map(|panel| panel.panel)
    }

    pub fn search_node(&self) -> Option<NodeId> {
        self.inner
            .borrow()
            .nodes
            .panel
            .as_ref()
            .and_then(|panel| panel.search)
    }

    /// Status row ("Loading…" / "No results"), when shown
    pub fn status_node(&self) -> Option<NodeId> {
        self.inner
            .borrow()
            .nodes
            .panel
            .as_ref()
            .and_then(|panel| panel.status)
    }

    pub fn option_node(&self, index: usize) -> Option<NodeId> {
        self.inner
            .borrow()
            .nodes
            .panel
            .as_ref()
            .and_then(|panel| panel.options.get(index).copied())
    }

    /// Replace the items; results reset to the new list
    pub fn set_items(&self, items: Vec<Rc<T>>) {
        self.apply(|inner, _| inner.set_items(items));
    }

    /// Push the host's current selection
    pub fn set_value(&self, value: Option<Rc<T>>) {
        self.apply(|inner, _| inner.value = value);
    }

    pub fn set_disabled(&self, disabled: bool) {
        self.apply(|inner, _| {
            inner.disabled = disabled;
            if let Err(err) = inner.page.set_disabled(inner.nodes.trigger, disabled) {
                tracing::warn!(instance = %inner.key, %err, "could not disable trigger");
            }
        });
    }

    pub fn set_searchable(&self, searchable: bool) {
        self.apply(|inner, _| {
            if inner.searchable != searchable {
                inner.searchable = searchable;
                inner.run_search();
            }
        });
    }

    /// Swap the search function; re-runs the search unless it is the same function
    pub fn set_search_fn(&self, search_fn: Option<SearchFn<T>>) {
        self.apply(|inner, _| {
            let same = match (&inner.search_fn, &search_fn) {
                (Some(current), Some(next)) => current.same_as(next),
                (None, None) => true,
                _ => false,
            };
            if !same {
                inner.search_fn = search_fn;
                inner.run_search();
            }
        });
    }

    pub fn set_placeholder(&self, placeholder: impl Into<String>) {
        let placeholder = placeholder.into();
        self.apply(|inner, _| inner.placeholder = placeholder);
    }

    /// Remove the widget's nodes, listeners, registration and pending work
    pub fn unmount(&self) {
        self.inner.borrow_mut().teardown();
    }
}

impl<T: 'static> std::fmt::Debug for Combobox<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Combobox")
            .field("key", &inner.key)
            .field("phase", &inner.fsm.current())
            .field("query", &inner.query)
            .field("active", &inner.active)
            .field("results", &inner.search.results().len())
            .field("loading", &inner.search.is_loading())
            .finish()
    }
}
