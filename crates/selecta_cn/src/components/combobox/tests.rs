//! Interaction tests for the combobox widget
//!
//! Every test drives a fresh page through its public input methods and the
//! scheduler's virtual clock.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use selecta_core::{Focusable, KeyCode, OpenRegistry, Page};

use super::*;

#[derive(Debug, PartialEq)]
struct City {
    id: u32,
    name: &'static str,
}

impl fmt::Display for City {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

fn cities() -> Vec<Rc<City>> {
    ["Kyiv", "Lviv", "Odesa", "Kharkiv"]
        .into_iter()
        .zip(1..)
        .map(|(name, id)| Rc::new(City { id, name }))
        .collect()
}

fn page() -> Page {
    Page::with_registry(OpenRegistry::new())
}

type Picks = Rc<RefCell<Vec<Rc<City>>>>;

/// Mount with a recording `on_change`
fn mount(page: &Page, config: ComboboxConfig<City>) -> (Combobox<City>, Picks) {
    let picks: Picks = Rc::default();
    let sink = picks.clone();
    let combobox = config
        .mount(page, page.root(), move |city| sink.borrow_mut().push(city))
        .unwrap();
    (combobox, picks)
}

fn open(page: &Page, combobox: &Combobox<City>) {
    page.click(combobox.trigger_node()).unwrap();
    assert!(combobox.is_open());
}

fn type_query(page: &Page, query: &str) {
    page.input(query).unwrap();
    page.advance(Duration::from_millis(200));
}

fn names(combobox: &Combobox<City>) -> Vec<&'static str> {
    combobox.results().iter().map(|c| c.name).collect()
}

// =========================================================================
// OPENING AND CLOSING
// =========================================================================

#[test]
fn test_click_opens_and_focuses_search() {
    let page = page();
    let (combobox, _) = mount(&page, combobox(cities()));

    assert_eq!(combobox.phase(), Phase::Closed);
    assert!(combobox.panel_node().is_none());

    open(&page, &combobox);
    assert!(combobox.panel_node().is_some());
    assert_eq!(page.focused(), combobox.search_node());
    assert_eq!(names(&combobox), vec!["Kyiv", "Lviv", "Odesa", "Kharkiv"]);
}

#[test]
fn test_trigger_click_toggles() {
    let page = page();
    let (combobox, _) = mount(&page, combobox(cities()));

    open(&page, &combobox);
    page.click(combobox.trigger_node()).unwrap();
    assert!(!combobox.is_open());
    assert!(combobox.panel_node().is_none());
}

#[test]
fn test_open_keys_on_trigger() {
    for key in [KeyCode::DOWN, KeyCode::ENTER, KeyCode::SPACE] {
        let page = page();
        let (combobox, _) = mount(&page, combobox(cities()).searchable(false));
        page.pointer_down(combobox.trigger_node()).unwrap();
        assert!(!combobox.is_open(), "pointer focus must not open");

        page.key_down(key);
        assert!(combobox.is_open(), "{key:?} should open");
    }
}

#[test]
fn test_other_keys_do_not_open() {
    let page = page();
    let (combobox, _) = mount(&page, combobox(cities()));
    page.pointer_down(combobox.trigger_node()).unwrap();

    page.key_down(KeyCode::UP);
    page.key_down(KeyCode::ESCAPE);
    assert!(!combobox.is_open());
}

#[test]
fn test_keyboard_focus_opens() {
    let page = page();
    let (combobox, _) = mount(&page, combobox(cities()));

    page.tab();
    assert!(combobox.is_open());
    assert_eq!(page.focused(), combobox.search_node());
}

#[test]
fn test_programmatic_focus_does_not_open() {
    let page = page();
    let (combobox, _) = mount(&page, combobox(cities()));

    page.focus(combobox.trigger_node(), FocusOrigin::Programmatic).unwrap();
    assert!(!combobox.is_open());
}

#[test]
fn test_escape_closes_and_restores_trigger_focus() {
    let page = page();
    let (combobox, _) = mount(&page, combobox(cities()));
    let next = page.add_node(page.root(), Focusable::Tabbable).unwrap();
    open(&page, &combobox);

    page.key_down(KeyCode::ESCAPE);
    assert!(!combobox.is_open());
    // Focus returns to the trigger without reopening the panel
    assert_eq!(page.focused(), Some(combobox.trigger_node()));
    assert_eq!(page.scheduler().pending_deferred(), 0);

    // The suppress flag is spent: the next keyboard focus opens again
    page.tab();
    assert_eq!(page.focused(), Some(next));
    page.shift_tab();
    assert!(combobox.is_open());
}

#[test]
fn test_outside_pointer_closes() {
    let page = page();
    let (combobox, _) = mount(&page, combobox(cities()));
    let outside = page.add_node(page.root(), Focusable::None).unwrap();
    open(&page, &combobox);

    page.pointer_down(combobox.panel_node().unwrap()).unwrap();
    assert!(combobox.is_open());

    page.pointer_down(outside).unwrap();
    assert!(!combobox.is_open());
    assert_eq!(page.focused(), None);
}

#[test]
fn test_focus_leaving_closes() {
    let page = page();
    let (combobox, _) = mount(&page, combobox(cities()));
    let next = page.add_node(page.root(), Focusable::Tabbable).unwrap();
    open(&page, &combobox);

    // search -> next field
    page.tab();
    assert!(!combobox.is_open());
    assert_eq!(page.focused(), Some(next));
}

#[test]
fn test_blur_to_nothing_closes() {
    let page = page();
    let (combobox, _) = mount(&page, combobox(cities()));
    open(&page, &combobox);

    page.blur();
    assert!(!combobox.is_open());
}

#[test]
fn test_disabled_ignores_open_triggers() {
    let page = page();
    let (combobox, _) = mount(&page, combobox(cities()).disabled(true));

    page.click(combobox.trigger_node()).unwrap();
    page.tab();
    page.key_down(KeyCode::ENTER);
    assert!(!combobox.is_open());
    assert!(combobox.view().trigger.disabled);

    combobox.set_disabled(false);
    page.click(combobox.trigger_node()).unwrap();
    assert!(combobox.is_open());
}

// =========================================================================
// OPEN RESETS
// =========================================================================

#[test]
fn test_open_resets_query_active_and_results() {
    let page = page();
    let (combobox, _) = mount(&page, combobox(cities()));
    open(&page, &combobox);

    type_query(&page, "kh");
    page.key_down(KeyCode::DOWN);
    assert_eq!(names(&combobox), vec!["Kharkiv"]);
    assert_eq!(combobox.active_index(), Some(0));

    page.key_down(KeyCode::ESCAPE);
    open(&page, &combobox);
    assert_eq!(combobox.query(), "");
    assert_eq!(combobox.active_index(), None);
    assert_eq!(names(&combobox).len(), 4);
    assert_eq!(combobox.view().panel.unwrap().search.unwrap().value, "");
}

#[test]
fn test_close_drops_pending_query() {
    let page = page();
    let (combobox, _) = mount(&page, combobox(cities()));
    open(&page, &combobox);

    page.input("ly").unwrap();
    page.key_down(KeyCode::ESCAPE);
    page.advance(Duration::from_secs(1));

    open(&page, &combobox);
    assert_eq!(names(&combobox).len(), 4);
    assert_eq!(page.scheduler().pending_timers(), 0);
}

// =========================================================================
// SEARCH
// =========================================================================

#[test]
fn test_query_filters_by_label_after_debounce() {
    let page = page();
    let (combobox, _) = mount(&page, combobox(cities()));
    open(&page, &combobox);

    page.input("LV").unwrap();
    page.advance(Duration::from_millis(199));
    assert_eq!(names(&combobox).len(), 4);

    page.advance(Duration::from_millis(1));
    assert_eq!(names(&combobox), vec!["Lviv"]);
    assert_eq!(combobox.results()[0].id, 2);
}

#[test]
fn test_burst_of_input_searches_once() {
    let page = page();
    let calls = Rc::new(RefCell::new(Vec::<String>::new()));
    let seen = calls.clone();
    let search = SearchFn::sync(move |query: &str, items: &[Rc<City>]| {
        seen.borrow_mut().push(query.to_string());
        items.to_vec()
    });
    let (combobox, _) = mount(&page, combobox(cities()).search_fn(search));
    open(&page, &combobox);

    for (i, query) in ["o", "od", "ode", "odes"].into_iter().enumerate() {
        if i > 0 {
            page.advance(Duration::from_millis(50));
        }
        page.input(query).unwrap();
    }
    page.advance(Duration::from_millis(200));

    assert_eq!(*calls.borrow(), vec!["odes".to_string()]);
    assert_eq!(combobox.query(), "odes");
}

#[test]
fn test_no_matches_shows_empty_row() {
    let page = page();
    let (combobox, _) = mount(&page, combobox(cities()));
    open(&page, &combobox);

    type_query(&page, "zzz");
    let view = combobox.view();
    assert_eq!(view.panel.as_ref().unwrap().body, PanelBody::empty());
    assert!(combobox.status_node().is_some());
    assert!(combobox.option_node(0).is_none());

    page.key_down(KeyCode::DOWN);
    page.key_down(KeyCode::ENTER);
    assert_eq!(combobox.active_index(), None);
    assert!(combobox.is_open());
}

#[test]
fn test_not_searchable_has_no_search_field() {
    let page = page();
    let (combobox, _) = mount(&page, combobox(cities()).searchable(false));
    open(&page, &combobox);

    assert!(combobox.search_node().is_none());
    assert!(combobox.view().panel.unwrap().search.is_none());
    // Focus stays on the trigger
    assert_eq!(page.focused(), Some(combobox.trigger_node()));
}

#[test]
fn test_async_search_shows_loading_then_results() {
    let page = page();
    let scheduler = page.scheduler().clone();
    let search = SearchFn::future(move |query: &str, items: &[Rc<City>]| {
        let query = query.to_string();
        let items = items.to_vec();
        let sleep = scheduler.sleep(Duration::from_millis(300));
        async move {
            sleep.await;
            Ok(items
                .into_iter()
                .filter(|c| c.name.to_lowercase().starts_with(&query))
                .collect())
        }
    });
    let (combobox, _) = mount(&page, combobox(cities()).search_fn(search));
    open(&page, &combobox);

    type_query(&page, "k");
    assert!(combobox.is_loading());
    assert_eq!(combobox.view().panel.unwrap().body, PanelBody::loading());

    page.advance(Duration::from_millis(300));
    assert!(!combobox.is_loading());
    assert_eq!(names(&combobox), vec!["Kyiv", "Kharkiv"]);
    assert_eq!(combobox.view().labels(), vec!["Kyiv", "Kharkiv"]);
}

#[test]
fn test_failed_search_keeps_previous_results() {
    let page = page();
    let search = SearchFn::future(|query: &str, _: &[Rc<City>]| {
        let query = query.to_string();
        async move { Err(SearchError::Failed(format!("no route for {query}"))) }
    });
    let (combobox, _) = mount(&page, combobox(cities()).search_fn(search));
    open(&page, &combobox);
    page.key_down(KeyCode::DOWN);

    type_query(&page, "ky");
    assert!(!combobox.is_loading());
    assert_eq!(names(&combobox).len(), 4);
    assert_eq!(
        combobox.last_search_error(),
        Some(SearchError::Failed("no route for ky".into()))
    );
    assert_eq!(combobox.active_index(), Some(0));
}

#[test]
fn test_set_search_fn_reruns_current_query() {
    let page = page();
    let (combobox, _) = mount(&page, combobox(cities()));
    open(&page, &combobox);
    type_query(&page, "a");
    assert_eq!(names(&combobox), vec!["Odesa", "Kharkiv"]);

    let calls = Rc::new(std::cell::Cell::new(0));
    let counter = calls.clone();
    let last_only = SearchFn::sync(move |_: &str, items: &[Rc<City>]| {
        counter.set(counter.get() + 1);
        items.last().cloned().into_iter().collect()
    });
    combobox.set_search_fn(Some(last_only.clone()));
    assert_eq!(names(&combobox), vec!["Kharkiv"]);
    assert_eq!(calls.get(), 1);

    // Same function: nothing to redo
    combobox.set_search_fn(Some(last_only));
    assert_eq!(calls.get(), 1);

    combobox.set_search_fn(None);
    assert_eq!(names(&combobox), vec!["Odesa", "Kharkiv"]);
}

#[test]
fn test_set_items_resets_results() {
    let page = page();
    let (combobox, _) = mount(&page, combobox(cities()));
    open(&page, &combobox);
    page.key_down(KeyCode::UP);
    assert_eq!(combobox.active_index(), Some(3));

    combobox.set_items(cities().into_iter().take(2).collect());
    assert_eq!(names(&combobox), vec!["Kyiv", "Lviv"]);
    assert_eq!(combobox.active_index(), None);
    assert_eq!(combobox.items().len(), 2);
}

// =========================================================================
// ACTIVE INDEX
// =========================================================================

#[test]
fn test_arrow_up_from_none_wraps_to_last() {
    let page = page();
    let items = cities().into_iter().take(3).collect::<Vec<_>>();
    let (combobox, _) = mount(&page, combobox(items));
    open(&page, &combobox);

    page.key_down(KeyCode::UP);
    assert_eq!(combobox.active_index(), Some(2));
}

#[test]
fn test_arrow_keys_wrap_around() {
    let page = page();
    let (combobox, _) = mount(&page, combobox(cities()));
    open(&page, &combobox);

    page.key_down(KeyCode::DOWN);
    let start = combobox.active_index();
    for _ in 0..4 {
        page.key_down(KeyCode::DOWN);
    }
    assert_eq!(combobox.active_index(), start);
    for _ in 0..4 {
        page.key_down(KeyCode::UP);
    }
    assert_eq!(combobox.active_index(), start);

    page.key_down(KeyCode::UP);
    assert_eq!(combobox.active_index(), Some(3));
    page.key_down(KeyCode::DOWN);
    assert_eq!(combobox.active_index(), Some(0));
}

#[test]
fn test_hover_sets_active() {
    let page = page();
    let (combobox, _) = mount(&page, combobox(cities()));
    open(&page, &combobox);

    let option = combobox.option_node(2).unwrap();
    page.hover(option).unwrap();
    assert_eq!(combobox.active_index(), Some(2));
    assert_eq!(combobox.view().active_option().map(|o| o.label.as_str()), Some("Odesa"));
    // Rows are stable across highlight changes
    assert_eq!(combobox.option_node(2), Some(option));
}

// =========================================================================
// COMMIT
// =========================================================================

#[test]
fn test_enter_commits_active_and_closes() {
    let page = page();
    let items = cities();
    let (combobox, picks) = mount(&page, combobox(items.clone()));
    open(&page, &combobox);

    page.key_down(KeyCode::DOWN);
    page.key_down(KeyCode::DOWN);
    page.key_down(KeyCode::ENTER);

    assert_eq!(picks.borrow().len(), 1);
    assert!(Rc::ptr_eq(&picks.borrow()[0], &items[1]));
    assert!(!combobox.is_open());
    assert_eq!(page.focused(), Some(combobox.trigger_node()));
}

#[test]
fn test_enter_without_active_does_nothing() {
    let page = page();
    let (combobox, picks) = mount(&page, combobox(cities()));
    open(&page, &combobox);

    page.key_down(KeyCode::ENTER);
    assert!(picks.borrow().is_empty());
    assert!(combobox.is_open());
}

#[test]
fn test_click_option_commits() {
    let page = page();
    let (combobox, picks) = mount(&page, combobox(cities()));
    open(&page, &combobox);
    type_query(&page, "od");

    page.click(combobox.option_node(0).unwrap()).unwrap();
    assert_eq!(picks.borrow().len(), 1);
    assert_eq!(picks.borrow()[0].name, "Odesa");
    assert!(!combobox.is_open());
}

#[test]
fn test_pointer_down_on_option_keeps_focus() {
    let page = page();
    let (combobox, _) = mount(&page, combobox(cities()));
    open(&page, &combobox);

    page.pointer_down(combobox.option_node(1).unwrap()).unwrap();
    assert!(combobox.is_open());
    assert_eq!(page.focused(), combobox.search_node());
}

#[test]
fn test_commit_without_close_returns_focus_to_trigger() {
    let page = page();
    let (combobox, picks) = mount(&page, combobox(cities()).close_on_select(false));
    open(&page, &combobox);

    page.click(combobox.option_node(3).unwrap()).unwrap();
    assert_eq!(picks.borrow().len(), 1);
    assert!(combobox.is_open());
    assert_eq!(page.focused(), Some(combobox.trigger_node()));
}

#[test]
fn test_on_change_may_update_value() {
    let page = page();
    let slot: Rc<RefCell<Option<WeakCombobox<City>>>> = Rc::default();
    let target = slot.clone();
    let combobox = combobox(cities())
        .mount(&page, page.root(), move |city| {
            if let Some(combobox) = target.borrow().as_ref().and_then(WeakCombobox::upgrade) {
                combobox.set_value(Some(city));
            }
        })
        .unwrap();
    *slot.borrow_mut() = Some(combobox.downgrade());

    open(&page, &combobox);
    page.key_down(KeyCode::UP);
    page.key_down(KeyCode::ENTER);

    assert_eq!(combobox.value().map(|c| c.id), Some(4));
    assert_eq!(combobox.view().trigger.content, "Kharkiv");
}

// =========================================================================
// RENDERING
// =========================================================================

#[test]
fn test_trigger_content() {
    let page = page();
    let items = cities();
    let (combobox, _) = mount(&page, combobox(items.clone()).placeholder("Pick one"));

    let trigger = combobox.view().trigger;
    assert_eq!(trigger.content, "Pick one");
    assert!(trigger.is_placeholder);
    assert!(!trigger.expanded);
    assert_eq!(trigger.has_popup, "listbox");

    combobox.set_value(Some(items[2].clone()));
    let trigger = combobox.view().trigger;
    assert_eq!(trigger.content, "Odesa");
    assert!(!trigger.is_placeholder);
}

#[test]
fn test_custom_rendering() {
    let page = page();
    let items = cities();
    let config = combobox(items.clone())
        .value(Some(items[0].clone()))
        .render_selected(|city: Option<&City>| match city {
            Some(city) => format!("● {}", city.name),
            None => "Select...".to_string(),
        })
        .render_item(|cx: &ItemContext<'_, City>| {
            let mark = if cx.selected { " (selected)" } else { "" };
            format!("{}. {}{mark}", cx.index + 1, cx.item.name)
        });
    let (combobox, _) = mount(&page, config);
    assert_eq!(combobox.view().trigger.content, "● Kyiv");

    open(&page, &combobox);
    let view = combobox.view();
    let contents: Vec<_> = view.options().iter().map(|o| o.content.as_str()).collect();
    assert_eq!(contents[0], "1. Kyiv (selected)");
    assert_eq!(contents[1], "2. Lviv");

    combobox.set_value(None);
    assert_eq!(combobox.view().trigger.content, "Select...");
}

#[test]
fn test_selected_compares_labels() {
    let page = page();
    let twin = Rc::new(City { id: 99, name: "Lviv" });
    let mut items = cities();
    items.push(twin.clone());
    let (combobox, _) = mount(&page, combobox(items).value(Some(twin)));
    open(&page, &combobox);

    let selected: Vec<_> = combobox
        .view()
        .options()
        .iter()
        .filter(|o| o.selected)
        .map(|o| o.index)
        .collect();
    assert_eq!(selected, vec![1, 4]);
}

#[test]
fn test_view_ids_and_classes() {
    let page = page();
    let (combobox, _) = mount(
        &page,
        combobox(cities())
            .key("city")
            .class_name("picker")
            .dropdown_class_name("cities"),
    );
    open(&page, &combobox);

    let view = combobox.view();
    let panel = view.panel.as_ref().unwrap();
    assert_eq!(view.id, "city");
    assert_eq!(view.class.as_deref(), Some("picker"));
    assert_eq!(view.trigger.controls, panel.id);
    assert_eq!(panel.id, "city_listbox");
    assert_eq!(panel.class.as_deref(), Some("cities"));
    assert_eq!(panel.role, "listbox");
    assert!(panel.search.as_ref().unwrap().focused);
    assert_eq!(view.options()[1].key, "Lviv1");
    assert_eq!(view.options()[1].role, "option");
}

#[test]
fn test_settings_apply_defaults() {
    let settings = ComboboxSettings::from_toml_str(
        r#"
        placeholder = "Where to?"
        search_placeholder = "Type a city"
        close_on_select = false
        debounce_ms = 20
        "#,
    )
    .unwrap();
    let page = page();
    let (combobox, picks) = mount(&page, combobox(cities()).settings(&settings));
    assert_eq!(combobox.view().trigger.content, "Where to?");

    open(&page, &combobox);
    let search = combobox.view().panel.unwrap().search.unwrap();
    assert_eq!(search.placeholder, "Type a city");

    page.input("ode").unwrap();
    page.advance(Duration::from_millis(20));
    assert_eq!(names(&combobox), vec!["Odesa"]);

    page.key_down(KeyCode::DOWN);
    page.key_down(KeyCode::ENTER);
    assert_eq!(picks.borrow().len(), 1);
    assert!(combobox.is_open());
}

// =========================================================================
// LIFECYCLE
// =========================================================================

#[test]
fn test_unmount_releases_everything() {
    let page = page();
    let nodes = page.node_count();
    let handlers = page.handler_count();
    let listeners = page.listener_count();

    let (combobox, _) = mount(&page, combobox(cities()));
    open(&page, &combobox);
    page.input("k").unwrap();
    assert_eq!(page.registry().len(), 1);
    assert!(page.listener_count() > listeners);

    combobox.unmount();
    assert!(!combobox.is_mounted());
    assert_eq!(page.node_count(), nodes);
    assert_eq!(page.handler_count(), handlers);
    assert_eq!(page.listener_count(), listeners);
    assert!(page.registry().is_empty());
    assert_eq!(page.scheduler().pending_timers(), 0);

    // Handle calls after unmount are ignored
    combobox.set_items(Vec::new());
    assert_eq!(combobox.items().len(), 4);
}

#[test]
fn test_dropping_last_handle_unmounts() {
    let page = page();
    let nodes = page.node_count();
    let (combobox, picks) = mount(&page, combobox(cities()));
    let weak = combobox.downgrade();
    open(&page, &combobox);

    drop(combobox);
    assert!(weak.upgrade().is_none());
    assert_eq!(page.node_count(), nodes);
    assert!(page.registry().is_empty());
    assert!(picks.borrow().is_empty());
}

#[test]
fn test_unmount_during_async_search() {
    let page = page();
    let scheduler = page.scheduler().clone();
    let search = SearchFn::future(move |_: &str, items: &[Rc<City>]| {
        let items = items.to_vec();
        let sleep = scheduler.sleep(Duration::from_millis(300));
        async move {
            sleep.await;
            Ok(items)
        }
    });
    let (combobox, _) = mount(&page, combobox(cities()).search_fn(search));
    open(&page, &combobox);
    type_query(&page, "kyiv");
    assert!(combobox.is_loading());

    combobox.unmount();
    page.advance(Duration::from_millis(300));
    assert!(page.scheduler().is_idle());
}
