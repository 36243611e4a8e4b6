//! The demo page: three city pickers side by side
//!
//! 1. Plain picker with the default label filter
//! 2. Same as the first one, to show that only one panel is open at a time
//! 3. Server-style search answering after 300 ms, with custom rendering of
//!    the selection and the options

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use selecta_cn::components::combobox::WeakCombobox;
use selecta_cn::prelude::*;
use selecta_core::{Focusable, PageError};
use serde::Serialize;
use tracing::info;

/// Latency of the simulated server search
pub const SERVER_LATENCY: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct City {
    pub id: u32,
    pub name: String,
}

impl fmt::Display for City {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

pub fn cities() -> Vec<Rc<City>> {
    ["Item 1", "Item 2", "Item 3", "Kyiv", "Lviv", "Odesa", "Kharkiv"]
        .into_iter()
        .zip(1..)
        .map(|(name, id)| {
            Rc::new(City {
                id,
                name: name.to_string(),
            })
        })
        .collect()
}

/// Search that answers through the page scheduler after [`SERVER_LATENCY`]
fn server_search(page: &Page) -> SearchFn<City> {
    let scheduler = page.scheduler().clone();
    SearchFn::future(move |query: &str, items: &[Rc<City>]| {
        let query = query.to_string();
        let items = items.to_vec();
        let response = scheduler.sleep(SERVER_LATENCY);
        async move {
            response.await;
            Ok(items
                .into_iter()
                .filter(|city| city.name.to_lowercase().contains(&query))
                .collect())
        }
    })
}

fn render_selected(city: Option<&City>) -> String {
    match city {
        Some(city) => format!("● {}", city.name),
        None => "Select...".to_string(),
    }
}

fn render_item(cx: &ItemContext<'_, City>) -> String {
    if cx.selected {
        format!("● {} (selected)", cx.item.name)
    } else {
        format!("○ {}", cx.item.name)
    }
}

/// What a snapshot records about one picker
#[derive(Debug, Serialize)]
pub struct PickerSnapshot {
    pub index: usize,
    pub selected: Option<City>,
    pub view: ComboboxView,
}

#[derive(Debug, Serialize)]
pub struct Snapshot {
    pub time_ms: u64,
    /// Index of the picker holding focus, if any
    pub focus: Option<usize>,
    pub pickers: Vec<PickerSnapshot>,
}

pub struct DemoPage {
    page: Page,
    /// Empty area around the card, target of outside pointer presses
    backdrop: NodeId,
    pickers: Vec<Combobox<City>>,
}

impl DemoPage {
    pub fn mount(settings: &ComboboxSettings) -> Result<Self, PageError> {
        let page = Page::with_registry(OpenRegistry::new());
        let backdrop = page.add_node(page.root(), Focusable::None)?;
        let card = page.add_node(page.root(), Focusable::None)?;

        let server_items = cities();
        let initial = server_items.first().cloned();
        let configs = vec![
            cn::combobox(cities()).key("city-1").settings(settings),
            cn::combobox(cities()).key("city-2").settings(settings),
            cn::combobox(server_items)
                .key("city-3")
                .settings(settings)
                .searchable(true)
                .value(initial)
                .search_fn(server_search(&page))
                .render_selected(render_selected)
                .render_item(render_item),
        ];

        let mut pickers = Vec::with_capacity(configs.len());
        for (index, config) in configs.into_iter().enumerate() {
            let column = page.add_node(card, Focusable::None)?;
            pickers.push(mount_controlled(&page, column, index, config)?);
        }

        info!(pickers = pickers.len(), "demo page mounted");
        Ok(Self {
            page,
            backdrop,
            pickers,
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn backdrop(&self) -> NodeId {
        self.backdrop
    }

    pub fn pickers(&self) -> &[Combobox<City>] {
        &self.pickers
    }

    pub fn picker(&self, index: usize) -> Option<&Combobox<City>> {
        self.pickers.get(index)
    }

    pub fn snapshot(&self) -> Snapshot {
        let focused = self.page.focused();
        let focus = focused.and_then(|node| {
            self.pickers
                .iter()
                .position(|picker| self.page.is_within(node, picker.root_node()))
        });

        Snapshot {
            time_ms: self.page.scheduler().now_ms(),
            focus,
            pickers: self
                .pickers
                .iter()
                .enumerate()
                .map(|(index, picker)| PickerSnapshot {
                    index,
                    selected: picker.value().map(|city| City::clone(&city)),
                    view: picker.view(),
                })
                .collect(),
        }
    }
}

/// Mount `config` with host-side state: a pick becomes the new value
fn mount_controlled(
    page: &Page,
    parent: NodeId,
    index: usize,
    config: ComboboxConfig<City>,
) -> Result<Combobox<City>, PageError> {
    let handle: Rc<RefCell<Option<WeakCombobox<City>>>> = Rc::default();
    let target = handle.clone();
    let picker = config.mount(page, parent, move |city: Rc<City>| {
        info!(picker = index, city = %city.name, "city selected");
        let picker = target.borrow().as_ref().and_then(WeakCombobox::upgrade);
        if let Some(picker) = picker {
            picker.set_value(Some(city));
        }
    })?;
    *handle.borrow_mut() = Some(picker.downgrade());
    Ok(picker)
}
