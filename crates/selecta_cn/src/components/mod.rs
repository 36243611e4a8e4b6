//! Headless components built on selecta_core primitives
//!
//! Each component follows a consistent pattern:
//! - Builder function (e.g., `combobox(items)`)
//! - Configuration consumed by `mount(&page, parent, on_change)`
//! - A cloneable handle to drive and inspect the mounted widget
//! - A serializable view model for rendering

pub mod combobox;

pub use combobox::{
    combobox, Combobox, ComboboxConfig, ComboboxView, ItemContext, Phase, SearchError, SearchFn,
    SearchOutcome, WeakCombobox,
};
