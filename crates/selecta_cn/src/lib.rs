//! # Selecta Component Library (selecta_cn)
//!
//! Headless, searchable select widgets built on `selecta_core` primitives.
//!
//! - **Primitives**: `selecta_core` provides the page (nodes, focus, events),
//!   the scheduler, the debouncer, outside-click detection and the open registry
//! - **Components**: `selecta_cn` wires them into widgets with a non-visual view
//!   model a renderer can draw from
//!
//! ## Example
//!
//! ```ignore
//! use selecta_cn::prelude::*;
//!
//! let page = Page::new();
//! let picker = cn::combobox(cities)
//!     .placeholder("Select your city")
//!     .close_on_select(false)
//!     .mount(&page, page.root(), |city| println!("{city}"))?;
//! ```

pub mod components;
pub mod settings;

pub use components::*;
pub use settings::{ComboboxSettings, SettingsError};

/// Convenience module for accessing components with `cn::` prefix
pub mod cn {
    pub use crate::components::combobox::combobox;
}

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::cn;
    pub use crate::components::combobox::{
        combobox, Combobox, ComboboxConfig, ComboboxView, ItemContext, PanelBody, Phase,
        SearchError, SearchFn, SearchOutcome, SearchResult,
    };
    pub use crate::settings::ComboboxSettings;
    pub use selecta_core::{FocusOrigin, KeyCode, NodeId, OpenRegistry, Page};
}
