//! Non-visual render model
//!
//! What a renderer needs to draw a combobox, including the listbox semantics
//! (`aria-haspopup`, `aria-expanded`, `aria-controls`, `role`, `aria-selected`).
//! Serializes to JSON for snapshots.

use serde::Serialize;

/// Status row shown while an asynchronous search is pending
pub const LOADING_TEXT: &str = "Loading…";

/// Status row shown when the result set is empty
pub const EMPTY_TEXT: &str = "No results";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ComboboxView {
    /// Instance key
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    pub trigger: TriggerView,
    /// Present only while open
    pub panel: Option<PanelView>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TriggerView {
    pub content: String,
    /// Showing the placeholder (no selection)
    pub is_placeholder: bool,
    pub expanded: bool,
    pub disabled: bool,
    /// Id of the panel this trigger opens
    pub controls: String,
    pub has_popup: &'static str,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PanelView {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    pub role: &'static str,
    pub search: Option<SearchView>,
    pub body: PanelBody,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SearchView {
    pub value: String,
    pub placeholder: String,
    pub focused: bool,
}

/// Either a status row or the option rows
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PanelBody {
    Loading { text: &'static str },
    Empty { text: &'static str },
    Options { options: Vec<OptionView> },
}

impl PanelBody {
    pub fn loading() -> Self {
        PanelBody::Loading { text: LOADING_TEXT }
    }

    pub fn empty() -> Self {
        PanelBody::Empty { text: EMPTY_TEXT }
    }

    pub fn options(&self) -> &[OptionView] {
        match self {
            PanelBody::Options { options } => options,
            _ => &[],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OptionView {
    /// Row key: label followed by index
    pub key: String,
    pub index: usize,
    pub role: &'static str,
    pub label: String,
    /// Custom rendering, or the label
    pub content: String,
    pub active: bool,
    pub selected: bool,
}

impl ComboboxView {
    pub fn is_open(&self) -> bool {
        self.panel.is_some()
    }

    /// Option rows currently shown (empty while closed, loading or empty)
    pub fn options(&self) -> &[OptionView] {
        self.panel
            .as_ref()
            .map(|panel| panel.body.options())
            .unwrap_or_default()
    }

    /// Labels of the option rows, in order
    pub fn labels(&self) -> Vec<&str> {
        self.options().iter().map(|o| o.label.as_str()).collect()
    }

    pub fn active_option(&self) -> Option<&OptionView> {
        self.options().iter().find(|o| o.active)
    }
}
