//! Event model
//!
//! Platform-agnostic input events delivered by the [`Page`](crate::page::Page).
//! Events carry their composed path (target first, page root last) so that
//! page-level listeners can answer "did this happen inside region X?" without
//! touching the node tree.

use smallvec::SmallVec;

use crate::page::NodeId;

/// Event type identifier
pub type EventType = u32;

/// Event types understood by the page
pub mod event_types {
    use super::EventType;

    pub const POINTER_DOWN: EventType = 1;
    pub const POINTER_UP: EventType = 2;
    pub const POINTER_ENTER: EventType = 4;
    /// Primary activation (pointer down + up on the same enabled node)
    pub const CLICK: EventType = 8;
    pub const FOCUS: EventType = 10;
    /// Focus left the node. Bubbles, like DOM `focusout`.
    pub const BLUR: EventType = 11;
    pub const KEY_DOWN: EventType = 20;
    /// The value of a text field changed
    pub const INPUT: EventType = 23;
}

/// How focus arrived on a node
///
/// Mirrors the distinction browsers make with `:focus-visible`: only
/// keyboard navigation counts as a visible, user-intended focus move.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum FocusOrigin {
    /// Tab / shift-tab navigation
    Keyboard,
    /// Pointer press on a focusable node
    Pointer,
    /// Focus moved by code (e.g. restoring focus after a dialog closes)
    #[default]
    Programmatic,
}

/// Mouse button identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
    Other(u16),
}

/// Event-specific data
#[derive(Clone, Debug)]
pub enum EventData {
    Pointer {
        button: MouseButton,
    },
    Key {
        key: KeyCode,
        modifiers: Modifiers,
        /// Whether this is a repeat event
        repeat: bool,
    },
    Focus {
        origin: FocusOrigin,
        /// For BLUR: the node receiving focus. For FOCUS: the node losing it.
        related: Option<NodeId>,
    },
    /// Full new value of a text field
    Input {
        value: String,
    },
    None,
}

/// A UI event with associated data
#[derive(Clone, Debug)]
pub struct Event {
    pub event_type: EventType,
    pub target: NodeId,
    /// Node whose handler is currently running
    pub current_target: NodeId,
    /// Target first, page root last
    pub path: SmallVec<[NodeId; 8]>,
    pub data: EventData,
    /// Virtual clock time in milliseconds
    pub timestamp: u64,
    pub propagation_stopped: bool,
    pub default_prevented: bool,
}

impl Event {
    pub fn new(event_type: EventType, target: NodeId, data: EventData) -> Self {
        Self {
            event_type,
            target,
            current_target: target,
            path: SmallVec::new(),
            data,
            timestamp: 0,
            propagation_stopped: false,
            default_prevented: false,
        }
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    /// Suppress the page's default action (e.g. focus change on pointer down)
    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    /// Whether the event target is `node` or one of its descendants
    pub fn is_within(&self, node: NodeId) -> bool {
        self.path.contains(&node)
    }

    /// Key code for KEY_DOWN events
    pub fn key(&self) -> Option<KeyCode> {
        match self.data {
            EventData::Key { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Focus origin for FOCUS / BLUR events
    pub fn focus_origin(&self) -> Option<FocusOrigin> {
        match self.data {
            EventData::Focus { origin, .. } => Some(origin),
            _ => None,
        }
    }

    /// Related node for FOCUS / BLUR events
    pub fn related(&self) -> Option<NodeId> {
        match self.data {
            EventData::Focus { related, .. } => related,
            _ => None,
        }
    }

    /// New field value for INPUT events
    pub fn input_value(&self) -> Option<&str> {
        match &self.data {
            EventData::Input { value } => Some(value),
            _ => None,
        }
    }
}

/// Virtual key codes (platform-agnostic)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct KeyCode(pub u32);

impl KeyCode {
    // Special keys
    pub const BACKSPACE: KeyCode = KeyCode(0x08);
    pub const TAB: KeyCode = KeyCode(0x09);
    pub const ENTER: KeyCode = KeyCode(0x0D);
    pub const ESCAPE: KeyCode = KeyCode(0x1B);
    pub const SPACE: KeyCode = KeyCode(0x20);
    pub const DELETE: KeyCode = KeyCode(0x7F);

    // Arrow keys
    pub const LEFT: KeyCode = KeyCode(0x25);
    pub const UP: KeyCode = KeyCode(0x26);
    pub const RIGHT: KeyCode = KeyCode(0x27);
    pub const DOWN: KeyCode = KeyCode(0x28);

    // Navigation keys
    pub const HOME: KeyCode = KeyCode(0x24);
    pub const END: KeyCode = KeyCode(0x23);
    pub const PAGE_UP: KeyCode = KeyCode(0x21);
    pub const PAGE_DOWN: KeyCode = KeyCode(0x22);

    // Unknown/unmapped key
    pub const UNKNOWN: KeyCode = KeyCode(0);

    /// Parse a DOM-style key name (`"ArrowDown"`, `"Enter"`, `" "`, ...)
    ///
    /// Single printable ASCII characters map to their uppercase code.
    pub fn from_name(name: &str) -> Option<KeyCode> {
        let code = match name {
            "Backspace" => Self::BACKSPACE,
            "Tab" => Self::TAB,
            "Enter" => Self::ENTER,
            "Escape" | "Esc" => Self::ESCAPE,
            " " | "Space" | "Spacebar" => Self::SPACE,
            "Delete" => Self::DELETE,
            "ArrowLeft" => Self::LEFT,
            "ArrowUp" => Self::UP,
            "ArrowRight" => Self::RIGHT,
            "ArrowDown" => Self::DOWN,
            "Home" => Self::HOME,
            "End" => Self::END,
            "PageUp" => Self::PAGE_UP,
            "PageDown" => Self::PAGE_DOWN,
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii_graphic() => {
                        KeyCode(c.to_ascii_uppercase() as u32)
                    }
                    _ => return None,
                }
            }
        };
        Some(code)
    }
}

/// Keyboard modifier flags
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Modifiers {
    bits: u8,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers { bits: 0 };
    pub const SHIFT: u8 = 0b0001;
    pub const CTRL: u8 = 0b0010;
    pub const ALT: u8 = 0b0100;
    pub const META: u8 = 0b1000;

    /// Create new modifiers from flags
    pub const fn new(shift: bool, ctrl: bool, alt: bool, meta: bool) -> Self {
        let mut bits = 0;
        if shift {
            bits |= Self::SHIFT;
        }
        if ctrl {
            bits |= Self::CTRL;
        }
        if alt {
            bits |= Self::ALT;
        }
        if meta {
            bits |= Self::META;
        }
        Self { bits }
    }

    pub const fn shift(&self) -> bool {
        self.bits & Self::SHIFT != 0
    }

    pub const fn ctrl(&self) -> bool {
        self.bits & Self::CTRL != 0
    }

    pub const fn alt(&self) -> bool {
        self.bits & Self::ALT != 0
    }

    pub const fn meta(&self) -> bool {
        self.bits & Self::META != 0
    }

    /// Check if any modifier is pressed
    pub const fn any(&self) -> bool {
        self.bits != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names() {
        assert_eq!(KeyCode::from_name("ArrowDown"), Some(KeyCode::DOWN));
        assert_eq!(KeyCode::from_name("ArrowUp"), Some(KeyCode::UP));
        assert_eq!(KeyCode::from_name(" "), Some(KeyCode::SPACE));
        assert_eq!(KeyCode::from_name("Space"), Some(KeyCode::SPACE));
        assert_eq!(KeyCode::from_name("Escape"), Some(KeyCode::ESCAPE));
        assert_eq!(KeyCode::from_name("a"), Some(KeyCode(b'A' as u32)));
        assert_eq!(KeyCode::from_name("NotAKey"), None);
    }

    #[test]
    fn test_modifiers() {
        let mods = Modifiers::new(true, false, true, false);
        assert!(mods.shift());
        assert!(!mods.ctrl());
        assert!(mods.alt());
        assert!(mods.any());
        assert!(!Modifiers::NONE.any());
    }
}
