//! Instance identity
//!
//! Every mounted widget gets an `InstanceKey` that stays the same for its
//! whole mount lifetime. The open-instance registry uses it to tell "I opened"
//! apart from "someone else opened", and the render model derives node ids
//! (`panel`, `option-3`, ...) from it.
//!
//! # Example
//!
//! ```ignore
//! for city in ["from", "to"] {
//!     let key = InstanceKey::new("combobox");
//!     // unique per iteration: the UUID differs even though the call site is shared
//! }
//!
//! let fixed = InstanceKey::explicit("checkout-city");
//! assert_eq!(fixed.derive("panel"), "checkout-city_panel");
//! ```

use std::fmt;
use std::rc::Rc;

use uuid::Uuid;

/// Stable unique key for a widget instance
///
/// Format: `{prefix}:{file}:{line}:{col}:{uuid}`. Clones share the same key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct InstanceKey {
    key: Rc<str>,
}

impl InstanceKey {
    /// Generate a key from the caller's location plus a fresh UUID v4
    #[track_caller]
    pub fn new(prefix: &str) -> Self {
        let loc = std::panic::Location::caller();
        let key = format!(
            "{}:{}:{}:{}:{}",
            prefix,
            loc.file(),
            loc.line(),
            loc.column(),
            Uuid::new_v4().as_simple()
        );
        Self { key: key.into() }
    }

    /// Use a caller-chosen key, for deterministic ids in tests and scenarios
    pub fn explicit(key: impl Into<String>) -> Self {
        Self {
            key: key.into().into(),
        }
    }

    pub fn get(&self) -> &str {
        &self.key
    }

    /// Key for a sub-part of the instance
    pub fn derive(&self, suffix: &str) -> String {
        format!("{}_{}", self.key, suffix)
    }
}

impl fmt::Debug for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceKey({})", self.key)
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}
