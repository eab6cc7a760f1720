use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque id of an entity in the external entity registry.
///
/// Lode never interprets the value; it only carries it between the registry
/// and references stored in components.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// The reserved null entity.
    pub const NULL: Self = Self(u64::MAX);

    /// Creates an id from a raw value.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    /// Returns `true` unless this is the null entity.
    pub const fn is_some(self) -> bool {
        self.0 != u64::MAX
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_some() {
            write!(f, "EntityId({})", self.0)
        } else {
            write!(f, "EntityId(null)")
        }
    }
}
