//! Class ids: stable 32-bit hashes of persistent class names
//!
//! Every name that is hashed is remembered in a process-wide table so
//! diagnostics can print `Foo` instead of a bare number, and so two
//! names that collide on the same id are caught the moment the second
//! one shows up.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the universal root layer every persistent class derives from
pub const ROOT_CLASS_NAME: &str = "Obj";

/// Global id → name table (lock-free reads)
static CLASS_NAMES: Lazy<DashMap<ClassId, &'static str>> =
    Lazy::new(|| DashMap::with_capacity(256));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ClassId(u32);

impl ClassId {
    /// Hash a class name into its id and record the name.
    ///
    /// # Panics
    ///
    /// If a different name already produced the same id.
    pub fn of(name: &'static str) -> Self {
        let id = Self::hash(name);

        let existing = *CLASS_NAMES.entry(id).or_insert(name);
        assert!(
            existing == name,
            "class id collision: '{}' and '{}' both hash to {:08x}",
            existing,
            name,
            id.0
        );

        id
    }

    /// Id of the universal root layer
    pub fn root() -> Self {
        Self::of(ROOT_CLASS_NAME)
    }

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Name this id was computed from, if it was hashed in this process
    pub fn name(self) -> Option<&'static str> {
        CLASS_NAMES.get(&self).map(|name| *name)
    }

    fn hash(name: &str) -> Self {
        let digest = blake3::hash(name.as_bytes());
        let b = digest.as_bytes();
        Self(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}#{:08x}", name, self.0),
            None => write!(f, "#{:08x}", self.0),
        }
    }
}
