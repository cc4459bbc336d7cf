//! Object identity: a stable id plus lazy-load flags
//!
//! The identity travels with the shared block of a live object and is
//! copied into empty handles so an unloaded reference can still name
//! the object it stands for.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Persistent object id. Zero is reserved for "no object".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ObjId(u32);

impl ObjId {
    pub const INVALID: ObjId = ObjId(0);

    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// Fresh non-zero id, unique within this process and unlikely to
    /// collide with ids minted by other processes.
    pub fn generate_unique() -> Self {
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        loop {
            let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or_default();

            let mut hasher = blake3::Hasher::new();
            hasher.update(&nanos.to_le_bytes());
            hasher.update(&std::process::id().to_le_bytes());
            hasher.update(&seq.to_le_bytes());
            let bytes = hasher.finalize();
            let b = bytes.as_bytes();

            let raw = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            if raw != 0 {
                return Self(raw);
            }
        }
    }
}

impl From<u32> for ObjId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Lazy-load flags stored next to an id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ObjFlags(u8);

impl ObjFlags {
    pub const NONE: ObjFlags = ObjFlags(0);
    /// Reference is lazy: loading its parent does not load it
    pub const UNLOADED_BY_DEFAULT: ObjFlags = ObjFlags(1);
    /// Handle names an object but holds no constructed instance
    pub const UNLOADED: ObjFlags = ObjFlags(2);

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn contains(self, other: ObjFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn intersects(self, other: ObjFlags) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    pub const fn without(self, other: ObjFlags) -> Self {
        Self(self.0 & !other.0)
    }

    /// True when a parent load must not materialize this reference
    #[inline]
    pub const fn skips_load(self) -> bool {
        self.intersects(ObjFlags(Self::UNLOADED_BY_DEFAULT.0 | Self::UNLOADED.0))
    }
}

impl BitOr for ObjFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for ObjFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for ObjFlags {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0)
    }
}

/// Id and flags as persisted for every strong reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjIdentity {
    pub id: ObjId,
    pub flags: ObjFlags,
}

impl ObjIdentity {
    pub const fn new(id: ObjId, flags: ObjFlags) -> Self {
        Self { id, flags }
    }

    /// Identity of a live, constructed object
    pub const fn loaded(id: ObjId) -> Self {
        Self { id, flags: ObjFlags::NONE }
    }
}

impl Default for ObjIdentity {
    /// An empty handle: no id, nothing constructed
    fn default() -> Self {
        Self {
            id: ObjId::INVALID,
            flags: ObjFlags::UNLOADED,
        }
    }
}
