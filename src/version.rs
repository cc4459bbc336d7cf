//! Schema versions and migration tables
//!
//! A persistent class either has a single implicit version (its
//! `Class::VERSION`, visited through `Class::visit`) or a migration
//! table listing one handler per version and direction. Loading runs
//! load handlers oldest first so each can upgrade what the previous
//! one produced; saving runs save handlers newest first so the
//! current state is written before legacy handlers write their
//! reduced views of it.

use crate::visit::Dnv;
use std::fmt;

/// Largest schema version a class may declare
pub const MAX_VERSION: u8 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Load,
    Save,
}

/// One versioned step for a `T`
pub type Handler<T> = fn(&mut T, &mut Dnv<'_>);

/// Per-class list of versioned handlers, declared in ascending
/// version order.
///
/// ```ignore
/// const MIGRATIONS: MigrationTable<Self> = MigrationTable::new(
///     &[(0, Self::load_v0), (1, Self::load_v1)],
///     &[(0, Self::save_v0), (1, Self::save_v1)],
/// );
/// ```
pub struct MigrationTable<T: 'static> {
    load: &'static [(u8, Handler<T>)],
    save: &'static [(u8, Handler<T>)],
}

impl<T: 'static> MigrationTable<T> {
    pub const NONE: MigrationTable<T> = MigrationTable { load: &[], save: &[] };

    pub const fn new(load: &'static [(u8, Handler<T>)], save: &'static [(u8, Handler<T>)]) -> Self {
        Self { load, save }
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.load.is_empty() && self.save.is_empty()
    }

    #[inline]
    pub fn has(&self, direction: Direction) -> bool {
        !self.handlers(direction).is_empty()
    }

    fn handlers(&self, direction: Direction) -> &'static [(u8, Handler<T>)] {
        match direction {
            Direction::Load => self.load,
            Direction::Save => self.save,
        }
    }

    /// Versions in the order they run for `direction`
    pub fn versions(&self, direction: Direction) -> Vec<u8> {
        self.steps(direction).map(|(version, _)| version).collect()
    }

    /// Handlers in run order: ascending for load, descending for save
    pub fn steps(&self, direction: Direction) -> impl Iterator<Item = (u8, Handler<T>)> {
        let handlers = self.handlers(direction);
        let ascending = direction == Direction::Load;
        let len = handlers.len();
        (0..len).map(move |i| {
            let (version, handler) = handlers[if ascending { i } else { len - 1 - i }];
            (version, handler)
        })
    }

    /// Run every handler for `direction` in order against one visitor
    pub fn run(&self, target: &mut T, direction: Direction, dnv: &mut Dnv<'_>) -> bool {
        let mut ran = false;
        for (_, handler) in self.steps(direction) {
            handler(target, dnv);
            ran = true;
        }
        ran
    }

    /// Newest version declared in either direction
    pub fn current_version(&self) -> Option<u8> {
        self.load.iter().chain(self.save.iter()).map(|(v, _)| *v).max()
    }

    /// Check that each direction lists a contiguous ascending range no
    /// newer than `max_version`
    pub fn validate(&self, max_version: u8) -> Result<(), VersionRangeError> {
        for direction in [Direction::Load, Direction::Save] {
            let handlers = self.handlers(direction);
            for pair in handlers.windows(2) {
                if pair[1].0 != pair[0].0.wrapping_add(1) {
                    return Err(VersionRangeError::Gap {
                        direction,
                        after: pair[0].0,
                        found: pair[1].0,
                    });
                }
            }
            if let Some(&(last, _)) = handlers.last() {
                if last > max_version {
                    return Err(VersionRangeError::TooNew {
                        direction,
                        version: last,
                        max: max_version,
                    });
                }
            }
        }
        Ok(())
    }
}

impl<T: 'static> fmt::Debug for MigrationTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationTable")
            .field("load", &self.versions(Direction::Load))
            .field("save", &self.versions(Direction::Save))
            .finish()
    }
}

/// Malformed migration table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRangeError {
    Gap { direction: Direction, after: u8, found: u8 },
    TooNew { direction: Direction, version: u8, max: u8 },
}

impl fmt::Display for VersionRangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gap { direction, after, found } => {
                write!(f, "{:?} handlers jump from version {} to {}", direction, after, found)
            }
            Self::TooNew { direction, version, max } => {
                write!(
                    f,
                    "{:?} handler for version {} exceeds the maximum {}",
                    direction, version, max
                )
            }
        }
    }
}

impl std::error::Error for VersionRangeError {}
