//! Child enumeration policies and the per-traversal cycle guard

use super::Dnv;
use crate::ptr::Managed;
use crate::version::Direction;
use std::any::TypeId;
use std::collections::HashSet;

/// How an object's children are enumerated when a traversal enters it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitPolicy {
    /// The object's own `visit`
    Explicit,
    /// Every load handler, oldest version first
    VersionedLoad,
    /// Every save handler, newest version first
    VersionedSave,
    /// First policy that applies wins
    Multiplex(&'static [VisitPolicy]),
}

impl VisitPolicy {
    /// Used when deciding whether a release frees a cycle
    pub const RELEASE: VisitPolicy =
        VisitPolicy::Multiplex(&[VisitPolicy::Explicit, VisitPolicy::VersionedSave]);

    pub fn applies(self, target: &dyn Managed) -> bool {
        match self {
            VisitPolicy::Explicit => target.has_explicit_visit(),
            VisitPolicy::VersionedLoad => target.has_versions(Direction::Load),
            VisitPolicy::VersionedSave => target.has_versions(Direction::Save),
            VisitPolicy::Multiplex(policies) => policies.iter().any(|p| p.applies(target)),
        }
    }

    /// Enumerate `target`'s children. Returns false when no policy applied.
    pub fn apply(self, target: &mut dyn Managed, dnv: &mut Dnv<'_>) -> bool {
        match self {
            VisitPolicy::Explicit => {
                if !target.has_explicit_visit() {
                    return false;
                }
                target.visit(dnv);
                true
            }
            VisitPolicy::VersionedLoad => target.visit_versions(Direction::Load, dnv),
            VisitPolicy::VersionedSave => target.visit_versions(Direction::Save, dnv),
            VisitPolicy::Multiplex(policies) => policies
                .iter()
                .find(|p| p.applies(target))
                .map_or(false, |p| p.apply(target, dnv)),
        }
    }
}

/// Remembers which (type, address) pairs a traversal has entered
#[derive(Debug, Default)]
pub struct CycleGuard {
    visited: HashSet<(TypeId, usize)>,
}

impl CycleGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// True the first time `target` is seen
    pub fn enter(&mut self, target: &dyn Managed) -> bool {
        let key = (target.as_any().type_id(), target as *const dyn Managed as *const () as usize);
        self.visited.insert(key)
    }

    pub fn contains(&self, target: &dyn Managed) -> bool {
        let key = (target.as_any().type_id(), target as *const dyn Managed as *const () as usize);
        self.visited.contains(&key)
    }

    pub fn len(&self) -> usize {
        self.visited.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visited.is_empty()
    }

    pub fn clear(&mut self) {
        self.visited.clear();
    }
}
