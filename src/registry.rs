//! Class registry: factories by class id plus the base → derived graph
//!
//! The registry is built once at startup and then shared read-only
//! (typically behind an `Arc`) by every domain. Loading consults it to
//! turn the set of class layers stored for an identity into a concrete
//! type to construct.

use crate::config::DomainConfig;
use crate::domain::Domain;
use crate::logging::debug;
use crate::obj::{Class, ClassId, ObjId};
use crate::ptr::Managed;
use crate::version::MAX_VERSION;
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction as Edges;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Constructs and (de)serializes one registered class
#[derive(Clone, Copy)]
pub struct Factory {
    pub class_id: ClassId,
    pub base_id: ClassId,
    pub name: &'static str,
    pub create: fn() -> Box<dyn Managed>,
    pub load: fn(&Domain, &mut dyn Managed, ObjId),
    pub save: fn(&Domain, &mut dyn Managed, ObjId),
}

impl Factory {
    pub fn of<T: Class>() -> Self {
        Self {
            class_id: T::class_id(),
            base_id: T::base_id(),
            name: T::NAME,
            create: create_default::<T>,
            load: load_layers::<T>,
            save: save_layers::<T>,
        }
    }
}

impl std::fmt::Debug for Factory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Factory")
            .field("class", &self.class_id)
            .field("base", &self.base_id)
            .finish()
    }
}

fn create_default<T: Class>() -> Box<dyn Managed> {
    Box::new(T::default())
}

fn load_layers<T: Class>(domain: &Domain, obj: &mut dyn Managed, id: ObjId) {
    if let Some(obj) = obj.as_any_mut().downcast_mut::<T>() {
        domain.load_object(obj, id);
    }
}

fn save_layers<T: Class>(domain: &Domain, obj: &mut dyn Managed, id: ObjId) {
    if let Some(obj) = obj.as_any_mut().downcast_mut::<T>() {
        domain.save_object(obj, id);
    }
}

pub struct Registry {
    factories: HashMap<ClassId, Factory>,
    /// Registration order, used to break ties deterministically
    order: Vec<ClassId>,
    /// Edges point from base to derived
    relations: DiGraphMap<ClassId, ()>,
    max_version: u8,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_max_version(MAX_VERSION)
    }

    /// Registry that rejects classes declaring versions above `max_version`
    pub fn with_max_version(max_version: u8) -> Self {
        Self {
            factories: HashMap::new(),
            order: Vec::new(),
            relations: DiGraphMap::new(),
            max_version: max_version.min(MAX_VERSION),
        }
    }

    pub fn from_config(config: &DomainConfig) -> Self {
        Self::with_max_version(config.max_version)
    }

    pub fn max_version(&self) -> u8 {
        self.max_version
    }

    /// Register `T` with a factory built from its `Class` impl.
    ///
    /// # Panics
    ///
    /// When `T`'s versions are malformed or exceed the maximum, and
    /// (debug builds) on duplicate registration or an unregistered base.
    pub fn register<T: Class>(&mut self) -> &mut Self {
        assert!(
            T::VERSION <= self.max_version,
            "{} declares version {} above the maximum {}",
            T::NAME,
            T::VERSION,
            self.max_version
        );
        if let Err(e) = T::MIGRATIONS.validate(self.max_version) {
            panic!("{} has a malformed migration table: {}", T::NAME, e);
        }

        self.register_factory(Factory::of::<T>())
    }

    pub fn register_factory(&mut self, factory: Factory) -> &mut Self {
        let class_id = factory.class_id;
        let root = ClassId::root();

        debug_assert!(
            !self.factories.contains_key(&class_id),
            "class {} registered twice",
            class_id
        );
        debug_assert!(
            factory.base_id == root || self.factories.contains_key(&factory.base_id),
            "class {} registered before its base {}",
            class_id,
            factory.base_id
        );

        if self.factories.insert(class_id, factory).is_none() {
            self.order.push(class_id);
        }

        self.relations.add_node(class_id);
        if factory.base_id != root {
            self.relations.add_edge(factory.base_id, class_id, ());
        }

        debug!(event = "class_registered", class = %class_id, base = %factory.base_id);
        self
    }

    /// Forget a class and its relations. Returns its factory if it was registered.
    pub fn unregister(&mut self, class_id: ClassId) -> Option<Factory> {
        let factory = self.factories.remove(&class_id)?;
        self.order.retain(|c| *c != class_id);
        self.relations.remove_node(class_id);
        Some(factory)
    }

    #[inline]
    pub fn is_registered(&self, class_id: ClassId) -> bool {
        self.factories.contains_key(&class_id)
    }

    pub fn find_factory(&self, class_id: ClassId) -> Option<&Factory> {
        self.factories.get(&class_id)
    }

    /// Registered and nothing derives from it
    pub fn is_final(&self, class_id: ClassId) -> bool {
        self.is_registered(class_id)
            && self.relations.neighbors_directed(class_id, Edges::Outgoing).next().is_none()
    }

    pub fn class_name(&self, class_id: ClassId) -> Option<&'static str> {
        self.factories.get(&class_id).map(|f| f.name)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Registered ids in registration order
    pub fn classes(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.order.iter().copied()
    }

    /// Derivation steps from `base` down to `derived`; -1 when either is
    /// unregistered or `derived` does not descend from `base`
    pub fn generation_distance(&self, base: ClassId, derived: ClassId) -> i32 {
        if !self.is_registered(base) || !self.is_registered(derived) {
            return -1;
        }
        if base == derived {
            return 0;
        }
        self.depth_below(base, derived).unwrap_or(-1)
    }

    fn depth_below(&self, from: ClassId, target: ClassId) -> Option<i32> {
        for next in self.relations.neighbors_directed(from, Edges::Outgoing) {
            if next == target {
                return Some(1);
            }
            if let Some(depth) = self.depth_below(next, target) {
                return Some(depth + 1);
            }
        }
        None
    }

    /// Factory of the final class to construct for an object whose
    /// stored layers are `candidates`.
    ///
    /// Unregistered candidates are ignored. Among final classes
    /// descending from the most derived candidate, the first registered
    /// wins. `None` when no candidate is registered.
    ///
    /// # Panics
    ///
    /// When the registered candidates are not one inheritance chain.
    pub fn most_related_factory(&self, candidates: &[ClassId]) -> Option<&Factory> {
        let mut chain: Vec<ClassId> = candidates
            .iter()
            .copied()
            .filter(|c| self.is_registered(*c))
            .collect();
        chain.sort_by(|a, b| self.chain_order(*a, *b));
        chain.dedup();

        let most_derived = *chain.last()?;

        self.order
            .iter()
            .copied()
            .filter(|c| self.is_final(*c))
            .find(|c| self.generation_distance(most_derived, *c) >= 0)
            .and_then(|c| self.factories.get(&c))
    }

    fn chain_order(&self, a: ClassId, b: ClassId) -> Ordering {
        if a == b {
            Ordering::Equal
        } else if self.generation_distance(a, b) > 0 {
            Ordering::Less
        } else if self.generation_distance(b, a) > 0 {
            Ordering::Greater
        } else {
            panic!("classes {} and {} are not in one inheritance chain", a, b);
        }
    }

    /// One debug line per registered class
    pub fn log_classes(&self) {
        for class_id in &self.order {
            if let Some(factory) = self.factories.get(class_id) {
                debug!(
                    event = "registry_class",
                    class = factory.name,
                    base = %factory.base_id,
                    final_class = self.is_final(*class_id)
                );
            }
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("classes", &self.order)
            .field("max_version", &self.max_version)
            .finish()
    }
}
