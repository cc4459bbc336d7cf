//! Storage facility contract and the in-memory facility

use crate::obj::{ClassId, ObjId};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// Key-value persistence consumed by [`Domain`](super::Domain).
///
/// One blob per `(id, class, version)`: each class layer of an object
/// is stored separately, once per schema version it was saved under.
/// Failures are the facility's business; the domain only sees data or
/// its absence.
pub trait DomainStorage: Send + Sync {
    fn store(&self, id: ObjId, class: ClassId, version: u8, bytes: &[u8]);

    /// Classes with at least one blob stored for `id`
    fn enumerate(&self, id: ObjId) -> Vec<ClassId>;

    fn load(&self, id: ObjId, class: ClassId, version: u8) -> Option<Vec<u8>>;

    /// Drop everything stored for `id`
    fn remove(&self, id: ObjId);
}

type Layers = HashMap<ClassId, BTreeMap<u8, Vec<u8>>>;

/// In-memory storage
#[derive(Debug, Default)]
pub struct MapStorage {
    objects: RwLock<HashMap<ObjId, Layers>>,
}

impl MapStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored classes of `id`, sorted by raw id
    pub fn classes(&self, id: ObjId) -> Vec<ClassId> {
        let mut classes = self.enumerate(id);
        classes.sort();
        classes
    }

    /// Stored versions of one class layer, ascending
    pub fn versions(&self, id: ObjId, class: ClassId) -> Vec<u8> {
        self.objects
            .read()
            .get(&id)
            .and_then(|layers| layers.get(&class))
            .map(|versions| versions.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Move a class layer's blobs under another class id.
    /// Returns false when `from` had nothing stored.
    pub fn replace_class(&self, id: ObjId, from: ClassId, to: ClassId) -> bool {
        let mut objects = self.objects.write();
        let Some(layers) = objects.get_mut(&id) else {
            return false;
        };
        match layers.remove(&from) {
            Some(versions) => {
                layers.insert(to, versions);
                true
            }
            None => false,
        }
    }

    pub fn remove_class(&self, id: ObjId, class: ClassId) -> bool {
        let mut objects = self.objects.write();
        let Some(layers) = objects.get_mut(&id) else {
            return false;
        };
        let removed = layers.remove(&class).is_some();
        if layers.is_empty() {
            objects.remove(&id);
        }
        removed
    }

    pub fn object_count(&self) -> usize {
        self.objects.read().len()
    }

    pub fn clear(&self) {
        self.objects.write().clear();
    }
}

impl DomainStorage for MapStorage {
    fn store(&self, id: ObjId, class: ClassId, version: u8, bytes: &[u8]) {
        self.objects
            .write()
            .entry(id)
            .or_default()
            .entry(class)
            .or_default()
            .insert(version, bytes.to_vec());
    }

    fn enumerate(&self, id: ObjId) -> Vec<ClassId> {
        self.objects
            .read()
            .get(&id)
            .map(|layers| layers.keys().copied().collect())
            .unwrap_or_default()
    }

    fn load(&self, id: ObjId, class: ClassId, version: u8) -> Option<Vec<u8>> {
        self.objects.read().get(&id)?.get(&class)?.get(&version).cloned()
    }

    fn remove(&self, id: ObjId) {
        self.objects.write().remove(&id);
    }
}
