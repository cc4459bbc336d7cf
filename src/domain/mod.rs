//! Persistence engine
//!
//! A [`Domain`] owns the resident-object indices of one object graph
//! and moves objects between memory and a [`DomainStorage`]:
//! - construction in two steps, so a constructor can already find
//!   its own handle by id
//! - loading by identity, resolving the concrete class through the
//!   [`Registry`] from the layers the storage holds
//! - saving every class layer, once per schema version
//! - prefab copies under fresh identities
//! - the scheduled-update pass
//!
//! The indices hold observers only; a domain never keeps an object alive.

mod file_storage;
mod storage;
mod stream;


pub use file_storage::FileStorage;
pub use storage::{DomainStorage, MapStorage};

use crate::config::{DomainConfig, RuntimeConfig};
use crate::logging::{debug, log_object_load, log_object_save, log_update_pass, perf, trace, warn};
use crate::obj::{Class, ClassId, ObjFlags, ObjId, ObjIdentity, Object, TimePoint};
use crate::ptr::{Managed, Pointee, Ptr, PtrView};
use crate::registry::{Factory, Registry};
use crate::version::Direction;
use crate::visit::{Dnv, ErasedPtr};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use stream::{LoadVisitor, SaveVisitor};

pub struct Domain {
    registry: Arc<Registry>,
    storage: Arc<dyn DomainStorage>,
    config: DomainConfig,
    by_id: RefCell<HashMap<ObjId, PtrView<dyn Managed>>>,
    by_address: RefCell<HashMap<usize, PtrView<dyn Managed>>>,
    /// Layers already read during the current top-level load
    load_guard: RefCell<HashSet<(ObjId, ClassId)>>,
    /// Layers already written during the current top-level save
    save_guard: RefCell<HashSet<(ObjId, ClassId)>>,
}

impl Domain {
    pub fn new(registry: Arc<Registry>, storage: Arc<dyn DomainStorage>) -> Self {
        Self::with_domain_config(registry, storage, DomainConfig::default())
    }

    pub fn with_config(
        registry: Arc<Registry>,
        storage: Arc<dyn DomainStorage>,
        config: &RuntimeConfig,
    ) -> Self {
        Self::with_domain_config(registry, storage, config.domain.clone())
    }

    fn with_domain_config(
        registry: Arc<Registry>,
        storage: Arc<dyn DomainStorage>,
        config: DomainConfig,
    ) -> Self {
        Self {
            registry,
            storage,
            config,
            by_id: RefCell::new(HashMap::new()),
            by_address: RefCell::new(HashMap::new()),
            load_guard: RefCell::new(HashSet::new()),
            save_guard: RefCell::new(HashSet::new()),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn storage(&self) -> &Arc<dyn DomainStorage> {
        &self.storage
    }

    pub fn config(&self) -> &DomainConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Construction and lookup
    // ------------------------------------------------------------------

    /// Construct an object under a fresh unique id
    pub fn create<T: Managed>(&self, init: impl FnOnce(&Domain) -> T) -> Ptr<T> {
        self.create_with_id(ObjId::generate_unique(), init)
    }

    /// Construct an object under `id`.
    ///
    /// The object is indexed before `init` runs, so `init` can look up
    /// its handle with [`find`](Self::find) (the payload is not there
    /// yet). The payload address is indexed once `init` returns.
    pub fn create_with_id<T: Managed>(&self, id: ObjId, init: impl FnOnce(&Domain) -> T) -> Ptr<T> {
        let ptr = Ptr::<dyn Managed>::pending(ObjIdentity::loaded(id));
        self.add_object(&ptr);

        let value = init(self);
        ptr.place(Box::new(value));
        self.index_address(&ptr);

        trace!(event = "object_create", id = %id, type_name = std::any::type_name::<T>());
        ptr.into_cast::<T>()
    }

    /// Index `ptr` by its id. Invalid ids are not indexed.
    pub fn add_object<T: ?Sized + Pointee>(&self, ptr: &Ptr<T>) {
        let id = ptr.id();
        if !id.is_valid() || ptr.is_null() {
            return;
        }
        self.by_id.borrow_mut().insert(id, ptr.erased_view());
    }

    fn index_address<T: ?Sized + Pointee>(&self, ptr: &Ptr<T>) {
        if let Some(address) = ptr.address() {
            self.by_address.borrow_mut().insert(address, ptr.erased_view());
        }
    }

    /// Forget a resident object; the object itself is unaffected
    pub fn remove_object(&self, id: ObjId) {
        let removed = self.by_id.borrow_mut().remove(&id);
        if removed.is_some() {
            self.by_address.borrow_mut().retain(|_, view| view.identity().id != id);
        }
    }

    /// Handle to a resident object, whatever its state of construction
    pub(crate) fn find_resident(&self, id: ObjId) -> Option<Ptr<dyn Managed>> {
        if !id.is_valid() {
            return None;
        }
        let locked = self.by_id.borrow().get(&id).map(PtrView::lock)?;
        (!locked.is_null()).then_some(locked)
    }

    /// Resident object by id, or an empty handle carrying `id`
    pub fn find(&self, id: ObjId) -> Ptr<dyn Object> {
        self.find_as::<dyn Object>(id)
    }

    pub fn find_as<T: ?Sized + Pointee>(&self, id: ObjId) -> Ptr<T> {
        match self.find_resident(id) {
            Some(ptr) => ptr.into_cast::<T>(),
            None if id.is_valid() => Ptr::unloaded(id),
            None => Ptr::null(),
        }
    }

    /// Resident object whose payload lives at `address`
    pub fn find_by_address(&self, address: usize) -> Ptr<dyn Managed> {
        self.by_address
            .borrow()
            .get(&address)
            .map(PtrView::lock)
            .unwrap_or_default()
    }

    /// Strong handle to an object from a reference to its payload
    pub fn self_ptr<T: Managed>(&self, obj: &T) -> Ptr<T> {
        self.find_by_address(obj as *const T as usize).into_cast::<T>()
    }

    /// Number of live indexed objects
    pub fn resident_count(&self) -> usize {
        self.by_id.borrow().values().filter(|v| v.live_block().is_some()).count()
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Materialize the object `ptr` names.
    ///
    /// A resident object is shared; otherwise the most related
    /// registered class is constructed and its layers loaded. `ptr`
    /// stays empty when the id is invalid or nothing loadable is stored.
    pub fn load_root<T: ?Sized + Pointee>(&self, ptr: &mut Ptr<T>) {
        let _perf = perf::track("domain.load_root");
        self.load_guard.borrow_mut().clear();
        self.load_root_impl(ptr);
    }

    pub(crate) fn load_root_impl(&self, ptr: &mut dyn ErasedPtr) {
        let identity = ptr.identity();
        let id = identity.id;
        if !id.is_valid() {
            return;
        }

        if let Some(resident) = self.find_resident(id) {
            if !ptr.assign(&resident) {
                warn!(event = "load_type_mismatch", id = %id, "resident object has another type");
            }
            return;
        }

        let Some(factory) = self.resolve_factory(id) else {
            debug!(event = "load_missing", id = %id, "no registered class stored for id");
            return;
        };

        let flags = identity.flags.without(ObjFlags::UNLOADED);
        let object = self.construct(&factory, ObjIdentity::new(id, flags));
        self.load_layers_into(&factory, &object, id);

        if !ptr.assign(&object) {
            warn!(event = "load_type_mismatch", id = %id, class = factory.name);
        }
    }

    fn resolve_factory(&self, id: ObjId) -> Option<Factory> {
        let classes = self.storage.enumerate(id);
        self.registry.most_related_factory(&classes).copied()
    }

    fn construct(&self, factory: &Factory, identity: ObjIdentity) -> Ptr<dyn Managed> {
        let object = Ptr::from_box((factory.create)(), identity);
        self.add_object(&object);
        self.index_address(&object);
        object
    }

    fn load_layers_into(&self, factory: &Factory, object: &Ptr<dyn Managed>, source: ObjId) {
        match object.try_borrow_mut() {
            Some(mut payload) => {
                (factory.load)(self, &mut *payload, source);
                log_object_load(object.id(), factory.name);
            }
            None => warn!(event = "load_borrowed", id = %object.id(), "fresh object is borrowed"),
        }
    }

    /// Read every layer of class `T` stored under `id` into `obj`.
    /// Base layers follow through `Dnv::base`.
    pub fn load_object<T: Class>(&self, obj: &mut T, id: ObjId) {
        let class_id = <T as Class>::class_id();
        if !self.load_guard.borrow_mut().insert((id, class_id)) {
            return;
        }

        if T::MIGRATIONS.has(Direction::Load) {
            for (version, handler) in T::MIGRATIONS.steps(Direction::Load) {
                self.read_layer(id, class_id, version, |dnv| handler(obj, dnv));
            }
        } else {
            self.read_layer(id, class_id, T::VERSION, |dnv| Class::visit(obj, dnv));
        }
    }

    fn read_layer(
        &self,
        id: ObjId,
        class_id: ClassId,
        version: u8,
        visit: impl FnOnce(&mut Dnv<'_>),
    ) {
        let bytes = self.storage.load(id, class_id, version).unwrap_or_default();
        let mut reader = LoadVisitor::new(self, id, &bytes);
        visit(&mut Dnv::new(&mut reader));
    }

    /// Instantiate the prefab's stored data as a new object under `copy_id`.
    ///
    /// Returns the resident object when `copy_id` is already loaded, and
    /// an empty handle when either id is invalid.
    ///
    /// # Panics
    ///
    /// When no registered class matches the prefab's stored layers.
    pub fn load_copy<T: ?Sized + Pointee>(&self, prefab: &Ptr<T>, copy_id: ObjId) -> Ptr<T> {
        let prefab_id = prefab.id();
        if !prefab_id.is_valid() || !copy_id.is_valid() {
            return Ptr::null();
        }

        if let Some(resident) = self.find_resident(copy_id) {
            return resident.into_cast::<T>();
        }

        let Some(factory) = self.resolve_factory(prefab_id) else {
            panic!("no registered class for prefab {}", prefab_id);
        };

        let _perf = perf::track("domain.load_copy");
        let flags = prefab.flags().without(ObjFlags::UNLOADED_BY_DEFAULT | ObjFlags::UNLOADED);
        let object = self.construct(&factory, ObjIdentity::new(copy_id, flags));

        self.load_guard.borrow_mut().clear();
        self.load_layers_into(&factory, &object, prefab_id);

        object.into_cast::<T>()
    }

    pub fn load_copy_unique<T: ?Sized + Pointee>(&self, prefab: &Ptr<T>) -> Ptr<T> {
        self.load_copy(prefab, ObjId::generate_unique())
    }

    // ------------------------------------------------------------------
    // Saving
    // ------------------------------------------------------------------

    /// Save the object and everything it strongly references.
    ///
    /// Objects without a valid id, objects of unregistered classes and
    /// objects currently borrowed (including ones already being saved
    /// further up a cycle) are not written.
    pub fn save_root<T: ?Sized + Pointee>(&self, ptr: &Ptr<T>) {
        let _perf = perf::track("domain.save_root");
        self.save_guard.borrow_mut().clear();
        self.save_root_impl(ptr);
    }

    pub(crate) fn save_root_impl(&self, ptr: &dyn ErasedPtr) {
        let Some(block) = ptr.live_block() else {
            return;
        };
        let id = block.identity().id;
        if !id.is_valid() {
            return;
        }

        let Ok(mut slot) = block.slot.try_borrow_mut() else {
            trace!(event = "save_skip_borrowed", id = %id);
            return;
        };
        let Some(payload) = slot.as_deref_mut() else {
            return;
        };
        let Some(class_id) = payload.as_object().map(|o| o.object_class()) else {
            trace!(event = "save_skip_transient", id = %id, type_name = block.type_name());
            return;
        };
        let Some(factory) = self.registry.find_factory(class_id).copied() else {
            warn!(event = "save_unregistered", id = %id, class = %class_id);
            return;
        };

        (factory.save)(self, payload, id);
        log_object_save(id, factory.name);
    }

    /// Write every layer of class `T` of `obj` under `id`
    pub fn save_object<T: Class>(&self, obj: &mut T, id: ObjId) {
        let class_id = <T as Class>::class_id();
        if !self.save_guard.borrow_mut().insert((id, class_id)) {
            return;
        }

        if T::MIGRATIONS.has(Direction::Save) {
            for (version, handler) in T::MIGRATIONS.steps(Direction::Save) {
                self.write_layer(id, class_id, version, |dnv| handler(obj, dnv));
            }
        } else {
            self.write_layer(id, class_id, T::VERSION, |dnv| Class::visit(obj, dnv));
        }
    }

    fn write_layer(
        &self,
        id: ObjId,
        class_id: ClassId,
        version: u8,
        visit: impl FnOnce(&mut Dnv<'_>),
    ) {
        let mut writer = SaveVisitor::new(self, id);
        visit(&mut Dnv::new(&mut writer));
        self.storage.store(id, class_id, version, &writer.into_bytes());
    }

    /// Delete everything persisted for `id`
    pub fn erase(&self, id: ObjId) {
        if id.is_valid() {
            self.storage.remove(id);
        }
    }

    // ------------------------------------------------------------------
    // Updates
    // ------------------------------------------------------------------

    /// Run `Class::update` on every resident object.
    ///
    /// Returns the earliest requested time strictly after `now`,
    /// bounded by `now` plus the configured horizon. Objects that are
    /// borrowed are skipped for this pass.
    pub fn update(&self, now: TimePoint) -> TimePoint {
        let _perf = perf::track("domain.update");
        let mut next = now + self.config.update_horizon();

        let residents: Vec<(ObjId, PtrView<dyn Managed>)> =
            self.by_id.borrow().iter().map(|(id, view)| (*id, view.clone())).collect();

        let mut updated = 0;
        for (id, view) in &residents {
            let Some(block) = view.live_block() else {
                continue;
            };
            let Ok(mut slot) = block.slot.try_borrow_mut() else {
                continue;
            };
            let Some(object) = slot.as_deref_mut().and_then(|p| p.as_object_mut()) else {
                continue;
            };

            updated += 1;
            let Some(at) = object.update_at(now) else {
                continue;
            };

            if at < now {
                if cfg!(debug_assertions) {
                    warn!(event = "update_in_past", id = %id, requested = %at, now = %now);
                }
            } else if at > now && at < next {
                next = at;
            }
        }
        drop(residents);

        let pruned = self.prune();
        log_update_pass(updated, pruned, next.as_millis());
        next
    }

    /// Drop index entries of destroyed objects
    fn prune(&self) -> usize {
        let mut by_id = self.by_id.borrow_mut();
        let before = by_id.len();
        by_id.retain(|_, view| view.live_block().is_some());
        let pruned = before - by_id.len();
        drop(by_id);

        self.by_address.borrow_mut().retain(|_, view| view.live_block().is_some());
        pruned
    }
}

impl std::fmt::Debug for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Domain")
            .field("registry", &self.registry)
            .field("resident", &self.resident_count())
            .finish()
    }
}
