//! Domain runtime - ref-counted object graph with persistence
//!
//! This crate provides the ownership and persistence layer that
//! application objects are declared on:
//! - [`Ptr`] / [`PtrView`]: strong and observing handles whose release
//!   collects unreachable cycles synchronously
//! - [`visit`]: one field enumeration per type, reused for graph walks,
//!   saving and loading
//! - [`Registry`]: class factories and the inheritance graph
//! - [`Domain`]: resident-object indices, versioned load/save through a
//!   [`DomainStorage`], prefab copies and scheduled updates
//!
//! The graph is single-threaded: handles are neither `Send` nor `Sync`.

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod obj;
pub mod ptr;
pub mod registry;
pub mod version;
pub mod visit;

// Re-export core types
pub use config::{DomainConfig, RuntimeConfig};
pub use domain::{Domain, DomainStorage, FileStorage, MapStorage};
pub use error::{ConfigError, StorageError};
pub use obj::{Class, ClassId, Obj, ObjFlags, ObjId, ObjIdentity, Object, TimePoint};
pub use ptr::{Managed, Pointee, Ptr, PtrView};
pub use registry::{Factory, Registry};
pub use version::{Direction, MigrationTable, MAX_VERSION};
pub use visit::{Dnv, Edge, VisitMode, VisitPolicy, Visitable};
