//! Shared ownership for the object graph
//!
//! Design: one heap block per object holds the counters, the identity
//! and the payload slot, in the spirit of an intrusive refcount header.
//! - `Ptr<T>` owns a strong count, `PtrView<T>` only a handle count
//! - payload access is checked through the slot's `RefCell`
//! - dropping a `Ptr` that is not the last one runs the cycle analysis
//!   in [`release`], so unreachable cycles die synchronously without a
//!   collector
//!
//! Handles are deliberately `!Send`: the graph is owned by one thread.

mod block;
mod layers;
mod managed;
pub(crate) mod release;
mod strong;
mod view;


pub(crate) use block::RefBlock;
pub use managed::{AsAny, Managed, Pointee};
pub use strong::Ptr;
pub use view::PtrView;
