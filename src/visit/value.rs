//! Leaf values
//!
//! A leaf is anything serde can encode. The stream format is bincode's
//! default (fixed-width little endian), one value after another in
//! visit order; nothing else about the layout is relied upon.

use super::{Dnv, Visitable};
use crate::obj::{ClassId, ObjFlags, ObjId, ObjIdentity, TimePoint};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Object-safe encode/decode for a leaf field
pub trait Value {
    fn encode(&self, out: &mut Vec<u8>) -> bincode::Result<()>;

    /// On failure the value is left as it was
    fn decode(&mut self, input: &mut &[u8]) -> bincode::Result<()>;
}

impl<T: Serialize + DeserializeOwned> Value for T {
    #[inline]
    fn encode(&self, out: &mut Vec<u8>) -> bincode::Result<()> {
        bincode::serialize_into(out, self)
    }

    #[inline]
    fn decode(&mut self, input: &mut &[u8]) -> bincode::Result<()> {
        *self = bincode::deserialize_from(input)?;
        Ok(())
    }
}

macro_rules! leaf_visitable {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Visitable for $ty {
                #[inline]
                fn accept(&mut self, dnv: &mut Dnv<'_>) {
                    dnv.value(self);
                }
            }
        )*
    };
}

leaf_visitable!(
    bool, u8, u16, u32, u64, u128, i8, i16, i32, i64, i128, f32, f64, char, String,
    ObjId, ObjFlags, ObjIdentity, ClassId, TimePoint,
);
