//! Element-wise visiting of containers
//!
//! Walks see the elements (map values only, never keys). Saving
//! writes the length first; loading rebuilds the container from
//! default elements before visiting them. When the stream has no
//! length to offer, a load leaves the container untouched.

use super::{Dnv, Value, Visitable, VisitMode};
use std::collections::{BTreeMap, VecDeque};

impl<T: Visitable + Default> Visitable for Vec<T> {
    fn accept(&mut self, dnv: &mut Dnv<'_>) {
        let Some(len) = dnv.sequence_len(self.len()) else {
            return;
        };
        self.resize_with(len, T::default);
        for item in self.iter_mut() {
            item.accept(dnv);
        }
    }
}

impl<T: Visitable + Default> Visitable for VecDeque<T> {
    fn accept(&mut self, dnv: &mut Dnv<'_>) {
        let Some(len) = dnv.sequence_len(self.len()) else {
            return;
        };
        self.resize_with(len, T::default);
        for item in self.iter_mut() {
            item.accept(dnv);
        }
    }
}

impl<T: Visitable + Default> Visitable for Option<T> {
    fn accept(&mut self, dnv: &mut Dnv<'_>) {
        let Some(present) = dnv.sequence_len(usize::from(self.is_some())) else {
            return;
        };

        match (present != 0, self.is_some()) {
            (true, false) => *self = Some(T::default()),
            (false, true) => *self = None,
            _ => {}
        }

        if let Some(inner) = self {
            inner.accept(dnv);
        }
    }
}

impl<K, V> Visitable for BTreeMap<K, V>
where
    K: Value + Ord + Clone + Default,
    V: Visitable + Default,
{
    fn accept(&mut self, dnv: &mut Dnv<'_>) {
        match dnv.mode() {
            VisitMode::Walk => {
                for value in self.values_mut() {
                    value.accept(dnv);
                }
            }
            VisitMode::Save => {
                dnv.sequence_len(self.len());
                for (key, value) in self.iter_mut() {
                    let mut key = key.clone();
                    dnv.value(&mut key);
                    value.accept(dnv);
                }
            }
            VisitMode::Load => {
                let Some(len) = dnv.sequence_len(self.len()) else {
                    return;
                };
                self.clear();
                for _ in 0..len {
                    let mut key = K::default();
                    dnv.value(&mut key);
                    let mut value = V::default();
                    value.accept(dnv);
                    self.insert(key, value);
                }
            }
        }
    }
}
