//! Typed indices and index-addressed storage.
//!
//! Every entity of the synthesis IR (graph nodes, stages, stage outputs,
//! node contexts, resources, ...) lives in an [IndexedMap] and is referred to
//! by a small copyable index type. Indices are never reused, so a stale index
//! can be detected but never silently aliases another entity.
use std::marker::PhantomData;
use std::ops;

pub trait IndexRef: Copy + Eq + Ord {
    fn index(&self) -> usize;
    fn new(input: usize) -> Self;
}

#[macro_export]
/// Implement [IndexRef] for a newtype around a `u32`, together with the
/// conversions and formatting used throughout the IR. The prefix is used
/// when the index is printed, e.g. `%12` for nodes.
macro_rules! impl_index {
    ($struct_name: ident, $prefix: literal) => {
        impl $crate::IndexRef for $struct_name {
            fn index(&self) -> usize {
                self.0 as usize
            }

            fn new(input: usize) -> Self {
                Self(input as u32)
            }
        }

        impl From<u32> for $struct_name {
            fn from(input: u32) -> Self {
                $struct_name(input)
            }
        }

        impl std::fmt::Display for $struct_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }

        impl std::fmt::Debug for $struct_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }
    };
}

/// Densely packed storage addressed by a typed index.
#[derive(Clone)]
pub struct IndexedMap<K, D>
where
    K: IndexRef,
{
    data: Vec<D>,
    phantom: PhantomData<K>,
}

impl<K, D> Default for IndexedMap<K, D>
where
    K: IndexRef,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, D> ops::Index<K> for IndexedMap<K, D>
where
    K: IndexRef,
{
    type Output = D;

    fn index(&self, index: K) -> &Self::Output {
        &self.data[index.index()]
    }
}

impl<K, D> ops::IndexMut<K> for IndexedMap<K, D>
where
    K: IndexRef,
{
    fn index_mut(&mut self, index: K) -> &mut Self::Output {
        &mut self.data[index.index()]
    }
}

impl<K, D> IndexedMap<K, D>
where
    K: IndexRef,
{
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            phantom: PhantomData,
        }
    }

    pub fn get(&self, index: K) -> Option<&D> {
        self.data.get(index.index())
    }

    pub fn get_mut(&mut self, index: K) -> Option<&mut D> {
        self.data.get_mut(index.index())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn push(&mut self, item: D) -> K {
        self.data.push(item);
        K::new(self.data.len() - 1)
    }

    pub fn peek_next_idx(&self) -> K {
        K::new(self.data.len())
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (K, &D)> {
        self.data.iter().enumerate().map(|(i, v)| (K::new(i), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (K, &mut D)> {
        self.data
            .iter_mut()
            .enumerate()
            .map(|(i, v)| (K::new(i), v))
    }

    pub fn keys(&self) -> impl DoubleEndedIterator<Item = K> + use<K, D> {
        (0..self.data.len()).map(K::new)
    }

    pub fn values(&self) -> impl Iterator<Item = &D> {
        self.data.iter()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut D> {
        self.data.iter_mut()
    }

    /// Find the first entry satisfying `pred`.
    pub fn position<F>(&self, mut pred: F) -> Option<K>
    where
        F: FnMut(&D) -> bool,
    {
        self.data.iter().position(|d| pred(d)).map(K::new)
    }
}

impl<K, D> std::fmt::Debug for IndexedMap<K, D>
where
    K: IndexRef + std::fmt::Debug,
    D: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Side table associating data with a subset of the keys of some primary
/// [IndexedMap]. Missing entries read as the default value.
#[derive(Clone, Debug)]
pub struct SecondaryMap<K, D>
where
    K: IndexRef,
    D: Default,
{
    data: Vec<D>,
    default: D,
    phantom: PhantomData<K>,
}

impl<K, D> Default for SecondaryMap<K, D>
where
    K: IndexRef,
    D: Default,
{
    fn default() -> Self {
        Self {
            data: Vec::new(),
            default: D::default(),
            phantom: PhantomData,
        }
    }
}

impl<K, D> SecondaryMap<K, D>
where
    K: IndexRef,
    D: Default,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: K) -> &D {
        self.data.get(key.index()).unwrap_or(&self.default)
    }

    pub fn get_mut(&mut self, key: K) -> &mut D {
        if key.index() >= self.data.len() {
            self.data.resize_with(key.index() + 1, D::default);
        }
        &mut self.data[key.index()]
    }

    pub fn insert(&mut self, key: K, value: D) {
        *self.get_mut(key) = value;
    }

    pub fn take(&mut self, key: K) -> D {
        match self.data.get_mut(key.index()) {
            Some(v) => std::mem::take(v),
            None => D::default(),
        }
    }
}

impl<K, D> ops::Index<K> for SecondaryMap<K, D>
where
    K: IndexRef,
    D: Default,
{
    type Output = D;

    fn index(&self, index: K) -> &Self::Output {
        self.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    struct TestIdx(u32);
    impl_index!(TestIdx, "t");

    #[test]
    fn push_returns_sequential_keys() {
        let mut map: IndexedMap<TestIdx, &str> = IndexedMap::new();
        let a = map.push("a");
        let b = map.push("b");
        assert_eq!(a, TestIdx(0));
        assert_eq!(b, TestIdx(1));
        assert_eq!(map[b], "b");
        assert_eq!(map.peek_next_idx(), TestIdx(2));
        assert_eq!(format!("{b}"), "t1");
    }

    #[test]
    fn secondary_map_defaults() {
        let mut side: SecondaryMap<TestIdx, Vec<u32>> = SecondaryMap::new();
        assert!(side[TestIdx(7)].is_empty());
        side.get_mut(TestIdx(3)).push(4);
        assert_eq!(side[TestIdx(3)], vec![4]);
        assert_eq!(side.take(TestIdx(3)), vec![4]);
        assert!(side[TestIdx(3)].is_empty());
    }

    proptest! {
        #[test]
        fn keys_match_iteration(items in proptest::collection::vec(any::<u8>(), 0..64)) {
            let mut map: IndexedMap<TestIdx, u8> = IndexedMap::new();
            let keys: Vec<_> = items.iter().map(|i| map.push(*i)).collect();
            prop_assert_eq!(map.keys().collect::<Vec<_>>(), keys.clone());
            for (k, v) in map.iter() {
                prop_assert_eq!(*v, items[k.index()]);
            }
        }
    }
}
