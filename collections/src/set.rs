use fixedbitset::FixedBitSet;
use std::marker::PhantomData;

/// A set of values that can be converted into small unsigned integers.
/// The underlying implementation uses a bitset to keep track of the values present in the set.
pub struct RefSet<K> {
    set: FixedBitSet,
    _phantom: PhantomData<K>,
}

impl<K: Into<usize>> RefSet<K> {
    pub fn new() -> RefSet<K> {
        RefSet {
            set: FixedBitSet::new(),
            _phantom: PhantomData,
        }
    }

    fn ensure_capacity(&mut self, bit: usize) {
        if bit >= self.set.len() {
            self.set.grow(bit + 1);
        }
    }

    pub fn insert(&mut self, k: K) {
        let bit = k.into();
        self.ensure_capacity(bit);
        self.set.insert(bit);
    }

    pub fn remove(&mut self, k: K) {
        let bit = k.into();
        if bit < self.set.len() {
            self.set.set(bit, false);
        }
    }

    pub fn clear(&mut self) {
        self.set.clear()
    }

    pub fn contains(&self, k: K) -> bool {
        let bit = k.into();
        bit < self.set.len() && self.set.contains(bit)
    }
}

impl<K: Into<usize>> Default for RefSet<K> {
    fn default() -> Self {
        Self::new()
    }
}
