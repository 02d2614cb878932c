use crate::profiling::profile_function;
use std::num::NonZeroU64;

/// Generational handle into a [`SparseSet`].
///
/// The upper 32 bits hold the generation, the lower 32 bits hold `index + 1` so the
/// value is never zero and `Option<IndexSlot>` stays eight bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexSlot(NonZeroU64);

impl IndexSlot {
    pub fn new(generation: u32, idx: u32) -> Self {
        assert!(idx < u32::MAX, "sparse set index overflow");
        // SAFETY: idx + 1 is in 1..=u32::MAX, so the low half is never zero
        Self(unsafe {
            NonZeroU64::new_unchecked(((generation as u64) << 32) | (idx as u64 + 1))
        })
    }

    pub fn generation(&self) -> u32 {
        (self.0.get() >> 32) as u32
    }

    pub fn index(&self) -> u32 {
        (self.0.get() & u32::MAX as u64) as u32 - 1
    }
}

struct Entry<T> {
    generation: u32,
    data: Option<T>,
}

/// Arena with stable generational handles and slot reuse.
pub struct SparseSet<T> {
    entries: Vec<Entry<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> SparseSet<T> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    pub fn push(&mut self, data: T) -> IndexSlot {
        profile_function!();
        self.len += 1;
        if let Some(idx) = self.free.pop() {
            let entry = &mut self.entries[idx as usize];
            entry.data = Some(data);
            IndexSlot::new(entry.generation, idx)
        } else {
            let idx = self.entries.len() as u32;
            self.entries.push(Entry {
                generation: 0,
                data: Some(data),
            });
            IndexSlot::new(0, idx)
        }
    }

    fn entry(&self, idx: IndexSlot) -> Option<&Entry<T>> {
        self.entries
            .get(idx.index() as usize)
            .filter(|entry| entry.generation == idx.generation())
    }

    fn entry_mut(&mut self, idx: IndexSlot) -> Option<&mut Entry<T>> {
        self.entries
            .get_mut(idx.index() as usize)
            .filter(|entry| entry.generation == idx.generation())
    }

    /// # Panics
    /// Panics if the handle is stale.
    pub fn get(&self, idx: IndexSlot) -> &T {
        match self.try_get(idx) {
            Some(data) => data,
            None => panic!("invalid generation, use after free!"),
        }
    }

    /// # Panics
    /// Panics if the handle is stale.
    pub fn get_mut(&mut self, idx: IndexSlot) -> &mut T {
        match self.try_get_mut(idx) {
            Some(data) => data,
            None => panic!("invalid generation, use after free!"),
        }
    }

    pub fn try_get(&self, idx: IndexSlot) -> Option<&T> {
        self.entry(idx).and_then(|entry| entry.data.as_ref())
    }

    pub fn try_get_mut(&mut self, idx: IndexSlot) -> Option<&mut T> {
        self.entry_mut(idx).and_then(|entry| entry.data.as_mut())
    }

    pub fn contains(&self, idx: IndexSlot) -> bool {
        self.try_get(idx).is_some()
    }

    /// Removes the value, bumping the slot generation so old handles go stale.
    pub fn try_remove(&mut self, idx: IndexSlot) -> Option<T> {
        profile_function!();
        let entry = self.entry_mut(idx)?;
        let data = entry.data.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(idx.index());
        self.len -= 1;
        Some(data)
    }

    /// # Panics
    /// Panics if the handle is stale.
    pub fn remove(&mut self, idx: IndexSlot) -> T {
        match self.try_remove(idx) {
            Some(data) => data,
            None => panic!("invalid generation, use after free!"),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (IndexSlot, &T)> {
        self.entries.iter().enumerate().filter_map(|(idx, entry)| {
            entry
                .data
                .as_ref()
                .map(|data| (IndexSlot::new(entry.generation, idx as u32), data))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (IndexSlot, &mut T)> {
        self.entries.iter_mut().enumerate().filter_map(|(idx, entry)| {
            let generation = entry.generation;
            entry
                .data
                .as_mut()
                .map(|data| (IndexSlot::new(generation, idx as u32), data))
        })
    }
}

impl<T> Default for SparseSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

static_assertions::assert_eq_size!(IndexSlot, Option<IndexSlot>);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_set_push() {
        let mut set = SparseSet::<u8>::new();
        let idx = set.push(15);
        assert_eq!(idx.generation(), 0);
        assert_eq!(idx.index(), 0);
        assert_eq!(*set.get(idx), 15);
    }

    #[test]
    #[should_panic]
    fn test_sparse_set_uaf() {
        let mut set = SparseSet::<u8>::new();
        let _ = set.push(15);
        let idx = IndexSlot::new(1, 0);
        let _ = set.get(idx);
    }

    #[test]
    fn test_sparse_set_remove_reuses_slot() {
        let mut set = SparseSet::<u8>::new();
        let idx = set.push(15);
        assert_eq!(set.remove(idx), 15);
        let new_idx = set.push(45);
        assert_eq!(idx.index(), new_idx.index());
        assert_ne!(idx.generation(), new_idx.generation());
        assert_eq!(set.try_get(idx), None);
    }

    #[test]
    fn test_sparse_set_iter_skips_removed() {
        let mut set = SparseSet::<u8>::new();
        let slots: Vec<_> = (0..10).map(|i| set.push(i)).collect();
        set.remove(slots[0]);
        set.remove(slots[5]);
        let values: Vec<u8> = set.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![1, 2, 3, 4, 6, 7, 8, 9]);
        assert_eq!(set.len(), 8);
    }

    #[test]
    fn test_double_remove_is_none() {
        let mut set = SparseSet::<u8>::new();
        let idx = set.push(1);
        assert_eq!(set.try_remove(idx), Some(1));
        assert_eq!(set.try_remove(idx), None);
        assert!(set.is_empty());
    }
}
