//! Interval bookkeeping for instance storage.
//!
//! [`RegionBuffer`] keeps a sorted set of disjoint half-open intervals. Pushing an
//! interval merges it with every region it overlaps or touches, erasing removes a
//! sub-range and may shrink, split or delete stored regions. The same structure is used
//! for free lists and for dirty upload ranges.
//!
//! [`RegionAllocator`] is a first-fit allocator over a growable index space whose free
//! list is a [`RegionBuffer`].

use std::ops::Range;

use crate::profiling::profile_function;

/// Half-open interval `[begin, end)` over an index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Region {
    pub begin: usize,
    pub end: usize,
}

impl Region {
    /// Creates a region, swapping the bounds if they are given in reverse.
    pub const fn new(begin: usize, end: usize) -> Self {
        if begin > end {
            Self {
                begin: end,
                end: begin,
            }
        } else {
            Self { begin, end }
        }
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.end - self.begin
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    #[inline]
    pub const fn contains(&self, index: usize) -> bool {
        self.begin <= index && index < self.end
    }

    #[inline]
    pub const fn as_range(&self) -> Range<usize> {
        self.begin..self.end
    }
}

impl From<Range<usize>> for Region {
    fn from(range: Range<usize>) -> Self {
        Self::new(range.start, range.end)
    }
}

/// Error returned when querying an empty [`RegionBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionError {
    /// The buffer holds no regions.
    Empty,
}

impl std::fmt::Display for RegionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "region buffer is empty"),
        }
    }
}

impl std::error::Error for RegionError {}

/// Sorted set of disjoint, non-adjacent regions.
///
/// # Invariant
///
/// Stored regions are non-empty, ascending, and no two of them overlap or touch.
/// `len()` is therefore exactly the number of maximal intervals in the union of
/// everything pushed and not erased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionBuffer {
    regions: Vec<Region>,
}

impl RegionBuffer {
    pub const fn new() -> Self {
        Self {
            regions: Vec::new(),
        }
    }

    /// Inserts `[begin, end)`, merging with every overlapping or adjacent region.
    ///
    /// Reversed bounds are swapped. An empty range is ignored.
    pub fn push(&mut self, begin: usize, end: usize) {
        profile_function!();
        let mut merged = Region::new(begin, end);
        if merged.is_empty() {
            return;
        }

        // First region that ends at or after our start touches or overlaps us.
        let start = self.regions.partition_point(|r| r.end < merged.begin);
        let mut stop = start;
        while let Some(region) = self.regions.get(stop) {
            if region.begin > merged.end {
                break;
            }
            merged.begin = merged.begin.min(region.begin);
            merged.end = merged.end.max(region.end);
            stop += 1;
        }

        self.regions.splice(start..stop, std::iter::once(merged));
    }

    /// Removes `[begin, end)` from the tracked regions.
    ///
    /// Regions partially covered are trimmed, a region strictly containing the range is
    /// split in two, and regions fully covered are dropped. Reversed bounds are swapped.
    pub fn erase(&mut self, begin: usize, end: usize) {
        profile_function!();
        let cut = Region::new(begin, end);
        if cut.is_empty() {
            return;
        }

        let start = self.regions.partition_point(|r| r.end <= cut.begin);
        let mut stop = start;
        let mut head = None;
        let mut tail = None;
        while let Some(region) = self.regions.get(stop) {
            if region.begin >= cut.end {
                break;
            }
            if region.begin < cut.begin {
                head = Some(Region::new(region.begin, cut.begin));
            }
            if region.end > cut.end {
                tail = Some(Region::new(cut.end, region.end));
            }
            stop += 1;
        }

        if start == stop {
            return;
        }
        self.regions.splice(start..stop, head.into_iter().chain(tail));
    }

    /// Returns the first stored region.
    pub fn get(&self) -> Result<Region, RegionError> {
        self.regions.first().copied().ok_or(RegionError::Empty)
    }

    /// Returns the last stored region, if any.
    pub fn last(&self) -> Option<Region> {
        self.regions.last().copied()
    }

    /// Whether `index` lies inside any stored region.
    pub fn contains(&self, index: usize) -> bool {
        let at = self.regions.partition_point(|r| r.end <= index);
        self.regions.get(at).is_some_and(|r| r.contains(index))
    }

    /// Sum of the lengths of all stored regions.
    pub fn total_len(&self) -> usize {
        self.regions.iter().map(Region::len).sum()
    }

    pub fn clear(&mut self) {
        self.regions.clear();
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Region> {
        self.regions.iter()
    }

    pub fn as_slice(&self) -> &[Region] {
        &self.regions
    }
}

impl<'a> IntoIterator for &'a RegionBuffer {
    type Item = &'a Region;
    type IntoIter = std::slice::Iter<'a, Region>;

    fn into_iter(self) -> Self::IntoIter {
        self.regions.iter()
    }
}

/// First-fit allocator over a growable index space.
///
/// The allocator never compacts. When nothing fits, [`RegionAllocator::allocate`]
/// returns `None` and the owner is expected to grow its backing storage and call
/// [`RegionAllocator::grow`] before retrying.
#[derive(Debug, Clone, Default)]
pub struct RegionAllocator {
    free: RegionBuffer,
    capacity: usize,
}

impl RegionAllocator {
    /// An allocator over an empty index space.
    pub const fn new() -> Self {
        Self {
            free: RegionBuffer::new(),
            capacity: 0,
        }
    }

    /// An allocator whose whole space `[0, capacity)` starts free.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut allocator = Self::new();
        allocator.grow(capacity);
        allocator
    }

    /// Reserves `size` contiguous indices from the first free region large enough.
    ///
    /// Returns `None` when `size` is zero or no free region fits.
    pub fn allocate(&mut self, size: usize) -> Option<usize> {
        profile_function!();
        if size == 0 {
            return None;
        }
        let begin = self.free.iter().find(|r| r.len() >= size)?.begin;
        self.free.erase(begin, begin + size);
        Some(begin)
    }

    /// Reserves `size` indices, growing the space at its tail if nothing fits.
    ///
    /// Growth only extends the free region that already ends at the tail, so the space
    /// grows by exactly what is missing. A `size` of zero reserves nothing and
    /// returns 0.
    pub fn allocate_or_grow(&mut self, size: usize) -> usize {
        if size == 0 {
            return 0;
        }
        if let Some(offset) = self.allocate(size) {
            return offset;
        }

        let trailing = self
            .free
            .last()
            .filter(|r| r.end == self.capacity)
            .map_or(0, |r| r.len());
        self.grow(size - trailing);

        match self.allocate(size) {
            Some(offset) => offset,
            None => unreachable!("tail region must fit {size} after growth"),
        }
    }

    /// Returns `[begin, end)` to the free list.
    ///
    /// The caller guarantees the range was handed out by this allocator and is not
    /// already free. Double frees are not detected.
    pub fn free(&mut self, begin: usize, end: usize) {
        self.free.push(begin, end);
    }

    /// Appends `additional` free indices at the end of the space.
    ///
    /// Returns the first index of the appended range.
    pub fn grow(&mut self, additional: usize) -> usize {
        let start = self.capacity;
        self.capacity += additional;
        self.free.push(start, self.capacity);
        start
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of indices currently free.
    pub fn free_capacity(&self) -> usize {
        self.free.total_len()
    }

    pub fn free_regions(&self) -> &RegionBuffer {
        &self.free
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regions(buffer: &RegionBuffer) -> Vec<(usize, usize)> {
        buffer.iter().map(|r| (r.begin, r.end)).collect()
    }

    #[test]
    fn test_push_bridges_two_regions() {
        let mut buffer = RegionBuffer::new();
        buffer.push(0, 10);
        buffer.push(20, 30);
        buffer.push(10, 20);
        assert_eq!(regions(&buffer), vec![(0, 30)]);
    }

    #[test]
    fn test_push_inside_existing_is_noop() {
        let mut buffer = RegionBuffer::new();
        buffer.push(0, 100);
        buffer.push(10, 20);
        assert_eq!(regions(&buffer), vec![(0, 100)]);
    }

    #[test]
    fn test_push_empty_range_ignored() {
        let mut buffer = RegionBuffer::new();
        buffer.push(5, 5);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_push_gap_of_one_stays_split() {
        let mut buffer = RegionBuffer::new();
        buffer.push(0, 10);
        buffer.push(11, 20);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_erase_outside_is_noop() {
        let mut buffer = RegionBuffer::new();
        buffer.push(10, 20);
        buffer.erase(0, 10);
        buffer.erase(20, 30);
        assert_eq!(regions(&buffer), vec![(10, 20)]);
    }

    #[test]
    fn test_contains() {
        let mut buffer = RegionBuffer::new();
        buffer.push(10, 20);
        buffer.push(30, 40);
        assert!(buffer.contains(10));
        assert!(buffer.contains(39));
        assert!(!buffer.contains(20));
        assert!(!buffer.contains(25));
    }

    #[test]
    fn test_allocator_first_fit() {
        let mut allocator = RegionAllocator::with_capacity(100);
        assert_eq!(allocator.allocate(10), Some(0));
        assert_eq!(allocator.allocate(10), Some(10));
        allocator.free(0, 10);
        assert_eq!(allocator.allocate(5), Some(0));
        assert_eq!(allocator.allocate(10), Some(20));
    }

    #[test]
    fn test_allocator_zero_size() {
        let mut allocator = RegionAllocator::with_capacity(10);
        assert_eq!(allocator.allocate(0), None);
        assert_eq!(allocator.free_capacity(), 10);
    }

    #[test]
    fn test_allocator_exhaustion() {
        let mut allocator = RegionAllocator::new();
        assert_eq!(allocator.allocate(1), None);

        let mut allocator = RegionAllocator::with_capacity(4);
        assert_eq!(allocator.allocate(5), None);
    }

    #[test]
    fn test_allocate_or_grow_extends_tail() {
        let mut allocator = RegionAllocator::with_capacity(8);
        assert_eq!(allocator.allocate(6), Some(0));
        // 2 free at the tail, growth adds only the missing 2
        assert_eq!(allocator.allocate_or_grow(4), 6);
        assert_eq!(allocator.capacity(), 10);
        assert_eq!(allocator.free_capacity(), 0);
    }

    #[test]
    fn test_allocate_or_grow_without_tail_run() {
        let mut allocator = RegionAllocator::with_capacity(8);
        assert_eq!(allocator.allocate(8), Some(0));
        allocator.free(0, 2);
        assert_eq!(allocator.allocate_or_grow(3), 8);
        assert_eq!(allocator.capacity(), 11);
        assert_eq!(allocator.free_capacity(), 2);
    }
}
