use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

///
/// Ordered set of multi-indices: `d`-tuples of non-negative integers stored as
/// consecutive slices of a flat vector, sorted lexicographically. Lookup is a
/// binary search; union and difference are sorted merges.
///
#[derive(Clone, Default, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct MultiIndexSet
{
    num_dimensions: usize,
    indexes: Vec<i32>,
}

impl MultiIndexSet
{
    pub fn new(num_dimensions: usize) -> Self
    {
        Self { num_dimensions, indexes: Vec::new() }
    }

    /// Build a set from a flat list of tuples; sorts and removes duplicates.
    pub fn from_indexes(num_dimensions: usize, indexes: Vec<i32>) -> Self
    {
        let mut rows: Vec<&[i32]> = indexes.chunks_exact(num_dimensions).collect();
        rows.sort_unstable();
        rows.dedup();
        let mut flat = Vec::with_capacity(rows.len() * num_dimensions);
        for row in rows
        {
            flat.extend_from_slice(row);
        }
        Self { num_dimensions, indexes: flat }
    }

    pub fn num_dimensions(&self) -> usize
    {
        self.num_dimensions
    }

    pub fn len(&self) -> usize
    {
        if self.num_dimensions == 0 { 0 } else { self.indexes.len() / self.num_dimensions }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.indexes.is_empty()
    }

    pub fn index(&self, i: usize) -> &[i32]
    {
        &self.indexes[i * self.num_dimensions..(i + 1) * self.num_dimensions]
    }

    pub fn iter(&self) -> std::slice::ChunksExact<'_, i32>
    {
        self.indexes.chunks_exact(self.num_dimensions.max(1))
    }

    pub fn flat(&self) -> &[i32]
    {
        &self.indexes
    }

    /// Position of `index` in lexicographic order, if present.
    pub fn position(&self, index: &[i32]) -> Option<usize>
    {
        let mut lo = 0;
        let mut hi = self.len();
        while lo < hi
        {
            let mid = (lo + hi) / 2;
            match self.index(mid).cmp(index)
            {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Some(mid),
            }
        }
        None
    }

    pub fn contains(&self, index: &[i32]) -> bool
    {
        self.position(index).is_some()
    }

    pub fn missing(&self, index: &[i32]) -> bool
    {
        self.position(index).is_none()
    }

    /// Insert every index of `other`, preserving sorted order.
    pub fn add_set(&mut self, other: &MultiIndexSet)
    {
        if other.is_empty()
        {
            return;
        }
        if self.is_empty()
        {
            self.num_dimensions = other.num_dimensions;
            self.indexes = other.indexes.clone();
            return;
        }
        let d = self.num_dimensions;
        let mut merged = Vec::with_capacity(self.indexes.len() + other.indexes.len());
        let mut a = self.indexes.chunks_exact(d).peekable();
        let mut b = other.indexes.chunks_exact(d).peekable();
        while let (Some(&ra), Some(&rb)) = (a.peek(), b.peek())
        {
            match ra.cmp(rb)
            {
                Ordering::Less => { merged.extend_from_slice(ra); a.next(); }
                Ordering::Greater => { merged.extend_from_slice(rb); b.next(); }
                Ordering::Equal => { merged.extend_from_slice(ra); a.next(); b.next(); }
            }
        }
        for row in a { merged.extend_from_slice(row); }
        for row in b { merged.extend_from_slice(row); }
        self.indexes = merged;
    }

    /// Indices of `self` that are not in `other`.
    pub fn diff(&self, other: &MultiIndexSet) -> MultiIndexSet
    {
        let mut flat = Vec::new();
        for row in self.iter()
        {
            if other.is_empty() || other.missing(row)
            {
                flat.extend_from_slice(row);
            }
        }
        MultiIndexSet { num_dimensions: self.num_dimensions, indexes: flat }
    }

    /// Insert a single index, keeping the set sorted. No-op when present.
    pub fn insert(&mut self, index: &[i32])
    {
        debug_assert_eq!(index.len(), self.num_dimensions);
        let mut lo = 0;
        let mut hi = self.len();
        while lo < hi
        {
            let mid = (lo + hi) / 2;
            match self.index(mid).cmp(index)
            {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return,
            }
        }
        let at = lo * self.num_dimensions;
        self.indexes.splice(at..at, index.iter().copied());
    }

    /// Per-dimension maximum over all indices (zeros for an empty set).
    pub fn max_per_dimension(&self) -> Vec<i32>
    {
        let mut max_levels = vec![0; self.num_dimensions];
        for row in self.iter()
        {
            for (m, &v) in max_levels.iter_mut().zip(row)
            {
                *m = (*m).max(v);
            }
        }
        max_levels
    }
}

#[test]
fn insertion_keeps_lexicographic_order()
{
    let mut set = MultiIndexSet::new(2);
    set.insert(&[1, 0]);
    set.insert(&[0, 1]);
    set.insert(&[0, 0]);
    set.insert(&[0, 1]);
    assert_eq!(set.len(), 3);
    assert_eq!(set.flat(), &[0, 0, 0, 1, 1, 0]);
    assert_eq!(set.position(&[0, 1]), Some(1));
    assert!(set.missing(&[1, 1]));
}

#[test]
fn union_and_difference()
{
    let a = MultiIndexSet::from_indexes(2, vec![0, 0, 1, 0, 0, 2]);
    let b = MultiIndexSet::from_indexes(2, vec![0, 0, 0, 1]);
    let mut u = a.clone();
    u.add_set(&b);
    assert_eq!(u.flat(), &[0, 0, 0, 1, 0, 2, 1, 0]);
    let d = a.diff(&b);
    assert_eq!(d.flat(), &[0, 2, 1, 0]);
}

#[test]
fn from_indexes_sorts_and_dedups()
{
    let set = MultiIndexSet::from_indexes(3, vec![2, 0, 0, 0, 0, 1, 2, 0, 0]);
    assert_eq!(set.len(), 2);
    assert_eq!(set.index(0), &[0, 0, 1]);
    assert_eq!(set.max_per_dimension(), vec![2, 0, 1]);
}
