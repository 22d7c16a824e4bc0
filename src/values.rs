use serde::{Deserialize, Serialize};

use crate::errors::SGError;
use crate::multi_index_set::MultiIndexSet;

///
/// Row-major (point, output) storage of loaded function values, kept aligned
/// with the lexicographic order of the owning point set.
///
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ValueStorage
{
    num_outputs: usize,
    values: Vec<f64>,
}

impl ValueStorage
{
    pub fn new(num_outputs: usize) -> Self
    {
        Self { num_outputs, values: Vec::new() }
    }

    pub fn resize(&mut self, num_outputs: usize, num_points: usize)
    {
        self.num_outputs = num_outputs;
        self.values = vec![0.0; num_outputs * num_points];
    }

    pub fn num_outputs(&self) -> usize
    {
        self.num_outputs
    }

    pub fn num_points(&self) -> usize
    {
        if self.num_outputs == 0 { 0 } else { self.values.len() / self.num_outputs }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.values.is_empty()
    }

    pub fn row(&self, i: usize) -> &[f64]
    {
        &self.values[i * self.num_outputs..(i + 1) * self.num_outputs]
    }

    pub fn flat(&self) -> &[f64]
    {
        &self.values
    }

    pub fn set_values(&mut self, values: &[f64], expected_points: usize) -> Result<(), SGError>
    {
        if values.len() != expected_points * self.num_outputs
        {
            return Err(SGError::NumberOfPointsAndValuesMismatch);
        }
        self.values = values.to_vec();
        Ok(())
    }

    pub fn set_values_vec(&mut self, values: Vec<f64>, expected_points: usize) -> Result<(), SGError>
    {
        if values.len() != expected_points * self.num_outputs
        {
            return Err(SGError::NumberOfPointsAndValuesMismatch);
        }
        self.values = values;
        Ok(())
    }

    ///
    /// Merge rows for the disjoint sorted sets `points` (already stored) and
    /// `needed` (rows in `new_values`), leaving the storage aligned with the
    /// sorted union of the two sets.
    ///
    pub fn add_values(&mut self, points: &MultiIndexSet, needed: &MultiIndexSet, new_values: &[f64])
        -> Result<(), SGError>
    {
        if new_values.len() != needed.len() * self.num_outputs
        {
            return Err(SGError::NumberOfPointsAndValuesMismatch);
        }
        let m = self.num_outputs;
        let mut merged = Vec::with_capacity(self.values.len() + new_values.len());
        let mut old_row = 0;
        let mut new_row = 0;
        while old_row < points.len() || new_row < needed.len()
        {
            let take_old = if old_row >= points.len()
            {
                false
            }
            else if new_row >= needed.len()
            {
                true
            }
            else
            {
                points.index(old_row) < needed.index(new_row)
            };
            if take_old
            {
                merged.extend_from_slice(&self.values[old_row * m..(old_row + 1) * m]);
                old_row += 1;
            }
            else
            {
                merged.extend_from_slice(&new_values[new_row * m..(new_row + 1) * m]);
                new_row += 1;
            }
        }
        self.values = merged;
        Ok(())
    }
}

#[test]
fn merge_keeps_rows_aligned_with_sorted_union()
{
    let points = MultiIndexSet::from_indexes(1, vec![0, 2]);
    let needed = MultiIndexSet::from_indexes(1, vec![1, 3]);
    let mut storage = ValueStorage::new(2);
    storage.set_values(&[0.0, 10.0, 2.0, 12.0], 2).unwrap();
    storage.add_values(&points, &needed, &[1.0, 11.0, 3.0, 13.0]).unwrap();
    assert_eq!(storage.num_points(), 4);
    for i in 0..4
    {
        assert_eq!(storage.row(i), &[i as f64, 10.0 + i as f64]);
    }
}

#[test]
fn mismatched_row_count_is_rejected()
{
    let mut storage = ValueStorage::new(3);
    assert_eq!(storage.set_values(&[1.0; 7], 2), Err(SGError::NumberOfPointsAndValuesMismatch));
    assert!(storage.set_values(&[1.0; 6], 2).is_ok());
}
