use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use std::io::{Read, Write};

use crate::errors::SGError;
use crate::io::{read_f64, read_flag, read_i32, read_i32_slice, write_f64, write_flag, write_i32, write_i32_slice, TextTokens};
use crate::multi_index_set::MultiIndexSet;

///
/// Journal for out-of-order (dynamic) grid construction: queued tensors with
/// priority weights, plus the values delivered so far for individual nodes.
/// Tensors are ejected into the grid as soon as every one of their product
/// points has a value and all their parents are already part of the grid.
///
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct DynamicConstructorDataGlobal
{
    num_dimensions: usize,
    num_outputs: usize,
    /// queued tensors keyed by multi-index; insertion order is refreshed on
    /// every candidate pass, the weight orders delivery
    tensors: IndexMap<Vec<i32>, PendingTensor>,
    /// values delivered for individual nodes, keyed by point index
    #[serde(with = "loaded_map")]
    loaded: FxHashMap<Vec<i32>, Vec<f64>>,
}

#[derive(Clone, Serialize, Deserialize)]
struct PendingTensor
{
    weight: f64,
    /// true for tensors seeded by `begin_construction` (they survive the
    /// candidate refresh and rank ahead of every scored candidate)
    initial: bool,
    points: MultiIndexSet,
}

// FxHashMap with Vec keys serializes as a list of pairs
mod loaded_map
{
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(map: &FxHashMap<Vec<i32>, Vec<f64>>, serializer: S) -> Result<S::Ok, S::Error>
    {
        let mut entries: Vec<(&Vec<i32>, &Vec<f64>)> = map.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        serde::Serialize::serialize(&entries, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<FxHashMap<Vec<i32>, Vec<f64>>, D::Error>
    {
        let entries: Vec<(Vec<i32>, Vec<f64>)> = serde::Deserialize::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}

impl DynamicConstructorDataGlobal
{
    pub fn new(num_dimensions: usize, num_outputs: usize) -> Self
    {
        Self { num_dimensions, num_outputs, tensors: IndexMap::new(), loaded: FxHashMap::default() }
    }

    /// Queue `tensor` with the given priority weight (lower = more urgent).
    /// `num_points` gives the 1-D point count per level.
    pub fn add_tensor<F: Fn(i32) -> usize>(&mut self, tensor: &[i32], num_points: F, weight: f64, initial: bool)
    {
        if self.tensors.contains_key(tensor)
        {
            return;
        }
        let d = self.num_dimensions;
        let bounds: Vec<usize> = tensor.iter().map(|&l| num_points(l)).collect();
        let total: usize = bounds.iter().product();
        let mut flat = Vec::with_capacity(total * d);
        for i in 0..total
        {
            let mut rem = i;
            let mut p = vec![0i32; d];
            for j in (0..d).rev()
            {
                p[j] = (rem % bounds[j]) as i32;
                rem /= bounds[j];
            }
            flat.extend_from_slice(&p);
        }
        self.tensors.insert(tensor.to_vec(),
            PendingTensor { weight, initial, points: MultiIndexSet::from_indexes(d, flat) });
    }

    /// Drop every scored (non-initial) tensor ahead of a candidate refresh.
    pub fn clear_tensors(&mut self)
    {
        self.tensors.retain(|_, pending| pending.initial);
    }

    /// Tensors seeded by `begin_construction`, as a set.
    pub fn initial_tensors(&self) -> MultiIndexSet
    {
        let mut flat = Vec::new();
        for (tensor, pending) in &self.tensors
        {
            if pending.initial
            {
                flat.extend_from_slice(tensor);
            }
        }
        MultiIndexSet::from_indexes(self.num_dimensions, flat)
    }

    ///
    /// Flat list of the point indices awaiting values, most urgent tensor
    /// first, duplicates across tensors and already-loaded nodes removed.
    ///
    pub fn node_indexes(&self) -> Vec<i32>
    {
        let mut order: Vec<usize> = (0..self.tensors.len()).collect();
        order.sort_by(|&a, &b|
        {
            let wa = self.tensors[a].weight;
            let wb = self.tensors[b].weight;
            wa.partial_cmp(&wb).unwrap_or(std::cmp::Ordering::Equal).then(a.cmp(&b))
        });
        let mut seen: rustc_hash::FxHashSet<&[i32]> = rustc_hash::FxHashSet::default();
        let mut flat = Vec::new();
        for i in order
        {
            for p in self.tensors[i].points.iter()
            {
                if self.loaded.contains_key(p) || !seen.insert(p)
                {
                    continue;
                }
                flat.extend_from_slice(p);
            }
        }
        flat
    }

    /// Record the value of one node. Returns true when some queued tensor
    /// became complete.
    pub fn add_new_node(&mut self, point: &[i32], values: &[f64]) -> Result<bool, SGError>
    {
        if values.len() != self.num_outputs
        {
            return Err(SGError::NumberOfPointsAndValuesMismatch);
        }
        if !self.tensors.values().any(|pending| pending.points.contains(point))
        {
            return Err(SGError::UnknownConstructionPoint);
        }
        self.loaded.insert(point.to_vec(), values.to_vec());
        Ok(self.tensors.values().any(|pending| self.is_complete(pending)))
    }

    fn is_complete(&self, pending: &PendingTensor) -> bool
    {
        pending.points.iter().all(|p| self.loaded.contains_key(p))
    }

    ///
    /// Remove and return a complete queued tensor whose parents are all in
    /// `grid_tensors`, together with its points that are not yet in
    /// `grid_points` and their values (row-major). Returns `None` when no
    /// tensor qualifies.
    ///
    pub fn eject_complete_tensor(&mut self, grid_tensors: &MultiIndexSet, grid_points: &MultiIndexSet)
        -> Option<(Vec<i32>, MultiIndexSet, Vec<f64>)>
    {
        let candidate = self.tensors.iter().find(|(tensor, pending)|
        {
            if !self.is_complete(pending)
            {
                return false;
            }
            let mut parent = (*tensor).clone();
            for j in 0..self.num_dimensions
            {
                if parent[j] > 0
                {
                    parent[j] -= 1;
                    let present = grid_tensors.contains(&parent);
                    parent[j] += 1;
                    if !present
                    {
                        return false;
                    }
                }
            }
            true
        }).map(|(tensor, _)| tensor.clone())?;

        let pending = self.tensors.shift_remove(&candidate).unwrap();
        let new_points = pending.points.diff(grid_points);
        let mut values = Vec::with_capacity(new_points.len() * self.num_outputs);
        for p in new_points.iter()
        {
            values.extend_from_slice(&self.loaded[p]);
        }
        Some((candidate, new_points, values))
    }

    pub fn write_text<W: Write>(&self, writer: &mut W) -> Result<(), SGError>
    {
        let mut out = format!("{} {} {} {}\n", self.num_dimensions, self.num_outputs,
            self.tensors.len(), self.loaded.len());
        for (tensor, pending) in &self.tensors
        {
            out.push_str(&format!("{} {}", crate::io::format_f64(pending.weight),
                if pending.initial { 1 } else { 0 }));
            for &t in tensor
            {
                out.push_str(&format!(" {}", t));
            }
            out.push('\n');
        }
        let mut entries: Vec<(&Vec<i32>, &Vec<f64>)> = self.loaded.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        for (point, values) in entries
        {
            for &p in point
            {
                out.push_str(&format!("{} ", p));
            }
            for &v in values
            {
                out.push_str(&format!("{} ", crate::io::format_f64(v)));
            }
            out.push('\n');
        }
        writer.write_all(out.as_bytes()).map_err(|_| SGError::WriteBufferFailed)
    }

    pub fn read_text<F: Fn(i32) -> usize>(tokens: &mut TextTokens, num_points: F) -> Result<Self, SGError>
    {
        let num_dimensions = tokens.usize()?;
        let num_outputs = tokens.usize()?;
        let num_tensors = tokens.usize()?;
        let num_loaded = tokens.usize()?;
        let mut journal = Self::new(num_dimensions, num_outputs);
        for _ in 0..num_tensors
        {
            let weight = tokens.f64()?;
            let initial = tokens.i32()? == 1;
            let mut tensor = vec![0i32; num_dimensions];
            for t in tensor.iter_mut()
            {
                *t = tokens.i32()?;
            }
            journal.add_tensor(&tensor, &num_points, weight, initial);
        }
        for _ in 0..num_loaded
        {
            let mut point = vec![0i32; num_dimensions];
            for p in point.iter_mut()
            {
                *p = tokens.i32()?;
            }
            let mut values = vec![0.0; num_outputs];
            for v in values.iter_mut()
            {
                *v = tokens.f64()?;
            }
            journal.loaded.insert(point, values);
        }
        Ok(journal)
    }

    pub fn write_binary<W: Write>(&self, writer: &mut W) -> Result<(), SGError>
    {
        write_i32(writer, self.num_dimensions as i32)?;
        write_i32(writer, self.num_outputs as i32)?;
        write_i32(writer, self.tensors.len() as i32)?;
        write_i32(writer, self.loaded.len() as i32)?;
        for (tensor, pending) in &self.tensors
        {
            write_f64(writer, pending.weight)?;
            write_flag(writer, pending.initial)?;
            write_i32_slice(writer, tensor)?;
        }
        let mut entries: Vec<(&Vec<i32>, &Vec<f64>)> = self.loaded.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        for (point, values) in entries
        {
            write_i32_slice(writer, point)?;
            for &v in values.iter()
            {
                write_f64(writer, v)?;
            }
        }
        Ok(())
    }

    pub fn read_binary<R: Read, F: Fn(i32) -> usize>(reader: &mut R, num_points: F) -> Result<Self, SGError>
    {
        let num_dimensions = read_i32(reader)? as usize;
        let num_outputs = read_i32(reader)? as usize;
        let num_tensors = read_i32(reader)? as usize;
        let num_loaded = read_i32(reader)? as usize;
        let mut journal = Self::new(num_dimensions, num_outputs);
        for _ in 0..num_tensors
        {
            let weight = read_f64(reader)?;
            let initial = read_flag(reader)?;
            let tensor = read_i32_slice(reader, num_dimensions)?;
            journal.add_tensor(&tensor, &num_points, weight, initial);
        }
        for _ in 0..num_loaded
        {
            let point = read_i32_slice(reader, num_dimensions)?;
            let mut values = vec![0.0; num_outputs];
            for v in values.iter_mut()
            {
                *v = read_f64(reader)?;
            }
            journal.loaded.insert(point, values);
        }
        Ok(journal)
    }

    /// Largest level referenced by any queued tensor.
    pub fn max_level(&self) -> i32
    {
        self.tensors.keys().flat_map(|t| t.iter().copied()).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn cc_points(level: i32) -> usize
    {
        if level == 0 { 1 } else { (1usize << level) + 1 }
    }

    #[test]
    fn tensors_complete_out_of_order()
    {
        let mut journal = DynamicConstructorDataGlobal::new(2, 1);
        journal.add_tensor(&[0, 0], cc_points, -1.0, true);
        journal.add_tensor(&[1, 0], cc_points, 0.5, false);
        let nodes = journal.node_indexes();
        // (0,0) has one point, (1,0) adds (1,0) and (2,0)
        assert_eq!(nodes.len(), 6);
        assert_eq!(&nodes[..2], &[0, 0]); // the urgent initial tensor leads

        // deliver the child tensor's points first
        assert!(!journal.add_new_node(&[1, 0], &[2.0]).unwrap());
        assert!(!journal.add_new_node(&[2, 0], &[3.0]).unwrap());
        // (1,0) is complete only once the shared origin arrives
        assert!(journal.add_new_node(&[0, 0], &[1.0]).unwrap());

        let empty = MultiIndexSet::new(2);
        let (tensor, points, values) = journal.eject_complete_tensor(&empty, &empty).unwrap();
        assert_eq!(tensor, vec![0, 0]);
        assert_eq!(points.len(), 1);
        assert_eq!(values, vec![1.0]);

        // (1,0) cannot eject until (0,0) is part of the grid
        let grid_tensors = MultiIndexSet::from_indexes(2, vec![0, 0]);
        let grid_points = MultiIndexSet::from_indexes(2, vec![0, 0]);
        let (tensor, points, values) = journal.eject_complete_tensor(&grid_tensors, &grid_points).unwrap();
        assert_eq!(tensor, vec![1, 0]);
        assert_eq!(points.len(), 2);
        assert_eq!(values, vec![2.0, 3.0]);
        assert!(journal.eject_complete_tensor(&grid_tensors, &grid_points).is_none());
    }

    #[test]
    fn unknown_points_are_rejected()
    {
        let mut journal = DynamicConstructorDataGlobal::new(2, 1);
        journal.add_tensor(&[0, 0], cc_points, -1.0, true);
        assert_eq!(journal.add_new_node(&[5, 5], &[1.0]).unwrap_err(), SGError::UnknownConstructionPoint);
        assert_eq!(journal.add_new_node(&[0, 0], &[1.0, 2.0]).unwrap_err(),
            SGError::NumberOfPointsAndValuesMismatch);
    }

    #[test]
    fn binary_round_trip()
    {
        let mut journal = DynamicConstructorDataGlobal::new(2, 1);
        journal.add_tensor(&[0, 0], cc_points, -1.0, true);
        journal.add_tensor(&[0, 1], cc_points, 0.25, false);
        journal.add_new_node(&[0, 1], &[4.0]).unwrap();
        let mut buffer = Vec::new();
        journal.write_binary(&mut buffer).unwrap();
        let back = DynamicConstructorDataGlobal::read_binary(&mut buffer.as_slice(), cc_points).unwrap();
        assert_eq!(back.node_indexes(), journal.node_indexes());
        assert_eq!(back.max_level(), 1);
    }
}
