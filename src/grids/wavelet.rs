use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, IntoParallelRefMutIterator, ParallelIterator};
use rayon::slice::{ParallelSlice, ParallelSliceMut};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::errors::SGError;
use crate::multi_index_manipulation::generate_nested_points;
use crate::multi_index_set::MultiIndexSet;
use crate::sparse::SparseMatrix;
use crate::tensor_selection::{select_tensors, TensorSelection};
use crate::values::ValueStorage;
use crate::wavelet_rule::WaveletRule;

/// How surplus refinement decides which directions of a point to refine.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefinementStrategy
{
    /// Refine every direction of a point whose coefficient is significant.
    #[default]
    Classic,
    /// As classic, but insert missing parents before any children.
    ParentsFirst,
    /// Refine a direction only when both the global coefficient and the
    /// matching one dimensional line coefficient are significant (FDS).
    DirectionSelective,
}

impl RefinementStrategy
{
    fn uses_parents(&self) -> bool
    {
        matches!(self, RefinementStrategy::ParentsFirst | RefinementStrategy::DirectionSelective)
    }
}

///
/// Sparse grid in a nested wavelet basis (order 1 or 3) on dyadic nodes.
/// The basis is not interpolatory, so coefficients come from solving the
/// explicitly assembled sparse collocation matrix; quadrature and
/// interpolation weights come from transpose solves against it.
///
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct WaveletGrid
{
    pub(crate) num_dimensions: usize,
    pub(crate) num_outputs: usize,
    pub(crate) order: i32,
    pub(crate) points: MultiIndexSet,
    pub(crate) needed: MultiIndexSet,
    pub(crate) values: ValueStorage,
    /// collocation coefficients, row-major (point, output)
    pub(crate) coefficients: Vec<f64>,
    #[serde(skip)]
    pub(crate) inter_matrix: SparseMatrix,
}

impl WaveletGrid
{
    pub fn make(num_dimensions: usize, num_outputs: usize, depth: i32, order: i32,
        level_limits: &[i32]) -> Result<Self, SGError>
    {
        if order != 1 && order != 3
        {
            return Err(SGError::UnknownRule);
        }
        let rule = WaveletRule::new(order);
        // wavelet grids always select by total level
        let tensors = select_tensors(num_dimensions, depth, TensorSelection::Level, &[],
            crate::rules::SparseGridRule::ClenshawCurtis, None, level_limits)?;
        let needed = generate_nested_points(&tensors, |l| rule.num_points(l));
        let mut grid = Self
        {
            num_dimensions,
            num_outputs,
            order,
            points: MultiIndexSet::new(num_dimensions),
            needed,
            values: ValueStorage::new(num_outputs),
            coefficients: Vec::new(),
            inter_matrix: SparseMatrix::default(),
        };
        if num_outputs == 0
        {
            grid.points = std::mem::take(&mut grid.needed);
        }
        grid.build_interpolation_matrix()?;
        Ok(grid)
    }

    /// Build a grid over an explicit node set (used by the direction-split
    /// refinement and by external coefficient loading).
    pub(crate) fn set_nodes(nodes: MultiIndexSet, num_outputs: usize, order: i32) -> Result<Self, SGError>
    {
        let num_dimensions = nodes.num_dimensions();
        let mut grid = Self
        {
            num_dimensions,
            num_outputs,
            order,
            points: MultiIndexSet::new(num_dimensions),
            needed: MultiIndexSet::new(num_dimensions),
            values: ValueStorage::new(num_outputs),
            coefficients: Vec::new(),
            inter_matrix: SparseMatrix::default(),
        };
        if num_outputs == 0
        {
            grid.points = nodes;
        }
        else
        {
            grid.needed = nodes;
        }
        grid.build_interpolation_matrix()?;
        Ok(grid)
    }

    pub fn num_dimensions(&self) -> usize
    {
        self.num_dimensions
    }

    pub fn num_outputs(&self) -> usize
    {
        self.num_outputs
    }

    pub fn order(&self) -> i32
    {
        self.order
    }

    pub(crate) fn rule(&self) -> WaveletRule
    {
        WaveletRule::new(self.order)
    }

    pub fn num_loaded(&self) -> usize
    {
        if self.num_outputs == 0 || self.values.is_empty() { 0 } else { self.points.len() }
    }

    pub fn num_needed(&self) -> usize
    {
        self.needed.len()
    }

    pub fn num_points(&self) -> usize
    {
        if self.points.is_empty() { self.needed.len() } else { self.points.len() }
    }

    pub(crate) fn work_set(&self) -> &MultiIndexSet
    {
        if self.points.is_empty() { &self.needed } else { &self.points }
    }

    fn map_indexes_to_nodes(&self, set: &MultiIndexSet) -> Vec<f64>
    {
        let rule = self.rule();
        let d = self.num_dimensions;
        let mut x = vec![0.0; set.len() * d];
        for (chunk, p) in x.chunks_exact_mut(d).zip(set.iter())
        {
            for j in 0..d
            {
                chunk[j] = rule.get_node(p[j]);
            }
        }
        x
    }

    pub fn loaded_points(&self) -> Vec<f64>
    {
        self.map_indexes_to_nodes(&self.points)
    }

    pub fn needed_points(&self) -> Vec<f64>
    {
        self.map_indexes_to_nodes(&self.needed)
    }

    pub fn points(&self) -> Vec<f64>
    {
        self.map_indexes_to_nodes(self.work_set())
    }

    fn eval_basis(&self, p: &[i32], x: &[f64]) -> f64
    {
        let rule = self.rule();
        let mut v = 1.0;
        for (&pj, &xj) in p.iter().zip(x)
        {
            v *= rule.eval(pj, xj);
            if v == 0.0
            {
                break;
            }
        }
        v
    }

    fn eval_integral(&self, p: &[i32]) -> f64
    {
        let rule = self.rule();
        let mut v = 1.0;
        for &pj in p
        {
            v *= rule.get_weight(pj);
            if v == 0.0
            {
                break;
            }
        }
        v
    }

    ///
    /// Assemble the sparse collocation matrix `M[i][k] = psi_k(x_i)` over the
    /// working point set. Rows are built in blocks of 32 in parallel; the
    /// wavelet supports are cheap to test but expensive to evaluate, so each
    /// product bails at the first zero factor.
    ///
    pub(crate) fn build_interpolation_matrix(&mut self) -> Result<(), SGError>
    {
        let work = self.work_set();
        let num_points = work.len();
        let d = self.num_dimensions;
        let rule = self.rule();
        if num_points == 0
        {
            self.inter_matrix = SparseMatrix::default();
            return Ok(());
        }

        let num_chunk = 32;
        let num_blocks = num_points.div_ceil(num_chunk);
        let blocks: Vec<Vec<(Vec<usize>, Vec<f64>)>> = (0..num_blocks).into_par_iter().map(|b|
        {
            let block_end = ((b + 1) * num_chunk).min(num_points);
            let mut rows = Vec::with_capacity(block_end - b * num_chunk);
            let mut xi = vec![0.0; d];
            for i in b * num_chunk..block_end
            {
                let p = work.index(i);
                for (x, &pj) in xi.iter_mut().zip(p)
                {
                    *x = rule.get_node(pj);
                }
                let mut indx = Vec::new();
                let mut vals = Vec::new();
                for wi in 0..num_points
                {
                    let w = work.index(wi);
                    let v = self.eval_basis(w, &xi);
                    if v != 0.0
                    {
                        indx.push(wi);
                        vals.push(v);
                    }
                }
                rows.push((indx, vals));
            }
            rows
        }).collect();

        let rows: Vec<(Vec<usize>, Vec<f64>)> = blocks.into_iter().flatten().collect();
        self.inter_matrix = SparseMatrix::from_rows(num_points, rows)?;
        Ok(())
    }

    /// Solve `M c = v` per output; the coefficients are the grid's surpluses.
    fn recompute_coefficients(&mut self) -> Result<(), SGError>
    {
        let num_points = self.points.len();
        self.coefficients = vec![0.0; num_points * self.num_outputs];
        if self.inter_matrix.num_rows() != num_points
        {
            self.build_interpolation_matrix()?;
        }
        let mut b = vec![0.0; num_points];
        let mut x = vec![0.0; num_points];
        for output in 0..self.num_outputs
        {
            for (i, bi) in b.iter_mut().enumerate()
            {
                *bi = self.values.row(i)[output];
            }
            self.inter_matrix.solve(&b, &mut x, false)?;
            for (i, &xi) in x.iter().enumerate()
            {
                self.coefficients[i * self.num_outputs + output] = xi;
            }
        }
        Ok(())
    }

    pub fn load_needed_points(&mut self, vals: &[f64]) -> Result<(), SGError>
    {
        if self.num_outputs == 0
        {
            return Err(SGError::NumberOfPointsAndValuesMismatch);
        }
        if self.points.is_empty()
        {
            self.values.set_values(vals, self.needed.len())?;
            self.points = std::mem::take(&mut self.needed);
        }
        else if self.needed.is_empty()
        {
            self.values.set_values(vals, self.points.len())?;
        }
        else
        {
            self.values.add_values(&self.points, &self.needed, vals)?;
            self.points.add_set(&std::mem::take(&mut self.needed));
            self.build_interpolation_matrix()?;
        }
        self.recompute_coefficients()
    }

    /// Accept a pending refinement with zero values for the new points.
    pub fn merge_refinement(&mut self) -> Result<(), SGError>
    {
        if self.needed.is_empty()
        {
            return Ok(());
        }
        let total = self.num_loaded() + self.num_needed();
        if self.points.is_empty()
        {
            self.points = std::mem::take(&mut self.needed);
        }
        else
        {
            self.points.add_set(&std::mem::take(&mut self.needed));
            self.build_interpolation_matrix()?;
        }
        self.values.resize(self.num_outputs, total);
        self.coefficients = vec![0.0; total * self.num_outputs];
        Ok(())
    }

    pub fn clear_refinement(&mut self)
    {
        self.needed = MultiIndexSet::new(self.num_dimensions);
    }

    /// Quadrature weights aligned with the current point set, from the
    /// transpose solve `M^T w = q`, `q_i` the integral of basis `i`.
    pub fn quadrature_weights(&self) -> Result<Vec<f64>, SGError>
    {
        let work = self.work_set();
        let mut q = vec![0.0; work.len()];
        q.par_iter_mut().enumerate().for_each(|(i, qi)|
        {
            *qi = self.eval_integral(work.index(i));
        });
        let mut weights = vec![0.0; q.len()];
        self.inter_matrix.solve(&q, &mut weights, true)?;
        Ok(weights)
    }

    /// Interpolation weights at `x` from the transpose solve `M^T w = q`,
    /// `q_i` the value of basis `i` at `x`.
    pub fn interpolation_weights(&self, x: &[f64]) -> Result<Vec<f64>, SGError>
    {
        let work = self.work_set();
        let mut q = vec![0.0; work.len()];
        q.par_iter_mut().enumerate().for_each(|(i, qi)|
        {
            *qi = self.eval_basis(work.index(i), x);
        });
        let mut weights = vec![0.0; q.len()];
        self.inter_matrix.solve(&q, &mut weights, true)?;
        Ok(weights)
    }

    fn require_coefficients(&self) -> Result<(), SGError>
    {
        if self.num_outputs > 0 && self.coefficients.is_empty()
        {
            return Err(SGError::NoValuesLoaded);
        }
        Ok(())
    }

    pub fn evaluate(&self, x: &[f64]) -> Result<Vec<f64>, SGError>
    {
        self.require_coefficients()?;
        let num_points = self.points.len();
        let mut y = vec![0.0; self.num_outputs];
        for i in 0..num_points
        {
            let basis = self.eval_basis(self.points.index(i), x);
            if basis == 0.0
            {
                continue;
            }
            for (yk, &c) in y.iter_mut().zip(&self.coefficients[i * self.num_outputs..(i + 1) * self.num_outputs])
            {
                *yk += basis * c;
            }
        }
        Ok(y)
    }

    pub fn evaluate_batch(&self, x: &[f64]) -> Result<Vec<f64>, SGError>
    {
        self.require_coefficients()?;
        let d = self.num_dimensions;
        let m = self.num_outputs;
        let num_x = x.len() / d;
        let mut y = vec![0.0; num_x * m];
        y.par_chunks_mut(m).zip(x.par_chunks(d)).for_each(|(row, xx)|
        {
            if let Ok(values) = self.evaluate(xx)
            {
                row.copy_from_slice(&values);
            }
        });
        Ok(y)
    }

    pub fn integrate(&self) -> Result<Vec<f64>, SGError>
    {
        self.require_coefficients()?;
        let mut q = vec![0.0; self.num_outputs];
        for i in 0..self.points.len()
        {
            let integral = self.eval_integral(self.points.index(i));
            if integral == 0.0
            {
                continue;
            }
            for (qk, &c) in q.iter_mut().zip(&self.coefficients[i * self.num_outputs..(i + 1) * self.num_outputs])
            {
                *qk += integral * c;
            }
        }
        Ok(q)
    }

    /// Basis values of every point at every query location, row-major
    /// `num_x` by `num_points`.
    pub fn evaluate_hierarchical_functions(&self, x: &[f64]) -> Vec<f64>
    {
        let work = self.work_set();
        let num_points = work.len();
        let d = self.num_dimensions;
        let num_x = x.len() / d;
        let mut y = vec![0.0; num_x * num_points];
        y.par_chunks_mut(num_points).zip(x.par_chunks(d)).for_each(|(row, xx)|
        {
            for (j, slot) in row.iter_mut().enumerate()
            {
                *slot = self.eval_basis(work.index(j), xx);
            }
        });
        y
    }

    /// Per-output max absolute loaded value, the normalization of the
    /// refinement thresholds.
    fn normalization(&self) -> Vec<f64>
    {
        let mut norm = vec![0.0f64; self.num_outputs];
        for i in 0..self.points.len()
        {
            for (n, &v) in norm.iter_mut().zip(self.values.row(i))
            {
                *n = n.max(v.abs());
            }
        }
        norm
    }

    ///
    /// Per (point, direction) refinement decisions. `tolerance == 0` refines
    /// everything. The direction-selective strategy fits a one dimensional
    /// wavelet subgrid along every grid line and requires both the global and
    /// the line coefficient to be significant.
    ///
    fn build_update_map(&self, tolerance: f64, strategy: RefinementStrategy, output: Option<usize>)
        -> Result<Vec<bool>, SGError>
    {
        let num_points = self.points.len();
        let d = self.num_dimensions;
        let mut pmap = vec![false; num_points * d];
        if tolerance == 0.0
        {
            pmap.fill(true);
            return Ok(pmap);
        }
        let norm = self.normalization();
        let significant = |coefficient: f64, k: usize| -> bool
        {
            norm[k] > 0.0 && coefficient.abs() / norm[k] > tolerance
        };

        if strategy != RefinementStrategy::DirectionSelective
        {
            for i in 0..num_points
            {
                let c = &self.coefficients[i * self.num_outputs..(i + 1) * self.num_outputs];
                let flagged = match output
                {
                    Some(k) => significant(c[k], k),
                    None => c.iter().enumerate().any(|(k, &v)| significant(v, k)),
                };
                if flagged
                {
                    pmap[i * d..(i + 1) * d].fill(true);
                }
            }
            return Ok(pmap);
        }

        // split the grid into one dimensional lines along every direction
        for direction in 0..d
        {
            let mut lines: FxHashMap<Vec<i32>, Vec<usize>> = FxHashMap::default();
            for i in 0..num_points
            {
                let p = self.points.index(i);
                let mut key = p.to_vec();
                key.remove(direction);
                lines.entry(key).or_default().push(i);
            }
            for line in lines.values()
            {
                let active_outputs = if output.is_some() { 1 } else { self.num_outputs };
                let mut flat = Vec::with_capacity(line.len() * d);
                let mut vals = Vec::with_capacity(line.len() * active_outputs);
                for &i in line
                {
                    flat.extend_from_slice(self.points.index(i));
                    match output
                    {
                        Some(k) => vals.push(self.values.row(i)[k]),
                        None => vals.extend_from_slice(self.values.row(i)),
                    }
                }
                let nodes = MultiIndexSet::from_indexes(d, flat);
                let mut line_grid = WaveletGrid::set_nodes(nodes, active_outputs, self.order)?;
                line_grid.load_needed_points(&vals)?;

                for &i in line
                {
                    let p = self.points.index(i);
                    let li = line_grid.points.position(p).ok_or(SGError::InvalidIndex)?;
                    let line_c = &line_grid.coefficients[li * active_outputs..(li + 1) * active_outputs];
                    let c = &self.coefficients[i * self.num_outputs..(i + 1) * self.num_outputs];
                    let flagged = match output
                    {
                        Some(k) => significant(c[k], k) && significant(line_c[0], k),
                        None => (0..self.num_outputs).any(|k| significant(c[k], k) && significant(line_c[k], k)),
                    };
                    if flagged
                    {
                        pmap[i * d + direction] = true;
                    }
                }
            }
        }
        Ok(pmap)
    }

    /// Add the missing ancestor of `point` along `direction`; first-level
    /// wavelets fall back to the whole base level. Returns true when
    /// something was inserted.
    fn add_parent(&self, point: &[i32], direction: usize, destination: &mut MultiIndexSet) -> bool
    {
        let rule = self.rule();
        let mut dad = point.to_vec();
        let parent = rule.get_parent(point[direction]);
        let mut added = false;
        if parent == -2
        {
            for c in 0..rule.num_points(0) as i32
            {
                dad[direction] = c;
                if self.points.missing(&dad)
                {
                    destination.insert(&dad);
                    added = true;
                }
            }
        }
        else if parent >= 0
        {
            dad[direction] = parent;
            if self.points.missing(&dad)
            {
                destination.insert(&dad);
                added = true;
            }
        }
        added
    }

    fn add_child(&self, point: &[i32], direction: usize, level_limits: &[i32],
        destination: &mut MultiIndexSet)
    {
        let rule = self.rule();
        let (left, right) = rule.get_children(point[direction]);
        let mut kid = point.to_vec();
        for child in [left, right]
        {
            if child == -1
            {
                continue;
            }
            if !level_limits.is_empty()
            {
                let limit = level_limits[direction];
                if limit >= 0 && rule.get_level(child) > limit
                {
                    continue;
                }
            }
            kid[direction] = child;
            if self.points.missing(&kid)
            {
                destination.insert(&kid);
            }
        }
    }

    ///
    /// Flag (point, direction) pairs by the refinement map and append the
    /// resulting parents/children to `needed`. The new set is *not* completed
    /// to a lower set: the collocation solve keeps interpolation well defined
    /// on non-lower sets, and the matrix is rebuilt on the next load.
    ///
    pub fn set_surplus_refinement(&mut self, tolerance: f64, strategy: RefinementStrategy,
        output: Option<usize>, level_limits: &[i32]) -> Result<(), SGError>
    {
        if self.num_outputs == 0 || self.values.is_empty()
        {
            return Err(SGError::NoValuesLoaded);
        }
        if let Some(k) = output
        {
            if k >= self.num_outputs
            {
                return Err(SGError::InvalidOutput);
            }
        }
        if !level_limits.is_empty() && level_limits.len() != self.num_dimensions
        {
            return Err(SGError::InvalidLevelLimits);
        }
        self.clear_refinement();

        let pmap = self.build_update_map(tolerance, strategy, output)?;
        let use_parents = strategy.uses_parents();
        let d = self.num_dimensions;
        let mut refined = MultiIndexSet::new(d);
        for i in 0..self.points.len()
        {
            for j in 0..d
            {
                if !pmap[i * d + j]
                {
                    continue;
                }
                let point = self.points.index(i).to_vec();
                if !(use_parents && self.add_parent(&point, j, &mut refined))
                {
                    self.add_child(&point, j, level_limits, &mut refined);
                }
            }
        }
        if !refined.is_empty()
        {
            self.needed = refined;
        }
        Ok(())
    }

    ///
    /// Accept externally computed basis coefficients; the nodal values are
    /// recomputed by evaluating the expansion at the grid's own nodes.
    ///
    pub fn set_hierarchical_coefficients(&mut self, coefficients: &[f64]) -> Result<(), SGError>
    {
        if !self.points.is_empty()
        {
            self.clear_refinement();
        }
        else
        {
            self.points = std::mem::take(&mut self.needed);
        }
        let num_points = self.points.len();
        if coefficients.len() != num_points * self.num_outputs
        {
            return Err(SGError::NumberOfPointsAndValuesMismatch);
        }
        self.coefficients = coefficients.to_vec();
        let x = self.loaded_points();
        let values = self.evaluate_batch(&x)?;
        self.values.resize(self.num_outputs, num_points);
        self.values.set_values(&values, num_points)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn load_function<F: Fn(&[f64]) -> f64>(grid: &mut WaveletGrid, f: F)
    {
        let d = grid.num_dimensions();
        let x = if grid.num_needed() > 0 { grid.needed_points() } else { grid.loaded_points() };
        let values: Vec<f64> = x.chunks_exact(d).map(|p| f(p)).collect();
        grid.load_needed_points(&values).unwrap();
    }

    #[test]
    fn collocation_identity_holds_after_load()
    {
        for order in [1, 3]
        {
            let mut grid = WaveletGrid::make(2, 1, 2, order, &[]).unwrap();
            load_function(&mut grid, |p| (p[0] + 0.3).sin() + p[1] * p[1]);
            // evaluating the expansion at the grid nodes reproduces the values
            let x = grid.loaded_points();
            for (i, xi) in x.chunks_exact(2).enumerate()
            {
                let y = grid.evaluate(xi).unwrap();
                let v = grid.values.row(i)[0];
                assert!((y[0] - v).abs() < 1e-8, "order {order}, node {i}: {} vs {v}", y[0]);
            }
        }
    }

    #[test]
    fn point_counts_follow_the_order()
    {
        let grid = WaveletGrid::make(1, 1, 3, 1, &[]).unwrap();
        assert_eq!(grid.num_needed(), 17); // 2^(3+1) + 1
        let grid = WaveletGrid::make(1, 1, 2, 3, &[]).unwrap();
        assert_eq!(grid.num_needed(), 17); // 2^(2+2) + 1
    }

    #[test]
    fn interpolation_between_nodes_is_accurate()
    {
        let mut grid = WaveletGrid::make(2, 1, 4, 1, &[]).unwrap();
        load_function(&mut grid, |p| p[0] * p[0] + 0.5 * p[1]);
        let y = grid.evaluate(&[0.3121, -0.177]).unwrap();
        let exact = 0.3121 * 0.3121 + 0.5 * (-0.177);
        // piecewise linear at h = 1/16: error ~ h^2
        assert!((y[0] - exact).abs() < 5e-3, "{} vs {exact}", y[0]);
    }

    #[test]
    fn quadrature_weights_integrate_smooth_functions()
    {
        let mut grid = WaveletGrid::make(2, 1, 4, 1, &[]).unwrap();
        load_function(&mut grid, |p| p[0] * p[0] + p[1] * p[1]);
        let weights = grid.quadrature_weights().unwrap();
        let x = grid.loaded_points();
        let q: f64 = weights.iter().zip(x.chunks_exact(2))
            .map(|(&w, p)| w * (p[0] * p[0] + p[1] * p[1])).sum();
        // exact value 8/3; piecewise-linear quadrature at h = 1/16
        assert!((q - 8.0 / 3.0).abs() < 2e-2, "integral {q}");
        // the transpose solve agrees with integrating the expansion
        let direct = grid.integrate().unwrap();
        assert!((q - direct[0]).abs() < 1e-8);
    }

    #[test]
    fn interpolation_weights_reproduce_the_interpolant()
    {
        let mut grid = WaveletGrid::make(2, 1, 3, 1, &[]).unwrap();
        load_function(&mut grid, |p| (p[0] - 0.2) * (p[1] + 0.4));
        let x = [0.41, -0.23];
        let weights = grid.interpolation_weights(&x).unwrap();
        let from_weights: f64 = weights.iter().enumerate()
            .map(|(i, &w)| w * grid.values.row(i)[0]).sum();
        let direct = grid.evaluate(&x).unwrap();
        assert!((from_weights - direct[0]).abs() < 1e-8);
    }

    #[test]
    fn refinement_clusters_near_the_kink()
    {
        // f has a kink along x0 = 0.3 (off the dyadic nodes, so the local
        // details stay order h); significant coefficients appear only at
        // nodes straddling the kink and every staged child stays close
        let mut grid = WaveletGrid::make(2, 1, 3, 1, &[]).unwrap();
        load_function(&mut grid, |p| (p[0] - 0.3).abs());
        grid.set_surplus_refinement(5e-3, RefinementStrategy::Classic, Some(0), &[]).unwrap();
        let needed = grid.needed_points();
        assert!(!needed.is_empty());
        for p in needed.chunks_exact(2)
        {
            assert!((p[0] - 0.3).abs() < 0.5, "new point {p:?} far from the kink");
        }
        // refinement is monotone: loading the new points never drops any
        let before = grid.num_loaded();
        let d = 2;
        let x = grid.needed_points();
        let values: Vec<f64> = x.chunks_exact(d).map(|p| (p[0] - 0.3).abs()).collect();
        grid.load_needed_points(&values).unwrap();
        assert!(grid.num_loaded() > before);
    }

    #[test]
    fn zero_tolerance_refines_every_direction()
    {
        let mut grid = WaveletGrid::make(2, 1, 1, 1, &[]).unwrap();
        load_function(&mut grid, |p| p[0]);
        grid.set_surplus_refinement(0.0, RefinementStrategy::Classic, None, &[]).unwrap();
        assert!(grid.num_needed() > 0);
        for p in grid.needed.iter()
        {
            assert!(grid.points.missing(p));
        }
    }

    #[test]
    fn direction_selective_skips_the_flat_direction()
    {
        // f depends on x0 only: every x1 grid line is constant, so the line
        // coefficients vanish and FDS must leave direction 1 untouched
        let f = |p: &[f64]| (p[0] - 0.3).abs();
        let mut classic = WaveletGrid::make(2, 1, 3, 1, &[]).unwrap();
        load_function(&mut classic, f);
        classic.set_surplus_refinement(5e-3, RefinementStrategy::Classic, Some(0), &[]).unwrap();
        let mut fds = WaveletGrid::make(2, 1, 3, 1, &[]).unwrap();
        load_function(&mut fds, f);
        fds.set_surplus_refinement(5e-3, RefinementStrategy::DirectionSelective, Some(0), &[]).unwrap();
        assert!(fds.num_needed() > 0);
        assert!(fds.num_needed() <= classic.num_needed(),
            "fds {} vs classic {}", fds.num_needed(), classic.num_needed());
        // direction-0-only refinement never invents a new x1 index
        let known_x1: std::collections::HashSet<i32> = fds.points.iter().map(|p| p[1]).collect();
        for p in fds.needed.iter()
        {
            assert!(known_x1.contains(&p[1]), "unexpected x1 index in {p:?}");
        }
    }

    #[test]
    fn parents_first_inserts_missing_ancestors()
    {
        // build a grid, refine deep, then check no orphan gets children
        // before its parent arrives
        let mut grid = WaveletGrid::make(1, 1, 2, 1, &[]).unwrap();
        load_function(&mut grid, |p| (5.0 * (p[0] - 0.31)).tanh());
        grid.set_surplus_refinement(1e-2, RefinementStrategy::ParentsFirst, Some(0), &[]).unwrap();
        // every needed point either has its parent loaded or is a parent fill
        let rule = WaveletRule::new(1);
        for p in grid.needed.iter()
        {
            let parent = rule.get_parent(p[0]);
            if parent >= 0
            {
                assert!(grid.points.contains(&[parent]) || grid.needed.contains(&[parent]));
            }
        }
    }

    #[test]
    fn level_limits_cap_refinement_depth()
    {
        let mut grid = WaveletGrid::make(2, 1, 2, 1, &[]).unwrap();
        load_function(&mut grid, |p| (p[0] - 0.3).abs());
        grid.set_surplus_refinement(0.0, RefinementStrategy::Classic, Some(0), &[2, 2]).unwrap();
        let rule = WaveletRule::new(1);
        for p in grid.needed.iter()
        {
            assert!(rule.get_level(p[0]) <= 2);
            assert!(rule.get_level(p[1]) <= 2);
        }
    }

    #[test]
    fn hierarchical_coefficients_round_trip()
    {
        let mut grid = WaveletGrid::make(2, 1, 2, 1, &[]).unwrap();
        load_function(&mut grid, |p| p[0] + 2.0 * p[1]);
        let coefficients = grid.coefficients.clone();
        let values: Vec<f64> = (0..grid.num_loaded()).map(|i| grid.values.row(i)[0]).collect();

        let mut other = WaveletGrid::make(2, 1, 2, 1, &[]).unwrap();
        other.set_hierarchical_coefficients(&coefficients).unwrap();
        for (i, &v) in values.iter().enumerate()
        {
            assert!((other.values.row(i)[0] - v).abs() < 1e-8);
        }
    }
}
