use ndarray::{ArrayView1, ArrayView2};
use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
use rayon::slice::{ParallelSlice, ParallelSliceMut};
use serde::{Deserialize, Serialize};

use crate::custom_tabulated::CustomTabulated;
use crate::dynamic::DynamicConstructorDataGlobal;
use crate::errors::SGError;
use crate::lagrange::CacheLagrange;
use crate::multi_index_manipulation::{active_tensors, add_exclusive_children, complete_to_lower,
    generate_nested_points, generate_non_nested_points, polynomial_space, select_flagged_children, tensor_weights};
use crate::multi_index_set::MultiIndexSet;
use crate::one_dimensional_wrapper::OneDimensionalWrapper;
use crate::rules::{SparseGridRule, NUM_TOL};
use crate::surpluses;
use crate::tensor_selection::{contour_value, select_tensors, ContourWeights, TensorSelection};
use crate::values::ValueStorage;

///
/// Construction parameters for [`GlobalGrid::make`].
///
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct GlobalGridOptions
{
    pub num_outputs: usize,
    pub depth: i32,
    pub selection: TensorSelection,
    pub rule: SparseGridRule,
    /// Length `d` (linear) or `2d` (curved selections); empty = isotropic.
    pub anisotropic_weights: Vec<i32>,
    pub alpha: f64,
    pub beta: f64,
    pub custom_rule: Option<CustomTabulated>,
    /// Per-dimension level caps; entries `< 0` leave a dimension unlimited.
    pub level_limits: Vec<i32>,
}

///
/// Smolyak combination grid: a signed sum of tensor-product rules over a
/// downward-closed multi-index set. Handles quadrature and interpolation
/// weight assembly, evaluation, anisotropic and surplus refinement, and
/// out-of-order (dynamic) construction.
///
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct GlobalGrid
{
    pub(crate) num_dimensions: usize,
    pub(crate) num_outputs: usize,
    pub(crate) rule: SparseGridRule,
    pub(crate) alpha: f64,
    pub(crate) beta: f64,
    pub(crate) custom: Option<CustomTabulated>,
    pub(crate) wrapper: OneDimensionalWrapper,
    pub(crate) tensors: MultiIndexSet,
    pub(crate) active_tensors: MultiIndexSet,
    pub(crate) active_w: Vec<i32>,
    pub(crate) points: MultiIndexSet,
    pub(crate) needed: MultiIndexSet,
    pub(crate) values: ValueStorage,
    pub(crate) max_levels: Vec<i32>,
    #[serde(skip)]
    pub(crate) tensor_refs: Vec<Vec<usize>>,
    pub(crate) updated_tensors: MultiIndexSet,
    pub(crate) updated_active_tensors: MultiIndexSet,
    pub(crate) updated_active_w: Vec<i32>,
    /// persisted separately through the construction-data streams
    #[serde(skip)]
    pub(crate) dynamic_values: Option<DynamicConstructorDataGlobal>,
}

impl GlobalGrid
{
    pub fn make(num_dimensions: usize, options: GlobalGridOptions) -> Result<Self, SGError>
    {
        if options.rule == SparseGridRule::CustomTabulated && options.custom_rule.is_none()
        {
            return Err(SGError::UnknownRule);
        }
        let tset = select_tensors(num_dimensions, options.depth, options.selection,
            &options.anisotropic_weights, options.rule, options.custom_rule.as_ref(),
            &options.level_limits)?;
        Self::from_tensors(tset, options.num_outputs, options.rule, options.alpha, options.beta,
            options.custom_rule)
    }

    ///
    /// Build a grid directly from a downward-closed tensor set. Used by
    /// `make`, by grid updates and by the surplus estimator's auxiliary
    /// quadrature grid.
    ///
    pub(crate) fn from_tensors(tensors: MultiIndexSet, num_outputs: usize, rule: SparseGridRule,
        alpha: f64, beta: f64, custom: Option<CustomTabulated>) -> Result<Self, SGError>
    {
        let num_dimensions = tensors.num_dimensions();
        let max_levels = tensors.max_per_dimension();
        let max_level = max_levels.iter().copied().max().unwrap_or(0);
        let wrapper = OneDimensionalWrapper::load(rule, max_level as u32, custom.as_ref())?;

        let weights = tensor_weights(&tensors);
        let (active, active_w) = active_tensors(&tensors, &weights);

        let needed = if rule.is_nested()
        {
            generate_nested_points(&tensors, |l| wrapper.num_points(l))
        }
        else
        {
            generate_non_nested_points(&active, |l, k| wrapper.global_index(l, k), |l| wrapper.num_points(l))
        };

        let mut grid = Self
        {
            num_dimensions,
            num_outputs,
            rule,
            alpha,
            beta,
            custom,
            wrapper,
            tensors,
            active_tensors: active,
            active_w,
            points: MultiIndexSet::new(num_dimensions),
            needed,
            values: ValueStorage::new(num_outputs),
            max_levels,
            tensor_refs: Vec::new(),
            updated_tensors: MultiIndexSet::new(num_dimensions),
            updated_active_tensors: MultiIndexSet::new(num_dimensions),
            updated_active_w: Vec::new(),
            dynamic_values: None,
        };
        grid.tensor_refs = grid.compute_tensor_refs(&grid.needed);
        if num_outputs == 0
        {
            grid.points = std::mem::take(&mut grid.needed);
        }
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

    pub fn rule(&self) -> SparseGridRule
    {
        self.rule
    }

    pub fn alpha(&self) -> f64
    {
        self.alpha
    }

    pub fn beta(&self) -> f64
    {
        self.beta
    }

    pub fn custom_rule_description(&self) -> &str
    {
        self.custom.as_ref().map(|c| c.description()).unwrap_or("")
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

    /// The set addressed by weights and refs: `points` once loaded, else `needed`.
    pub(crate) fn work_set(&self) -> &MultiIndexSet
    {
        if self.points.is_empty() { &self.needed } else { &self.points }
    }

    /// 1-D point count from the rule formula (or the custom table),
    /// independent of how deep the wrapper is currently loaded.
    pub(crate) fn rule_num_points(&self, level: i32) -> usize
    {
        match &self.custom
        {
            Some(table) => table.num_points(level as u32),
            None => self.rule.num_points(level as u32),
        }
    }

    fn map_indexes_to_nodes(&self, set: &MultiIndexSet) -> Vec<f64>
    {
        let d = self.num_dimensions;
        let mut x = vec![0.0; set.len() * d];
        for (chunk, p) in x.chunks_exact_mut(d).zip(set.iter())
        {
            for j in 0..d
            {
                chunk[j] = self.wrapper.node(p[j]);
            }
        }
        x
    }

    /// Coordinates of the loaded points, `d` entries per point.
    pub fn loaded_points(&self) -> Vec<f64>
    {
        self.map_indexes_to_nodes(&self.points)
    }

    /// Coordinates of the points awaiting values.
    pub fn needed_points(&self) -> Vec<f64>
    {
        self.map_indexes_to_nodes(&self.needed)
    }

    /// Coordinates of the current point set.
    pub fn points(&self) -> Vec<f64>
    {
        self.map_indexes_to_nodes(self.work_set())
    }

    ///
    /// Tensor-local product index -> position in `work` for every active
    /// tensor. Nested rules address nodes by their global index directly;
    /// non-nested rules go through the per-level offsets.
    ///
    fn compute_tensor_refs(&self, work: &MultiIndexSet) -> Vec<Vec<usize>>
    {
        let d = self.num_dimensions;
        let nested = self.rule.is_nested();
        (0..self.active_tensors.len()).into_par_iter().map(|n|
        {
            let levels = self.active_tensors.index(n);
            let num_oned: Vec<usize> = levels.iter().map(|&l| self.wrapper.num_points(l)).collect();
            let num_tensor_points: usize = num_oned.iter().product();
            let mut refs = vec![0usize; num_tensor_points];
            let mut p = vec![0i32; d];
            for (i, slot) in refs.iter_mut().enumerate()
            {
                let mut t = i;
                for j in (0..d).rev()
                {
                    let k = t % num_oned[j];
                    t /= num_oned[j];
                    p[j] = if nested { k as i32 } else { self.wrapper.global_index(levels[j], k) };
                }
                *slot = work.position(&p).expect("tensor refs out of sync with the point set");
            }
            refs
        }).collect()
    }

    pub(crate) fn recompute_tensor_refs(&mut self)
    {
        let work = if self.points.is_empty() { self.needed.clone() } else { self.points.clone() };
        self.tensor_refs = self.compute_tensor_refs(&work);
    }

    ///
    /// Quadrature weights aligned with the current point set. Accumulation
    /// runs in tensor-index order so the output is deterministic.
    ///
    pub fn quadrature_weights(&self) -> Vec<f64>
    {
        let d = self.num_dimensions;
        let mut weights = vec![0.0; self.work_set().len()];
        let mut num_oned = vec![0usize; d];
        for n in 0..self.active_tensors.len()
        {
            let levels = self.active_tensors.index(n);
            let mut num_tensor_points = 1;
            for (size, &level) in num_oned.iter_mut().zip(levels)
            {
                *size = self.wrapper.num_points(level);
                num_tensor_points *= *size;
            }
            let tensor_weight = self.active_w[n] as f64;
            for i in 0..num_tensor_points
            {
                let mut t = i;
                let mut w = 1.0;
                for j in (0..d).rev()
                {
                    w *= self.wrapper.weight(levels[j], t % num_oned[j]);
                    t /= num_oned[j];
                }
                weights[self.tensor_refs[n][i]] += tensor_weight * w;
            }
        }
        weights
    }

    ///
    /// Interpolation weights at `x`, aligned with the current point set:
    /// evaluating `sum_i w_i f(x_i)` reproduces the Smolyak interpolant.
    ///
    pub fn interpolation_weights(&self, x: &[f64]) -> Vec<f64>
    {
        let d = self.num_dimensions;
        let cache = CacheLagrange::new(d, &self.max_levels, &self.wrapper, x);
        let mut weights = vec![0.0; self.work_set().len()];
        let mut num_oned = vec![0usize; d];
        for n in 0..self.active_tensors.len()
        {
            let levels = self.active_tensors.index(n);
            let mut num_tensor_points = 1;
            for (size, &level) in num_oned.iter_mut().zip(levels)
            {
                *size = self.wrapper.num_points(level);
                num_tensor_points *= *size;
            }
            let tensor_weight = self.active_w[n] as f64;
            for i in 0..num_tensor_points
            {
                let mut t = i;
                let mut w = 1.0;
                for j in (0..d).rev()
                {
                    w *= cache.lagrange(j, levels[j], t % num_oned[j]);
                    t /= num_oned[j];
                }
                weights[self.tensor_refs[n][i]] += tensor_weight * w;
            }
        }
        weights
    }

    /// Interpolation weights for a batch of query points, row-major
    /// `num_x` rows by `num_points` columns.
    pub fn evaluate_hierarchical_functions(&self, x: &[f64]) -> Vec<f64>
    {
        let d = self.num_dimensions;
        let num_points = self.num_points();
        let num_x = x.len() / d;
        let mut y = vec![0.0; num_x * num_points];
        y.par_chunks_mut(num_points).zip(x.par_chunks(d)).for_each(|(row, xx)|
        {
            row.copy_from_slice(&self.interpolation_weights(xx));
        });
        y
    }

    fn require_values(&self) -> Result<(), SGError>
    {
        if self.num_outputs > 0 && self.values.is_empty()
        {
            return Err(SGError::NoValuesLoaded);
        }
        Ok(())
    }

    /// Evaluate the interpolant at one point.
    pub fn evaluate(&self, x: &[f64]) -> Result<Vec<f64>, SGError>
    {
        self.require_values()?;
        let weights = self.interpolation_weights(x);
        let vals = ArrayView2::from_shape((self.points.len(), self.num_outputs), self.values.flat())
            .map_err(|_| SGError::InvalidIndex)?;
        let w = ArrayView1::from(&weights[..self.points.len()]);
        Ok(vals.t().dot(&w).to_vec())
    }

    /// Evaluate the interpolant at `num_x` points, one per `d`-chunk of `x`;
    /// rows of the result hold `num_outputs` values each.
    pub fn evaluate_batch(&self, x: &[f64]) -> Result<Vec<f64>, SGError>
    {
        self.require_values()?;
        let d = self.num_dimensions;
        let m = self.num_outputs;
        let num_x = x.len() / d;
        let mut y = vec![0.0; num_x * m];
        y.par_chunks_mut(m).zip(x.par_chunks(d)).for_each(|(row, xx)|
        {
            // require_values above guarantees the per-point evaluate succeeds
            if let Ok(values) = self.evaluate(xx)
            {
                row.copy_from_slice(&values);
            }
        });
        Ok(y)
    }

    /// Integrate the loaded outputs over [-1, 1]^d.
    pub fn integrate(&self) -> Result<Vec<f64>, SGError>
    {
        self.require_values()?;
        let weights = self.quadrature_weights();
        let mut q = vec![0.0; self.num_outputs];
        for (i, w) in weights.iter().enumerate().take(self.points.len())
        {
            for (qk, &v) in q.iter_mut().zip(self.values.row(i))
            {
                *qk += w * v;
            }
        }
        Ok(q)
    }

    ///
    /// Supply function values for the needed points (or overwrite the loaded
    /// values when nothing is needed), then fold any pending refinement into
    /// the grid.
    ///
    pub fn load_needed_points(&mut self, vals: &[f64]) -> Result<(), SGError>
    {
        if self.num_outputs == 0
        {
            return Err(SGError::NumberOfPointsAndValuesMismatch);
        }
        if self.points.is_empty() || self.needed.is_empty()
        {
            let expected = if self.points.is_empty() { self.needed.len() } else { self.points.len() };
            self.values.set_values(vals, expected)?;
        }
        else
        {
            self.values.add_values(&self.points, &self.needed, vals)?;
        }
        self.accept_updated_tensors();
        Ok(())
    }

    /// Accept a pending refinement with zero values for the new points.
    pub fn merge_refinement(&mut self)
    {
        if self.needed.is_empty()
        {
            return;
        }
        let total = self.num_points() + if self.points.is_empty() { 0 } else { self.needed.len() };
        self.values.resize(self.num_outputs, total);
        self.accept_updated_tensors();
    }

    pub fn clear_refinement(&mut self)
    {
        self.needed = MultiIndexSet::new(self.num_dimensions);
        self.updated_tensors = MultiIndexSet::new(self.num_dimensions);
        self.updated_active_tensors = MultiIndexSet::new(self.num_dimensions);
        self.updated_active_w = Vec::new();
    }

    pub(crate) fn accept_updated_tensors(&mut self)
    {
        if self.points.is_empty()
        {
            self.points = std::mem::take(&mut self.needed);
            // tensors may have changed since the refs and levels were cached
            self.max_levels = self.tensors.max_per_dimension();
        }
        else if !self.needed.is_empty()
        {
            self.points.add_set(&std::mem::take(&mut self.needed));

            self.tensors = std::mem::take(&mut self.updated_tensors);
            self.active_tensors = std::mem::take(&mut self.updated_active_tensors);
            self.active_w = std::mem::take(&mut self.updated_active_w);

            self.max_levels = self.tensors.max_per_dimension();
            self.recompute_tensor_refs();
        }
    }

    ///
    /// Stage the refinement defined by re-selecting tensors at a new depth:
    /// the union with the current tensors becomes `updated_tensors` and the
    /// genuinely new points land in `needed`. On a grid with no loaded values
    /// this simply rebuilds the grid.
    ///
    pub fn update_grid(&mut self, depth: i32, selection: TensorSelection,
        anisotropic_weights: &[i32], level_limits: &[i32]) -> Result<(), SGError>
    {
        if self.num_outputs == 0 || self.points.is_empty() || self.values.is_empty()
        {
            let options = GlobalGridOptions
            {
                num_outputs: self.num_outputs,
                depth,
                selection,
                rule: self.rule,
                anisotropic_weights: anisotropic_weights.to_vec(),
                alpha: self.alpha,
                beta: self.beta,
                custom_rule: self.custom.clone(),
                level_limits: level_limits.to_vec(),
            };
            *self = Self::make(self.num_dimensions, options)?;
            return Ok(());
        }
        self.clear_refinement();
        let mut updated = select_tensors(self.num_dimensions, depth, selection, anisotropic_weights,
            self.rule, self.custom.as_ref(), level_limits)?;
        let new_tensors = updated.diff(&self.tensors);
        if !new_tensors.is_empty()
        {
            updated.add_set(&self.tensors);
            self.updated_tensors = updated;
            self.propose_updated_tensors()?;
        }
        Ok(())
    }

    fn propose_updated_tensors(&mut self) -> Result<(), SGError>
    {
        let max_level = self.updated_tensors.max_per_dimension().into_iter().max().unwrap_or(0);
        if max_level as usize + 1 > self.wrapper.num_levels()
        {
            self.wrapper = OneDimensionalWrapper::load(self.rule, max_level as u32, self.custom.as_ref())?;
        }
        let weights = tensor_weights(&self.updated_tensors);
        let (active, active_w) = active_tensors(&self.updated_tensors, &weights);
        self.updated_active_tensors = active;
        self.updated_active_w = active_w;

        let new_points = if self.rule.is_nested()
        {
            generate_nested_points(&self.updated_tensors, |l| self.wrapper.num_points(l))
        }
        else
        {
            generate_non_nested_points(&self.updated_active_tensors,
                |l, k| self.wrapper.global_index(l, k), |l| self.wrapper.num_points(l))
        };
        self.needed = new_points.diff(&self.points);
        Ok(())
    }

    ///
    /// Estimate anisotropic decay weights from the loaded values, then grow
    /// the grid until at least `min_growth` new points are staged.
    ///
    pub fn set_anisotropic_refinement(&mut self, selection: TensorSelection, min_growth: usize,
        output: usize, level_limits: &[i32]) -> Result<(), SGError>
    {
        self.require_values()?;
        if output >= self.num_outputs
        {
            return Err(SGError::InvalidOutput);
        }
        self.clear_refinement();
        let weights = surpluses::estimate_anisotropic_weights(self, selection, output)?;
        let mut level = 0;
        loop
        {
            level += 1;
            self.update_grid(level, selection, &weights, level_limits)?;
            if self.num_needed() >= min_growth || level > 1000
            {
                break;
            }
        }
        Ok(())
    }

    ///
    /// Flag points whose normalized hierarchical surplus exceeds `tolerance`,
    /// stage their immediate children and complete the lower hull. Only
    /// sequence rules carry the point-to-tensor identification this uses.
    ///
    pub fn set_surplus_refinement(&mut self, tolerance: f64, output: usize,
        level_limits: &[i32]) -> Result<(), SGError>
    {
        self.require_values()?;
        if output >= self.num_outputs
        {
            return Err(SGError::InvalidOutput);
        }
        if !self.rule.is_sequence()
        {
            return Err(SGError::IncompatibleSelection);
        }
        self.clear_refinement();
        let surp = surpluses::compute_surpluses(self, output, true)?;
        let flagged: Vec<bool> = surp.iter().map(|s| s.abs() > tolerance).collect();
        let mut kids = select_flagged_children(&self.points, &flagged, level_limits);
        if !kids.is_empty()
        {
            kids.add_set(&self.points);
            self.updated_tensors = complete_to_lower(&kids);
            self.propose_updated_tensors()?;
        }
        Ok(())
    }

    /// Load externally computed nodal coefficients; for a global grid these
    /// are ordinary nodal values.
    pub fn set_hierarchical_coefficients(&mut self, coefficients: &[f64]) -> Result<(), SGError>
    {
        if !self.points.is_empty()
        {
            self.clear_refinement();
        }
        self.load_needed_points(coefficients)
    }

    /// Union of the per-tensor exactness boxes, the polynomial space the grid
    /// resolves for interpolation (`true`) or quadrature (`false`).
    pub fn polynomial_space(&self, interpolation: bool) -> MultiIndexSet
    {
        if let Some(custom) = &self.custom
        {
            if interpolation
            {
                polynomial_space(&self.active_tensors, |l| custom.i_exact(l as u32))
            }
            else
            {
                polynomial_space(&self.active_tensors, |l| custom.q_exact(l as u32))
            }
        }
        else if interpolation
        {
            polynomial_space(&self.active_tensors, |l| self.rule.interpolation_exactness(l as u32))
        }
        else
        {
            polynomial_space(&self.active_tensors, |l| self.rule.quadrature_exactness(l as u32))
        }
    }

    // --- dynamic (out of order) construction ---

    ///
    /// Start out-of-order construction. On a fresh grid the initial tensors
    /// move into the journal, prioritized by total level, and complete
    /// tensors fold back into the grid as their values arrive.
    ///
    pub fn begin_construction(&mut self)
    {
        let mut journal = DynamicConstructorDataGlobal::new(self.num_dimensions, self.num_outputs);
        if self.points.is_empty()
        {
            for t in self.tensors.iter()
            {
                let weight = -1.0 / (1.0 + t.iter().sum::<i32>() as f64);
                journal.add_tensor(t, |l| self.wrapper.num_points(l), weight, true);
            }
            self.tensors = MultiIndexSet::new(self.num_dimensions);
            self.active_tensors = MultiIndexSet::new(self.num_dimensions);
            self.active_w = Vec::new();
            self.needed = MultiIndexSet::new(self.num_dimensions);
            self.tensor_refs = Vec::new();
        }
        self.dynamic_values = Some(journal);
    }

    pub fn is_under_construction(&self) -> bool
    {
        self.dynamic_values.is_some()
    }

    ///
    /// Candidate nodes for construction, most urgent first, as a flat
    /// coordinate list (`d` values per node). Candidate tensors are the
    /// exclusive children of the current tensor set scored by the contour of
    /// `selection`; when enough values are loaded for an `Ip*`/`Qp*`
    /// selection, the contour weights come from the anisotropy estimator.
    ///
    pub fn get_candidate_construction_points(&mut self, selection: TensorSelection,
        output: usize, level_limits: &[i32]) -> Result<Vec<f64>, SGError>
    {
        let mut weights = Vec::new();
        let estimating = matches!(selection, TensorSelection::IpTotal | TensorSelection::IpCurved
            | TensorSelection::QpTotal | TensorSelection::QpCurved);
        if estimating && !self.values.is_empty()
        {
            let min_needed = if selection.is_curved() { 4 * self.num_dimensions } else { 2 * self.num_dimensions };
            if self.points.len() > min_needed
            {
                weights = surpluses::estimate_anisotropic_weights(self, selection, output)?;
            }
        }
        self.get_candidate_construction_points_weighted(selection, &weights, level_limits)
    }

    /// As [`Self::get_candidate_construction_points`] with explicit contour weights.
    pub fn get_candidate_construction_points_weighted(&mut self, selection: TensorSelection,
        anisotropic_weights: &[i32], level_limits: &[i32]) -> Result<Vec<f64>, SGError>
    {
        if !level_limits.is_empty() && level_limits.len() != self.num_dimensions
        {
            return Err(SGError::InvalidLevelLimits);
        }
        let mut contour_selection = selection;
        let weights = ContourWeights::new(self.num_dimensions, selection, anisotropic_weights)?;
        if selection.is_curved() && anisotropic_weights.is_empty()
        {
            contour_selection = TensorSelection::Level;
        }

        let journal = self.dynamic_values.as_mut().ok_or(SGError::ConstructionNotStarted)?;
        journal.clear_tensors();
        let initial = journal.initial_tensors();
        let new_tensors = add_exclusive_children(&self.tensors, &initial, level_limits);

        if !new_tensors.is_empty()
        {
            let max_level = new_tensors.max_per_dimension().into_iter().max().unwrap_or(0);
            if max_level as usize + 1 > self.wrapper.num_levels()
            {
                self.wrapper = OneDimensionalWrapper::load(self.rule, max_level as u32, self.custom.as_ref())?;
            }
        }

        // score candidates by the contour, mapped through the rule exactness
        let exactness: Vec<i64> = (0..self.wrapper.num_levels() as i32).map(|l|
        {
            if l == 0
            {
                0
            }
            else if selection.uses_interpolation_exactness()
            {
                1 + match &self.custom
                {
                    Some(custom) => custom.i_exact(l as u32 - 1),
                    None => self.rule.interpolation_exactness(l as u32 - 1),
                }
            }
            else if selection.uses_quadrature_exactness()
            {
                1 + match &self.custom
                {
                    Some(custom) => custom.q_exact(l as u32 - 1),
                    None => self.rule.quadrature_exactness(l as u32 - 1),
                }
            }
            else
            {
                l as i64
            }
        }).collect();

        let journal = self.dynamic_values.as_mut().ok_or(SGError::ConstructionNotStarted)?;
        for t in new_tensors.iter()
        {
            let mapped: Vec<i64> = t.iter().map(|&l| exactness[l as usize]).collect();
            let score = contour_value(&mapped, contour_selection, &weights);
            journal.add_tensor(t, |l| self.wrapper.num_points(l), score, false);
        }

        let node_indexes = journal.node_indexes();
        let d = self.num_dimensions;
        let mut x = vec![0.0; node_indexes.len()];
        for (chunk, p) in x.chunks_exact_mut(d).zip(node_indexes.chunks_exact(d))
        {
            for j in 0..d
            {
                chunk[j] = self.wrapper.node(p[j]);
            }
        }
        Ok(x)
    }

    ///
    /// Deliver the value of one constructed node. Node coordinates are
    /// translated back to indices by nearest-node search within `NUM_TOL`.
    /// Completed tensors fold into the grid immediately.
    ///
    pub fn load_constructed_point(&mut self, x: &[f64], y: &[f64]) -> Result<(), SGError>
    {
        if self.dynamic_values.is_none()
        {
            return Err(SGError::ConstructionNotStarted);
        }
        let d = self.num_dimensions;
        let mut p = vec![0i32; d];
        for j in 0..d
        {
            let total = self.wrapper.num_global_nodes();
            let mut found = None;
            for i in 0..total
            {
                if (self.wrapper.node(i as i32) - x[j]).abs() < NUM_TOL
                {
                    found = Some(i as i32);
                    break;
                }
            }
            p[j] = found.ok_or(SGError::UnknownConstructionPoint)?;
        }
        let journal = self.dynamic_values.as_mut().unwrap();
        if journal.add_new_node(&p, y)?
        {
            self.load_constructed_tensors()?;
        }
        Ok(())
    }

    fn load_constructed_tensors(&mut self) -> Result<(), SGError>
    {
        let journal = self.dynamic_values.as_mut().unwrap();
        let mut added_any = false;
        while let Some((tensor, new_points, new_values)) = journal.eject_complete_tensor(&self.tensors, &self.points)
        {
            if self.points.is_empty()
            {
                self.values.set_values(&new_values, new_points.len())?;
                self.points = new_points;
            }
            else
            {
                self.values.add_values(&self.points, &new_points, &new_values)?;
                self.points.add_set(&new_points);
            }
            self.tensors.insert(&tensor);
            added_any = true;
        }
        if added_any
        {
            let weights = tensor_weights(&self.tensors);
            let (active, active_w) = active_tensors(&self.tensors, &weights);
            self.active_tensors = active;
            self.active_w = active_w;
            self.max_levels = self.tensors.max_per_dimension();
            self.recompute_tensor_refs();
        }
        Ok(())
    }

    /// Close out dynamic construction and drop the journal.
    pub fn finish_construction(&mut self)
    {
        self.dynamic_values = None;
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn make_grid(d: usize, m: usize, depth: i32, selection: TensorSelection, rule: SparseGridRule) -> GlobalGrid
    {
        GlobalGrid::make(d, GlobalGridOptions
        {
            num_outputs: m,
            depth,
            selection,
            rule,
            ..Default::default()
        }).unwrap()
    }

    fn load_function<F: Fn(&[f64]) -> f64>(grid: &mut GlobalGrid, f: F)
    {
        let d = grid.num_dimensions();
        let x = if grid.num_needed() > 0 { grid.needed_points() } else { grid.points() };
        let values: Vec<f64> = x.chunks_exact(d).map(|p| f(p)).collect();
        grid.load_needed_points(&values).unwrap();
    }

    #[test]
    fn tensors_stay_downward_closed()
    {
        let grid = make_grid(3, 0, 4, TensorSelection::Level, SparseGridRule::ClenshawCurtis);
        for t in grid.tensors.iter()
        {
            for j in 0..3
            {
                if t[j] > 0
                {
                    let mut parent = t.to_vec();
                    parent[j] -= 1;
                    assert!(grid.tensors.contains(&parent));
                }
            }
        }
        assert_eq!(grid.active_w.len(), grid.active_tensors.len());
        for t in grid.active_tensors.iter()
        {
            assert!(grid.tensors.contains(t));
        }
    }

    #[test]
    fn max_levels_track_tensors()
    {
        let grid = make_grid(2, 0, 5, TensorSelection::Level, SparseGridRule::ClenshawCurtis);
        assert_eq!(grid.max_levels, vec![5, 5]);
        assert!(grid.wrapper.num_levels() >= 6);
        for (n, refs) in grid.tensor_refs.iter().enumerate()
        {
            let levels = grid.active_tensors.index(n);
            let expected: usize = levels.iter().map(|&l| grid.wrapper.num_points(l)).product();
            assert_eq!(refs.len(), expected);
        }
    }

    #[test]
    fn quadrature_exactness_clenshaw_curtis()
    {
        // scenario S1: d=2, clenshaw-curtis, level, depth 5
        let grid = make_grid(2, 0, 5, TensorSelection::Level, SparseGridRule::ClenshawCurtis);
        let weights = grid.quadrature_weights();
        let points = grid.points();

        let integral: f64 = weights.iter().sum();
        assert!((integral - 4.0).abs() < 1e-12, "constant: {integral}");

        let integral: f64 = weights.iter().zip(points.chunks_exact(2))
            .map(|(&w, p)| w * p[0] * p[0]).sum();
        assert!((integral - 4.0 / 3.0).abs() < 1e-12, "x0^2: {integral}");

        // (x0^2 + x1^4)^2 = x0^4 + 2 x0^2 x1^4 + x1^8: exact value 16/9
        let integral: f64 = weights.iter().zip(points.chunks_exact(2))
            .map(|(&w, p)|
            {
                let f = p[0] * p[0] + p[1] * p[1] * p[1] * p[1];
                w * f * f
            }).sum();
        assert!((integral - 16.0 / 9.0).abs() < 1e-12, "(x0^2+x1^4)^2: {integral}");
    }

    #[test]
    fn interpolation_reproduces_loaded_values()
    {
        let mut grid = make_grid(2, 1, 4, TensorSelection::Level, SparseGridRule::ClenshawCurtis);
        load_function(&mut grid, |p| (2.0 * p[0]).exp() * (1.5 * p[1]).cos());
        let points = grid.points();
        let scale: f64 = grid.values.flat().iter().fold(0.0, |a, &v| a.max(v.abs()));
        for (i, p) in points.chunks_exact(2).enumerate()
        {
            let y = grid.evaluate(p).unwrap();
            let expected = grid.values.row(i)[0];
            assert!((y[0] - expected).abs() < 1e-10 * scale, "node {i}: {} vs {expected}", y[0]);
        }
    }

    #[test]
    fn gauss_legendre_non_nested_integration()
    {
        // depth 4 brings in the (1, 1) tensor, which covers the cross term
        let mut grid = make_grid(2, 1, 4, TensorSelection::QpTotal, SparseGridRule::GaussLegendre);
        load_function(&mut grid, |p| p[0] * p[0] * p[1] * p[1]);
        let q = grid.integrate().unwrap();
        assert!((q[0] - 4.0 / 9.0).abs() < 1e-12, "x0^2 x1^2: {}", q[0]);
    }

    #[test]
    fn gauss_patterson_interpolation_accuracy()
    {
        // d=3, gauss-patterson, qptotal, f = exp(sum x); depth 24 reaches the
        // level where the one dimensional truncation error drops below 1e-7
        let mut grid = make_grid(3, 1, 24, TensorSelection::QpTotal, SparseGridRule::GaussPatterson);
        load_function(&mut grid, |p| (p[0] + p[1] + p[2]).exp());
        // deterministic low-discrepancy sample (Kronecker lattice)
        let alphas = [0.5545497, 0.308517, 0.114161];
        let mut worst = 0.0_f64;
        let mut sample = vec![0.0; 3];
        for i in 0..1000
        {
            for (j, s) in sample.iter_mut().enumerate()
            {
                *s = 2.0 * (((i + 1) as f64 * alphas[j]) % 1.0) - 1.0;
            }
            let y = grid.evaluate(&sample).unwrap();
            worst = worst.max((y[0] - (sample[0] + sample[1] + sample[2]).exp()).abs());
        }
        assert!(worst < 1e-6, "sup-norm error {worst}");
    }

    #[test]
    fn update_grid_stages_only_new_points()
    {
        let mut grid = make_grid(2, 1, 3, TensorSelection::Level, SparseGridRule::ClenshawCurtis);
        load_function(&mut grid, |p| p[0] + p[1]);
        let loaded_before = grid.num_loaded();
        grid.update_grid(5, TensorSelection::Level, &[], &[]).unwrap();
        assert!(grid.num_needed() > 0);
        assert_eq!(grid.num_loaded(), loaded_before);
        // scenario: loading the needed values folds the refinement in
        let d = 2;
        let x = grid.needed_points();
        let values: Vec<f64> = x.chunks_exact(d).map(|p| p[0] + p[1]).collect();
        grid.load_needed_points(&values).unwrap();
        assert_eq!(grid.num_needed(), 0);
        assert!(grid.num_loaded() > loaded_before);
        // refinement never removes points
        assert!(grid.num_points() >= loaded_before);
    }

    #[test]
    fn anisotropic_refinement_prefers_the_active_direction()
    {
        // scenario S3: d=2, leja, iptotal depth 4, f = exp(2 x0) cos(x1)
        let mut grid = make_grid(2, 1, 4, TensorSelection::IpTotal, SparseGridRule::Leja);
        load_function(&mut grid, |p| (2.0 * p[0]).exp() * p[1].cos());
        // surpluses decay slower along x0, so its estimated decay rate is the
        // smaller one and the selection sends more levels into direction 0
        let weights = surpluses::estimate_anisotropic_weights(&grid, TensorSelection::IpTotal, 0).unwrap();
        assert!(weights[0] <= weights[1], "direction 0 should refine deeper: {weights:?}");
        grid.set_anisotropic_refinement(TensorSelection::IpTotal, 10, 0, &[]).unwrap();
        assert!(grid.num_needed() >= 10);
        let staged = grid.updated_tensors.max_per_dimension();
        assert!(staged[0] >= staged[1], "direction 0 should dominate the update: {staged:?}");
    }

    #[test]
    fn surplus_refinement_is_monotone()
    {
        let mut grid = make_grid(2, 1, 4, TensorSelection::Level, SparseGridRule::Leja);
        load_function(&mut grid, |p| (3.0 * p[0]).exp() + p[1]);
        let before = grid.num_loaded();
        grid.set_surplus_refinement(1e-6, 0, &[]).unwrap();
        let needed = grid.num_needed();
        assert!(needed > 0);
        let d = 2;
        let x = grid.needed_points();
        let values: Vec<f64> = x.chunks_exact(d).map(|p| (3.0 * p[0]).exp() + p[1]).collect();
        grid.load_needed_points(&values).unwrap();
        assert_eq!(grid.num_loaded(), before + needed);
    }

    #[test]
    fn surplus_refinement_requires_sequence_rule()
    {
        let mut grid = make_grid(2, 1, 3, TensorSelection::Level, SparseGridRule::ClenshawCurtis);
        load_function(&mut grid, |p| p[0]);
        assert_eq!(grid.set_surplus_refinement(1e-4, 0, &[]).unwrap_err(), SGError::IncompatibleSelection);
    }

    #[test]
    fn refinement_before_loading_is_rejected()
    {
        let mut grid = make_grid(2, 1, 3, TensorSelection::Level, SparseGridRule::Leja);
        assert_eq!(grid.set_surplus_refinement(1e-4, 0, &[]).unwrap_err(), SGError::NoValuesLoaded);
    }

    #[test]
    fn dynamic_construction_matches_batch_construction()
    {
        // scenario S5: d=2, clenshaw-curtis, level, depth 3; load in reverse order
        let mut reference = make_grid(2, 1, 3, TensorSelection::Level, SparseGridRule::ClenshawCurtis);
        load_function(&mut reference, |p| (p[0] - 0.3) * (p[1] + 0.7));

        let mut grid = make_grid(2, 1, 3, TensorSelection::Level, SparseGridRule::ClenshawCurtis);
        grid.begin_construction();
        let mut remaining = grid.get_candidate_construction_points(TensorSelection::Level, 0, &[]).unwrap();
        let mut guard = 0;
        while !remaining.is_empty()
        {
            // deliver values most-distant-first to exercise out-of-order arrival
            let batch: Vec<Vec<f64>> = remaining.chunks_exact(2).rev().map(|p| p.to_vec()).collect();
            for p in batch
            {
                grid.load_constructed_point(&p, &[(p[0] - 0.3) * (p[1] + 0.7)]).unwrap();
            }
            remaining = grid.get_candidate_construction_points(TensorSelection::Level, 0, &[]).unwrap();
            // stop once every point of the depth-3 grid is covered
            guard += 1;
            if grid.num_loaded() >= reference.num_loaded() || guard > 16
            {
                break;
            }
        }
        grid.finish_construction();

        assert!(grid.num_loaded() >= reference.num_loaded());
        for (t, &w) in reference.active_tensors.iter().zip(&reference.active_w)
        {
            let pos = grid.active_tensors.position(t);
            if let Some(n) = pos
            {
                assert_eq!(grid.active_w[n], w, "weight of tensor {t:?}");
            }
        }
        // the interpolants agree wherever the reference is defined
        for x in [[0.3, -0.4], [-0.8, 0.1], [0.05, 0.95]]
        {
            let a = reference.evaluate(&x).unwrap();
            let b = grid.evaluate(&x).unwrap();
            assert!((a[0] - b[0]).abs() < 1e-12);
        }
    }

    #[test]
    fn accept_recomputes_max_levels()
    {
        // the initially-empty-points path must refresh max_levels too
        let mut grid = make_grid(2, 1, 3, TensorSelection::Level, SparseGridRule::ClenshawCurtis);
        load_function(&mut grid, |p| p[0] * p[1]);
        assert_eq!(grid.max_levels, grid.tensors.max_per_dimension());
    }

    #[test]
    fn zero_output_grid_moves_needed_to_points()
    {
        let grid = make_grid(2, 0, 3, TensorSelection::Level, SparseGridRule::ClenshawCurtis);
        assert_eq!(grid.num_needed(), 0);
        assert!(grid.num_points() > 0);
        assert_eq!(grid.quadrature_weights().len(), grid.num_points());
    }
}
