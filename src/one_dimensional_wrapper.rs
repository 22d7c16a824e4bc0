use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::custom_tabulated::CustomTabulated;
use crate::errors::SGError;
use crate::rules::SparseGridRule;
use crate::tables::clenshaw_curtis_table::{cc_nodes, cc_weights};
use crate::tables::gauss_legendre_table::{gl_nodes, gl_weights};
use crate::tables::gauss_patterson_table::{gp_nodes, gp_weights, GP_MAX_LEVEL};
use crate::tables::leja_table::{leja_nodes, leja_weights};

///
/// Caches nodes, quadrature weights and point counts for every level of a one
/// dimensional rule up to a maximum level.
///
/// For nested rules every node carries a *global index* assigned in birth
/// order (level by level, ascending within a level): the first `n(l)` global
/// indices are exactly the nodes of level `l`, so a point multi-index `p`
/// addresses `node(p_j)` independently of the level it was generated from.
/// Per-level node and weight arrays are stored in global-index order.
///
/// For non-nested rules the global index of node `k` of level `l` is the
/// cumulative offset `pntr(l) + k`, and per-level arrays stay in ascending
/// node order.
///
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OneDimensionalWrapper
{
    rule: SparseGridRule,
    num_levels: usize,
    num_points: Vec<usize>,
    nodes: Vec<Vec<f64>>,
    weights: Vec<Vec<f64>>,
    /// nested rules: node value per global index
    unique: Vec<f64>,
    /// non-nested rules: cumulative point counts, `pntr[l]` = first global
    /// index of level `l`
    pntr: Vec<usize>,
}

impl OneDimensionalWrapper
{
    pub fn load(rule: SparseGridRule, max_level: u32, custom: Option<&CustomTabulated>) -> Result<Self, SGError>
    {
        match rule
        {
            SparseGridRule::GaussPatterson if max_level > GP_MAX_LEVEL =>
            {
                return Err(SGError::RuleLevelUnavailable);
            }
            SparseGridRule::Leja if max_level > crate::tables::leja_table::LEJA_MAX_LEVEL =>
            {
                return Err(SGError::RuleLevelUnavailable);
            }
            SparseGridRule::CustomTabulated =>
            {
                let table = custom.ok_or(SGError::UnknownRule)?;
                table.check_level(max_level)?;
            }
            _ => {}
        }
        let num_levels = max_level as usize + 1;
        let mut per_level_nodes = Vec::with_capacity(num_levels);
        let mut per_level_weights = Vec::with_capacity(num_levels);
        let mut num_points = Vec::with_capacity(num_levels);
        for level in 0..=max_level
        {
            let (nodes, weights) = match rule
            {
                SparseGridRule::ClenshawCurtis => (cc_nodes(level), cc_weights(level)),
                SparseGridRule::GaussPatterson => (gp_nodes(level), gp_weights(level)),
                SparseGridRule::Leja => (leja_nodes(level), leja_weights(level)),
                SparseGridRule::GaussLegendre => (gl_nodes(level), gl_weights(level)),
                SparseGridRule::CustomTabulated =>
                {
                    let table = custom.ok_or(SGError::UnknownRule)?;
                    (table.nodes(level).to_vec(), table.weights(level).to_vec())
                }
            };
            num_points.push(nodes.len());
            per_level_nodes.push(nodes);
            per_level_weights.push(weights);
        }

        let mut wrapper = Self
        {
            rule,
            num_levels,
            num_points,
            nodes: Vec::new(),
            weights: Vec::new(),
            unique: Vec::new(),
            pntr: Vec::new(),
        };
        if rule.is_nested()
        {
            // assign global indices in birth order; reorder each level's
            // nodes/weights so that position k holds global index k
            let mut ids: FxHashMap<u64, usize> = FxHashMap::default();
            for level_nodes in &per_level_nodes
            {
                for &x in level_nodes
                {
                    if !ids.contains_key(&x.to_bits())
                    {
                        ids.insert(x.to_bits(), wrapper.unique.len());
                        wrapper.unique.push(x);
                    }
                }
            }
            for (level_nodes, level_weights) in per_level_nodes.iter().zip(&per_level_weights)
            {
                let n = level_nodes.len();
                let mut nodes = vec![0.0; n];
                let mut weights = vec![0.0; n];
                for (&x, &w) in level_nodes.iter().zip(level_weights)
                {
                    let id = ids[&x.to_bits()];
                    debug_assert!(id < n, "node indexing is not nested");
                    nodes[id] = x;
                    weights[id] = w;
                }
                wrapper.nodes.push(nodes);
                wrapper.weights.push(weights);
            }
        }
        else
        {
            let mut offset = 0;
            for n in &wrapper.num_points
            {
                wrapper.pntr.push(offset);
                offset += n;
            }
            wrapper.nodes = per_level_nodes;
            wrapper.weights = per_level_weights;
        }
        Ok(wrapper)
    }

    pub fn rule(&self) -> SparseGridRule
    {
        self.rule
    }

    pub fn num_levels(&self) -> usize
    {
        self.num_levels
    }

    pub fn num_points(&self, level: i32) -> usize
    {
        self.num_points[level as usize]
    }

    /// Node coordinate for a global point index.
    pub fn node(&self, index: i32) -> f64
    {
        if self.rule.is_nested()
        {
            self.unique[index as usize]
        }
        else
        {
            let level = self.level_of(index);
            self.nodes[level][index as usize - self.pntr[level]]
        }
    }

    /// Global index of node `k` of level `level`.
    pub fn global_index(&self, level: i32, k: usize) -> i32
    {
        if self.rule.is_nested()
        {
            k as i32
        }
        else
        {
            (self.pntr[level as usize] + k) as i32
        }
    }

    /// Quadrature weight of node `k` of the level `level` rule, with `k` in
    /// the same indexing as [`Self::global_index`] local positions.
    pub fn weight(&self, level: i32, k: usize) -> f64
    {
        self.weights[level as usize][k]
    }

    /// All nodes of the level `level` rule, aligned with local positions.
    pub fn level_nodes(&self, level: i32) -> &[f64]
    {
        &self.nodes[level as usize]
    }

    fn level_of(&self, index: i32) -> usize
    {
        debug_assert!(!self.rule.is_nested());
        let mut level = self.pntr.len() - 1;
        while self.pntr[level] > index as usize
        {
            level -= 1;
        }
        level
    }

    /// Number of distinct global indices currently addressable.
    pub fn num_global_nodes(&self) -> usize
    {
        if self.rule.is_nested()
        {
            self.unique.len()
        }
        else
        {
            self.pntr.last().copied().unwrap_or(0) + self.num_points.last().copied().unwrap_or(0)
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn clenshaw_curtis_global_indexing()
    {
        let wrapper = OneDimensionalWrapper::load(SparseGridRule::ClenshawCurtis, 3, None).unwrap();
        assert_eq!(wrapper.num_points(0), 1);
        assert_eq!(wrapper.num_points(2), 5);
        // birth order: 0, then -1, 1, then the level 2 pair, ...
        assert_eq!(wrapper.node(0), 0.0);
        assert_eq!(wrapper.node(1), -1.0);
        assert_eq!(wrapper.node(2), 1.0);
        assert!(wrapper.node(3) < 0.0 && wrapper.node(4) > 0.0);
        // level 2 weights align with global positions and sum to 2
        let total: f64 = (0..5).map(|k| wrapper.weight(2, k)).sum();
        assert!((total - 2.0).abs() < 1e-14);
    }

    #[test]
    fn leja_is_a_sequence()
    {
        let wrapper = OneDimensionalWrapper::load(SparseGridRule::Leja, 4, None).unwrap();
        for level in 0..=4
        {
            assert_eq!(wrapper.num_points(level), level as usize + 1);
        }
        assert_eq!(wrapper.node(0), 0.0);
        assert_eq!(wrapper.node(1), 1.0);
        assert_eq!(wrapper.node(2), -1.0);
    }

    #[test]
    fn gauss_legendre_uses_offsets()
    {
        let wrapper = OneDimensionalWrapper::load(SparseGridRule::GaussLegendre, 2, None).unwrap();
        // levels of 1, 2, 3 points: global indices 0 | 1 2 | 3 4 5
        assert_eq!(wrapper.global_index(0, 0), 0);
        assert_eq!(wrapper.global_index(1, 0), 1);
        assert_eq!(wrapper.global_index(2, 1), 4);
        assert_eq!(wrapper.node(0), 0.0);
        assert_eq!(wrapper.node(4), 0.0); // the 3 point rule also has a zero node
        assert_eq!(wrapper.num_global_nodes(), 6);
    }

    #[test]
    fn gauss_patterson_past_table_errors()
    {
        assert!(OneDimensionalWrapper::load(SparseGridRule::GaussPatterson, 5, None).is_ok());
        assert_eq!(OneDimensionalWrapper::load(SparseGridRule::GaussPatterson, 6, None).unwrap_err(),
            SGError::RuleLevelUnavailable);
    }
}
