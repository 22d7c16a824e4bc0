use serde::{Deserialize, Serialize};

use crate::errors::SGError;

/// Point-identification tolerance used when translating node coordinates
/// back to indices.
pub const NUM_TOL: f64 = 1e-12;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SparseGridRule
{
    /// Classic nested rule using Chebyshev extrema with a very low Lebesgue constant.
    #[default]
    ClenshawCurtis,
    /// Nested rule optimized for integration, probably the best integration
    /// rule in more than 2 dimensions. Tabulated through level 5 (63 nodes).
    GaussPatterson,
    /// Greedy nested sequence rule, one new node per level. Well suited for
    /// interpolation and cheap surplus-style refinement.
    Leja,
    /// Non-nested Gauss-Legendre rule with optimal quadrature exactness per level.
    GaussLegendre,
    /// Rule read from a user-supplied table of nodes, weights and exactness.
    CustomTabulated,
}

impl SparseGridRule
{
    /// True when the nodes of level `l` are a subset of the nodes of level `l + 1`.
    pub fn is_nested(&self) -> bool
    {
        matches!(self, SparseGridRule::ClenshawCurtis | SparseGridRule::GaussPatterson | SparseGridRule::Leja)
    }

    /// True for nested rules that grow by exactly one node per level.
    pub fn is_sequence(&self) -> bool
    {
        matches!(self, SparseGridRule::Leja)
    }

    /// Number of nodes of the level `level` one dimensional rule.
    /// Not meaningful for `CustomTabulated` (its table decides).
    pub fn num_points(&self, level: u32) -> usize
    {
        match self
        {
            SparseGridRule::ClenshawCurtis => if level == 0 { 1 } else { (1 << level) + 1 },
            SparseGridRule::GaussPatterson => (1 << (level + 1)) - 1,
            SparseGridRule::Leja | SparseGridRule::GaussLegendre => level as usize + 1,
            SparseGridRule::CustomTabulated => 0,
        }
    }

    /// Highest polynomial degree the level `level` rule integrates exactly.
    pub fn quadrature_exactness(&self, level: u32) -> i64
    {
        match self
        {
            SparseGridRule::ClenshawCurtis => if level == 0 { 1 } else { (1i64 << level) + 1 },
            SparseGridRule::GaussPatterson => if level == 0 { 1 } else { 3 * (1i64 << level) - 1 },
            SparseGridRule::Leja => level as i64,
            SparseGridRule::GaussLegendre => 2 * level as i64 + 1,
            SparseGridRule::CustomTabulated => 0,
        }
    }

    /// Highest polynomial degree the level `level` rule reproduces under interpolation.
    pub fn interpolation_exactness(&self, level: u32) -> i64
    {
        match self
        {
            SparseGridRule::ClenshawCurtis => if level == 0 { 0 } else { 1i64 << level },
            SparseGridRule::GaussPatterson => (1i64 << (level + 1)) - 2,
            SparseGridRule::Leja | SparseGridRule::GaussLegendre => level as i64,
            SparseGridRule::CustomTabulated => 0,
        }
    }

    /// Canonical name used by the text serialization format.
    pub fn name(&self) -> &'static str
    {
        match self
        {
            SparseGridRule::ClenshawCurtis => "clenshaw-curtis",
            SparseGridRule::GaussPatterson => "gauss-patterson",
            SparseGridRule::Leja => "leja",
            SparseGridRule::GaussLegendre => "gauss-legendre",
            SparseGridRule::CustomTabulated => "customtabulated",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, SGError>
    {
        match name
        {
            "clenshaw-curtis" => Ok(SparseGridRule::ClenshawCurtis),
            "gauss-patterson" => Ok(SparseGridRule::GaussPatterson),
            "leja" => Ok(SparseGridRule::Leja),
            "gauss-legendre" => Ok(SparseGridRule::GaussLegendre),
            "customtabulated" => Ok(SparseGridRule::CustomTabulated),
            _ => Err(SGError::UnknownRule),
        }
    }

    /// Stable integer id used by the binary serialization format.
    pub fn io_id(&self) -> i32
    {
        match self
        {
            SparseGridRule::ClenshawCurtis => 1,
            SparseGridRule::GaussPatterson => 2,
            SparseGridRule::Leja => 3,
            SparseGridRule::GaussLegendre => 4,
            SparseGridRule::CustomTabulated => 5,
        }
    }

    pub fn from_io_id(id: i32) -> Result<Self, SGError>
    {
        match id
        {
            1 => Ok(SparseGridRule::ClenshawCurtis),
            2 => Ok(SparseGridRule::GaussPatterson),
            3 => Ok(SparseGridRule::Leja),
            4 => Ok(SparseGridRule::GaussLegendre),
            5 => Ok(SparseGridRule::CustomTabulated),
            _ => Err(SGError::UnknownRule),
        }
    }
}

#[test]
fn rule_names_round_trip()
{
    for rule in [SparseGridRule::ClenshawCurtis, SparseGridRule::GaussPatterson, SparseGridRule::Leja,
        SparseGridRule::GaussLegendre, SparseGridRule::CustomTabulated]
    {
        assert_eq!(SparseGridRule::from_name(rule.name()).unwrap(), rule);
        assert_eq!(SparseGridRule::from_io_id(rule.io_id()).unwrap(), rule);
    }
    assert_eq!(SparseGridRule::from_name("chebyshev"), Err(SGError::UnknownRule));
}

#[test]
fn point_growth_matches_exactness_tables()
{
    // an n point interpolatory rule is exact at least to degree n - 1
    for level in 0..5
    {
        for rule in [SparseGridRule::ClenshawCurtis, SparseGridRule::GaussPatterson,
            SparseGridRule::Leja, SparseGridRule::GaussLegendre]
        {
            let n = rule.num_points(level) as i64;
            assert!(rule.quadrature_exactness(level) >= n - 1);
            assert!(rule.interpolation_exactness(level) >= n - 1);
        }
    }
}
