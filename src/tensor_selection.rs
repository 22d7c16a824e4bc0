use serde::{Deserialize, Serialize};

use crate::custom_tabulated::CustomTabulated;
use crate::errors::SGError;
use crate::multi_index_manipulation::{lower_set_from_criterion, remove_by_limit};
use crate::multi_index_set::MultiIndexSet;
use crate::rules::SparseGridRule;

///
/// Contour used to select the initial multi-index set: how a candidate tensor
/// is scored against the target depth. The `Ip*`/`Qp*` variants score by the
/// one dimensional rule's interpolation/quadrature exactness instead of the
/// raw level.
///
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TensorSelection
{
    /// Weighted sum of levels.
    #[default]
    Level,
    /// Weighted maximum of levels (full-tensor selection).
    Tensor,
    /// Weighted geometric contour.
    Hyperbolic,
    /// Weighted sum with logarithmic correction terms.
    Curved,
    IpTotal,
    IpTensor,
    IpHyperbolic,
    IpCurved,
    QpTotal,
    QpTensor,
    QpHyperbolic,
    QpCurved,
}

impl TensorSelection
{
    pub fn uses_interpolation_exactness(&self) -> bool
    {
        matches!(self, TensorSelection::IpTotal | TensorSelection::IpTensor
            | TensorSelection::IpHyperbolic | TensorSelection::IpCurved)
    }

    pub fn uses_quadrature_exactness(&self) -> bool
    {
        matches!(self, TensorSelection::QpTotal | TensorSelection::QpTensor
            | TensorSelection::QpHyperbolic | TensorSelection::QpCurved)
    }

    pub fn is_curved(&self) -> bool
    {
        matches!(self, TensorSelection::Curved | TensorSelection::IpCurved | TensorSelection::QpCurved)
    }

    pub fn is_tensor(&self) -> bool
    {
        matches!(self, TensorSelection::Tensor | TensorSelection::IpTensor | TensorSelection::QpTensor)
    }

    pub fn is_hyperbolic(&self) -> bool
    {
        matches!(self, TensorSelection::Hyperbolic | TensorSelection::IpHyperbolic | TensorSelection::QpHyperbolic)
    }
}

///
/// Split a raw anisotropic weight vector into linear and curved parts,
/// applying the defaults: an empty vector means isotropic ones, and for the
/// curved contours it also drops the logarithmic correction (the contour
/// demotes to its non-curved counterpart).
///
pub(crate) struct ContourWeights
{
    pub linear: Vec<i32>,
    pub curved: Vec<f64>,
}

impl ContourWeights
{
    pub fn new(num_dimensions: usize, selection: TensorSelection, raw: &[i32]) -> Result<Self, SGError>
    {
        let expected = if selection.is_curved() { 2 * num_dimensions } else { num_dimensions };
        if !raw.is_empty() && raw.len() != expected
        {
            return Err(SGError::InvalidAnisotropicWeights);
        }
        if raw.is_empty()
        {
            return Ok(Self { linear: vec![1; num_dimensions], curved: vec![0.0; num_dimensions] });
        }
        let linear = raw[..num_dimensions].to_vec();
        if linear.iter().any(|&w| w <= 0)
        {
            return Err(SGError::InvalidAnisotropicWeights);
        }
        let curved = if selection.is_curved()
        {
            raw[num_dimensions..].iter().map(|&c| c as f64).collect()
        }
        else
        {
            vec![0.0; num_dimensions]
        };
        Ok(Self { linear, curved })
    }

    fn min_linear(&self) -> i32
    {
        *self.linear.iter().min().unwrap()
    }
}

/// Per-level contour coordinate: raw level, or the rule exactness shifted so
/// that consecutive levels always differ (level 0 maps to 0, level `l > 0`
/// maps to `1 + exactness(l - 1)`).
fn exactness_map(selection: TensorSelection, rule: SparseGridRule,
    custom: Option<&CustomTabulated>) -> Result<Box<dyn Fn(i32) -> i64>, SGError>
{
    // levels past the end of a custom table score unreachably high, so the
    // selection never walks off the table
    const PAST_TABLE: i64 = i64::MAX / 4;
    if selection.uses_interpolation_exactness()
    {
        if let Some(table) = custom
        {
            let exact: Vec<i64> = (0..table.num_levels()).map(|l| table.i_exact(l as u32)).collect();
            Ok(Box::new(move |l| match l
            {
                0 => 0,
                l if (l as usize) <= exact.len() => 1 + exact[l as usize - 1],
                _ => PAST_TABLE,
            }))
        }
        else
        {
            Ok(Box::new(move |l| if l == 0 { 0 } else { 1 + rule.interpolation_exactness(l as u32 - 1) }))
        }
    }
    else if selection.uses_quadrature_exactness()
    {
        if let Some(table) = custom
        {
            let exact: Vec<i64> = (0..table.num_levels()).map(|l| table.q_exact(l as u32)).collect();
            Ok(Box::new(move |l| match l
            {
                0 => 0,
                l if (l as usize) <= exact.len() => 1 + exact[l as usize - 1],
                _ => PAST_TABLE,
            }))
        }
        else
        {
            Ok(Box::new(move |l| if l == 0 { 0 } else { 1 + rule.quadrature_exactness(l as u32 - 1) }))
        }
    }
    else
    {
        Ok(Box::new(|l| l as i64))
    }
}

///
/// Score a tensor against the contour of `selection` with the given weights;
/// the returned value is compared against the (scaled) depth. Shared between
/// the initial selection and the dynamic-construction candidate ranking.
///
pub(crate) fn contour_value(t_mapped: &[i64], selection: TensorSelection, weights: &ContourWeights) -> f64
{
    if selection.is_tensor()
    {
        t_mapped.iter().zip(&weights.linear)
            .map(|(&g, &w)| g.saturating_mul(w as i64) as f64)
            .fold(0.0, f64::max)
    }
    else if selection.is_hyperbolic()
    {
        let total: i32 = weights.linear.iter().sum();
        let product: f64 = t_mapped.iter().zip(&weights.linear)
            .map(|(&g, &w)| ((g + 1) as f64).powf(w as f64 / total as f64))
            .product();
        product - 1.0
    }
    else
    {
        let linear: i64 = t_mapped.iter().zip(&weights.linear)
            .map(|(&g, &w)| g.saturating_mul(w as i64))
            .fold(0, i64::saturating_add);
        let curved: f64 = t_mapped.iter().zip(&weights.curved)
            .map(|(&g, &c)| c * ((1 + g) as f64).ln())
            .sum();
        linear as f64 + curved
    }
}

///
/// Produce the initial multi-index set for `(depth, selection, weights, rule)`
/// and prune it by `level_limits` (entries `< 0` leave a dimension unlimited).
///
pub fn select_tensors(num_dimensions: usize, depth: i32, selection: TensorSelection,
    anisotropic_weights: &[i32], rule: SparseGridRule, custom: Option<&CustomTabulated>,
    level_limits: &[i32]) -> Result<MultiIndexSet, SGError>
{
    if !level_limits.is_empty() && level_limits.len() != num_dimensions
    {
        return Err(SGError::InvalidLevelLimits);
    }
    let mut selection = selection;
    let weights = ContourWeights::new(num_dimensions, selection, anisotropic_weights)?;
    if selection.is_curved() && anisotropic_weights.is_empty()
    {
        // no weights were given: the log correction carries no information
        selection = TensorSelection::Level;
    }
    let map = exactness_map(selection, rule, custom)?;
    let bound = if selection.is_hyperbolic()
    {
        depth as f64
    }
    else
    {
        (depth as i64 * weights.min_linear() as i64) as f64
    };
    let set = lower_set_from_criterion(num_dimensions, |t|
    {
        let mapped: Vec<i64> = t.iter().map(|&l| map(l)).collect();
        contour_value(&mapped, selection, &weights) <= bound
    });
    if level_limits.is_empty()
    {
        Ok(set)
    }
    else
    {
        Ok(remove_by_limit(&set, level_limits))
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn isotropic_level_selection_is_total_degree()
    {
        let set = select_tensors(2, 3, TensorSelection::Level, &[], SparseGridRule::ClenshawCurtis, None, &[]).unwrap();
        assert_eq!(set.len(), 10); // C(3+2,2)
        assert!(set.contains(&[3, 0]));
        assert!(set.missing(&[2, 2]));
    }

    #[test]
    fn anisotropic_weights_skew_the_simplex()
    {
        let set = select_tensors(2, 4, TensorSelection::Level, &[2, 1], SparseGridRule::ClenshawCurtis, None, &[]).unwrap();
        // bound = 4 * min(w) = 4: 2*t0 + t1 <= 4
        assert!(set.contains(&[2, 0]));
        assert!(set.contains(&[0, 4]));
        assert!(set.contains(&[1, 2]));
        assert!(set.missing(&[2, 1]));
    }

    #[test]
    fn tensor_selection_is_a_box()
    {
        let set = select_tensors(2, 2, TensorSelection::Tensor, &[], SparseGridRule::ClenshawCurtis, None, &[]).unwrap();
        assert_eq!(set.len(), 9);
        assert!(set.contains(&[2, 2]));
    }

    #[test]
    fn qp_selection_uses_rule_exactness()
    {
        // gauss-patterson: level 1 contributes 1 + q_exact(0) = 2,
        // level 2 contributes 1 + q_exact(1) = 6
        let set = select_tensors(3, 6, TensorSelection::QpTotal, &[], SparseGridRule::GaussPatterson, None, &[]).unwrap();
        assert!(set.contains(&[1, 1, 1]));
        assert!(set.contains(&[2, 0, 0]));
        assert!(set.missing(&[2, 1, 0]));
        assert!(set.missing(&[3, 0, 0]));
    }

    #[test]
    fn level_limits_prune_dimensions()
    {
        let set = select_tensors(2, 5, TensorSelection::Level, &[], SparseGridRule::ClenshawCurtis, None, &[2, -1]).unwrap();
        assert!(set.iter().all(|t| t[0] <= 2));
        assert!(set.contains(&[0, 5]));
    }

    #[test]
    fn curved_without_weights_demotes_to_level()
    {
        let a = select_tensors(2, 3, TensorSelection::Curved, &[], SparseGridRule::ClenshawCurtis, None, &[]).unwrap();
        let b = select_tensors(2, 3, TensorSelection::Level, &[], SparseGridRule::ClenshawCurtis, None, &[]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn bad_weight_length_is_rejected()
    {
        let r = select_tensors(2, 3, TensorSelection::Level, &[1, 1, 1], SparseGridRule::ClenshawCurtis, None, &[]);
        assert_eq!(r.unwrap_err(), SGError::InvalidAnisotropicWeights);
        let r = select_tensors(2, 3, TensorSelection::Curved, &[1, 1], SparseGridRule::ClenshawCurtis, None, &[]);
        assert_eq!(r.unwrap_err(), SGError::InvalidAnisotropicWeights);
    }
}
