use crate::one_dimensional_wrapper::OneDimensionalWrapper;

// Lagrange basis values at a given point x.
// points: interpolation nodes, coeffs: precomputed barycentric coefficients
#[inline]
pub fn lagrange_weights(x: f64, coeffs: &[f64], points: &[f64]) -> Vec<f64>
{
    let mut weights = vec![0.0; points.len()];
    let mut normalization_factor = 0.0;

    // handle case where point coincides with one of our nodes...
    for (&point, weight) in points.iter().zip(weights.iter_mut())
    {
        if (point - x).abs() < f64::EPSILON
        {
            *weight = 1.0;
            return weights;
        }
    }
    coeffs.iter().zip(points).zip(weights.iter_mut()).for_each(|((&coeff, &xi), weight)|
    {
        *weight = coeff / (x - xi);
        normalization_factor += *weight;
    });
    weights.iter_mut().for_each(|w| *w /= normalization_factor);
    weights
}

pub fn lagrange_coeffs(points: &[f64]) -> Vec<f64>
{
    let mut coeffs = Vec::with_capacity(points.len());
    for i in 0..points.len() {
        let mut li = 1.0;
        for j in 0..points.len() {
            if i != j {
                if points[j] == points[i]
                {
                    continue;
                }
                li *= points[i] - points[j];
            }
        }
        coeffs.push(1.0 / li);
    }
    coeffs
}

///
/// Per (dimension, level) cache of Lagrange basis values at one query
/// coordinate, used by the Smolyak interpolation-weight accumulation: entry
/// `(j, l)[k]` is the value at `x[j]` of the basis function anchored at node
/// `k` of the level `l` rule.
///
pub struct CacheLagrange
{
    cache: Vec<Vec<Vec<f64>>>,
}

impl CacheLagrange
{
    pub fn new(num_dimensions: usize, max_levels: &[i32], wrapper: &OneDimensionalWrapper, x: &[f64]) -> Self
    {
        let mut cache = Vec::with_capacity(num_dimensions);
        for j in 0..num_dimensions
        {
            let mut per_level = Vec::with_capacity(max_levels[j] as usize + 1);
            for level in 0..=max_levels[j]
            {
                let nodes = wrapper.level_nodes(level);
                per_level.push(lagrange_weights(x[j], &lagrange_coeffs(nodes), nodes));
            }
            cache.push(per_level);
        }
        Self { cache }
    }

    #[inline]
    pub fn lagrange(&self, dim: usize, level: i32, k: usize) -> f64
    {
        self.cache[dim][level as usize][k]
    }
}

#[test]
fn test_lagrange_weights()
{
    use crate::tables::clenshaw_curtis_table::cc_nodes;
    let points = cc_nodes(3);
    let weights = lagrange_weights(0.2, &lagrange_coeffs(&points), &points);
    assert!((1.0 - weights.iter().zip(points).map(|(&w, x)| w * x * x).sum::<f64>() / (0.2 * 0.2)).abs() < 1e-13);
}

#[test]
fn test_lagrange_at_a_node()
{
    use crate::tables::clenshaw_curtis_table::cc_nodes;
    let points = cc_nodes(2);
    let weights = lagrange_weights(points[1], &lagrange_coeffs(&points), &points);
    for (i, &w) in weights.iter().enumerate()
    {
        assert_eq!(w, if i == 1 { 1.0 } else { 0.0 });
    }
}

#[test]
fn cache_matches_direct_evaluation()
{
    use crate::rules::SparseGridRule;
    let wrapper = crate::one_dimensional_wrapper::OneDimensionalWrapper::load(SparseGridRule::ClenshawCurtis, 2, None).unwrap();
    let cache = CacheLagrange::new(1, &[2], &wrapper, &[0.3]);
    let nodes = wrapper.level_nodes(2);
    let direct = lagrange_weights(0.3, &lagrange_coeffs(nodes), nodes);
    for (k, &w) in direct.iter().enumerate()
    {
        assert_eq!(cache.lagrange(0, 2, k), w);
    }
}
