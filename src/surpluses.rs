use nalgebra::{DMatrix, DVector};
use rayon::iter::{IndexedParallelIterator, IntoParallelRefMutIterator, ParallelIterator};

use crate::errors::SGError;
use crate::grids::global::GlobalGrid;
use crate::multi_index_manipulation::lower_set_from_criterion;
use crate::multi_index_set::MultiIndexSet;
use crate::rules::{SparseGridRule, NUM_TOL};
use crate::tables::gauss_patterson_table::GP_MAX_LEVEL;
use crate::tensor_selection::TensorSelection;

/// Degree `n` Legendre polynomial at `x` via the three-term recurrence.
pub(crate) fn legendre(n: i32, x: f64) -> f64
{
    if n == 0
    {
        return 1.0;
    }
    if n == 1
    {
        return x;
    }
    let mut lm = 1.0;
    let mut l = x;
    for i in 2..=n
    {
        let lp = ((2 * i - 1) as f64 * x * l) / i as f64 - ((i - 1) as f64 * lm) / i as f64;
        lm = l;
        l = lp;
    }
    l
}

///
/// Hierarchical surpluses of the loaded values for one output.
///
/// Sequence rules (one new node per level) carry natural per-point surpluses:
/// the Newton-basis coefficients of the interpolant, computed by forward
/// substitution in lexicographic order. `normalize` divides by the largest
/// absolute loaded value.
///
/// For every other rule the surpluses are projections onto the normalized
/// Legendre basis, computed with an auxiliary Gauss-Patterson quadrature grid
/// whose exactness dominates the polynomial space of the grid (falling back
/// to Clenshaw-Curtis when the tabulated Gauss-Patterson levels run out).
///
pub fn compute_surpluses(grid: &GlobalGrid, output: usize, normalize: bool) -> Result<Vec<f64>, SGError>
{
    if output >= grid.num_outputs()
    {
        return Err(SGError::InvalidOutput);
    }
    if grid.values.is_empty()
    {
        return Err(SGError::NoValuesLoaded);
    }
    let num_points = grid.points.len();
    let d = grid.num_dimensions();

    if grid.rule().is_sequence()
    {
        let mut max_surp = 0.0_f64;
        let mut surp = vec![0.0; num_points];
        for (i, s) in surp.iter_mut().enumerate()
        {
            *s = grid.values.row(i)[output];
            max_surp = max_surp.max(s.abs());
        }

        // Newton basis values on the sequence nodes: basis[k][i] = N_k(x_i)
        let num_nodes = grid.points.max_per_dimension().into_iter().max().unwrap_or(0) as usize + 1;
        let nodes: Vec<f64> = (0..num_nodes).map(|i| grid.wrapper.node(i as i32)).collect();
        let mut basis = vec![vec![0.0; num_nodes]; num_nodes];
        for (k, row) in basis.iter_mut().enumerate()
        {
            let mut denominator = 1.0;
            for j in 0..k
            {
                denominator *= nodes[k] - nodes[j];
            }
            for (i, value) in row.iter_mut().enumerate()
            {
                let mut numerator = 1.0;
                for j in 0..k
                {
                    numerator *= nodes[i] - nodes[j];
                }
                *value = numerator / denominator;
            }
        }

        // forward substitution: lexicographic order visits ancestors first
        for i in 0..num_points
        {
            let p = grid.points.index(i).to_vec();
            let mut correction = 0.0;
            for j in 0..i
            {
                let q = grid.points.index(j);
                if q.iter().zip(&p).all(|(&a, &b)| a <= b)
                {
                    let mut prod = surp[j];
                    for (&qd, &pd) in q.iter().zip(&p)
                    {
                        prod *= basis[qd as usize][pd as usize];
                    }
                    correction += prod;
                }
            }
            surp[i] -= correction;
        }
        if normalize && max_surp > 0.0
        {
            for s in surp.iter_mut()
            {
                *s /= max_surp;
            }
        }
        return Ok(surp);
    }

    // Legendre-basis estimator with an auxiliary quadrature grid
    let poly = grid.polynomial_space(true);
    let gp_tensors = quadrature_tensors(d, &poly, SparseGridRule::GaussPatterson);
    let max_quad_level = gp_tensors.max_per_dimension().into_iter().max().unwrap_or(0);
    let quad_grid = if max_quad_level as u32 <= GP_MAX_LEVEL
    {
        GlobalGrid::from_tensors(gp_tensors, 0, SparseGridRule::GaussPatterson, 0.0, 0.0, None)?
    }
    else
    {
        let cc_tensors = quadrature_tensors(d, &poly, SparseGridRule::ClenshawCurtis);
        GlobalGrid::from_tensors(cc_tensors, 0, SparseGridRule::ClenshawCurtis, 0.0, 0.0, None)?
    };

    let quad_weights = quad_grid.quadrature_weights();
    let quad_x = quad_grid.points();
    let interpolant = grid.evaluate_batch(&quad_x)?;
    let m = grid.num_outputs();
    let integrand: Vec<f64> = interpolant.iter().skip(output).step_by(m).copied().collect();

    let mut surp = vec![0.0; num_points];
    surp.par_iter_mut().enumerate().for_each(|(i, s)|
    {
        let p = grid.points.index(i);
        let mut c = 0.0;
        for (k, (&w, &f)) in quad_weights.iter().zip(&integrand).enumerate()
        {
            let mut v = 1.0;
            for (j, &pj) in p.iter().enumerate()
            {
                v *= legendre(pj, quad_x[k * d + j]);
            }
            c += w * f * v;
        }
        let mut nrm = 1.0;
        for &pj in p
        {
            nrm *= (pj as f64 + 0.5).sqrt();
        }
        *s = c * nrm;
    });
    Ok(surp)
}

/// Smallest lower set of quadrature tensors whose mapped exactness covers the
/// polynomial space: a tensor is admitted while its image stays inside `poly`.
fn quadrature_tensors(d: usize, poly: &MultiIndexSet, rule: SparseGridRule) -> MultiIndexSet
{
    lower_set_from_criterion(d, |q|
    {
        let image: Vec<i32> = q.iter()
            .map(|&l| if l == 0 { 0 } else { 1 + rule.quadrature_exactness(l as u32 - 1) as i32 })
            .collect();
        poly.contains(&image)
    })
}

///
/// Estimate anisotropic contour weights from the decay of the surpluses:
/// fit `-log|s| ~ A x` over the significant surpluses and read the
/// per-dimension decay rates off the solution (scaled by 1000 and rounded).
/// Non-positive linear weights are replaced by the smallest strictly positive
/// one; when no linear weight comes out positive the estimate falls back to
/// isotropic. Curved weights are clamped to their linear counterparts in
/// absolute value, keeping their sign.
///
pub fn estimate_anisotropic_weights(grid: &GlobalGrid, selection: TensorSelection, output: usize)
    -> Result<Vec<i32>, SGError>
{
    let tol = 1000.0 * NUM_TOL;
    let surp = compute_surpluses(grid, output, false)?;
    let d = grid.num_dimensions();
    let curved = selection.is_curved();
    let m = if curved { 2 * d + 1 } else { d + 1 };

    let kept: Vec<usize> = (0..grid.points.len()).filter(|&i| surp[i].abs() > tol).collect();
    let n = kept.len();
    if n == 0
    {
        return Ok(fallback_isotropic(d, curved));
    }

    let mut a = DMatrix::<f64>::zeros(n, m);
    let mut b = DVector::<f64>::zeros(n);
    for (row, &i) in kept.iter().enumerate()
    {
        let p = grid.points.index(i);
        for (j, &pj) in p.iter().enumerate()
        {
            a[(row, j)] = pj as f64;
            if curved
            {
                a[(row, d + j)] = ((pj + 1) as f64).ln();
            }
        }
        a[(row, m - 1)] = 1.0;
        b[row] = -surp[i].abs().ln();
    }

    let svd = a.svd(true, true);
    let x = svd.solve(&b, 1e-5).map_err(|_| SGError::LeastSquaresFailed)?;

    let mut weights: Vec<i32> = (0..m - 1).map(|j| (x[j] * 1000.0).round() as i32).collect();

    let has_positive = weights[..d].iter().any(|&w| w > 0);
    if !has_positive
    {
        return Ok(fallback_isotropic(d, curved));
    }
    let min_weight = weights[..d].iter().copied().filter(|&w| w > 0).min().unwrap();
    for j in 0..d
    {
        if weights[j] <= 0
        {
            weights[j] = min_weight;
        }
        if curved && weights[d + j].abs() > weights[j]
        {
            weights[d + j] = if weights[d + j] > 0 { weights[j] } else { -weights[j] };
        }
    }
    Ok(weights)
}

fn fallback_isotropic(d: usize, curved: bool) -> Vec<i32>
{
    let mut weights = vec![1; if curved { 2 * d } else { d }];
    if curved
    {
        for w in weights.iter_mut().skip(d)
        {
            *w = 0;
        }
    }
    weights
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::grids::global::{GlobalGrid, GlobalGridOptions};

    fn leja_grid_with<F: Fn(&[f64]) -> f64>(depth: i32, f: F) -> GlobalGrid
    {
        let mut grid = GlobalGrid::make(2, GlobalGridOptions
        {
            num_outputs: 1,
            depth,
            selection: TensorSelection::Level,
            rule: SparseGridRule::Leja,
            ..Default::default()
        }).unwrap();
        let x = grid.needed_points();
        let values: Vec<f64> = x.chunks_exact(2).map(|p| f(p)).collect();
        grid.load_needed_points(&values).unwrap();
        grid
    }

    #[test]
    fn legendre_recurrence_matches_known_polynomials()
    {
        for &x in &[-0.9, -0.3, 0.0, 0.4, 1.0]
        {
            assert!((legendre(2, x) - 0.5 * (3.0 * x * x - 1.0)).abs() < 1e-14);
            assert!((legendre(3, x) - 0.5 * (5.0 * x * x * x - 3.0 * x)).abs() < 1e-14);
        }
    }

    #[test]
    fn sequence_surpluses_reproduce_low_degree_polynomials()
    {
        // f = x0 + x1^2: the interpolant is exact at depth 2, so the
        // surpluses above the polynomial support must vanish
        let grid = leja_grid_with(3, |p| p[0] + p[1] * p[1]);
        let surp = compute_surpluses(&grid, 0, false).unwrap();
        for (p, &s) in grid.points.iter().zip(&surp)
        {
            if p[0] > 1 || p[1] > 2
            {
                assert!(s.abs() < 1e-12, "point {p:?}: surplus {s}");
            }
        }
        // the surplus at the origin is f at the first node
        let first = grid.points.position(&[0, 0]).unwrap();
        assert!((surp[first] - grid.values.row(first)[0]).abs() < 1e-14);
    }

    #[test]
    fn legendre_surpluses_flag_the_rough_direction()
    {
        let mut grid = GlobalGrid::make(2, GlobalGridOptions
        {
            num_outputs: 1,
            depth: 4,
            selection: TensorSelection::Level,
            rule: SparseGridRule::ClenshawCurtis,
            ..Default::default()
        }).unwrap();
        let x = grid.needed_points();
        let values: Vec<f64> = x.chunks_exact(2).map(|p| (3.0 * p[0]).exp()).collect();
        grid.load_needed_points(&values).unwrap();
        let surp = compute_surpluses(&grid, 0, false).unwrap();
        // deep x0 modes must carry more energy than deep x1 modes
        let deep_x0 = grid.points.position(&[4, 0]).map(|i| surp[i].abs()).unwrap_or(0.0);
        let deep_x1 = grid.points.position(&[0, 4]).map(|i| surp[i].abs()).unwrap_or(0.0);
        assert!(deep_x0 > 10.0 * deep_x1, "x0 mode {deep_x0} vs x1 mode {deep_x1}");
    }

    #[test]
    fn non_positive_weights_fall_back_to_isotropic()
    {
        // constant function: every surplus beyond the first is below the
        // significance threshold, triggering the isotropic fallback
        let grid = leja_grid_with(3, |_| 1.0);
        let weights = estimate_anisotropic_weights(&grid, TensorSelection::IpTotal, 0).unwrap();
        assert_eq!(weights, vec![1, 1]);
        let weights = estimate_anisotropic_weights(&grid, TensorSelection::IpCurved, 0).unwrap();
        assert_eq!(weights, vec![1, 1, 0, 0]);
    }

    #[test]
    fn curved_weights_are_clamped_by_linear_ones()
    {
        let grid = leja_grid_with(6, |p| (2.0 * p[0]).exp() * (0.5 * p[1]).cos());
        let weights = estimate_anisotropic_weights(&grid, TensorSelection::IpCurved, 0).unwrap();
        assert_eq!(weights.len(), 4);
        for j in 0..2
        {
            assert!(weights[j] > 0);
            assert!(weights[2 + j].abs() <= weights[j]);
        }
    }
}
