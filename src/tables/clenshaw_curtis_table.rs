use std::f64::consts::PI;

use rustfft::{num_complex::Complex, FftPlanner};

///
/// Compute Clenshaw-Curtis weights over [-1, 1] using the approach of
/// J. Waldvogel (2003), "Fast construction of the Fejer and Clenshaw-Curtis
/// quadrature rules".
///
pub fn cc_weights(level: u32) -> Vec<f64> {
    let n = (1_u32 << level) as usize;
    if level == 0
    {
        return vec![2.0];
    }
    let mut n_vals = Vec::new();
    for i in 0..n
    {
        let val = 2 * i + 1;
        if val >= n
        {
            break;
        }
        n_vals.push(val as f64);
    }
    let l = n_vals.len();
    let m = n - l;
    let mut v0: Vec<f64> = n_vals.iter()
        .map(|&i| 2.0 / (i * (i - 2.0)))
        .collect();
    v0.push(1.0 / n_vals[n_vals.len() - 1]);
    v0.extend(vec![0.0; m]);

    let mut v2 = vec![0.0; v0.len() - 1];
    let end = v0.len();
    for i in 0..v2.len()
    {
        v2[i] = -v0[i] - v0[end - i - 1];
    }

    let mut planner = FftPlanner::new();
    let mut weights = vec![Complex::new(-1.0, 0.0); n];
    weights[l] += n as f64;
    weights[m] += n as f64;

    let g_scale = (n * n - 1 + n % 2) as f64;
    for (g, w) in weights.iter_mut().zip(v2)
    {
        g.re = g.re / g_scale + w;
    }
    let fft = planner.plan_fft_inverse(n);
    fft.process(&mut weights);
    for w in weights.iter_mut()
    {
        w.re /= n as f64;
    }
    weights.push(weights[0]);
    weights.iter().map(|x| x.re).collect()
}

/// Clenshaw-Curtis nodes over [-1, 1] in ascending order.
pub fn cc_nodes(level: u32) -> Vec<f64>
{
    let n = cc_num_nodes(level);
    let mut nodes = vec![0.0; n];
    if level > 0
    {
        #[allow(clippy::needless_range_loop)]
        for i in 0..n
        {
            nodes[i] = f64::cos(PI * (n - 1 - i) as f64 / (n - 1) as f64);
        }
        // the midpoint is exact, cos(pi/2) is not
        nodes[(n - 1) / 2] = 0.0;
    }
    nodes
}

pub fn cc_num_nodes(level: u32) -> usize
{
    if level == 0 { 1 } else { (1 << level) + 1 }
}

#[test]
fn check_weights()
{
    for level in 1..8
    {
        let weights = cc_weights(level);
        assert_eq!(weights.len(), cc_num_nodes(level));
        assert!((2.0 - weights.iter().sum::<f64>()).abs() < 1e-14);
    }
    // 5 point rule over [-1,1], reference values from CLENSHAW_CURTIS_RULE by J. Burkardt
    let w = cc_weights(2);
    let reference = [1.0 / 15.0, 8.0 / 15.0, 4.0 / 5.0, 8.0 / 15.0, 1.0 / 15.0];
    for (computed, expected) in w.iter().zip(reference)
    {
        assert!((computed - expected).abs() < 1e-14);
    }
}

#[test]
fn check_nodes_are_nested()
{
    for level in 1..6
    {
        let coarse = cc_nodes(level);
        let fine = cc_nodes(level + 1);
        for (i, &x) in coarse.iter().enumerate()
        {
            assert_eq!(x.to_bits(), fine[2 * i].to_bits());
        }
    }
}

#[test]
fn check_quartic_integral()
{
    // level 2 (5 nodes) integrates degree 5: int x^4 = 2/5
    let nodes = cc_nodes(2);
    let weights = cc_weights(2);
    let q: f64 = nodes.iter().zip(&weights).map(|(&x, &w)| w * x * x * x * x).sum();
    assert!((q - 0.4).abs() < 1e-14);
}
