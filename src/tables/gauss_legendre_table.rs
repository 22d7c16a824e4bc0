use std::f64::consts::PI;

/// Evaluate the Legendre polynomial `P_n` and its derivative at `x`
/// via the three-term recurrence.
fn legendre_and_derivative(n: usize, x: f64) -> (f64, f64)
{
    let mut lm = 1.0;
    let mut l = x;
    if n == 0
    {
        return (1.0, 0.0);
    }
    for i in 2..=n
    {
        let lp = ((2 * i - 1) as f64 * x * l - (i - 1) as f64 * lm) / i as f64;
        lm = l;
        l = lp;
    }
    let dl = n as f64 * (x * l - lm) / (x * x - 1.0);
    (l, dl)
}

/// Gauss-Legendre nodes for the level `level` rule (`level + 1` nodes),
/// ascending over [-1, 1]. Computed by Newton iteration from the
/// Chebyshev-based initial guess; converges to machine precision in a
/// handful of steps.
pub fn gl_nodes(level: u32) -> Vec<f64>
{
    let n = level as usize + 1;
    let mut nodes = vec![0.0; n];
    for k in 0..n
    {
        if 2 * k + 1 == n
        {
            nodes[k] = 0.0;
            continue;
        }
        let mut x = -f64::cos(PI * (k as f64 + 0.75) / (n as f64 + 0.5));
        for _ in 0..100
        {
            let (p, dp) = legendre_and_derivative(n, x);
            let dx = p / dp;
            x -= dx;
            if dx.abs() < 1e-15
            {
                break;
            }
        }
        nodes[k] = x;
    }
    nodes
}

/// Gauss-Legendre weights aligned with [`gl_nodes`].
pub fn gl_weights(level: u32) -> Vec<f64>
{
    let n = level as usize + 1;
    gl_nodes(level).iter().map(|&x|
    {
        let (_, dp) = legendre_and_derivative(n, x);
        2.0 / ((1.0 - x * x) * dp * dp)
    }).collect()
}

#[test]
fn check_low_order_rules()
{
    // 2 point rule: +-1/sqrt(3), weights 1
    let nodes = gl_nodes(1);
    assert!((nodes[0] + 1.0 / 3.0_f64.sqrt()).abs() < 1e-15);
    assert!((nodes[1] - 1.0 / 3.0_f64.sqrt()).abs() < 1e-15);
    assert!(gl_weights(1).iter().all(|&w| (w - 1.0).abs() < 1e-14));
    // 3 point rule: 0, +-sqrt(3/5), weights 8/9, 5/9
    let nodes = gl_nodes(2);
    let weights = gl_weights(2);
    assert!((nodes[1]).abs() < 1e-15);
    assert!((nodes[2] - (0.6_f64).sqrt()).abs() < 1e-15);
    assert!((weights[1] - 8.0 / 9.0).abs() < 1e-14);
    assert!((weights[0] - 5.0 / 9.0).abs() < 1e-14);
}

#[test]
fn check_exactness()
{
    // n points integrate degree 2n - 1
    for level in 0..8u32
    {
        let nodes = gl_nodes(level);
        let weights = gl_weights(level);
        assert!((2.0 - weights.iter().sum::<f64>()).abs() < 1e-13);
        let degree = 2 * (level as i32 + 1) - 2; // highest even exact degree
        let q: f64 = nodes.iter().zip(&weights).map(|(&x, &w)| w * x.powi(degree)).sum();
        let exact = 2.0 / (degree as f64 + 1.0);
        assert!((q - exact).abs() < 1e-13, "level {level}: q={q} exact={exact}");
    }
}
