use serde::{Deserialize, Serialize};

///
/// One dimensional wavelet rule on the dyadic nodes of [-1, 1].
///
/// Order 1 uses a three-node base level {0, -1, 1} of hat functions and
/// lifted piecewise-linear wavelets above it; level `l` spans
/// `2^(l+1) + 1` nodes. Order 3 uses a five-node base level of quartic
/// cardinal polynomials and lifted C^1 cubic bumps with four-point
/// (Deslauriers-Dubuc) prediction stencils; level `l` spans `2^(l+2) + 1`
/// nodes. Nodes are indexed in birth order, so the first `num_points(l)`
/// indices are exactly the nodes of level `l`.
///
/// `get_parent` returns `-1` for base nodes and `-2` for first-level wavelets
/// (meaning: the whole base level acts as the parent set); `get_children`
/// returns `-1` in a slot with no child.
///
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WaveletRule
{
    order: i32,
}

#[inline]
fn hat(x: f64, center: f64, width: f64) -> f64
{
    f64::max(0.0, 1.0 - (x - center).abs() / width)
}

/// C^1 cubic bump: value 1 and zero slope at the center, zero value and slope
/// at `center +- width`.
#[inline]
fn bump(x: f64, center: f64, width: f64) -> f64
{
    let t = (x - center).abs() / width;
    if t >= 1.0
    {
        0.0
    }
    else
    {
        (1.0 - t) * (1.0 - t) * (1.0 + 2.0 * t)
    }
}

/// Integral over [-1, 1] of a hat or bump of the given width (both integrate
/// to their width), halved when the center sits on the boundary.
#[inline]
fn component_integral(center: f64, width: f64) -> f64
{
    if center.abs() >= 1.0 { 0.5 * width } else { width }
}

const ORDER3_BASE: [f64; 5] = [0.0, -1.0, 1.0, -0.5, 0.5];
const ORDER3_BASE_WEIGHTS: [f64; 5] = [12.0 / 45.0, 7.0 / 45.0, 7.0 / 45.0, 32.0 / 45.0, 32.0 / 45.0];

impl WaveletRule
{
    pub fn new(order: i32) -> Self
    {
        assert!(order == 1 || order == 3, "wavelet order must be 1 or 3");
        Self { order }
    }

    pub fn order(&self) -> i32
    {
        self.order
    }

    /// Number of base-level nodes: 3 for order 1, 5 for order 3.
    fn base(&self) -> i32
    {
        if self.order == 1 { 3 } else { 5 }
    }

    pub fn num_points(&self, level: i32) -> usize
    {
        if self.order == 1
        {
            (1usize << (level + 1)) + 1
        }
        else
        {
            (1usize << (level + 2)) + 1
        }
    }

    /// Dyadic level and in-level position of a wavelet index.
    fn split(&self, index: i32) -> (i32, i32)
    {
        debug_assert!(index >= self.base());
        let level = if self.order == 1
        {
            (index as u32 - 1).ilog2() as i32
        }
        else
        {
            (index as u32 - 1).ilog2() as i32 - 1
        };
        let first = self.num_points(level - 1) as i32;
        (level, index - first)
    }

    pub fn get_level(&self, index: i32) -> i32
    {
        if index < self.base() { 0 } else { self.split(index).0 }
    }

    pub fn get_node(&self, index: i32) -> f64
    {
        if index < self.base()
        {
            if self.order == 1
            {
                [0.0, -1.0, 1.0][index as usize]
            }
            else
            {
                ORDER3_BASE[index as usize]
            }
        }
        else
        {
            let (level, k) = self.split(index);
            let h = self.fine_step(level);
            -1.0 + (2 * k + 1) as f64 * h
        }
    }

    /// Support half-width of the fine-scale component at `level`.
    fn fine_step(&self, level: i32) -> f64
    {
        if self.order == 1
        {
            0.5_f64.powi(level)
        }
        else
        {
            0.5_f64.powi(level + 1)
        }
    }

    pub fn get_parent(&self, index: i32) -> i32
    {
        if index < self.base()
        {
            return -1;
        }
        let (level, k) = self.split(index);
        if level == 1
        {
            return -2;
        }
        self.num_points(level - 2) as i32 + (k >> 1)
    }

    pub fn get_children(&self, index: i32) -> (i32, i32)
    {
        if index >= self.base()
        {
            return (2 * index - 1, 2 * index);
        }
        if self.order == 1
        {
            match index
            {
                0 => (3, 4),
                1 => (3, -1),
                _ => (4, -1),
            }
        }
        else
        {
            match index
            {
                0 => (6, 7),
                1 => (5, -1),
                2 => (8, -1),
                3 => (5, 6),
                _ => (7, 8),
            }
        }
    }

    /// Prediction stencil of a level >= 1 wavelet: coarse-node index offsets
    /// (multiples of the coarse spacing from -1) and coefficients.
    fn stencil(&self, level: i32, k: i32) -> ([i32; 4], [f64; 4])
    {
        let n = self.num_coarse_intervals(level);
        if k == 0
        {
            ([0, 1, 2, 3], [5.0 / 16.0, 15.0 / 16.0, -5.0 / 16.0, 1.0 / 16.0])
        }
        else if k == n - 1
        {
            ([n, n - 1, n - 2, n - 3], [5.0 / 16.0, 15.0 / 16.0, -5.0 / 16.0, 1.0 / 16.0])
        }
        else
        {
            ([k - 1, k, k + 1, k + 2], [-1.0 / 16.0, 9.0 / 16.0, 9.0 / 16.0, -1.0 / 16.0])
        }
    }

    /// Number of coarse-grid intervals below level `level` (order 3).
    fn num_coarse_intervals(&self, level: i32) -> i32
    {
        1 << (level + 1)
    }

    pub fn eval(&self, index: i32, x: f64) -> f64
    {
        if self.order == 1
        {
            if index < 3
            {
                let center = [0.0, -1.0, 1.0][index as usize];
                return hat(x, center, 1.0);
            }
            let (level, k) = self.split(index);
            let h = self.fine_step(level);
            let x0 = -1.0 + (2 * k + 1) as f64 * h;
            hat(x, x0, h) - 0.25 * hat(x, x0 - h, 2.0 * h) - 0.25 * hat(x, x0 + h, 2.0 * h)
        }
        else
        {
            if index < 5
            {
                // quartic cardinal polynomial on the five base nodes
                let center = ORDER3_BASE[index as usize];
                let mut value = 1.0;
                for &node in ORDER3_BASE.iter()
                {
                    if node != center
                    {
                        value *= (x - node) / (center - node);
                    }
                }
                return value;
            }
            let (level, k) = self.split(index);
            let h = self.fine_step(level);
            let coarse = 2.0 * h;
            let x0 = -1.0 + (2 * k + 1) as f64 * h;
            let (offsets, coeffs) = self.stencil(level, k);
            let mut value = bump(x, x0, h);
            for (&offset, &coeff) in offsets.iter().zip(&coeffs)
            {
                let center = -1.0 + offset as f64 * coarse;
                value -= coeff * bump(x, center, coarse);
            }
            value
        }
    }

    /// Integral of the basis function over [-1, 1].
    pub fn get_weight(&self, index: i32) -> f64
    {
        if self.order == 1
        {
            if index == 0
            {
                return 1.0;
            }
            if index < 3
            {
                return 0.5;
            }
            let (level, k) = self.split(index);
            let h = self.fine_step(level);
            let x0 = -1.0 + (2 * k + 1) as f64 * h;
            h - 0.25 * component_integral(x0 - h, 2.0 * h) - 0.25 * component_integral(x0 + h, 2.0 * h)
        }
        else
        {
            if index < 5
            {
                return ORDER3_BASE_WEIGHTS[index as usize];
            }
            let (level, k) = self.split(index);
            let h = self.fine_step(level);
            let coarse = 2.0 * h;
            let (offsets, coeffs) = self.stencil(level, k);
            let mut weight = h;
            for (&offset, &coeff) in offsets.iter().zip(&coeffs)
            {
                let center = -1.0 + offset as f64 * coarse;
                weight -= coeff * component_integral(center, coarse);
            }
            weight
        }
    }
}
