use serde::{Deserialize, Serialize};

use crate::errors::SGError;

///
/// Compressed sparse row matrix with an ILU(0) factorization, used for the
/// wavelet collocation systems. Solves `M x = b` and `M^T x = b` with
/// preconditioned BiCGStab; the transposed solve reuses the same factors.
///
/// Column indices within a row are kept in ascending order and every row is
/// expected to carry a diagonal entry (collocation matrices always do: a
/// basis function does not vanish at its own node).
///
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct SparseMatrix
{
    num_rows: usize,
    pntr: Vec<usize>,
    indx: Vec<usize>,
    vals: Vec<f64>,
    /// position of the diagonal entry of each row inside `indx`/`ilu`
    diag: Vec<usize>,
    /// ILU(0) factors over the same sparsity pattern: strictly-lower entries
    /// hold L (unit diagonal implied), diagonal and upper entries hold U
    ilu: Vec<f64>,
}

const SOLVE_TOL: f64 = 1e-12;

impl SparseMatrix
{
    /// Assemble from per-row (column, value) lists; columns must be ascending.
    pub fn from_rows(num_rows: usize, rows: Vec<(Vec<usize>, Vec<f64>)>) -> Result<Self, SGError>
    {
        let mut pntr = Vec::with_capacity(num_rows + 1);
        let mut indx = Vec::new();
        let mut vals = Vec::new();
        pntr.push(0);
        for (cols, row_vals) in &rows
        {
            indx.extend_from_slice(cols);
            vals.extend_from_slice(row_vals);
            pntr.push(indx.len());
        }
        let mut matrix = Self { num_rows, pntr, indx, vals, diag: Vec::new(), ilu: Vec::new() };
        matrix.factorize()?;
        Ok(matrix)
    }

    pub fn num_rows(&self) -> usize
    {
        self.num_rows
    }

    /// ILU(0): incomplete LU restricted to the sparsity pattern of the matrix.
    fn factorize(&mut self) -> Result<(), SGError>
    {
        self.diag = vec![0; self.num_rows];
        for i in 0..self.num_rows
        {
            let row = &self.indx[self.pntr[i]..self.pntr[i + 1]];
            match row.binary_search(&i)
            {
                Ok(pos) => self.diag[i] = self.pntr[i] + pos,
                Err(_) => return Err(SGError::SparseSolveFailed),
            }
        }
        self.ilu = self.vals.clone();
        for i in 0..self.num_rows
        {
            for kk in self.pntr[i]..self.diag[i]
            {
                let k = self.indx[kk];
                let pivot = self.ilu[self.diag[k]];
                if pivot == 0.0
                {
                    return Err(SGError::SparseSolveFailed);
                }
                let lik = self.ilu[kk] / pivot;
                self.ilu[kk] = lik;
                // subtract lik * (row k upper part) on the shared pattern
                for jj in (self.diag[k] + 1)..self.pntr[k + 1]
                {
                    let j = self.indx[jj];
                    let row = &self.indx[self.pntr[i]..self.pntr[i + 1]];
                    if let Ok(pos) = row.binary_search(&j)
                    {
                        self.ilu[self.pntr[i] + pos] -= lik * self.ilu[jj];
                    }
                }
            }
        }
        Ok(())
    }

    fn matvec(&self, x: &[f64], y: &mut [f64])
    {
        for i in 0..self.num_rows
        {
            let mut sum = 0.0;
            for k in self.pntr[i]..self.pntr[i + 1]
            {
                sum += self.vals[k] * x[self.indx[k]];
            }
            y[i] = sum;
        }
    }

    fn matvec_transposed(&self, x: &[f64], y: &mut [f64])
    {
        y.fill(0.0);
        for i in 0..self.num_rows
        {
            let xi = x[i];
            for k in self.pntr[i]..self.pntr[i + 1]
            {
                y[self.indx[k]] += self.vals[k] * xi;
            }
        }
    }

    /// z = (L U)^{-1} v
    fn apply_ilu(&self, v: &[f64], z: &mut [f64])
    {
        z.copy_from_slice(v);
        // forward: L z = v, unit diagonal
        for i in 0..self.num_rows
        {
            let mut sum = z[i];
            for k in self.pntr[i]..self.diag[i]
            {
                sum -= self.ilu[k] * z[self.indx[k]];
            }
            z[i] = sum;
        }
        // backward: U z = z
        for i in (0..self.num_rows).rev()
        {
            let mut sum = z[i];
            for k in (self.diag[i] + 1)..self.pntr[i + 1]
            {
                sum -= self.ilu[k] * z[self.indx[k]];
            }
            z[i] = sum / self.ilu[self.diag[i]];
        }
    }

    /// z = (U^T L^T)^{-1} v
    fn apply_ilu_transposed(&self, v: &[f64], z: &mut [f64])
    {
        z.copy_from_slice(v);
        // forward: U^T z = v (U^T is lower triangular), scatter by rows of U
        for k in 0..self.num_rows
        {
            z[k] /= self.ilu[self.diag[k]];
            let zk = z[k];
            for jj in (self.diag[k] + 1)..self.pntr[k + 1]
            {
                z[self.indx[jj]] -= self.ilu[jj] * zk;
            }
        }
        // backward: L^T z = z (L^T is unit upper triangular)
        for k in (0..self.num_rows).rev()
        {
            let zk = z[k];
            for jj in self.pntr[k]..self.diag[k]
            {
                z[self.indx[jj]] -= self.ilu[jj] * zk;
            }
        }
    }

    ///
    /// Preconditioned BiCGStab. Writes the solution into `x`; `transposed`
    /// solves against `M^T` with the same ILU factors.
    ///
    pub fn solve(&self, b: &[f64], x: &mut [f64], transposed: bool) -> Result<(), SGError>
    {
        let n = self.num_rows;
        if n == 0
        {
            return Ok(());
        }
        let norm_b = b.iter().map(|v| v * v).sum::<f64>().sqrt();
        x.fill(0.0);
        if norm_b == 0.0
        {
            return Ok(());
        }
        let target = SOLVE_TOL * norm_b;
        let mv = |input: &[f64], output: &mut [f64]|
        {
            if transposed { self.matvec_transposed(input, output) } else { self.matvec(input, output) }
        };
        let precondition = |input: &[f64], output: &mut [f64]|
        {
            if transposed { self.apply_ilu_transposed(input, output) } else { self.apply_ilu(input, output) }
        };

        let mut r = b.to_vec();
        let r_hat = r.clone();
        let mut rho = 1.0;
        let mut alpha = 1.0;
        let mut omega = 1.0;
        let mut v = vec![0.0; n];
        let mut p = vec![0.0; n];
        let mut p_hat = vec![0.0; n];
        let mut s = vec![0.0; n];
        let mut s_hat = vec![0.0; n];
        let mut t = vec![0.0; n];

        let max_iterations = (2 * n).max(1000);
        for _ in 0..max_iterations
        {
            let rho_next: f64 = r_hat.iter().zip(&r).map(|(a, b)| a * b).sum();
            if rho_next.abs() < f64::MIN_POSITIVE
            {
                break; // breakdown: residual check below decides
            }
            let beta = (rho_next / rho) * (alpha / omega);
            rho = rho_next;
            for i in 0..n
            {
                p[i] = r[i] + beta * (p[i] - omega * v[i]);
            }
            precondition(&p, &mut p_hat);
            mv(&p_hat, &mut v);
            let denom: f64 = r_hat.iter().zip(&v).map(|(a, b)| a * b).sum();
            if denom.abs() < f64::MIN_POSITIVE
            {
                break;
            }
            alpha = rho / denom;
            for i in 0..n
            {
                s[i] = r[i] - alpha * v[i];
            }
            let norm_s = s.iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm_s <= target
            {
                for i in 0..n
                {
                    x[i] += alpha * p_hat[i];
                }
                return Ok(());
            }
            precondition(&s, &mut s_hat);
            mv(&s_hat, &mut t);
            let tt: f64 = t.iter().map(|v| v * v).sum();
            if tt < f64::MIN_POSITIVE
            {
                break;
            }
            omega = t.iter().zip(&s).map(|(a, b)| a * b).sum::<f64>() / tt;
            for i in 0..n
            {
                x[i] += alpha * p_hat[i] + omega * s_hat[i];
                r[i] = s[i] - omega * t[i];
            }
            let norm_r = r.iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm_r <= target
            {
                return Ok(());
            }
            if omega.abs() < f64::MIN_POSITIVE
            {
                break;
            }
        }
        // final residual check: accept nearly-converged answers
        let mut check = vec![0.0; n];
        mv(x, &mut check);
        let residual = check.iter().zip(b).map(|(a, b)| (a - b) * (a - b)).sum::<f64>().sqrt();
        if residual <= 1e3 * target
        {
            Ok(())
        }
        else
        {
            Err(SGError::SparseSolveFailed)
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn tridiagonal(n: usize) -> SparseMatrix
    {
        let mut rows = Vec::new();
        for i in 0..n
        {
            let mut cols = Vec::new();
            let mut vals = Vec::new();
            if i > 0
            {
                cols.push(i - 1);
                vals.push(-1.0);
            }
            cols.push(i);
            vals.push(2.5);
            if i + 1 < n
            {
                cols.push(i + 1);
                vals.push(-1.2);
            }
            rows.push((cols, vals));
        }
        SparseMatrix::from_rows(n, rows).unwrap()
    }

    #[test]
    fn solves_tridiagonal_system()
    {
        let n = 50;
        let matrix = tridiagonal(n);
        let expected: Vec<f64> = (0..n).map(|i| (i as f64 * 0.37).sin()).collect();
        let mut b = vec![0.0; n];
        matrix.matvec(&expected, &mut b);
        let mut x = vec![0.0; n];
        matrix.solve(&b, &mut x, false).unwrap();
        for (computed, exact) in x.iter().zip(&expected)
        {
            assert!((computed - exact).abs() < 1e-10);
        }
    }

    #[test]
    fn transposed_solve_uses_the_transpose()
    {
        let n = 30;
        let matrix = tridiagonal(n); // asymmetric: -1.0 below, -1.2 above
        let expected: Vec<f64> = (0..n).map(|i| 1.0 + (i % 7) as f64).collect();
        let mut b = vec![0.0; n];
        matrix.matvec_transposed(&expected, &mut b);
        let mut x = vec![0.0; n];
        matrix.solve(&b, &mut x, true).unwrap();
        for (computed, exact) in x.iter().zip(&expected)
        {
            assert!((computed - exact).abs() < 1e-10);
        }
    }

    #[test]
    fn singleton_and_zero_rhs()
    {
        let matrix = SparseMatrix::from_rows(1, vec![(vec![0], vec![0.75])]).unwrap();
        let mut x = vec![0.0];
        matrix.solve(&[1.5], &mut x, false).unwrap();
        assert!((x[0] - 2.0).abs() < 1e-14);
        matrix.solve(&[0.0], &mut x, true).unwrap();
        assert_eq!(x[0], 0.0);
    }
}
