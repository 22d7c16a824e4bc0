//! Sparse tensor-product (Smolyak) grids for interpolation and quadrature of
//! smooth functions in moderate to high dimension.
//!
//! Two engines do the heavy lifting:
//!
//! - [`GlobalGrid`]: the Smolyak combination of one dimensional rules
//!   (Clenshaw-Curtis, Gauss-Patterson, Leja, Gauss-Legendre or a custom
//!   tabulated family) over a downward-closed multi-index set, with
//!   anisotropic selection, surplus estimation, refinement and out-of-order
//!   construction.
//! - [`WaveletGrid`]: a nested wavelet basis (order 1 or 3) on dyadic nodes
//!   with an explicitly assembled sparse collocation matrix and
//!   direction-wise refinement.
//!
//! ```
//! use smolyak::{GlobalGrid, GlobalGridOptions, SparseGridRule, TensorSelection};
//!
//! let mut grid = GlobalGrid::make(2, GlobalGridOptions {
//!     num_outputs: 1,
//!     depth: 5,
//!     selection: TensorSelection::Level,
//!     rule: SparseGridRule::ClenshawCurtis,
//!     ..Default::default()
//! }).unwrap();
//! let nodes = grid.needed_points();
//! let values: Vec<f64> = nodes.chunks_exact(2).map(|p| (p[0] + p[1]).exp()).collect();
//! grid.load_needed_points(&values).unwrap();
//! let y = grid.evaluate(&[0.3, -0.4]).unwrap();
//! assert!((y[0] - (0.3_f64 - 0.4).exp()).abs() < 1e-5);
//! ```

pub mod custom_tabulated;
pub mod dynamic;
pub mod errors;
pub mod grids;
pub mod io;
pub mod lagrange;
pub mod multi_index_manipulation;
pub mod multi_index_set;
pub mod one_dimensional_wrapper;
pub mod rules;
pub mod serialization;
pub mod sparse;
pub mod surpluses;
pub mod tables;
pub mod tensor_selection;
pub mod values;
pub mod wavelet_rule;

pub use custom_tabulated::CustomTabulated;
pub use errors::SGError;
pub use grids::global::{GlobalGrid, GlobalGridOptions};
pub use grids::wavelet::{RefinementStrategy, WaveletGrid};
pub use multi_index_set::MultiIndexSet;
pub use rules::{SparseGridRule, NUM_TOL};
pub use tensor_selection::TensorSelection;
