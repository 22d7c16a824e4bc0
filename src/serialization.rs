//! Whole-grid snapshots through serde: JSON for a human-readable dump,
//! bincode for a compact one, both with optional LZ4 compression. The
//! fixed-schema stream format lives in [`crate::io`]; snapshots are the fast
//! path for same-version save/restore.

use serde::{de::DeserializeOwned, Serialize};

use crate::errors::SGError;
use crate::grids::global::GlobalGrid;
use crate::grids::wavelet::WaveletGrid;

/// Serialization format options for grid snapshots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SerializationFormat {
    /// JSON format - human readable, larger size, widest compatibility
    Json,
    /// JSON format with LZ4 compression
    JsonLz4,
    /// bincode format - compact binary, good performance
    Bincode,
    /// bincode format with LZ4 compression (default, best balance of size and speed)
    #[default]
    BincodeLz4,
}

impl SerializationFormat {
    /// Returns true if this format uses LZ4 compression
    pub fn is_compressed(&self) -> bool {
        matches!(self, SerializationFormat::JsonLz4 | SerializationFormat::BincodeLz4)
    }
}

/// Serialize data to bytes using the specified format.
/// Applies LZ4 compression if the format variant ends with Lz4.
pub fn serialize<T: Serialize>(data: &T, format: SerializationFormat) -> Result<Vec<u8>, SGError> {
    let bytes = match format {
        SerializationFormat::Json | SerializationFormat::JsonLz4 => {
            serde_json::to_vec(data).map_err(|_| SGError::SerializationFailed)?
        }
        SerializationFormat::Bincode | SerializationFormat::BincodeLz4 => {
            bincode::serialize(data).map_err(|_| SGError::SerializationFailed)?
        }
    };
    if format.is_compressed() {
        Ok(lz4_flex::compress_prepend_size(&bytes))
    } else {
        Ok(bytes)
    }
}

/// Deserialize data from bytes using the specified format.
/// Applies LZ4 decompression if the format variant ends with Lz4.
pub fn deserialize<T: DeserializeOwned>(data: &[u8], format: SerializationFormat) -> Result<T, SGError> {
    let decompressed;
    let bytes = if format.is_compressed() {
        decompressed = lz4_flex::decompress_size_prepended(data)
            .map_err(|_| SGError::LZ4DecompressionFailed)?;
        decompressed.as_slice()
    } else {
        data
    };
    match format {
        SerializationFormat::Json | SerializationFormat::JsonLz4 => {
            serde_json::from_slice(bytes).map_err(|_| SGError::DeserializationFailed)
        }
        SerializationFormat::Bincode | SerializationFormat::BincodeLz4 => {
            bincode::deserialize(bytes).map_err(|_| SGError::DeserializationFailed)
        }
    }
}

/// Restore a [`GlobalGrid`] snapshot, regenerating the runtime state
/// (tensor references) the snapshot does not carry.
pub fn read_global_snapshot(data: &[u8], format: SerializationFormat) -> Result<GlobalGrid, SGError> {
    let mut grid: GlobalGrid = deserialize(data, format)?;
    grid.recompute_tensor_refs();
    Ok(grid)
}

/// Restore a [`WaveletGrid`] snapshot, rebuilding the collocation matrix.
pub fn read_wavelet_snapshot(data: &[u8], format: SerializationFormat) -> Result<WaveletGrid, SGError> {
    let mut grid: WaveletGrid = deserialize(data, format)?;
    grid.build_interpolation_matrix()?;
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grids::global::GlobalGridOptions;
    use crate::rules::SparseGridRule;
    use crate::tensor_selection::TensorSelection;

    fn sample_grid() -> GlobalGrid {
        let mut grid = GlobalGrid::make(2, GlobalGridOptions {
            num_outputs: 1,
            depth: 3,
            selection: TensorSelection::Level,
            rule: SparseGridRule::ClenshawCurtis,
            ..Default::default()
        }).unwrap();
        let x = grid.needed_points();
        let values: Vec<f64> = x.chunks_exact(2).map(|p| p[0] - p[1] * p[1]).collect();
        grid.load_needed_points(&values).unwrap();
        grid
    }

    #[test]
    fn test_global_snapshot_round_trip() {
        let grid = sample_grid();
        for format in [SerializationFormat::Json, SerializationFormat::JsonLz4,
            SerializationFormat::Bincode, SerializationFormat::BincodeLz4] {
            let bytes = serialize(&grid, format).unwrap();
            let restored = read_global_snapshot(&bytes, format).unwrap();
            assert_eq!(grid.points(), restored.points());
            assert_eq!(grid.evaluate(&[0.2, -0.6]).unwrap(), restored.evaluate(&[0.2, -0.6]).unwrap());
        }
    }

    #[test]
    fn test_wavelet_snapshot_round_trip() {
        let mut grid = WaveletGrid::make(2, 1, 2, 1, &[]).unwrap();
        let x = grid.needed_points();
        let values: Vec<f64> = x.chunks_exact(2).map(|p| p[0] * p[1]).collect();
        grid.load_needed_points(&values).unwrap();

        let bytes = serialize(&grid, SerializationFormat::BincodeLz4).unwrap();
        let restored = read_wavelet_snapshot(&bytes, SerializationFormat::BincodeLz4).unwrap();
        assert_eq!(grid.points(), restored.points());
        // the rebuilt collocation matrix supports the weight solves
        let a = grid.interpolation_weights(&[0.1, 0.2]).unwrap();
        let b = restored.interpolation_weights(&[0.1, 0.2]).unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-12);
        }
    }

    #[test]
    fn test_compressed_is_smaller_on_large_grids() {
        let grid = sample_grid();
        let plain = serialize(&grid, SerializationFormat::Json).unwrap();
        let packed = serialize(&grid, SerializationFormat::JsonLz4).unwrap();
        assert!(packed.len() < plain.len());
    }
}
