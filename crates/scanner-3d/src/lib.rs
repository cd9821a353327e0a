#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// I/O utilities for reading and writing point sets and transforms.
pub mod io;

/// Linear algebra utilities.
pub mod linalg;

/// Operations on 3D points.
pub mod ops;

/// Point set container.
pub mod pointset;

/// Signed distance field contract and surface sampling.
pub mod sdf;

/// Rigid transforms.
pub mod transforms;
