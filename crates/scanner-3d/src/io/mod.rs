use std::path::Path;

use crate::pointset::PointSet;

/// 4x4 matrix text files.
pub mod matrix;

/// Wavefront OBJ vertex reader.
pub mod obj;

/// PCD reader and writer.
pub mod pcd;

/// PLY reader and writer.
pub mod ply;

/// Error types for the I/O module.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum IoError {
    /// Failed to read or write the file.
    #[error("Failed to access file")]
    Io(#[from] std::io::Error),

    /// The file header is missing or malformed.
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    /// A property type or storage format is not supported.
    #[error("Unsupported property: {0}")]
    UnsupportedProperty(String),

    /// The vertex element lacks one of the x, y, z coordinates.
    #[error("Missing vertex coordinate `{0}`")]
    MissingCoordinate(&'static str),

    /// A numeric value could not be parsed.
    #[error("Failed to parse value `{0}`")]
    ParseValue(String),

    /// The file extension does not map to a known reader.
    #[error("Unsupported file extension. Got: {0}")]
    UnsupportedExtension(String),
}

/// Read a point set, choosing the reader from the file extension (`ply`, `pcd` or `obj`).
pub fn read_point_set(path: impl AsRef<Path>) -> Result<PointSet, IoError> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "ply" => ply::read_ply(path),
        "pcd" => pcd::read_pcd(path),
        "obj" => obj::read_obj(path),
        _ => Err(IoError::UnsupportedExtension(ext)),
    }
}
