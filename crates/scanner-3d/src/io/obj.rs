use std::io::BufRead;
use std::path::Path;

use super::IoError;
use crate::pointset::PointSet;

/// Read the vertex positions (`v x y z` lines) of a Wavefront OBJ file.
///
/// Faces, normals, texture coordinates and materials are ignored. An optional fourth
/// homogeneous `w` component is accepted and dropped.
pub fn read_obj(path: impl AsRef<Path>) -> Result<PointSet, IoError> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);

    let mut points = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let mut tokens = line.split_whitespace();
        if tokens.next() != Some("v") {
            continue;
        }

        let mut point = [0.0f32; 3];
        for coord in point.iter_mut() {
            let token = tokens
                .next()
                .ok_or_else(|| IoError::ParseValue(line.clone()))?;
            *coord = token
                .parse()
                .map_err(|_| IoError::ParseValue(token.to_string()))?;
        }
        points.push(point);
    }

    Ok(PointSet::new(points))
}
