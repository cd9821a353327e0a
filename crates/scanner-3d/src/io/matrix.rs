use std::io::Write;
use std::path::Path;

use super::IoError;
use crate::transforms::RigidTransform;

/// Write a transform as four lines of four space separated values (Polyworks layout).
pub fn write_matrix(path: impl AsRef<Path>, transform: &RigidTransform) -> Result<(), IoError> {
    let mut file = std::fs::File::create(path)?;
    for row in &transform.matrix {
        writeln!(
            file,
            "{:.8} {:.8} {:.8} {:.8}",
            row[0], row[1], row[2], row[3]
        )?;
    }
    Ok(())
}

/// Read a transform written by [`write_matrix`]; any whitespace layout of 16 values is accepted.
pub fn read_matrix(path: impl AsRef<Path>) -> Result<RigidTransform, IoError> {
    let content = std::fs::read_to_string(path)?;
    let values = content
        .split_whitespace()
        .map(|t| t.parse::<f32>().map_err(|_| IoError::ParseValue(t.to_string())))
        .collect::<Result<Vec<_>, _>>()?;

    let data: [f32; 16] = values.as_slice().try_into().map_err(|_| {
        IoError::MalformedHeader(format!("expected 16 matrix values, got {}", values.len()))
    })?;

    Ok(RigidTransform::from_row_major(&data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::axis_angle_to_rotation_matrix;
    use tempfile::NamedTempFile;

    #[test]
    fn test_write_read_matrix() -> Result<(), Box<dyn std::error::Error>> {
        let file = NamedTempFile::new()?;
        let t = RigidTransform::new(
            axis_angle_to_rotation_matrix(&[0.0, 1.0, 0.0], 0.3)?,
            [1.25, -0.5, 10.0],
        );
        write_matrix(file.path(), &t)?;

        let content = std::fs::read_to_string(file.path())?;
        assert_eq!(content.lines().count(), 4);
        assert_eq!(content.lines().last(), Some("0.00000000 0.00000000 0.00000000 1.00000000"));

        assert!(read_matrix(file.path())?.approx_eq(&t, 1e-6));
        Ok(())
    }

    #[test]
    fn test_read_matrix_wrong_count() -> Result<(), Box<dyn std::error::Error>> {
        let file = NamedTempFile::new()?;
        std::fs::write(file.path(), "1 0 0\n0 1 0\n")?;
        assert!(matches!(
            read_matrix(file.path()),
            Err(IoError::MalformedHeader(_))
        ));
        Ok(())
    }
}
