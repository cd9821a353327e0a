use serde::{Deserialize, Serialize};

/// Error types for the point set container.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PointSetError {
    /// The flat buffer does not hold a whole number of xyz triplets.
    #[error("Flat point buffer of length {0} is not a multiple of 3")]
    MalformedBuffer(usize),
}

/// An ordered sequence of 3D points in single precision.
///
/// The flat memory layout is `x0 y0 z0 x1 y1 z1 ...`, i.e. 12 bytes per point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointSet {
    // The points in the set.
    points: Vec<[f32; 3]>,
}

impl PointSet {
    /// Create a new point set from a vector of points.
    pub fn new(points: Vec<[f32; 3]>) -> Self {
        Self { points }
    }

    /// Create a point set from a flat buffer of `3 * n` floats.
    ///
    /// Example:
    ///
    /// ```
    /// use scanner_3d::pointset::PointSet;
    ///
    /// let set = PointSet::from_flat(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
    /// assert_eq!(set.len(), 2);
    /// assert_eq!(set.points()[1], [3.0, 4.0, 5.0]);
    /// ```
    pub fn from_flat(data: &[f32]) -> Result<Self, PointSetError> {
        if data.len() % 3 != 0 {
            return Err(PointSetError::MalformedBuffer(data.len()));
        }
        let points = data
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect::<Vec<_>>();
        Ok(Self { points })
    }

    /// Copy the points into a flat buffer of `3 * n` floats.
    pub fn to_flat(&self) -> Vec<f32> {
        self.points.iter().flatten().copied().collect()
    }

    /// Get the number of points in the set.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point set is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the set.
    pub fn points(&self) -> &[[f32; 3]] {
        &self.points
    }

    /// Get as mutable reference the points in the set.
    pub fn points_mut(&mut self) -> &mut [[f32; 3]] {
        &mut self.points
    }

    /// Consume the set and return the underlying points.
    pub fn into_points(self) -> Vec<[f32; 3]> {
        self.points
    }

    /// Mean point of the set, accumulated in double precision.
    ///
    /// Returns `None` for an empty set.
    pub fn mean_point(&self) -> Option<[f32; 3]> {
        if self.points.is_empty() {
            return None;
        }
        let mut acc = [0.0f64; 3];
        for p in &self.points {
            acc[0] += p[0] as f64;
            acc[1] += p[1] as f64;
            acc[2] += p[2] as f64;
        }
        let n = self.points.len() as f64;
        Some([
            (acc[0] / n) as f32,
            (acc[1] / n) as f32,
            (acc[2] / n) as f32,
        ])
    }

    /// Get the minimum bound of the point set.
    pub fn min_bound(&self) -> Option<[f32; 3]> {
        let first = *self.points.first()?;
        Some(self.points.iter().fold(first, |a, b| {
            [a[0].min(b[0]), a[1].min(b[1]), a[2].min(b[2])]
        }))
    }

    /// Get the maximum bound of the point set.
    pub fn max_bound(&self) -> Option<[f32; 3]> {
        let first = *self.points.first()?;
        Some(self.points.iter().fold(first, |a, b| {
            [a[0].max(b[0]), a[1].max(b[1]), a[2].max(b[2])]
        }))
    }
}

impl From<Vec<[f32; 3]>> for PointSet {
    fn from(points: Vec<[f32; 3]>) -> Self {
        Self::new(points)
    }
}

impl FromIterator<[f32; 3]> for PointSet {
    fn from_iter<I: IntoIterator<Item = [f32; 3]>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
