use scanner_3d::{linalg::LinalgError, pointset::PointSetError};

/// Error types for the registration engine.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RegistrationError {
    /// A point set is too small for the requested operation.
    #[error("Point set `{name}` needs at least {required} points, got {actual}")]
    InvalidInput {
        /// Which input failed the check.
        name: &'static str,
        /// Minimum number of points.
        required: usize,
        /// Number of points received.
        actual: usize,
    },

    /// A flat buffer does not hold whole points.
    #[error(transparent)]
    MalformedBuffer(#[from] PointSetError),

    /// The correspondences do not determine a unique rotation.
    #[error("Degenerate configuration")]
    DegenerateConfiguration(#[from] LinalgError),

    /// No candidate alignment reached the minimum fitness.
    #[error("No convergent alignment: best fitness {best} below {threshold}")]
    NoConvergentAlignment {
        /// Best fitness found.
        best: f32,
        /// Required fitness.
        threshold: f32,
    },

    /// The caller cancelled the operation.
    #[error("Registration cancelled")]
    Cancelled,
}

/// Status codes returned by the flat interface.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStatus {
    /// The alignment succeeded.
    Success = 0,
    /// Empty, too small or malformed inputs.
    InvalidInput = 1,
    /// Rank deficient correspondences.
    DegenerateConfiguration = 2,
    /// Global registration found no alignment above the minimum fitness.
    NoConvergentAlignment = 3,
    /// ICP stopped at the iteration limit; the outputs hold the last estimate.
    MaxIterationsReached = 4,
    /// The operation was cancelled.
    Cancelled = 5,
}

impl RegistrationError {
    /// The status code reported for this error through the flat interface.
    pub fn status(&self) -> RegistrationStatus {
        match self {
            RegistrationError::InvalidInput { .. } | RegistrationError::MalformedBuffer(_) => {
                RegistrationStatus::InvalidInput
            }
            RegistrationError::DegenerateConfiguration(_) => {
                RegistrationStatus::DegenerateConfiguration
            }
            RegistrationError::NoConvergentAlignment { .. } => {
                RegistrationStatus::NoConvergentAlignment
            }
            RegistrationError::Cancelled => RegistrationStatus::Cancelled,
        }
    }
}

impl From<RegistrationStatus> for i32 {
    fn from(status: RegistrationStatus) -> Self {
        status as i32
    }
}
