use thiserror::Error;

/// Failures raised by the numeric core.
///
/// Solver indices follow the LAPACK `info` convention: they are 1-based so
/// callers can report them verbatim.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToneError {
    #[error("degenerate basis: {0}")]
    DegenerateBasis(String),

    #[error("singular matrix: diagonal element {index} of the triangular factor is zero")]
    SingularMatrix { index: usize },

    #[error("illegal value for solver parameter {index}")]
    IllegalParameter { index: usize },

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("render superseded by a newer edit")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ToneError>;
