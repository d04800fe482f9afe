use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CofactorError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("system matrix of dimension {dim} is not positive definite")]
    NotPositiveDefinite { dim: usize },

    #[error("linear solve produced a non-finite solution")]
    NonFiniteSolution,

    #[error("non-finite loss encountered: {0}")]
    NonFiniteLoss(f64),

    #[error("vector has {actual} components, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, CofactorError>;

/// Fails with `NonFiniteLoss` on NaN or infinity.
pub(crate) fn ensure_finite(loss: f64) -> Result<f64> {
    if loss.is_finite() {
        Ok(loss)
    } else {
        Err(CofactorError::NonFiniteLoss(loss))
    }
}
