#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Backend Error: {0}")]
    Backend(String),

    #[error("Capacity Error: {0} ({1}) should be no more than {2}")]
    CapacityOverflow(String, u64, u64),

    #[error("Configuration Error: {0} is unsupported")]
    Configuration(String),

    #[error("Data Error: {0}")]
    Data(String),

    #[error("Numerical Error: {0} is not finite at point {1} (tile: {2:?})")]
    NumericalFault(String, u32, Option<u32>),

    #[error("Validation Error: {0} should be {1}")]
    Validation(String, String),
}

impl From<burn::tensor::DataError> for Error {
    #[inline]
    fn from(error: burn::tensor::DataError) -> Self {
        Self::Data(format!("{error:?}"))
    }
}
