use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("schema error: {0}")]
    Schema(String),
}

pub type Result<T> = std::result::Result<T, DataError>;

impl DataError {
    pub(crate) fn missing_field(name: &str) -> Self {
        DataError::Schema(format!("unknown field `{name}`"))
    }

    pub(crate) fn not_numeric(name: &str) -> Self {
        DataError::Schema(format!("field `{name}` is not numeric"))
    }
}
