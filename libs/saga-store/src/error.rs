use thiserror::Error;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("order not found")]
    OrderNotFound,

    #[error("invalid {column} value in row: {value}")]
    InvalidColumn { column: &'static str, value: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub(crate) fn invalid_column(column: &'static str, value: impl Into<String>) -> Self {
        StoreError::InvalidColumn {
            column,
            value: value.into(),
        }
    }
}
