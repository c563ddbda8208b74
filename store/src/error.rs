use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite connection error: {0}")]
    ConnectionError(String),

    #[error("SQLite migration error: {0}")]
    MigrationError(String),

    #[error("SQLite query error: {0}")]
    QueryError(String),

    #[error("SQLite write error: {0}")]
    WriteError(String),

    #[error("Data conversion error: {0}")]
    ConversionError(String),
}

impl From<StoreError> for common::Error {
    fn from(err: StoreError) -> Self {
        common::Error::DbError(err.to_string())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::QueryError(err.to_string())
    }
}
