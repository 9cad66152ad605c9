use crate::http::error::FetchError;
use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VariableError {
    #[error("Unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("Variable '{token}' matches {matches} catalog entries")]
    AmbiguousVariable { token: String, matches: usize },

    #[error("Variable catalog has no column '{0}'")]
    MissingColumn(String),

    #[error("Unexpected variable catalog payload: {0}")]
    Payload(String),

    #[error(transparent)]
    Polars(#[from] PolarsError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}
