use std::fmt;

use num_rational::Ratio;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("duration {0} cannot be written as a single note value")]
    Unassignable(Ratio<i64>),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("failed to format notation")]
    Format(#[from] fmt::Error),
}

impl DomainError {
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation(message.into())
    }
}
