use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use thiserror::Error;

/// Error codes DynamoDB uses when it rejects a request for capacity reasons.
const THROTTLING_CODES: &[&str] = &[
    "ProvisionedThroughputExceededException",
    "ThrottlingException",
    "RequestLimitExceeded",
];

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Conditional check failed: {0}")]
    ConditionFailed(String),

    #[error("Request throttled by store: {0}")]
    Throttled(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("DynamoDB error: {0}")]
    Dynamo(String),
}

impl StoreError {
    /// Throttling is the only failure worth retrying blindly; condition
    /// failures need the caller to re-read first.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Throttled(_))
    }

    pub fn is_condition_failed(&self) -> bool {
        matches!(self, StoreError::ConditionFailed(_))
    }

    /// Classifies an SDK failure into the store taxonomy.
    pub fn from_sdk<E, R>(context: &str, err: SdkError<E, R>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + 'static,
        R: std::fmt::Debug,
    {
        let code = err.code().map(str::to_string);
        match code.as_deref() {
            Some("ConditionalCheckFailedException") => {
                StoreError::ConditionFailed(context.to_string())
            }
            Some(c) if THROTTLING_CODES.contains(&c) => {
                StoreError::Throttled(format!("{}: {}", context, c))
            }
            _ => StoreError::Dynamo(format!("{}: {}", context, DisplayErrorContext(&err))),
        }
    }
}

impl From<serde_dynamo::Error> for StoreError {
    fn from(err: serde_dynamo::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_throttling_is_transient() {
        assert!(StoreError::Throttled("x".into()).is_transient());
        assert!(!StoreError::ConditionFailed("x".into()).is_transient());
        assert!(!StoreError::Dynamo("x".into()).is_transient());
        assert!(StoreError::ConditionFailed("x".into()).is_condition_failed());
    }
}
