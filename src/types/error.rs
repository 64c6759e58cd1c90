use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum MigrationError {
    #[error("failed to list objects in bucket {bucket}: {message}")]
    ListFailed { bucket: String, message: String },
    #[error("bucket not found: {bucket}")]
    BucketNotFound { bucket: String },
    #[error("bucket unreachable: {bucket}: {message}")]
    BucketUnreachable { bucket: String, message: String },
    #[error("failed to transfer {key}: {message}")]
    TransferFailed { key: String, message: String },
    #[error("failed to compare {key}: {message}")]
    ComparisonFailed { key: String, message: String },
    #[error("cancelled")]
    Cancelled,
}

/// The object body did not match the size announced by the listing.
#[derive(Error, Debug, PartialEq)]
pub enum StreamError {
    #[error("stream ended after {actual} of {expected} bytes")]
    ShortRead { expected: u64, actual: u64 },
    #[error("stream is longer than the expected {expected} bytes")]
    LongRead { expected: u64 },
}

pub fn is_cancelled_error(e: &anyhow::Error) -> bool {
    if let Some(err) = e.downcast_ref::<MigrationError>() {
        return *err == MigrationError::Cancelled;
    }

    false
}
