use crate::storage::Phase;
use crate::ResourceId;

/// Errors returned by the rating store, the posting lists and the storage session.
#[derive(thiserror::Error, Debug)]
pub enum RecError {
    /// Lookup of a resource string or id that was never interned or never rated.
    #[error("resource is not indexed: {0}")]
    NotIndexed(String),
    #[error("user {0} has no ratings")]
    EmptyRatingSet(ResourceId),
    /// Z-score normalisation of a rating set without spread.
    #[error("ratings of user {0} have a standard deviation of zero")]
    DivideByZero(ResourceId),
    #[error("malformed rating observation at record {record}: {reason}")]
    MalformedInput { record: usize, reason: String },
    #[error("resource capacity exceeded after {0} resources")]
    CapacityExceeded(usize),
    #[error("{operation} is not allowed while the storage is {phase}")]
    PhaseViolation {
        operation: &'static str,
        phase: Phase,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, RecError>;
