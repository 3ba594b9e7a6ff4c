//! Error types and result alias for the crate.
//!
//! Only configuration problems and out-of-range cell indices are errors. A
//! lookup by an unknown [`PersonId`](crate::PersonId) or a step requested
//! before any row width is known are absorbed as no-ops.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[non_exhaustive]
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("group size must be positive, got {0}")]
    InvalidGroupSize(usize),

    #[error("infection factor must lie in 1..={group_size}, got {factor}")]
    InvalidInfectionFactor { factor: usize, group_size: usize },

    #[error("tick period must be a positive number of seconds, got {0}")]
    InvalidTickPeriod(f64),

    #[error("items per row must be positive, got {0}")]
    InvalidItemsPerRow(usize),

    #[error("index {index} is outside a population of {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("failed to spawn scheduler thread: {0}")]
    SchedulerSpawn(String),
}

impl Error {
    /// True for the errors a caller can fix by changing its configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::InvalidGroupSize(_)
                | Error::InvalidInfectionFactor { .. }
                | Error::InvalidTickPeriod(_)
                | Error::InvalidItemsPerRow(_)
        )
    }
}
