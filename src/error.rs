use crate::xorshift::Xorshift;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecoveryError {
    /// The observations do not pin down all 128 state bits.
    #[error("equation system is singular: no pivot for state bit {column} (rank {rank})")]
    MatrixSingular { column: usize, rank: usize },
    #[error("candidate state {candidate} does not reproduce the observations")]
    RecoveryValidation { candidate: Xorshift },
    #[error("reidentification failed: {0}")]
    Reidentification(String),
    #[error("invalid observation input: {0}")]
    InputContract(String),
    #[error("config error: {0}")]
    Config(String),
}

impl From<&'static str> for RecoveryError {
    fn from(s: &'static str) -> Self {
        RecoveryError::InputContract(s.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RecoveryError>;
