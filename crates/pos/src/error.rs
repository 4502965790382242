//! Service-level error type.

use domain::{DomainError, ErrorKind};
use projections::ProjectionError;
use settlement::SettlementError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::seed::SeedError;

#[derive(Debug, Error)]
pub enum PosError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Seed(#[from] SeedError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Settlement(#[from] SettlementError),

    #[error("Projection error: {0}")]
    Projection(#[from] ProjectionError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Telemetry error: {0}")]
    Telemetry(String),
}

impl PosError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PosError::Config(_) => ErrorKind::Validation,
            PosError::Seed(e) => e.kind(),
            PosError::Domain(e) => e.kind(),
            PosError::Settlement(e) => e.kind(),
            PosError::Projection(_)
            | PosError::Database(_)
            | PosError::Migration(_)
            | PosError::Telemetry(_) => ErrorKind::Internal,
        }
    }

    /// Process exit status for a failed start-up.
    pub fn exit_code(&self) -> u8 {
        match self.kind() {
            ErrorKind::Validation => 2,
            ErrorKind::NotFound | ErrorKind::InvalidState | ErrorKind::Conflict => 3,
            ErrorKind::Internal => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, PosError>;
