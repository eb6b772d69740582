use thiserror::Error;

use crate::application::catalog::CatalogError;
use crate::config::LoadError;
use crate::domain::error::DomainError;
use crate::infra::error::InfraError;

/// Top-level failure of a CLI command.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("build finished with {failed_units} failed unit(s) and {failed_hooks} failed hook(s)")]
    BuildFailed {
        failed_units: usize,
        failed_hooks: usize,
    },
}

impl AppError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) => 2,
            AppError::BuildFailed { .. } => 1,
            AppError::Catalog(_) | AppError::Domain(_) | AppError::Infra(_) => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_distinguish_failure_kinds() {
        let build = AppError::BuildFailed {
            failed_units: 1,
            failed_hooks: 0,
        };
        assert_eq!(build.exit_code(), 1);
        assert_eq!(
            build.to_string(),
            "build finished with 1 failed unit(s) and 0 failed hook(s)"
        );

        let infra = AppError::from(InfraError::telemetry("subscriber already set"));
        assert_eq!(infra.exit_code(), 3);
    }
}
