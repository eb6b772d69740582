//! Build outcome reporting.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::domain::types::UnitId;

use super::adapter::{AggregateError, PublishOutcome, RenderError, SinkError};

/// Which kind of batch produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// Every unit, followed by aggregate hooks.
    Full,
    /// A caller-supplied subset; aggregate hooks never run.
    Partial,
}

impl BuildMode {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildMode::Full => "full",
            BuildMode::Partial => "partial",
        }
    }
}

#[derive(Debug, Error)]
pub enum UnitError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Publish(#[from] SinkError),
}

/// A unit whose build failed; its previous record and output were kept.
#[derive(Debug)]
pub struct UnitFailure {
    pub unit: UnitId,
    pub label: String,
    pub error: UnitError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltUnit {
    pub unit: UnitId,
    pub publish: PublishOutcome,
}

#[derive(Debug, Clone, Default)]
pub enum AggregateOutcome {
    /// Partial builds never run aggregate hooks.
    #[default]
    NotRun,
    /// A full build had unit failures, so the corpus-wide view was incomplete.
    Skipped { failed_units: usize },
    Completed,
    Failed(Vec<AggregateError>),
}

#[derive(Debug)]
pub struct BuildReport {
    pub mode: BuildMode,
    pub built: Vec<BuiltUnit>,
    pub failures: Vec<UnitFailure>,
    pub aggregate: AggregateOutcome,
    pub elapsed: Duration,
}

impl BuildReport {
    pub fn new(mode: BuildMode) -> Self {
        Self {
            mode,
            built: Vec::new(),
            failures: Vec::new(),
            aggregate: AggregateOutcome::NotRun,
            elapsed: Duration::ZERO,
        }
    }

    /// True when every unit built and no aggregate hook failed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !matches!(self.aggregate, AggregateOutcome::Failed(_))
    }

    pub fn built_ids(&self) -> Vec<UnitId> {
        self.built.iter().map(|built| built.unit).collect()
    }

    pub fn failed_ids(&self) -> Vec<UnitId> {
        self.failures.iter().map(|failure| failure.unit).collect()
    }

    pub fn written(&self) -> usize {
        self.built
            .iter()
            .filter(|built| built.publish == PublishOutcome::Written)
            .count()
    }
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} build: {} built ({} written), {} failed in {:.2}s",
            self.mode.as_str(),
            self.built.len(),
            self.written(),
            self.failures.len(),
            self.elapsed.as_secs_f64(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_report_is_success() {
        let report = BuildReport::new(BuildMode::Partial);
        assert!(report.is_success());
        assert!(matches!(report.aggregate, AggregateOutcome::NotRun));
    }

    #[test]
    fn aggregate_failure_is_not_success() {
        let mut report = BuildReport::new(BuildMode::Full);
        report.aggregate =
            AggregateOutcome::Failed(vec![AggregateError::new("feed", "missing CNAME")]);
        assert!(!report.is_success());
    }

    #[test]
    fn display_summarises_counts() {
        let mut report = BuildReport::new(BuildMode::Full);
        report.built.push(BuiltUnit {
            unit: UnitId::new(0),
            publish: PublishOutcome::Written,
        });
        report.built.push(BuiltUnit {
            unit: UnitId::new(1),
            publish: PublishOutcome::Unchanged,
        });
        report.elapsed = Duration::from_millis(1250);

        assert_eq!(
            report.to_string(),
            "full build: 2 built (1 written), 0 failed in 1.25s"
        );
    }
}
