//! Build session.
//!
//! Owns the state of one build process: the fixed unit set, the driver (and
//! through it the dependency graph) and the invalidation cache. The session
//! runs a single event loop that feeds change notifications into the
//! coalescer and processes flushes one at a time, so the graph is never read
//! while a batch is still updating it.

use std::collections::BTreeMap;
use std::sync::Arc;

use metrics::{counter, histogram};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, instrument};

use crate::domain::entities::ContentUnit;
use crate::domain::types::UnitId;

use super::coalescer::{ChangeCoalescer, FlushBatch};
use super::config::BuildConfig;
use super::driver::BuildDriver;
use super::invalidation::InvalidationCache;
use super::notifier::ChangeReceiver;
use super::report::BuildReport;

const METRIC_FLUSH_TOTAL: &str = "folio_flush_total";
const METRIC_FLUSH_KEYS: &str = "folio_flush_keys";

/// What a flush did.
#[derive(Debug)]
pub enum FlushOutcome {
    /// Keys were invalidated but no unit depends on them.
    NoAffectedUnits { invalidated: usize },
    /// Keys were invalidated and the dependent units rebuilt.
    Rebuilt {
        invalidated: usize,
        report: BuildReport,
    },
}

impl FlushOutcome {
    pub fn report(&self) -> Option<&BuildReport> {
        match self {
            FlushOutcome::NoAffectedUnits { .. } => None,
            FlushOutcome::Rebuilt { report, .. } => Some(report),
        }
    }
}

/// Totals over the lifetime of an event loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub flushes: u64,
    pub rebuilt_units: usize,
    pub failed_units: usize,
}

pub struct BuildSession {
    config: BuildConfig,
    units: BTreeMap<UnitId, Arc<ContentUnit>>,
    driver: BuildDriver,
    invalidation: Arc<dyn InvalidationCache>,
}

impl BuildSession {
    pub fn new(
        config: BuildConfig,
        units: impl IntoIterator<Item = Arc<ContentUnit>>,
        driver: BuildDriver,
        invalidation: Arc<dyn InvalidationCache>,
    ) -> Self {
        let units = units.into_iter().map(|unit| (unit.id, unit)).collect();
        Self {
            config,
            units,
            driver,
            invalidation,
        }
    }

    pub fn driver(&self) -> &BuildDriver {
        &self.driver
    }

    pub fn units(&self) -> impl Iterator<Item = &Arc<ContentUnit>> {
        self.units.values()
    }

    pub fn unit(&self, id: UnitId) -> Option<&Arc<ContentUnit>> {
        self.units.get(&id)
    }

    /// Render the whole corpus and run the aggregate hooks.
    pub async fn full_build(&self) -> BuildReport {
        let units: Vec<Arc<ContentUnit>> = self.units.values().cloned().collect();
        self.driver.build_all(&units).await
    }

    /// Process one coalesced batch of changed keys.
    ///
    /// Every key is invalidated before the affected units are resolved, and
    /// resolution happens before any render, so a rebuild can never observe
    /// a cached derivation of the key that triggered it.
    #[instrument(skip_all, fields(flush_id = %batch.id, key_count = batch.keys.len()))]
    pub async fn apply_flush(&self, batch: &FlushBatch) -> FlushOutcome {
        counter!(METRIC_FLUSH_TOTAL).increment(1);
        histogram!(METRIC_FLUSH_KEYS).record(batch.keys.len() as f64);

        for key in &batch.keys {
            self.invalidation.invalidate(key);
        }
        let invalidated = batch.keys.len();

        let affected = self.driver.graph().affected_by(&batch.keys);
        if affected.is_empty() {
            debug!(invalidated, "No units depend on the changed keys");
            return FlushOutcome::NoAffectedUnits { invalidated };
        }

        let units: Vec<Arc<ContentUnit>> = affected
            .iter()
            .filter_map(|id| self.units.get(id).cloned())
            .collect();
        info!(
            invalidated,
            affected = units.len(),
            "Rebuilding units affected by change"
        );

        let report = self.driver.build_set(&units).await;
        FlushOutcome::Rebuilt {
            invalidated,
            report,
        }
    }

    /// Run the event loop until every notifier is dropped.
    pub async fn run(&self, changes: ChangeReceiver) -> SessionSummary {
        self.run_with(changes, |_, _| {}).await
    }

    /// Run the event loop, reporting each flush to `on_flush`.
    ///
    /// Pending keys left when the channel closes are flushed immediately
    /// rather than dropped.
    pub async fn run_with<F>(&self, mut changes: ChangeReceiver, mut on_flush: F) -> SessionSummary
    where
        F: FnMut(&FlushBatch, &FlushOutcome),
    {
        let mut coalescer = ChangeCoalescer::new(self.config.debounce_window());
        let mut summary = SessionSummary::default();

        info!(
            debounce_ms = coalescer.window().as_millis() as u64,
            units = self.units.len(),
            "Waiting for changes"
        );

        loop {
            let deadline = coalescer.deadline();
            tokio::select! {
                biased;
                received = changes.recv() => match received {
                    Some(notification) => coalescer.notify(notification.key),
                    None => {
                        if let Some(batch) = coalescer.fire() {
                            let outcome = self.apply_flush(&batch).await;
                            summary.absorb(&outcome);
                            on_flush(&batch, &outcome);
                        }
                        break;
                    }
                },
                () = wait_for(deadline) => {
                    if let Some(batch) = coalescer.fire() {
                        let outcome = self.apply_flush(&batch).await;
                        summary.absorb(&outcome);
                        on_flush(&batch, &outcome);
                    }
                }
            }
        }

        info!(
            flushes = summary.flushes,
            rebuilt_units = summary.rebuilt_units,
            failed_units = summary.failed_units,
            "Change stream closed"
        );
        summary
    }
}

impl SessionSummary {
    fn absorb(&mut self, outcome: &FlushOutcome) {
        self.flushes += 1;
        if let Some(report) = outcome.report() {
            self.rebuilt_units += report.built.len();
            self.failed_units += report.failures.len();
        }
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
