//! Build driver.
//!
//! Renders batches of units, records what each render depended on, and runs
//! the corpus-wide hooks after a full build.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use futures::{StreamExt, stream};
use metrics::{counter, histogram};
use tracing::{debug, error, info, instrument, warn};

use crate::domain::entities::ContentUnit;
use crate::domain::types::UnitId;

use super::adapter::{
    AggregateHook, OutputSet, OutputSink, PublishOutcome, RenderOutput, RenderedUnit, Renderer,
};
use super::config::BuildConfig;
use super::graph::DependencyGraph;
use super::lock::{rw_read, rw_write};
use super::report::{AggregateOutcome, BuildMode, BuildReport, BuiltUnit, UnitError, UnitFailure};

const SOURCE: &str = "build::driver";
const METRIC_BUILD_MS: &str = "folio_build_ms";
const METRIC_RENDER_FAILURE_TOTAL: &str = "folio_render_failure_total";

/// Renders units and keeps the dependency graph in step with them.
///
/// A failing unit never aborts its batch: its previous dependency record and
/// output are left untouched and the remaining units still render.
pub struct BuildDriver {
    config: BuildConfig,
    renderer: Arc<dyn Renderer>,
    sink: Arc<dyn OutputSink>,
    hooks: Vec<Arc<dyn AggregateHook>>,
    graph: Arc<DependencyGraph>,
    outputs: RwLock<OutputSet>,
}

impl BuildDriver {
    pub fn new(
        config: BuildConfig,
        renderer: Arc<dyn Renderer>,
        sink: Arc<dyn OutputSink>,
        graph: Arc<DependencyGraph>,
    ) -> Self {
        Self {
            config,
            renderer,
            sink,
            hooks: Vec::new(),
            graph,
            outputs: RwLock::new(OutputSet::new()),
        }
    }

    /// Register a hook to run after every full build.
    pub fn with_hook(mut self, hook: Arc<dyn AggregateHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Render every unit, then run the aggregate hooks once.
    ///
    /// Hooks run only when every unit succeeded, since they are defined over
    /// the whole corpus.
    #[instrument(skip_all, fields(unit_count = units.len()))]
    pub async fn build_all(&self, units: &[Arc<ContentUnit>]) -> BuildReport {
        let started_at = Instant::now();
        let mut report = self.render_batch(BuildMode::Full, units).await;

        report.aggregate = if report.failures.is_empty() {
            self.run_hooks().await
        } else {
            warn!(
                failed_units = report.failures.len(),
                "Skipping aggregate hooks: full build had failures"
            );
            AggregateOutcome::Skipped {
                failed_units: report.failures.len(),
            }
        };

        self.finish(report, started_at)
    }

    /// Render exactly `units` (deduplicated), without aggregate hooks.
    #[instrument(skip_all, fields(unit_count = units.len()))]
    pub async fn build_set(&self, units: &[Arc<ContentUnit>]) -> BuildReport {
        let started_at = Instant::now();
        let report = self.render_batch(BuildMode::Partial, units).await;
        self.finish(report, started_at)
    }

    /// Last successful output of every unit built so far.
    pub fn outputs(&self) -> OutputSet {
        rw_read(&self.outputs, SOURCE, "outputs").clone()
    }

    pub fn output_of(&self, unit: UnitId) -> Option<RenderedUnit> {
        rw_read(&self.outputs, SOURCE, "output_of").get(&unit).cloned()
    }

    pub fn graph(&self) -> &Arc<DependencyGraph> {
        &self.graph
    }

    async fn render_batch(&self, mode: BuildMode, units: &[Arc<ContentUnit>]) -> BuildReport {
        let mut report = BuildReport::new(mode);

        let mut seen = HashSet::new();
        let batch: Vec<Arc<ContentUnit>> = units
            .iter()
            .filter(|unit| seen.insert(unit.id))
            .cloned()
            .collect();

        info!(
            mode = mode.as_str(),
            unit_count = batch.len(),
            "{}",
            match mode {
                BuildMode::Full => "Building site...",
                BuildMode::Partial => "Partial rebuild...",
            }
        );

        // `buffered` yields in input order, so records are applied in a
        // deterministic sequence even when renders overlap.
        let concurrency = self.config.render_concurrency_non_zero().get();
        let mut results = stream::iter(batch)
            .map(|unit| async move {
                let result = self.build_unit(&unit).await;
                (unit, result)
            })
            .buffered(concurrency);

        while let Some((unit, result)) = results.next().await {
            match result {
                Ok((output, publish)) => {
                    self.graph.record(unit.id, output.dependencies.clone());
                    rw_write(&self.outputs, SOURCE, "render_batch").insert(
                        unit.id,
                        RenderedUnit {
                            unit: Arc::clone(&unit),
                            output,
                        },
                    );
                    report.built.push(BuiltUnit {
                        unit: unit.id,
                        publish,
                    });
                }
                Err(error) => {
                    error!(
                        unit = %unit.id,
                        label = unit.label(),
                        error = %error,
                        "Failed to build unit"
                    );
                    counter!(METRIC_RENDER_FAILURE_TOTAL).increment(1);
                    report.failures.push(UnitFailure {
                        unit: unit.id,
                        label: unit.label().to_string(),
                        error,
                    });
                }
            }
        }

        report
    }

    async fn build_unit(
        &self,
        unit: &ContentUnit,
    ) -> Result<(RenderOutput, PublishOutcome), UnitError> {
        debug!(unit = %unit.id, label = unit.label(), "Building");
        let output = self.renderer.render(unit).await?;
        let publish = self.sink.publish(unit, &output).await?;
        Ok((output, publish))
    }

    async fn run_hooks(&self) -> AggregateOutcome {
        if self.hooks.is_empty() {
            return AggregateOutcome::Completed;
        }

        let outputs = self.outputs();
        let mut failures = Vec::new();
        for hook in &self.hooks {
            match hook.run(&outputs).await {
                Ok(()) => debug!(hook = hook.name(), "Aggregate hook completed"),
                Err(err) => {
                    error!(hook = hook.name(), error = %err, "Aggregate hook failed");
                    failures.push(err);
                }
            }
        }

        if failures.is_empty() {
            AggregateOutcome::Completed
        } else {
            AggregateOutcome::Failed(failures)
        }
    }

    fn finish(&self, mut report: BuildReport, started_at: Instant) -> BuildReport {
        report.elapsed = started_at.elapsed();
        histogram!(METRIC_BUILD_MS, "mode" => report.mode.as_str())
            .record(report.elapsed.as_secs_f64() * 1000.0);

        info!(
            mode = report.mode.as_str(),
            built = report.built.len(),
            written = report.written(),
            failed = report.failures.len(),
            "Build completed in {:.2}s",
            report.elapsed.as_secs_f64()
        );

        report
    }
}
