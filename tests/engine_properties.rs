use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use folio::build::{
    AggregateError, AggregateHook, AggregateOutcome, BuildConfig, BuildDriver, BuildSession,
    DependencyGraph, DependencyKey, DiscardSink, FlushBatch, FlushOutcome, InvalidationCache,
    OutputSet, RenderError, RenderOutput, Renderer, change_channel,
};
use folio::domain::entities::ContentUnit;
use folio::domain::types::{UnitId, UnitKind};

const WINDOW: Duration = Duration::from_millis(50);

/// Renderer whose dependency sets and failures are set by the test.
#[derive(Default)]
struct ScriptedRenderer {
    deps: Mutex<HashMap<UnitId, Vec<&'static str>>>,
    failing: Mutex<HashSet<UnitId>>,
    calls: Mutex<Vec<UnitId>>,
}

impl ScriptedRenderer {
    fn depends(&self, unit: u32, keys: &[&'static str]) {
        self.deps
            .lock()
            .unwrap()
            .insert(UnitId::new(unit), keys.to_vec());
    }

    fn fail(&self, unit: u32) {
        self.failing.lock().unwrap().insert(UnitId::new(unit));
    }

    fn take_calls(&self) -> Vec<UnitId> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn render(&self, unit: &ContentUnit) -> Result<RenderOutput, RenderError> {
        self.calls.lock().unwrap().push(unit.id);
        if self.failing.lock().unwrap().contains(&unit.id) {
            return Err(RenderError::other(format!("{} is broken", unit.url)));
        }
        let keys = self
            .deps
            .lock()
            .unwrap()
            .get(&unit.id)
            .cloned()
            .unwrap_or_default();
        Ok(RenderOutput::new(
            format!("<p>{}</p>", unit.url),
            keys.into_iter().map(DependencyKey::new).collect(),
        ))
    }
}

#[derive(Default)]
struct RecordingCache {
    invalidated: Mutex<Vec<DependencyKey>>,
}

impl InvalidationCache for RecordingCache {
    fn invalidate(&self, key: &DependencyKey) {
        self.invalidated.lock().unwrap().push(key.clone());
    }
}

#[derive(Default)]
struct CountingHook {
    runs: AtomicUsize,
}

#[async_trait]
impl AggregateHook for CountingHook {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn run(&self, _outputs: &OutputSet) -> Result<(), AggregateError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Harness {
    renderer: Arc<ScriptedRenderer>,
    cache: Arc<RecordingCache>,
    hook: Arc<CountingHook>,
    session: Arc<BuildSession>,
}

impl Harness {
    fn new(unit_count: u32) -> Self {
        let renderer = Arc::new(ScriptedRenderer::default());
        let cache = Arc::new(RecordingCache::default());
        let hook = Arc::new(CountingHook::default());
        let config = BuildConfig {
            debounce_ms: WINDOW.as_millis() as u64,
            render_concurrency: 2,
        };
        let driver = BuildDriver::new(
            config.clone(),
            Arc::clone(&renderer) as _,
            Arc::new(DiscardSink),
            Arc::new(DependencyGraph::new()),
        )
        .with_hook(Arc::clone(&hook) as _);
        let session = Arc::new(BuildSession::new(
            config,
            (0..unit_count).map(unit),
            driver,
            Arc::clone(&cache) as _,
        ));
        Self {
            renderer,
            cache,
            hook,
            session,
        }
    }

    fn record(&self, unit: u32) -> Option<HashSet<DependencyKey>> {
        self.session
            .driver()
            .graph()
            .dependencies_of(UnitId::new(unit))
    }

    fn affected(&self, keys: &[&str]) -> BTreeSet<UnitId> {
        let keys: Vec<DependencyKey> = keys.iter().copied().map(DependencyKey::new).collect();
        self.session.driver().graph().affected_by(&keys)
    }
}

fn unit(raw: u32) -> Arc<ContentUnit> {
    Arc::new(ContentUnit {
        id: UnitId::new(raw),
        kind: UnitKind::Post,
        source: PathBuf::from(format!("content/posts/{raw}.md")),
        url: format!("posts/{raw}"),
        title: None,
        description: None,
        date: None,
    })
}

fn ids(raw: &[u32]) -> BTreeSet<UnitId> {
    raw.iter().copied().map(UnitId::new).collect()
}

fn batch(keys: &[&str]) -> FlushBatch {
    FlushBatch {
        id: uuid::Uuid::nil(),
        sequence: 0,
        keys: keys.iter().copied().map(DependencyKey::new).collect(),
        notifications: keys.len(),
    }
}

#[tokio::test]
async fn exact_tracking_replaces_records() {
    let harness = Harness::new(1);
    harness.renderer.depends(0, &["a", "b"]);
    harness.session.full_build().await;

    assert_eq!(harness.affected(&["a"]), ids(&[0]));
    assert_eq!(harness.affected(&["b"]), ids(&[0]));

    harness.renderer.depends(0, &["b", "c"]);
    harness.session.apply_flush(&batch(&["b"])).await;

    assert!(harness.affected(&["a"]).is_empty());
    assert_eq!(harness.affected(&["c"]), ids(&[0]));
    assert_eq!(
        harness.record(0),
        Some(HashSet::from([DependencyKey::new("b"), DependencyKey::new("c")]))
    );
}

#[tokio::test]
async fn repeated_full_build_yields_identical_records() {
    let harness = Harness::new(3);
    harness.renderer.depends(0, &["layout.html", "a.md"]);
    harness.renderer.depends(1, &["layout.html", "b.md"]);
    harness.renderer.depends(2, &["c.md"]);

    harness.session.full_build().await;
    let first = harness.session.driver().graph().snapshot();
    harness.session.full_build().await;
    let second = harness.session.driver().graph().snapshot();

    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn burst_within_window_flushes_once() {
    let harness = Harness::new(2);
    harness.renderer.depends(0, &["a"]);
    harness.renderer.depends(1, &["b"]);
    harness.session.full_build().await;
    harness.renderer.take_calls();

    let flushes: Arc<Mutex<Vec<BTreeSet<DependencyKey>>>> = Arc::default();
    let (notifier, changes) = change_channel();
    let session = Arc::clone(&harness.session);
    let seen = Arc::clone(&flushes);
    let running = tokio::spawn(async move {
        session
            .run_with(changes, move |batch, _| {
                seen.lock().unwrap().push(batch.keys.clone());
            })
            .await
    });

    notifier.notify("a").unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    notifier.notify("a").unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    notifier.notify("b").unwrap();

    tokio::time::sleep(WINDOW - Duration::from_millis(1)).await;
    assert!(flushes.lock().unwrap().is_empty());

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(
        *flushes.lock().unwrap(),
        vec![BTreeSet::from([DependencyKey::new("a"), DependencyKey::new("b")])]
    );
    assert_eq!(
        harness.renderer.take_calls(),
        vec![UnitId::new(0), UnitId::new(1)]
    );

    drop(notifier);
    let summary = running.await.unwrap();
    assert_eq!(summary.flushes, 1);
}

#[tokio::test(start_paused = true)]
async fn steady_stream_defers_flush_until_quiet() {
    let harness = Harness::new(1);
    harness.session.full_build().await;

    let flushes: Arc<Mutex<Vec<BTreeSet<DependencyKey>>>> = Arc::default();
    let (notifier, changes) = change_channel();
    let session = Arc::clone(&harness.session);
    let seen = Arc::clone(&flushes);
    let running = tokio::spawn(async move {
        session
            .run_with(changes, move |batch, _| {
                seen.lock().unwrap().push(batch.keys.clone());
            })
            .await
    });

    let keys = ["k0", "k1", "k2", "k3", "k4", "k5", "k6", "k7"];
    for key in keys {
        notifier.notify(key).unwrap();
        tokio::time::sleep(WINDOW - Duration::from_millis(5)).await;
        assert!(flushes.lock().unwrap().is_empty());
    }

    tokio::time::sleep(Duration::from_millis(10)).await;
    let expected: BTreeSet<DependencyKey> = keys.into_iter().map(DependencyKey::new).collect();
    assert_eq!(*flushes.lock().unwrap(), vec![expected]);

    drop(notifier);
    running.await.unwrap();
}

#[tokio::test]
async fn flush_rebuilds_only_dependents() {
    let harness = Harness::new(2);
    harness.renderer.depends(0, &["x"]);
    harness.renderer.depends(1, &["y"]);
    harness.session.full_build().await;
    harness.renderer.take_calls();

    harness.renderer.depends(1, &["y", "z"]);
    let outcome = harness.session.apply_flush(&batch(&["x"])).await;

    let report = outcome.report().expect("x has a dependent");
    assert_eq!(report.built_ids(), vec![UnitId::new(0)]);
    assert_eq!(harness.renderer.take_calls(), vec![UnitId::new(0)]);
    assert_eq!(
        harness.record(1),
        Some(HashSet::from([DependencyKey::new("y")]))
    );
}

#[tokio::test]
async fn unreferenced_key_is_invalidated_without_rendering() {
    let harness = Harness::new(2);
    harness.renderer.depends(0, &["x"]);
    harness.session.full_build().await;
    harness.renderer.take_calls();
    let hook_runs = harness.hook.runs.load(Ordering::SeqCst);

    let outcome = harness.session.apply_flush(&batch(&["orphan.png"])).await;

    assert!(matches!(
        outcome,
        FlushOutcome::NoAffectedUnits { invalidated: 1 }
    ));
    assert!(harness.renderer.take_calls().is_empty());
    assert_eq!(harness.hook.runs.load(Ordering::SeqCst), hook_runs);
    assert_eq!(
        *harness.cache.invalidated.lock().unwrap(),
        vec![DependencyKey::new("orphan.png")]
    );
}

#[tokio::test]
async fn every_key_is_invalidated_once_per_flush() {
    let harness = Harness::new(1);
    harness.renderer.depends(0, &["a"]);
    harness.session.full_build().await;

    harness.session.apply_flush(&batch(&["a", "b"])).await;

    let mut invalidated = harness.cache.invalidated.lock().unwrap().clone();
    invalidated.sort();
    assert_eq!(
        invalidated,
        vec![DependencyKey::new("a"), DependencyKey::new("b")]
    );
}

#[tokio::test]
async fn failing_unit_keeps_last_good_record() {
    let harness = Harness::new(2);
    harness.renderer.depends(0, &["shared", "old"]);
    harness.renderer.depends(1, &["shared"]);
    harness.session.full_build().await;

    harness.renderer.depends(0, &["shared", "new"]);
    harness.renderer.depends(1, &["shared", "extra"]);
    harness.renderer.fail(0);
    let outcome = harness.session.apply_flush(&batch(&["shared"])).await;

    let report = outcome.report().expect("both units depend on shared");
    assert_eq!(report.failed_ids(), vec![UnitId::new(0)]);
    assert_eq!(report.built_ids(), vec![UnitId::new(1)]);
    assert_eq!(
        harness.record(0),
        Some(HashSet::from([
            DependencyKey::new("shared"),
            DependencyKey::new("old")
        ]))
    );
    assert_eq!(
        harness.record(1),
        Some(HashSet::from([
            DependencyKey::new("shared"),
            DependencyKey::new("extra")
        ]))
    );
    assert!(harness.session.driver().output_of(UnitId::new(0)).is_some());
}

#[tokio::test]
async fn partial_rebuild_never_runs_aggregate_hooks() {
    let harness = Harness::new(2);
    harness.renderer.depends(0, &["a"]);
    harness.renderer.depends(1, &["b"]);
    let full = harness.session.full_build().await;
    assert!(matches!(full.aggregate, AggregateOutcome::Completed));
    assert_eq!(harness.hook.runs.load(Ordering::SeqCst), 1);

    let ok = harness.session.apply_flush(&batch(&["a"])).await;
    harness.renderer.fail(1);
    let failed = harness.session.apply_flush(&batch(&["b"])).await;

    for outcome in [ok, failed] {
        let report = outcome.report().expect("rebuild happened");
        assert!(matches!(report.aggregate, AggregateOutcome::NotRun));
    }
    assert_eq!(harness.hook.runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn pending_keys_flush_when_channel_closes() {
    let harness = Harness::new(1);
    harness.renderer.depends(0, &["a"]);
    harness.session.full_build().await;
    harness.renderer.take_calls();

    let (notifier, changes) = change_channel();
    notifier.notify("a").unwrap();
    drop(notifier);

    let summary = harness.session.run(changes).await;

    assert_eq!(summary.flushes, 1);
    assert_eq!(summary.rebuilt_units, 1);
    assert_eq!(harness.renderer.take_calls(), vec![UnitId::new(0)]);
}
