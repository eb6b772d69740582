//! Dependency collector for render tracking.
//!
//! Uses `tokio::task_local!` so that anything running inside a render (the
//! renderer itself, the file cache it reads through) can report the keys it
//! consumed without threading a collector through every call. The driver
//! never trusts this implicitly: renderers hand the collected set back as
//! part of their output.

use std::cell::RefCell;
use std::collections::HashSet;
use std::future::Future;

use super::keys::DependencyKey;

tokio::task_local! {
    static DEPS: RefCell<HashSet<DependencyKey>>;
}

/// Record a dependency of the render currently in progress.
///
/// If no collector is active, the call is silently ignored.
///
/// # Example
///
/// ```ignore
/// crate::build::deps::record(DependencyKey::from_path(&layout_path));
/// let layout = std::fs::read_to_string(&layout_path)?;
/// ```
pub fn record(key: DependencyKey) {
    let _ = DEPS.try_with(|deps| {
        deps.borrow_mut().insert(key);
    });
}

/// Whether a collector is active for the current task.
pub fn is_collecting() -> bool {
    DEPS.try_with(|_| ()).is_ok()
}

/// Run a future with a fresh dependency collector.
///
/// Returns the future's result together with every key recorded while it
/// ran. Collectors nest: an inner scope shadows the outer one, and keys
/// recorded inside it are not seen by the outer scope.
///
/// # Example
///
/// ```ignore
/// let (html, deps) = deps::with_collector(async {
///     // Any calls to deps::record() in here will be captured
///     render_markdown(&unit).await
/// })
/// .await;
/// ```
pub async fn with_collector<F, R>(f: F) -> (R, HashSet<DependencyKey>)
where
    F: Future<Output = R>,
{
    DEPS.scope(RefCell::new(HashSet::new()), async move {
        let result = f.await;
        let collected = DEPS
            .try_with(|deps| deps.take())
            .unwrap_or_default();
        (result, collected)
    })
    .await
}
