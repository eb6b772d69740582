//! Folio incremental build engine
//!
//! Renders every content unit once at startup, remembers which resources
//! each render consumed, and on change notifications rebuilds only the units
//! whose output is stale:
//!
//! - **Dependency graph**: unit → keys of its last successful render
//! - **Change coalescer**: debounces bursts of notifications into one flush
//! - **Build driver**: renders batches, records dependencies, runs
//!   corpus-wide hooks after full builds
//! - **Invalidation cache**: external derivations dropped before rebuilds
//!
//! ## Configuration
//!
//! ```toml
//! [build]
//! debounce_ms = 50
//! render_concurrency = 4
//! ```

mod adapter;
mod coalescer;
mod config;
pub mod deps;
mod driver;
mod graph;
mod invalidation;
mod keys;
mod lock;
mod notifier;
mod report;
mod session;

pub use adapter::{
    AggregateError, AggregateHook, DiscardSink, OutputSet, OutputSink, PublishOutcome,
    RenderError, RenderOutput, RenderedUnit, Renderer, SinkError,
};
pub use coalescer::{ChangeCoalescer, ChangeNotification, CoalescerState, FlushBatch};
pub use config::BuildConfig;
pub use driver::BuildDriver;
pub use graph::DependencyGraph;
pub use invalidation::InvalidationCache;
pub use keys::{DependencyKey, normalize_path};
pub use notifier::{ChangeNotifier, ChangeReceiver, SessionClosed, change_channel};
pub use report::{AggregateOutcome, BuildMode, BuildReport, BuiltUnit, UnitError, UnitFailure};
pub use session::{BuildSession, FlushOutcome, SessionSummary};

pub(crate) use lock::mutex_lock;
