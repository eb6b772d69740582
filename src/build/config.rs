//! Build engine configuration.
//!
//! Built from the validated `[build]` settings; tests construct it directly.

use std::num::NonZeroUsize;
use std::time::Duration;

// Default values for build configuration
const DEFAULT_DEBOUNCE_MS: u64 = 50;
const DEFAULT_RENDER_CONCURRENCY: usize = 4;

/// Build engine configuration.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Quiet period (ms) after the last change notification before a flush.
    pub debounce_ms: u64,
    /// Maximum number of renders in flight within one batch.
    pub render_concurrency: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            render_concurrency: DEFAULT_RENDER_CONCURRENCY,
        }
    }
}

impl From<&crate::config::BuildSettings> for BuildConfig {
    fn from(settings: &crate::config::BuildSettings) -> Self {
        Self {
            debounce_ms: settings.debounce.as_millis() as u64,
            render_concurrency: settings.render_concurrency.get(),
        }
    }
}

impl BuildConfig {
    /// The debounce window as a `Duration`, clamped to at least one millisecond.
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.max(1))
    }

    /// Render concurrency as NonZeroUsize, clamping to 1 if zero.
    pub fn render_concurrency_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.render_concurrency).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = BuildConfig::default();
        assert_eq!(config.debounce_ms, 50);
        assert_eq!(config.render_concurrency, 4);
        assert_eq!(config.debounce_window(), Duration::from_millis(50));
    }

    #[test]
    fn zero_debounce_clamps_to_one_millisecond() {
        let config = BuildConfig {
            debounce_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.debounce_window(), Duration::from_millis(1));
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = BuildConfig {
            render_concurrency: 0,
            ..Default::default()
        };
        assert_eq!(config.render_concurrency_non_zero().get(), 1);
    }
}
