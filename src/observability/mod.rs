//! Structured logging setup and run metrics.
//!
//! - [`init_logging`] — One-time tracing setup with `RUST_LOG` support
//! - [`RunMetrics`] — Lightweight per-run counters for the end-of-run summary

use tracing_subscriber::EnvFilter;

/// Console verbosity selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

impl Verbosity {
    fn default_filter(&self) -> &'static str {
        match self {
            Self::Quiet => "gitscout=warn",
            Self::Normal => "gitscout=info",
            Self::Verbose => "gitscout=debug",
        }
    }
}

/// Initialize structured logging with `RUST_LOG` environment variable support.
///
/// `RUST_LOG` wins when set; otherwise the verbosity flag picks the default
/// filter. Call once at program startup — subsequent calls are silently
/// ignored by `tracing_subscriber`.
pub fn init_logging(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.default_filter()));

    // try_init so double-init in tests doesn't panic
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Lightweight per-run metrics collector.
///
/// Populated by the pipeline as collectors finish; rendered into the final
/// console summary. Serializable to JSON via [`RunMetrics::to_json`].
#[derive(Debug, Default)]
pub struct RunMetrics {
    pub queries_issued: usize,
    pub queries_skipped_duplicate: usize,
    pub items_collected: usize,
    pub items_from_cache: usize,
    pub detail_fetches: usize,
    pub tasks_failed: usize,
    pub elapsed_ms: Option<u64>,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "queries_issued": self.queries_issued,
            "queries_skipped_duplicate": self.queries_skipped_duplicate,
            "items_collected": self.items_collected,
            "items_from_cache": self.items_from_cache,
            "detail_fetches": self.detail_fetches,
            "tasks_failed": self.tasks_failed,
            "elapsed_ms": self.elapsed_ms,
        })
    }

    /// Fold another collector's counters into this one.
    pub fn merge(&mut self, other: &RunMetrics) {
        self.queries_issued += other.queries_issued;
        self.queries_skipped_duplicate += other.queries_skipped_duplicate;
        self.items_collected += other.items_collected;
        self.items_from_cache += other.items_from_cache;
        self.detail_fetches += other.detail_fetches;
        self.tasks_failed += other.tasks_failed;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_does_not_panic() {
        init_logging(Verbosity::Normal);
        // Second call should also not panic (try_init ignores re-init).
        init_logging(Verbosity::Verbose);
    }

    #[test]
    fn metrics_new_has_zero_values() {
        let m = RunMetrics::new();
        assert_eq!(m.queries_issued, 0);
        assert_eq!(m.items_collected, 0);
        assert!(m.elapsed_ms.is_none());
    }

    #[test]
    fn metrics_to_json_contains_all_fields() {
        let mut m = RunMetrics::new();
        m.queries_issued = 12;
        m.items_collected = 340;
        m.tasks_failed = 2;
        m.elapsed_ms = Some(4500);

        let json = m.to_json();
        assert_eq!(json["queries_issued"], 12);
        assert_eq!(json["items_collected"], 340);
        assert_eq!(json["tasks_failed"], 2);
        assert_eq!(json["elapsed_ms"], 4500);
    }

    #[test]
    fn metrics_merge_adds_counters() {
        let mut a = RunMetrics::new();
        a.queries_issued = 5;
        a.items_collected = 10;
        let mut b = RunMetrics::new();
        b.queries_issued = 3;
        b.items_collected = 7;
        b.detail_fetches = 4;

        a.merge(&b);
        assert_eq!(a.queries_issued, 8);
        assert_eq!(a.items_collected, 17);
        assert_eq!(a.detail_fetches, 4);
    }
}
