//! Crate-wide error type.
//!
//! Fatal failures (config files, cache I/O, report output) surface through
//! [`Error`]; transient network problems never reach it — the transport layer
//! degrades to empty results instead so one bad query cannot abort a run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("config: {0}")]
    Config(String),

    /// Pre-flight validation failures. Each entry is one human-readable
    /// problem; all of them are reported before the run aborts.
    #[error("invalid configuration:\n{}", .0.join("\n"))]
    Validation(Vec<String>),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_joins_messages() {
        let err = Error::Validation(vec!["bad date".into(), "bad state".into()]);
        let text = err.to_string();
        assert!(text.contains("bad date"));
        assert!(text.contains("bad state"));
    }

    #[test]
    fn io_error_converts() {
        fn fails() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "missing").into())
        }
        assert!(fails().is_err());
    }
}
