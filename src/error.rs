//! Error types shared by the engine and the bundled stages.

use std::path::PathBuf;

/// Errors produced while building or evaluating a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A stage was composed onto a source while its own source was already bound.
    #[error("stage '{stage}' already has its source bound")]
    AlreadyBound { stage: &'static str },

    /// A file could not be opened.
    #[error("failed to open '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line could not be decoded with the configured encoding.
    #[error("'{path}' line {line}: invalid {encoding} data")]
    Decode {
        path: PathBuf,
        line: usize,
        encoding: &'static str,
    },

    /// Generic I/O failure while reading or writing a stream.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A regular expression failed to compile.
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// A shell-style glob failed to compile.
    #[error("invalid glob: {0}")]
    Glob(#[from] glob::PatternError),

    /// A path matched by a glob could not be read.
    #[error("glob walk failed: {0}")]
    GlobWalk(#[from] glob::GlobError),

    /// A line did not match a pattern that every line is required to match.
    #[error("'{line}' does not match pattern {pattern}")]
    NoMatch { line: String, pattern: String },

    /// A split line did not have the requested field.
    #[error("not enough fields in '{line}' to pick field {index}")]
    MissingField { line: String, index: usize },

    /// A subprocess could not be started.
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A subprocess finished with a failing status.
    #[error("`{command}` exited with {status}")]
    CommandFailed {
        command: String,
        status: std::process::ExitStatus,
    },

    /// A stage body rejected its input.
    #[error("{stage}: {message}")]
    Stage {
        stage: &'static str,
        message: String,
    },

    /// A stage failed to release its resources while the chain was closing.
    #[error("failed to release stage '{stage}': {source}")]
    Release {
        stage: &'static str,
        #[source]
        source: Box<PipelineError>,
    },

    /// A configuration file could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    /// A configuration value parsed but is out of range.
    #[error("invalid config value for '{key}': {message}")]
    InvalidConfig { key: &'static str, message: String },
}

impl PipelineError {
    /// Build a stage-body error from any displayable message.
    pub fn stage(stage: &'static str, message: impl std::fmt::Display) -> Self {
        PipelineError::Stage {
            stage,
            message: message.to_string(),
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_bound_names_stage() {
        let err = PipelineError::AlreadyBound { stage: "matches" };
        assert_eq!(err.to_string(), "stage 'matches' already has its source bound");
    }

    #[test]
    fn test_release_wraps_cause() {
        let inner = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let err = PipelineError::Release {
            stage: "run",
            source: Box::new(PipelineError::Io(inner)),
        };
        let msg = err.to_string();
        assert!(msg.contains("run"), "got: {msg}");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_stage_helper() {
        let err = PipelineError::stage("convert", "bad number");
        assert_eq!(err.to_string(), "convert: bad number");
    }
}
