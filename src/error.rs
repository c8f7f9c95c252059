/// Centralized error types for sourcekeeper using thiserror
///
/// Every failure is wrapped with phase-identifying context at the point of
/// origin and returned to the immediate caller; nothing is retried internally.
use thiserror::Error;

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, SourcesError>;

/// Main error type for the sources manager
#[derive(Error, Debug)]
pub enum SourcesError {
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// External command invocation failures (git, build scripts, packaging)
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("{phase}: failed to launch `{command}`: {reason}")]
    Launch {
        phase: String,
        command: String,
        reason: String,
    },

    #[error("{phase}: `{command}` exited with {status}\n\n{output}")]
    Failed {
        phase: String,
        command: String,
        status: String,
        output: String,
    },

    #[error("{phase}: required script not found: {path}")]
    ScriptMissing { phase: String, path: String },
}

/// Failures turning git's structured log export into records
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Invalid timestamp '{value}': {reason}")]
    Timestamp { value: String, reason: String },

    #[error("Malformed log record: expected {expected} fields, got {actual}")]
    FieldCount { expected: usize, actual: usize },
}

/// Requested data that has not been produced yet
#[derive(Error, Debug)]
pub enum NotFoundError {
    #[error("Requested out-of-bounds git log: offset {offset} >= length {length}")]
    LogOutOfBounds { offset: usize, length: usize },

    #[error("Source archive for {0} does not exist; call make_commit_archive first")]
    SourceArchive(String),

    #[error("Binary archive for {0} does not exist")]
    BinaryArchive(String),
}

/// Missing or unusable external settings
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Failed to load configuration file: {0}")]
    LoadFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid repository URL '{url}': {reason}")]
    InvalidRepoUrl { url: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SourcesError::NotFound(NotFoundError::LogOutOfBounds {
            offset: 12,
            length: 10,
        });
        assert_eq!(
            err.to_string(),
            "Requested out-of-bounds git log: offset 12 >= length 10"
        );
    }

    #[test]
    fn test_tool_error_carries_output() {
        let err = ToolError::Failed {
            phase: "build".to_string(),
            command: "bash scripts/build.sh".to_string(),
            status: "exit status: 2".to_string(),
            output: "cc: fatal error".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("build:"));
        assert!(msg.contains("cc: fatal error"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SourcesError = io_err.into();
        assert!(matches!(err, SourcesError::Io(_)));
    }

    #[test]
    fn test_config_error_missing() {
        let err = SourcesError::Config(ConfigError::MissingRequired("repo_url".to_string()));
        assert_eq!(
            err.to_string(),
            "Configuration error: Missing required configuration: repo_url"
        );
    }
}
