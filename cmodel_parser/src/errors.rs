use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the analyzer crate.
pub type AnalyzerResult<T> = Result<T, AnalyzerError>;

/// Errors that abort the analysis of one translation unit. Everything
/// else (unknown types, irreducible expressions, malformed initializers)
/// is localized to the declaration it occurs in and reported through
/// diagnostics while parsing continues.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// Source file missing or unreadable. Fatal for the file, not the run.
    #[error("failed to read source file '{path}': {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The C grammar failed to produce a syntax tree.
    #[error("C grammar failed to produce a syntax tree for '{path}'")]
    Grammar { path: String },

    /// Serializing the analysis output failed.
    #[error("failed to serialize analysis output: {0}")]
    Serialize(#[from] serde_json::Error),
}
