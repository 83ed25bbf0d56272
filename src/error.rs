use thiserror::Error;

/// Errors that abort a whole transform invocation.
///
/// Bad cell values are never errors; they drop the row instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    /// The input table lacks one or more required columns
    #[error("malformed input: missing required column(s): {}", missing.join(", "))]
    MalformedInput { missing: Vec<String> },
}
