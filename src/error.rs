//! Request validation errors

use thiserror::Error;

/// Rejection of a malformed request.
///
/// Validation happens before any sandbox resource is allocated, and is the
/// only failure class that never reaches the result stream — every later
/// failure is delivered inside the terminal `Complete` record instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The raw input was not a JSON object.
    #[error("request must be a JSON object")]
    NotAnObject,

    /// A required field was absent.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// A field was present with the wrong JSON type.
    #[error("field `{field}` must be a {expected}")]
    WrongType {
        /// Name of the offending field.
        field: &'static str,
        /// Expected JSON type.
        expected: &'static str,
    },

    /// The language tag is not one of the accepted values.
    #[error("unknown language `{0}`, expected \"javascript\" or \"html\"")]
    UnknownLanguage(String),
}
