//! Error types.
//!
//! The reactive core itself never returns errors: failures inside tracked
//! functions are logged and degraded (see [`crate::reactive::Runtime::capture`]).
//! Errors surface only from configuration and fragment construction.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by fallible construction APIs.
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration value is out of range.
    #[error("invalid config field `{field}`: {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: String,
    },

    /// The configuration document could not be parsed.
    #[error("failed to parse runtime config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// A tag name is empty or contains characters a tag cannot hold.
    #[error("invalid tag name: {0:?}")]
    InvalidTagName(String),
}

/// Failure of a single tracked invocation.
///
/// Never escapes the runtime; it is logged and the invocation degrades to
/// its input argument.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("tracked function panicked: {0}")]
    Panicked(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_message_names_field() {
        let err = Error::InvalidConfig {
            field: "max_fixpoint_rounds",
            reason: "must be at least 1".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid config field `max_fixpoint_rounds`: must be at least 1"
        );
    }

    #[test]
    fn parse_errors_convert() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = parse.into();
        assert!(matches!(err, Error::ConfigParse(_)));
    }
}
