//! Error types for the Racecourse operator

use thiserror::Error;

/// Main error type for Racecourse operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error (transport failures, conflicts, rejections)
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Validation error for a Racecourse spec
    #[error("validation error: {0}")]
    Validation(String),

    /// A required metadata field is missing from an object
    #[error("{kind} is missing {field}")]
    MissingField {
        /// Kind of the object
        kind: &'static str,
        /// Name of the missing field
        field: &'static str,
    },

    /// A child object is already controlled by another owner
    #[error("{kind} {name} is controlled by {owner}")]
    ForeignController {
        /// Kind of the child object
        kind: &'static str,
        /// Name of the child object
        name: String,
        /// Kind and name of the controlling owner
        owner: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The reconcile pass was cancelled before it completed
    #[error("reconcile cancelled")]
    Cancelled,
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a missing field error
    pub fn missing(kind: &'static str, field: &'static str) -> Self {
        Self::MissingField { kind, field }
    }

    /// HTTP status code of the underlying API error, if any
    pub fn api_code(&self) -> Option<u16> {
        match self {
            Self::Kube(kube::Error::Api(response)) => Some(response.code),
            _ => None,
        }
    }

    /// True if the API server rejected a write due to a stale resourceVersion
    pub fn is_conflict(&self) -> bool {
        self.api_code() == Some(409)
    }

    /// True if the API server reported the object as missing
    pub fn is_not_found(&self) -> bool {
        self.api_code() == Some(404)
    }

    /// True if the pass was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

#[cfg(test)]
pub(crate) fn api_error(code: u16, reason: &str) -> Error {
    Error::Kube(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("simulated {reason}"),
        reason: reason.to_string(),
        code,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Story: a stale resourceVersion surfaces as a conflict, not as not-found
    #[test]
    fn conflict_is_recognized() {
        let err = api_error(409, "Conflict");
        assert!(err.is_conflict());
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("kubernetes error"));
    }

    #[test]
    fn not_found_is_recognized() {
        let err = api_error(404, "NotFound");
        assert!(err.is_not_found());
        assert!(!err.is_conflict());
    }

    #[test]
    fn non_api_errors_have_no_code() {
        assert_eq!(Error::validation("bad").api_code(), None);
        assert_eq!(Error::Cancelled.api_code(), None);
    }

    #[test]
    fn messages_carry_context() {
        let err = Error::validation("replicas must be at least 1");
        assert_eq!(err.to_string(), "validation error: replicas must be at least 1");

        let err = Error::missing("Racecourse", "metadata.uid");
        assert_eq!(err.to_string(), "Racecourse is missing metadata.uid");

        let err = Error::ForeignController {
            kind: "ConfigMap",
            name: "rc-config".to_string(),
            owner: "Helm release".to_string(),
        };
        assert_eq!(err.to_string(), "ConfigMap rc-config is controlled by Helm release");

        assert!(Error::Cancelled.is_cancelled());
        assert_eq!(Error::Cancelled.to_string(), "reconcile cancelled");
    }

    #[test]
    fn json_errors_convert_to_serialization() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn error_categorization_for_controller_handling() {
        fn categorize(err: &Error) -> &'static str {
            match err {
                Error::Cancelled => "drop",
                Error::Validation(_) => "await_spec_change",
                _ => "retry_with_backoff",
            }
        }

        assert_eq!(categorize(&api_error(409, "Conflict")), "retry_with_backoff");
        assert_eq!(categorize(&api_error(500, "InternalError")), "retry_with_backoff");
        assert_eq!(categorize(&Error::validation("x")), "await_spec_change");
        assert_eq!(categorize(&Error::Cancelled), "drop");
    }
}
