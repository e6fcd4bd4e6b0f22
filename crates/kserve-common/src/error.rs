//! Error types for the inference-run controller
//!
//! Errors carry the run or object they concern so a failed reconcile can be
//! traced back from a single log line.

use thiserror::Error;

/// Main error type for controller operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// The InferenceConfig referenced by a run could not be resolved
    #[error("unable to resolve InferenceConfig {namespace}/{config} for {run}: {message}")]
    ConfigResolution {
        /// Name of the InferenceRun holding the reference
        run: String,
        /// Namespace the reference was resolved in
        namespace: String,
        /// Name of the referenced InferenceConfig
        config: String,
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Writing the contract ConfigMap failed on both create and update
    #[error("error creating configmap {name}: {create}, error updating configmap: {update}")]
    Artifact {
        /// Name of the ConfigMap
        name: String,
        /// Failure returned by the initial create
        create: String,
        /// Failure returned by the fallback update
        update: String,
    },

    /// Validation error for an InferenceRun
    #[error("validation error for {run}: {message}")]
    Validation {
        /// Name of the run with invalid configuration
        run: String,
        /// Description of what's invalid
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "observe", "controller")
        context: String,
    },
}

impl Error {
    /// Create a config resolution error
    pub fn config_resolution(
        run: impl Into<String>,
        namespace: impl Into<String>,
        config: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::ConfigResolution {
            run: run.into(),
            namespace: namespace.into(),
            config: config.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error naming the kind being (de)serialized
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a validation error with run context
    pub fn validation_for(run: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            run: run.into(),
            message: msg.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// HTTP status code returned by the API server, if this is an API error
    pub fn api_code(&self) -> Option<u16> {
        match self {
            Error::Kube {
                source: kube::Error::Api(ae),
            } => Some(ae.code),
            _ => None,
        }
    }

    /// True if the API server answered 404
    pub fn is_not_found(&self) -> bool {
        self.api_code() == Some(404)
    }

    /// True if the API server answered 409 (already exists or stale write)
    pub fn is_conflict(&self) -> bool {
        self.api_code() == Some(409)
    }

    /// Check if this error is retryable
    ///
    /// The poll scheduler requeues every error; this only decides how loudly
    /// the failure is reported.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code) && ae.code != 404 && ae.code != 409
            ),
            Error::ConfigResolution { .. } => true,
            Error::Serialization { .. } => false,
            Error::Artifact { .. } => true,
            Error::Validation { .. } => false,
            Error::Internal { .. } => true,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::serialization(e.to_string())
    }
}
