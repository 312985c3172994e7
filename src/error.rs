//! Error types for pipeline operations.
//!
//! [`PipelineError`] is the fatal taxonomy: every variant terminates a task
//! as `failed`. The orchestrator never lets one escape to the submitter; it
//! is converted into an unsuccessful [`TaskResult`](crate::TaskResult)
//! whose `error_message` is the variant's `Display` text.
//!
//! Collaborator failures have their own enums ([`AnalysisError`],
//! [`ReportError`]) and wrap into `PipelineError` through `From`.

use thiserror::Error;

/// Fatal conditions that terminate a pipeline task.
///
/// # Examples
///
/// ```
/// use archi_pipeline::PipelineError;
///
/// let err = PipelineError::NothingCollected;
/// assert_eq!(err.kind(), "nothing_collected");
/// assert!(err.to_string().contains("no records were collected"));
/// ```
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The submission carried no identifiers at all.
    #[error("empty input: no identifiers were supplied")]
    EmptyInput,

    /// The submission carried more identifiers than the configured limit.
    #[error("too many identifiers: {count} supplied, limit is {limit}")]
    TooManyIdentifiers {
        /// Number of identifiers supplied.
        count: usize,
        /// Configured maximum.
        limit: usize,
    },

    /// Every collection lookup failed.
    #[error("no records were collected from the gateway")]
    NothingCollected,

    /// Records were collected but none survived validation and cleaning.
    #[error("no valid records remained after cleaning")]
    NothingValid,

    /// The collection gateway failed its health probe before collection.
    #[error("collection gateway failed its health check")]
    GatewayUnhealthy,

    /// The task was cancelled by a caller.
    #[error("task cancelled by caller")]
    Cancelled,

    /// The analyzer collaborator failed.
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    /// The report sink collaborator failed.
    #[error(transparent)]
    Report(#[from] ReportError),

    /// A stage panicked or the task was torn down by the runtime.
    #[error("internal pipeline error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Returns a stable snake_case tag for this failure.
    ///
    /// Stored in the failed progress record's metadata under
    /// [`ERROR_KIND_META_KEY`](crate::constants::ERROR_KIND_META_KEY).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyInput => "empty_input",
            Self::TooManyIdentifiers { .. } => "too_many_identifiers",
            Self::NothingCollected => "nothing_collected",
            Self::NothingValid => "nothing_valid",
            Self::GatewayUnhealthy => "gateway_unhealthy",
            Self::Cancelled => "cancelled",
            Self::Analysis(_) => "analysis_failed",
            Self::Report(_) => "report_failed",
            Self::Internal(_) => "internal",
        }
    }
}

/// Errors internal to a collection gateway.
///
/// These never cross the gateway boundary as errors: the gateway turns
/// them into failed [`CollectionOutcome`](crate::CollectionOutcome)s. They
/// surface directly only from gateway construction.
#[derive(Error, Debug)]
pub enum CollectionError {
    /// No endpoint configured for a remote gateway.
    #[error("collection endpoint must be configured")]
    MissingEndpoint,

    /// The HTTP client could not be built.
    #[error("failed to build collection client: {0}")]
    Client(String),

    /// The request could not be completed.
    #[error("collection request failed: {0}")]
    Request(String),

    /// The service answered with a non-success status.
    #[error("collection service returned status {0}")]
    Status(u16),

    /// The response body was not a valid record.
    #[error("failed to decode collected record: {0}")]
    Decode(String),
}

/// Errors raised by an [`Analyzer`](crate::analyzer::Analyzer).
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// `analyze` was called with no records.
    #[error("analysis requires at least one record")]
    EmptyInput,

    /// The configured provider name is not known.
    #[error("unsupported analyzer provider: {0}")]
    UnsupportedProvider(String),

    /// The provider requires an API key and none was configured.
    #[error("analyzer provider {provider} requires an api key")]
    MissingApiKey {
        /// Provider name.
        provider: String,
    },

    /// The remote call could not be completed.
    #[error("analyzer request failed: {0}")]
    Request(String),

    /// The provider answered with a non-success status.
    #[error("analyzer returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The provider response did not have the expected envelope.
    #[error("invalid analyzer response: {0}")]
    InvalidResponse(String),
}

/// Errors raised by a [`ReportSink`](crate::report::ReportSink).
#[derive(Error, Debug)]
pub enum ReportError {
    /// The requested format name is not one of markdown, json or html.
    #[error("unsupported report format: {0}")]
    UnsupportedFormat(String),

    /// Writing the report failed.
    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),

    /// Serializing the report body failed.
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors returned by [`TaskRegistry`](crate::registry::TaskRegistry) operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// A task with this id is already registered.
    #[error("task already registered: {task_id}")]
    AlreadyRegistered {
        /// The conflicting task id.
        task_id: String,
    },
}

/// Errors produced while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration text is not valid TOML for the expected shape.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid configuration value for {field}: {reason}")]
    Invalid {
        /// Dotted field path, e.g. `processing.batch_size`.
        field: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}
