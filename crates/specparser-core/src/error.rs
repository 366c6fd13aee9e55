//! Error handling for the specparser pipeline.
//!
//! This module defines the main error type `Error` used throughout the library,
//! the `ErrorKind`/`WarningKind` codes reported in validation and generation
//! results, and a convenient `Result` type alias. It uses `thiserror` and
//! implements conversions from the common I/O and serialization errors.
//!
//! Fatal failures are `Error` values. Pipeline stages wrap anything they cannot
//! classify with [`Error::in_stage`], so callers always see either a specific
//! kind (`SpecNotValid`, `Cancelled`, ...) or the name of the stage that failed.
//!
//! # Examples
//!
//! ```
//! use specparser_core::error::{Error, ErrorKind, Stage};
//!
//! let err = Error::openapi("boom").in_stage(Stage::List);
//! assert_eq!(err.kind(), ErrorKind::ListFailed);
//!
//! // Classified errors pass through untouched
//! assert_eq!(Error::Cancelled.in_stage(Stage::Generate).kind(), ErrorKind::Cancelled);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Result type for specparser operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline stage used to label otherwise unclassified failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Validate,
    List,
    GetSpec,
    Generate,
    AddAuth,
    GenerateAdaptiveCard,
}

impl Stage {
    /// The error kind reported for a failure in this stage
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validate => ErrorKind::ValidateFailed,
            Self::List => ErrorKind::ListFailed,
            Self::GetSpec => ErrorKind::GetSpecFailed,
            Self::Generate => ErrorKind::GenerateFailed,
            Self::AddAuth => ErrorKind::AddAuthFailed,
            Self::GenerateAdaptiveCard => ErrorKind::GenerateAdaptiveCardFailed,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validate => "validate",
            Self::List => "list",
            Self::GetSpec => "get spec",
            Self::Generate => "generate",
            Self::AddAuth => "add auth",
            Self::GenerateAdaptiveCard => "generate adaptive card",
        };
        f.write_str(name)
    }
}

/// Main error type for specparser operations
#[derive(Debug, Error)]
pub enum Error {
    /// The document could not be parsed or fails the OpenAPI grammar
    #[error("Spec is not valid: {0}")]
    SpecNotValid(String),

    /// A Swagger 2.0 document was supplied but the options forbid it
    #[error("Swagger 2.0 documents are not allowed")]
    LegacyFormatNotAllowed,

    /// The document references another document
    #[error("Remote reference is not supported: {0}")]
    RemoteReferenceNotSupported(String),

    /// Cooperative cancellation was observed
    #[error("Operation was cancelled")]
    Cancelled,

    /// An unclassified failure inside a named pipeline stage
    #[error("Failed to {stage}: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error while fetching a remote document
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// OpenAPI error
    #[error("OpenAPI error: {0}")]
    OpenApi(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new OpenAPI error
    pub fn openapi<S: Into<String>>(msg: S) -> Self {
        Self::OpenApi(msg.into())
    }

    /// Create a new spec-not-valid error
    pub fn spec_not_valid<S: Into<String>>(msg: S) -> Self {
        Self::SpecNotValid(msg.into())
    }

    /// Create a stage failure from a plain message
    pub fn stage<S: Into<String>>(stage: Stage, msg: S) -> Self {
        Self::Stage {
            stage,
            source: Box::new(Self::OpenApi(msg.into())),
        }
    }

    /// Label this error with a pipeline stage unless it is already classified
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            Self::SpecNotValid(_)
            | Self::LegacyFormatNotAllowed
            | Self::RemoteReferenceNotSupported(_)
            | Self::Cancelled
            | Self::Stage { .. } => self,
            other => Self::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The classification code of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SpecNotValid(_) => ErrorKind::SpecNotValid,
            Self::LegacyFormatNotAllowed => ErrorKind::LegacyFormatNotAllowed,
            Self::RemoteReferenceNotSupported(_) => ErrorKind::RemoteReferenceNotSupported,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Stage { stage, .. } => stage.kind(),
            _ => ErrorKind::Unknown,
        }
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Self::Config(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Self::Config(s)
    }
}

/// Classification codes for fatal errors and validation findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    SpecNotValid,
    LegacyFormatNotAllowed,
    RemoteReferenceNotSupported,
    Cancelled,
    ValidateFailed,
    ListFailed,
    GetSpecFailed,
    GenerateFailed,
    AddAuthFailed,
    GenerateAdaptiveCardFailed,
    NoServerInformation,
    RelativeServerUrlNotSupported,
    UrlProtocolNotSupported,
    ResolveServerUrlFailed,
    MethodNotAllowed,
    MissingOperationId,
    AuthTypeIsNotSupported,
    MultipleAuthNotSupported,
    ResponseJsonIsEmpty,
    ResponseContainMultipleMediaTypes,
    PostBodyContainMultipleMediaTypes,
    PostBodySchemaIsNotJson,
    NoParameter,
    ExceededRequiredParamsLimit,
    CircularReferenceNotSupported,
    NoSupportedApi,
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Classification codes for non-fatal findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WarningKind {
    ConvertLegacyToCurrent,
    OperationIdSanitized,
    UnsupportedAuthType,
    GenerateCardFailed,
    OperationIdContainsSpecialCharacters,
    CircularReferenceSkipped,
    OperationOnlyContainsOptionalParam,
    ExceededOperationLimit,
    FunctionDescriptionMissing,
    Unknown,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A single error entry of a validation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl ErrorDetail {
    pub fn new(kind: ErrorKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }
}

impl From<&Error> for ErrorDetail {
    /// Report an error as a result entry; a remote reference carries the reference as data
    fn from(error: &Error) -> Self {
        let detail = Self::new(error.kind(), error.to_string());
        match error {
            Error::RemoteReferenceNotSupported(reference) => {
                detail.with_data(JsonValue::String(reference.clone()))
            }
            _ => detail,
        }
    }
}

/// A single warning entry of a validation or generation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarningDetail {
    pub kind: WarningKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl WarningDetail {
    pub fn new(kind: WarningKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }
}
