//! Specparser Core Library
//!
//! This library loads OpenAPI 3 and Swagger 2.0 descriptions, validates them
//! against a per-project-type policy, projects them onto selected operations and
//! generates Teams app manifests, API plugin manifests and Adaptive Card templates
//! from the result.

pub mod auth;
pub mod config;
pub mod error;
pub mod filter;
pub mod generator;
pub mod openapi;
pub mod parser;
pub mod utils;
pub mod validator;

pub use crate::{
    auth::{ApiKeyLocation, AuthSchemeSpec},
    config::{AuthKind, ParseOptions, ProjectType},
    error::{Error, ErrorDetail, ErrorKind, Result, Stage, WarningDetail, WarningKind},
    generator::{CardStorage, GenerateResult},
    openapi::{AuthDescriptor, OperationEntry, OperationIndex, SpecDocument, SpecSource},
    parser::SpecParser,
    validator::{ValidationResult, ValidationStatus},
};
