//! Per-project-type operation policies.
//!
//! Each consumer of the generated artifacts supports a different subset of OpenAPI.
//! A policy is chosen once per pipeline with [`policy_for`] and judges every operation
//! the indexer enumerates.

use serde_json::Value as JsonValue;
use url::Url;

use crate::config::{AuthKind, ParseOptions, ProjectType};
use crate::error::{ErrorKind, WarningKind};
use crate::openapi::document::operation_parameters;
use crate::openapi::operations::{
    is_json_media_type, json_response_schema, AuthDescriptor, AuthScheme, OperationContext,
};
use crate::utils::is_identifier;

/// Findings for a single operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationCheck {
    /// Blocking findings; a non-empty list makes the operation invalid
    pub errors: Vec<ErrorKind>,
    pub warnings: Vec<WarningKind>,
}

impl OperationCheck {
    fn error(&mut self, kind: ErrorKind) {
        if !self.errors.contains(&kind) {
            self.errors.push(kind);
        }
    }

    fn warn(&mut self, kind: WarningKind) {
        if !self.warnings.contains(&kind) {
            self.warnings.push(kind);
        }
    }
}

/// Judges operations for one project type
pub trait OperationPolicy: Send + Sync {
    /// The project type this policy serves
    fn project_type(&self) -> ProjectType;

    /// Whether an operation may offer alternative auth schemes
    fn accepts_multiple_auth(&self, options: &ParseOptions) -> bool {
        options.allow_multiple_auth
    }

    /// Checks specific to this project type, run after the common ones
    fn check_specific(&self, ctx: &OperationContext<'_>, options: &ParseOptions, check: &mut OperationCheck);

    /// All findings for one operation
    fn check_operation(&self, ctx: &OperationContext<'_>, options: &ParseOptions) -> OperationCheck {
        let mut check = OperationCheck::default();
        check_method(ctx, options, &mut check);
        check_operation_id(ctx, options, &mut check);
        check_server(ctx, &mut check);
        if let Some(kind) = self.auth_error(ctx, options) {
            check.error(kind);
        }
        self.check_specific(ctx, options, &mut check);
        check
    }

    /// Why the operation's auth is unsupported, if it is
    fn auth_error(&self, ctx: &OperationContext<'_>, options: &ParseOptions) -> Option<ErrorKind> {
        match ctx.auth {
            Ok(auth) => self.descriptor_error(auth, options),
            Err(_) if ctx.has_security_requirements() => Some(ErrorKind::AuthTypeIsNotSupported),
            Err(_) => None,
        }
    }

    /// Why a resolved auth descriptor is unsupported, if it is
    fn descriptor_error(&self, auth: &AuthDescriptor, options: &ParseOptions) -> Option<ErrorKind> {
        match auth {
            AuthDescriptor::None => None,
            AuthDescriptor::Single(scheme) => {
                (!is_scheme_supported(scheme, options)).then_some(ErrorKind::AuthTypeIsNotSupported)
            }
            AuthDescriptor::MultipleAlternatives(schemes) => {
                if !self.accepts_multiple_auth(options) {
                    Some(ErrorKind::MultipleAuthNotSupported)
                } else if !schemes.iter().any(|s| is_scheme_supported(s, options)) {
                    Some(ErrorKind::AuthTypeIsNotSupported)
                } else {
                    None
                }
            }
            AuthDescriptor::SimultaneousRequired(_) => Some(ErrorKind::AuthTypeIsNotSupported),
        }
    }
}

/// Policy for Teams API-based message extensions
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageExtensionPolicy;

impl OperationPolicy for MessageExtensionPolicy {
    fn project_type(&self) -> ProjectType {
        ProjectType::MessageExtension
    }

    fn check_specific(&self, ctx: &OperationContext<'_>, options: &ParseOptions, check: &mut OperationCheck) {
        check_json_response(ctx, check);
        if ctx.document.has_circular_refs() {
            check.error(ErrorKind::CircularReferenceNotSupported);
        }

        let mut required = 0usize;
        let mut optional = 0usize;
        for param in operation_parameters(ctx.path_item, ctx.operation) {
            if param.get("in").and_then(JsonValue::as_str) == Some("cookie") {
                continue;
            }
            if param.get("required").and_then(JsonValue::as_bool).unwrap_or(false) {
                required += 1;
            } else {
                optional += 1;
            }
        }

        if let Some(content) = ctx
            .operation
            .get("requestBody")
            .and_then(|body| body.get("content"))
            .and_then(JsonValue::as_object)
        {
            if content.len() > 1 {
                check.error(ErrorKind::PostBodyContainMultipleMediaTypes);
            } else if let Some((media, body)) = content.iter().next() {
                if !is_json_media_type(media) {
                    check.error(ErrorKind::PostBodySchemaIsNotJson);
                } else if let Some(schema) = body.get("schema") {
                    let (req, opt) = count_body_properties(schema);
                    required += req;
                    optional += opt;
                }
            }
        }

        if required == 0 && optional == 0 {
            check.error(ErrorKind::NoParameter);
        } else if required > 1 && !options.allow_multiple_parameters {
            check.error(ErrorKind::ExceededRequiredParamsLimit);
        } else if required == 0 {
            check.warn(WarningKind::OperationOnlyContainsOptionalParam);
        }
    }
}

/// Policy for Copilot plugins and declarative agents
#[derive(Debug, Clone, Copy, Default)]
pub struct CopilotPolicy;

impl OperationPolicy for CopilotPolicy {
    fn project_type(&self) -> ProjectType {
        ProjectType::Copilot
    }

    fn check_specific(&self, ctx: &OperationContext<'_>, _options: &ParseOptions, check: &mut OperationCheck) {
        check_json_response(ctx, check);
        if !is_identifier(ctx.operation_id) {
            check.warn(WarningKind::OperationIdContainsSpecialCharacters);
        }
    }
}

/// Policy for Teams AI bots
#[derive(Debug, Clone, Copy, Default)]
pub struct TeamsAiPolicy;

impl OperationPolicy for TeamsAiPolicy {
    fn project_type(&self) -> ProjectType {
        ProjectType::TeamsAi
    }

    fn accepts_multiple_auth(&self, _options: &ParseOptions) -> bool {
        true
    }

    fn check_specific(&self, _ctx: &OperationContext<'_>, _options: &ParseOptions, _check: &mut OperationCheck) {}
}

/// Select the policy for a project type
pub fn policy_for(project_type: ProjectType) -> Box<dyn OperationPolicy> {
    match project_type {
        ProjectType::MessageExtension => Box::new(MessageExtensionPolicy),
        ProjectType::Copilot => Box::new(CopilotPolicy),
        ProjectType::TeamsAi => Box::new(TeamsAiPolicy),
    }
}

/// The supported auth kind a scheme corresponds to, if any
pub fn auth_kind_of(scheme: &AuthScheme) -> Option<AuthKind> {
    if scheme.is_api_key() {
        let location = scheme.parameters.get("in").and_then(JsonValue::as_str);
        matches!(location, Some("header") | Some("query")).then_some(AuthKind::ApiKey)
    } else if scheme.is_bearer() {
        Some(AuthKind::Bearer)
    } else if scheme.is_oauth2() {
        scheme
            .parameters
            .get("flows")
            .and_then(|flows| flows.get("authorizationCode"))
            .map(|_| AuthKind::OAuth2)
    } else {
        None
    }
}

/// Whether a scheme is of a kind the options allow
pub fn is_scheme_supported(scheme: &AuthScheme, options: &ParseOptions) -> bool {
    auth_kind_of(scheme).is_some_and(|kind| options.is_auth_allowed(kind))
}

fn check_method(ctx: &OperationContext<'_>, options: &ParseOptions, check: &mut OperationCheck) {
    if !options.is_method_allowed(ctx.method) {
        check.error(ErrorKind::MethodNotAllowed);
    }
}

fn check_operation_id(ctx: &OperationContext<'_>, options: &ParseOptions, check: &mut OperationCheck) {
    if !ctx.has_explicit_id && !options.allow_missing_id {
        check.error(ErrorKind::MissingOperationId);
    }
}

fn check_server(ctx: &OperationContext<'_>, check: &mut OperationCheck) {
    match ctx.server {
        Err(_) => check.error(ErrorKind::ResolveServerUrlFailed),
        Ok(None) => check.error(ErrorKind::NoServerInformation),
        Ok(Some(server)) => match Url::parse(server) {
            Ok(url) if url.scheme() == "https" => {}
            Ok(_) => check.error(ErrorKind::UrlProtocolNotSupported),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                check.error(ErrorKind::RelativeServerUrlNotSupported)
            }
            Err(_) => check.error(ErrorKind::ResolveServerUrlFailed),
        },
    }
}

fn check_json_response(ctx: &OperationContext<'_>, check: &mut OperationCheck) {
    match json_response_schema(ctx.operation) {
        (None, _) => check.error(ErrorKind::ResponseJsonIsEmpty),
        (Some(_), true) => check.error(ErrorKind::ResponseContainMultipleMediaTypes),
        (Some(_), false) => {}
    }
}

/// Count required and optional top-level properties of a request body schema
fn count_body_properties(schema: &JsonValue) -> (usize, usize) {
    let Some(properties) = schema.get("properties").and_then(JsonValue::as_object) else {
        return (0, 0);
    };
    let required: Vec<&str> = schema
        .get("required")
        .and_then(JsonValue::as_array)
        .map(|names| names.iter().filter_map(JsonValue::as_str).collect())
        .unwrap_or_default();
    let req = properties
        .keys()
        .filter(|name| required.contains(&name.as_str()))
        .count();
    (req, properties.len() - req)
}
