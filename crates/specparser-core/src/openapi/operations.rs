//! Operation indexing: identifiers, servers, auth and validity per operation.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use super::document::SpecDocument;
use super::loader::has_env_placeholder;
use crate::config::ParseOptions;
use crate::error::{ErrorKind, WarningKind};
use crate::utils::path_to_upper_camel_case;
use crate::validator::policy::OperationPolicy;

/// Build the `"{METHOD} {PATH}"` key of an operation
pub fn operation_key(method: &str, path: &str) -> String {
    format!("{} {}", method.to_uppercase(), path)
}

/// Normalize a caller-supplied key so the method part matches `operation_key`
pub fn normalize_key(key: &str) -> String {
    match key.trim().split_once(' ') {
        Some((method, path)) => operation_key(method, path.trim()),
        None => key.trim().to_string(),
    }
}

/// Fallback operationId: lowercased method followed by the UpperCamelCase path
pub fn synthesize_operation_id(method: &str, path: &str) -> String {
    format!("{}{}", method.to_lowercase(), path_to_upper_camel_case(path))
}

/// The operationId of an operation, explicit or synthesized
pub fn resolve_operation_id(method: &str, path: &str, operation: &JsonValue) -> (String, bool) {
    match operation
        .get("operationId")
        .and_then(JsonValue::as_str)
        .filter(|id| !id.is_empty())
    {
        Some(id) => (id.to_string(), true),
        None => (synthesize_operation_id(method, path), false),
    }
}

/// A named security scheme as declared in `components.securitySchemes`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthScheme {
    pub name: String,
    /// The scheme's `type` (apiKey, http, oauth2, openIdConnect)
    pub scheme_type: String,
    /// The full scheme object
    pub parameters: JsonValue,
}

impl AuthScheme {
    pub fn is_api_key(&self) -> bool {
        self.scheme_type == "apiKey"
    }

    pub fn is_bearer(&self) -> bool {
        self.scheme_type == "http"
            && self
                .parameters
                .get("scheme")
                .and_then(JsonValue::as_str)
                .is_some_and(|s| s.eq_ignore_ascii_case("bearer"))
    }

    pub fn is_oauth2(&self) -> bool {
        self.scheme_type == "oauth2"
    }
}

/// How an operation authenticates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "schemes")]
pub enum AuthDescriptor {
    /// No security requirement
    None,
    /// Exactly one scheme
    Single(AuthScheme),
    /// Any one of the schemes is accepted
    MultipleAlternatives(Vec<AuthScheme>),
    /// All of the schemes are required together
    SimultaneousRequired(Vec<AuthScheme>),
}

impl AuthDescriptor {
    /// All schemes mentioned by this descriptor
    pub fn schemes(&self) -> Vec<&AuthScheme> {
        match self {
            Self::None => Vec::new(),
            Self::Single(scheme) => vec![scheme],
            Self::MultipleAlternatives(schemes) | Self::SimultaneousRequired(schemes) => {
                schemes.iter().collect()
            }
        }
    }
}

/// One indexed operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationEntry {
    /// `"{METHOD} {PATH}"`
    pub key: String,
    /// Upper-cased HTTP method
    pub method: String,
    pub path: String,
    pub operation_id: String,
    /// Whether the id came from the document rather than being synthesized
    pub has_explicit_id: bool,
    pub is_valid: bool,
    /// Why the operation is not supported; empty when valid
    pub reasons: Vec<ErrorKind>,
    /// Non-blocking findings
    pub warnings: Vec<WarningKind>,
    pub server: Option<String>,
    /// `None` when the security requirements could not be resolved
    pub auth: Option<AuthDescriptor>,
    pub summary: Option<String>,
    pub description: Option<String>,
}

/// Everything a policy needs to judge one operation
#[derive(Debug, Clone, Copy)]
pub struct OperationContext<'a> {
    pub document: &'a SpecDocument,
    pub method: &'a str,
    pub path: &'a str,
    pub path_item: &'a JsonValue,
    /// The dereferenced operation object
    pub operation: &'a JsonValue,
    pub operation_id: &'a str,
    pub has_explicit_id: bool,
    pub server: &'a Result<Option<String>, String>,
    pub auth: &'a Result<AuthDescriptor, String>,
}

impl OperationContext<'_> {
    /// Whether the operation (or the document) declares any security requirement
    pub fn has_security_requirements(&self) -> bool {
        security_requirements(self.document.dereferenced(), self.operation)
            .is_some_and(|reqs| reqs.iter().any(|r| r.as_object().is_some_and(|m| !m.is_empty())))
    }
}

/// The operations of a document keyed by `"{METHOD} {PATH}"`, in document order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationIndex {
    pub entries: IndexMap<String, OperationEntry>,
}

impl OperationIndex {
    pub fn all_count(&self) -> usize {
        self.entries.len()
    }

    pub fn valid_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_valid).count()
    }

    pub fn get(&self, key: &str) -> Option<&OperationEntry> {
        self.entries.get(&normalize_key(key))
    }

    pub fn by_operation_id(&self, operation_id: &str) -> Option<&OperationEntry> {
        self.entries
            .values()
            .find(|e| e.operation_id == operation_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OperationEntry> {
        self.entries.values()
    }

    pub fn valid(&self) -> impl Iterator<Item = &OperationEntry> {
        self.entries.values().filter(|e| e.is_valid)
    }
}

/// Enumerate every operation of a document and judge it with `policy`
pub fn index_operations(
    doc: &SpecDocument,
    options: &ParseOptions,
    policy: &dyn OperationPolicy,
) -> OperationIndex {
    let mut entries = IndexMap::new();
    for (path, method, path_item, operation) in doc.operations() {
        let (operation_id, has_explicit_id) = resolve_operation_id(method, path, operation);

        let server = resolve_server(doc.dereferenced(), path_item, operation);
        if let Err(e) = &server {
            log::warn!("Could not resolve server for {} {}: {}", method, path, e);
        }
        let auth = resolve_auth(doc.dereferenced(), operation);
        if let Err(e) = &auth {
            log::warn!("Could not resolve auth for {} {}: {}", method, path, e);
        }

        let ctx = OperationContext {
            document: doc,
            method,
            path,
            path_item,
            operation,
            operation_id: &operation_id,
            has_explicit_id,
            server: &server,
            auth: &auth,
        };
        let check = policy.check_operation(&ctx, options);

        let key = operation_key(method, path);
        let entry = OperationEntry {
            key: key.clone(),
            method: method.to_uppercase(),
            path: path.to_string(),
            has_explicit_id,
            is_valid: check.errors.is_empty(),
            reasons: check.errors,
            warnings: check.warnings,
            server: server.ok().flatten(),
            auth: auth.ok(),
            summary: non_empty_str(operation.get("summary")),
            description: non_empty_str(operation.get("description")),
            operation_id,
        };
        entries.insert(key, entry);
    }
    OperationIndex { entries }
}

fn non_empty_str(value: Option<&JsonValue>) -> Option<String> {
    value
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Resolve the server URL of an operation: operation, then path item, then document.
///
/// `Ok(None)` means no server is declared anywhere; `Err` means a declared server
/// could not be turned into a URL.
pub fn resolve_server(
    document: &JsonValue,
    path_item: &JsonValue,
    operation: &JsonValue,
) -> Result<Option<String>, String> {
    let servers = [operation, path_item, document]
        .into_iter()
        .filter_map(|node| node.get("servers").and_then(JsonValue::as_array))
        .find(|servers| !servers.is_empty());
    let Some(servers) = servers else {
        return Ok(None);
    };
    let server = &servers[0];
    let url = server
        .get("url")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| "server entry has no string 'url'".to_string())?;
    let url = substitute_server_variables(url, server.get("variables"))?;
    if has_env_placeholder(&url) {
        return Err(format!("server url '{}' has an unresolved placeholder", url));
    }
    Ok(Some(url))
}

fn substitute_server_variables(url: &str, variables: Option<&JsonValue>) -> Result<String, String> {
    let mut out = String::with_capacity(url.len());
    let mut rest = url;
    while let Some(start) = rest.find('{') {
        // `${{ NAME }}` placeholders are not server variables
        if rest[..start].ends_with('$') || rest[start + 1..].starts_with('{') {
            let end = rest[start..].find("}}").map(|i| start + i + 2).unwrap_or(rest.len());
            out.push_str(&rest[..end]);
            rest = &rest[end..];
            continue;
        }
        let end = rest[start..]
            .find('}')
            .map(|i| start + i)
            .ok_or_else(|| format!("unclosed variable in server url '{}'", url))?;
        let name = &rest[start + 1..end];
        let default = variables
            .and_then(|v| v.get(name))
            .and_then(|v| v.get("default"))
            .and_then(JsonValue::as_str)
            .ok_or_else(|| format!("server variable '{}' has no default", name))?;
        out.push_str(&rest[..start]);
        out.push_str(default);
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// The security requirement list in effect for an operation
pub fn security_requirements<'a>(
    document: &'a JsonValue,
    operation: &'a JsonValue,
) -> Option<&'a Vec<JsonValue>> {
    operation
        .get("security")
        .or_else(|| document.get("security"))
        .and_then(JsonValue::as_array)
}

/// Classify an operation's security requirements against the declared schemes
pub fn resolve_auth(document: &JsonValue, operation: &JsonValue) -> Result<AuthDescriptor, String> {
    let Some(requirements) = security_requirements(document, operation) else {
        return Ok(AuthDescriptor::None);
    };
    let declared = document
        .get("components")
        .and_then(|c| c.get("securitySchemes"))
        .and_then(JsonValue::as_object);

    let mut groups: Vec<Vec<AuthScheme>> = Vec::new();
    for requirement in requirements {
        let names = requirement
            .as_object()
            .ok_or_else(|| "security requirement is not an object".to_string())?;
        if names.is_empty() {
            continue;
        }
        let group = names
            .keys()
            .map(|name| lookup_scheme(declared, name))
            .collect::<Result<Vec<_>, _>>()?;
        groups.push(group);
    }

    match groups.len() {
        0 => Ok(AuthDescriptor::None),
        1 => {
            let mut group = groups.remove(0);
            if group.len() == 1 {
                Ok(AuthDescriptor::Single(group.remove(0)))
            } else {
                Ok(AuthDescriptor::SimultaneousRequired(group))
            }
        }
        _ if groups.iter().all(|g| g.len() == 1) => Ok(AuthDescriptor::MultipleAlternatives(
            groups.into_iter().flatten().collect(),
        )),
        _ => Err("alternative security requirements combine several schemes".to_string()),
    }
}

fn lookup_scheme(declared: Option<&Map<String, JsonValue>>, name: &str) -> Result<AuthScheme, String> {
    let scheme = declared
        .and_then(|schemes| schemes.get(name))
        .ok_or_else(|| format!("security scheme '{}' is not declared", name))?;
    let scheme_type = scheme
        .get("type")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| format!("security scheme '{}' has no type", name))?;
    Ok(AuthScheme {
        name: name.to_string(),
        scheme_type: scheme_type.to_string(),
        parameters: scheme.clone(),
    })
}

/// Status codes searched, in order, for the success response of an operation
fn success_response<'a>(operation: &'a JsonValue) -> Vec<&'a JsonValue> {
    let Some(responses) = operation.get("responses").and_then(JsonValue::as_object) else {
        return Vec::new();
    };
    let mut ordered: Vec<&JsonValue> = Vec::new();
    for code in ["200", "201"] {
        if let Some(r) = responses.get(code) {
            ordered.push(r);
        }
    }
    for (code, r) in responses {
        if code.starts_with('2') && code != "200" && code != "201" {
            ordered.push(r);
        }
    }
    if let Some(r) = responses.get("default") {
        ordered.push(r);
    }
    ordered
}

/// Whether a media type is JSON
pub fn is_json_media_type(media: &str) -> bool {
    let media = media.split(';').next().unwrap_or(media).trim();
    media == "application/json" || media.ends_with("+json")
}

/// The JSON schema of the success response and whether that response offers several
/// media types
pub fn json_response_schema(operation: &JsonValue) -> (Option<&JsonValue>, bool) {
    for response in success_response(operation) {
        let Some(content) = response.get("content").and_then(JsonValue::as_object) else {
            continue;
        };
        if let Some((_, media)) = content.iter().find(|(media, _)| is_json_media_type(media)) {
            let schema = media.get("schema").unwrap_or(&JsonValue::Null);
            return (Some(schema).filter(|s| !s.is_null()), content.len() > 1);
        }
    }
    (None, false)
}
