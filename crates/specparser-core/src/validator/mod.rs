//! Structural and policy validation of a loaded document.

pub mod policy;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use sha2::{Digest, Sha256};

use crate::config::ParseOptions;
use crate::error::{Error, ErrorDetail, ErrorKind, WarningDetail, WarningKind};
use crate::openapi::deref::remote_refs;
use crate::openapi::{index_operations, OperationIndex, SpecDocument};
use policy::{policy_for, OperationPolicy};

/// Overall outcome of a validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Valid,
    Warning,
    Error,
}

/// Findings for a whole document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    pub warnings: Vec<WarningDetail>,
    pub errors: Vec<ErrorDetail>,
    /// Fingerprint of the document's server list
    pub spec_hash: String,
}

impl ValidationResult {
    fn from_findings(errors: Vec<ErrorDetail>, warnings: Vec<WarningDetail>, spec_hash: String) -> Self {
        let status = if !errors.is_empty() {
            ValidationStatus::Error
        } else if !warnings.is_empty() {
            ValidationStatus::Warning
        } else {
            ValidationStatus::Valid
        };
        Self {
            status,
            warnings,
            errors,
            spec_hash,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status != ValidationStatus::Error
    }
}

/// Validate a document with the policy of the configured project type
pub fn validate(doc: &SpecDocument, options: &ParseOptions) -> ValidationResult {
    let policy = policy_for(options.project_type);
    validate_with_policy(doc, options, policy.as_ref())
}

/// Validate a document with an explicit policy
pub fn validate_with_policy(
    doc: &SpecDocument,
    options: &ParseOptions,
    policy: &dyn OperationPolicy,
) -> ValidationResult {
    let spec_hash = servers_fingerprint(doc.dereferenced());
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if doc.has_circular_refs() {
        warnings.push(WarningDetail::new(
            WarningKind::CircularReferenceSkipped,
            "Document contains circular references; structural validation was skipped",
        ));
    } else if let Some(detail) = structural_error(doc) {
        errors.push(detail);
    }

    if doc.is_legacy() && !options.allow_legacy_format {
        return ValidationResult::from_findings(
            vec![ErrorDetail::from(&Error::LegacyFormatNotAllowed)],
            Vec::new(),
            spec_hash,
        );
    }

    for reference in remote_refs(doc.unresolved()) {
        errors.push(ErrorDetail::from(&Error::RemoteReferenceNotSupported(reference)));
    }

    if doc.is_legacy() {
        warnings.push(WarningDetail::new(
            WarningKind::ConvertLegacyToCurrent,
            "Swagger 2.0 document was converted to OpenAPI 3.0",
        ));
    }

    let index = index_operations(doc, options, policy);
    let (policy_errors, policy_warnings) = document_findings(&index, options);
    errors.extend(policy_errors);
    warnings.extend(policy_warnings);

    log::debug!(
        "Validated '{}': {} error(s), {} warning(s)",
        doc.title().unwrap_or("untitled"),
        errors.len(),
        warnings.len()
    );
    ValidationResult::from_findings(errors, warnings, spec_hash)
}

/// Document-level findings derived from the operation index
fn document_findings(
    index: &OperationIndex,
    options: &ParseOptions,
) -> (Vec<ErrorDetail>, Vec<WarningDetail>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for entry in index.iter().filter(|e| !e.warnings.is_empty()) {
        for kind in &entry.warnings {
            warnings.push(
                WarningDetail::new(*kind, format!("{}: {}", entry.key, kind))
                    .with_data(JsonValue::String(entry.operation_id.clone())),
            );
        }
    }

    let valid = index.valid_count();
    if valid == 0 {
        let invalid: Vec<JsonValue> = index
            .iter()
            .map(|e| json!({"api": e.key, "reason": e.reasons}))
            .collect();
        errors.push(
            ErrorDetail::new(ErrorKind::NoSupportedApi, "No supported API is found in the document")
                .with_data(JsonValue::Array(invalid)),
        );
    }

    if let Some(max) = options.max_operations {
        if valid > max {
            warnings.push(
                WarningDetail::new(
                    WarningKind::ExceededOperationLimit,
                    format!("{} supported operations exceed the limit of {}", valid, max),
                )
                .with_data(json!(max)),
            );
        }
    }

    (errors, warnings)
}

/// Deserialize the unresolved view into the OpenAPI 3.0 document model
fn structural_error(doc: &SpecDocument) -> Option<ErrorDetail> {
    let version = doc.openapi_version().unwrap_or_default();
    if !version.starts_with("3.0") {
        log::debug!("Skipping structural validation for OpenAPI version {}", version);
        return None;
    }
    match serde_json::from_value::<openapiv3::OpenAPI>(doc.unresolved().clone()) {
        Ok(_) => None,
        Err(e) => Some(ErrorDetail::new(
            ErrorKind::SpecNotValid,
            format!("Document is not a valid OpenAPI 3.0 document: {}", e),
        )),
    }
}

/// SHA-256 (hex) of the canonical JSON of the document's `servers` array
pub fn servers_fingerprint(document: &JsonValue) -> String {
    let servers = document
        .get("servers")
        .cloned()
        .unwrap_or_else(|| JsonValue::Array(Vec::new()));
    let canonical = serde_json::to_string(&servers).unwrap_or_default();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectType;

    fn petstore() -> JsonValue {
        json!({
            "openapi": "3.0.3",
            "info": {"title": "Pets", "version": "1.0.0"},
            "servers": [{"url": "https://pets.example.com"}],
            "paths": {"/pets": {"get": {
                "operationId": "listPets",
                "parameters": [{"name": "limit", "in": "query", "required": true, "schema": {"type": "integer"}}],
                "responses": {"200": {"description": "ok", "content": {"application/json": {"schema": {"type": "array", "items": {"type": "string"}}}}}}
            }}}
        })
    }

    #[test]
    fn test_valid_document() {
        let doc = SpecDocument::new(petstore(), false);
        let result = validate(&doc, &ParseOptions::default());
        assert_eq!(result.status, ValidationStatus::Valid, "{:?}", result);
        assert_eq!(result.spec_hash.len(), 64);
    }

    #[test]
    fn test_legacy_disallowed_is_the_only_error() {
        let mut value = petstore();
        value["paths"]["/x"] = json!({"$ref": "other.yaml#/x"});
        let doc = SpecDocument::new(value, true);
        let result = validate(&doc, &ParseOptions::default());
        assert_eq!(result.status, ValidationStatus::Error);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, ErrorKind::LegacyFormatNotAllowed);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_legacy_allowed_warns() {
        let doc = SpecDocument::new(petstore(), true);
        let options = ParseOptions {
            allow_legacy_format: true,
            ..Default::default()
        };
        let result = validate(&doc, &options);
        assert_eq!(result.status, ValidationStatus::Warning);
        assert_eq!(result.warnings[0].kind, WarningKind::ConvertLegacyToCurrent);
    }

    #[test]
    fn test_remote_refs_reported_once_each() {
        let mut value = petstore();
        value["components"] = json!({"schemas": {
            "A": {"$ref": "common.yaml#/A"},
            "B": {"$ref": "common.yaml#/A"},
            "C": {"$ref": "https://example.com/c.json"}
        }});
        let doc = SpecDocument::new(value, false);
        let result = validate(&doc, &ParseOptions::default());
        let remote: Vec<_> = result
            .errors
            .iter()
            .filter(|e| e.kind == ErrorKind::RemoteReferenceNotSupported)
            .collect();
        assert_eq!(remote.len(), 2);
    }

    #[test]
    fn test_no_supported_api_lists_reasons() {
        let mut value = petstore();
        value["servers"] = json!([]);
        let doc = SpecDocument::new(value, false);
        let result = validate(&doc, &ParseOptions::default());
        let detail = result
            .errors
            .iter()
            .find(|e| e.kind == ErrorKind::NoSupportedApi)
            .unwrap();
        let data = detail.data.as_ref().unwrap();
        assert_eq!(data[0]["api"], "GET /pets");
        assert_eq!(data[0]["reason"][0], "NoServerInformation");
    }

    #[test]
    fn test_operation_limit_warning() {
        let options = ParseOptions {
            max_operations: Some(0),
            project_type: ProjectType::TeamsAi,
            ..Default::default()
        };
        let doc = SpecDocument::new(petstore(), false);
        let result = validate(&doc, &options);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::ExceededOperationLimit));
    }

    #[test]
    fn test_structural_failure() {
        let mut value = petstore();
        value["info"] = json!("not an object");
        let doc = SpecDocument::new(value, false);
        let result = validate(&doc, &ParseOptions::default());
        assert_eq!(result.errors[0].kind, ErrorKind::SpecNotValid);
    }

    #[test]
    fn test_circular_document_skips_structure() {
        let mut value = petstore();
        value["components"] = json!({"schemas": {
            "Node": {"type": "object", "properties": {"next": {"$ref": "#/components/schemas/Node"}}}
        }});
        let doc = SpecDocument::new(value, false);
        let result = validate(&doc, &ParseOptions::default());
        assert_eq!(result.warnings[0].kind, WarningKind::CircularReferenceSkipped);
        assert!(result
            .errors
            .iter()
            .any(|e| e.kind == ErrorKind::NoSupportedApi));
    }

    #[test]
    fn test_fingerprint_is_pure() {
        let a = json!({"servers": [{"url": "https://a.example.com"}]});
        let b = json!({"servers": [{"url": "https://b.example.com"}]});
        assert_eq!(servers_fingerprint(&a), servers_fingerprint(&a.clone()));
        assert_ne!(servers_fingerprint(&a), servers_fingerprint(&b));
    }
}
