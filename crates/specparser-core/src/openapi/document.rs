//! The normalized two-view OpenAPI document.

use std::path::Path;

use serde_json::{Map, Value as JsonValue};
use tokio::fs;

use super::deref::dereference;

/// HTTP methods that may appear as operations in a path item
pub const HTTP_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// A loaded OpenAPI 3 document.
///
/// The unresolved view keeps `$ref` pointers and is what gets written to disk. The
/// dereferenced view has every internal reference inlined and is what all inspection
/// logic reads. The dereferenced view is always rebuilt from the unresolved one, never
/// edited on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecDocument {
    unresolved: JsonValue,
    dereferenced: JsonValue,
    is_legacy: bool,
    has_circular_refs: bool,
}

impl SpecDocument {
    /// Build both views from an unresolved OpenAPI 3 document
    pub fn new(unresolved: JsonValue, is_legacy: bool) -> Self {
        let deref = dereference(&unresolved);
        Self {
            unresolved,
            dereferenced: deref.value,
            is_legacy,
            has_circular_refs: deref.circular,
        }
    }

    /// The reference-preserving view
    pub fn unresolved(&self) -> &JsonValue {
        &self.unresolved
    }

    /// The fully dereferenced view
    pub fn dereferenced(&self) -> &JsonValue {
        &self.dereferenced
    }

    /// Whether the source was a Swagger 2.0 document
    pub fn is_legacy(&self) -> bool {
        self.is_legacy
    }

    /// Whether the reference graph contains a cycle
    pub fn has_circular_refs(&self) -> bool {
        self.has_circular_refs
    }

    /// Apply a mutation to the unresolved view and rebuild the dereferenced view
    pub fn update<F>(&mut self, mutate: F) -> crate::Result<()>
    where
        F: FnOnce(&mut JsonValue) -> crate::Result<()>,
    {
        let mut unresolved = self.unresolved.clone();
        mutate(&mut unresolved)?;
        *self = Self::new(unresolved, self.is_legacy);
        Ok(())
    }

    /// Get the title of the API
    pub fn title(&self) -> Option<&str> {
        self.unresolved.get("info")?.get("title")?.as_str()
    }

    /// Get the version of the API
    pub fn version(&self) -> Option<&str> {
        self.unresolved.get("info")?.get("version")?.as_str()
    }

    /// Get the description of the API
    pub fn description(&self) -> Option<&str> {
        self.unresolved.get("info")?.get("description")?.as_str()
    }

    /// Get the declared OpenAPI version (e.g. "3.0.3")
    pub fn openapi_version(&self) -> Option<&str> {
        self.unresolved.get("openapi")?.as_str()
    }

    /// Iterate over `(path, method, path_item, operation)` in the dereferenced view
    pub fn operations(&self) -> Vec<(&str, &'static str, &JsonValue, &JsonValue)> {
        collect_operations(&self.dereferenced)
    }

    /// Write the unresolved view to disk, as YAML for `.yaml`/`.yml` paths, else as JSON
    pub async fn save<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        write_document(path.as_ref(), &self.unresolved).await
    }
}

/// Collect the operations of an OpenAPI value in document order
pub fn collect_operations(value: &JsonValue) -> Vec<(&str, &'static str, &JsonValue, &JsonValue)> {
    let mut operations = Vec::new();
    let Some(paths) = value.get("paths").and_then(JsonValue::as_object) else {
        return operations;
    };
    for (path, item) in paths {
        for method in HTTP_METHODS {
            if let Some(operation) = item.get(method).filter(|op| op.is_object()) {
                operations.push((path.as_str(), method, item, operation));
            }
        }
    }
    operations
}

/// Effective parameters of an operation: path-level parameters overridden by
/// operation-level parameters with the same name and location
pub fn operation_parameters(path_item: &JsonValue, operation: &JsonValue) -> Vec<JsonValue> {
    let mut params: Vec<JsonValue> = path_item
        .get("parameters")
        .and_then(JsonValue::as_array)
        .cloned()
        .unwrap_or_default();

    let identity = |p: &JsonValue| {
        (
            p.get("name").and_then(JsonValue::as_str).map(String::from),
            p.get("in").and_then(JsonValue::as_str).map(String::from),
        )
    };

    for param in operation
        .get("parameters")
        .and_then(JsonValue::as_array)
        .into_iter()
        .flatten()
    {
        let id = identity(param);
        params.retain(|existing| identity(existing) != id);
        params.push(param.clone());
    }
    params
}

/// Serialize a document for the given output path
pub fn serialize_document(path: &Path, value: &JsonValue) -> crate::Result<String> {
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
    if is_yaml {
        Ok(serde_yaml::to_string(value)?)
    } else {
        Ok(serde_json::to_string_pretty(value)?)
    }
}

/// Write a document, creating parent directories as needed
pub async fn write_document(path: &Path, value: &JsonValue) -> crate::Result<()> {
    let content = serialize_document(path, value)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    log::debug!("Writing document to: {}", path.display());
    fs::write(path, content).await?;
    Ok(())
}

/// Get a mutable operation object by path and method in an unresolved document
pub(crate) fn operation_mut<'a>(
    value: &'a mut JsonValue,
    path: &str,
    method: &str,
) -> Option<&'a mut Map<String, JsonValue>> {
    value
        .get_mut("paths")?
        .get_mut(path)?
        .get_mut(method)?
        .as_object_mut()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_views_built_together() {
        let doc = SpecDocument::new(
            json!({
                "openapi": "3.0.0",
                "info": {"title": "T", "version": "1"},
                "paths": {"/a": {"get": {"responses": {"200": {"$ref": "#/components/responses/Ok"}}}}},
                "components": {"responses": {"Ok": {"description": "ok"}}}
            }),
            false,
        );
        assert_eq!(
            doc.unresolved()["paths"]["/a"]["get"]["responses"]["200"]["$ref"],
            "#/components/responses/Ok"
        );
        assert_eq!(
            doc.dereferenced()["paths"]["/a"]["get"]["responses"]["200"]["description"],
            "ok"
        );
        assert_eq!(doc.title(), Some("T"));
        assert!(!doc.has_circular_refs());
    }

    #[test]
    fn test_update_rebuilds_dereferenced() -> crate::Result<()> {
        let mut doc = SpecDocument::new(
            json!({"openapi": "3.0.0", "paths": {"/a": {"get": {}}}}),
            true,
        );
        doc.update(|value| {
            value["paths"]["/a"]["get"]["operationId"] = json!("getA");
            Ok(())
        })?;
        assert_eq!(doc.dereferenced()["paths"]["/a"]["get"]["operationId"], "getA");
        assert!(doc.is_legacy());
        Ok(())
    }

    #[test]
    fn test_operation_parameters_override() {
        let item = json!({"parameters": [
            {"name": "id", "in": "path", "description": "path level"},
            {"name": "q", "in": "query"}
        ]});
        let op = json!({"parameters": [{"name": "id", "in": "path", "description": "op level"}]});
        let params = operation_parameters(&item, &op);
        assert_eq!(params.len(), 2);
        assert_eq!(params[1]["description"], "op level");
    }

    #[tokio::test]
    async fn test_save_by_extension() -> crate::Result<()> {
        let dir = tempdir()?;
        let doc = SpecDocument::new(json!({"openapi": "3.0.0", "paths": {}}), false);

        let yaml_path = dir.path().join("out/spec.yaml");
        doc.save(&yaml_path).await?;
        let yaml = tokio::fs::read_to_string(&yaml_path).await?;
        assert!(yaml.starts_with("openapi:"));

        let json_path = dir.path().join("spec.json");
        doc.save(&json_path).await?;
        let json_text = tokio::fs::read_to_string(&json_path).await?;
        assert!(json_text.contains("\n  \"openapi\""));
        Ok(())
    }
}
