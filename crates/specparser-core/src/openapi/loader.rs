//! Loading OpenAPI documents from files, URLs or in-memory values.
//!
//! Environment placeholders of the form `${{ NAME }}` are substituted on the raw
//! text before parsing, so substitution works the same for JSON and YAML. Swagger
//! 2.0 input is converted to OpenAPI 3.0 here; whether it is *allowed* is decided
//! later by the validator.
//!
//! # Examples
//!
//! ```no_run
//! use specparser_core::openapi::{load_document, SpecSource};
//!
//! # #[tokio::main]
//! # async fn main() -> specparser_core::Result<()> {
//! let doc = load_document(&SpecSource::from("openapi.yaml")).await?;
//! if let Some(title) = doc.title() {
//!     println!("API Title: {}", title);
//! }
//! # Ok(())
//! # }
//! ```

// Internal imports (std, crate)
use std::path::{Path, PathBuf};

use super::convert::{convert_swagger2, is_swagger2};
use super::document::SpecDocument;
use crate::utils::is_url;

// External imports (alphabetized)
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value as JsonValue;
use tokio::fs;

static ENV_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid placeholder regex")
});

/// Where a document comes from
#[derive(Debug, Clone)]
pub enum SpecSource {
    /// A `.json`, `.yaml` or `.yml` file
    Path(PathBuf),
    /// An http(s) URL
    Url(String),
    /// An already parsed document
    Value(JsonValue),
}

impl From<&str> for SpecSource {
    fn from(location: &str) -> Self {
        if is_url(location) {
            Self::Url(location.to_string())
        } else {
            Self::Path(PathBuf::from(location))
        }
    }
}

impl From<String> for SpecSource {
    fn from(location: String) -> Self {
        Self::from(location.as_str())
    }
}

impl From<PathBuf> for SpecSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for SpecSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<JsonValue> for SpecSource {
    fn from(value: JsonValue) -> Self {
        Self::Value(value)
    }
}

/// Load, normalize and dereference a document
pub async fn load_document(source: &SpecSource) -> crate::Result<SpecDocument> {
    let value = match source {
        SpecSource::Path(path) => {
            log::debug!("Loading OpenAPI document from file: {}", path.display());
            let content = fs::read_to_string(path).await?;
            parse_content(&substitute_env(&content)).map_err(|e| {
                crate::Error::spec_not_valid(format!(
                    "Failed to parse OpenAPI spec at {}: {}",
                    path.display(),
                    e
                ))
            })?
        }
        SpecSource::Url(url) => {
            log::debug!("Loading OpenAPI document from URL: {}", url);
            let content = fetch(url).await?;
            parse_content(&substitute_env(&content)).map_err(|e| {
                crate::Error::spec_not_valid(format!(
                    "Failed to parse OpenAPI spec from {}: {}",
                    url, e
                ))
            })?
        }
        SpecSource::Value(value) => {
            let mut value = value.clone();
            substitute_env_in_value(&mut value);
            value
        }
    };
    normalize(value)
}

/// Check the root shape and upgrade Swagger 2.0 documents
pub fn normalize(value: JsonValue) -> crate::Result<SpecDocument> {
    if !value.is_object() {
        return Err(crate::Error::spec_not_valid("document root must be an object"));
    }
    if is_swagger2(&value) {
        log::info!("Converting Swagger 2.0 document to OpenAPI 3.0");
        let converted = convert_swagger2(&value)?;
        return Ok(SpecDocument::new(converted, true));
    }
    if value.get("openapi").and_then(JsonValue::as_str).is_none() {
        return Err(crate::Error::spec_not_valid(
            "document declares neither 'openapi' nor 'swagger' version",
        ));
    }
    Ok(SpecDocument::new(value, false))
}

async fn fetch(url: &str) -> crate::Result<String> {
    let response = reqwest::get(url).await.map_err(|e| {
        crate::Error::openapi(format!("Failed to fetch OpenAPI spec from {}: {}", url, e))
    })?;

    if !response.status().is_success() {
        return Err(crate::Error::openapi(format!(
            "Failed to fetch OpenAPI spec from {}: HTTP {}",
            url,
            response.status()
        )));
    }

    Ok(response.text().await?)
}

/// Parse content as either JSON or YAML
fn parse_content(content: &str) -> Result<JsonValue, String> {
    // Try to parse as JSON first
    if let Ok(json) = serde_json::from_str(content) {
        return Ok(json);
    }

    // If JSON parsing fails, try YAML
    serde_yaml::from_str(content).map_err(|e| format!("content is neither valid JSON nor YAML: {}", e))
}

/// Replace `${{ NAME }}` placeholders with environment values; unknown names stay as-is
pub fn substitute_env(text: &str) -> String {
    ENV_PLACEHOLDER
        .replace_all(text, |caps: &Captures| match std::env::var(&caps[1]) {
            Ok(value) => value,
            Err(_) => {
                log::debug!("Environment variable {} is not set", &caps[1]);
                caps[0].to_string()
            }
        })
        .into_owned()
}

fn substitute_env_in_value(value: &mut JsonValue) {
    match value {
        JsonValue::String(s) if ENV_PLACEHOLDER.is_match(s) => {
            *s = substitute_env(s);
        }
        JsonValue::Object(map) => map.values_mut().for_each(substitute_env_in_value),
        JsonValue::Array(arr) => arr.iter_mut().for_each(substitute_env_in_value),
        _ => {}
    }
}

/// Whether a string still contains an unresolved placeholder
pub fn has_env_placeholder(text: &str) -> bool {
    ENV_PLACEHOLDER.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_from_file() -> crate::Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("openapi_async.json");
        let json_content = r#"
        {
            "openapi": "3.0.0",
            "info": {
                "title": "Test API Async",
                "version": "2.0.0"
            },
            "servers": [
                {
                    "url": "https://api.example.com/v2"
                }
            ],
            "paths": {}
        }
        "#;
        tokio::fs::write(&file_path, json_content).await?;

        let spec = load_document(&SpecSource::from(file_path.as_path())).await?;
        assert_eq!(spec.title(), Some("Test API Async"));
        assert_eq!(spec.version(), Some("2.0.0"));
        assert!(!spec.is_legacy());

        Ok(())
    }

    #[tokio::test]
    async fn test_yaml_with_env_placeholder() -> crate::Result<()> {
        std::env::set_var("SPECPARSER_TEST_HOST", "api.contoso.com");
        let dir = tempdir()?;
        let file_path = dir.path().join("openapi.yaml");
        let yaml = "openapi: 3.0.0\ninfo:\n  title: Env\n  version: '1'\nservers:\n  - url: https://${{ SPECPARSER_TEST_HOST }}/v1\n  - url: https://${{SPECPARSER_TEST_MISSING}}\npaths: {}\n";
        tokio::fs::write(&file_path, yaml).await?;

        let spec = load_document(&SpecSource::from(file_path.as_path())).await?;
        assert_eq!(
            spec.unresolved()["servers"][0]["url"],
            "https://api.contoso.com/v1"
        );
        assert_eq!(
            spec.unresolved()["servers"][1]["url"],
            "https://${{SPECPARSER_TEST_MISSING}}"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_input_is_spec_not_valid() -> crate::Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("broken.json");
        tokio::fs::write(&file_path, "{ \"openapi\": [unclosed").await?;

        let err = load_document(&SpecSource::from(file_path.as_path()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::SpecNotValid);
        Ok(())
    }

    #[tokio::test]
    async fn test_in_memory_swagger_is_converted() -> crate::Result<()> {
        let source = SpecSource::from(json!({
            "swagger": "2.0",
            "info": {"title": "Legacy", "version": "1"},
            "host": "example.com",
            "paths": {"/a": {"get": {"responses": {"200": {"description": "ok"}}}}}
        }));
        let spec = load_document(&source).await?;
        assert!(spec.is_legacy());
        assert_eq!(spec.openapi_version(), Some("3.0.3"));
        assert_eq!(spec.unresolved()["servers"][0]["url"], "https://example.com");
        Ok(())
    }

    #[test]
    fn test_normalize_rejects_unversioned() {
        let err = normalize(json!({"paths": {}})).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::SpecNotValid);
        let err = normalize(json!(["not", "an", "object"])).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::SpecNotValid);
    }

    #[test]
    fn test_source_from_str() {
        assert!(matches!(SpecSource::from("https://x.test/a.json"), SpecSource::Url(_)));
        assert!(matches!(SpecSource::from("spec/a.yaml"), SpecSource::Path(_)));
    }
}
