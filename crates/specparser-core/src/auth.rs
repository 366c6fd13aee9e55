//! Injecting a security scheme into a document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};

use crate::error::{Error, Stage};
use crate::openapi::document::{collect_operations, operation_mut};
use crate::openapi::operations::resolve_operation_id;
use crate::openapi::SpecDocument;

/// Where an API key is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    Header,
    Query,
}

impl ApiKeyLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Query => "query",
        }
    }
}

/// A security scheme to add to a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthSchemeSpec {
    ApiKey {
        name: String,
        location: ApiKeyLocation,
    },
    Bearer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bearer_format: Option<String>,
    },
    #[serde(rename = "oauth2")]
    OAuth2 {
        authorization_url: String,
        token_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        refresh_url: Option<String>,
        /// Scope name to description
        #[serde(default)]
        scopes: BTreeMap<String, String>,
    },
}

impl AuthSchemeSpec {
    /// The `components.securitySchemes` entry for this scheme
    pub fn to_security_scheme(&self) -> JsonValue {
        match self {
            Self::ApiKey { name, location } => json!({
                "type": "apiKey",
                "name": name,
                "in": location.as_str(),
            }),
            Self::Bearer { bearer_format } => {
                let mut scheme = json!({"type": "http", "scheme": "bearer"});
                if let Some(format) = bearer_format {
                    scheme["bearerFormat"] = json!(format);
                }
                scheme
            }
            Self::OAuth2 {
                authorization_url,
                token_url,
                refresh_url,
                scopes,
            } => {
                let mut flow = json!({
                    "authorizationUrl": authorization_url,
                    "tokenUrl": token_url,
                    "scopes": scopes,
                });
                if let Some(refresh) = refresh_url {
                    flow["refreshUrl"] = json!(refresh);
                }
                json!({"type": "oauth2", "flows": {"authorizationCode": flow}})
            }
        }
    }

    /// Scopes listed in a security requirement for this scheme
    pub fn requirement_scopes(&self) -> Vec<String> {
        match self {
            Self::OAuth2 { scopes, .. } => scopes.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }
}

/// Add `scheme` under `scheme_name` and make it the only requirement of the targeted
/// operations. Returns the number of operations that were bound to the scheme.
pub fn inject(
    doc: &mut SpecDocument,
    scheme_name: &str,
    scheme: &AuthSchemeSpec,
    operation_ids: &[String],
) -> crate::Result<usize> {
    if scheme_name.is_empty() {
        return Err(Error::stage(Stage::AddAuth, "security scheme name must not be empty"));
    }

    let mut bound = 0;
    doc.update(|value| {
        let targets: Vec<(String, &'static str)> = collect_operations(value)
            .into_iter()
            .filter(|(path, method, _, op)| {
                let (id, _) = resolve_operation_id(method, path, op);
                operation_ids.contains(&id)
            })
            .map(|(path, method, _, _)| (path.to_string(), method))
            .collect();

        let root = value
            .as_object_mut()
            .ok_or_else(|| Error::stage(Stage::AddAuth, "document root is not an object"))?;
        let components = root
            .entry("components")
            .or_insert_with(|| JsonValue::Object(Map::new()));
        let schemes = components
            .as_object_mut()
            .ok_or_else(|| Error::stage(Stage::AddAuth, "'components' is not an object"))?
            .entry("securitySchemes")
            .or_insert_with(|| JsonValue::Object(Map::new()));
        schemes
            .as_object_mut()
            .ok_or_else(|| Error::stage(Stage::AddAuth, "'securitySchemes' is not an object"))?
            .insert(scheme_name.to_string(), scheme.to_security_scheme());

        let requirement = json!([{ scheme_name: scheme.requirement_scopes() }]);
        for (path, method) in &targets {
            if let Some(operation) = operation_mut(value, path, method) {
                operation.insert("security".to_string(), requirement.clone());
                bound += 1;
            }
        }
        Ok(())
    })?;

    log::info!("Bound security scheme '{}' to {} operation(s)", scheme_name, bound);
    Ok(bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openapi::operations::{resolve_auth, AuthDescriptor};

    fn doc() -> SpecDocument {
        SpecDocument::new(
            json!({
                "openapi": "3.0.3",
                "info": {"title": "T", "version": "1"},
                "paths": {
                    "/pets": {
                        "get": {"operationId": "listPets", "security": [{"old": []}]},
                        "post": {"operationId": "createPet"}
                    },
                    "/owners/{id}": {"get": {}}
                }
            }),
            false,
        )
    }

    #[test]
    fn test_inject_api_key() -> crate::Result<()> {
        let mut doc = doc();
        let scheme = AuthSchemeSpec::ApiKey {
            name: "X-Api-Key".to_string(),
            location: ApiKeyLocation::Header,
        };
        let bound = inject(
            &mut doc,
            "apiKey",
            &scheme,
            &["listPets".to_string(), "getOwnersId".to_string()],
        )?;
        assert_eq!(bound, 2);

        let value = doc.unresolved();
        assert_eq!(value["components"]["securitySchemes"]["apiKey"]["in"], "header");
        assert_eq!(value["paths"]["/pets"]["get"]["security"], json!([{"apiKey": []}]));
        assert!(value["paths"]["/pets"]["post"].get("security").is_none());
        assert_eq!(
            value["paths"]["/owners/{id}"]["get"]["security"],
            json!([{"apiKey": []}])
        );

        // The dereferenced view is rebuilt from the mutated document
        let deref = doc.dereferenced();
        assert!(matches!(
            resolve_auth(deref, &deref["paths"]["/pets"]["get"]),
            Ok(AuthDescriptor::Single(ref s)) if s.is_api_key()
        ));
        Ok(())
    }

    #[test]
    fn test_inject_oauth2_scopes() -> crate::Result<()> {
        let mut doc = doc();
        let scheme = AuthSchemeSpec::OAuth2 {
            authorization_url: "https://login.example.com/authorize".into(),
            token_url: "https://login.example.com/token".into(),
            refresh_url: None,
            scopes: BTreeMap::from([("read".to_string(), "Read".to_string())]),
        };
        inject(&mut doc, "oauth", &scheme, &["createPet".to_string()])?;
        let value = doc.unresolved();
        assert_eq!(
            value["paths"]["/pets"]["post"]["security"],
            json!([{"oauth": ["read"]}])
        );
        assert_eq!(
            value["components"]["securitySchemes"]["oauth"]["flows"]["authorizationCode"]["tokenUrl"],
            "https://login.example.com/token"
        );
        Ok(())
    }

    #[test]
    fn test_bearer_rendering() {
        let scheme = AuthSchemeSpec::Bearer {
            bearer_format: Some("JWT".into()),
        };
        assert_eq!(
            scheme.to_security_scheme(),
            json!({"type": "http", "scheme": "bearer", "bearerFormat": "JWT"})
        );
    }
}
