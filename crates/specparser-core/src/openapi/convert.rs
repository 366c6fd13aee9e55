//! Swagger 2.0 to OpenAPI 3.0 conversion.
//!
//! Only the parts of a Swagger document that carry operation semantics are
//! converted: servers, parameters, request bodies, responses, schemas and
//! security definitions. Everything else is copied through unchanged.

use serde_json::{json, Map, Value as JsonValue};

use super::document::HTTP_METHODS;

/// Version tag written into converted documents
pub const CONVERTED_OPENAPI_VERSION: &str = "3.0.3";

const DEFAULT_MEDIA_TYPE: &str = "application/json";

/// Schema keywords that live directly on Swagger 2.0 non-body parameters
const PARAMETER_SCHEMA_KEYS: [&str; 16] = [
    "type",
    "format",
    "items",
    "enum",
    "default",
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "minLength",
    "maxLength",
    "pattern",
    "minItems",
    "maxItems",
    "uniqueItems",
    "multipleOf",
];

/// Whether the document declares itself as Swagger 2.x
pub fn is_swagger2(value: &JsonValue) -> bool {
    value
        .get("swagger")
        .and_then(JsonValue::as_str)
        .is_some_and(|v| v.starts_with('2'))
}

/// Convert a Swagger 2.0 document to OpenAPI 3.0
pub fn convert_swagger2(doc: &JsonValue) -> crate::Result<JsonValue> {
    let source = doc
        .as_object()
        .ok_or_else(|| crate::Error::spec_not_valid("Swagger document must be an object"))?;

    let global_consumes = string_list(source.get("consumes"));
    let global_produces = string_list(source.get("produces"));
    let global_params = source
        .get("parameters")
        .and_then(JsonValue::as_object)
        .cloned()
        .unwrap_or_default();

    let mut out = Map::new();
    out.insert("openapi".into(), json!(CONVERTED_OPENAPI_VERSION));

    for (key, value) in source {
        match key.as_str() {
            "info" | "tags" | "externalDocs" | "security" => {
                out.insert(key.clone(), value.clone());
            }
            k if k.starts_with("x-") => {
                out.insert(key.clone(), value.clone());
            }
            _ => {}
        }
    }

    let servers = convert_servers(source);
    if !servers.is_empty() {
        out.insert("servers".into(), JsonValue::Array(servers));
    }

    let mut paths = Map::new();
    if let Some(source_paths) = source.get("paths").and_then(JsonValue::as_object) {
        for (path, item) in source_paths {
            let ctx = OperationContext {
                global_params: &global_params,
                consumes: &global_consumes,
                produces: &global_produces,
            };
            paths.insert(path.clone(), ctx.convert_path_item(item));
        }
    }
    out.insert("paths".into(), JsonValue::Object(paths));

    let components = convert_components(source, &global_params, &global_produces);
    if !components.is_empty() {
        out.insert("components".into(), JsonValue::Object(components));
    }

    let mut converted = JsonValue::Object(out);
    rewrite_refs(&mut converted, &global_params);
    Ok(converted)
}

fn string_list(value: Option<&JsonValue>) -> Vec<String> {
    value
        .and_then(JsonValue::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(JsonValue::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn convert_servers(source: &Map<String, JsonValue>) -> Vec<JsonValue> {
    let base_path = source
        .get("basePath")
        .and_then(JsonValue::as_str)
        .unwrap_or("");
    let Some(host) = source.get("host").and_then(JsonValue::as_str) else {
        if base_path.is_empty() {
            return Vec::new();
        }
        return vec![json!({ "url": base_path })];
    };

    let mut schemes = string_list(source.get("schemes"));
    if schemes.is_empty() {
        schemes.push("https".into());
    }
    // Prefer https when the document lists it
    schemes.sort_by_key(|s| s != "https");
    schemes
        .iter()
        .map(|scheme| json!({ "url": format!("{}://{}{}", scheme, host, base_path) }))
        .collect()
}

fn is_body_param(param: &JsonValue) -> bool {
    param.get("in").and_then(JsonValue::as_str) == Some("body")
}

fn is_form_param(param: &JsonValue) -> bool {
    param.get("in").and_then(JsonValue::as_str) == Some("formData")
}

/// Convert a non-body parameter: schema keywords move under `schema`
fn convert_parameter(param: &JsonValue) -> JsonValue {
    let Some(map) = param.as_object() else {
        return param.clone();
    };
    if map.contains_key("$ref") {
        return param.clone();
    }

    let mut out = Map::new();
    let mut schema = Map::new();
    for (key, value) in map {
        if PARAMETER_SCHEMA_KEYS.contains(&key.as_str()) {
            schema.insert(key.clone(), value.clone());
        } else if key == "collectionFormat" {
            let location = map.get("in").and_then(JsonValue::as_str).unwrap_or("");
            match value.as_str() {
                Some("multi") => {
                    out.insert("style".into(), json!("form"));
                    out.insert("explode".into(), json!(true));
                }
                Some("csv") if location == "query" => {
                    out.insert("style".into(), json!("form"));
                    out.insert("explode".into(), json!(false));
                }
                Some("csv") => {
                    out.insert("style".into(), json!("simple"));
                }
                Some("ssv") => {
                    out.insert("style".into(), json!("spaceDelimited"));
                }
                Some("pipes") => {
                    out.insert("style".into(), json!("pipeDelimited"));
                }
                _ => {}
            }
        } else {
            out.insert(key.clone(), value.clone());
        }
    }
    if !schema.is_empty() {
        out.insert("schema".into(), JsonValue::Object(schema));
    }
    JsonValue::Object(out)
}

/// Convert a body parameter to a request body object
fn body_to_request_body(param: &JsonValue, consumes: &[String]) -> JsonValue {
    let schema = param.get("schema").cloned().unwrap_or_else(|| json!({}));
    let mut content = Map::new();
    for media in media_types_or_default(consumes) {
        content.insert(media, json!({ "schema": schema }));
    }
    let mut body = Map::new();
    if let Some(description) = param.get("description") {
        body.insert("description".into(), description.clone());
    }
    if let Some(required) = param.get("required") {
        body.insert("required".into(), required.clone());
    }
    body.insert("content".into(), JsonValue::Object(content));
    JsonValue::Object(body)
}

/// Fold formData parameters into one object schema request body
fn form_to_request_body(params: &[JsonValue], consumes: &[String]) -> JsonValue {
    let mut properties = Map::new();
    let mut required = Vec::new();
    let mut has_file = false;
    for param in params {
        let Some(name) = param.get("name").and_then(JsonValue::as_str) else {
            continue;
        };
        let mut schema = convert_parameter(param)
            .get("schema")
            .cloned()
            .unwrap_or_else(|| json!({}));
        if schema.get("type").and_then(JsonValue::as_str) == Some("file") {
            has_file = true;
            schema = json!({ "type": "string", "format": "binary" });
        }
        if let (Some(description), Some(obj)) = (param.get("description"), schema.as_object_mut()) {
            obj.insert("description".into(), description.clone());
        }
        if param.get("required").and_then(JsonValue::as_bool) == Some(true) {
            required.push(json!(name));
        }
        properties.insert(name.to_string(), schema);
    }

    let media = consumes
        .iter()
        .find(|m| m.as_str() == "multipart/form-data" || m.as_str() == "application/x-www-form-urlencoded")
        .cloned()
        .unwrap_or_else(|| {
            if has_file {
                "multipart/form-data".to_string()
            } else {
                "application/x-www-form-urlencoded".to_string()
            }
        });

    let mut schema = Map::new();
    schema.insert("type".into(), json!("object"));
    schema.insert("properties".into(), JsonValue::Object(properties));
    if !required.is_empty() {
        schema.insert("required".into(), JsonValue::Array(required));
    }
    json!({ "content": { media: { "schema": schema } } })
}

fn media_types_or_default(types: &[String]) -> Vec<String> {
    if types.is_empty() {
        vec![DEFAULT_MEDIA_TYPE.to_string()]
    } else {
        types.to_vec()
    }
}

fn convert_response(response: &JsonValue, produces: &[String]) -> JsonValue {
    let Some(map) = response.as_object() else {
        return response.clone();
    };
    if map.contains_key("$ref") {
        return response.clone();
    }

    let mut out = Map::new();
    for (key, value) in map {
        match key.as_str() {
            "schema" => {
                let mut content = Map::new();
                for media in media_types_or_default(produces) {
                    let mut media_obj = Map::new();
                    media_obj.insert("schema".into(), value.clone());
                    if let Some(example) = map
                        .get("examples")
                        .and_then(|e| e.get(media.as_str()))
                    {
                        media_obj.insert("example".into(), example.clone());
                    }
                    content.insert(media, JsonValue::Object(media_obj));
                }
                out.insert("content".into(), JsonValue::Object(content));
            }
            "examples" => {}
            "headers" => {
                let headers = value
                    .as_object()
                    .map(|h| {
                        h.iter()
                            .map(|(name, header)| {
                                let mut converted = convert_parameter(header);
                                if let Some(obj) = converted.as_object_mut() {
                                    obj.remove("in");
                                    obj.remove("name");
                                }
                                (name.clone(), converted)
                            })
                            .collect::<Map<String, JsonValue>>()
                    })
                    .unwrap_or_default();
                out.insert("headers".into(), JsonValue::Object(headers));
            }
            _ => {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    if !out.contains_key("description") {
        out.insert("description".into(), json!(""));
    }
    JsonValue::Object(out)
}

struct OperationContext<'a> {
    global_params: &'a Map<String, JsonValue>,
    consumes: &'a [String],
    produces: &'a [String],
}

impl OperationContext<'_> {
    /// Look through a `#/parameters/x` reference to the global parameter
    fn dereference_param<'p>(&'p self, param: &'p JsonValue) -> &'p JsonValue {
        param
            .get("$ref")
            .and_then(JsonValue::as_str)
            .and_then(|r| r.strip_prefix("#/parameters/"))
            .and_then(|name| self.global_params.get(name))
            .unwrap_or(param)
    }

    fn convert_path_item(&self, item: &JsonValue) -> JsonValue {
        let Some(map) = item.as_object() else {
            return item.clone();
        };
        let path_params: Vec<JsonValue> = map
            .get("parameters")
            .and_then(JsonValue::as_array)
            .cloned()
            .unwrap_or_default();

        let mut out = Map::new();
        for (key, value) in map {
            if HTTP_METHODS.contains(&key.as_str()) {
                out.insert(key.clone(), self.convert_operation(value, &path_params));
            } else if key == "parameters" {
                let kept: Vec<JsonValue> = path_params
                    .iter()
                    .filter(|p| {
                        let resolved = self.dereference_param(p);
                        !is_body_param(resolved) && !is_form_param(resolved)
                    })
                    .map(convert_parameter)
                    .collect();
                if !kept.is_empty() {
                    out.insert(key.clone(), JsonValue::Array(kept));
                }
            } else {
                out.insert(key.clone(), value.clone());
            }
        }
        JsonValue::Object(out)
    }

    fn convert_operation(&self, op: &JsonValue, path_params: &[JsonValue]) -> JsonValue {
        let Some(map) = op.as_object() else {
            return op.clone();
        };
        let consumes = map
            .get("consumes")
            .map(|c| string_list(Some(c)))
            .unwrap_or_else(|| self.consumes.to_vec());
        let produces = map
            .get("produces")
            .map(|p| string_list(Some(p)))
            .unwrap_or_else(|| self.produces.to_vec());

        let op_params: Vec<JsonValue> = map
            .get("parameters")
            .and_then(JsonValue::as_array)
            .cloned()
            .unwrap_or_default();

        let mut parameters = Vec::new();
        let mut body: Option<JsonValue> = None;
        let mut form_params = Vec::new();

        // Path-level body/form parameters apply to every operation
        let inherited = path_params.iter().filter(|p| {
            let resolved = self.dereference_param(p);
            is_body_param(resolved) || is_form_param(resolved)
        });
        for param in inherited.chain(op_params.iter()) {
            let resolved = self.dereference_param(param);
            if is_body_param(resolved) {
                body = Some(match param.get("$ref").and_then(JsonValue::as_str) {
                    Some(r) => json!({ "$ref": r.replace("#/parameters/", "#/components/requestBodies/") }),
                    None => body_to_request_body(param, &consumes),
                });
            } else if is_form_param(resolved) {
                form_params.push(resolved.clone());
            } else {
                parameters.push(convert_parameter(param));
            }
        }
        if !form_params.is_empty() {
            body = Some(form_to_request_body(&form_params, &consumes));
        }

        let mut out = Map::new();
        for (key, value) in map {
            match key.as_str() {
                "consumes" | "produces" | "schemes" => {}
                "parameters" => {
                    if !parameters.is_empty() {
                        out.insert(key.clone(), JsonValue::Array(parameters.clone()));
                    }
                }
                "responses" => {
                    let responses = value
                        .as_object()
                        .map(|r| {
                            r.iter()
                                .map(|(code, resp)| (code.clone(), convert_response(resp, &produces)))
                                .collect::<Map<String, JsonValue>>()
                        })
                        .unwrap_or_default();
                    out.insert(key.clone(), JsonValue::Object(responses));
                }
                _ => {
                    out.insert(key.clone(), value.clone());
                }
            }
        }
        if !out.contains_key("parameters") && !parameters.is_empty() {
            out.insert("parameters".into(), JsonValue::Array(parameters));
        }
        if let Some(body) = body {
            out.insert("requestBody".into(), body);
        }
        JsonValue::Object(out)
    }
}

fn convert_components(
    source: &Map<String, JsonValue>,
    global_params: &Map<String, JsonValue>,
    produces: &[String],
) -> Map<String, JsonValue> {
    let mut components = Map::new();

    if let Some(definitions) = source.get("definitions").filter(|d| d.is_object()) {
        components.insert("schemas".into(), definitions.clone());
    }

    let mut parameters = Map::new();
    let mut request_bodies = Map::new();
    for (name, param) in global_params {
        if is_body_param(param) {
            request_bodies.insert(name.clone(), body_to_request_body(param, &[]));
        } else if !is_form_param(param) {
            parameters.insert(name.clone(), convert_parameter(param));
        }
    }
    if !parameters.is_empty() {
        components.insert("parameters".into(), JsonValue::Object(parameters));
    }
    if !request_bodies.is_empty() {
        components.insert("requestBodies".into(), JsonValue::Object(request_bodies));
    }

    if let Some(responses) = source.get("responses").and_then(JsonValue::as_object) {
        let converted: Map<String, JsonValue> = responses
            .iter()
            .map(|(name, resp)| (name.clone(), convert_response(resp, produces)))
            .collect();
        components.insert("responses".into(), JsonValue::Object(converted));
    }

    if let Some(definitions) = source.get("securityDefinitions").and_then(JsonValue::as_object) {
        let schemes: Map<String, JsonValue> = definitions
            .iter()
            .map(|(name, def)| (name.clone(), convert_security_scheme(def)))
            .collect();
        components.insert("securitySchemes".into(), JsonValue::Object(schemes));
    }

    components
}

fn convert_security_scheme(def: &JsonValue) -> JsonValue {
    let scheme_type = def.get("type").and_then(JsonValue::as_str).unwrap_or("");
    let mut out = match scheme_type {
        "basic" => json!({ "type": "http", "scheme": "basic" }),
        "apiKey" => json!({
            "type": "apiKey",
            "name": def.get("name").cloned().unwrap_or(JsonValue::Null),
            "in": def.get("in").cloned().unwrap_or(JsonValue::Null),
        }),
        "oauth2" => {
            let scopes = def.get("scopes").cloned().unwrap_or_else(|| json!({}));
            let authorization_url = def.get("authorizationUrl").cloned();
            let token_url = def.get("tokenUrl").cloned();
            let (flow_name, mut flow) = match def.get("flow").and_then(JsonValue::as_str) {
                Some("implicit") => ("implicit", Map::new()),
                Some("password") => ("password", Map::new()),
                Some("application") => ("clientCredentials", Map::new()),
                _ => ("authorizationCode", Map::new()),
            };
            if matches!(flow_name, "implicit" | "authorizationCode") {
                if let Some(url) = authorization_url {
                    flow.insert("authorizationUrl".into(), url);
                }
            }
            if flow_name != "implicit" {
                if let Some(url) = token_url {
                    flow.insert("tokenUrl".into(), url);
                }
            }
            flow.insert("scopes".into(), scopes);
            json!({ "type": "oauth2", "flows": { flow_name: flow } })
        }
        _ => def.clone(),
    };
    if let (Some(description), Some(obj)) = (def.get("description"), out.as_object_mut()) {
        obj.insert("description".into(), description.clone());
    }
    out
}

/// Point every Swagger-style reference at its OpenAPI 3 location
fn rewrite_refs(value: &mut JsonValue, global_params: &Map<String, JsonValue>) {
    match value {
        JsonValue::Object(map) => {
            if let Some(JsonValue::String(reference)) = map.get_mut("$ref") {
                if let Some(name) = reference.strip_prefix("#/definitions/") {
                    *reference = format!("#/components/schemas/{}", name);
                } else if let Some(name) = reference.strip_prefix("#/parameters/") {
                    let target = if global_params.get(name).is_some_and(is_body_param) {
                        "requestBodies"
                    } else {
                        "parameters"
                    };
                    *reference = format!("#/components/{}/{}", target, name);
                } else if let Some(name) = reference.strip_prefix("#/responses/") {
                    *reference = format!("#/components/responses/{}", name);
                }
            }
            for v in map.values_mut() {
                rewrite_refs(v, global_params);
            }
        }
        JsonValue::Array(arr) => {
            for v in arr {
                rewrite_refs(v, global_params);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn petstore_v2() -> JsonValue {
        json!({
            "swagger": "2.0",
            "info": {"title": "Petstore", "version": "1.0.0"},
            "host": "petstore.example.com",
            "basePath": "/v2",
            "schemes": ["http", "https"],
            "paths": {
                "/pets": {
                    "get": {
                        "operationId": "listPets",
                        "parameters": [
                            {"name": "limit", "in": "query", "type": "integer", "format": "int32"},
                            {"$ref": "#/parameters/tagParam"}
                        ],
                        "responses": {"200": {"description": "ok", "schema": {
                            "type": "array", "items": {"$ref": "#/definitions/Pet"}
                        }}}
                    },
                    "post": {
                        "operationId": "createPet",
                        "consumes": ["application/json"],
                        "parameters": [{"name": "pet", "in": "body", "required": true,
                            "schema": {"$ref": "#/definitions/Pet"}}],
                        "responses": {"201": {"description": "created"}}
                    }
                },
                "/pets/{petId}/photo": {
                    "post": {
                        "parameters": [
                            {"name": "petId", "in": "path", "required": true, "type": "string"},
                            {"name": "file", "in": "formData", "type": "file", "required": true}
                        ],
                        "responses": {"200": {"description": "ok"}}
                    }
                }
            },
            "parameters": {"tagParam": {"name": "tag", "in": "query", "type": "string"}},
            "definitions": {"Pet": {"type": "object", "properties": {"name": {"type": "string"}}}},
            "securityDefinitions": {
                "key": {"type": "apiKey", "name": "X-Key", "in": "header"},
                "basicAuth": {"type": "basic"},
                "oauth": {"type": "oauth2", "flow": "accessCode",
                    "authorizationUrl": "https://auth.example.com/authorize",
                    "tokenUrl": "https://auth.example.com/token",
                    "scopes": {"read": "read pets"}}
            }
        })
    }

    #[test]
    fn test_is_swagger2() {
        assert!(is_swagger2(&petstore_v2()));
        assert!(!is_swagger2(&json!({"openapi": "3.0.0"})));
    }

    #[test]
    fn test_servers_prefer_https() -> crate::Result<()> {
        let out = convert_swagger2(&petstore_v2())?;
        assert_eq!(out["openapi"], CONVERTED_OPENAPI_VERSION);
        assert_eq!(out["servers"][0]["url"], "https://petstore.example.com/v2");
        assert_eq!(out["servers"][1]["url"], "http://petstore.example.com/v2");
        Ok(())
    }

    #[test]
    fn test_operations_keep_semantics() -> crate::Result<()> {
        let out = convert_swagger2(&petstore_v2())?;
        let get = &out["paths"]["/pets"]["get"];
        assert_eq!(get["operationId"], "listPets");
        assert_eq!(get["parameters"][0]["schema"], json!({"type": "integer", "format": "int32"}));
        assert_eq!(get["parameters"][1]["$ref"], "#/components/parameters/tagParam");
        assert_eq!(
            get["responses"]["200"]["content"]["application/json"]["schema"]["items"]["$ref"],
            "#/components/schemas/Pet"
        );

        let post = &out["paths"]["/pets"]["post"];
        assert!(post.get("parameters").is_none());
        assert_eq!(post["requestBody"]["required"], true);
        assert_eq!(
            post["requestBody"]["content"]["application/json"]["schema"]["$ref"],
            "#/components/schemas/Pet"
        );

        let upload = &out["paths"]["/pets/{petId}/photo"]["post"];
        let form = &upload["requestBody"]["content"]["multipart/form-data"]["schema"];
        assert_eq!(form["properties"]["file"]["format"], "binary");
        assert_eq!(form["required"], json!(["file"]));
        assert_eq!(upload["parameters"].as_array().map(Vec::len), Some(1));
        Ok(())
    }

    #[test]
    fn test_security_definitions() -> crate::Result<()> {
        let out = convert_swagger2(&petstore_v2())?;
        let schemes = &out["components"]["securitySchemes"];
        assert_eq!(schemes["key"], json!({"type": "apiKey", "name": "X-Key", "in": "header"}));
        assert_eq!(schemes["basicAuth"], json!({"type": "http", "scheme": "basic"}));
        let flow = &schemes["oauth"]["flows"]["authorizationCode"];
        assert_eq!(flow["tokenUrl"], "https://auth.example.com/token");
        assert_eq!(flow["scopes"]["read"], "read pets");
        assert_eq!(out["components"]["schemas"]["Pet"]["type"], "object");
        Ok(())
    }

    #[test]
    fn test_relative_server_without_host() -> crate::Result<()> {
        let out = convert_swagger2(&json!({"swagger": "2.0", "basePath": "/api", "paths": {}}))?;
        assert_eq!(out["servers"], json!([{"url": "/api"}]));
        Ok(())
    }
}
