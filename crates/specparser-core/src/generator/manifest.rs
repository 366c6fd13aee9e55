//! Patching the Teams app manifest and producing API plugin manifests.

use std::collections::HashMap;

use serde_json::{json, Map, Value as JsonValue};

use super::plugin::{
    Confirmation, FunctionCapabilities, PluginFunction, PluginManifest, PluginRuntime, RuntimeAuth,
    RuntimeSpec, PLUGIN_SCHEMA_VERSION,
};
use super::sanitize::AuthGroup;
use crate::config::{AuthKind, ParseOptions};
use crate::error::{Error, Stage, WarningDetail, WarningKind};
use crate::openapi::document::operation_parameters;
use crate::openapi::operations::{operation_key, AuthScheme, OperationEntry};
use crate::openapi::SpecDocument;
use crate::utils::to_snake_case;
use crate::validator::policy::auth_kind_of;

const COMMAND_TITLE_MAX: usize = 32;
const COMMAND_DESCRIPTION_MAX: usize = 128;

/// Everything a manifest update needs to know about the generated API
#[derive(Debug, Clone, Copy)]
pub struct ManifestInput<'a> {
    /// The sanitized, filtered document
    pub document: &'a SpecDocument,
    /// Operations to expose, in document order
    pub operations: &'a [OperationEntry],
    pub auth_groups: &'a [AuthGroup],
    /// Path of the written document, relative to the manifest being updated
    pub spec_path: &'a str,
    /// Card template path per operationId, relative to the manifest being updated
    pub cards: &'a HashMap<String, String>,
    pub options: &'a ParseOptions,
}

/// Writes generated API information into manifests
pub trait ManifestUpdater: Send + Sync {
    /// Point the app manifest's message extension at the generated document
    fn update_manifest(&self, manifest: &mut JsonValue, input: &ManifestInput<'_>) -> crate::Result<Vec<WarningDetail>>;

    /// Create or update a plugin manifest for the generated document
    fn update_plugin_manifest(
        &self,
        existing: Option<PluginManifest>,
        input: &ManifestInput<'_>,
    ) -> crate::Result<(PluginManifest, Vec<WarningDetail>)>;

    /// Reference the plugin from the app manifest, unless it declares a declarative agent
    fn link_plugin(&self, manifest: &mut JsonValue, plugin_path: &str) -> crate::Result<()>;
}

/// Default updater for Teams app manifests and v2.1 plugin manifests
#[derive(Debug, Clone, Copy, Default)]
pub struct TeamsManifestUpdater;

impl ManifestUpdater for TeamsManifestUpdater {
    fn update_manifest(&self, manifest: &mut JsonValue, input: &ManifestInput<'_>) -> crate::Result<Vec<WarningDetail>> {
        let root = manifest
            .as_object_mut()
            .ok_or_else(|| Error::stage(Stage::Generate, "app manifest is not an object"))?;

        let commands: Vec<JsonValue> = input
            .operations
            .iter()
            .map(|entry| command(entry, input))
            .collect();

        let extensions = root
            .entry("composeExtensions")
            .or_insert_with(|| json!([]));
        let extensions = extensions
            .as_array_mut()
            .ok_or_else(|| Error::stage(Stage::Generate, "'composeExtensions' is not an array"))?;
        if extensions.is_empty() {
            extensions.push(json!({}));
        }
        let extension = extensions[0]
            .as_object_mut()
            .ok_or_else(|| Error::stage(Stage::Generate, "'composeExtensions[0]' is not an object"))?;

        extension.insert("composeExtensionType".to_string(), json!("apiBased"));
        extension.insert("apiSpecificationFile".to_string(), json!(input.spec_path));
        extension.insert("commands".to_string(), JsonValue::Array(commands));
        extension.insert("authorization".to_string(), authorization(input.auth_groups));

        Ok(Vec::new())
    }

    fn update_plugin_manifest(
        &self,
        existing: Option<PluginManifest>,
        input: &ManifestInput<'_>,
    ) -> crate::Result<(PluginManifest, Vec<WarningDetail>)> {
        let doc = input.document;
        let mut plugin = existing.unwrap_or_else(|| PluginManifest {
            schema_version: PLUGIN_SCHEMA_VERSION.to_string(),
            name_for_human: truncate(doc.title().unwrap_or("API plugin"), 20),
            description_for_human: doc.description().map(|d| truncate(d, 100)),
            ..Default::default()
        });

        let mut warnings = Vec::new();
        for entry in input.operations {
            let description = entry.description.clone().or_else(|| entry.summary.clone());
            if description.is_none() {
                warnings.push(
                    WarningDetail::new(
                        WarningKind::FunctionDescriptionMissing,
                        format!("Function '{}' has no description", entry.operation_id),
                    )
                    .with_data(json!(entry.operation_id)),
                );
            }

            let confirmation = (input.options.allow_confirmation && entry.method != "GET")
                .then(|| confirmation(entry, doc));

            let position = match plugin
                .functions
                .iter()
                .position(|f| f.name == entry.operation_id)
            {
                Some(position) => position,
                None => {
                    plugin.functions.push(PluginFunction {
                        name: entry.operation_id.clone(),
                        ..Default::default()
                    });
                    plugin.functions.len() - 1
                }
            };
            let function = &mut plugin.functions[position];
            function.description = Some(description.unwrap_or_default());
            if let Some(mut confirmation) = confirmation {
                let capabilities = function
                    .capabilities
                    .get_or_insert_with(FunctionCapabilities::default);
                if let Some(previous) = capabilities.confirmation.take() {
                    confirmation.extra = previous.extra;
                }
                capabilities.confirmation = Some(confirmation);
            }
        }

        // Runtimes for this document are rebuilt; unknown fields carry over from the
        // runtime they replace
        let (replaced, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut plugin.runtimes)
            .into_iter()
            .partition(|r| r.spec.url == input.spec_path);
        plugin.runtimes = kept;
        for group in input.auth_groups {
            let mut auth = runtime_auth(group.scheme.as_ref());
            let previous = replaced
                .iter()
                .find(|r| r.auth.kind == auth.kind && r.auth.reference_id == auth.reference_id);
            let spec_extra = previous
                .or(replaced.first())
                .map(|r| r.spec.extra.clone())
                .unwrap_or_default();
            if let Some(previous) = previous {
                auth.extra = previous.auth.extra.clone();
            }
            plugin.runtimes.push(PluginRuntime {
                kind: "OpenApi".to_string(),
                auth,
                spec: RuntimeSpec {
                    url: input.spec_path.to_string(),
                    extra: spec_extra,
                },
                run_for_functions: group.operation_ids.clone(),
                extra: previous.map(|r| r.extra.clone()).unwrap_or_default(),
            });
        }

        Ok((plugin, warnings))
    }

    fn link_plugin(&self, manifest: &mut JsonValue, plugin_path: &str) -> crate::Result<()> {
        if is_declarative_agent(manifest) {
            log::debug!("App manifest declares a declarative agent; plugin is not linked");
            return Ok(());
        }
        let root = manifest
            .as_object_mut()
            .ok_or_else(|| Error::stage(Stage::Generate, "app manifest is not an object"))?;
        let extensions = root
            .entry("copilotExtensions")
            .or_insert_with(|| json!({}))
            .as_object_mut()
            .ok_or_else(|| Error::stage(Stage::Generate, "'copilotExtensions' is not an object"))?;
        let plugins = extensions
            .entry("plugins")
            .or_insert_with(|| json!([]))
            .as_array_mut()
            .ok_or_else(|| Error::stage(Stage::Generate, "'copilotExtensions.plugins' is not an array"))?;

        if plugins.iter().any(|p| p.get("file").and_then(JsonValue::as_str) == Some(plugin_path)) {
            return Ok(());
        }
        let id = format!("plugin_{}", plugins.len() + 1);
        plugins.push(json!({"id": id, "file": plugin_path}));
        Ok(())
    }
}

/// Whether an app manifest declares a declarative agent
pub fn is_declarative_agent(manifest: &JsonValue) -> bool {
    let non_empty = |v: Option<&JsonValue>| v.and_then(JsonValue::as_array).is_some_and(|a| !a.is_empty());
    non_empty(manifest.pointer("/copilotExtensions/declarativeCopilots"))
        || non_empty(manifest.pointer("/copilotAgents/declarativeAgents"))
}

/// Environment placeholder holding the registration of a scheme
pub fn registration_id(scheme: &AuthScheme) -> String {
    format!("${{{{{}_REGISTRATION_ID}}}}", to_snake_case(&scheme.name).to_uppercase())
}

fn runtime_auth(scheme: Option<&AuthScheme>) -> RuntimeAuth {
    match scheme.and_then(|s| auth_kind_of(s).map(|kind| (s, kind))) {
        Some((scheme, AuthKind::OAuth2)) => RuntimeAuth {
            kind: "OAuthPluginVault".to_string(),
            reference_id: Some(registration_id(scheme)),
            ..Default::default()
        },
        Some((scheme, _)) => RuntimeAuth {
            kind: "ApiKeyPluginVault".to_string(),
            reference_id: Some(registration_id(scheme)),
            ..Default::default()
        },
        None => RuntimeAuth {
            kind: "None".to_string(),
            ..Default::default()
        },
    }
}

fn authorization(groups: &[AuthGroup]) -> JsonValue {
    let scheme = groups.iter().find_map(|g| g.scheme.as_ref());
    match scheme.and_then(|s| auth_kind_of(s).map(|kind| (s, kind))) {
        Some((scheme, AuthKind::OAuth2)) => json!({
            "authType": "oAuth2.0",
            "oAuthConfiguration": {"oauthConfigurationId": registration_id(scheme)},
        }),
        Some((scheme, _)) => json!({
            "authType": "apiSecretServiceAuth",
            "apiSecretServiceAuthConfiguration": {"apiSecretRegistrationId": registration_id(scheme)},
        }),
        None => json!({"authType": "none"}),
    }
}

fn command(entry: &OperationEntry, input: &ManifestInput<'_>) -> JsonValue {
    let title = entry.summary.clone().unwrap_or_else(|| entry.operation_id.clone());
    let description = entry
        .description
        .clone()
        .or_else(|| entry.summary.clone())
        .unwrap_or_default();

    let mut command = Map::new();
    command.insert("id".to_string(), json!(entry.operation_id));
    command.insert("type".to_string(), json!("query"));
    command.insert("title".to_string(), json!(truncate(&title, COMMAND_TITLE_MAX)));
    command.insert(
        "description".to_string(),
        json!(truncate(&description, COMMAND_DESCRIPTION_MAX)),
    );
    command.insert("context".to_string(), json!(["compose", "commandBox"]));
    command.insert(
        "parameters".to_string(),
        JsonValue::Array(command_parameters(entry, input.document)),
    );
    if let Some(card) = input.cards.get(&entry.operation_id) {
        command.insert("apiResponseRenderingTemplateFile".to_string(), json!(card));
    }
    JsonValue::Object(command)
}

/// Command parameters from the required inputs, falling back to the optional ones
fn command_parameters(entry: &OperationEntry, doc: &SpecDocument) -> Vec<JsonValue> {
    let (required, optional) = operation_inputs(entry, doc);
    let chosen = if required.is_empty() { optional } else { required };
    chosen
        .into_iter()
        .map(|(name, schema, description)| {
            let mut param = json!({
                "name": name,
                "title": truncate(&name, COMMAND_TITLE_MAX),
                "description": truncate(&description, COMMAND_DESCRIPTION_MAX),
                "inputType": input_type(&schema),
            });
            if let Some(choices) = schema.get("enum").and_then(JsonValue::as_array) {
                param["choices"] = choices
                    .iter()
                    .map(|c| {
                        let text = c.as_str().map(String::from).unwrap_or_else(|| c.to_string());
                        json!({"title": text, "value": text})
                    })
                    .collect();
            }
            param
        })
        .collect()
}

type Input = (String, JsonValue, String);

/// Required and optional inputs of an operation: parameters and JSON body properties
fn operation_inputs(entry: &OperationEntry, doc: &SpecDocument) -> (Vec<Input>, Vec<Input>) {
    let mut required = Vec::new();
    let mut optional = Vec::new();
    let key = operation_key(&entry.method, &entry.path);
    let Some((_, _, path_item, operation)) = doc
        .operations()
        .into_iter()
        .find(|(path, method, _, _)| operation_key(method, path) == key)
    else {
        return (required, optional);
    };

    for param in operation_parameters(path_item, operation) {
        if matches!(param.get("in").and_then(JsonValue::as_str), Some("cookie")) {
            continue;
        }
        let Some(name) = param.get("name").and_then(JsonValue::as_str) else {
            continue;
        };
        let input = (
            name.to_string(),
            param.get("schema").cloned().unwrap_or(JsonValue::Null),
            param
                .get("description")
                .and_then(JsonValue::as_str)
                .unwrap_or_default()
                .to_string(),
        );
        if param.get("required").and_then(JsonValue::as_bool).unwrap_or(false) {
            required.push(input);
        } else {
            optional.push(input);
        }
    }

    let body_schema = operation
        .pointer("/requestBody/content")
        .and_then(JsonValue::as_object)
        .and_then(|content| content.values().next())
        .and_then(|media| media.get("schema"));
    if let Some(schema) = body_schema {
        let required_names: Vec<&str> = schema
            .get("required")
            .and_then(JsonValue::as_array)
            .map(|r| r.iter().filter_map(JsonValue::as_str).collect())
            .unwrap_or_default();
        for (name, prop) in schema
            .get("properties")
            .and_then(JsonValue::as_object)
            .into_iter()
            .flatten()
        {
            let input = (
                name.clone(),
                prop.clone(),
                prop.get("description")
                    .and_then(JsonValue::as_str)
                    .unwrap_or_default()
                    .to_string(),
            );
            if required_names.contains(&name.as_str()) {
                required.push(input);
            } else {
                optional.push(input);
            }
        }
    }
    (required, optional)
}

fn input_type(schema: &JsonValue) -> &'static str {
    if schema.get("enum").is_some() {
        return "choiceset";
    }
    match schema.get("type").and_then(JsonValue::as_str) {
        Some("integer") | Some("number") => "number",
        Some("boolean") => "toggle",
        _ => "text",
    }
}

fn confirmation(entry: &OperationEntry, doc: &SpecDocument) -> Confirmation {
    let (required, optional) = operation_inputs(entry, doc);
    let body = required
        .iter()
        .chain(optional.iter())
        .map(|(name, _, _)| format!("* **{}**: {{{{function.parameters.{}}}}}", name, name))
        .collect::<Vec<_>>()
        .join("\n");
    Confirmation {
        kind: "AdaptiveCard".to_string(),
        title: entry.summary.clone().unwrap_or_else(|| entry.operation_id.clone()),
        body,
        ..Default::default()
    }
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectType;
    use crate::openapi::index_operations;
    use crate::validator::policy::policy_for;

    fn doc() -> SpecDocument {
        SpecDocument::new(
            json!({
                "openapi": "3.0.3",
                "info": {"title": "Pet Store", "version": "1", "description": "Pets"},
                "servers": [{"url": "https://pets.example.com"}],
                "components": {"securitySchemes": {
                    "apiKey": {"type": "apiKey", "name": "X-Key", "in": "header"}
                }},
                "paths": {
                    "/pets": {
                        "get": {
                            "operationId": "listPets",
                            "summary": "List pets",
                            "parameters": [
                                {"name": "status", "in": "query", "required": true, "schema": {"type": "string", "enum": ["sold", "available"]}},
                                {"name": "limit", "in": "query", "schema": {"type": "integer"}}
                            ],
                            "security": [{"apiKey": []}]
                        },
                        "post": {
                            "operationId": "createPet",
                            "requestBody": {"content": {"application/json": {"schema": {
                                "type": "object",
                                "properties": {"name": {"type": "string"}, "tag": {"type": "string"}}
                            }}}}
                        }
                    }
                }
            }),
            false,
        )
    }

    fn entries(doc: &SpecDocument) -> Vec<OperationEntry> {
        let options = ParseOptions {
            project_type: ProjectType::TeamsAi,
            ..Default::default()
        };
        let policy = policy_for(options.project_type);
        index_operations(doc, &options, policy.as_ref())
            .iter()
            .cloned()
            .collect()
    }

    fn api_key_group() -> Vec<AuthGroup> {
        vec![
            AuthGroup {
                scheme: Some(AuthScheme {
                    name: "apiKey".into(),
                    scheme_type: "apiKey".into(),
                    parameters: json!({"type": "apiKey", "name": "X-Key", "in": "header"}),
                }),
                operation_ids: vec!["listPets".into()],
            },
            AuthGroup {
                scheme: None,
                operation_ids: vec!["createPet".into()],
            },
        ]
    }

    #[test]
    fn test_update_manifest_commands() -> crate::Result<()> {
        let doc = doc();
        let operations = entries(&doc);
        let groups = api_key_group();
        let cards = HashMap::from([("listPets".to_string(), "adaptiveCards/listPets.json".to_string())]);
        let options = ParseOptions::default();
        let input = ManifestInput {
            document: &doc,
            operations: &operations,
            auth_groups: &groups,
            spec_path: "apiSpecificationFile/openapi.yaml",
            cards: &cards,
            options: &options,
        };

        let mut manifest = json!({"name": {"short": "app"}, "composeExtensions": [{"botId": "x"}]});
        TeamsManifestUpdater.update_manifest(&mut manifest, &input)?;

        let extension = &manifest["composeExtensions"][0];
        assert_eq!(extension["botId"], "x");
        assert_eq!(extension["composeExtensionType"], "apiBased");
        assert_eq!(extension["authorization"]["authType"], "apiSecretServiceAuth");
        assert_eq!(
            extension["authorization"]["apiSecretServiceAuthConfiguration"]["apiSecretRegistrationId"],
            "${{API_KEY_REGISTRATION_ID}}"
        );

        let list = &extension["commands"][0];
        assert_eq!(list["id"], "listPets");
        assert_eq!(list["title"], "List pets");
        assert_eq!(list["apiResponseRenderingTemplateFile"], "adaptiveCards/listPets.json");
        assert_eq!(list["parameters"].as_array().unwrap().len(), 1);
        assert_eq!(list["parameters"][0]["inputType"], "choiceset");

        // No required inputs: optional body properties are used
        let create = &extension["commands"][1];
        assert_eq!(create["parameters"][0]["name"], "name");
        assert_eq!(create["parameters"][1]["name"], "tag");
        Ok(())
    }

    #[test]
    fn test_plugin_manifest() -> crate::Result<()> {
        let doc = doc();
        let operations = entries(&doc);
        let groups = api_key_group();
        let cards = HashMap::new();
        let options = ParseOptions {
            allow_confirmation: true,
            ..Default::default()
        };
        let input = ManifestInput {
            document: &doc,
            operations: &operations,
            auth_groups: &groups,
            spec_path: "apiSpecificationFile/openapi.yaml",
            cards: &cards,
            options: &options,
        };

        let (plugin, warnings) = TeamsManifestUpdater.update_plugin_manifest(None, &input)?;
        assert_eq!(plugin.schema_version, "v2.1");
        assert_eq!(plugin.name_for_human, "Pet Store");
        assert_eq!(plugin.functions.len(), 2);
        assert_eq!(plugin.runtimes.len(), 2);
        assert_eq!(plugin.runtimes[0].auth.kind, "ApiKeyPluginVault");
        assert_eq!(plugin.runtimes[1].auth.kind, "None");
        assert_eq!(plugin.runtimes[1].run_for_functions, vec!["createPet"]);

        let create = plugin.function("createPet").unwrap();
        let confirmation = create.capabilities.as_ref().unwrap().confirmation.as_ref().unwrap();
        assert!(confirmation.body.contains("{{function.parameters.name}}"));
        assert!(plugin.function("listPets").unwrap().capabilities.is_none());

        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::FunctionDescriptionMissing);

        // Updating again replaces this document's runtimes instead of duplicating them
        let mut plugin = plugin;
        plugin.runtimes[0]
            .spec
            .extra
            .insert("progress_style".into(), json!("ShowUsage"));
        plugin.runtimes[0].extra.insert("timeout".into(), json!(30));
        let (again, _) = TeamsManifestUpdater.update_plugin_manifest(Some(plugin), &input)?;
        assert_eq!(again.functions.len(), 2);
        assert_eq!(again.runtimes.len(), 2);
        assert_eq!(again.runtimes[0].spec.extra["progress_style"], "ShowUsage");
        assert_eq!(again.runtimes[0].extra["timeout"], 30);
        assert!(again.runtimes[1].extra.is_empty());
        Ok(())
    }

    #[test]
    fn test_link_plugin() -> crate::Result<()> {
        let mut manifest = json!({"name": {"short": "app"}});
        TeamsManifestUpdater.link_plugin(&mut manifest, "ai-plugin.json")?;
        TeamsManifestUpdater.link_plugin(&mut manifest, "ai-plugin.json")?;
        assert_eq!(
            manifest["copilotExtensions"]["plugins"],
            json!([{"id": "plugin_1", "file": "ai-plugin.json"}])
        );

        let mut agent = json!({"copilotAgents": {"declarativeAgents": [{"id": "a", "file": "da.json"}]}});
        TeamsManifestUpdater.link_plugin(&mut agent, "ai-plugin.json")?;
        assert!(agent.get("copilotExtensions").is_none());
        Ok(())
    }
}
