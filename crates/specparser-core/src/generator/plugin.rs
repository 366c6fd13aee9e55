//! The API plugin manifest format.
//!
//! Only the fields the generator reads or writes are typed. Everything else is kept
//! in the `extra` maps so that updating an existing manifest does not drop content.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tokio::fs;

/// Schema version written into new plugin manifests
pub const PLUGIN_SCHEMA_VERSION: &str = "v2.1";

/// Root of a plugin manifest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub schema_version: String,
    pub name_for_human: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_for_human: Option<String>,
    #[serde(default)]
    pub functions: Vec<PluginFunction>,
    #[serde(default)]
    pub runtimes: Vec<PluginRuntime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<PluginCapabilities>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl PluginManifest {
    /// Read a plugin manifest from disk
    pub async fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = fs::read_to_string(path.as_ref()).await?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the manifest as pretty JSON, creating parent directories as needed
    pub async fn save<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?).await?;
        Ok(())
    }

    pub fn function(&self, name: &str) -> Option<&PluginFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Conversation starters declared by the plugin
    pub fn conversation_starters(&self) -> &[ConversationStarter] {
        self.capabilities
            .as_ref()
            .map(|c| c.conversation_starters.as_slice())
            .unwrap_or_default()
    }
}

/// Plugin-level capabilities
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginCapabilities {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conversation_starters: Vec<ConversationStarter>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// A suggested first prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationStarter {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// One callable operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginFunction {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<FunctionCapabilities>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl PluginFunction {
    pub fn has_response_semantics(&self) -> bool {
        self.capabilities
            .as_ref()
            .is_some_and(|c| c.response_semantics.is_some())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_semantics: Option<ResponseSemantics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<Confirmation>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// How the response of a function is rendered
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseSemantics {
    pub data_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<ResponseSemanticsProperties>,
    /// Either an inline card or `{"file": "<path>"}`
    pub static_template: JsonValue,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseSemanticsProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// Prompt shown before a function with side effects runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Confirmation {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub body: String,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// How a group of functions is executed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginRuntime {
    #[serde(rename = "type")]
    pub kind: String,
    pub auth: RuntimeAuth,
    pub spec: RuntimeSpec,
    #[serde(default)]
    pub run_for_functions: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeAuth {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSpec {
    pub url: String,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}
