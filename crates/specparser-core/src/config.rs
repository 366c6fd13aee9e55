//! Parse options for the specparser pipeline.
//!
//! This module defines the `ParseOptions` struct that controls validation policy
//! and generation behavior. Options can be created programmatically or loaded
//! from a YAML (or TOML) file, and are never mutated once a pipeline is built.
//!
//! # Examples
//!
//! ```no_run
//! use specparser_core::config::{AuthKind, ParseOptions, ProjectType};
//!
//! // Create options programmatically
//! let options = ParseOptions {
//!     project_type: ProjectType::Copilot,
//!     allowed_auth: vec![AuthKind::ApiKey, AuthKind::Bearer],
//!     ..Default::default()
//! };
//!
//! // Or load them from a file
//! # async fn load() -> specparser_core::Result<()> {
//! let options = ParseOptions::from_file("specparser.yaml").await?;
//! # Ok(())
//! # }
//! ```

// Internal imports (std, crate)
use std::fmt;
use std::path::Path;
use std::str::FromStr;

// External imports (alphabetized)
use serde::{Deserialize, Deserializer, Serialize};
use serde_value::Value as SerdeValue;
use tokio::fs;

/// Consumer of the generated artifacts; selects the validation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    /// Teams API-based message extension
    #[default]
    MessageExtension,
    /// Copilot API plugin or declarative agent
    Copilot,
    /// Teams AI bot
    TeamsAi,
}

impl ProjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MessageExtension => "message_extension",
            Self::Copilot => "copilot",
            Self::TeamsAi => "teams_ai",
        }
    }
}

impl FromStr for ProjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "message_extension" | "sme" => Ok(Self::MessageExtension),
            "copilot" => Ok(Self::Copilot),
            "teams_ai" | "teamsai" => Ok(Self::TeamsAi),
            _ => Err(format!("Unknown project type: {}", s)),
        }
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Authentication kinds the pipeline knows how to support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    /// `apiKey` scheme sent in a header or query parameter
    ApiKey,
    /// `http` scheme with `bearer`
    Bearer,
    /// `oauth2` scheme with an authorization code flow
    #[serde(rename = "oauth2")]
    OAuth2,
}

impl FromStr for AuthKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "api_key" | "apikey" => Ok(Self::ApiKey),
            "bearer" => Ok(Self::Bearer),
            "oauth2" => Ok(Self::OAuth2),
            _ => Err(format!("Unknown auth kind: {}", s)),
        }
    }
}

/// Options controlling validation and generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// HTTP methods (lowercase) whose operations are supported
    #[serde(deserialize_with = "deserialize_methods")]
    pub allowed_methods: Vec<String>,

    /// Authentication kinds that are supported
    pub allowed_auth: Vec<AuthKind>,

    /// Whether an operation may offer several alternative auth schemes
    pub allow_multiple_auth: bool,

    /// Whether Swagger 2.0 input is accepted
    pub allow_legacy_format: bool,

    /// Upper bound on the number of operations in one generated set
    pub max_operations: Option<usize>,

    /// Consumer of the generated artifacts
    pub project_type: ProjectType,

    /// Generate a plugin manifest instead of a full app manifest
    pub plugin_mode: bool,

    /// Whether operations without an explicit operationId are supported
    pub allow_missing_id: bool,

    /// Whether message extension operations may have several required parameters
    pub allow_multiple_parameters: bool,

    /// Attach response semantics (cards) to plugin functions
    pub allow_response_semantics: bool,

    /// Derive conversation starters for declarative agents
    pub allow_conversation_starters: bool,

    /// Add confirmation prompts to non-GET plugin functions
    pub allow_confirmation: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            allowed_methods: default_methods(),
            allowed_auth: Vec::new(),
            allow_multiple_auth: false,
            allow_legacy_format: false,
            max_operations: None,
            project_type: ProjectType::default(),
            plugin_mode: false,
            allow_missing_id: true,
            allow_multiple_parameters: false,
            allow_response_semantics: false,
            allow_conversation_starters: false,
            allow_confirmation: false,
        }
    }
}

impl ParseOptions {
    /// Load options from a YAML file, or TOML when the extension is `.toml`
    pub async fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await?;
        let options = if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&content).map_err(|e| {
                crate::Error::config(format!(
                    "Invalid TOML in options file {}: {}",
                    path.display(),
                    e
                ))
            })?
        } else {
            serde_yaml::from_str(&content)?
        };
        Ok(options)
    }

    /// Save options to a YAML file
    pub async fn save<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Whether the given method (any case) is allowed
    pub fn is_method_allowed(&self, method: &str) -> bool {
        self.allowed_methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method))
    }

    /// Whether the given auth kind is allowed
    pub fn is_auth_allowed(&self, kind: AuthKind) -> bool {
        self.allowed_auth.contains(&kind)
    }
}

fn default_methods() -> Vec<String> {
    vec!["get".to_string(), "post".to_string()]
}

/// Accept either a single method or a list of methods, normalized to lowercase
fn deserialize_methods<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = SerdeValue::deserialize(deserializer)?;

    match value {
        SerdeValue::String(s) => Ok(vec![s.to_lowercase()]),
        SerdeValue::Seq(seq) => {
            let mut result = Vec::new();
            for item in seq {
                if let SerdeValue::String(s) = item {
                    result.push(s.to_lowercase());
                } else {
                    return Err(serde::de::Error::custom(
                        "Expected string or array of strings",
                    ));
                }
            }
            Ok(result)
        }
        _ => Err(serde::de::Error::custom(
            "Expected string or array of strings",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_options_roundtrip() -> crate::Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("options.yaml");

        let options = ParseOptions {
            project_type: ProjectType::Copilot,
            allowed_auth: vec![AuthKind::OAuth2],
            max_operations: Some(10),
            ..Default::default()
        };
        options.save(&file_path).await?;

        let loaded = ParseOptions::from_file(&file_path).await?;
        assert_eq!(loaded, options);
        assert_eq!(loaded.allowed_methods, vec!["get", "post"]);
        assert!(loaded.allow_missing_id);

        Ok(())
    }

    #[tokio::test]
    async fn test_options_from_partial_yaml() -> crate::Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("options.yml");
        tokio::fs::write(
            &file_path,
            "allowed_methods: DELETE\nallow_legacy_format: true\nproject_type: teams_ai\n",
        )
        .await?;

        let loaded = ParseOptions::from_file(&file_path).await?;
        assert_eq!(loaded.allowed_methods, vec!["delete"]);
        assert!(loaded.allow_legacy_format);
        assert_eq!(loaded.project_type, ProjectType::TeamsAi);
        assert!(loaded.allowed_auth.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_options_from_toml() -> crate::Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("options.toml");
        tokio::fs::write(
            &file_path,
            "allowed_methods = [\"GET\", \"Patch\"]\nallowed_auth = [\"api_key\", \"oauth2\"]\n",
        )
        .await?;

        let loaded = ParseOptions::from_file(&file_path).await?;
        assert_eq!(loaded.allowed_methods, vec!["get", "patch"]);
        assert_eq!(loaded.allowed_auth, vec![AuthKind::ApiKey, AuthKind::OAuth2]);

        Ok(())
    }

    #[test]
    fn test_method_allowed_ignores_case() {
        let options = ParseOptions::default();
        assert!(options.is_method_allowed("GET"));
        assert!(options.is_method_allowed("post"));
        assert!(!options.is_method_allowed("delete"));
    }

    #[test]
    fn test_project_type_from_str() {
        assert_eq!(
            "teams-ai".parse::<ProjectType>().unwrap(),
            ProjectType::TeamsAi
        );
        assert_eq!("SME".parse::<ProjectType>().unwrap(), ProjectType::MessageExtension);
        assert!("other".parse::<ProjectType>().is_err());
    }
}
