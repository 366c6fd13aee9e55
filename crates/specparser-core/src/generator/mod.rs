//! Artifact generation: sanitized documents, manifests and card templates.
//!
//! Every generation mode runs the same preparation over a filtered document
//! ([`prepare`]): operationIds are sanitized, operations are indexed with the active
//! policy and grouped by auth. Card generation is isolated per operation, so one
//! failing card is recorded as a warning and the batch carries on.

pub mod cards;
pub mod manifest;
pub mod plugin;
pub mod sanitize;
pub mod starters;

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::ParseOptions;
use crate::error::{WarningDetail, WarningKind};
use crate::openapi::{index_operations, OperationEntry, OperationIndex, SpecDocument};
use crate::utils::relative_path;
use crate::validator::policy::OperationPolicy;
use cards::{write_card, CardGenerator};
use plugin::{FunctionCapabilities, PluginManifest, ResponseSemantics};
use sanitize::{group_by_auth, sanitize_operation_ids, AuthGroup};

/// Outcome of a generation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResult {
    /// False when at least one card could not be generated
    pub all_success: bool,
    pub warnings: Vec<WarningDetail>,
}

impl Default for GenerateResult {
    fn default() -> Self {
        Self {
            all_success: true,
            warnings: Vec::new(),
        }
    }
}

/// How card files are written when a file of the same name exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStorage {
    /// Write to the first free name (`name`, `name1`, `name2`...)
    #[default]
    CreateNew,
    /// Reuse an existing `<name>.json` untouched
    KeepExisting,
}

/// A written card and the response path it renders
#[derive(Debug, Clone, PartialEq)]
pub struct CardRef {
    /// Card file path relative to the referencing manifest
    pub file: String,
    pub json_path: String,
}

/// A filtered document ready for artifact generation
#[derive(Debug, Clone)]
pub struct Prepared {
    pub document: SpecDocument,
    pub index: OperationIndex,
    /// Operations with an allowed method, in document order
    pub operations: Vec<OperationEntry>,
    pub auth_groups: Vec<AuthGroup>,
    pub result: GenerateResult,
}

/// Sanitize, index and group a filtered document
pub fn prepare(
    filtered: &SpecDocument,
    options: &ParseOptions,
    policy: &dyn OperationPolicy,
) -> crate::Result<Prepared> {
    let mut result = GenerateResult::default();
    let (document, renames) = sanitize_operation_ids(filtered)?;
    result.warnings.extend(renames);

    let index = index_operations(&document, options, policy);
    let operations: Vec<OperationEntry> = index
        .iter()
        .filter(|entry| options.is_method_allowed(&entry.method))
        .cloned()
        .collect();
    let (auth_groups, auth_warnings) = group_by_auth(
        &index,
        operations.iter().map(|e| e.operation_id.as_str()),
        policy,
        options,
    );
    result.warnings.extend(auth_warnings);

    Ok(Prepared {
        document,
        index,
        operations,
        auth_groups,
        result,
    })
}

/// Generate and write one card per operation, recording failures as warnings.
///
/// Returned card paths are relative to `reference_dir`.
pub async fn generate_cards<'a>(
    document: &SpecDocument,
    operations: impl IntoIterator<Item = &'a OperationEntry>,
    generator: &dyn CardGenerator,
    card_folder: &Path,
    reference_dir: &Path,
    storage: CardStorage,
    result: &mut GenerateResult,
) -> crate::Result<HashMap<String, CardRef>> {
    let mut cards = HashMap::new();
    let dereferenced = document.dereferenced();

    for entry in operations {
        let operation = dereferenced
            .get("paths")
            .and_then(|paths| paths.get(&entry.path))
            .and_then(|item| item.get(entry.method.to_lowercase()))
            .unwrap_or(&serde_json::Value::Null);

        let written = async {
            let card = generator.generate(operation)?;
            let path = write_card(card_folder, &entry.operation_id, &card, storage).await?;
            Ok::<_, crate::Error>(CardRef {
                file: relative_path(reference_dir, &path)?,
                json_path: card.json_path,
            })
        }
        .await;

        match written {
            Ok(card) => {
                cards.insert(entry.operation_id.clone(), card);
            }
            Err(e) => {
                log::warn!("Failed to generate card for {}: {}", entry.operation_id, e);
                result.all_success = false;
                result.warnings.push(
                    WarningDetail::new(
                        WarningKind::GenerateCardFailed,
                        format!("Failed to generate card for '{}': {}", entry.operation_id, e),
                    )
                    .with_data(json!(entry.operation_id)),
                );
            }
        }
    }
    Ok(cards)
}

/// Attach response semantics for the generated cards to plugin functions
pub fn attach_response_semantics(plugin: &mut PluginManifest, cards: &HashMap<String, CardRef>) {
    for function in &mut plugin.functions {
        let Some(card) = cards.get(&function.name) else {
            continue;
        };
        let data_path = if card.json_path == "$" {
            "$".to_string()
        } else {
            format!("$.{}", card.json_path)
        };
        let semantics = function
            .capabilities
            .get_or_insert_with(FunctionCapabilities::default)
            .response_semantics
            .get_or_insert_with(ResponseSemantics::default);
        semantics.data_path = data_path;
        semantics.static_template = json!({"file": card.file});
    }
}
