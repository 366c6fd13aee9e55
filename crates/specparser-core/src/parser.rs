//! The pipeline facade.
//!
//! A [`SpecParser`] owns one source document and the options it is judged by. The
//! document is loaded on first use and shared by every later call on the same
//! instance.
//!
//! # Examples
//!
//! ```no_run
//! use specparser_core::{ParseOptions, SpecParser};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> specparser_core::Result<()> {
//! let parser = SpecParser::new("openapi.yaml", ParseOptions::default());
//! let validation = parser.validate().await?;
//! println!("status: {:?}", validation.status);
//!
//! let index = parser.list().await?;
//! let selected: Vec<String> = index.valid().map(|e| e.key.clone()).collect();
//! let result = parser
//!     .generate(
//!         "appPackage/manifest.json",
//!         &selected,
//!         "appPackage/apiSpecificationFile/openapi.yaml",
//!         "appPackage/adaptiveCards",
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//! assert!(result.all_success);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value as JsonValue;
use tokio::fs;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::auth::{inject, AuthSchemeSpec};
use crate::config::ParseOptions;
use crate::error::{Error, ErrorDetail, ErrorKind, Stage};
use crate::filter::filter_spec;
use crate::generator::cards::{AdaptiveCardGenerator, CardGenerator};
use crate::generator::manifest::{is_declarative_agent, ManifestInput, ManifestUpdater, TeamsManifestUpdater};
use crate::generator::plugin::PluginManifest;
use crate::generator::sanitize::sanitize_operation_ids;
use crate::generator::starters::{merge_starters, plugin_starters};
use crate::generator::{
    attach_response_semantics, generate_cards, prepare, CardRef, CardStorage, GenerateResult, Prepared,
};
use crate::openapi::{index_operations, load_document, write_document, OperationIndex, SpecDocument, SpecSource};
use crate::utils::relative_path;
use crate::validator::policy::{policy_for, OperationPolicy};
use crate::validator::{servers_fingerprint, validate_with_policy, ValidationResult, ValidationStatus};

/// Folder for response cards, next to the plugin manifest
const PLUGIN_CARD_FOLDER: &str = "adaptiveCards";

/// Loads, validates, filters and generates artifacts from one API description
pub struct SpecParser {
    source: SpecSource,
    options: ParseOptions,
    policy: Box<dyn OperationPolicy>,
    card_generator: Box<dyn CardGenerator>,
    manifest_updater: Box<dyn ManifestUpdater>,
    card_storage: CardStorage,
    document: OnceCell<SpecDocument>,
}

impl SpecParser {
    /// Create a parser; nothing is read until the first call that needs the document
    pub fn new(source: impl Into<SpecSource>, options: ParseOptions) -> Self {
        let policy = policy_for(options.project_type);
        Self {
            source: source.into(),
            options,
            policy,
            card_generator: Box::new(AdaptiveCardGenerator),
            manifest_updater: Box::new(TeamsManifestUpdater),
            card_storage: CardStorage::default(),
            document: OnceCell::new(),
        }
    }

    pub fn with_card_generator(mut self, generator: impl CardGenerator + 'static) -> Self {
        self.card_generator = Box::new(generator);
        self
    }

    pub fn with_manifest_updater(mut self, updater: impl ManifestUpdater + 'static) -> Self {
        self.manifest_updater = Box::new(updater);
        self
    }

    pub fn with_card_storage(mut self, storage: CardStorage) -> Self {
        self.card_storage = storage;
        self
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// The loaded document, reading the source on first call only
    pub async fn document(&self) -> crate::Result<&SpecDocument> {
        self.document
            .get_or_try_init(|| load_document(&self.source))
            .await
    }

    /// Validate the document. Load failures are reported inside the result.
    pub async fn validate(&self) -> crate::Result<ValidationResult> {
        match self.document().await {
            Ok(doc) => Ok(validate_with_policy(doc, &self.options, self.policy.as_ref())),
            Err(Error::SpecNotValid(message)) => Ok(ValidationResult {
                status: ValidationStatus::Error,
                warnings: Vec::new(),
                errors: vec![ErrorDetail::new(ErrorKind::SpecNotValid, message)],
                spec_hash: servers_fingerprint(&JsonValue::Null),
            }),
            Err(e) => Err(e.in_stage(Stage::Validate)),
        }
    }

    /// Index every operation of the document
    pub async fn list(&self) -> crate::Result<OperationIndex> {
        let doc = self.document().await.map_err(|e| e.in_stage(Stage::List))?;
        let index = index_operations(doc, &self.options, self.policy.as_ref());
        log::info!(
            "Found {} operation(s), {} supported",
            index.all_count(),
            index.valid_count()
        );
        Ok(index)
    }

    /// Project the document onto the selected `"{METHOD} {PATH}"` keys
    pub async fn get_filtered_specs(
        &self,
        selected: &[String],
        cancel: &CancellationToken,
    ) -> crate::Result<SpecDocument> {
        self.filtered(selected, cancel)
            .await
            .map_err(|e| e.in_stage(Stage::GetSpec))
    }

    async fn filtered(&self, selected: &[String], cancel: &CancellationToken) -> crate::Result<SpecDocument> {
        check_cancelled(cancel)?;
        let doc = self.document().await?;
        check_cancelled(cancel)?;
        let filtered = filter_spec(doc, selected, self.options.max_operations)?;
        check_cancelled(cancel)?;
        Ok(filtered)
    }

    /// Add a security scheme, bind it to the given operations and write the document.
    ///
    /// The cached document is updated in place. Returns the number of bound operations.
    pub async fn add_auth<P: AsRef<Path>>(
        &mut self,
        output: P,
        scheme_name: &str,
        scheme: &AuthSchemeSpec,
        operation_ids: &[String],
    ) -> crate::Result<usize> {
        let result = async {
            self.document().await?;
            let doc = self
                .document
                .get_mut()
                .ok_or_else(|| Error::stage(Stage::AddAuth, "document is not loaded"))?;
            let bound = inject(doc, scheme_name, scheme, operation_ids)?;
            doc.save(output.as_ref()).await?;
            Ok::<_, Error>(bound)
        }
        .await;
        result.map_err(|e| e.in_stage(Stage::AddAuth))
    }

    /// Run the generation branch selected by `plugin_mode`.
    ///
    /// `output` is the plugin manifest path in plugin mode and the card folder otherwise.
    pub async fn generate_artifacts(
        &self,
        manifest_path: impl AsRef<Path>,
        selected: &[String],
        output_spec_path: impl AsRef<Path>,
        output: impl AsRef<Path>,
        cancel: &CancellationToken,
    ) -> crate::Result<GenerateResult> {
        if self.options.plugin_mode {
            self.generate_for_plugin(manifest_path, selected, output_spec_path, output, cancel)
                .await
        } else {
            self.generate(manifest_path, selected, output_spec_path, output, cancel)
                .await
        }
    }

    /// Write the filtered document and point the app manifest's message extension at it.
    ///
    /// One card template and sample data file is written per operation into `card_folder`.
    pub async fn generate(
        &self,
        manifest_path: impl AsRef<Path>,
        selected: &[String],
        output_spec_path: impl AsRef<Path>,
        card_folder: impl AsRef<Path>,
        cancel: &CancellationToken,
    ) -> crate::Result<GenerateResult> {
        let (manifest_path, output_spec_path, card_folder) =
            (manifest_path.as_ref(), output_spec_path.as_ref(), card_folder.as_ref());
        self.generate_full(manifest_path, selected, output_spec_path, card_folder, cancel)
            .await
            .map_err(|e| e.in_stage(Stage::Generate))
    }

    async fn generate_full(
        &self,
        manifest_path: &Path,
        selected: &[String],
        output_spec_path: &Path,
        card_folder: &Path,
        cancel: &CancellationToken,
    ) -> crate::Result<GenerateResult> {
        let mut prepared = self.prepare(selected, output_spec_path, cancel).await?;
        let manifest_dir = parent_dir(manifest_path);

        let cards = generate_cards(
            &prepared.document,
            &prepared.operations,
            self.card_generator.as_ref(),
            card_folder,
            &manifest_dir,
            self.card_storage,
            &mut prepared.result,
        )
        .await?;

        let mut manifest = read_json(manifest_path).await?;
        let spec_path = relative_path(&manifest_dir, output_spec_path)?;
        let card_files = card_files(&cards);
        let input = self.manifest_input(&prepared, &spec_path, &card_files);
        let warnings = self.manifest_updater.update_manifest(&mut manifest, &input)?;
        prepared.result.warnings.extend(warnings);
        write_json(manifest_path, &manifest).await?;

        log::info!(
            "Generated {} command(s) and {} card(s)",
            prepared.operations.len(),
            cards.len()
        );
        Ok(prepared.result)
    }

    /// Write the filtered document and create or update the plugin manifest for it.
    ///
    /// The app manifest is linked to the plugin. With `allow_response_semantics` cards
    /// are generated next to the plugin and attached to its functions; with
    /// `allow_conversation_starters` a declarative agent referenced by the app manifest
    /// receives starters derived from the plugin.
    pub async fn generate_for_plugin(
        &self,
        manifest_path: impl AsRef<Path>,
        selected: &[String],
        output_spec_path: impl AsRef<Path>,
        plugin_path: impl AsRef<Path>,
        cancel: &CancellationToken,
    ) -> crate::Result<GenerateResult> {
        let (manifest_path, output_spec_path, plugin_path) =
            (manifest_path.as_ref(), output_spec_path.as_ref(), plugin_path.as_ref());
        self.generate_plugin(manifest_path, selected, output_spec_path, plugin_path, cancel)
            .await
            .map_err(|e| e.in_stage(Stage::Generate))
    }

    async fn generate_plugin(
        &self,
        manifest_path: &Path,
        selected: &[String],
        output_spec_path: &Path,
        plugin_path: &Path,
        cancel: &CancellationToken,
    ) -> crate::Result<GenerateResult> {
        let mut prepared = self.prepare(selected, output_spec_path, cancel).await?;
        let plugin_dir = parent_dir(plugin_path);
        let spec_path = relative_path(&plugin_dir, output_spec_path)?;

        let existing = if fs::try_exists(plugin_path).await? {
            Some(PluginManifest::from_file(plugin_path).await?)
        } else {
            None
        };
        let no_cards = HashMap::new();
        let input = self.manifest_input(&prepared, &spec_path, &no_cards);
        let (mut plugin, warnings) = self
            .manifest_updater
            .update_plugin_manifest(existing, &input)?;
        prepared.result.warnings.extend(warnings);

        if self.options.allow_response_semantics {
            let cards = generate_cards(
                &prepared.document,
                &prepared.operations,
                self.card_generator.as_ref(),
                &plugin_dir.join(PLUGIN_CARD_FOLDER),
                &plugin_dir,
                self.card_storage,
                &mut prepared.result,
            )
            .await?;
            attach_response_semantics(&mut plugin, &cards);
        }
        plugin.save(plugin_path).await?;

        let manifest_dir = parent_dir(manifest_path);
        let mut manifest = read_json(manifest_path).await?;
        let plugin_ref = relative_path(&manifest_dir, plugin_path)?;
        self.manifest_updater.link_plugin(&mut manifest, &plugin_ref)?;
        write_json(manifest_path, &manifest).await?;

        if self.options.allow_conversation_starters && is_declarative_agent(&manifest) {
            if let Some(agent_path) = declarative_agent_path(&manifest, &manifest_dir) {
                let candidates = plugin_starters(&plugin, &prepared.index);
                let mut agent = read_json(&agent_path).await?;
                merge_starters(&mut agent, &candidates)?;
                write_json(&agent_path, &agent).await?;
            }
        }

        log::info!(
            "Generated plugin manifest with {} function(s)",
            plugin.functions.len()
        );
        Ok(prepared.result)
    }

    /// Add response cards to every function of an existing plugin that has none
    pub async fn generate_response_semantics(
        &self,
        plugin_path: impl AsRef<Path>,
    ) -> crate::Result<GenerateResult> {
        self.response_semantics(plugin_path.as_ref())
            .await
            .map_err(|e| e.in_stage(Stage::Generate))
    }

    async fn response_semantics(&self, plugin_path: &Path) -> crate::Result<GenerateResult> {
        let mut plugin = PluginManifest::from_file(plugin_path).await?;
        let (document, renames) = sanitize_operation_ids(self.document().await?)?;
        let mut result = GenerateResult {
            warnings: renames,
            ..Default::default()
        };

        let index = index_operations(&document, &self.options, self.policy.as_ref());
        let pending: Vec<_> = plugin
            .functions
            .iter()
            .filter(|f| !f.has_response_semantics())
            .filter_map(|f| index.by_operation_id(&f.name))
            .cloned()
            .collect();

        let plugin_dir = parent_dir(plugin_path);
        let cards = generate_cards(
            &document,
            &pending,
            self.card_generator.as_ref(),
            &plugin_dir.join(PLUGIN_CARD_FOLDER),
            &plugin_dir,
            self.card_storage,
            &mut result,
        )
        .await?;
        attach_response_semantics(&mut plugin, &cards);
        plugin.save(plugin_path).await?;
        Ok(result)
    }

    /// Merge starters derived from a plugin into a declarative agent manifest.
    ///
    /// Returns how many starters were added.
    pub async fn merge_conversation_starters(
        &self,
        plugin_path: impl AsRef<Path>,
        agent_path: impl AsRef<Path>,
    ) -> crate::Result<usize> {
        let result = async {
            let plugin = PluginManifest::from_file(plugin_path.as_ref()).await?;
            let (document, _) = sanitize_operation_ids(self.document().await?)?;
            let index = index_operations(&document, &self.options, self.policy.as_ref());
            let candidates = plugin_starters(&plugin, &index);

            let mut agent = read_json(agent_path.as_ref()).await?;
            let added = merge_starters(&mut agent, &candidates)?;
            write_json(agent_path.as_ref(), &agent).await?;
            Ok::<_, Error>(added)
        }
        .await;
        result.map_err(|e| e.in_stage(Stage::Generate))
    }

    /// Shared pre-steps: filter, sanitize, index, group auth, persist the document
    async fn prepare(
        &self,
        selected: &[String],
        output_spec_path: &Path,
        cancel: &CancellationToken,
    ) -> crate::Result<Prepared> {
        let filtered = self.get_filtered_specs(selected, cancel).await?;
        let prepared = prepare(&filtered, &self.options, self.policy.as_ref())?;
        write_document(output_spec_path, prepared.document.unresolved()).await?;
        log::debug!("Wrote filtered document to {}", output_spec_path.display());
        Ok(prepared)
    }

    fn manifest_input<'a>(
        &'a self,
        prepared: &'a Prepared,
        spec_path: &'a str,
        cards: &'a HashMap<String, String>,
    ) -> ManifestInput<'a> {
        ManifestInput {
            document: &prepared.document,
            operations: &prepared.operations,
            auth_groups: &prepared.auth_groups,
            spec_path,
            cards,
            options: &self.options,
        }
    }
}

fn check_cancelled(cancel: &CancellationToken) -> crate::Result<()> {
    if cancel.is_cancelled() {
        log::debug!("Cancellation observed");
        return Err(Error::Cancelled);
    }
    Ok(())
}

fn card_files(cards: &HashMap<String, CardRef>) -> HashMap<String, String> {
    cards
        .iter()
        .map(|(id, card)| (id.clone(), card.file.clone()))
        .collect()
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

/// Path of the first declarative agent declared by an app manifest
fn declarative_agent_path(manifest: &JsonValue, manifest_dir: &Path) -> Option<PathBuf> {
    ["/copilotAgents/declarativeAgents/0/file", "/copilotExtensions/declarativeCopilots/0/file"]
        .into_iter()
        .find_map(|pointer| manifest.pointer(pointer).and_then(JsonValue::as_str))
        .map(|file| manifest_dir.join(file))
}

async fn read_json(path: &Path) -> crate::Result<JsonValue> {
    let content = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

/// Write JSON with 4-space indentation
async fn write_json(path: &Path, value: &JsonValue) -> crate::Result<()> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    value.serialize(&mut serializer)?;
    fs::write(path, buffer).await?;
    Ok(())
}
