//! specparser CLI entrypoint
//! Parses command-line arguments and dispatches to the core pipeline.

// Internal imports (std, crate)
use std::collections::BTreeMap;
use std::path::PathBuf;

// External imports (alphabetized)
use anyhow::Context;
use clap::Parser;
use specparser_core::{
    ApiKeyLocation, AuthKind, AuthSchemeSpec, CardStorage, ParseOptions, ProjectType, SpecParser,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "specparser")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Document and policy options shared by every subcommand
#[derive(clap::Args, Debug, Clone)]
struct SourceArgs {
    /// Path or URL to the OpenAPI or Swagger document (YAML or JSON)
    ///
    /// Example: --spec path/to/openapi.yaml
    /// Example: --spec https://example.com/openapi.json
    #[arg(long)]
    spec: String,
    /// Options file (YAML, or TOML with a .toml extension)
    #[arg(long)]
    options: Option<PathBuf>,
    /// Project type (message_extension, copilot, teams_ai)
    #[arg(long)]
    project_type: Option<ProjectType>,
    /// Allowed HTTP methods, overriding the options file
    #[arg(long, value_delimiter = ',')]
    allowed_methods: Vec<String>,
    /// Allowed auth kinds (api_key, bearer, oauth2), overriding the options file
    #[arg(long, value_delimiter = ',')]
    allowed_auth: Vec<AuthKind>,
    /// Accept Swagger 2.0 documents
    #[arg(long)]
    allow_legacy_format: bool,
    /// Accept operations offering alternative auth schemes
    #[arg(long)]
    allow_multiple_auth: bool,
    /// Maximum number of operations in one generated set
    #[arg(long)]
    max_operations: Option<usize>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Validate a document and print the result as JSON
    Validate {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// List the operations of a document with their validity
    List {
        #[command(flatten)]
        source: SourceArgs,
        /// Only print supported operations
        #[arg(long)]
        valid_only: bool,
    },
    /// Write a document restricted to the selected operations
    Filter {
        #[command(flatten)]
        source: SourceArgs,
        /// Operation keys such as "GET /pets" (repeatable)
        #[arg(long = "operation", required = true)]
        operations: Vec<String>,
        /// Output path; YAML for .yaml/.yml, JSON otherwise
        #[arg(long)]
        output: PathBuf,
    },
    /// Add a security scheme and bind it to operations
    AddAuth {
        #[command(flatten)]
        source: SourceArgs,
        /// Security scheme name
        #[arg(long)]
        name: String,
        /// Scheme kind (api_key, bearer, oauth2)
        #[arg(long)]
        kind: AuthKind,
        /// API key name (api_key)
        #[arg(long, default_value = "X-API-Key")]
        key_name: String,
        /// Send the API key as a query parameter instead of a header (api_key)
        #[arg(long)]
        key_in_query: bool,
        /// Bearer token format, e.g. JWT (bearer)
        #[arg(long)]
        bearer_format: Option<String>,
        /// Authorization URL (oauth2)
        #[arg(long)]
        authorization_url: Option<String>,
        /// Token URL (oauth2)
        #[arg(long)]
        token_url: Option<String>,
        /// Refresh URL (oauth2)
        #[arg(long)]
        refresh_url: Option<String>,
        /// OAuth2 scopes (oauth2)
        #[arg(long, value_delimiter = ',')]
        scopes: Vec<String>,
        /// Operation ids to bind (repeatable)
        #[arg(long = "operation-id", required = true)]
        operation_ids: Vec<String>,
        /// Output path; YAML for .yaml/.yml, JSON otherwise
        #[arg(long)]
        output: PathBuf,
    },
    /// Generate a message extension: filtered spec, manifest commands and cards
    Generate {
        #[command(flatten)]
        source: SourceArgs,
        /// Operation keys such as "GET /pets" (repeatable)
        #[arg(long = "operation", required = true)]
        operations: Vec<String>,
        /// Teams app manifest to update
        #[arg(long)]
        manifest: PathBuf,
        /// Output path of the filtered document
        #[arg(long)]
        output_spec: PathBuf,
        /// Folder for card templates
        #[arg(long)]
        card_folder: PathBuf,
        /// Reuse existing card files instead of writing new ones
        #[arg(long)]
        keep_existing_cards: bool,
    },
    /// Generate an API plugin manifest for the selected operations
    GeneratePlugin {
        #[command(flatten)]
        source: SourceArgs,
        /// Operation keys such as "GET /pets" (repeatable)
        #[arg(long = "operation", required = true)]
        operations: Vec<String>,
        /// Teams app manifest to link the plugin from
        #[arg(long)]
        manifest: PathBuf,
        /// Output path of the filtered document
        #[arg(long)]
        output_spec: PathBuf,
        /// Plugin manifest to create or update
        #[arg(long)]
        plugin: PathBuf,
        /// Attach response cards to plugin functions
        #[arg(long)]
        response_semantics: bool,
        /// Add confirmation prompts to non-GET functions
        #[arg(long)]
        confirmation: bool,
        /// Derive conversation starters for a declarative agent
        #[arg(long)]
        conversation_starters: bool,
    },
    /// Add response cards to plugin functions that have none
    ResponseSemantics {
        #[command(flatten)]
        source: SourceArgs,
        /// Plugin manifest to update
        #[arg(long)]
        plugin: PathBuf,
        /// Reuse existing card files instead of writing new ones
        #[arg(long)]
        keep_existing_cards: bool,
    },
    /// Merge conversation starters derived from a plugin into a declarative agent
    MergeStarters {
        #[command(flatten)]
        source: SourceArgs,
        /// Plugin manifest
        #[arg(long)]
        plugin: PathBuf,
        /// Declarative agent manifest to update
        #[arg(long)]
        agent: PathBuf,
    },
}

impl SourceArgs {
    async fn parse_options(&self) -> anyhow::Result<ParseOptions> {
        let mut options = match &self.options {
            Some(path) => ParseOptions::from_file(path)
                .await
                .with_context(|| format!("Failed to load options from {}", path.display()))?,
            None => ParseOptions::default(),
        };
        if let Some(project_type) = self.project_type {
            options.project_type = project_type;
        }
        if !self.allowed_methods.is_empty() {
            options.allowed_methods = self.allowed_methods.iter().map(|m| m.to_lowercase()).collect();
        }
        if !self.allowed_auth.is_empty() {
            options.allowed_auth = self.allowed_auth.clone();
        }
        options.allow_legacy_format |= self.allow_legacy_format;
        options.allow_multiple_auth |= self.allow_multiple_auth;
        if self.max_operations.is_some() {
            options.max_operations = self.max_operations;
        }
        Ok(options)
    }

    async fn parser(&self) -> anyhow::Result<SpecParser> {
        Ok(SpecParser::new(self.spec.as_str(), self.parse_options().await?))
    }
}

fn storage(keep_existing: bool) -> CardStorage {
    if keep_existing {
        CardStorage::KeepExisting
    } else {
        CardStorage::CreateNew
    }
}

/// Cancel the token on Ctrl-C so in-flight pipeline calls stop at their next checkpoint
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            child.cancel();
        }
    });
    token
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging; library `log` records are bridged into tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cancel = cancel_on_ctrl_c();

    match cli.command {
        Commands::Validate { source } => {
            let parser = source.parser().await?;
            let result = parser.validate().await.context("Validation failed")?;
            print_json(&result)?;
            if !result.is_valid() {
                std::process::exit(1);
            }
        }
        Commands::List { source, valid_only } => {
            let parser = source.parser().await?;
            let index = parser.list().await.context("Failed to list operations")?;
            for entry in index.iter().filter(|e| e.is_valid || !valid_only) {
                if entry.is_valid {
                    println!("{}\t{}", entry.key, entry.operation_id);
                } else {
                    let reasons: Vec<String> = entry.reasons.iter().map(|r| r.to_string()).collect();
                    println!("{}\t{}\t[{}]", entry.key, entry.operation_id, reasons.join(", "));
                }
            }
        }
        Commands::Filter {
            source,
            operations,
            output,
        } => {
            let parser = source.parser().await?;
            let filtered = parser
                .get_filtered_specs(&operations, &cancel)
                .await
                .context("Failed to filter document")?;
            filtered
                .save(&output)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            tracing::info!("Wrote {}", output.display());
        }
        Commands::AddAuth {
            source,
            name,
            kind,
            key_name,
            key_in_query,
            bearer_format,
            authorization_url,
            token_url,
            refresh_url,
            scopes,
            operation_ids,
            output,
        } => {
            let scheme = match kind {
                AuthKind::ApiKey => AuthSchemeSpec::ApiKey {
                    name: key_name,
                    location: if key_in_query {
                        ApiKeyLocation::Query
                    } else {
                        ApiKeyLocation::Header
                    },
                },
                AuthKind::Bearer => AuthSchemeSpec::Bearer { bearer_format },
                AuthKind::OAuth2 => AuthSchemeSpec::OAuth2 {
                    authorization_url: authorization_url
                        .context("--authorization-url is required for oauth2")?,
                    token_url: token_url.context("--token-url is required for oauth2")?,
                    refresh_url,
                    scopes: scopes
                        .into_iter()
                        .map(|scope| (scope, String::new()))
                        .collect::<BTreeMap<_, _>>(),
                },
            };
            let mut parser = source.parser().await?;
            let bound = parser
                .add_auth(&output, &name, &scheme, &operation_ids)
                .await
                .context("Failed to add auth")?;
            tracing::info!("Bound '{}' to {} operation(s) in {}", name, bound, output.display());
        }
        Commands::Generate {
            source,
            operations,
            manifest,
            output_spec,
            card_folder,
            keep_existing_cards,
        } => {
            let mut options = source.parse_options().await?;
            options.plugin_mode = false;
            let parser = SpecParser::new(source.spec.as_str(), options)
                .with_card_storage(storage(keep_existing_cards));
            let result = parser
                .generate_artifacts(&manifest, &operations, &output_spec, &card_folder, &cancel)
                .await
                .context("Generation failed")?;
            print_json(&result)?;
        }
        Commands::GeneratePlugin {
            source,
            operations,
            manifest,
            output_spec,
            plugin,
            response_semantics,
            confirmation,
            conversation_starters,
        } => {
            let mut options = source.parse_options().await?;
            options.plugin_mode = true;
            options.allow_response_semantics |= response_semantics;
            options.allow_confirmation |= confirmation;
            options.allow_conversation_starters |= conversation_starters;
            let parser = SpecParser::new(source.spec.as_str(), options);
            let result = parser
                .generate_artifacts(&manifest, &operations, &output_spec, &plugin, &cancel)
                .await
                .context("Plugin generation failed")?;
            print_json(&result)?;
        }
        Commands::ResponseSemantics {
            source,
            plugin,
            keep_existing_cards,
        } => {
            let parser = source
                .parser()
                .await?
                .with_card_storage(storage(keep_existing_cards));
            let result = parser
                .generate_response_semantics(&plugin)
                .await
                .context("Failed to generate response semantics")?;
            print_json(&result)?;
        }
        Commands::MergeStarters {
            source,
            plugin,
            agent,
        } => {
            let parser = source.parser().await?;
            let added = parser
                .merge_conversation_starters(&plugin, &agent)
                .await
                .context("Failed to merge conversation starters")?;
            tracing::info!("Added {} conversation starter(s) to {}", added, agent.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[tokio::test]
    async fn test_flag_overrides() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "specparser",
            "list",
            "--spec",
            "openapi.yaml",
            "--project-type",
            "copilot",
            "--allowed-methods",
            "GET,Delete",
            "--allowed-auth",
            "api_key,bearer",
            "--max-operations",
            "5",
        ])?;
        let Commands::List { source, .. } = cli.command else {
            panic!("expected list");
        };
        let options = source.parse_options().await?;
        assert_eq!(options.project_type, ProjectType::Copilot);
        assert_eq!(options.allowed_methods, vec!["get", "delete"]);
        assert_eq!(options.allowed_auth, vec![AuthKind::ApiKey, AuthKind::Bearer]);
        assert_eq!(options.max_operations, Some(5));
        Ok(())
    }

    #[tokio::test]
    async fn test_options_file_with_overrides() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("options.yaml");
        tokio::fs::write(&path, "allow_legacy_format: false\nproject_type: teams_ai\n").await?;
        let cli = Cli::try_parse_from([
            "specparser",
            "validate",
            "--spec",
            "openapi.yaml",
            "--options",
            path.to_str().unwrap(),
            "--allow-legacy-format",
        ])?;
        let Commands::Validate { source } = cli.command else {
            panic!("expected validate");
        };
        let options = source.parse_options().await?;
        assert_eq!(options.project_type, ProjectType::TeamsAi);
        assert!(options.allow_legacy_format);
        Ok(())
    }
}
