use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sma_core::{
    BatchOrchestrator, Config, CoverageScope, GraphError, GraphStore, ManifestSource, OrgContext,
    SurrealGraphStore,
};

#[derive(Parser)]
#[command(name = "sma")]
#[command(about = "Local Salesforce metadata cache with flow field-dependency analysis", long_about = None)]
struct Cli {
    /// Org to operate on; each org has its own graph
    #[arg(long, global = true, default_value = "default")]
    org: String,

    /// Explicit config file (default: ./sma.toml, then the user config)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the graph schema for the org
    Init,
    /// Extract field dependencies from the flows listed in a manifest
    Extract {
        /// JSON manifest of unit descriptors
        manifest: PathBuf,
    },
    /// Automations that depend on a field
    Dependents {
        /// Object API name
        entity: String,
        /// Field API name
        field: String,
    },
    /// Fields a flow version references
    References {
        /// Flow version id
        unit_id: String,
    },
    /// Dependent counts per field
    Coverage {
        /// Restrict to one object
        #[arg(long)]
        entity: Option<String>,
    },
    /// Report of the latest extraction run
    Report,
    /// Row counts of the graph tables
    Stats,
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    }
    .wrap_err("Failed to load configuration")?;
    init_tracing(&config.logging.filter);

    let org = OrgContext::new(&cli.org);
    let store = SurrealGraphStore::open_for(&config.storage, &org)
        .await
        .wrap_err_with(|| format!("Failed to open graph at {}", config.storage.database_path().display()))?;

    if !matches!(cli.command, Commands::Init | Commands::Extract { .. }) && !store.is_initialized().await? {
        return Err(GraphError::NotInitialized.into());
    }

    match cli.command {
        Commands::Init => {
            store.initialize().await?;
            eprintln!(
                "Initialized graph for org '{}' at {}",
                org.label(),
                config.storage.database_path().display()
            );
        }
        Commands::Extract { manifest } => {
            store.initialize().await?;

            let orchestrator = BatchOrchestrator::new(Arc::new(store), config.extraction.clone());
            let token = orchestrator.cancellation_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted; finishing committed units");
                    token.cancel();
                }
            });

            let source = ManifestSource::new(&manifest);
            let report = orchestrator
                .run_from_source(&org, &source)
                .await
                .wrap_err_with(|| format!("Failed to read units from {}", manifest.display()))?;
            print_json(&report)?;
        }
        Commands::Dependents { entity, field } => {
            print_json(&store.dependents_of(&entity, &field).await?)?;
        }
        Commands::References { unit_id } => {
            print_json(&store.references_of(&unit_id).await?)?;
        }
        Commands::Coverage { entity } => {
            let scope = match entity {
                Some(entity) => CoverageScope::Entity(entity),
                None => CoverageScope::Global,
            };
            print_json(&store.get_coverage(&scope).await?)?;
        }
        Commands::Report => match store.latest_batch_report().await? {
            Some(report) => print_json(&report)?,
            None => eprintln!("No extraction run recorded for org '{}'", org.label()),
        },
        Commands::Stats => {
            print_json(&store.stats().await?)?;
        }
    }

    Ok(())
}
