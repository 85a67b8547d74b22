//! Layer Publisher CLI
//!
//! Publishes the layers of a map project to geodata and metadata servers

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use layer_publisher::core::config::BridgeConfig;
use layer_publisher::core::config_loader::{ConfigLoadOptions, ConfigLoader};
use layer_publisher::orchestration::ConsoleProgress;
use layer_publisher::{
    ExportSettings, LayerPublisher, ProjectFileSource, PublishMode, PublishValidator,
    ServerRegistry, ServerRole, Submission, TaskOutcome, ValidationErrors,
};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

/// Map layer publishing assistant
#[derive(Parser)]
#[command(name = "layer-publisher")]
#[command(version = "0.1.0")]
#[command(about = "Publish map layers to geodata and metadata servers", long_about = None)]
struct Cli {
    /// Project file holding the layer tree
    #[arg(short, long, global = true, default_value = "project.yml")]
    project: PathBuf,

    /// Geodata server to use (overrides the configured default)
    #[arg(long, global = true)]
    geodata: Option<String>,

    /// Metadata server to use (overrides the configured default)
    #[arg(long, global = true)]
    metadata: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the publication status of every layer
    Status,

    /// Publish layers to the selected servers, or export them to a folder
    Publish {
        /// Layers to publish (defaults to every layer)
        #[arg(short, long = "layer", value_name = "NAME")]
        layers: Vec<String>,

        /// Run the task in the background
        #[arg(long)]
        background: bool,

        /// Publish symbology only, keep the data already on the server
        #[arg(long)]
        only_symbology: bool,

        /// Export to a folder instead of publishing
        #[arg(long, value_name = "DIR")]
        export: Option<PathBuf>,

        /// Do not export data (export mode)
        #[arg(long)]
        no_data: bool,

        /// Do not export metadata (export mode)
        #[arg(long)]
        no_metadata: bool,

        /// Do not export symbology (export mode)
        #[arg(long)]
        no_symbology: bool,
    },

    /// Remove layers from the selected servers
    Unpublish {
        /// Layers to unpublish
        #[arg(value_name = "NAME")]
        layers: Vec<String>,

        /// Unpublish every published layer
        #[arg(long, conflicts_with = "layers")]
        all: bool,
    },

    /// Open a preview of published layers
    Preview {
        /// Layer to preview (defaults to every published layer)
        #[arg(value_name = "NAME")]
        layer: Option<String>,

        /// Open the metadata record instead of the map
        #[arg(long, requires = "layer")]
        metadata: bool,
    },

    /// Validate the configuration and the metadata of every layer
    Check,

    /// Import a metadata document into a layer
    ImportMetadata {
        /// Layer name
        #[arg(value_name = "NAME")]
        layer: String,

        /// Metadata document (defaults to the .xml file next to the layer data)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let result = run().await;

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("\n❌ Error");
            eprintln!("{:#}", e);
            process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();

    let cwd = std::env::current_dir().context("Cannot determine current directory")?;
    let config = ConfigLoader::load(ConfigLoadOptions::from_env(cwd)).await?;
    let level = config
        .logging
        .as_ref()
        .map(|l| l.level.as_str())
        .unwrap_or("warn");
    init_logging(level)?;

    let project = cli.project.as_path();
    let config_ref = &config;
    let (geodata, metadata) = (cli.geodata, cli.metadata);
    let open = move || build_publisher(project, geodata.clone(), metadata.clone(), config_ref);

    match cli.command {
        Commands::Check => check_command(project, &config).await,
        Commands::Status => {
            let (publisher, _) = open().await?;
            status_command(&publisher)
        }
        Commands::Publish {
            layers,
            background,
            only_symbology,
            export,
            no_data,
            no_metadata,
            no_symbology,
        } => {
            let defaults = config.publish.clone().unwrap_or_default();
            let mode = match (export, defaults.export) {
                (Some(folder), _) => PublishMode::Export(ExportSettings {
                    folder,
                    data: !no_data,
                    metadata: !no_metadata,
                    symbology: !no_symbology,
                }),
                (None, Some(settings)) => PublishMode::Export(ExportSettings {
                    folder: PathBuf::from(settings.folder),
                    data: settings.data && !no_data,
                    metadata: settings.metadata && !no_metadata,
                    symbology: settings.symbology && !no_symbology,
                }),
                (None, None) => PublishMode::Online {
                    only_symbology: only_symbology || defaults.only_symbology.unwrap_or(false),
                },
            };
            let background = background || defaults.background.unwrap_or(false);
            let (mut publisher, _) = open().await?;
            publish_command(&mut publisher, &layers, mode, background).await
        }
        Commands::Unpublish { layers, all } => {
            let (mut publisher, _) = open().await?;
            unpublish_command(&mut publisher, &layers, all).await
        }
        Commands::Preview { layer, metadata } => {
            let (publisher, _) = open().await?;
            preview_command(&publisher, layer.as_deref(), metadata).await
        }
        Commands::ImportMetadata { layer, file } => {
            let (mut publisher, source) = open().await?;
            import_command(&mut publisher, &source, &layer, file).await
        }
    }
}

/// Load the project, build the registry and select the servers
async fn build_publisher(
    project: &Path,
    geodata: Option<String>,
    metadata: Option<String>,
    config: &BridgeConfig,
) -> Result<(LayerPublisher, Arc<ProjectFileSource>)> {
    let registry = ServerRegistry::from_config(config)?;
    let source = Arc::new(ProjectFileSource::load(project).await?);
    let mut publisher = LayerPublisher::new(registry, source.clone());

    let defaults = config.publish.clone().unwrap_or_default();
    let geodata = geodata.or(defaults.geodata_server);
    let metadata = metadata.or(defaults.metadata_server);
    publisher.select_server(ServerRole::Geodata, geodata).await;
    publisher.select_server(ServerRole::Metadata, metadata).await;

    Ok((publisher, source))
}

fn print_selection(publisher: &LayerPublisher) {
    for role in ServerRole::ALL {
        let selected = publisher.selected_server(role).unwrap_or(role.none_label());
        let usable = if publisher.tracker().is_usable(role) {
            ""
        } else {
            " (unreachable)"
        };
        println!("  {}: {}{}", role, selected, usable);
    }
}

fn status_command(publisher: &LayerPublisher) -> Result<i32> {
    println!("\n🗂️  Layer status\n");
    print_selection(publisher);
    println!();

    let rows = publisher.status_rows();
    if rows.is_empty() {
        println!("⚠️  No publishable layers in the project");
        return Ok(0);
    }

    for row in rows {
        println!("📦 {} ({:?})", row.name, row.kind);
        println!("    data:     {}", row.data);
        println!("    metadata: {}", row.metadata);
    }
    println!();
    Ok(0)
}

/// Check only the named layers; every layer stays checked when no name is given
fn check_layers(publisher: &mut LayerPublisher, names: &[String]) -> Result<()> {
    let catalog = publisher.catalog_mut();
    if names.is_empty() {
        catalog.check_all(true);
        return Ok(());
    }
    catalog.check_all(false);
    for name in names {
        let id = catalog
            .layer_by_name(name)
            .map(|l| l.id.clone())
            .with_context(|| format!("Layer not found: {}", name))?;
        catalog.set_checked(&id, true)?;
    }
    Ok(())
}

async fn publish_command(
    publisher: &mut LayerPublisher,
    layers: &[String],
    mode: PublishMode,
    background: bool,
) -> Result<i32> {
    println!("\n🗺️  layer-publisher\n");

    if publisher.catalog().is_empty() {
        println!("⚠️  No publishable layers in the project");
        return Ok(1);
    }
    if matches!(mode, PublishMode::Online { .. }) && !publisher.can_publish() {
        println!("❌ A selected server is unreachable, publishing is disabled");
        return Ok(1);
    }

    check_layers(publisher, layers)?;
    publisher.set_mode(mode);

    if background {
        let submission = publisher
            .publish_in_background(
                || println!("🚀 Task submitted, running in the background"),
                Box::new(|outcome: TaskOutcome| {
                    if outcome.succeeded() {
                        println!("\n✅ Background task {} completed", outcome.task_id);
                    } else if let Some(notice) = outcome.notice {
                        println!("\n❌ {}", notice.title());
                        println!("{}", notice.message());
                    }
                }),
            )
            .await?;

        return match submission {
            Submission::Rejected(report) => {
                println!("❌ {}", report.to_message());
                Ok(1)
            }
            Submission::Submitted(handle) => {
                let succeeded = handle.wait().await;
                Ok(if succeeded { 0 } else { 1 })
            }
        };
    }

    let report = publisher.publish(Some(&ConsoleProgress)).await?;
    if report.success() {
        println!("\n✅ Publishing completed successfully! ({} ms)", report.duration);
        Ok(0)
    } else {
        println!("\n❌ Publishing failed");
        if let Some(message) = report.message() {
            eprintln!("{}", message);
        }
        Ok(1)
    }
}

async fn unpublish_command(
    publisher: &mut LayerPublisher,
    layers: &[String],
    all: bool,
) -> Result<i32> {
    println!("\n🧹 Unpublish\n");

    if all {
        let summary = publisher.unpublish_all().await;
        for (name, role) in &summary.unpublished {
            println!("  ✅ {} ({})", name, role);
        }
        for (name, role, error) in &summary.failures {
            println!("  ❌ {} ({}): {}", name, role, error);
        }
        return Ok(if summary.success() { 0 } else { 1 });
    }

    if layers.is_empty() {
        bail!("Name the layers to unpublish, or pass --all");
    }

    let mut failed = false;
    for name in layers {
        if publisher.catalog().layer_by_name(name).is_none() {
            println!("  ❌ {}: layer not found", name);
            failed = true;
            continue;
        }
        for role in ServerRole::ALL {
            let result = match role {
                ServerRole::Geodata => publisher.unpublish_data(name).await,
                ServerRole::Metadata => publisher.unpublish_metadata(name).await,
            };
            match result {
                Ok(()) => println!("  ✅ {} ({})", name, role),
                Err(e) => {
                    println!("  ❌ {} ({}): {}", name, role, e);
                    failed = true;
                }
            }
        }
    }
    Ok(if failed { 1 } else { 0 })
}

async fn preview_command(
    publisher: &LayerPublisher,
    layer: Option<&str>,
    metadata: bool,
) -> Result<i32> {
    match (layer, metadata) {
        (Some(name), true) => publisher.preview_metadata(name).await?,
        (Some(name), false) => publisher.preview_data(name).await?,
        (None, _) => {
            if publisher
                .tracker()
                .published_names(ServerRole::Geodata)
                .is_empty()
            {
                println!("⚠️  No published layers to preview");
                return Ok(1);
            }
            publisher.preview_all().await?
        }
    }
    Ok(0)
}

async fn check_command(project: &Path, config: &BridgeConfig) -> Result<i32> {
    println!("\n🔍 Configuration Check\n");

    let result = ConfigLoader::validate(config);
    println!("{}", ConfigLoader::format_validation_result(&result));
    let mut failed = !result.valid;

    let source = match ProjectFileSource::load(project).await {
        Ok(source) => source,
        Err(e) => {
            println!("❌ {}", e);
            return Ok(1);
        }
    };

    println!("\n📄 Layer metadata:");
    let mut publisher = LayerPublisher::new(ServerRegistry::new(), Arc::new(source));
    let ids: Vec<(String, String)> = publisher
        .catalog()
        .list_publishable_layers()
        .into_iter()
        .map(|l| (l.id.clone(), l.name.clone()))
        .collect();

    for (id, name) in ids {
        let issues = publisher.validate_layer_metadata(&id)?;
        if issues.is_empty() {
            println!("  ✅ {}", name);
        } else {
            println!("  ⚠️  {}", name);
            for issue in issues {
                println!("    - {}", issue);
            }
        }
    }

    let names: Vec<&str> = publisher
        .catalog()
        .list_publishable_layers()
        .into_iter()
        .map(|l| l.name.as_str())
        .collect();
    let mut errors = ValidationErrors::new();
    PublishValidator::check_names(&names, &mut errors);
    if !errors.is_empty() {
        failed = true;
        println!("\n❌ Layer names:");
        for error in &errors {
            println!("    - {}", error);
        }
    }

    println!();
    Ok(if failed { 1 } else { 0 })
}

async fn import_command(
    publisher: &mut LayerPublisher,
    source: &ProjectFileSource,
    layer: &str,
    file: Option<PathBuf>,
) -> Result<i32> {
    let id = publisher
        .catalog()
        .layer_by_name(layer)
        .map(|l| l.id.clone())
        .with_context(|| format!("Layer not found: {}", layer))?;

    let path = match publisher.import_metadata(&id, file.as_deref()).await {
        Ok(path) => path,
        Err(e) => {
            println!("❌ Cannot convert the metadata file. Maybe not ISO19139 or ESRI-ISO format?");
            eprintln!("{}", e);
            return Ok(1);
        }
    };

    source.save().await?;
    println!("✅ Imported {} into {}", path.display(), layer);
    Ok(0)
}
