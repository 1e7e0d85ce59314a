//! symgraph CLI - index a polyglot codebase into a symbol graph

mod ui;

use anyhow::Context;
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use symgraph::config::{self, SymgraphConfig};
use symgraph::indexer::{GraphSnapshot, IndexOptions, ProjectIndexer};
use symgraph::semantic::SemanticInsights;
use symgraph::storage::{ConnectionPool, GraphFilter, GraphStore, initialize_database};
use symgraph::{Language, ProjectId, RelationshipKind, SymbolKind};
use tokio_util::sync::CancellationToken;
use ui::{Icons, Spinner, theme};

#[derive(Parser)]
#[command(name = "symgraph")]
#[command(version)]
#[command(about = "Polyglot symbol graph indexer")]
#[command(long_about = r#"
symgraph parses Python, JavaScript, TypeScript, Rust, Go, C++ and Java (with
a pattern-based fallback) into one symbol graph stored in SQLite, links calls
across languages, and derives call chains, data flow, overrides and semantic insights.

Example usage:
  symgraph init
  symgraph index
  symgraph graph --kind function --name load
  symgraph insights
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Project root
    #[arg(short, long, global = true, default_value = ".")]
    path: PathBuf,

    /// Config file (defaults to <path>/symgraph.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config and create the database
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Index every supported file under the project root
    Index {
        /// Re-parse files whose content did not change
        #[arg(long)]
        force: bool,

        /// Keep files that are no longer on disk
        #[arg(long)]
        keep_missing: bool,

        /// Skip the enrichment passes
        #[arg(long)]
        no_enrich: bool,

        /// Skip embeddings, clustering and insights
        #[arg(long)]
        no_semantic: bool,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print symbols and relationships as JSON
    Graph {
        /// Only symbols declared in this file
        #[arg(long)]
        file: Option<String>,

        #[arg(long)]
        language: Option<String>,

        /// Symbol kind; repeatable
        #[arg(long = "kind")]
        kinds: Vec<String>,

        /// Substring of the symbol name
        #[arg(long)]
        name: Option<String>,

        /// Relationship type; repeatable
        #[arg(long = "edge")]
        edges: Vec<String>,

        #[arg(long)]
        min_confidence: Option<f32>,

        /// Include relationships whose target was never resolved
        #[arg(long)]
        unresolved: bool,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print semantic clusters and insights as JSON
    Insights,

    /// Show row counts for the project
    Stats {
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let root = cli.path.clone();
    let config_path = cli.config.clone().unwrap_or_else(|| root.join(config::default_config_path()));

    if let Commands::Init { force } = cli.command {
        return run_init(&root, &config_path, force);
    }

    let config = config::load_config(&config_path)?;
    let _guard = symgraph::logging::init(&config.logging, &root, cli.verbose)?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(run(cli.command, root, config))
}

async fn run(command: Commands, root: PathBuf, config: SymgraphConfig) -> anyhow::Result<()> {
    let db_path = root.join(&config.database.path);
    let project_name = project_name(&root, &config);

    match command {
        Commands::Init { .. } => Ok(()),
        Commands::Index {
            force,
            keep_missing,
            no_enrich,
            no_semantic,
            json,
        } => {
            let options = IndexOptions {
                force,
                prune_missing: !keep_missing,
                enrich: !no_enrich,
                semantic: !no_semantic && config.semantic.enabled,
                parse: config.parsing.to_parse_options(config.bridge),
                parse_workers: match config.parsing.parse_workers {
                    0 => IndexOptions::default().parse_workers,
                    n => n,
                },
                ..IndexOptions::default()
            };
            run_index(&root, &db_path, &project_name, &config, options, json).await
        }
        Commands::Graph {
            file,
            language,
            kinds,
            name,
            edges,
            min_confidence,
            unresolved,
            limit,
        } => {
            let filter = GraphFilter {
                file_path: file,
                language: language.map(|l| l.parse::<Language>()).transpose()?,
                kinds: kinds.iter().map(|k| k.parse::<SymbolKind>()).collect::<Result<_, _>>()?,
                name_contains: name,
                relationship_kinds: edges
                    .iter()
                    .map(|e| e.parse::<RelationshipKind>())
                    .collect::<Result<_, _>>()?,
                min_confidence,
                include_unresolved: unresolved,
                limit,
            };
            let (indexer, project) = open_existing(&db_path, &project_name, &config).await?;
            let snapshot: GraphSnapshot = indexer.get_symbol_graph(project, filter).await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            Ok(())
        }
        Commands::Insights => {
            let (indexer, project) = open_existing(&db_path, &project_name, &config).await?;
            let insights: SemanticInsights = indexer.get_semantic_insights(project).await?;
            println!("{}", serde_json::to_string_pretty(&insights)?);
            Ok(())
        }
        Commands::Stats { json } => {
            let (indexer, project) = open_existing(&db_path, &project_name, &config).await?;
            let stats = indexer.project_stats(project).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                ui::section(&format!("{} {}", Icons::PACKAGE, project_name));
                println!("{}", stats);
            }
            Ok(())
        }
    }
}

fn run_init(root: &Path, config_path: &Path, force: bool) -> anyhow::Result<()> {
    let config = SymgraphConfig::default();
    config::write_config(config_path, &config, force)?;
    config::ensure_gitignore(root, ".symgraph/")?;
    let db_path = root.join(&config.database.path);
    initialize_database(&db_path).with_context(|| format!("failed to create {}", db_path.display()))?;

    ui::success("Initialized symgraph");
    ui::info("Config", &config_path.display().to_string());
    ui::info("Database", &db_path.display().to_string());
    Ok(())
}

async fn run_index(
    root: &Path,
    db_path: &Path,
    project_name: &str,
    config: &SymgraphConfig,
    options: IndexOptions,
    json: bool,
) -> anyhow::Result<()> {
    initialize_database(db_path).with_context(|| format!("failed to open {}", db_path.display()))?;
    let pool = ConnectionPool::open(db_path, config.pool.clone())?;
    let project = ensure_project(&pool, project_name).await?;

    let spinner = Spinner::new("Discovering files");
    let found = symgraph::discover::discover(root, &config.parsing.exclude)?;
    for path in &found.unreadable {
        tracing::warn!(path = %path, "skipping file that is not valid UTF-8");
    }

    if !json {
        ui::header(&format!("Indexing {}", project_name));
    }
    spinner.set_message(&format!("Indexing {} files", found.files.len()));

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });
    let options = IndexOptions { cancel, ..options };

    let indexer = ProjectIndexer::from_config(pool.clone(), config);
    let result = indexer.index_project(project, found.files, &options).await;
    spinner.finish_and_clear();
    pool.close();
    let stats = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    if stats.cancelled {
        ui::warn("Indexing interrupted; results so far were kept");
    } else {
        ui::success(&format!("Indexed in {}ms", stats.duration_ms));
    }
    println!(
        "  {} {}  {} {}  {} {}",
        Icons::FILE.style(theme().info),
        stats.files_succeeded,
        Icons::PACKAGE.style(theme().info),
        stats.symbols_found,
        Icons::LINK.style(theme().info),
        stats.relationships_found
    );
    ui::summary_row("skipped (unchanged)", stats.files_skipped);
    ui::summary_row("removed", stats.files_removed);
    ui::summary_row("pattern fallback", stats.fallback_files);
    if let Some(enrichment) = &stats.enrichment {
        ui::summary_row("enrichment changes", enrichment.total_changes());
    }
    if let Some(semantic) = &stats.semantic {
        ui::summary_row(&format!("{} embeddings", Icons::BRAIN), semantic.embeddings_generated);
        ui::summary_row("insights", semantic.insights_generated);
    }
    if stats.error_count > 0 {
        ui::section("Errors");
        for err in &stats.errors {
            ui::error(&format!("{}: {}", err.path, err.message));
        }
        if stats.error_count > stats.errors.len() {
            ui::warn(&format!("{} more not shown", stats.error_count - stats.errors.len()));
        }
    }
    Ok(())
}

async fn open_existing(
    db_path: &Path,
    project_name: &str,
    config: &SymgraphConfig,
) -> anyhow::Result<(ProjectIndexer, ProjectId)> {
    if !db_path.exists() {
        anyhow::bail!("no database at {} (run `symgraph index` first)", db_path.display());
    }
    let pool = ConnectionPool::open(db_path, config.pool.clone())?;
    let name = project_name.to_string();
    let project = pool
        .with_connection(move |conn| GraphStore::new(conn).project_by_name(&name))
        .await?
        .with_context(|| format!("project '{}' has not been indexed", project_name))?;
    Ok((ProjectIndexer::from_config(pool, config), project))
}

async fn ensure_project(pool: &ConnectionPool, name: &str) -> anyhow::Result<ProjectId> {
    let name = name.to_string();
    Ok(pool
        .with_transaction(move |tx| GraphStore::new(tx).ensure_project(&name))
        .await?)
}

fn project_name(root: &Path, config: &SymgraphConfig) -> String {
    if let Some(name) = &config.database.project {
        return name.clone();
    }
    std::fs::canonicalize(root)
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .unwrap_or_else(|| "default".to_string())
}
