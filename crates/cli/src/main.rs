use anyhow::Result;
use clap::{Parser, Subcommand};
use cli::{catalog_key, catalog_keys, open_catalog, report, watch};
use soundtag_core::config;
use soundtag_core::models::{MatchMode, SortBy, SortOrder};
use soundtag_core::{scanner, Ingestor};
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;
    let catalog = open_catalog(&cfg).await?;
    let json = cli.json;

    match cli.command {
        Commands::Scan { dir } => {
            let ingestor = Ingestor::new(catalog);
            let summary = scanner::scan(
                &ingestor,
                Path::new(&dir),
                &cfg.watch.exclude,
                cfg.watch.workers,
            )
            .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{}", report::scan_line(&summary));
            }
        }
        Commands::Watch { dirs } => {
            let roots = watch::resolve_roots(&cfg, dirs);
            watch::watch_paths(Ingestor::new(catalog), &cfg, roots, json).await?;
        }
        Commands::Info { path } => {
            let view = catalog.get_file(&catalog_key(&path)?).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                println!("{}", report::file_detail(&view));
            }
        }
        Commands::Tags { action } => {
            let tags = match action {
                TagsAction::Add { names } => catalog.add_tags(&names).await?,
                TagsAction::List => catalog.list_tags().await?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&tags)?);
            } else {
                println!("{}", report::tag_list(&tags));
            }
        }
        Commands::Tag { tag, paths } => {
            let keys = catalog_keys(&paths)?;
            let outcome = catalog.tag_files(&keys, &tag).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}", report::batch_line("tagged", &tag, &outcome));
            }
        }
        Commands::Untag { tag, paths } => {
            let keys = catalog_keys(&paths)?;
            let outcome = catalog.untag_files(&keys, &tag).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}", report::batch_line("untagged", &tag, &outcome));
            }
        }
        Commands::Search {
            tags,
            all,
            sort_by,
            order,
        } => {
            let views = catalog
                .query_by_tags(&tags, MatchMode::from_match_all(all), sort_by, order)
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&views)?);
            } else if views.is_empty() {
                println!("no matching files");
            } else {
                for view in &views {
                    println!("{}", report::file_line(view));
                }
            }
        }
        Commands::Stats => {
            let stats = catalog.stats().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("{}", report::stats_table(&stats));
            }
        }
        Commands::Rm { path } => {
            let removed = Ingestor::new(catalog)
                .remove(Path::new(&path))
                .await?;
            if json {
                println!("{}", serde_json::json!({ "path": path, "removed": removed }));
            } else {
                println!("removed {removed} file(s)");
            }
        }
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "soundtag")]
#[command(about = "Tag catalog for audio sample libraries", long_about = None)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Output JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index every audio file under a directory once
    Scan { dir: String },
    /// Index directories, then keep the catalog in sync until Ctrl-C
    Watch {
        /// Roots to watch; defaults to `watch.roots` from config
        dirs: Vec<String>,
    },
    /// Show one cataloged file with its metadata and tags
    Info { path: String },
    /// Manage the tag vocabulary
    Tags {
        #[command(subcommand)]
        action: TagsAction,
    },
    /// Attach a tag to files (the tag is created if needed)
    Tag {
        #[arg(long)]
        tag: String,
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Detach a tag from files
    Untag {
        #[arg(long)]
        tag: String,
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Find files by tag
    Search {
        /// Tag names (comma-separated)
        #[arg(long, value_delimiter = ',', num_args = 1.., required = true)]
        tags: Vec<String>,
        /// Require every tag instead of any
        #[arg(long, default_value_t = false)]
        all: bool,
        /// path|last-modified|duration
        #[arg(long, default_value = "path")]
        sort_by: SortBy,
        /// asc|desc
        #[arg(long, default_value = "asc")]
        order: SortOrder,
    },
    /// Catalog-wide counts
    Stats,
    /// Remove a file (or everything under a directory) from the catalog
    Rm { path: String },
}

#[derive(Subcommand)]
enum TagsAction {
    /// Add tag names to the vocabulary
    Add {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// List all tags
    List,
}
