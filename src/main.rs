use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use pushkind_feeds::config::Settings;
use pushkind_feeds::domain::catalog::Catalog;
use pushkind_feeds::services::merge::{analyze_duplicates, merge_duplicates};
use pushkind_feeds::services::reconcile::diff;
use pushkind_feeds::services::report::render_diff_csv;

/// Catalog feed import, duplicate merge and snapshot reconciliation.
#[derive(Debug, Parser)]
#[command(name = "pushkind-feeds", version, about)]
struct Cli {
    /// YAML settings file; `FEEDS__*` variables override it.
    #[arg(long, global = true, env = "FEEDS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build a catalog from a feed and print a summary.
    Import {
        file: PathBuf,
        /// Display name of the catalog.
        #[arg(long)]
        name: Option<String>,
        /// Where the feed was fetched from.
        #[arg(long)]
        source_url: Option<String>,
        /// Print the whole catalog instead of a summary.
        #[arg(long)]
        full: bool,
    },
    /// List duplicate groups and suggested merge attributes.
    Duplicates { file: PathBuf },
    /// Merge duplicate listings and print the merged catalog summary.
    Merge {
        file: PathBuf,
        /// Attribute to fold across variants; repeatable.
        #[arg(long = "attribute")]
        attributes: Vec<String>,
    },
    /// Compare two snapshots of the same feed.
    Diff {
        old: PathBuf,
        new: PathBuf,
        /// Emit CSV for review instead of JSON.
        #[arg(long)]
        csv: bool,
    },
}

#[derive(Serialize)]
struct Summary<'a> {
    id: &'a str,
    name: &'a str,
    shop_name: &'a str,
    shop_url: Option<&'a str>,
    products: usize,
    categories: usize,
    merged_ids: usize,
}

impl<'a> From<&'a Catalog> for Summary<'a> {
    fn from(catalog: &'a Catalog) -> Self {
        Self {
            id: catalog.id.as_str(),
            name: &catalog.name,
            shop_name: &catalog.metadata.shop_name,
            shop_url: catalog.metadata.shop_url.as_deref(),
            products: catalog.products.len(),
            categories: catalog.categories.len(),
            merged_ids: catalog.metadata.merged_id_map.len(),
        }
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run(cli.command, settings))
}

async fn run(command: Commands, settings: Settings) -> Result<()> {
    match command {
        Commands::Import {
            file,
            name,
            source_url,
            full,
        } => {
            let raw = read(&file)?;
            let name = name.unwrap_or_else(|| file_stem(&file));
            let mut builder = settings.catalog_builder(name);
            if let Some(url) = source_url {
                builder = builder.source_url(url);
            }
            let catalog = builder
                .build_batched(&raw, settings.batch_size, |processed, total| {
                    log::info!("Processed {processed}/{total} offers");
                })
                .await?;
            if full {
                print_json(&catalog)
            } else {
                print_json(&Summary::from(&catalog))
            }
        }
        Commands::Duplicates { file } => {
            let catalog = load(&file, &settings)?;
            print_json(&analyze_duplicates(&catalog))
        }
        Commands::Merge { file, attributes } => {
            let catalog = load(&file, &settings)?;
            let attributes = if attributes.is_empty() {
                settings.merge_attributes.clone()
            } else {
                attributes
            };
            let merged = merge_duplicates(&catalog, &attributes);
            print_json(&Summary::from(&merged))
        }
        Commands::Diff { old, new, csv } => {
            let old = load(&old, &settings)?;
            let new = load(&new, &settings)?;
            let diffs = diff(&old, &new, &settings.rules, None);
            if csv {
                std::io::stdout().write_all(&render_diff_csv(&diffs)?)?;
                Ok(())
            } else {
                print_json(&diffs)
            }
        }
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn load(path: &Path, settings: &Settings) -> Result<Catalog> {
    let raw = read(path)?;
    settings
        .catalog_builder(file_stem(path))
        .source_url(path.display().to_string())
        .build(&raw)
        .with_context(|| format!("failed to import {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
