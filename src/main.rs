use outfitter::catalog::CatalogIndex;
use outfitter::cli::{Cli, Commands, ConfigAction};
use outfitter::config::{Config, ConfigValidator};
use outfitter::error::{OutfitterError, Result};
use outfitter::intent::VisionSummary;
use outfitter::provider::{EmbeddingProvider, FastEmbedProvider, FastEmbedReranker, RerankProvider};
use outfitter::retrieval::{EngineProviders, RankedRecommendation, RetrievalEngine, RetrieveRequest};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Search {
            query,
            top_k,
            vision,
            json,
        } => {
            cmd_search(cli.config, &query, top_k, vision, json).await?;
        }
        Commands::Complete {
            anchor_id,
            top_k,
            json,
        } => {
            cmd_complete(cli.config, anchor_id, top_k, json).await?;
        }
        Commands::Info => {
            cmd_info(cli.config)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose {
        "outfitter=debug"
    } else {
        "outfitter=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(false).init();
}

async fn cmd_search(
    config_path: Option<PathBuf>,
    query: &str,
    top_k: usize,
    vision_path: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let vision = vision_path.map(|path| load_vision(&path)).transpose()?;
    let engine = build_engine(config)?;

    let results = engine
        .retrieve(RetrieveRequest::Search {
            query: query.to_string(),
            vision,
            top_k,
        })
        .await?;

    print_results(&engine, &results, json)?;
    Ok(())
}

async fn cmd_complete(
    config_path: Option<PathBuf>,
    anchor_id: u32,
    top_k: usize,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let engine = build_engine(config)?;

    if !json {
        let anchor = engine.catalog().product(anchor_id)?;
        println!("Completing the look around: {} ({})", anchor.name, anchor.article_type);
        println!();
    }

    let results = engine
        .retrieve(RetrieveRequest::CompleteTheLook { anchor_id, top_k })
        .await?;

    print_results(&engine, &results, json)?;
    Ok(())
}

fn cmd_info(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let catalog_path = config.catalog.path.clone();
    let models = (
        config.providers.embedding_model.clone(),
        config.providers.rerank_model.clone(),
    );

    // Inspection only: no providers, so no model downloads
    let catalog = Arc::new(CatalogIndex::load(&config.catalog.path)?);
    let engine = RetrievalEngine::new(config, Arc::clone(&catalog), EngineProviders::default())?;
    let stats = engine.stats();

    println!("Outfitter");
    println!("  Catalog: {:?}", catalog_path);
    println!("  Products: {}", stats.catalog_products);
    println!("  Embedding dimension: {}", stats.embedding_dim);
    println!("  Article types: {}", catalog.article_types().len());
    println!("  Colors: {}", catalog.colours().len());
    println!("  Models: embedding={}, rerank={}", models.0, models.1);

    let mut types = catalog.article_type_counts().to_vec();
    types.truncate(10);
    if !types.is_empty() {
        println!();
        println!("  Most common article types:");
        for (name, count) in types {
            println!("    {:6}  {}", count, name);
        }
    }

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };
            if path.exists() && !force {
                return Err(OutfitterError::Config(format!(
                    "Config file already exists at {:?} (use --force to overwrite)",
                    path
                )));
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| OutfitterError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }
            Config::default().save(&path)?;
            println!("✓ Wrote default config to {:?}", path);
        }
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Path => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };
            println!("{}", path.display());
        }
    }
    Ok(())
}

/// Load config from an explicit path (must exist) or the default path
/// (falling back to defaults when absent), apply environment overrides, and
/// validate. Invalid configuration is fatal.
fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let mut config = match config_path {
        Some(path) => Config::load(&path)?,
        None => {
            let path = Config::default_path()?;
            if path.exists() {
                Config::load(&path)?
            } else {
                tracing::debug!("No config file found; using defaults");
                Config::default()
            }
        }
    };
    config.apply_env_overrides();
    ConfigValidator::validate(&config)?;
    Ok(config)
}

/// Wire up the engine with whatever providers initialize cleanly. Model
/// initialization failure logs a warning and leaves the slot empty; the
/// engine degrades to lexical-only retrieval without reranking.
fn build_engine(config: Config) -> Result<RetrievalEngine> {
    let catalog = Arc::new(CatalogIndex::load(&config.catalog.path)?);

    let embedding: Option<Arc<dyn EmbeddingProvider>> =
        match FastEmbedProvider::new(&config.providers.embedding_model) {
            Ok(provider) => Some(Arc::new(provider)),
            Err(e) => {
                tracing::warn!(error = %e, "Embedding model unavailable; dense retrieval disabled");
                None
            }
        };
    let rerank: Option<Arc<dyn RerankProvider>> = if config.rerank.enabled {
        match FastEmbedReranker::new(&config.providers.rerank_model) {
            Ok(provider) => Some(Arc::new(provider)),
            Err(e) => {
                tracing::warn!(error = %e, "Rerank model unavailable; reranking disabled");
                None
            }
        }
    } else {
        None
    };

    RetrievalEngine::new(
        config,
        catalog,
        EngineProviders {
            embedding,
            rerank,
            extraction: None,
        },
    )
}

fn load_vision(path: &PathBuf) -> Result<VisionSummary> {
    let content = std::fs::read_to_string(path).map_err(|e| OutfitterError::Io {
        source: e,
        context: format!("Failed to read vision file: {:?}", path),
    })?;
    serde_json::from_str(&content).map_err(|e| OutfitterError::Json {
        source: e,
        context: format!("Failed to parse vision file: {:?}", path),
    })
}

fn print_results(
    engine: &RetrievalEngine,
    results: &[RankedRecommendation],
    json: bool,
) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results).map_err(|e| {
            OutfitterError::Json {
                source: e,
                context: "Failed to serialize results".to_string(),
            }
        })?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No matching products found.");
        return Ok(());
    }

    for item in results {
        let name = engine
            .catalog()
            .get(item.product_id)
            .map(|p| p.name.as_str())
            .unwrap_or("<unknown>");
        println!(
            "{:2}. [{:5}] {}  (score {:.3}, {:?})",
            item.rank, item.product_id, name, item.final_score, item.verdict
        );
        println!("      {}", item.signals.join(" · "));
    }

    Ok(())
}
