use jurix::cli::{Cli, Commands, ConfigAction};
use jurix::compression::CompressedContext;
use jurix::config::{Config, ConfigValidator};
use jurix::embedding::{embed_passages, embed_query, EmbeddingProvider, FastEmbedProvider};
use jurix::engine::RetrievalEngine;
use jurix::error::{JurixError, Result};
use jurix::store::{read_jsonl, Chunk, ChunkCatalog, ChunkStore, SnapshotBuilder};
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Rebuild { input, keep } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_rebuild(&config, &input, keep)?;
        }
        Commands::Query {
            query,
            budget,
            lexical_only,
            json,
        } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_query(&config, &query, budget, lexical_only, json)?;
        }
        Commands::Stats => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_stats(&config)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "jurix=debug" } else { "jurix=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn cmd_rebuild(config: &Config, input: &Path, keep: Option<usize>) -> Result<()> {
    tracing::info!("Rebuilding index from {}", input.display());

    let mut records = read_jsonl(input)?;
    let builder = SnapshotBuilder::new(config.lexical.clone(), config.vector.clone());
    let tokenizer = builder.tokenizer();

    // Fill in missing embeddings
    let missing: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.needs_embedding())
        .map(|(i, _)| i)
        .collect();

    if !missing.is_empty() {
        tracing::info!("Embedding {} passages without vectors", missing.len());
        let provider = FastEmbedProvider::new(&config.embedding.model)?;
        let texts: Vec<String> = missing.iter().map(|&i| records[i].text.clone()).collect();
        let embeddings = embed_passages(&provider, &config.embedding, &texts)?;
        for (i, embedding) in missing.into_iter().zip(embeddings) {
            records[i].embedding = Some(embedding);
        }
    }

    let chunks: Vec<Chunk> = records
        .into_iter()
        .map(|r| r.into_chunk(&tokenizer))
        .collect::<std::result::Result<_, _>>()?;

    // Reject bad chunk sets before anything is written
    let store = ChunkStore::new(0, chunks.clone())?;

    let catalog = open_catalog(config)?;
    let outcome = catalog.import(&chunks)?;

    if outcome.created {
        println!(
            "✓ Snapshot v{} written ({} chunks, dim {})",
            outcome.version,
            store.len(),
            store.dimension()
        );
    } else {
        println!(
            "✓ Chunks unchanged, snapshot v{} still active",
            outcome.version
        );
    }
    println!("  Content hash: {}", &outcome.content_hash[..16]);

    if let Some(keep) = keep {
        let removed = catalog.prune(keep.max(1))?;
        println!("  Pruned {} old snapshots", removed);
    }

    Ok(())
}

fn cmd_query(
    config: &Config,
    query: &str,
    budget: Option<usize>,
    lexical_only: bool,
    json: bool,
) -> Result<()> {
    let catalog = open_catalog(config)?;
    let (version, chunks) = catalog.load_latest()?.ok_or(JurixError::NoSnapshot)?;

    let builder = SnapshotBuilder::new(config.lexical.clone(), config.vector.clone());
    let snapshot = builder.build(version, chunks)?;
    let engine = RetrievalEngine::from_config(snapshot, config)?;

    let embedding = if lexical_only {
        Vec::new()
    } else {
        let provider = FastEmbedProvider::new(&config.embedding.model)?;
        tracing::debug!(
            "Embedding query with {} ({}D)",
            provider.model_name(),
            provider.dimension()
        );
        embed_query(&provider, &config.embedding, query)?
    };

    let budget = budget.unwrap_or(config.compression.budget);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| JurixError::Io {
            source: e,
            context: "Failed to start async runtime".to_string(),
        })?;
    let context = runtime.block_on(engine.retrieve(query, &embedding, budget))?;

    if json {
        let output = serde_json::to_string_pretty(&context).map_err(|e| JurixError::Json {
            source: e,
            context: "Failed to serialize context".to_string(),
        })?;
        println!("{}", output);
    } else {
        print_context(&context, budget);
    }

    Ok(())
}

fn print_context(context: &CompressedContext, budget: usize) {
    println!(
        "Status: {:?} | {} passages | {}/{} tokens",
        context.status,
        context.passages.len(),
        context.total_tokens,
        budget
    );
    println!("Rerank: {:?}", context.rerank);

    for passage in &context.passages {
        println!();
        let marker = if passage.truncated { " (truncated)" } else { "" };
        match &passage.title {
            Some(title) => println!("[{}] {}{}", passage.source_ref, title, marker),
            None => println!("[{}]{}", passage.source_ref, marker),
        }
        println!("{}", passage.text.trim());
    }
}

fn cmd_stats(config: &Config) -> Result<()> {
    let catalog = open_catalog(config)?;
    let stats = catalog.stats()?;

    println!("Jurix Status");
    println!("============");
    match stats.latest_version {
        Some(version) => {
            println!("Active snapshot: v{}", version);
            println!("  Chunks:    {}", stats.latest_chunk_count);
            println!("  Dimension: {}", stats.latest_dimension);
            if let Some(created_at) = &stats.latest_created_at {
                println!("  Created:   {}", created_at);
            }
        }
        None => println!("Active snapshot: none (run 'jurix rebuild')"),
    }
    println!("Snapshots stored: {}", stats.snapshot_count);
    println!(
        "Backends: lexical={:?}, vector={:?}, rerank={:?}",
        config.lexical.backend, config.vector.backend, config.rerank.model
    );

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path, None)?;
            let toml = toml::to_string_pretty(&config)?;
            println!("{}", toml);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
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

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    let mut config = if path.exists() {
        Config::load(&path)?
    } else {
        tracing::warn!(
            "Config file not found, using defaults. Run 'jurix config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    };

    if let Some(profile) = profile {
        config.apply_profile(&profile)?;
    }
    ConfigValidator::validate(&config)?;

    Ok(config)
}

fn open_catalog(config: &Config) -> Result<ChunkCatalog> {
    let data_dir = expand_path(&config.storage.data_dir)?;
    ChunkCatalog::open(
        &data_dir.join("catalog.sqlite"),
        config.storage.compression_threshold,
    )
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| JurixError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| JurixError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}
