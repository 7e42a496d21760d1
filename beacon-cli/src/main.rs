//! `beacon` — build retrieval catalogs offline and run queries from the
//! shell.
//!
//! The serving layer embeds [`beacon_retrieval::RetrievalEngine`]
//! directly; this binary covers the batch side (building indices and
//! embedding caches ahead of deployment) and ad-hoc query checks.

mod manifest;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use beacon_retrieval::{NominatimGeocoder, OpenAiEmbeddingProvider, RetrievalEngine, render};
use manifest::CatalogManifest;

#[derive(Parser)]
#[command(name = "beacon", version, about = "Build and query community-resource retrieval catalogs")]
struct Cli {
    /// Path to the catalog manifest (JSON).
    #[arg(long, global = true, default_value = "catalogs.json")]
    manifest: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build every registered catalog and write the embedding caches.
    Build,
    /// Run one resource query and print the ranked results.
    Search {
        /// Organization key, e.g. cspnj.
        #[arg(long)]
        org: String,
        /// Free-text user location (city or zip).
        #[arg(long)]
        location: Option<String>,
        /// Number of results; defaults from the manifest config.
        #[arg(long)]
        k: Option<usize>,
        /// The query text.
        query: String,
    },
    /// Run one guidance query and print the matched articles.
    Guidance {
        /// Category key, e.g. crisis.
        #[arg(long)]
        category: String,
        /// Number of results; defaults from the manifest config.
        #[arg(long)]
        k: Option<usize>,
        /// The query text.
        query: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let manifest = CatalogManifest::load(&cli.manifest)
        .with_context(|| format!("failed to load manifest {}", cli.manifest.display()))?;
    let engine = build_engine(&manifest)?;

    match cli.command {
        Command::Build => {
            engine.warm().await.context("catalog build failed")?;
            println!("All catalogs built.");
        }
        Command::Search { org, location, k, query } => {
            let results = engine.search_resources(&query, &org, location.as_deref(), k).await?;
            println!("{}", render::format_results(&results));
        }
        Command::Guidance { category, k, query } => {
            let articles = engine.search_guidance(&query, &category, k).await?;
            println!("{}", render::format_guidance(&articles));
        }
    }

    Ok(())
}

/// Wire the engine from the manifest: embedding provider, geocoder, and
/// every registered catalog source.
fn build_engine(manifest: &CatalogManifest) -> Result<RetrievalEngine> {
    let mut provider =
        OpenAiEmbeddingProvider::from_env().context("embedding provider unavailable")?;
    if let Some(model) = &manifest.embedding.model {
        provider = provider.with_model(model.as_str());
    }
    if let Some(dimensions) = manifest.embedding.dimensions {
        provider = provider.with_dimensions(dimensions);
    }

    let mut builder = RetrievalEngine::builder()
        .config(manifest.config.clone())
        .embedding_provider(Arc::new(provider))
        .cache_dir(&manifest.cache_dir);

    if let Some(settings) = &manifest.geocoder {
        let mut geocoder = NominatimGeocoder::new();
        if let Some(base_url) = &settings.base_url {
            geocoder = geocoder.with_base_url(base_url.as_str());
        }
        if let Some(user_agent) = &settings.user_agent {
            geocoder = geocoder.with_user_agent(user_agent.as_str());
        }
        builder = builder.geocoder(Arc::new(geocoder));
    }

    for (org, path) in &manifest.resources {
        builder = builder
            .resource_catalog(org, path)
            .with_context(|| format!("invalid organization key '{org}'"))?;
    }
    for (category, path) in &manifest.guidance {
        builder = builder
            .guidance_catalog(category, path)
            .with_context(|| format!("invalid category key '{category}'"))?;
    }

    Ok(builder.build()?)
}
