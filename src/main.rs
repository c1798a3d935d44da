use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use url::Url;

use unit_price_sorter::plugins::notifiers::LogNotifier;
use unit_price_sorter::{Document, Fetcher, HttpFetcher, Reconciler, SortOutcome, SorterConfig};

/// Sort a product listing page by unit price.
#[derive(Debug, Parser)]
#[command(name = "unit-price-sorter", version)]
struct Cli {
    /// Listing page: a local HTML file or an http(s) URL
    source: String,

    /// Most expensive per unit first
    #[arg(long)]
    descending: bool,

    /// Merge every page of the listing before sorting
    #[arg(long)]
    global: bool,

    /// Extra configuration file (TOML, YAML or JSON)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// URL the local file was saved from; needed for --global with a file
    #[arg(long, value_name = "URL")]
    page_url: Option<Url>,

    /// Print the ranked items as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("unit_price_sorter=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = SorterConfig::load(cli.config.as_deref())?;
    let fetcher = Arc::new(HttpFetcher::new(&config.aggregator)?);

    let (markup, page_url) = match Url::parse(&cli.source) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            info!("Loading {}", url);
            (fetcher.fetch(&url).await?, Some(url))
        }
        _ => {
            let markup = std::fs::read_to_string(&cli.source)
                .with_context(|| format!("Failed to read {}", cli.source))?;
            (markup, cli.page_url.clone())
        }
    };

    let doc = Document::parse(&markup).into_shared();
    let reconciler = Reconciler::new(doc, &config, fetcher, Arc::new(LogNotifier::new()))?;
    if let Some(url) = page_url {
        reconciler.set_page_url(url).await;
    }

    let ascending = !cli.descending;
    let outcome = if cli.global {
        reconciler.apply_global_sort(ascending).await
    } else {
        reconciler.apply_local_sort(ascending).await
    };

    if let SortOutcome::Sorted(report) = &outcome {
        let items = reconciler.ranked_items().await;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({ "report": report, "items": items }))?
            );
        } else {
            for item in &items {
                let price = item
                    .unit_price
                    .map(|p| format!("{:.2}", p))
                    .unwrap_or_else(|| "-".to_string());
                let rank = item.rank.map(|r| (r + 1).to_string()).unwrap_or_default();
                println!("{:>4}  {:>8}  {}", rank, price, item.name);
            }
        }
    }

    reconciler.clear_sort().await;
    info!("Done: {:?}", outcome);
    Ok(())
}
