pub mod aggregator;
pub mod config;
pub mod item_locator;
pub mod models;
pub mod plugins;
pub mod price_extractor;
pub mod reconciler;
pub mod sort_engine;
pub mod tree;
pub mod utils;
pub mod watcher;

// Re-export commonly used types
pub use aggregator::{Aggregator, Fetcher, HttpFetcher};
pub use config::SorterConfig;
pub use item_locator::ItemLocator;
pub use models::{Item, SortDirection, SortOutcome, SortReport, SortScope};
pub use price_extractor::PriceExtractor;
pub use reconciler::{Reconciler, ReconcilerStats};
pub use tree::{Document, SharedDocument};
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
