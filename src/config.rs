use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use validator::Validate;

use crate::utils::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct SorterConfig {
    #[validate(nested)]
    pub locator: LocatorConfig,
    #[validate(nested)]
    pub extractor: ExtractorConfig,
    #[validate(nested)]
    pub reconciler: ReconcilerConfig,
    #[validate(nested)]
    pub aggregator: AggregatorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LocatorConfig {
    /// A candidate set must hold more than this many nodes to be plausible.
    #[validate(range(min = 1, max = 1000))]
    pub min_items: usize,
    #[validate(length(min = 1))]
    pub item_tag: String,
    #[validate(length(min = 1))]
    pub item_class: String,
    pub detail_link_patterns: Vec<String>,
    pub ancestor_tags: Vec<String>,
    pub class_substrings: Vec<String>,
    pub container_hints: Vec<String>,
    pub name_class_hints: Vec<String>,
    pub name_tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ExtractorConfig {
    #[validate(length(min = 1))]
    pub price_markers: Vec<String>,
    #[validate(length(min = 1))]
    pub currency_markers: Vec<String>,
    /// Maximum number of non-digit characters between a marker and its number.
    #[validate(range(max = 500))]
    pub marker_window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReconcilerConfig {
    #[validate(range(min = 1, max = 10000))]
    pub debounce_ms: u64,
    #[validate(range(min = 10, max = 60000))]
    pub poll_interval_ms: u64,
    #[validate(range(min = 1, max = 100))]
    pub reinit_attempts: usize,
    #[validate(range(min = 1, max = 60000))]
    pub reinit_delay_ms: u64,
    #[validate(length(min = 1))]
    pub rank_attribute: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AggregatorConfig {
    #[validate(length(min = 1))]
    pub page_param: String,
    #[validate(range(min = 1, max = 1000))]
    pub max_pages: u32,
    #[validate(length(min = 1))]
    pub pagination_hints: Vec<String>,
    #[validate(range(min = 1, max = 600))]
    pub request_timeout_secs: u64,
    #[validate(length(min = 1))]
    pub user_agent: String,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            min_items: 3,
            item_tag: "article".to_string(),
            item_class: "product-item".to_string(),
            detail_link_patterns: strings(&["/proizvod/", "/product/", "/p/"]),
            ancestor_tags: strings(&["article", "li"]),
            class_substrings: strings(&["product", "item", "card", "tile"]),
            container_hints: strings(&["grid", "list", "results", "products"]),
            name_class_hints: strings(&["name", "title"]),
            name_tags: strings(&["h2", "h3", "h4"]),
        }
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            price_markers: strings(&[
                "cijena za jedinicu mjere",
                "cijena za",
                "unit price",
                "price per",
                "jed. cijena",
            ]),
            currency_markers: strings(&["€", "$", "£", "kn", "eur"]),
            marker_window: 40,
        }
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 50,
            poll_interval_ms: 300,
            reinit_attempts: 5,
            reinit_delay_ms: 500,
            rank_attribute: "data-unit-price-rank".to_string(),
        }
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            page_param: "page".to_string(),
            max_pages: 50,
            pagination_hints: strings(&["pagination", "pager", "paging"]),
            request_timeout_secs: 20,
            user_agent: "UnitPriceSorter/0.1".to_string(),
        }
    }
}

impl ReconcilerConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl SorterConfig {
    /// Layered load: built-in defaults, `config/default.*`, an optional explicit
    /// file, then `UNIT_SORT__SECTION__KEY` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&SorterConfig::default())?)
            .add_source(File::with_name("config/default").required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix("UNIT_SORT")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("locator.detail_link_patterns")
                    .with_list_parse_key("locator.class_substrings")
                    .with_list_parse_key("extractor.price_markers")
                    .try_parsing(true),
            )
            .build()?;

        let config: SorterConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        Validate::validate(self)?;

        if self.reconciler.debounce_ms >= self.reconciler.poll_interval_ms {
            return Err(ConfigError::Message(
                "reconciler.debounce_ms must be shorter than reconciler.poll_interval_ms".into(),
            )
            .into());
        }

        if self.extractor.price_markers.iter().any(|m| m.trim().is_empty()) {
            return Err(ConfigError::Message("extractor.price_markers must not contain blanks".into()).into());
        }

        if self.aggregator.page_param.contains(['&', '=', '?']) {
            return Err(ConfigError::Message("aggregator.page_param must be a bare query key".into()).into());
        }

        Ok(())
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
