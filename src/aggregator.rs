use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::AggregatorConfig;
use crate::item_locator::ItemLocator;
use crate::models::PageItems;
use crate::tree::{Document, NodeQuery, TreeAdapter};
use crate::utils::error::{AppError, Result};

const PAGE_LINK_TAGS: &[&str] = &["a", "button", "li", "span"];

/// Network fetch of one page's raw markup. No retries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<String>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &AggregatorConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<String> {
        debug!("Fetching {}", url);
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Fetch {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }
}

/// Largest integer shown in pagination links, 1 when the page has no
/// pagination, capped at `max_pages`.
pub fn detect_max_page(tree: &dyn TreeAdapter, config: &AggregatorConfig) -> u32 {
    let containers = tree.find_all(&NodeQuery::AnyOf(
        config
            .pagination_hints
            .iter()
            .filter(|hint| !hint.is_empty())
            .map(|hint| NodeQuery::class_contains(hint))
            .collect(),
    ));
    let links = NodeQuery::AnyOf(PAGE_LINK_TAGS.iter().map(|tag| NodeQuery::tag(tag)).collect());

    let detected = containers
        .iter()
        .flat_map(|container| tree.find_all_within(*container, &links))
        .flat_map(|link| integers_in(&tree.text_of(link)))
        .max()
        .unwrap_or(1)
        .max(1);

    if detected > config.max_pages {
        warn!(
            "Pagination reports {} pages; capping at {}",
            detected, config.max_pages
        );
    }
    detected.min(config.max_pages)
}

fn integers_in(text: &str) -> Vec<u32> {
    text.split(|c: char| !c.is_ascii_digit())
        .filter_map(|token| token.parse::<u32>().ok())
        .collect()
}

/// Page number carried by `url`, 1 when absent or unreadable.
pub fn current_page(url: &Url, param: &str) -> u32 {
    url.query_pairs()
        .find(|(key, _)| key == param)
        .and_then(|(_, value)| value.parse::<u32>().ok())
        .filter(|page| *page >= 1)
        .unwrap_or(1)
}

/// `base` with its page parameter set to `page`; other parameters are kept.
pub fn page_url(base: &Url, page: u32, param: &str) -> Url {
    let kept: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(key, _)| key != param)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut url = base.clone();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept.iter())
        .append_pair(param, &page.to_string());
    url
}

/// Drives fetch-and-parse of the other pages of a collection.
#[derive(Clone)]
pub struct Aggregator {
    fetcher: Arc<dyn Fetcher>,
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: AggregatorConfig) -> Self {
        Self { fetcher, config }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Fetch and locate one page. A failed fetch is logged and yields no items.
    pub async fn fetch_page(&self, locator: &ItemLocator, base: &Url, page: u32) -> PageItems {
        let url = page_url(base, page, &self.config.page_param);
        match self.fetcher.fetch(&url).await {
            Ok(markup) => {
                let doc = Document::parse(&markup);
                let items = locator.locate_items(&doc, page, false);
                debug!("Page {} yielded {} items", page, items.len());
                PageItems::new(page, items)
            }
            Err(e) => {
                warn!("Failed to fetch page {} ({}): {}", page, url, e);
                metrics::counter!("unit_price_sorter_page_failures_total").increment(1);
                PageItems::empty(page)
            }
        }
    }

    /// Every page in `1..=max_page` except `current`, fetched one at a time in
    /// ascending order.
    pub async fn collect_pages(
        &self,
        locator: &ItemLocator,
        base: &Url,
        current: u32,
        max_page: u32,
    ) -> Vec<PageItems> {
        let mut pages = Vec::new();
        for page in (1..=max_page).filter(|page| *page != current) {
            pages.push(self.fetch_page(locator, base, page).await);
        }
        info!(
            "Aggregated {} items from {} other pages",
            pages.iter().map(|p| p.items.len()).sum::<usize>(),
            pages.len()
        );
        pages
    }
}
