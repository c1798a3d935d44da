// Shared fixtures for the integration tests

pub mod global_sort_tests;
pub mod reconciliation_tests;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use unit_price_sorter::{
    AppError, Document, Fetcher, Reconciler, SharedDocument, SorterConfig,
    aggregator::current_page,
    plugins::notifiers::MemoryNotifier,
    tree::{NodeId, NodeQuery, TreeAdapter},
};
use url::Url;

pub const RANK: &str = "data-unit-price-rank";
pub const BASE_URL: &str = "https://shop.example/kategorija/mlijeko?sort=popular&page=1";

/// One product tile the way the shop renders it. `unit` is the unit price
/// with a decimal comma, or `None` for a tile without unit price text.
pub fn product(name: &str, unit: Option<&str>) -> String {
    let unit_price = unit
        .map(|u| format!("Cijena za jedinicu mjere: {} €/kom", u))
        .unwrap_or_default();
    format!(
        r#"<article class="product-item"><a href="/proizvod/{slug}"><h3 class="product-name">{name}</h3></a><div class="price">1,99 €</div><div class="unit-price">{unit_price}</div></article>"#,
        slug = name.to_lowercase(),
        name = name,
        unit_price = unit_price
    )
}

/// A listing page; `pages` adds a pagination bar linking pages `1..=pages`.
pub fn listing_page(products: &[(&str, Option<&str>)], pages: Option<u32>) -> String {
    let tiles: String = products.iter().map(|(name, unit)| product(name, *unit)).collect();
    let pagination = pages
        .map(|max| {
            let links: String = (1..=max)
                .map(|page| format!(r#"<a href="?page={page}">{page}</a>"#))
                .collect();
            format!(r#"<nav class="pagination">{links}</nav>"#)
        })
        .unwrap_or_default();
    format!(
        r#"<html><body><h1>Mlijeko</h1><div class="product-grid">{tiles}</div>{pagination}</body></html>"#
    )
}

/// Serves canned pages keyed by page number and records the fetch order.
#[derive(Default)]
pub struct StaticFetcher {
    pages: HashMap<u32, Result<String, u16>>,
    requested: Mutex<Vec<u32>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: u32, markup: String) -> Self {
        self.pages.insert(page, Ok(markup));
        self
    }

    pub fn failing(mut self, page: u32, status: u16) -> Self {
        self.pages.insert(page, Err(status));
        self
    }

    pub fn requested(&self) -> Vec<u32> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, url: &Url) -> unit_price_sorter::Result<String> {
        let page = current_page(url, "page");
        self.requested.lock().unwrap().push(page);
        match self.pages.get(&page) {
            Some(Ok(markup)) => Ok(markup.clone()),
            Some(Err(status)) => Err(AppError::Fetch {
                url: url.to_string(),
                status: *status,
            }),
            None => Err(AppError::Fetch {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

pub struct Harness {
    pub doc: SharedDocument,
    pub reconciler: Reconciler,
    pub notifier: Arc<MemoryNotifier>,
    pub fetcher: Arc<StaticFetcher>,
}

pub fn harness(markup: &str, fetcher: StaticFetcher) -> Harness {
    harness_with_config(markup, fetcher, SorterConfig::default())
}

pub fn harness_with_config(markup: &str, fetcher: StaticFetcher, config: SorterConfig) -> Harness {
    let doc = Document::parse(markup).into_shared();
    let notifier = Arc::new(MemoryNotifier::new());
    let fetcher = Arc::new(fetcher);
    let reconciler = Reconciler::new(doc.clone(), &config, fetcher.clone(), notifier.clone())
        .expect("valid test configuration");
    Harness {
        doc,
        reconciler,
        notifier,
        fetcher,
    }
}

impl Harness {
    pub async fn container(&self) -> NodeId {
        let doc = self.doc.lock().await;
        doc.find_all(&NodeQuery::class("product-grid"))[0]
    }

    /// `(name, rank)` for every product tile in document order.
    pub async fn tiles(&self) -> Vec<(String, Option<usize>)> {
        let doc = self.doc.lock().await;
        doc.find_all(&NodeQuery::class("product-item"))
            .into_iter()
            .map(|node| {
                let name = doc
                    .find_all_within(node, &NodeQuery::class("product-name"))
                    .first()
                    .map(|n| doc.text_of(*n))
                    .unwrap_or_default();
                let rank = doc.attr(node, RANK).and_then(|r| r.parse().ok());
                (name, rank)
            })
            .collect()
    }

    /// Product names ordered by their rank marker.
    pub async fn names_by_rank(&self) -> Vec<String> {
        let mut tiles: Vec<(String, usize)> = self
            .tiles()
            .await
            .into_iter()
            .filter_map(|(name, rank)| rank.map(|r| (name, r)))
            .collect();
        tiles.sort_by_key(|(_, rank)| *rank);
        tiles.into_iter().map(|(name, _)| name).collect()
    }

    pub async fn marker_count(&self) -> usize {
        let doc = self.doc.lock().await;
        doc.find_all(&NodeQuery::HasAttr(RANK.to_string())).len()
    }
}
