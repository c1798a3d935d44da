use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tokio_retry::Retry;
use tokio_retry::strategy::FixedInterval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::aggregator::{self, Aggregator, Fetcher};
use crate::config::{ReconcilerConfig, SorterConfig};
use crate::item_locator::ItemLocator;
use crate::models::{
    Item, ItemSource, PageItems, ReconcilerState, SortDirection, SortIntent, SortOutcome,
    SortReport, SortScope,
};
use crate::plugins::traits::Notifier;
use crate::price_extractor::PriceExtractor;
use crate::sort_engine;
use crate::tree::{ChildEntry, Document, NodeId, SharedDocument, TreeAdapter};
use crate::utils::error::{AppError, Result};
use crate::watcher::{self, Trigger, WatchHandle, WatchSettings};

pub const NOTHING_TO_SORT: &str = "Nothing to sort: no items found on this page";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilerStats {
    /// Sorts applied from an entry point.
    pub sorts: u64,
    /// Re-sorts caused by drift.
    pub reapplies: u64,
    pub mutation_triggers: u64,
    pub poll_triggers: u64,
    /// Successful recoveries after the watched container disappeared.
    pub reinits: u64,
    pub nothing_to_sort: u64,
}

/// Everything guarded by the intent lock. Always taken before the document lock.
struct Slot {
    intent: Option<SortIntent>,
    phase: ReconcilerState,
    watch: Option<WatchHandle>,
    container: Option<NodeId>,
    /// Document revision right after our last write.
    applied_revision: u64,
    /// Items located right after our last write.
    applied_count: usize,
    next_epoch: u64,
    page_url: Option<Url>,
    stats: ReconcilerStats,
}

impl Slot {
    fn new() -> Self {
        Self {
            intent: None,
            phase: ReconcilerState::Idle,
            watch: None,
            container: None,
            applied_revision: 0,
            applied_count: 0,
            next_epoch: 0,
            page_url: None,
            stats: ReconcilerStats::default(),
        }
    }

    /// Replace the live intent. Old watchers go first; the new intent counts as
    /// applied but unwatched until its sort lands.
    fn begin(&mut self, direction: SortDirection, scope: SortScope) -> SortIntent {
        self.stop_watching();
        self.phase = ReconcilerState::Applied;
        self.next_epoch += 1;
        let intent = SortIntent::new(direction, scope, self.next_epoch);
        self.intent = Some(intent);
        intent
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.intent.map(|intent| intent.epoch == epoch).unwrap_or(false)
    }

    fn stop_watching(&mut self) {
        if let Some(handle) = self.watch.take() {
            debug!("Tearing down {} handle", handle.label());
        }
    }

    fn reset(&mut self) {
        self.stop_watching();
        self.intent = None;
        self.phase = ReconcilerState::Idle;
        self.container = None;
        self.applied_count = 0;
    }
}

struct Inner {
    doc: SharedDocument,
    locator: ItemLocator,
    aggregator: Aggregator,
    notifier: Arc<dyn Notifier>,
    config: ReconcilerConfig,
    slot: Mutex<Slot>,
}

/// Owns the single sort intent and keeps the live document ordered by it.
///
/// Entry points never fail: problems end up as [`SortOutcome::NothingToSort`],
/// a log line, or a later reapplication. Background watchers stop when the
/// intent changes, when the sort is cleared, or when the last clone of the
/// reconciler is dropped.
#[derive(Clone)]
pub struct Reconciler {
    inner: Arc<Inner>,
}

struct GlobalPlan {
    intent: SortIntent,
    base: Url,
    max_page: u32,
}

impl Reconciler {
    pub fn new(
        doc: SharedDocument,
        config: &SorterConfig,
        fetcher: Arc<dyn Fetcher>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        config.validate()?;
        let extractor = PriceExtractor::new(&config.extractor)?;
        let locator = ItemLocator::new(config.locator.clone(), extractor);
        let aggregator = Aggregator::new(fetcher, config.aggregator.clone());
        Ok(Self::with_parts(
            doc,
            locator,
            aggregator,
            notifier,
            config.reconciler.clone(),
        ))
    }

    pub fn with_parts(
        doc: SharedDocument,
        locator: ItemLocator,
        aggregator: Aggregator,
        notifier: Arc<dyn Notifier>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                doc,
                locator,
                aggregator,
                notifier,
                config,
                slot: Mutex::new(Slot::new()),
            }),
        }
    }

    /// URL of the live page; global sorts derive the other pages from it.
    pub async fn set_page_url(&self, url: Url) {
        self.inner.slot.lock().await.page_url = Some(url);
    }

    pub async fn apply_local_sort(&self, ascending: bool) -> SortOutcome {
        let inner = &self.inner;
        let mut slot = inner.slot.lock().await;
        let intent = slot.begin(SortDirection::from_ascending(ascending), SortScope::Local);
        let mut doc = inner.doc.lock().await;

        let report = inner.sort_live(&mut slot, &mut doc, intent);
        Inner::conclude(inner, &mut slot, &mut doc, intent, report)
    }

    pub async fn apply_global_sort(&self, ascending: bool) -> SortOutcome {
        let inner = &self.inner;
        let plan = {
            let mut slot = inner.slot.lock().await;
            let intent = slot.begin(SortDirection::from_ascending(ascending), SortScope::Global);
            let mut doc = inner.doc.lock().await;

            if inner.locator.locate(&*doc).is_empty() {
                return Inner::conclude(inner, &mut slot, &mut doc, intent, None);
            }

            let max_page = aggregator::detect_max_page(&*doc, inner.aggregator.config());
            match slot.page_url.clone() {
                Some(base) if max_page > 1 => GlobalPlan {
                    intent,
                    base,
                    max_page,
                },
                page_url => {
                    if max_page > 1 && page_url.is_none() {
                        warn!("Found {} pages but no page URL is set; sorting this page only", max_page);
                    } else {
                        debug!("No other pages; sorting this page only");
                    }
                    let report = inner.sort_live(&mut slot, &mut doc, intent);
                    return Inner::conclude(inner, &mut slot, &mut doc, intent, report);
                }
            }
        };

        let current = aggregator::current_page(&plan.base, &inner.aggregator.config().page_param);
        info!(
            "Global sort: fetching {} other pages of {}",
            plan.max_page.saturating_sub(1),
            plan.base
        );
        let pages = inner
            .aggregator
            .collect_pages(&inner.locator, &plan.base, current, plan.max_page)
            .await;

        let mut slot = inner.slot.lock().await;
        if !slot.is_current(plan.intent.epoch) {
            info!("Global sort superseded while fetching; discarding {} pages", pages.len());
            return SortOutcome::Superseded;
        }
        let mut doc = inner.doc.lock().await;
        let report = inner.apply_merged(&mut slot, &mut doc, plan.intent, current, pages);
        Inner::conclude(inner, &mut slot, &mut doc, plan.intent, report)
    }

    /// Drop the intent, stop every watcher and remove all rank markers.
    pub async fn clear_sort(&self) {
        let mut slot = self.inner.slot.lock().await;
        let had_intent = slot.intent.is_some();
        slot.reset();
        let mut doc = self.inner.doc.lock().await;
        let removed = sort_engine::clear_ranks(&mut doc, &self.inner.config.rank_attribute);
        info!(
            "Cleared sort (was active: {}), removed {} rank markers",
            had_intent, removed
        );
    }

    pub async fn state(&self) -> ReconcilerState {
        self.inner.slot.lock().await.phase
    }

    pub async fn intent(&self) -> Option<SortIntent> {
        self.inner.slot.lock().await.intent
    }

    pub async fn stats(&self) -> ReconcilerStats {
        self.inner.slot.lock().await.stats.clone()
    }

    /// Live items in rank order; unranked items follow in discovery order.
    pub async fn ranked_items(&self) -> Vec<Item> {
        let inner = &self.inner;
        let slot = inner.slot.lock().await;
        let page = inner.current_page(&slot);
        let doc = inner.doc.lock().await;

        let nodes = inner.locator.locate(&*doc);
        let mut items = inner.locator.build_items(&*doc, &nodes, page, true);
        for item in &mut items {
            item.rank = item
                .node()
                .and_then(|node| doc.attr(node, &inner.config.rank_attribute))
                .and_then(|value| value.parse().ok());
        }
        items.sort_by_key(|item| item.rank.unwrap_or(usize::MAX));
        items
    }
}

impl Inner {
    fn current_page(&self, slot: &Slot) -> u32 {
        slot.page_url
            .as_ref()
            .map(|url| aggregator::current_page(url, &self.aggregator.config().page_param))
            .unwrap_or(1)
    }

    /// Local variant over the live tree. `None` when no items were found.
    fn sort_live(&self, slot: &mut Slot, doc: &mut Document, intent: SortIntent) -> Option<SortReport> {
        let nodes = self.locator.locate(&*doc);
        let first = *nodes.first()?;
        let container = doc.parent_of(first)?;
        let rank_attr = &self.config.rank_attribute;

        sort_engine::clear_ranks(doc, rank_attr);
        let items = self.locator.build_items(&*doc, &nodes, self.current_page(slot), true);
        let sorted = sort_engine::sort_items(items, intent.direction);
        let applied = sort_engine::apply_ranks(doc, container, &sorted, rank_attr);
        let priced = sorted.iter().filter(|item| item.has_price()).count();

        slot.container = Some(container);
        slot.applied_revision = doc.revision();
        slot.applied_count = nodes.len();
        slot.phase = ReconcilerState::Applied;

        Some(SortReport {
            scope: SortScope::Local,
            direction: intent.direction,
            priced,
            unpriced: sorted.len() - priced,
            skipped: applied.skipped,
            pages: 1,
        })
    }

    /// Global variant: merge fetched pages with the live items and replace the
    /// container's content with the merged order.
    fn apply_merged(
        &self,
        slot: &mut Slot,
        doc: &mut Document,
        intent: SortIntent,
        current: u32,
        mut pages: Vec<PageItems>,
    ) -> Option<SortReport> {
        let nodes = self.locator.locate(&*doc);
        let first = *nodes.first()?;
        let container = doc.parent_of(first)?;
        let rank_attr = &self.config.rank_attribute;

        let (direct, foreign): (Vec<NodeId>, Vec<NodeId>) = nodes
            .into_iter()
            .partition(|node| doc.is_direct_child_of(*node, container));
        for node in &foreign {
            warn!(
                "Item node {} is not a direct child of container {}; skipping",
                node.index(),
                container.index()
            );
        }

        let live = self.locator.build_items(&*doc, &direct, current, true);
        let page_count = pages.len() as u32 + 1;
        pages.push(PageItems::new(current, live));
        let merged = sort_engine::merge_pages(pages, intent.direction);

        sort_engine::clear_ranks(doc, rank_attr);
        let entries: Vec<ChildEntry> = merged
            .iter()
            .map(|item| match &item.source {
                ItemSource::Live(node) => ChildEntry::Existing(*node),
                ItemSource::Snapshot(markup) => ChildEntry::Markup(markup.clone()),
            })
            .collect();
        let placed = doc.replace_children(container, entries);

        let mut skipped = foreign.len();
        let mut positioned = Vec::with_capacity(merged.len());
        for (mut item, node) in merged.into_iter().zip(placed) {
            match node {
                Some(node) => {
                    item.source = ItemSource::Live(node);
                    positioned.push(item);
                }
                None => {
                    warn!("Could not place item '{}' from page {}", item.name, item.page);
                    skipped += 1;
                }
            }
        }

        let applied = sort_engine::apply_ranks(doc, container, &positioned, rank_attr);
        let priced = positioned.iter().filter(|item| item.has_price()).count();

        slot.container = Some(container);
        slot.applied_revision = doc.revision();
        slot.applied_count = self.locator.locate(&*doc).len();
        slot.phase = ReconcilerState::Applied;

        Some(SortReport {
            scope: SortScope::Global,
            direction: intent.direction,
            priced,
            unpriced: positioned.len() - priced,
            skipped: skipped + applied.skipped,
            pages: page_count,
        })
    }

    /// Finish an entry-point sort: start watching and notify, or report that
    /// there was nothing to sort.
    fn conclude(
        inner: &Arc<Inner>,
        slot: &mut Slot,
        doc: &mut Document,
        intent: SortIntent,
        report: Option<SortReport>,
    ) -> SortOutcome {
        match report {
            Some(report) => {
                Inner::watch(inner, slot, doc, intent.epoch);
                slot.stats.sorts += 1;
                info!(
                    "Applied {:?} {:?} sort: {} priced, {} unpriced, {} skipped",
                    report.scope, report.direction, report.priced, report.unpriced, report.skipped
                );
                inner.notifier.notify(&report.summary());
                SortOutcome::Sorted(report)
            }
            None => {
                sort_engine::clear_ranks(doc, &inner.config.rank_attribute);
                slot.reset();
                slot.stats.nothing_to_sort += 1;
                info!("No items found; nothing to sort");
                inner.notifier.notify(NOTHING_TO_SORT);
                SortOutcome::NothingToSort
            }
        }
    }

    /// Install both drift signals on the current container, replacing any
    /// previous handle.
    fn watch(inner: &Arc<Inner>, slot: &mut Slot, doc: &Document, epoch: u64) {
        let Some(container) = slot.container else {
            return;
        };
        slot.stop_watching();

        let settings = WatchSettings {
            debounce: inner.config.debounce(),
            poll_interval: inner.config.poll_interval(),
        };
        let weak = Arc::downgrade(inner);
        let handle = watcher::spawn_watch(doc.subscribe(), container, settings, move |trigger| {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(inner) => Inner::reconcile(&inner, epoch, trigger).await,
                    None => false,
                }
            }
        });
        slot.watch = Some(handle);
        slot.phase = ReconcilerState::Watching;
    }

    /// One reconciliation pass. Returns `false` when the calling loop should stop.
    async fn reconcile(inner: &Arc<Inner>, epoch: u64, trigger: Trigger) -> bool {
        let mut slot = inner.slot.lock().await;
        let Some(intent) = slot.intent.filter(|intent| intent.epoch == epoch) else {
            return false;
        };
        let mut doc = inner.doc.lock().await;

        match trigger {
            Trigger::Poll => slot.stats.poll_triggers += 1,
            Trigger::Mutation { .. } => slot.stats.mutation_triggers += 1,
        }

        let container_attached = slot.container.map(|c| doc.contains(c)).unwrap_or(false);
        if !container_attached {
            warn!("Watched container left the document; re-initializing");
            slot.container = None;
            slot.phase = ReconcilerState::Applied;
            slot.watch = Some(Inner::spawn_reinit(inner, epoch));
            return false;
        }

        let needed = match trigger {
            Trigger::Mutation {
                revision: Some(revision),
            } => revision > slot.applied_revision,
            Trigger::Mutation { revision: None } => true,
            Trigger::Poll => inner.has_drifted(&slot, &doc),
        };
        if !needed {
            return true;
        }

        let previous = slot.container;
        match inner.sort_live(&mut slot, &mut doc, intent) {
            Some(report) => {
                slot.stats.reapplies += 1;
                metrics::counter!("unit_price_sorter_reapplies_total").increment(1);
                info!(
                    "Reapplied sort after {:?}: {} priced, {} unpriced",
                    trigger, report.priced, report.unpriced
                );
                if slot.container != previous {
                    Inner::watch(inner, &mut slot, &doc, epoch);
                    return false;
                }
                slot.phase = ReconcilerState::Watching;
                true
            }
            None => {
                debug!("No items in the document right now; waiting for the host");
                slot.applied_revision = doc.revision();
                slot.applied_count = 0;
                true
            }
        }
    }

    /// Poll-side drift: a different item count, an item without a marker, a
    /// marker that disagrees with the ordering property, or a duplicated marker.
    fn has_drifted(&self, slot: &Slot, doc: &Document) -> bool {
        let nodes = self.locator.locate(doc);
        if nodes.len() != slot.applied_count {
            debug!("Item count changed: {} -> {}", slot.applied_count, nodes.len());
            return true;
        }
        let Some(container) = slot.container else {
            return !nodes.is_empty();
        };

        let rank_attr = &self.config.rank_attribute;
        let mut seen = HashSet::new();
        for node in nodes
            .into_iter()
            .filter(|node| doc.is_direct_child_of(*node, container))
        {
            let rank = doc
                .attr(node, rank_attr)
                .and_then(|value| value.parse::<usize>().ok());
            match rank {
                None => {
                    debug!("Node {} lost its rank marker", node.index());
                    return true;
                }
                Some(rank) if doc.order_of(node) != Some(rank as i64) || !seen.insert(rank) => {
                    debug!("Node {} has a stale or duplicate rank {}", node.index(), rank);
                    return true;
                }
                Some(_) => {}
            }
        }
        false
    }

    fn spawn_reinit(inner: &Arc<Inner>, epoch: u64) -> WatchHandle {
        let weak = Arc::downgrade(inner);
        let attempts = inner.config.reinit_attempts;
        let delay_ms = inner.config.reinit_delay_ms;
        watcher::spawn_task("reinit", move |cancel| {
            Inner::reinit(weak, epoch, attempts, delay_ms, cancel)
        })
    }

    /// Wait for items to reappear, then reapply the intent and watch the new
    /// container. One immediate check plus `attempts` retries, then `Idle`.
    async fn reinit(
        weak: Weak<Inner>,
        epoch: u64,
        attempts: usize,
        delay_ms: u64,
        cancel: CancellationToken,
    ) {
        let strategy = FixedInterval::from_millis(delay_ms).take(attempts);
        let check = || Inner::items_present(weak.clone());
        let found = tokio::select! {
            _ = cancel.cancelled() => return,
            result = Retry::spawn(strategy, check) => result.is_ok(),
        };

        let Some(inner) = weak.upgrade() else {
            return;
        };
        let mut slot = inner.slot.lock().await;
        let Some(intent) = slot.intent.filter(|intent| intent.epoch == epoch) else {
            return;
        };

        if found {
            let mut doc = inner.doc.lock().await;
            if let Some(report) = inner.sort_live(&mut slot, &mut doc, intent) {
                slot.stats.reinits += 1;
                info!(
                    "Re-initialized on container {:?} with {} items",
                    slot.container.map(|c| c.index()),
                    report.total()
                );
                Inner::watch(&inner, &mut slot, &doc, epoch);
                return;
            }
        }

        let mut doc = inner.doc.lock().await;
        let removed = sort_engine::clear_ranks(&mut doc, &inner.config.rank_attribute);
        warn!(
            "Items did not reappear after {} attempts; sort cleared, {} rank markers removed",
            attempts + 1,
            removed
        );
        slot.reset();
    }

    async fn items_present(weak: Weak<Inner>) -> Result<()> {
        let Some(inner) = weak.upgrade() else {
            return Ok(());
        };
        let doc = inner.doc.lock().await;
        if inner.locator.locate(&*doc).is_empty() {
            debug!("Re-init check: no items yet");
            return Err(AppError::Internal("no items located".to_string()));
        }
        Ok(())
    }
}
