use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::tree::{MutationRecord, NodeId};

/// Why a reconciliation pass was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Child-list change on the watched container. `revision` is the newest
    /// document revision seen, or `None` when records were dropped and the
    /// exact revision is unknown.
    Mutation { revision: Option<u64> },
    /// Periodic verification tick.
    Poll,
}

impl Trigger {
    fn absorb(pending: Option<Trigger>, revision: Option<u64>) -> Trigger {
        match (pending, revision) {
            (Some(Trigger::Mutation { revision: None }), _) | (_, None) => Trigger::Mutation { revision: None },
            (Some(Trigger::Mutation { revision: Some(seen) }), Some(new)) => Trigger::Mutation {
                revision: Some(seen.max(new)),
            },
            (_, Some(new)) => Trigger::Mutation { revision: Some(new) },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSettings {
    pub debounce: Duration,
    pub poll_interval: Duration,
}

/// Owned background tasks. Dropping the handle cancels and aborts all of them.
pub struct WatchHandle {
    label: &'static str,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl WatchHandle {
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(|task| task.is_finished())
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        debug!("Stopped {} tasks", self.label);
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("label", &self.label)
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

/// Start the two drift signals for `container`: debounced child-list
/// mutations and a fixed-interval poll. `on_trigger` returns `false` to stop
/// the loop that called it.
pub fn spawn_watch<F, Fut>(
    mutations: broadcast::Receiver<MutationRecord>,
    container: NodeId,
    settings: WatchSettings,
    on_trigger: F,
) -> WatchHandle
where
    F: Fn(Trigger) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    let cancel = CancellationToken::new();
    let tasks = vec![
        tokio::spawn(watch_mutations(
            mutations,
            container,
            settings.debounce,
            cancel.clone(),
            on_trigger.clone(),
        )),
        tokio::spawn(poll(settings.poll_interval, cancel.clone(), on_trigger)),
    ];
    debug!("Watching container {}", container.index());
    WatchHandle {
        label: "watch",
        cancel,
        tasks,
    }
}

/// Run a single cancellable background job under an owned handle.
pub fn spawn_task<F, Fut>(label: &'static str, job: F) -> WatchHandle
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let cancel = CancellationToken::new();
    let task = tokio::spawn(job(cancel.clone()));
    WatchHandle {
        label,
        cancel,
        tasks: vec![task],
    }
}

async fn watch_mutations<F, Fut>(
    mut mutations: broadcast::Receiver<MutationRecord>,
    container: NodeId,
    debounce: Duration,
    cancel: CancellationToken,
    on_trigger: F,
) where
    F: Fn(Trigger) -> Fut,
    Fut: Future<Output = bool>,
{
    let mut pending: Option<Trigger> = None;
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = mutations.recv() => match received {
                Ok(record) => {
                    if record.target != container && !record.removed.contains(&container) {
                        continue;
                    }
                    pending = Some(Trigger::absorb(pending, Some(record.revision)));
                    deadline = Some(Instant::now() + debounce);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Mutation watcher lagged by {} records", skipped);
                    pending = Some(Trigger::absorb(pending, None));
                    deadline = Some(Instant::now() + debounce);
                }
                Err(RecvError::Closed) => break,
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                if let Some(trigger) = pending.take() {
                    if !on_trigger(trigger).await {
                        break;
                    }
                }
            }
        }
    }
}

async fn poll<F, Fut>(period: Duration, cancel: CancellationToken, on_trigger: F)
where
    F: Fn(Trigger) -> Fut,
    Fut: Future<Output = bool>,
{
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if !on_trigger(Trigger::Poll).await {
                    break;
                }
            }
        }
    }
}
