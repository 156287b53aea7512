use dashmap::DashMap;
use serenity::model::id::MessageId;
use std::{sync::Arc, time::Duration};
use tokio::{sync::oneshot, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::commands::CommandContext;
use crate::hub::schema::Resolution;

/// A pending command handed back to its waiter by the hub.
#[derive(Debug)]
pub struct Resolved {
    pub resolution: Resolution,
    pub context: CommandContext,
}

struct PendingEntry {
    context: CommandContext,
    registered_at: Instant,
    waiter: oneshot::Sender<Resolved>,
}

/// Commands waiting for the hub, keyed by their message id.
///
/// Whoever removes an entry first (hub resolution, dispatch timeout or the
/// sweep) owns it; every later attempt finds nothing.
pub struct PendingCommandTable {
    entries: DashMap<MessageId, PendingEntry>,
    max_age: Duration,
}

impl PendingCommandTable {
    pub fn new(max_age: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_age,
        }
    }

    /// Registers `context` under its message id. A second registration for
    /// the same id replaces the first, whose waiter then sees a closed channel.
    pub fn put(&self, context: CommandContext) -> oneshot::Receiver<Resolved> {
        let (waiter, receiver) = oneshot::channel();
        let key = context.message_id;
        let entry = PendingEntry {
            context,
            registered_at: Instant::now(),
            waiter,
        };

        if self.entries.insert(key, entry).is_some() {
            warn!(message_id = %key, "Pending command replaced");
        }
        receiver
    }

    /// Removes and returns the context registered under `key`, at most once.
    pub fn take(&self, key: MessageId) -> Option<CommandContext> {
        self.entries.remove(&key).map(|(_, entry)| entry.context)
    }

    /// Settles the pending command `key`. Returns `false` when it was already
    /// settled, timed out or swept.
    pub fn resolve(&self, key: MessageId, resolution: Resolution) -> bool {
        let Some((_, entry)) = self.entries.remove(&key) else {
            debug!(message_id = %key, ?resolution, "Late resolution ignored");
            return false;
        };

        let resolved = Resolved {
            resolution,
            context: entry.context,
        };
        if entry.waiter.send(resolved).is_err() {
            debug!(message_id = %key, "Waiter gone before resolution");
        }
        true
    }

    /// Evicts entries older than the max age and returns how many went.
    pub fn sweep(&self) -> usize {
        let stale: Vec<MessageId> = self
            .entries
            .iter()
            .filter(|entry| entry.registered_at.elapsed() >= self.max_age)
            .map(|entry| *entry.key())
            .collect();

        let mut removed = 0;
        for key in stale {
            let max_age = self.max_age;
            if self
                .entries
                .remove_if(&key, |_, entry| entry.registered_at.elapsed() >= max_age)
                .is_some()
            {
                removed += 1;
            }
        }

        if removed > 0 {
            info!("🧹 Swept {} stale pending commands", removed);
        }
        removed
    }

    pub fn spawn_sweeper(self: Arc<Self>, every: Duration, shutdown: CancellationToken) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        self.sweep();
                    }
                }
            }
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::testing::context;

    fn table() -> PendingCommandTable {
        PendingCommandTable::new(Duration::from_secs(300))
    }

    #[test]
    fn take_returns_context_exactly_once() {
        let table = table();
        let ctx = context(42, "ping", &[]);
        let _waiter = table.put(ctx.clone());

        assert_eq!(table.take(MessageId::new(42)), Some(ctx));
        assert_eq!(table.take(MessageId::new(42)), None);
    }

    #[tokio::test]
    async fn resolve_hands_context_to_waiter() {
        let table = table();
        let waiter = table.put(context(42, "play", &["song"]));

        assert!(table.resolve(MessageId::new(42), Resolution::Proceed));

        let resolved = waiter.await.unwrap();
        assert_eq!(resolved.resolution, Resolution::Proceed);
        assert_eq!(resolved.context.args, vec!["song".to_string()]);
        assert!(table.is_empty());
    }

    #[test]
    fn resolution_after_take_is_a_no_op() {
        let table = table();
        let _waiter = table.put(context(42, "ping", &[]));
        table.take(MessageId::new(42));

        assert!(!table.resolve(MessageId::new(42), Resolution::Proceed));
    }

    #[tokio::test]
    async fn last_write_wins() {
        let table = table();
        let first = table.put(context(42, "ping", &[]));
        let _second = table.put(context(42, "help", &[]));

        assert!(first.await.is_err());
        assert_eq!(table.take(MessageId::new(42)).unwrap().command, "help");
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_evicts_only_stale_entries() {
        let table = table();
        let old = table.put(context(1, "ping", &[]));
        tokio::time::advance(Duration::from_secs(200)).await;
        let _fresh = table.put(context(2, "ping", &[]));
        tokio::time::advance(Duration::from_secs(100)).await;

        assert_eq!(table.sweep(), 1);
        assert!(old.await.is_err());
        assert_eq!(table.len(), 1);
        assert!(table.take(MessageId::new(2)).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_runs_periodically() {
        let table = Arc::new(table());
        let shutdown = CancellationToken::new();
        table.clone().spawn_sweeper(Duration::from_secs(60), shutdown.clone());
        let _waiter = table.put(context(1, "ping", &[]));

        tokio::time::sleep(Duration::from_secs(361)).await;

        assert!(table.is_empty());
        shutdown.cancel();
    }
}
