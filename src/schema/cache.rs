//! Schema cache
//!
//! The one piece of shared state in the gateway. Readers take an `Arc` to the
//! current snapshot; refreshes swap the whole snapshot, never mutate it.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::snapshot::{SchemaOracle, SchemaSnapshot};
use super::types::{ColumnInfo, ForeignKeyInfo, TableRef};

/// Sender side handed to the external migration notifier
pub type SnapshotSender = mpsc::UnboundedSender<SchemaSnapshot>;

/// Receiver side consumed by [`SchemaCache::spawn_listener`]
pub type SnapshotReceiver = mpsc::UnboundedReceiver<SchemaSnapshot>;

/// Versioned, wholesale-refreshed schema cache
#[derive(Debug, Clone)]
pub struct SchemaCache {
    current: Arc<RwLock<Arc<SchemaSnapshot>>>,
}

impl SchemaCache {
    pub fn new(snapshot: SchemaSnapshot) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(snapshot))),
        }
    }

    /// Current snapshot
    pub fn current(&self) -> Arc<SchemaSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Install a newer snapshot. Returns false if `snapshot` is not newer.
    pub fn install(&self, snapshot: SchemaSnapshot) -> bool {
        let mut guard = self.current.write();
        if snapshot.version() <= guard.version() {
            tracing::debug!(
                event = "SCHEMA_REFRESH_IGNORED",
                current = guard.version(),
                offered = snapshot.version(),
            );
            return false;
        }
        tracing::info!(
            event = "SCHEMA_REFRESHED",
            from = guard.version(),
            to = snapshot.version(),
            tables = snapshot.len(),
        );
        *guard = Arc::new(snapshot);
        true
    }

    /// Channel pair for an external notifier
    pub fn channel() -> (SnapshotSender, SnapshotReceiver) {
        mpsc::unbounded_channel()
    }

    /// Install snapshots from the notifier until the sender is dropped
    pub fn spawn_listener(&self, mut rx: SnapshotReceiver) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            while let Some(snapshot) = rx.recv().await {
                cache.install(snapshot);
            }
            tracing::debug!(event = "SCHEMA_LISTENER_CLOSED");
        })
    }
}

impl SchemaOracle for SchemaCache {
    fn list_tables(&self) -> Vec<TableRef> {
        self.current().list_tables()
    }

    fn get_columns(&self, table: &TableRef) -> Option<Vec<ColumnInfo>> {
        self.current().get_columns(table)
    }

    fn get_foreign_keys(&self, table: &TableRef) -> Vec<ForeignKeyInfo> {
        self.current().get_foreign_keys(table)
    }

    fn get_primary_key(&self, table: &TableRef) -> Vec<String> {
        self.current().get_primary_key(table)
    }

    fn version(&self) -> u64 {
        self.current.read().version()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::{ColumnType, TableInfo};

    fn snapshot(version: u64) -> SchemaSnapshot {
        let table = TableInfo::new("public", "todos")
            .column(ColumnInfo::new("id", ColumnType::Integer))
            .primary_key(&["id"]);
        SchemaSnapshot::new(version, vec![table]).unwrap()
    }

    #[test]
    fn test_install_is_monotonic() {
        let cache = SchemaCache::new(snapshot(2));
        assert!(!cache.install(snapshot(2)));
        assert!(!cache.install(snapshot(1)));
        assert!(cache.install(snapshot(3)));
        assert_eq!(cache.version(), 3);
    }

    #[test]
    fn test_readers_keep_their_snapshot() {
        let cache = SchemaCache::new(snapshot(1));
        let held = cache.current();
        cache.install(snapshot(2));
        assert_eq!(held.version(), 1);
        assert_eq!(cache.current().version(), 2);
    }

    #[tokio::test]
    async fn test_listener_installs_newer_versions() {
        let cache = SchemaCache::new(snapshot(1));
        let (tx, rx) = SchemaCache::channel();
        let handle = cache.spawn_listener(rx);

        tx.send(snapshot(4)).unwrap();
        tx.send(snapshot(3)).unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(cache.version(), 4);
    }
}
