//! Per-app snapshot cache.
//!
//! Each app owns one slot holding the last successfully ingested table.
//! Readers load the slot without locking; writers replace it with a single
//! atomic pointer swap, so a reader sees either the old or the new snapshot
//! in full.

use crate::types::{AppId, SpreadsheetRef};
use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use microsaasify_tables::{infer, type_rows, CellValue, ColumnSchema, RawTable};
use std::sync::Arc;
use std::time::Duration;

/// One immutable ingested table with its freshness window.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// The reference this table was read from.
    pub source: SpreadsheetRef,
    pub table: RawTable,
    pub schema: Vec<ColumnSchema>,
    /// Typed cells, row-major, same shape as `table.rows`.
    pub cells: Vec<Vec<CellValue>>,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Snapshot {
    /// Infers the schema from `table` and types every cell.
    pub fn build(
        source: SpreadsheetRef,
        table: RawTable,
        ttl: Duration,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        let schema = infer(&table.headers, &table.rows);
        let cells = type_rows(&table, &schema);
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            source,
            table,
            schema,
            cells,
            fetched_at,
            expires_at: fetched_at.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        is_stale(self, now)
    }

    pub fn row_count(&self) -> usize {
        self.table.row_count()
    }
}

/// A snapshot is stale from its expiry instant onwards.
pub fn is_stale(snapshot: &Snapshot, now: DateTime<Utc>) -> bool {
    now >= snapshot.expires_at
}

type Slot = Arc<ArcSwapOption<Snapshot>>;

/// Snapshot slots keyed 1:1 by app.
#[derive(Default)]
pub struct SnapshotCache {
    slots: DashMap<AppId, Slot>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, app_id: AppId) -> Slot {
        self.slots.entry(app_id).or_default().clone()
    }

    pub fn get(&self, app_id: AppId) -> Option<Arc<Snapshot>> {
        self.slots.get(&app_id).and_then(|slot| slot.load_full())
    }

    /// Atomically replaces the app's snapshot, returning the previous one.
    pub fn put(&self, app_id: AppId, snapshot: Arc<Snapshot>) -> Option<Arc<Snapshot>> {
        self.slot(app_id).swap(Some(snapshot))
    }

    pub fn remove(&self, app_id: AppId) -> Option<Arc<Snapshot>> {
        self.slots.remove(&app_id).and_then(|(_, slot)| slot.swap(None))
    }

    pub fn contains(&self, app_id: AppId) -> bool {
        self.get(app_id).is_some()
    }

    /// Number of apps holding a snapshot.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|e| e.value().load().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
