//! SavingsLedger — accumulated savings per suppressed service, in redb.
//!
//! Every record increments two rows: the `(service_id, app_id)` row and
//! the synthetic global row, which tracks the total across all services.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, WriteTransaction};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::savings::round5;
use crate::tables::SAVINGS;

/// Id used for both the service and app of the global row.
pub const GLOBAL_ID: &str = "global";

/// Name stored on the global row.
pub const GLOBAL_NAME: &str = "snooze";

macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// One ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsRecord {
    pub service_id: String,
    pub app_id: String,
    pub name: String,
    pub saved: f64,
}

impl SavingsRecord {
    pub fn is_global(&self) -> bool {
        self.service_id == GLOBAL_ID && self.app_id == GLOBAL_ID
    }
}

/// Thread-safe savings ledger backed by redb.
#[derive(Clone)]
pub struct SavingsLedger {
    db: Arc<Database>,
}

impl SavingsLedger {
    /// Open (or create) a persistent ledger at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let ledger = Self { db: Arc::new(db) };
        ledger.ensure_tables()?;
        debug!(?path, "savings ledger opened");
        Ok(ledger)
    }

    /// Create an ephemeral in-memory ledger.
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let ledger = Self { db: Arc::new(db) };
        ledger.ensure_tables()?;
        debug!("in-memory savings ledger opened");
        Ok(ledger)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(SAVINGS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Add `saved` to the service row and to the global row, creating
    /// either when missing. Both increments commit atomically.
    pub fn record(&self, service_id: &str, app_id: &str, name: &str, saved: f64) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let service_total = increment(&txn, service_id, app_id, name, saved)?;
        let global_total = increment(&txn, GLOBAL_ID, GLOBAL_ID, GLOBAL_NAME, saved)?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%service_id, %app_id, saved, service_total, global_total, "savings recorded");
        Ok(())
    }

    /// Get a single row.
    pub fn get(&self, service_id: &str, app_id: &str) -> StateResult<Option<SavingsRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SAVINGS).map_err(map_err!(Table))?;
        match table.get((service_id, app_id)).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: SavingsRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// List every row, the global row included.
    pub fn list(&self) -> StateResult<Vec<SavingsRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SAVINGS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: SavingsRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
        }
        Ok(results)
    }

    /// Rows for individual services (global row excluded).
    pub fn services(&self) -> StateResult<Vec<SavingsRecord>> {
        Ok(self.list()?.into_iter().filter(|r| !r.is_global()).collect())
    }

    /// Sum of all per-service rows.
    pub fn past_total(&self) -> StateResult<f64> {
        let total = self.services()?.iter().fold(0.0, |acc, r| acc + r.saved);
        Ok(round5(total))
    }
}

/// Read-modify-write one row inside `txn`. Returns the new total.
fn increment(
    txn: &WriteTransaction,
    service_id: &str,
    app_id: &str,
    name: &str,
    saved: f64,
) -> StateResult<f64> {
    let mut table = txn.open_table(SAVINGS).map_err(map_err!(Table))?;
    let existing = match table.get((service_id, app_id)).map_err(map_err!(Read))? {
        Some(guard) => Some(
            serde_json::from_slice::<SavingsRecord>(guard.value())
                .map_err(map_err!(Deserialize))?,
        ),
        None => None,
    };

    let record = SavingsRecord {
        service_id: service_id.to_string(),
        app_id: app_id.to_string(),
        name: name.to_string(),
        saved: round5(existing.map(|r| r.saved).unwrap_or(0.0) + saved),
    };

    let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
    table
        .insert((service_id, app_id), value.as_slice())
        .map_err(map_err!(Write))?;
    Ok(record.saved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_creates_and_increments_rows() {
        let ledger = SavingsLedger::open_in_memory().unwrap();
        ledger.record("svc-1", "app_1", "api", 0.5).unwrap();
        ledger.record("svc-1", "app_1", "api", 0.25).unwrap();
        ledger.record("svc-2", "app_2", "web", 1.0).unwrap();

        let svc1 = ledger.get("svc-1", "app_1").unwrap().unwrap();
        assert_eq!(svc1.saved, 0.75);
        assert_eq!(svc1.name, "api");

        let global = ledger.get(GLOBAL_ID, GLOBAL_ID).unwrap().unwrap();
        assert!(global.is_global());
        assert_eq!(global.name, GLOBAL_NAME);
        assert_eq!(global.saved, 1.75);

        assert_eq!(ledger.list().unwrap().len(), 3);
        assert_eq!(ledger.services().unwrap().len(), 2);
        assert_eq!(ledger.past_total().unwrap(), 1.75);
    }

    #[test]
    fn empty_ledger_totals_zero() {
        let ledger = SavingsLedger::open_in_memory().unwrap();
        assert!(ledger.list().unwrap().is_empty());
        let total = ledger.past_total().unwrap();
        assert_eq!(total, 0.0);
        assert!(total.is_sign_positive());
        assert!(ledger.get("svc", "app").unwrap().is_none());
    }

    #[test]
    fn ids_containing_separators_stay_distinct() {
        let ledger = SavingsLedger::open_in_memory().unwrap();
        ledger.record("a:b", "c", "first", 1.0).unwrap();
        ledger.record("a", "b:c", "second", 2.0).unwrap();
        ledger.record("a|b", "c", "third", 4.0).unwrap();

        assert_eq!(ledger.get("a:b", "c").unwrap().unwrap().saved, 1.0);
        assert_eq!(ledger.get("a", "b:c").unwrap().unwrap().saved, 2.0);
        assert_eq!(ledger.get("a|b", "c").unwrap().unwrap().name, "third");
        assert_eq!(ledger.services().unwrap().len(), 3);
        assert_eq!(ledger.past_total().unwrap(), 7.0);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("savings.redb");
        {
            let ledger = SavingsLedger::open(&path).unwrap();
            ledger.record("svc-1", "app_1", "api", 0.679).unwrap();
        }
        let ledger = SavingsLedger::open(&path).unwrap();
        assert_eq!(ledger.past_total().unwrap(), 0.679);
    }

    #[test]
    fn record_serializes_camel_case() {
        let record = SavingsRecord {
            service_id: "svc".into(),
            app_id: "app".into(),
            name: "api".into(),
            saved: 1.5,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["serviceId"], "svc");
        assert_eq!(json["appId"], "app");
    }
}
