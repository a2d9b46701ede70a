//! StateStore — redb-backed leases and rollout records.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::{debug, info};

use rollgate_core::epoch_millis;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

const DB_FILE: &str = "rollgate.redb";

#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a store file at `path`.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Open `rollgate.redb` inside `dir`, creating the directory if needed.
    pub fn open_dir(dir: &Path) -> StateResult<Self> {
        std::fs::create_dir_all(dir).map_err(|e| StateError::Open(format!("{}: {e}", dir.display())))?;
        Self::open(&dir.join(DB_FILE))
    }

    /// Ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(LEASES).map_err(map_err!(Table))?;
        txn.open_table(ROLLOUTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Leases ─────────────────────────────────────────────────────

    /// Take write authority over `pair_key` for `ttl`.
    ///
    /// Succeeds if the pair is free, the existing lease expired, or the
    /// existing lease already belongs to `token` (which renews it).
    pub fn acquire_lease(&self, pair_key: &str, token: &str, ttl: Duration) -> StateResult<Lease> {
        self.acquire_lease_at(pair_key, token, epoch_millis(), ttl)
    }

    pub fn acquire_lease_at(
        &self,
        pair_key: &str,
        token: &str,
        now_ms: u64,
        ttl: Duration,
    ) -> StateResult<Lease> {
        let lease = Lease {
            pair_key: pair_key.to_string(),
            token: token.to_string(),
            acquired_at_ms: now_ms,
            expires_at_ms: now_ms.saturating_add(ttl.as_millis() as u64),
        };
        let value = serde_json::to_vec(&lease).map_err(map_err!(Serialize))?;

        // Read and write in one transaction so two acquirers cannot both win.
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(LEASES).map_err(map_err!(Table))?;
            let existing: Option<Lease> = match table.get(pair_key).map_err(map_err!(Read))? {
                Some(guard) => Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?),
                None => None,
            };
            if let Some(held) = existing {
                if held.token != token && !held.is_expired(now_ms) {
                    return Err(StateError::LeaseHeld {
                        key: pair_key.to_string(),
                        holder: held.token,
                        expires_at_ms: held.expires_at_ms,
                    });
                }
            }
            table
                .insert(pair_key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        info!(pair = %pair_key, %token, expires_at_ms = lease.expires_at_ms, "lease acquired");
        Ok(lease)
    }

    /// Release `token`'s lease. Returns false if the pair was not leased
    /// to `token`.
    pub fn release_lease(&self, pair_key: &str, token: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let released;
        {
            let mut table = txn.open_table(LEASES).map_err(map_err!(Table))?;
            let holder: Option<Lease> = match table.get(pair_key).map_err(map_err!(Read))? {
                Some(guard) => Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?),
                None => None,
            };
            released = holder.is_some_and(|l| l.token == token);
            if released {
                table.remove(pair_key).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(pair = %pair_key, %token, released, "lease release");
        Ok(released)
    }

    pub fn get_lease(&self, pair_key: &str) -> StateResult<Option<Lease>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(LEASES).map_err(map_err!(Table))?;
        match table.get(pair_key).map_err(map_err!(Read))? {
            Some(guard) => {
                let lease: Lease =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(lease))
            }
            None => Ok(None),
        }
    }

    /// Remove any lease on the pair regardless of holder.
    pub fn clear_lease(&self, pair_key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(LEASES).map_err(map_err!(Table))?;
            existed = table.remove(pair_key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    // ── Rollout records ────────────────────────────────────────────

    pub fn put_record(&self, record: &RolloutRecord) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ROLLOUTS).map_err(map_err!(Table))?;
            table
                .insert(record.pair_key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(pair = %record.pair_key, state = record.state.name(), "rollout record stored");
        Ok(())
    }

    pub fn get_record(&self, pair_key: &str) -> StateResult<Option<RolloutRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ROLLOUTS).map_err(map_err!(Table))?;
        match table.get(pair_key).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: RolloutRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    pub fn list_records(&self) -> StateResult<Vec<RolloutRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ROLLOUTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: RolloutRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
        }
        Ok(results)
    }

    /// Delete the pair's record. Returns true if it existed.
    pub fn delete_record(&self, pair_key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(ROLLOUTS).map_err(map_err!(Table))?;
            existed = table.remove(pair_key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(pair = %pair_key, existed, "rollout record deleted");
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollgate_core::StrategyKind;

    const PAIR: &str = "rt@v1->rt@v2";
    const HOUR: Duration = Duration::from_secs(3600);

    fn record(state: RolloutState) -> RolloutRecord {
        RolloutRecord {
            pair_key: PAIR.into(),
            token: "op-1".into(),
            strategy: StrategyKind::Canary,
            state,
            transitions: vec![Transition {
                from: RolloutState::Initializing,
                to: RolloutState::Validating,
                at_ms: 1000,
                reason: None,
            }],
            started_at_ms: 1000,
            updated_at_ms: 2000,
        }
    }

    #[test]
    fn lease_excludes_other_tokens() {
        let store = StateStore::open_in_memory().unwrap();
        store.acquire_lease_at(PAIR, "op-1", 1000, HOUR).unwrap();

        let err = store.acquire_lease_at(PAIR, "op-2", 2000, HOUR).unwrap_err();
        match err {
            StateError::LeaseHeld { holder, .. } => assert_eq!(holder, "op-1"),
            other => panic!("expected LeaseHeld, got {other:?}"),
        }
    }

    #[test]
    fn same_token_renews() {
        let store = StateStore::open_in_memory().unwrap();
        store.acquire_lease_at(PAIR, "op-1", 1000, HOUR).unwrap();
        let renewed = store.acquire_lease_at(PAIR, "op-1", 5000, HOUR).unwrap();
        assert_eq!(renewed.expires_at_ms, 5000 + 3_600_000);
        assert_eq!(store.get_lease(PAIR).unwrap(), Some(renewed));
    }

    #[test]
    fn expired_lease_can_be_taken() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .acquire_lease_at(PAIR, "op-1", 1000, Duration::from_millis(10))
            .unwrap();
        let lease = store.acquire_lease_at(PAIR, "op-2", 1010, HOUR).unwrap();
        assert_eq!(lease.token, "op-2");
    }

    #[test]
    fn release_only_by_holder() {
        let store = StateStore::open_in_memory().unwrap();
        store.acquire_lease(PAIR, "op-1", HOUR).unwrap();
        assert!(!store.release_lease(PAIR, "op-2").unwrap());
        assert!(store.release_lease(PAIR, "op-1").unwrap());
        assert!(store.get_lease(PAIR).unwrap().is_none());
        store.acquire_lease(PAIR, "op-2", HOUR).unwrap();
    }

    #[test]
    fn clear_lease_ignores_holder() {
        let store = StateStore::open_in_memory().unwrap();
        store.acquire_lease(PAIR, "op-1", HOUR).unwrap();
        assert!(store.clear_lease(PAIR).unwrap());
        assert!(!store.clear_lease(PAIR).unwrap());
    }

    #[test]
    fn record_put_get_delete() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get_record(PAIR).unwrap().is_none());

        let rec = record(RolloutState::Promoted);
        store.put_record(&rec).unwrap();
        assert_eq!(store.get_record(PAIR).unwrap(), Some(rec));
        assert_eq!(store.list_records().unwrap().len(), 1);

        assert!(store.delete_record(PAIR).unwrap());
        assert!(!store.delete_record(PAIR).unwrap());
    }

    #[test]
    fn record_update_in_place() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_record(&record(RolloutState::Validating)).unwrap();
        store
            .put_record(&record(RolloutState::RolledBack {
                reason: "cancelled".into(),
            }))
            .unwrap();
        let rec = store.get_record(PAIR).unwrap().unwrap();
        assert!(rec.is_terminal());
        assert_eq!(rec.state.reason(), Some("cancelled"));
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = StateStore::open_dir(dir.path()).unwrap();
            store.put_record(&record(RolloutState::Promoted)).unwrap();
            store.acquire_lease(PAIR, "op-1", HOUR).unwrap();
        }
        let store = StateStore::open_dir(dir.path()).unwrap();
        assert_eq!(
            store.get_record(PAIR).unwrap().unwrap().state,
            RolloutState::Promoted
        );
        assert_eq!(store.get_lease(PAIR).unwrap().unwrap().token, "op-1");
    }
}
