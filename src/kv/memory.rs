//! In-memory KV layer
//!
//! Multi-version committed data plus one write intent per key. Contention
//! between live transactions is settled by `ConflictResolver`: the loser is
//! either refused on the spot or, if it already holds the intent, pushed and
//! told on its next operation or commit.
//!
//! Rules:
//! - Writing over a committed version newer than the writer's timestamp is a
//!   retryable conflict with no winning transaction
//! - Serializable readers contend with intents; snapshot readers read the
//!   committed version at their timestamp and never conflict
//! - Beginning epoch N of a transaction drops the intents of earlier epochs

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::{CommitOutcome, CommitSignal, KvError, KvResult, KvStore, ReadResult};
use crate::conflict::{ConflictResolver, Resolution};
use crate::observability::TxnMetrics;
use crate::txn::{Epoch, IsolationType, Timestamp, TxnId, TxnMeta};

#[derive(Debug, Clone)]
struct Intent {
    owner: TxnMeta,
    value: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
struct TxnEntry {
    epoch: Epoch,
    /// Latest metadata seen for the live epoch
    meta: Option<TxnMeta>,
    /// Set when another transaction pushed this epoch out
    pushed_by: Option<TxnId>,
}

#[derive(Debug, Default)]
struct KvState {
    clock: u64,
    /// key → versions, oldest first
    committed: HashMap<Vec<u8>, Vec<(Timestamp, Vec<u8>)>>,
    intents: HashMap<Vec<u8>, Intent>,
    txns: HashMap<TxnId, TxnEntry>,
}

impl KvState {
    fn tick(&mut self) -> Timestamp {
        self.clock += 1;
        Timestamp::new(self.clock)
    }

    fn drop_intents_of(&mut self, id: TxnId) {
        self.intents.retain(|_, intent| intent.owner.id != id);
    }

    fn latest_commit(&self, key: &[u8]) -> Option<Timestamp> {
        self.committed
            .get(key)
            .and_then(|versions| versions.last())
            .map(|(ts, _)| *ts)
    }

    fn visible(&self, key: &[u8], at: Timestamp) -> Option<Vec<u8>> {
        self.committed.get(key).and_then(|versions| {
            versions
                .iter()
                .rev()
                .find(|(ts, _)| *ts <= at)
                .map(|(_, value)| value.clone())
        })
    }

    /// Check the caller is still live and refresh its metadata.
    fn check_live(&mut self, meta: &TxnMeta) -> KvResult<()> {
        let entry = self.txns.get_mut(&meta.id).ok_or_else(|| {
            KvError::NonRetryable(format!("transaction {} is not known to the KV layer", meta.id))
        })?;
        if entry.epoch != meta.epoch {
            return Err(KvError::NonRetryable(format!(
                "transaction {} is at epoch {}, request carried epoch {}",
                meta.id, entry.epoch, meta.epoch
            )));
        }
        if let Some(pusher) = entry.pushed_by {
            return Err(KvError::RetryableConflict {
                winner: Some(pusher),
                message: format!(
                    "transaction {} (epoch {}) was aborted by conflicting transaction {}",
                    meta.id, meta.epoch, pusher
                ),
            });
        }
        entry.meta = Some(*meta);
        Ok(())
    }

    /// The live intent holder on `key`, other than `me`.
    fn contender(&self, key: &[u8], me: TxnId) -> Option<TxnMeta> {
        let intent = self.intents.get(key)?;
        if intent.owner.id == me {
            return None;
        }
        let entry = self.txns.get(&intent.owner.id)?;
        if entry.epoch != intent.owner.epoch || entry.pushed_by.is_some() {
            return None;
        }
        // The holder may have been re-prioritized since it wrote.
        Some(entry.meta.unwrap_or(intent.owner))
    }

    fn push(&mut self, resolution: &Resolution) {
        if let Some(entry) = self.txns.get_mut(&resolution.loser.id) {
            if entry.epoch == resolution.loser.epoch {
                entry.pushed_by = Some(resolution.winner.id);
            }
        }
        let loser = resolution.loser.id;
        self.drop_intents_of(loser);
    }
}

/// In-memory `KvStore`.
///
/// Cloning shares the same store.
#[derive(Clone)]
pub struct MemoryKv {
    state: Arc<Mutex<KvState>>,
    /// Seeded tie-break source; `None` draws from the thread RNG per conflict
    rng: Option<Arc<Mutex<StdRng>>>,
    metrics: Option<Arc<TxnMetrics>>,
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryKv {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(KvState::default())),
            rng: None,
            metrics: None,
        }
    }

    /// Use a seeded RNG for tie-breaks.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Some(Arc::new(Mutex::new(StdRng::seed_from_u64(seed))));
        self
    }

    /// Count conflict resolutions in `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<TxnMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn lock(&self) -> KvResult<MutexGuard<'_, KvState>> {
        self.state
            .lock()
            .map_err(|_| KvError::NonRetryable("memory kv state poisoned".to_string()))
    }

    fn resolve(&self, a: TxnMeta, b: TxnMeta) -> Resolution {
        let resolution = match &self.rng {
            Some(rng) => {
                let mut rng = rng.lock().unwrap_or_else(|e| e.into_inner());
                ConflictResolver::resolve(a, b, &mut *rng)
            }
            None => ConflictResolver::resolve(a, b, &mut rand::thread_rng()),
        };
        ConflictResolver::log(&resolution);
        if let Some(metrics) = &self.metrics {
            metrics.increment_conflicts_resolved();
        }
        resolution
    }

    /// Settle contention on `key` between `meta` and the current intent holder.
    fn contend(&self, state: &mut KvState, meta: &TxnMeta, key: &[u8]) -> KvResult<()> {
        if let Some(holder) = state.contender(key, meta.id) {
            let resolution = self.resolve(*meta, holder);
            if resolution.is_loser(meta) {
                return Err(KvError::RetryableConflict {
                    winner: Some(resolution.winner.id),
                    message: resolution.loser_error().message,
                });
            }
            state.push(&resolution);
        }
        Ok(())
    }

    /// Latest committed value of `key`, outside any transaction.
    pub fn get_committed(&self, key: &[u8]) -> Option<Vec<u8>> {
        let state = self.lock().ok()?;
        state
            .committed
            .get(key)
            .and_then(|versions| versions.last())
            .map(|(_, value)| value.clone())
    }

    /// Number of transactions the store currently tracks.
    pub fn live_transactions(&self) -> usize {
        self.lock().map(|state| state.txns.len()).unwrap_or(0)
    }

    /// Whether `id` was pushed out by a conflicting transaction.
    pub fn is_pushed(&self, id: TxnId) -> bool {
        self.lock()
            .ok()
            .and_then(|state| state.txns.get(&id).map(|entry| entry.pushed_by.is_some()))
            .unwrap_or(false)
    }
}

impl KvStore for MemoryKv {
    fn begin(&self, id: TxnId, epoch: Epoch) -> KvResult<Timestamp> {
        let mut state = self.lock()?;
        if let Some(entry) = state.txns.get(&id) {
            if epoch <= entry.epoch {
                return Err(KvError::NonRetryable(format!(
                    "transaction {} cannot restart at epoch {} (current {})",
                    id, epoch, entry.epoch
                )));
            }
        }
        state.drop_intents_of(id);
        state.txns.insert(
            id,
            TxnEntry {
                epoch,
                meta: None,
                pushed_by: None,
            },
        );
        Ok(state.tick())
    }

    fn read(&self, meta: &TxnMeta, key: &[u8]) -> KvResult<ReadResult> {
        let mut state = self.lock()?;
        state.check_live(meta)?;

        if let Some(intent) = state.intents.get(key) {
            if intent.owner.id == meta.id {
                return Ok(ReadResult {
                    id: meta.id,
                    epoch: meta.epoch,
                    value: Some(intent.value.clone()),
                });
            }
        }

        if meta.isolation == IsolationType::Serializable {
            self.contend(&mut state, meta, key)?;
        }

        Ok(ReadResult {
            id: meta.id,
            epoch: meta.epoch,
            value: state.visible(key, meta.timestamp),
        })
    }

    fn write(&self, meta: &TxnMeta, key: &[u8], value: Vec<u8>) -> KvResult<()> {
        let mut state = self.lock()?;
        state.check_live(meta)?;

        if let Some(committed_at) = state.latest_commit(key) {
            if committed_at > meta.timestamp {
                return Err(KvError::RetryableConflict {
                    winner: None,
                    message: format!(
                        "write too old: key committed at {} after transaction timestamp {}",
                        committed_at, meta.timestamp
                    ),
                });
            }
        }

        self.contend(&mut state, meta, key)?;
        state.intents.insert(
            key.to_vec(),
            Intent {
                owner: *meta,
                value,
            },
        );
        Ok(())
    }

    fn commit(&self, meta: &TxnMeta) -> CommitSignal {
        let mut state = match self.lock() {
            Ok(state) => state,
            Err(err) => return CommitSignal::ready(CommitOutcome::Failed(err.to_string())),
        };
        if let Err(err) = state.check_live(meta) {
            let outcome = match err {
                KvError::RetryableConflict { winner, message } => {
                    CommitOutcome::RetryableConflict { winner, message }
                }
                KvError::NonRetryable(message) => CommitOutcome::Failed(message),
            };
            return CommitSignal::ready(outcome);
        }

        let commit_ts = state.tick();
        let keys: Vec<Vec<u8>> = state
            .intents
            .iter()
            .filter(|(_, intent)| intent.owner.id == meta.id && intent.owner.epoch == meta.epoch)
            .map(|(key, _)| key.clone())
            .collect();
        for key in keys {
            if let Some(intent) = state.intents.remove(&key) {
                state
                    .committed
                    .entry(key)
                    .or_default()
                    .push((commit_ts, intent.value));
            }
        }
        state.drop_intents_of(meta.id);
        state.txns.remove(&meta.id);

        CommitSignal::ready(CommitOutcome::Committed {
            timestamp: commit_ts,
        })
    }

    fn abort(&self, meta: &TxnMeta) {
        if let Ok(mut state) = self.lock() {
            state.drop_intents_of(meta.id);
            state.txns.remove(&meta.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::Priority;

    fn start(kv: &MemoryKv, priority: Priority) -> TxnMeta {
        let id = TxnId::new();
        let timestamp = kv.begin(id, Epoch::ZERO).unwrap();
        TxnMeta {
            id,
            epoch: Epoch::ZERO,
            isolation: IsolationType::Serializable,
            priority,
            timestamp,
        }
    }

    fn committed(kv: &MemoryKv, meta: &TxnMeta) -> bool {
        matches!(
            kv.commit(meta).try_outcome(),
            Some(CommitOutcome::Committed { .. })
        )
    }

    #[test]
    fn test_read_your_writes_and_commit() {
        let kv = MemoryKv::new();
        let txn = start(&kv, Priority::normal());
        kv.write(&txn, b"k", b"v1".to_vec()).unwrap();
        let read = kv.read(&txn, b"k").unwrap();
        assert_eq!(read.value, Some(b"v1".to_vec()));
        assert_eq!(read.epoch, Epoch::ZERO);

        assert!(committed(&kv, &txn));
        assert_eq!(kv.get_committed(b"k"), Some(b"v1".to_vec()));
        assert_eq!(kv.live_transactions(), 0);
    }

    #[test]
    fn test_later_writer_with_lower_priority_is_refused() {
        let kv = MemoryKv::new();
        let high = start(&kv, Priority::high());
        let low = start(&kv, Priority::low());

        kv.write(&high, b"k", b"high".to_vec()).unwrap();
        let err = kv.write(&low, b"k", b"low".to_vec()).unwrap_err();
        assert!(matches!(
            err,
            KvError::RetryableConflict { winner: Some(w), .. } if w == high.id
        ));
        assert!(!kv.is_pushed(high.id));
        assert!(committed(&kv, &high));
    }

    #[test]
    fn test_higher_priority_pushes_intent_holder() {
        let kv = MemoryKv::new();
        let low = start(&kv, Priority::low());
        let high = start(&kv, Priority::high());

        kv.write(&low, b"k", b"low".to_vec()).unwrap();
        kv.write(&high, b"k", b"high".to_vec()).unwrap();
        assert!(kv.is_pushed(low.id));

        let outcome = kv.commit(&low).try_outcome();
        assert!(matches!(
            outcome,
            Some(CommitOutcome::RetryableConflict { winner: Some(w), .. }) if w == high.id
        ));

        assert!(committed(&kv, &high));
        assert_eq!(kv.get_committed(b"k"), Some(b"high".to_vec()));
    }

    #[test]
    fn test_snapshot_reader_does_not_contend() {
        let kv = MemoryKv::new();
        let writer = start(&kv, Priority::high());
        let mut reader = start(&kv, Priority::low());
        reader.isolation = IsolationType::Snapshot;

        kv.write(&writer, b"k", b"v".to_vec()).unwrap();
        let read = kv.read(&reader, b"k").unwrap();
        assert_eq!(read.value, None);
        assert!(!kv.is_pushed(writer.id));
    }

    #[test]
    fn test_write_too_old_is_retryable() {
        let kv = MemoryKv::new();
        let old = start(&kv, Priority::high());
        let newer = start(&kv, Priority::normal());
        kv.write(&newer, b"k", b"n".to_vec()).unwrap();
        assert!(committed(&kv, &newer));

        let err = kv.write(&old, b"k", b"o".to_vec()).unwrap_err();
        assert!(matches!(err, KvError::RetryableConflict { winner: None, .. }));
    }

    #[test]
    fn test_new_epoch_drops_old_intents() {
        let kv = MemoryKv::new();
        let txn = start(&kv, Priority::normal());
        kv.write(&txn, b"k", b"v".to_vec()).unwrap();

        kv.begin(txn.id, Epoch::new(1)).unwrap();
        let other = start(&kv, Priority::low());
        kv.write(&other, b"k", b"w".to_vec()).unwrap();
        assert!(!kv.is_pushed(other.id));
    }

    #[test]
    fn test_epoch_cannot_go_backwards() {
        let kv = MemoryKv::new();
        let txn = start(&kv, Priority::normal());
        kv.begin(txn.id, Epoch::new(2)).unwrap();
        assert!(kv.begin(txn.id, Epoch::new(1)).is_err());
    }

    #[test]
    fn test_stale_epoch_request_rejected() {
        let kv = MemoryKv::new();
        let txn = start(&kv, Priority::normal());
        kv.begin(txn.id, Epoch::new(1)).unwrap();
        assert!(matches!(
            kv.read(&txn, b"k"),
            Err(KvError::NonRetryable(_))
        ));
    }

    #[test]
    fn test_abort_releases_intents() {
        let kv = MemoryKv::new();
        let a = start(&kv, Priority::high());
        kv.write(&a, b"k", b"a".to_vec()).unwrap();
        kv.abort(&a);

        let b = start(&kv, Priority::low());
        kv.write(&b, b"k", b"b".to_vec()).unwrap();
        assert!(committed(&kv, &b));
        assert_eq!(kv.get_committed(b"k"), Some(b"b".to_vec()));
    }

    #[test]
    fn test_conflicts_counted() {
        let metrics = Arc::new(TxnMetrics::new());
        let kv = MemoryKv::new().with_metrics(metrics.clone());
        let a = start(&kv, Priority::high());
        let b = start(&kv, Priority::low());
        kv.write(&a, b"k", b"a".to_vec()).unwrap();
        let _ = kv.write(&b, b"k", b"b".to_vec());
        assert_eq!(metrics.snapshot().conflicts_resolved, 1);
    }
}
