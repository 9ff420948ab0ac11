//! # ChainStore: Persistent Storage Engine
//!
//! Persists committed blocks, the append-only event log and the latest state
//! snapshot on sled.
//!
//! ## Tree Layout
//!
//! | Tree       | Key                | Value                         |
//! |------------|--------------------|-------------------------------|
//! | `blocks`   | `height` (8B BE)   | `bincode(block record)`       |
//! | `events`   | `sequence` (8B BE) | `bincode(event)`              |
//! | `metadata` | key (UTF-8)        | height / next sequence / state |
//!
//! Heights and sequences are big-endian so sled's lexicographic order is
//! numeric order and range scans over the log work naturally.
//!
//! ## Atomicity
//!
//! A block, its events, the new snapshot and the updated counters are
//! written in one multi-tree sled transaction. After a crash the store holds
//! either the whole block or none of it, so the snapshot can never run ahead
//! of (or lag behind) the block log.
//!
//! The store is generic over the record types: it only needs them to be
//! serde-serializable. The contracts crate decides what a block and an
//! event look like.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::path::Path;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt record under key {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

const META_LATEST_HEIGHT: &[u8] = b"latest_block_height";
const META_NEXT_EVENT_SEQ: &[u8] = b"next_event_sequence";
const META_SNAPSHOT: &[u8] = b"state_snapshot";

// ---------------------------------------------------------------------------
// ChainStore
// ---------------------------------------------------------------------------

/// Persistent block/event/snapshot storage.
///
/// Cheap to clone; clones share the same sled handles. sled is internally
/// synchronized, so a `ChainStore` can be shared across threads as is.
#[derive(Debug, Clone)]
pub struct ChainStore {
    db: Db,
    blocks: Tree,
    events: Tree,
    metadata: Tree,
}

impl ChainStore {
    /// Open or create a store at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// A store that lives in a temporary location and is removed on drop.
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        Ok(Self {
            blocks: db.open_tree("blocks")?,
            events: db.open_tree("events")?,
            metadata: db.open_tree("metadata")?,
            db,
        })
    }

    // -- Writes --------------------------------------------------------------

    /// Persist a committed block together with the events it emitted and
    /// the state snapshot taken right after it.
    ///
    /// Events are appended to the global log in the order given; returns the
    /// sequence number assigned to the first one.
    pub fn put_block<B, E, S>(
        &self,
        height: u64,
        block: &B,
        events: &[E],
        snapshot: &S,
    ) -> StoreResult<u64>
    where
        B: Serialize,
        E: Serialize,
        S: Serialize,
    {
        let height_key = height.to_be_bytes();
        let block_bytes = encode(block)?;
        let snapshot_bytes = encode(snapshot)?;
        let event_bytes = events.iter().map(encode).collect::<StoreResult<Vec<_>>>()?;

        let result: Result<u64, TransactionError<()>> =
            (&self.blocks, &self.events, &self.metadata).transaction(|(blocks, log, meta)| {
                let first_seq = match meta.get(META_NEXT_EVENT_SEQ)? {
                    Some(bytes) => decode_u64(&bytes)
                        .ok_or(ConflictableTransactionError::Abort(()))?,
                    None => 0,
                };

                blocks.insert(&height_key[..], block_bytes.as_slice())?;
                let mut seq = first_seq;
                for bytes in &event_bytes {
                    log.insert(&seq.to_be_bytes()[..], bytes.as_slice())?;
                    seq += 1;
                }
                meta.insert(META_NEXT_EVENT_SEQ, &seq.to_be_bytes()[..])?;
                meta.insert(META_LATEST_HEIGHT, &height_key[..])?;
                meta.insert(META_SNAPSHOT, snapshot_bytes.as_slice())?;
                Ok(first_seq)
            });

        let first_seq = result.map_err(|e| match e {
            TransactionError::Storage(e) => StoreError::Sled(e),
            TransactionError::Abort(()) => {
                StoreError::Corrupt(String::from_utf8_lossy(META_NEXT_EVENT_SEQ).into_owned())
            }
        })?;

        self.db.flush()?;
        tracing::debug!(height, events = events.len(), first_seq, "block persisted");
        Ok(first_seq)
    }

    // -- Reads ---------------------------------------------------------------

    /// Retrieve a block record by height.
    pub fn get_block<B: DeserializeOwned>(&self, height: u64) -> StoreResult<Option<B>> {
        self.blocks
            .get(height.to_be_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Height of the latest persisted block, `None` for an empty store.
    pub fn latest_height(&self) -> StoreResult<Option<u64>> {
        match self.metadata.get(META_LATEST_HEIGHT)? {
            Some(bytes) => decode_u64(&bytes)
                .map(Some)
                .ok_or_else(|| StoreError::Corrupt("latest_block_height".into())),
            None => Ok(None),
        }
    }

    /// The snapshot written with the latest block.
    pub fn load_snapshot<S: DeserializeOwned>(&self) -> StoreResult<Option<S>> {
        self.metadata
            .get(META_SNAPSHOT)?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Up to `limit` events starting at sequence `from`, in log order.
    pub fn events<E: DeserializeOwned>(&self, from: u64, limit: usize) -> StoreResult<Vec<(u64, E)>> {
        let mut out = Vec::with_capacity(limit.min(1024));
        for entry in self.events.range(from.to_be_bytes()..).take(limit) {
            let (key, value) = entry?;
            let seq = decode_u64(&key).ok_or_else(|| StoreError::Corrupt("event key".into()))?;
            out.push((seq, decode(&value)?));
        }
        Ok(out)
    }

    /// Number of events ever appended.
    pub fn event_count(&self) -> StoreResult<u64> {
        match self.metadata.get(META_NEXT_EVENT_SEQ)? {
            Some(bytes) => {
                decode_u64(&bytes).ok_or_else(|| StoreError::Corrupt("next_event_sequence".into()))
            }
            None => Ok(0),
        }
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Block until all pending writes are durable.
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode_u64(bytes: &[u8]) -> Option<u64> {
    bytes.try_into().ok().map(u64::from_be_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestBlock {
        height: u64,
        note: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    enum TestEvent {
        Bought(u64),
        Sold(u64),
    }

    #[test]
    fn empty_store() {
        let store = ChainStore::open_temporary().unwrap();
        assert_eq!(store.latest_height().unwrap(), None);
        assert_eq!(store.event_count().unwrap(), 0);
        assert!(store.load_snapshot::<u64>().unwrap().is_none());
        assert!(store.get_block::<TestBlock>(0).unwrap().is_none());
    }

    #[test]
    fn put_block_persists_everything() {
        let store = ChainStore::open_temporary().unwrap();
        let block = TestBlock {
            height: 0,
            note: "genesis".into(),
        };
        let first = store
            .put_block(0, &block, &[TestEvent::Bought(2)], &42u64)
            .unwrap();
        assert_eq!(first, 0);

        let block1 = TestBlock {
            height: 1,
            note: "next".into(),
        };
        let first = store
            .put_block(1, &block1, &[TestEvent::Sold(1), TestEvent::Bought(3)], &43u64)
            .unwrap();
        assert_eq!(first, 1);

        assert_eq!(store.latest_height().unwrap(), Some(1));
        assert_eq!(store.block_count(), 2);
        assert_eq!(store.get_block::<TestBlock>(1).unwrap(), Some(block1));
        assert_eq!(store.load_snapshot::<u64>().unwrap(), Some(43));
        assert_eq!(store.event_count().unwrap(), 3);

        let page: Vec<(u64, TestEvent)> = store.events(1, 10).unwrap();
        assert_eq!(
            page,
            vec![(1, TestEvent::Sold(1)), (2, TestEvent::Bought(3))]
        );
    }

    #[test]
    fn events_page_respects_limit() {
        let store = ChainStore::open_temporary().unwrap();
        let events: Vec<TestEvent> = (0..10).map(TestEvent::Bought).collect();
        store.put_block(0, &(), &events, &()).unwrap();
        let page: Vec<(u64, TestEvent)> = store.events(4, 3).unwrap();
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].0, 4);
        assert_eq!(page[2].1, TestEvent::Bought(6));
    }

    #[test]
    fn reopen_keeps_snapshot() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let store = ChainStore::open(dir.path()).unwrap();
            store
                .put_block(0, &(), &[] as &[TestEvent], &"state".to_string())
                .unwrap();
        }
        let store = ChainStore::open(dir.path()).unwrap();
        assert_eq!(
            store.load_snapshot::<String>().unwrap(),
            Some("state".to_string())
        );
        assert_eq!(store.latest_height().unwrap(), Some(0));
    }
}
