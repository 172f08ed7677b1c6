use crate::cache::WriteThroughCache;
use crate::db::{Database, CF_GRADES, CF_METADATA};
use crate::errors::{DbError, DbResult};
use opr_core::GradingResult;
use parking_lot::{Mutex, RwLock};
use rocksdb::WriteBatch;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

const LATEST_HEIGHT_KEY: &[u8] = b"latest_height";

/// What a successful `put` did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutOutcome {
    Stored,
    /// The identical result was already stored for that height.
    Unchanged,
}

/// Height-keyed storage for grading results.
///
/// A stored height is never overwritten with different content, and new
/// heights must come after the latest one stored.
pub trait GradeStore: Send + Sync {
    fn put(&self, height: u64, result: &GradingResult) -> DbResult<PutOutcome>;

    fn get(&self, height: u64) -> DbResult<Option<GradingResult>>;

    fn latest(&self) -> DbResult<Option<(u64, GradingResult)>>;
}

fn check_height(height: u64, result: &GradingResult) -> DbResult<()> {
    if result.height != height {
        return Err(DbError::InvalidData(format!(
            "result for height {} stored under key {}",
            result.height, height
        )));
    }
    Ok(())
}

/// Map-backed store. Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryGradeStore {
    results: RwLock<BTreeMap<u64, GradingResult>>,
}

impl MemoryGradeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.results.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.read().is_empty()
    }
}

impl GradeStore for MemoryGradeStore {
    fn put(&self, height: u64, result: &GradingResult) -> DbResult<PutOutcome> {
        check_height(height, result)?;
        let mut results = self.results.write();
        if let Some(existing) = results.get(&height) {
            if existing == result {
                return Ok(PutOutcome::Unchanged);
            }
            return Err(DbError::Conflict(height));
        }
        if let Some((&latest, _)) = results.iter().next_back() {
            if height < latest {
                return Err(DbError::OutOfOrder { height, latest });
            }
        }
        results.insert(height, result.clone());
        Ok(PutOutcome::Stored)
    }

    fn get(&self, height: u64) -> DbResult<Option<GradingResult>> {
        Ok(self.results.read().get(&height).cloned())
    }

    fn latest(&self) -> DbResult<Option<(u64, GradingResult)>> {
        Ok(self
            .results
            .read()
            .iter()
            .next_back()
            .map(|(h, r)| (*h, r.clone())))
    }
}

/// RocksDB-backed store.
///
/// Keys are big-endian heights so key order is height order. Each put lands
/// in one synced write batch together with the latest-height marker.
pub struct RocksGradeStore {
    db: Database,
    write_lock: Mutex<()>,
    cache: WriteThroughCache<u64, GradingResult>,
}

impl RocksGradeStore {
    pub fn open<P: AsRef<Path>>(path: P, cache_size: usize) -> DbResult<Self> {
        let db = Database::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "opened grading store");
        Ok(Self::new(db, cache_size))
    }

    pub fn new(db: Database, cache_size: usize) -> Self {
        Self {
            db,
            write_lock: Mutex::new(()),
            cache: WriteThroughCache::new(cache_size),
        }
    }

    fn latest_height(&self) -> DbResult<Option<u64>> {
        match self.db.get(CF_METADATA, LATEST_HEIGHT_KEY)? {
            Some(bytes) => decode_height(&bytes).map(Some),
            None => Ok(None),
        }
    }

    pub fn close(&self) {
        self.db.close();
    }
}

fn decode_height(bytes: &[u8]) -> DbResult<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| DbError::InvalidData(format!("bad height key of {} bytes", bytes.len())))?;
    Ok(u64::from_be_bytes(raw))
}

impl GradeStore for RocksGradeStore {
    fn put(&self, height: u64, result: &GradingResult) -> DbResult<PutOutcome> {
        check_height(height, result)?;
        let encoded = bincode::serialize(result)?;
        let key = height.to_be_bytes();

        let _guard = self.write_lock.lock();
        if let Some(existing) = self.db.get(CF_GRADES, &key)? {
            if existing == encoded {
                return Ok(PutOutcome::Unchanged);
            }
            return Err(DbError::Conflict(height));
        }
        if let Some(latest) = self.latest_height()? {
            if height < latest {
                return Err(DbError::OutOfOrder { height, latest });
            }
        }

        let mut batch = WriteBatch::default();
        self.db.batch_put(&mut batch, CF_GRADES, &key, &encoded)?;
        self.db.batch_put(&mut batch, CF_METADATA, LATEST_HEIGHT_KEY, &key)?;
        self.db.write_batch(batch)?;
        self.cache.insert(height, result.clone());
        debug!(height, winners = result.winners.len(), "persisted grading result");
        Ok(PutOutcome::Stored)
    }

    fn get(&self, height: u64) -> DbResult<Option<GradingResult>> {
        if let Some(result) = self.cache.get(&height) {
            return Ok(Some(result));
        }
        match self.db.get(CF_GRADES, &height.to_be_bytes())? {
            Some(data) => {
                let result: GradingResult = bincode::deserialize(&data)?;
                self.cache.insert(height, result.clone());
                Ok(Some(result))
            }
            None => Ok(None),
        }
    }

    fn latest(&self) -> DbResult<Option<(u64, GradingResult)>> {
        match self.db.last_entry(CF_GRADES)? {
            Some((key, value)) => {
                let height = decode_height(&key)?;
                let result: GradingResult = bincode::deserialize(&value)?;
                Ok(Some((height, result)))
            }
            None => Ok(None),
        }
    }
}
