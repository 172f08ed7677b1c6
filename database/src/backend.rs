use crate::errors::DbResult;
use crate::grade_store::{GradeStore, MemoryGradeStore, RocksGradeStore};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Results kept hot in front of the durable backend.
const DEFAULT_CACHE_ENTRIES: usize = 256;

/// Storage backend, chosen once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    #[serde(rename = "rocksdb")]
    RocksDb { path: PathBuf },
}

pub fn open_store(backend: &StoreBackend) -> DbResult<Arc<dyn GradeStore>> {
    match backend {
        StoreBackend::Memory => {
            info!("using in-memory grading store");
            Ok(Arc::new(MemoryGradeStore::new()))
        }
        StoreBackend::RocksDb { path } => {
            Ok(Arc::new(RocksGradeStore::open(path, DEFAULT_CACHE_ENTRIES)?))
        }
    }
}
