//! In-memory blocklist registry synchronized with an external store.
//!
//! The registry is an explicit instance owned by the host; the storage
//! collaborator pushes change notifications into [`BlockRegistry::apply`]
//! instead of mutating any shared global state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

use crate::fingerprint::Fingerprint;
use crate::matcher::{self, SimilarityMatcher};

/// How a fingerprint ended up on the blocklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockOrigin {
    /// Explicitly blocked by the user
    Manual,
    /// Blocked by an automated policy
    Automatic,
}

/// One blocked fingerprint with its bookkeeping.
///
/// Immutable once created except for deletion; no two records in a registry
/// share a fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub fingerprint: Fingerprint,
    pub created_at: DateTime<Utc>,
    pub origin: BlockOrigin,
}

impl BlockRecord {
    /// Create a record stamped with the current time.
    pub fn new(fingerprint: Fingerprint, origin: BlockOrigin) -> Self {
        Self {
            fingerprint,
            created_at: Utc::now(),
            origin,
        }
    }
}

/// Change notification delivered by the storage collaborator.
#[derive(Debug, Clone)]
pub enum StoreChange {
    Added(BlockRecord),
    Removed(Fingerprint),
    Cleared,
}

/// Boundary contract for the persistent fingerprint store.
///
/// The store owns durability and its own serialization; the registry only
/// mirrors its contents in memory. Change notifications are delivered
/// asynchronously by the collaborator wiring the two together.
#[async_trait]
pub trait FingerprintStore: Send + Sync {
    /// All records, in the store's iteration order.
    async fn list(&self) -> Vec<BlockRecord>;

    /// Persist a record; false when an identical fingerprint already exists.
    async fn add(&self, record: BlockRecord) -> bool;

    /// Remove the record for `fingerprint`; false when absent.
    async fn remove(&self, fingerprint: &Fingerprint) -> bool;

    /// Drop every record.
    async fn clear(&self);
}

/// A blocked record found within the matcher's threshold
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryMatch {
    pub record: BlockRecord,
    pub distance: u32,
}

/// In-memory view of the blocklist.
///
/// Reads may overlap a concurrent update; a match pass that misses a record
/// added mid-scan picks it up on the next pass, which is acceptable for a
/// single pass.
#[derive(Debug, Default)]
pub struct BlockRegistry {
    records: RwLock<Vec<BlockRecord>>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Add a record; false when its fingerprint is already present.
    pub fn insert(&self, record: BlockRecord) -> bool {
        let mut records = self.write();
        if records
            .iter()
            .any(|existing| existing.fingerprint == record.fingerprint)
        {
            debug!("ignoring duplicate fingerprint {}", record.fingerprint);
            return false;
        }
        records.push(record);
        true
    }

    /// Remove the record for `fingerprint`; false when absent.
    pub fn remove(&self, fingerprint: &Fingerprint) -> bool {
        let mut records = self.write();
        let before = records.len();
        records.retain(|record| &record.fingerprint != fingerprint);
        records.len() < before
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    /// Copy of the current records.
    pub fn snapshot(&self) -> Vec<BlockRecord> {
        self.read().clone()
    }

    /// Replace the whole view with the store's current contents, keeping
    /// the first record for any duplicated fingerprint.
    pub fn replace_all(&self, records: Vec<BlockRecord>) {
        let mut deduped: Vec<BlockRecord> = Vec::with_capacity(records.len());
        for record in records {
            if !deduped
                .iter()
                .any(|existing| existing.fingerprint == record.fingerprint)
            {
                deduped.push(record);
            }
        }

        debug!("registry replaced with {} records", deduped.len());
        *self.write() = deduped;
    }

    /// Apply a single change notification from the store.
    pub fn apply(&self, change: StoreChange) {
        match change {
            StoreChange::Added(record) => {
                self.insert(record);
            }
            StoreChange::Removed(fingerprint) => {
                self.remove(&fingerprint);
            }
            StoreChange::Cleared => self.clear(),
        }
    }

    /// Scan for the closest record and report it when it clears the
    /// matcher's threshold.
    pub fn find_match(
        &self,
        target: &Fingerprint,
        matcher: &SimilarityMatcher,
    ) -> Option<RegistryMatch> {
        let records = self.read();

        let mut best: Option<RegistryMatch> = None;
        for record in records.iter() {
            let candidate_distance = matcher::distance(target, &record.fingerprint);
            let closer = best
                .as_ref()
                .map_or(true, |current| candidate_distance < current.distance);
            if closer {
                best = Some(RegistryMatch {
                    record: record.clone(),
                    distance: candidate_distance,
                });
            }
        }

        best.filter(|found| found.distance <= matcher.threshold())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<BlockRecord>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<BlockRecord>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }
}
