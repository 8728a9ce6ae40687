use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::debug;

use super::traits::{ConfigStore, StoreError};
use crate::record::{epoch_millis, ConfigRecord, VersionToken};

/// In-memory [`ConfigStore`] backend.
///
/// Used in tests and single-process deployments. CAS atomicity comes from
/// holding the DashMap entry guard across the token check and the write; the
/// token clock is strictly monotonic even when the wall clock stalls within a
/// millisecond.
pub struct InMemoryConfigStore {
    records: DashMap<i64, ConfigRecord>,
    devices: DashSet<i64>,
    last_token: Mutex<i64>,
}

impl InMemoryConfigStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            devices: DashSet::new(),
            last_token: Mutex::new(0),
        }
    }

    /// Build a store that already knows the given devices.
    #[must_use]
    pub fn with_devices(device_ids: impl IntoIterator<Item = i64>) -> Self {
        let store = Self::new();
        for id in device_ids {
            store.devices.insert(id);
        }
        store
    }

    /// Make a device known to the store. Records are still created lazily.
    pub fn register_device(&self, device_id: i64) {
        self.devices.insert(device_id);
    }

    /// Current record count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn known(&self, device_id: i64) -> Result<(), StoreError> {
        if self.devices.contains(&device_id) {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }

    /// Mint the next token: wall clock, bumped past the previous token when
    /// two writes land in the same millisecond.
    fn next_token(&self) -> VersionToken {
        let now = epoch_millis();
        let mut last = self.last_token.lock();
        let next = now.max(*last + 1);
        *last = next;
        VersionToken(next)
    }
}

impl Default for InMemoryConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn load(&self, device_id: i64) -> Result<Option<ConfigRecord>, StoreError> {
        self.known(device_id)?;
        Ok(self.records.get(&device_id).map(|r| r.value().clone()))
    }

    async fn compare_and_swap(
        &self,
        device_id: i64,
        expected: VersionToken,
        fields: Map<String, Value>,
    ) -> Result<ConfigRecord, StoreError> {
        self.known(device_id)?;
        let token = self.next_token();

        // Entry guard held across check and write: this is the atomic CAS.
        match self.records.entry(device_id) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().updated_at != expected {
                    debug!(
                        device_id,
                        expected = expected.as_millis(),
                        live = occupied.get().updated_at.as_millis(),
                        "CAS lost to a concurrent writer"
                    );
                    return Err(StoreError::VersionMismatch);
                }
                let record = ConfigRecord {
                    device_id,
                    created_at: occupied.get().created_at,
                    updated_at: token,
                    fields,
                };
                occupied.insert(record.clone());
                Ok(record)
            }
            // Nothing to swap against.
            Entry::Vacant(_) => Err(StoreError::VersionMismatch),
        }
    }

    async fn reset_to_default(
        &self,
        device_id: i64,
        defaults: Map<String, Value>,
    ) -> Result<ConfigRecord, StoreError> {
        self.known(device_id)?;
        let token = self.next_token();

        match self.records.entry(device_id) {
            Entry::Occupied(mut occupied) => {
                let record = ConfigRecord {
                    device_id,
                    created_at: occupied.get().created_at,
                    updated_at: token,
                    fields: defaults,
                };
                occupied.insert(record.clone());
                Ok(record)
            }
            Entry::Vacant(vacant) => {
                let record = ConfigRecord {
                    device_id,
                    created_at: token.as_millis(),
                    updated_at: token,
                    fields: defaults,
                };
                vacant.insert(record.clone());
                Ok(record)
            }
        }
    }
}
