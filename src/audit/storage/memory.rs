//! In-process audit store.

use super::AuditStore;
use crate::audit::{AuditQuery, AuditRecord};
use crate::{Error, Result};

use async_trait::async_trait;
use parking_lot::RwLock;

/// Audit store kept in memory. Records vanish with the process.
#[derive(Default)]
pub struct MemoryAuditStore {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn persist(&self, record: &AuditRecord) -> Result<()> {
        let mut records = self.records.write();
        if records
            .iter()
            .any(|r| r.correlation_id == record.correlation_id)
        {
            return Err(Error::duplicate_audit(&record.correlation_id));
        }
        records.push(record.clone());
        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>> {
        let matching = self
            .records
            .read()
            .iter()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        Ok(query.finish(matching))
    }
}
