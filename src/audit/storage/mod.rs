//! Audit persistence backends.

mod jsonl;
mod memory;
#[cfg(feature = "postgres-storage")]
mod postgres;

pub use jsonl::JsonlAuditStore;
pub use memory::MemoryAuditStore;
#[cfg(feature = "postgres-storage")]
pub use postgres::PostgresAuditStore;

use super::{AuditQuery, AuditRecord};
use crate::config::{AuditBackend, AuditConfig};
use crate::{Error, Result};

use async_trait::async_trait;
use std::sync::Arc;

/// Durable home for audit records.
///
/// `persist` must not return `Ok` before the record is durable, and must
/// refuse a second record for the same correlation identifier with
/// [`crate::Error::DuplicateAudit`].
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Short backend name for logs and errors.
    fn backend(&self) -> &'static str;

    /// Persist one record.
    async fn persist(&self, record: &AuditRecord) -> Result<()>;

    /// Retrieve records of a tenant, oldest first.
    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>>;
}

/// Open the audit store selected by configuration.
pub async fn open(config: &AuditConfig) -> Result<Arc<dyn AuditStore>> {
    match config.backend {
        AuditBackend::Memory => Ok(Arc::new(MemoryAuditStore::new())),
        AuditBackend::Jsonl => {
            let path = config.jsonl_path.as_ref().ok_or_else(|| {
                Error::config_key("JSONL backend requires a path", "audit.jsonl_path")
            })?;
            Ok(Arc::new(JsonlAuditStore::open(path).await?))
        }
        AuditBackend::Postgres => open_postgres(config).await,
    }
}

#[cfg(feature = "postgres-storage")]
async fn open_postgres(config: &AuditConfig) -> Result<Arc<dyn AuditStore>> {
    let url = config.database_url.as_deref().ok_or_else(|| {
        Error::config_key("Postgres backend requires a URL", "audit.database_url")
    })?;
    Ok(Arc::new(PostgresAuditStore::connect(url).await?))
}

#[cfg(not(feature = "postgres-storage"))]
async fn open_postgres(_config: &AuditConfig) -> Result<Arc<dyn AuditStore>> {
    Err(Error::config_key(
        "Postgres backend requires the postgres-storage feature",
        "audit.backend",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_selected_backend() {
        let store = open(&AuditConfig::default()).await.unwrap();
        assert_eq!(store.backend(), "memory");

        let dir = tempfile::tempdir().unwrap();
        let config = AuditConfig {
            backend: AuditBackend::Jsonl,
            jsonl_path: Some(dir.path().join("audit.jsonl")),
            ..AuditConfig::default()
        };
        assert_eq!(open(&config).await.unwrap().backend(), "jsonl");

        let missing = AuditConfig {
            backend: AuditBackend::Jsonl,
            ..AuditConfig::default()
        };
        assert!(matches!(open(&missing).await, Err(Error::Config { .. })));
    }
}
