//! PostgreSQL audit store.

use super::AuditStore;
use crate::audit::{AuditQuery, AuditRecord, TokenUsage};
use crate::{Error, Result};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Executor, Row};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS llm_call_audit (
    audit_id            TEXT PRIMARY KEY,
    correlation_id      TEXT NOT NULL UNIQUE,
    tenant_id           TEXT NOT NULL,
    requester_id        TEXT NOT NULL,
    fingerprint         TEXT NOT NULL,
    matched_policies    TEXT NOT NULL,
    response_summary    TEXT NOT NULL,
    summary_truncated   BOOLEAN NOT NULL,
    provider            TEXT NOT NULL,
    model               TEXT NOT NULL,
    prompt_tokens       BIGINT NOT NULL,
    completion_tokens   BIGINT NOT NULL,
    total_tokens        BIGINT NOT NULL,
    latency_ms          BIGINT NOT NULL,
    estimated_cost_usd  DOUBLE PRECISION NOT NULL,
    metadata            TEXT,
    precheck_at         TIMESTAMPTZ NOT NULL,
    persisted_at        TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS llm_call_audit_tenant_time
    ON llm_call_audit (tenant_id, persisted_at);
"#;

const UNIQUE_VIOLATION: &str = "23505";

/// Audit store backed by a PostgreSQL table with a unique correlation id.
pub struct PostgresAuditStore {
    pool: PgPool,
}

impl PostgresAuditStore {
    /// Connect and make sure the audit table exists.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(db_error)?;

        // Multi-statement DDL goes through the simple query protocol.
        (&pool).execute(CREATE_TABLE).await.map_err(db_error)?;

        Ok(Self { pool })
    }
}

fn db_error(e: sqlx::Error) -> Error {
    Error::storage("postgres", e.to_string())
}

fn to_i64(value: u64, field: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| Error::validation_field("Value out of range", field))
}

fn from_row(row: &PgRow) -> Result<AuditRecord> {
    let get_u64 = |name: &str| -> Result<u64> {
        let value: i64 = row.try_get(name).map_err(db_error)?;
        u64::try_from(value).map_err(|_| Error::storage("postgres", format!("negative {}", name)))
    };
    let matched: String = row.try_get("matched_policies").map_err(db_error)?;
    let metadata: Option<String> = row.try_get("metadata").map_err(db_error)?;

    Ok(AuditRecord {
        audit_id: row.try_get("audit_id").map_err(db_error)?,
        correlation_id: row.try_get("correlation_id").map_err(db_error)?,
        tenant_id: row.try_get("tenant_id").map_err(db_error)?,
        requester_id: row.try_get("requester_id").map_err(db_error)?,
        fingerprint: row.try_get("fingerprint").map_err(db_error)?,
        matched_policies: serde_json::from_str(&matched)?,
        response_summary: row.try_get("response_summary").map_err(db_error)?,
        summary_truncated: row.try_get("summary_truncated").map_err(db_error)?,
        provider: row.try_get("provider").map_err(db_error)?,
        model: row.try_get("model").map_err(db_error)?,
        usage: TokenUsage {
            prompt_tokens: get_u64("prompt_tokens")?,
            completion_tokens: get_u64("completion_tokens")?,
            total_tokens: get_u64("total_tokens")?,
        },
        latency_ms: get_u64("latency_ms")?,
        estimated_cost_usd: row.try_get("estimated_cost_usd").map_err(db_error)?,
        metadata: metadata.map(|m| serde_json::from_str(&m)).transpose()?,
        precheck_at: row.try_get::<DateTime<Utc>, _>("precheck_at").map_err(db_error)?,
        persisted_at: row.try_get::<DateTime<Utc>, _>("persisted_at").map_err(db_error)?,
    })
}

#[async_trait]
impl AuditStore for PostgresAuditStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn persist(&self, record: &AuditRecord) -> Result<()> {
        let metadata = record
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            r#"INSERT INTO llm_call_audit (
                audit_id, correlation_id, tenant_id, requester_id, fingerprint,
                matched_policies, response_summary, summary_truncated, provider, model,
                prompt_tokens, completion_tokens, total_tokens, latency_ms,
                estimated_cost_usd, metadata, precheck_at, persisted_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)"#,
        )
        .bind(&record.audit_id)
        .bind(&record.correlation_id)
        .bind(&record.tenant_id)
        .bind(&record.requester_id)
        .bind(&record.fingerprint)
        .bind(serde_json::to_string(&record.matched_policies)?)
        .bind(&record.response_summary)
        .bind(record.summary_truncated)
        .bind(&record.provider)
        .bind(&record.model)
        .bind(to_i64(record.usage.prompt_tokens, "usage.prompt_tokens")?)
        .bind(to_i64(record.usage.completion_tokens, "usage.completion_tokens")?)
        .bind(to_i64(record.usage.total_tokens, "usage.total_tokens")?)
        .bind(to_i64(record.latency_ms, "latency_ms")?)
        .bind(record.estimated_cost_usd)
        .bind(metadata)
        .bind(record.precheck_at)
        .bind(record.persisted_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                Err(Error::duplicate_audit(&record.correlation_id))
            }
            Err(e) => Err(db_error(e)),
        }
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>> {
        let limit = query
            .limit
            .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
            .unwrap_or(i64::MAX);

        let rows = sqlx::query(
            r#"SELECT * FROM llm_call_audit
               WHERE tenant_id = $1
                 AND ($2::timestamptz IS NULL OR persisted_at >= $2)
                 AND ($3::timestamptz IS NULL OR persisted_at < $3)
               ORDER BY persisted_at ASC
               LIMIT $4"#,
        )
        .bind(&query.tenant_id)
        .bind(query.from)
        .bind(query.to)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(from_row).collect()
    }
}
