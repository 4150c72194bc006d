//! PostgreSQL audit store

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use shared::AuditEntry;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};

use super::{AUDIT_COLUMNS, AuditStore, AuditTransaction};
use crate::error::{AuditError, AuditResult, BoxError};

/// Postgres caps a statement at 65535 bind parameters
const MAX_ROWS_PER_STATEMENT: usize = u16::MAX as usize / AUDIT_COLUMNS.len();

#[derive(Clone)]
pub struct PgAuditStore {
    pool: PgPool,
    timeout: Duration,
}

impl std::fmt::Debug for PgAuditStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgAuditStore")
            .field("pool_size", &self.pool.size())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl PgAuditStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Connect, run migrations, and wrap the pool
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        timeout: Duration,
    ) -> Result<Self, BoxError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(timeout)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self::new(pool, timeout))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Run one store step under the configured bound
async fn bounded<T, F>(op: &'static str, after: Duration, fut: F) -> AuditResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result.map_err(AuditError::from),
        Err(_) => Err(AuditError::Timeout { op, after }),
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn begin(&self) -> AuditResult<Box<dyn AuditTransaction>> {
        let tx = bounded("begin", self.timeout, self.pool.begin()).await?;
        Ok(Box::new(PgAuditTransaction {
            tx: Some(tx),
            timeout: self.timeout,
        }))
    }
}

struct PgAuditTransaction {
    /// `None` once committed or rolled back
    tx: Option<Transaction<'static, Postgres>>,
    timeout: Duration,
}

fn insert_statement(rows: &[AuditEntry]) -> QueryBuilder<'_, Postgres> {
    let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new("INSERT INTO audit_logs (");
    builder.push(AUDIT_COLUMNS.join(", "));
    builder.push(") ");
    builder.push_values(rows, |mut row, entry| {
        row.push_bind(entry.category().as_str())
            .push_bind(entry.action.as_str())
            .push_bind(entry.actor_id.as_deref())
            .push_bind(entry.actor_name.as_deref())
            .push_bind(entry.ip_address.as_deref())
            .push_bind(entry.user_agent.as_deref())
            .push_bind(entry.session_id.as_deref())
            .push_bind(entry.resource_type.as_deref())
            .push_bind(entry.resource_id.as_deref())
            .push_bind(Json(&entry.details))
            .push_bind(entry.success)
            .push_bind(entry.error_message.as_deref());
    });
    builder
}

#[async_trait]
impl AuditTransaction for PgAuditTransaction {
    async fn insert_batch(&mut self, entries: &[AuditEntry]) -> AuditResult<()> {
        let timeout = self.timeout;
        let tx = self
            .tx
            .as_mut()
            .ok_or_else(|| AuditError::Store("transaction already finished".into()))?;

        // A single statement unless the backlog outgrows the bind limit
        for rows in entries.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut builder = insert_statement(rows);
            bounded("insert", timeout, builder.build().execute(&mut **tx)).await?;
        }
        Ok(())
    }

    async fn commit(&mut self) -> AuditResult<()> {
        match self.tx.take() {
            Some(tx) => bounded("commit", self.timeout, tx.commit()).await,
            None => Err(AuditError::Store("transaction already finished".into())),
        }
    }

    async fn rollback(&mut self) -> AuditResult<()> {
        match self.tx.take() {
            Some(tx) => bounded("rollback", self.timeout, tx.rollback()).await,
            // commit consumed it; the driver rolls back on drop
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::audit::AuthenticationAction;

    #[test]
    fn insert_lists_columns_in_order() {
        let entries = vec![
            AuditEntry::new(AuthenticationAction::Login),
            AuditEntry::new(AuthenticationAction::Logout),
        ];
        let sql = insert_statement(&entries).into_sql();
        assert!(sql.starts_with(
            "INSERT INTO audit_logs (category, action, actor_id, actor_name, ip_address, \
             user_agent, session_id, resource_type, resource_id, details, success, error_message) VALUES "
        ));
        assert!(sql.contains("($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"));
        assert!(sql.ends_with("($13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24)"));
    }

    #[test]
    fn chunk_size_respects_bind_limit() {
        assert!(MAX_ROWS_PER_STATEMENT * AUDIT_COLUMNS.len() <= u16::MAX as usize);
    }
}
