use super::{CycleBatch, StorageError, StoredRecord, Table};
use anyhow::{Context, Result};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::types::Json;
use tracing::{debug, info};

/// Relational store: one JSONB row per natural key and table
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("✅ Connected to PostgreSQL");

        Ok(Self { pool })
    }

    pub async fn init_tables(&self) -> Result<()> {
        for table in Table::ALL {
            let statement = format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    record_key TEXT PRIMARY KEY,
                    payload JSONB NOT NULL,
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )
                "#,
                table.name()
            );
            sqlx::query(&statement)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to create {} table", table.name()))?;
        }

        info!("✅ Initialized storage tables");

        Ok(())
    }

    pub async fn upsert(&self, table: Table, records: &[StoredRecord]) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        upsert_rows(&mut *tx, table, records).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn persist_cycle(&self, batch: &CycleBatch) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        for (table, records) in batch.tables() {
            upsert_rows(&mut *tx, table, records).await?;
        }
        tx.commit().await?;

        debug!("Committed {} rows for cycle {}", batch.len(), batch.cycle_id);
        Ok(())
    }
}

async fn upsert_rows(conn: &mut PgConnection, table: Table, records: &[StoredRecord]) -> Result<(), StorageError> {
    let statement = upsert_statement(table);
    for record in records {
        sqlx::query(&statement)
            .bind(&record.key)
            .bind(Json(&record.payload))
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

fn upsert_statement(table: Table) -> String {
    format!(
        r#"
        INSERT INTO {} (record_key, payload, updated_at)
        VALUES ($1, $2, NOW())
        ON CONFLICT (record_key) DO UPDATE SET
            payload = EXCLUDED.payload,
            updated_at = NOW()
        "#,
        table.name()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_statement_targets_table() {
        let statement = upsert_statement(Table::MarketMetrics);
        assert!(statement.contains("INSERT INTO market_metrics"));
        assert!(statement.contains("ON CONFLICT (record_key) DO UPDATE"));
    }
}
