//! SQLite-backed [`ArtifactCache`] implementation.
//!
//! Persists generated artifacts across CLI invocations so a re-entered
//! document resumes at the stage it reached, without regenerating anything.
//! One row per artifact in the `artifacts` table (see [`crate::migrate`]).

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use proposal_flow_core::cache::{ArtifactCache, ArtifactKey, ArtifactKind};
use proposal_flow_core::models::{DocumentId, TemplateId};

use crate::config::Config;
use crate::{db, migrate};

/// SQLite implementation of the [`ArtifactCache`] trait.
pub struct SqliteCache {
    pool: SqlitePool,
}

impl SqliteCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connects to the configured database and ensures the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn template_column(template: Option<&TemplateId>) -> &str {
    template.map(|t| t.as_str()).unwrap_or("")
}

fn parse_value(raw: &str, kind: ArtifactKind) -> Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("Corrupt cached {} row", kind.as_str()))
}

#[async_trait]
impl ArtifactCache for SqliteCache {
    async fn get(&self, key: &ArtifactKey) -> Result<Option<Value>> {
        let row = sqlx::query(
            "SELECT value_json FROM artifacts \
             WHERE document_id = ? AND template_id = ? AND kind = ? AND key = ?",
        )
        .bind(key.document.as_str())
        .bind(template_column(key.template.as_ref()))
        .bind(key.kind.as_str())
        .bind(&key.key)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let raw: String = row.get("value_json");
                Ok(Some(parse_value(&raw, key.kind)?))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &ArtifactKey, value: &Value) -> Result<()> {
        let json = serde_json::to_string(value)?;
        sqlx::query(
            r#"
            INSERT INTO artifacts (document_id, template_id, kind, key, value_json, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(document_id, template_id, kind, key) DO UPDATE SET
                value_json = excluded.value_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key.document.as_str())
        .bind(template_column(key.template.as_ref()))
        .bind(key.kind.as_str())
        .bind(&key.key)
        .bind(&json)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        debug!(document = %key.document, kind = key.kind.as_str(), key = %key.key, "cached artifact");
        Ok(())
    }

    async fn invalidate(&self, key: &ArtifactKey) -> Result<()> {
        sqlx::query(
            "DELETE FROM artifacts \
             WHERE document_id = ? AND template_id = ? AND kind = ? AND key = ?",
        )
        .bind(key.document.as_str())
        .bind(template_column(key.template.as_ref()))
        .bind(key.kind.as_str())
        .bind(&key.key)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(
        &self,
        document: &DocumentId,
        template: Option<&TemplateId>,
        kind: ArtifactKind,
    ) -> Result<Vec<(String, Value)>> {
        let rows = sqlx::query(
            "SELECT key, value_json FROM artifacts \
             WHERE document_id = ? AND template_id = ? AND kind = ? \
             ORDER BY key",
        )
        .bind(document.as_str())
        .bind(template_column(template))
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let key: String = row.get("key");
                let raw: String = row.get("value_json");
                Ok((key, parse_value(&raw, kind)?))
            })
            .collect()
    }

    async fn invalidate_document(&self, document: &DocumentId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM artifacts WHERE document_id = ?")
            .bind(document.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
