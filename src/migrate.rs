use anyhow::Result;
use sqlx::SqlitePool;

/// Creates the artifact cache schema. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // `template_id` is '' for per-document artifacts (the scope) so the
    // primary key never contains NULL.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artifacts (
            document_id TEXT NOT NULL,
            template_id TEXT NOT NULL DEFAULT '',
            kind TEXT NOT NULL,
            key TEXT NOT NULL DEFAULT '',
            value_json TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (document_id, template_id, kind, key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_artifacts_document_id ON artifacts(document_id)")
        .execute(pool)
        .await?;

    Ok(())
}
