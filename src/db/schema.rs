//! Database schema initialization

use sqlx::SqlitePool;
use tracing::info;

use crate::error::Result;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_SQL).execute(pool).await?;
    add_text_folded(pool).await?;

    Ok(())
}

/// Databases created before `text_folded` existed get the column added and
/// filled. SQLite's `lower()` only folds ASCII, so the folding happens here.
async fn add_text_folded(pool: &SqlitePool) -> Result<()> {
    let present: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info('saved_texts') WHERE name = 'text_folded'",
    )
    .fetch_one(pool)
    .await?;
    if present == 0 {
        sqlx::query("ALTER TABLE saved_texts ADD COLUMN text_folded TEXT")
            .execute(pool)
            .await?;
    }

    let pending: Vec<(i64, String)> =
        sqlx::query_as("SELECT id, text FROM saved_texts WHERE text_folded IS NULL")
            .fetch_all(pool)
            .await?;
    if pending.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    for (id, text) in &pending {
        sqlx::query("UPDATE saved_texts SET text_folded = ? WHERE id = ?")
            .bind(text.to_lowercase())
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    info!("Folded {} saved text(s) for search", pending.len());

    Ok(())
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    created_at TEXT NOT NULL
);

-- One row per OCR run. embedding is a JSON array of floats,
-- text_folded is text lowercased with full Unicode case mapping.
CREATE TABLE IF NOT EXISTS saved_texts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT,
    name TEXT,
    text TEXT NOT NULL,
    provider TEXT,
    content_hash TEXT,
    embedding TEXT,
    project_id INTEGER REFERENCES projects(id),
    created_at TEXT NOT NULL,
    text_folded TEXT
);

CREATE INDEX IF NOT EXISTS idx_saved_texts_project_id ON saved_texts(project_id);
CREATE INDEX IF NOT EXISTS idx_saved_texts_created_at ON saved_texts(created_at);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_folded_text_is_backfilled() {
        let pool = test_pool().await;
        sqlx::query("INSERT INTO saved_texts (text, created_at) VALUES ('ÀRBOL Grande', '2024-01-01T00:00:00.000Z')")
            .execute(&pool)
            .await
            .unwrap();

        // running again is harmless and fills the new row
        initialize_schema(&pool).await.unwrap();

        let folded: String = sqlx::query_scalar("SELECT text_folded FROM saved_texts")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(folded, "àrbol grande");
    }
}
