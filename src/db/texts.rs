//! Saved text database operations

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use super::now;
use crate::error::{AppError, Result};

/// Saved OCR text as returned by the API (embedding omitted)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SavedText {
    pub id: i64,
    pub filename: Option<String>,
    pub name: Option<String>,
    pub text: String,
    pub provider: Option<String>,
    pub project_id: Option<i64>,
    pub created_at: String,
}

/// Insert payload for a new OCR result
#[derive(Debug, Clone, Default)]
pub struct NewText {
    pub filename: Option<String>,
    pub name: Option<String>,
    pub text: String,
    pub provider: Option<String>,
    pub content_hash: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub project_id: Option<i64>,
}

/// Aggregate numbers for the stats panel
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TextStats {
    pub count: i64,
    pub earliest: Option<String>,
    pub latest: Option<String>,
    pub avg_text_length: Option<f64>,
}

#[derive(sqlx::FromRow)]
struct EmbeddedRow {
    #[sqlx(flatten)]
    text: SavedText,
    embedding: Option<String>,
}

const TEXT_COLUMNS: &str = "id, filename, name, text, provider, project_id, created_at";

/// Saved text repository
pub struct TextRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> TextRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, data: &NewText) -> Result<SavedText> {
        // JSON has no NaN or infinity; serde_json would write them as null.
        if let Some(vector) = &data.embedding {
            if vector.iter().any(|v| !v.is_finite()) {
                return Err(AppError::Internal("Embedding has non-finite values".to_string()));
            }
        }
        let embedding = data
            .embedding
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| AppError::Internal(format!("Failed to encode embedding: {}", e)))?;
        let created_at = now();

        let id = sqlx::query(
            r#"
            INSERT INTO saved_texts (filename, name, text, text_folded, provider, content_hash, embedding, project_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&data.filename)
        .bind(&data.name)
        .bind(&data.text)
        .bind(data.text.to_lowercase())
        .bind(&data.provider)
        .bind(&data.content_hash)
        .bind(embedding)
        .bind(data.project_id)
        .bind(&created_at)
        .execute(self.pool)
        .await?
        .last_insert_rowid();

        debug!("Stored text {} ({} chars)", id, data.text.chars().count());

        Ok(SavedText {
            id,
            filename: data.filename.clone(),
            name: data.name.clone(),
            text: data.text.clone(),
            provider: data.provider.clone(),
            project_id: data.project_id,
            created_at,
        })
    }

    /// List texts, newest first, optionally scoped to a project
    pub async fn list(&self, project_id: Option<i64>) -> Result<Vec<SavedText>> {
        let sql = format!(
            r#"
            SELECT {TEXT_COLUMNS}
            FROM saved_texts
            WHERE (?1 IS NULL OR project_id = ?1)
            ORDER BY created_at DESC, id DESC
            "#
        );
        let texts = sqlx::query_as::<_, SavedText>(&sql)
            .bind(project_id)
            .fetch_all(self.pool)
            .await?;

        Ok(texts)
    }

    /// Case-insensitive substring search over text bodies. Matching runs
    /// against `text_folded`, so non-ASCII letters fold too.
    pub async fn search(&self, q: &str, project_id: Option<i64>) -> Result<Vec<SavedText>> {
        let q = q.trim();
        if q.is_empty() {
            return Err(AppError::bad_request("Search query must not be empty"));
        }

        let sql = format!(
            r#"
            SELECT {TEXT_COLUMNS}
            FROM saved_texts
            WHERE text_folded LIKE ?1 ESCAPE '\' AND (?2 IS NULL OR project_id = ?2)
            ORDER BY created_at DESC, id DESC
            "#
        );
        let texts = sqlx::query_as::<_, SavedText>(&sql)
            .bind(like_pattern(&q.to_lowercase()))
            .bind(project_id)
            .fetch_all(self.pool)
            .await?;

        Ok(texts)
    }

    pub async fn get(&self, id: i64) -> Result<SavedText> {
        let sql = format!("SELECT {TEXT_COLUMNS} FROM saved_texts WHERE id = ?");
        sqlx::query_as::<_, SavedText>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("Text not found"))
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        let affected = sqlx::query("DELETE FROM saved_texts WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?
            .rows_affected();

        if affected == 0 {
            return Err(AppError::not_found("Text not found"));
        }
        Ok(())
    }

    /// Texts that carry an embedding, decoded. Rows with corrupt JSON are skipped.
    pub async fn with_embeddings(&self, project_id: Option<i64>) -> Result<Vec<(SavedText, Vec<f32>)>> {
        let sql = format!(
            r#"
            SELECT {TEXT_COLUMNS}, embedding
            FROM saved_texts
            WHERE embedding IS NOT NULL AND (?1 IS NULL OR project_id = ?1)
            "#
        );
        let rows = sqlx::query_as::<_, EmbeddedRow>(&sql)
            .bind(project_id)
            .fetch_all(self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let raw = row.embedding?;
                match serde_json::from_str::<Vec<f32>>(&raw) {
                    Ok(vector) => Some((row.text, vector)),
                    Err(e) => {
                        warn!("Skipping text {} with unreadable embedding: {}", row.text.id, e);
                        None
                    }
                }
            })
            .collect())
    }

    /// Non-empty text bodies, oldest first.
    pub async fn bodies_oldest_first(&self, project_id: Option<i64>) -> Result<Vec<String>> {
        let bodies = sqlx::query_scalar::<_, String>(
            r#"
            SELECT text
            FROM saved_texts
            WHERE text <> '' AND (?1 IS NULL OR project_id = ?1)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(project_id)
        .fetch_all(self.pool)
        .await?;

        Ok(bodies)
    }

    pub async fn stats(&self, project_id: Option<i64>) -> Result<TextStats> {
        let stats = sqlx::query_as::<_, TextStats>(
            r#"
            SELECT COUNT(id) AS count,
                   MIN(created_at) AS earliest,
                   MAX(created_at) AS latest,
                   AVG(LENGTH(text)) AS avg_text_length
            FROM saved_texts
            WHERE (?1 IS NULL OR project_id = ?1)
            "#,
        )
        .bind(project_id)
        .fetch_one(self.pool)
        .await?;

        Ok(stats)
    }
}

/// `%q%` with LIKE metacharacters escaped by `\`.
fn like_pattern(q: &str) -> String {
    let mut pattern = String::with_capacity(q.len() + 2);
    pattern.push('%');
    for c in q.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{test_pool, CreateProject, ProjectRepository};

    async fn seed(repo: &TextRepository<'_>, text: &str, project_id: Option<i64>) -> SavedText {
        repo.insert(&NewText {
            filename: Some(format!("{}.png", text.len())),
            text: text.to_string(),
            project_id,
            ..Default::default()
        })
        .await
        .unwrap()
    }

    #[test]
    fn test_like_pattern_escapes() {
        assert_eq!(like_pattern("abc"), "%abc%");
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }

    #[tokio::test]
    async fn test_insert_get_delete() {
        let pool = test_pool().await;
        let repo = TextRepository::new(&pool);

        let saved = repo
            .insert(&NewText {
                filename: Some("note.png".into()),
                name: Some("Grocery list".into()),
                text: "milk, eggs".into(),
                provider: Some("openai".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        let fetched = repo.get(saved.id).await.unwrap();
        assert_eq!(fetched.name.as_deref(), Some("Grocery list"));
        assert_eq!(fetched.provider.as_deref(), Some("openai"));
        assert!(fetched.created_at.ends_with('Z'));

        repo.delete(saved.id).await.unwrap();
        assert!(matches!(repo.get(saved.id).await.unwrap_err(), AppError::NotFound(_)));
        assert!(matches!(repo.delete(saved.id).await.unwrap_err(), AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_and_scoped() {
        let pool = test_pool().await;
        let project = ProjectRepository::new(&pool)
            .create(&CreateProject {
                name: "P".into(),
                description: None,
            })
            .await
            .unwrap();
        let repo = TextRepository::new(&pool);

        seed(&repo, "Dear Diary, today", Some(project.id)).await;
        seed(&repo, "shopping: DIARY refill", None).await;
        seed(&repo, "100% done", None).await;

        assert_eq!(repo.search("diary", None).await.unwrap().len(), 2);
        assert_eq!(repo.search("diary", Some(project.id)).await.unwrap().len(), 1);
        assert_eq!(repo.search("0%", None).await.unwrap().len(), 1);
        assert_eq!(repo.search("_", None).await.unwrap().len(), 0);
        assert!(matches!(
            repo.search("  ", None).await.unwrap_err(),
            AppError::BadRequest(_)
        ));
    }

    #[tokio::test]
    async fn test_search_folds_non_ascii_letters() {
        let pool = test_pool().await;
        let repo = TextRepository::new(&pool);

        seed(&repo, "Benvenuti nella città di Ñandú", None).await;
        seed(&repo, "ciudad", None).await;

        for q in ["città", "CITTÀ", "ñandú", "ÑANDÚ"] {
            let hits = repo.search(q, None).await.unwrap();
            assert_eq!(hits.len(), 1, "query {q}");
            assert_eq!(hits[0].text, "Benvenuti nella città di Ñandú");
        }
    }

    #[tokio::test]
    async fn test_embeddings_round_trip_through_json() {
        let pool = test_pool().await;
        let repo = TextRepository::new(&pool);

        repo.insert(&NewText {
            text: "with vector".into(),
            embedding: Some(vec![0.5, -1.0]),
            ..Default::default()
        })
        .await
        .unwrap();
        seed(&repo, "without vector", None).await;

        let rows = repo.with_embeddings(None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0.text, "with vector");
        assert_eq!(rows[0].1, vec![0.5, -1.0]);
    }

    #[tokio::test]
    async fn test_non_finite_embedding_is_rejected() {
        let pool = test_pool().await;
        let repo = TextRepository::new(&pool);

        let err = repo
            .insert(&NewText {
                text: "bad vector".into(),
                embedding: Some(vec![1.0, f32::INFINITY]),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(repo.stats(None).await.unwrap().count, 0);
    }

    #[tokio::test]
    async fn test_stats_and_bodies() {
        let pool = test_pool().await;
        let repo = TextRepository::new(&pool);

        let empty = repo.stats(None).await.unwrap();
        assert_eq!(empty.count, 0);
        assert!(empty.earliest.is_none());
        assert!(empty.avg_text_length.is_none());

        seed(&repo, "ab", None).await;
        seed(&repo, "", None).await;
        seed(&repo, "abcd", None).await;

        let stats = repo.stats(None).await.unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.avg_text_length, Some(2.0));
        assert!(stats.earliest <= stats.latest);

        let bodies = repo.bodies_oldest_first(None).await.unwrap();
        assert_eq!(bodies, vec!["ab", "abcd"]);
    }
}
