//! Project database operations

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;

use super::now;
use crate::error::{AppError, Result};

/// Project record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
}

/// Create project request
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProject {
    pub name: String,
    pub description: Option<String>,
}

/// Project repository
pub struct ProjectRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ProjectRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a project; names are unique.
    pub async fn create(&self, data: &CreateProject) -> Result<Project> {
        let name = data.name.trim();
        if name.is_empty() {
            return Err(AppError::bad_request("Project name required"));
        }
        let description = data
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty());

        let created_at = now();
        let id = sqlx::query(
            r#"
            INSERT INTO projects (name, description, created_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(&created_at)
        .execute(self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::bad_request("Project with this name already exists")
            }
            other => AppError::Database(other),
        })?
        .last_insert_rowid();

        info!("Created project {} ({})", id, name);

        Ok(Project {
            id,
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at,
        })
    }

    /// List projects, newest first
    pub async fn list(&self) -> Result<Vec<Project>> {
        let projects = sqlx::query_as::<_, Project>(
            r#"
            SELECT id, name, description, created_at
            FROM projects
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        Ok(projects)
    }

    pub async fn find(&self, id: i64) -> Result<Option<Project>> {
        let project = sqlx::query_as::<_, Project>(
            "SELECT id, name, description, created_at FROM projects WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(project)
    }

    /// Get a project or fail with 404
    pub async fn get(&self, id: i64) -> Result<Project> {
        self.find(id)
            .await?
            .ok_or_else(|| AppError::not_found("Project not found"))
    }

    /// Delete a project together with all of its texts.
    pub async fn delete(&self, id: i64) -> Result<String> {
        let project = self.get(id).await?;

        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM saved_texts WHERE project_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("Deleted project {} and {} texts", id, removed);
        Ok(format!(
            "Deleted project '{}' and {} text(s)",
            project.name, removed
        ))
    }

    /// Remove every text of a project but keep the project itself.
    pub async fn clear_content(&self, id: i64) -> Result<String> {
        let project = self.get(id).await?;

        let removed = sqlx::query("DELETE FROM saved_texts WHERE project_id = ?")
            .bind(id)
            .execute(self.pool)
            .await?
            .rows_affected();

        info!("Cleared {} texts from project {}", removed, id);
        Ok(format!(
            "Cleared {} text(s) from project '{}'",
            removed, project.name
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{test_pool, NewText, TextRepository};

    fn create(name: &str) -> CreateProject {
        CreateProject {
            name: name.to_string(),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let pool = test_pool().await;
        let repo = ProjectRepository::new(&pool);

        let first = repo
            .create(&CreateProject {
                name: "  Letters ".to_string(),
                description: Some("  ".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(first.name, "Letters");
        assert!(first.description.is_none());

        repo.create(&create("Receipts")).await.unwrap();

        let names: Vec<_> = repo.list().await.unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Receipts", "Letters"]);
    }

    #[tokio::test]
    async fn test_duplicate_and_blank_names_rejected() {
        let pool = test_pool().await;
        let repo = ProjectRepository::new(&pool);
        repo.create(&create("Diary")).await.unwrap();

        let err = repo.create(&create("Diary")).await.unwrap_err();
        assert_eq!(err.to_string(), "Project with this name already exists");

        let err = repo.create(&create("   ")).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_names_are_bad_requests() {
        let path = std::env::temp_dir().join(format!("ocr-platform-{}.db", uuid::Uuid::new_v4()));
        let url = format!("sqlite://{}", path.display());
        let pool = crate::db::create_pool(&url, 4).await.unwrap();

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move { ProjectRepository::new(&pool).create(&create("Shared")).await })
            })
            .collect();

        let mut created = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => created += 1,
                Err(e) => {
                    assert!(matches!(e, AppError::BadRequest(_)), "unexpected error: {:?}", e);
                    assert_eq!(e.to_string(), "Project with this name already exists");
                }
            }
        }
        assert_eq!(created, 1);

        pool.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let pool = test_pool().await;
        let projects = ProjectRepository::new(&pool);
        let texts = TextRepository::new(&pool);

        let keep = projects.create(&create("Keep")).await.unwrap();
        let drop = projects.create(&create("Drop")).await.unwrap();
        for (project, body) in [(keep.id, "a"), (keep.id, "b"), (drop.id, "c")] {
            texts
                .insert(&NewText {
                    text: body.to_string(),
                    project_id: Some(project),
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        let msg = projects.clear_content(keep.id).await.unwrap();
        assert_eq!(msg, "Cleared 2 text(s) from project 'Keep'");
        assert!(projects.find(keep.id).await.unwrap().is_some());

        let msg = projects.delete(drop.id).await.unwrap();
        assert_eq!(msg, "Deleted project 'Drop' and 1 text(s)");
        assert!(projects.find(drop.id).await.unwrap().is_none());
        assert!(texts.list(None).await.unwrap().is_empty());

        assert!(matches!(
            projects.delete(drop.id).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }
}
