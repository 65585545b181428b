//! Project API routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};

use super::MessageResponse;
use crate::db::{CreateProject, Project, ProjectRepository};
use crate::error::Result;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/projects", get(list_projects).post(create_project))
        .route("/projects/", get(list_projects).post(create_project))
        .route("/projects/:id", get(get_project).delete(delete_project))
        .route("/projects/:id/content", delete(clear_project_content))
}

async fn create_project(
    State(state): State<AppState>,
    Json(data): Json<CreateProject>,
) -> Result<(StatusCode, Json<Project>)> {
    let project = ProjectRepository::new(&state.db).create(&data).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

async fn list_projects(State(state): State<AppState>) -> Result<Json<Vec<Project>>> {
    let projects = ProjectRepository::new(&state.db).list().await?;
    Ok(Json(projects))
}

async fn get_project(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Project>> {
    let project = ProjectRepository::new(&state.db).get(id).await?;
    Ok(Json(project))
}

/// Delete a project together with its texts
async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    let message = ProjectRepository::new(&state.db).delete(id).await?;
    Ok(Json(MessageResponse::new(message)))
}

/// Remove every text of a project but keep the project
async fn clear_project_content(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    let message = ProjectRepository::new(&state.db).clear_content(id).await?;
    Ok(Json(MessageResponse::new(message)))
}

#[cfg(test)]
mod tests {
    use crate::db::{NewText, TextRepository};
    use crate::routes::test_support::{delete, get, post_json, send, test_app};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_project_lifecycle() {
        let (app, pool) = test_app(vec![], None).await;

        let (status, project) = send(
            &app,
            post_json("/projects/", json!({"name": "  Letters ", "description": "1920s"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(project["name"], "Letters");
        let id = project["id"].as_i64().unwrap();

        let (status, body) = send(&app, post_json("/projects", json!({"name": "Letters"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Project with this name already exists");

        let (_, list) = send(&app, get("/projects")).await;
        assert_eq!(list.as_array().unwrap().len(), 1);

        TextRepository::new(&pool)
            .insert(&NewText {
                text: "dear sir".into(),
                project_id: Some(id),
                ..Default::default()
            })
            .await
            .unwrap();

        let (status, body) = send(&app, delete(&format!("/projects/{}/content", id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Cleared 1 text(s) from project 'Letters'");

        let (status, body) = send(&app, delete(&format!("/projects/{}", id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Deleted project 'Letters' and 0 text(s)");

        let (status, body) = send(&app, get(&format!("/projects/{}", id))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");
    }
}
