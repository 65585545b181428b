//! Database explorer routes: catalog, raw read-only SQL and table browsing

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::{
    default_schema, default_table, BrowseRequest, BrowseResult, ColumnInfo, ExplorerRepository, QueryResult,
    TableRef,
};
use crate::error::Result;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/texts/raw_query", post(raw_query))
        .route("/db/schemas", get(list_schemas))
        .route("/db/tables", get(list_tables))
        .route("/db/columns", get(list_columns))
        .route("/db/browse", post(browse_table))
}

#[derive(Debug, Deserialize)]
pub struct RawQueryRequest {
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct TablesQuery {
    pub schema: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ColumnsQuery {
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_table")]
    pub table: String,
}

#[derive(Debug, Serialize)]
pub struct SchemaList {
    pub schemas: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TableList {
    pub tables: Vec<TableRef>,
}

#[derive(Debug, Serialize)]
pub struct ColumnList {
    pub columns: Vec<ColumnInfo>,
}

async fn raw_query(
    State(state): State<AppState>,
    Json(req): Json<RawQueryRequest>,
) -> Result<Json<QueryResult>> {
    let result = ExplorerRepository::new(&state.db).raw_query(&req.query).await?;
    Ok(Json(result))
}

async fn list_schemas(State(state): State<AppState>) -> Result<Json<SchemaList>> {
    let schemas = ExplorerRepository::new(&state.db).schemas().await?;
    Ok(Json(SchemaList { schemas }))
}

async fn list_tables(
    State(state): State<AppState>,
    Query(query): Query<TablesQuery>,
) -> Result<Json<TableList>> {
    let schema = query.schema.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let tables = ExplorerRepository::new(&state.db).tables(schema).await?;
    Ok(Json(TableList { tables }))
}

async fn list_columns(
    State(state): State<AppState>,
    Query(query): Query<ColumnsQuery>,
) -> Result<Json<ColumnList>> {
    let columns = ExplorerRepository::new(&state.db)
        .columns(&query.schema, &query.table)
        .await?;
    Ok(Json(ColumnList { columns }))
}

async fn browse_table(
    State(state): State<AppState>,
    Json(req): Json<BrowseRequest>,
) -> Result<Json<BrowseResult>> {
    let result = ExplorerRepository::new(&state.db).browse(&req).await?;
    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use crate::db::{NewText, TextRepository};
    use crate::routes::test_support::{get, post_json, send, test_app};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_catalog_routes() {
        let (app, _pool) = test_app(vec![], None).await;

        let (_, body) = send(&app, get("/db/schemas")).await;
        assert!(body["schemas"].as_array().unwrap().contains(&json!("main")));

        let (_, body) = send(&app, get("/db/tables?schema=main")).await;
        let tables: Vec<&str> = body["tables"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["table"].as_str().unwrap())
            .collect();
        assert!(tables.contains(&"projects"));
        assert!(tables.contains(&"saved_texts"));

        let (status, _) = send(&app, get("/db/tables?schema=nope")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = send(&app, get("/db/columns")).await;
        assert_eq!(body["columns"][0]["name"], "id");
        assert_eq!(body["columns"][3]["name"], "text");
        assert_eq!(body["columns"][3]["nullable"], false);
    }

    #[tokio::test]
    async fn test_raw_query_is_read_only() {
        let (app, pool) = test_app(vec![], None).await;
        TextRepository::new(&pool)
            .insert(&NewText {
                text: "keep me".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let (status, body) = send(
            &app,
            post_json("/texts/raw_query", json!({"query": "SELECT id, text FROM saved_texts;"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["columns"], json!(["id", "text"]));
        assert_eq!(body["rows"][0][1], "keep me");

        let (status, body) = send(
            &app,
            post_json("/texts/raw_query", json!({"query": "DELETE FROM saved_texts"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_query");

        let (status, _) = send(
            &app,
            post_json("/texts/raw_query", json!({"query": "SELECT * FROM missing_table"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, stats) = send(&app, get("/stats")).await;
        assert_eq!(stats["count"], 1);
    }

    #[tokio::test]
    async fn test_browse_route() {
        let (app, pool) = test_app(vec![], None).await;
        let repo = TextRepository::new(&pool);
        for text in ["alpha", "beta", "Ñandú"] {
            repo.insert(&NewText {
                text: text.into(),
                ..Default::default()
            })
            .await
            .unwrap();
        }

        let (status, body) = send(
            &app,
            post_json(
                "/db/browse",
                json!({"filters": [{"column": "text", "op": "contains", "value": "ALP"}]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rows"].as_array().unwrap().len(), 1);
        assert!(!body["sql"].as_str().unwrap().contains("LIMIT"));

        let (_, body) = send(
            &app,
            post_json(
                "/db/browse",
                json!({"filters": [{"column": "text", "op": "contains", "value": "ñAND"}]}),
            ),
        )
        .await;
        assert_eq!(body["rows"][0][3], "Ñandú");
    }
}
