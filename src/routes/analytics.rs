//! Analytics chart routes

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::{ActivityPoint, AnalyticsRepository, FilenameCount, Interval, LengthHistogram, ProjectCount};
use crate::error::Result;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/analytics/project_counts", get(project_counts))
        .route("/analytics/activity", get(activity))
        .route("/analytics/length_histogram", get(length_histogram))
        .route("/analytics/top_filenames", get(top_filenames))
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub project_id: Option<i64>,
    pub interval: Option<String>,
    #[serde(default = "default_points")]
    pub points: i64,
}

#[derive(Debug, Deserialize)]
pub struct HistogramQuery {
    pub project_id: Option<i64>,
    #[serde(default = "default_bins")]
    pub bins: i64,
}

#[derive(Debug, Deserialize)]
pub struct TopFilenamesQuery {
    pub project_id: Option<i64>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_points() -> i64 {
    30
}

fn default_bins() -> i64 {
    10
}

fn default_limit() -> i64 {
    10
}

#[derive(Debug, Serialize)]
pub struct ProjectCounts {
    pub projects: Vec<ProjectCount>,
}

#[derive(Debug, Serialize)]
pub struct ActivitySeries {
    pub series: Vec<ActivityPoint>,
    pub interval: Interval,
}

#[derive(Debug, Serialize)]
pub struct TopFilenames {
    pub top: Vec<FilenameCount>,
}

async fn project_counts(State(state): State<AppState>) -> Result<Json<ProjectCounts>> {
    let projects = AnalyticsRepository::new(&state.db).project_counts().await?;
    Ok(Json(ProjectCounts { projects }))
}

async fn activity(
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<ActivitySeries>> {
    let interval = Interval::parse(query.interval.as_deref());
    let series = AnalyticsRepository::new(&state.db)
        .activity(query.project_id, interval, query.points)
        .await?;
    Ok(Json(ActivitySeries { series, interval }))
}

async fn length_histogram(
    State(state): State<AppState>,
    Query(query): Query<HistogramQuery>,
) -> Result<Json<LengthHistogram>> {
    let histogram = AnalyticsRepository::new(&state.db)
        .length_histogram(query.project_id, query.bins)
        .await?;
    Ok(Json(histogram))
}

async fn top_filenames(
    State(state): State<AppState>,
    Query(query): Query<TopFilenamesQuery>,
) -> Result<Json<TopFilenames>> {
    let top = AnalyticsRepository::new(&state.db)
        .top_filenames(query.project_id, query.limit)
        .await?;
    Ok(Json(TopFilenames { top }))
}
