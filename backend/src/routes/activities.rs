use crate::{
    error::AppError,
    extractors::CurrentUser,
    feed::{self, FeedActivity},
    params::PaginationParams,
};
use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
};
use serde::Serialize;
use sqlx::PgPool;

#[derive(Serialize)]
pub struct ActivityListResponse {
    activities: Vec<FeedActivity>,
    count: usize,
}

pub async fn get_activities(
    State(pool): State<PgPool>,
    viewer: CurrentUser,
    params: Result<Query<PaginationParams>, QueryRejection>,
) -> Result<Json<ActivityListResponse>, AppError> {
    let Query(params) = params?;

    let activities = feed::load(&pool, viewer.id, viewer.role(), &params).await?;

    Ok(Json(ActivityListResponse {
        count: activities.len(),
        activities,
    }))
}
