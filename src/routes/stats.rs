use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::stats::{CategoryCount, IncomeStats, StatusCount},
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::stats_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/{id}/orders-by-status", get(orders_by_status))
        .route("/users/{id}/orders-by-category", get(orders_by_category))
        .route("/users/{id}/income", get(income))
}

#[utoipa::path(
    get,
    path = "/api/stats/users/{id}/orders-by-status",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Order counts per status", body = ApiResponse<Vec<StatusCount>>),
        (status = 403, description = "Not the subject"),
    ),
    tag = "Stats"
)]
pub async fn orders_by_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Vec<StatusCount>>>> {
    let resp = stats_service::orders_by_status(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/stats/users/{id}/orders-by-category",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Order counts per category", body = ApiResponse<Vec<CategoryCount>>),
        (status = 403, description = "Not the subject"),
    ),
    tag = "Stats"
)]
pub async fn orders_by_category(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Vec<CategoryCount>>>> {
    let resp = stats_service::orders_by_category(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/stats/users/{id}/income",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Total income from DONE orders", body = ApiResponse<IncomeStats>),
        (status = 403, description = "Not the subject"),
    ),
    tag = "Stats"
)]
pub async fn income(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<IncomeStats>>> {
    let resp = stats_service::income(&state, &user, id).await?;
    Ok(Json(resp))
}
