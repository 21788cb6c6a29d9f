use sea_orm::sea_query::{Alias, Expr};
use sea_orm::{ColumnTrait, EntityTrait, FromQueryResult, QueryFilter, QuerySelect};
use uuid::Uuid;

use crate::{
    cache,
    dto::stats::{CategoryCount, IncomeStats, StatusCount},
    entity::{
        orders::{Column as OrderCol, Entity as Orders},
        users::Entity as Users,
    },
    error::AppResult,
    middleware::auth::{AuthUser, ensure_self},
    models::order_status,
    repository::Repository,
    response::ApiResponse,
    state::AppState,
};

pub async fn orders_by_status(
    state: &AppState,
    user: &AuthUser,
    target: Uuid,
) -> AppResult<ApiResponse<Vec<StatusCount>>> {
    Repository::<Users>::new(&state.orm)
        .find_by_id_or_throw(target)
        .await?;
    ensure_self(user, target)?;

    let key = cache::stats_key(target, "orders-by-status");
    if let Some(cached) = state.cache.get_json::<Vec<StatusCount>>(&key).await {
        return Ok(ApiResponse::success("Stats", cached, None));
    }

    #[derive(FromQueryResult)]
    struct Row {
        status: String,
        count: i64,
    }

    let rows = Orders::find()
        .select_only()
        .column(OrderCol::Status)
        .column_as(Expr::col(OrderCol::Id).count(), "count")
        .filter(OrderCol::UserId.eq(target))
        .group_by(OrderCol::Status)
        .into_model::<Row>()
        .all(&state.orm)
        .await?;

    let stats: Vec<StatusCount> = rows
        .into_iter()
        .map(|row| StatusCount {
            status: row.status,
            count: row.count,
        })
        .collect();

    state.cache.put_json(&key, &stats).await;
    Ok(ApiResponse::success("Stats", stats, None))
}

pub async fn orders_by_category(
    state: &AppState,
    user: &AuthUser,
    target: Uuid,
) -> AppResult<ApiResponse<Vec<CategoryCount>>> {
    Repository::<Users>::new(&state.orm)
        .find_by_id_or_throw(target)
        .await?;
    ensure_self(user, target)?;

    let key = cache::stats_key(target, "orders-by-category");
    if let Some(cached) = state.cache.get_json::<Vec<CategoryCount>>(&key).await {
        return Ok(ApiResponse::success("Stats", cached, None));
    }

    #[derive(FromQueryResult)]
    struct Row {
        category: String,
        count: i64,
    }

    let rows = Orders::find()
        .select_only()
        .column(OrderCol::Category)
        .column_as(Expr::col(OrderCol::Id).count(), "count")
        .filter(OrderCol::UserId.eq(target))
        .group_by(OrderCol::Category)
        .into_model::<Row>()
        .all(&state.orm)
        .await?;

    let stats: Vec<CategoryCount> = rows
        .into_iter()
        .map(|row| CategoryCount {
            category: row.category,
            count: row.count,
        })
        .collect();

    state.cache.put_json(&key, &stats).await;
    Ok(ApiResponse::success("Stats", stats, None))
}

pub async fn income(
    state: &AppState,
    user: &AuthUser,
    target: Uuid,
) -> AppResult<ApiResponse<IncomeStats>> {
    Repository::<Users>::new(&state.orm)
        .find_by_id_or_throw(target)
        .await?;
    ensure_self(user, target)?;

    let key = cache::stats_key(target, "income");
    if let Some(cached) = state.cache.get_json::<IncomeStats>(&key).await {
        return Ok(ApiResponse::success("Stats", cached, None));
    }

    #[derive(FromQueryResult)]
    struct Row {
        total: Option<i64>,
    }

    // SUM(bigint) comes back as numeric, so it is cast down before decoding.
    let row = Orders::find()
        .select_only()
        .column_as(
            Expr::col(OrderCol::Price).sum().cast_as(Alias::new("BIGINT")),
            "total",
        )
        .filter(OrderCol::UserId.eq(target))
        .filter(OrderCol::Status.eq(order_status::DONE))
        .into_model::<Row>()
        .one(&state.orm)
        .await?;

    let stats = IncomeStats {
        total: row.and_then(|row| row.total).unwrap_or(0),
    };

    state.cache.put_json(&key, &stats).await;
    Ok(ApiResponse::success("Stats", stats, None))
}
