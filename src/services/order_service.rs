use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, Set};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    cache,
    dto::orders::{CreateOrderRequest, OrderList, UpdateOrderRequest},
    entity::{
        customers::Entity as Customers,
        orders::{
            ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel,
        },
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_owner, ensure_roles},
    models::{Order, order_category, order_status, roles},
    pagination::Page,
    repository::Repository,
    response::ApiResponse,
    routes::params::{OrderListQuery, OrderSortBy, SortOrder},
    state::AppState,
};

/// Every order write clears the order pages, order details, and the
/// statistics derived from them.
const ORDER_CACHE_PREFIXES: &[&str] = &["orders", "order", "stats"];

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, per_page) = query.pagination.normalize();

    // Non-admin callers only ever see their own orders. The scope is part of
    // the serialized filter, so it lands in the cache key.
    let scope = (user.role != roles::ADMIN).then_some(user.user_id);

    let mut condition = Condition::all();
    if let Some(owner) = scope {
        condition = condition.add(OrderCol::UserId.eq(owner));
    }
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        validate_status(status)?;
        condition = condition.add(OrderCol::Status.eq(status.clone()));
    }
    if let Some(category) = query.category.as_ref().filter(|s| !s.is_empty()) {
        validate_category(category)?;
        condition = condition.add(OrderCol::Category.eq(category.clone()));
    }

    let sort_by = query.sort_by.unwrap_or(OrderSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let filter = serde_json::json!({
        "owner": scope,
        "status": query.status,
        "category": query.category,
    })
    .to_string();
    let key = cache::list_key(
        "orders",
        page,
        per_page,
        sort_by.as_str(),
        sort_order.as_str(),
        &filter,
    );

    if let Some(cached) = state.cache.get_json::<Page<Order>>(&key).await {
        let meta = cached.meta.clone();
        return Ok(ApiResponse::success(
            "Orders",
            OrderList { items: cached.data },
            Some(meta),
        ));
    }

    let sort_col = match sort_by {
        OrderSortBy::CreatedAt => OrderCol::CreatedAt,
        OrderSortBy::Price => OrderCol::Price,
        OrderSortBy::StartDate => OrderCol::StartDate,
    };
    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };

    let result = Repository::<Orders>::new(&state.orm)
        .find_many_paginated(finder, page, per_page)
        .await?;
    let result = Page {
        data: result
            .data
            .into_iter()
            .map(order_from_entity)
            .collect::<Vec<_>>(),
        meta: result.meta,
    };

    state.cache.put_json(&key, &result).await;

    let meta = result.meta.clone();
    Ok(ApiResponse::success(
        "Orders",
        OrderList { items: result.data },
        Some(meta),
    ))
}

pub async fn get_order(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<ApiResponse<Order>> {
    let key = cache::detail_key("order", id);
    if let Some(cached) = state.cache.get_json::<Order>(&key).await {
        ensure_owner(user, cached.user_id, &[roles::ADMIN])?;
        return Ok(ApiResponse::success("Order", cached, None));
    }

    let order = Repository::<Orders>::new(&state.orm)
        .find_by_id_or_throw(id)
        .await?;
    ensure_owner(user, order.user_id, &[roles::ADMIN])?;

    let order = order_from_entity(order);
    state.cache.put_json(&key, &order).await;
    Ok(ApiResponse::success("Order", order, None))
}

pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_roles(user, &roles::ALL)?;
    validate_price(payload.price)?;
    validate_category(&payload.category)?;
    if payload.end_date < payload.start_date {
        return Err(AppError::BadRequest("end_date precedes start_date".into()));
    }
    if let Some(customer_id) = payload.customer_id {
        // The link target must exist before the order is written.
        Repository::<Customers>::new(&state.orm)
            .find_by_id_or_throw(customer_id)
            .await?;
    }

    let active = OrderActive {
        id: Set(Uuid::new_v4()),
        title: Set(payload.title),
        description: Set(payload.description),
        price: Set(payload.price),
        start_date: Set(payload.start_date.into()),
        end_date: Set(payload.end_date.into()),
        category: Set(payload.category),
        status: Set(order_status::NEW.into()),
        user_id: Set(user.user_id),
        customer_id: Set(payload.customer_id),
        created_at: NotSet,
        updated_at: NotSet,
    };
    let order = Repository::<Orders>::new(&state.orm).insert(active).await?;

    state.cache.invalidate_prefixes(ORDER_CACHE_PREFIXES).await;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_create",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order created",
        order_from_entity(order),
        None,
    ))
}

pub async fn update_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderRequest,
) -> AppResult<ApiResponse<Order>> {
    let repo = Repository::<Orders>::new(&state.orm);
    let existing = repo.find_by_id_or_throw(id).await?;
    ensure_owner(user, existing.user_id, &[roles::ADMIN, roles::MANAGER])?;

    if let Some(price) = payload.price {
        validate_price(price)?;
    }
    if let Some(status) = payload.status.as_deref() {
        validate_status(status)?;
    }
    if let Some(category) = payload.category.as_deref() {
        validate_category(category)?;
    }
    let start = payload
        .start_date
        .unwrap_or(existing.start_date.with_timezone(&Utc));
    let end = payload
        .end_date
        .unwrap_or(existing.end_date.with_timezone(&Utc));
    if end < start {
        return Err(AppError::BadRequest("end_date precedes start_date".into()));
    }

    let mut active: OrderActive = existing.into();
    if let Some(title) = payload.title {
        active.title = Set(title);
    }
    if let Some(description) = payload.description {
        active.description = Set(description);
    }
    if let Some(price) = payload.price {
        active.price = Set(price);
    }
    if let Some(start_date) = payload.start_date {
        active.start_date = Set(start_date.into());
    }
    if let Some(end_date) = payload.end_date {
        active.end_date = Set(end_date.into());
    }
    if let Some(category) = payload.category {
        active.category = Set(category);
    }
    if let Some(status) = payload.status {
        active.status = Set(status);
    }
    active.updated_at = Set(Utc::now().into());

    let order = repo.update(active).await?;

    state.cache.invalidate_prefixes(ORDER_CACHE_PREFIXES).await;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_update",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order updated",
        order_from_entity(order),
        None,
    ))
}

pub async fn delete_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let repo = Repository::<Orders>::new(&state.orm);
    let existing = repo.find_by_id_or_throw(id).await?;
    ensure_owner(user, existing.user_id, &[roles::ADMIN, roles::MANAGER])?;

    repo.delete_by_id(id).await?;

    state.cache.invalidate_prefixes(ORDER_CACHE_PREFIXES).await;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_delete",
        Some("orders"),
        Some(serde_json::json!({ "order_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("Deleted", serde_json::json!({}), None))
}

fn validate_price(price: i64) -> Result<(), AppError> {
    if price < 0 {
        return Err(AppError::BadRequest("price must not be negative".into()));
    }
    Ok(())
}

fn validate_status(status: &str) -> Result<(), AppError> {
    if order_status::ALL.contains(&status) {
        Ok(())
    } else {
        Err(AppError::BadRequest("Invalid order status".into()))
    }
}

fn validate_category(category: &str) -> Result<(), AppError> {
    if order_category::ALL.contains(&category) {
        Ok(())
    } else {
        Err(AppError::BadRequest("Invalid order category".into()))
    }
}

pub(crate) fn order_from_entity(model: OrderModel) -> Order {
    Order {
        id: model.id,
        title: model.title,
        description: model.description,
        price: model.price,
        start_date: model.start_date.with_timezone(&Utc),
        end_date: model.end_date.with_timezone(&Utc),
        category: model.category,
        status: model.status,
        user_id: model.user_id,
        customer_id: model.customer_id,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_validation() {
        for status in order_status::ALL {
            assert!(validate_status(status).is_ok());
        }
        assert!(validate_status("SHIPPED").is_err());
        assert!(validate_status("new").is_err());
    }

    #[test]
    fn category_validation() {
        for category in order_category::ALL {
            assert!(validate_category(category).is_ok());
        }
        assert!(validate_category("CATERING").is_err());
    }

    #[test]
    fn price_validation() {
        assert!(validate_price(0).is_ok());
        assert!(validate_price(1000).is_ok());
        assert!(validate_price(-1).is_err());
    }
}
