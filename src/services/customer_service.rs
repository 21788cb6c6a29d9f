use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ColumnTrait, Condition, EntityTrait, JoinType, QueryFilter, QueryOrder, QuerySelect,
    RelationTrait, Set,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    cache,
    dto::{
        customers::{
            AttachOrdersRequest, CreateCustomerRequest, CustomerList, UpdateCustomerRequest,
        },
        orders::OrderList,
    },
    entity::{
        customers::{
            self, ActiveModel as CustomerActive, Column as CustomerCol, Entity as Customers,
            Model as CustomerModel,
        },
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_owner, ensure_roles},
    models::{Customer, Order, roles},
    pagination::{self, Page},
    repository::Repository,
    response::ApiResponse,
    routes::params::{CustomerListQuery, CustomerSortBy, Pagination, SortOrder},
    services::order_service::order_from_entity,
    state::AppState,
};

const CUSTOMER_CACHE_PREFIXES: &[&str] = &["customers", "customer"];
/// Attach/detach also rewrites order rows, so their caches go too.
const LINK_CACHE_PREFIXES: &[&str] = &["customers", "customer", "orders", "order", "stats"];

pub async fn list_customers(
    state: &AppState,
    user: &AuthUser,
    query: CustomerListQuery,
) -> AppResult<ApiResponse<CustomerList>> {
    ensure_roles(user, &roles::ALL)?;
    let (page, per_page) = query.pagination.normalize();

    let scope = (user.role != roles::ADMIN).then_some(user.user_id);
    let sort_by = query.sort_by.unwrap_or(CustomerSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let filter = serde_json::json!({ "owner": scope }).to_string();
    let key = cache::list_key(
        "customers",
        page,
        per_page,
        sort_by.as_str(),
        sort_order.as_str(),
        &filter,
    );

    if let Some(cached) = state.cache.get_json::<Page<Customer>>(&key).await {
        let meta = cached.meta.clone();
        return Ok(ApiResponse::success(
            "Customers",
            CustomerList { items: cached.data },
            Some(meta),
        ));
    }

    let sort_col = match sort_by {
        CustomerSortBy::CreatedAt => CustomerCol::CreatedAt,
        CustomerSortBy::FullName => CustomerCol::FullName,
    };

    let result = match scope {
        Some(owner) => {
            // Customers with at least one of the caller's orders. The join
            // fans out one row per matching order, hence the distinct
            // projection and the load-then-slice pagination path.
            let mut finder = Customers::find()
                .join(JoinType::InnerJoin, customers::Relation::Orders.def())
                .filter(OrderCol::UserId.eq(owner))
                .distinct();
            finder = match sort_order {
                SortOrder::Asc => finder.order_by_asc(sort_col),
                SortOrder::Desc => finder.order_by_desc(sort_col),
            };
            pagination::paginate_distinct(&state.orm, finder, page, per_page).await?
        }
        None => {
            let mut finder = Customers::find();
            finder = match sort_order {
                SortOrder::Asc => finder.order_by_asc(sort_col),
                SortOrder::Desc => finder.order_by_desc(sort_col),
            };
            Repository::<Customers>::new(&state.orm)
                .find_many_paginated(finder, page, per_page)
                .await?
        }
    };

    let result = Page {
        data: result
            .data
            .into_iter()
            .map(customer_from_entity)
            .collect::<Vec<_>>(),
        meta: result.meta,
    };
    state.cache.put_json(&key, &result).await;

    let meta = result.meta.clone();
    Ok(ApiResponse::success(
        "Customers",
        CustomerList { items: result.data },
        Some(meta),
    ))
}

pub async fn get_customer(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Customer>> {
    let key = cache::detail_key("customer", id);
    if let Some(cached) = state.cache.get_json::<Customer>(&key).await {
        ensure_customer_access(state, user, id).await?;
        return Ok(ApiResponse::success("Customer", cached, None));
    }

    let customer = Repository::<Customers>::new(&state.orm)
        .find_by_id_or_throw(id)
        .await?;
    ensure_customer_access(state, user, id).await?;

    let customer = customer_from_entity(customer);
    state.cache.put_json(&key, &customer).await;
    Ok(ApiResponse::success("Customer", customer, None))
}

pub async fn create_customer(
    state: &AppState,
    user: &AuthUser,
    payload: CreateCustomerRequest,
) -> AppResult<ApiResponse<Customer>> {
    ensure_roles(user, &roles::ALL)?;

    let active = CustomerActive {
        id: Set(Uuid::new_v4()),
        full_name: Set(payload.full_name),
        email: Set(payload.email),
        telegram: Set(payload.telegram),
        company: Set(payload.company),
        created_at: NotSet,
        updated_at: NotSet,
    };
    let customer = Repository::<Customers>::new(&state.orm)
        .insert(active)
        .await?;

    state.cache.invalidate_prefixes(CUSTOMER_CACHE_PREFIXES).await;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "customer_create",
        Some("customers"),
        Some(serde_json::json!({ "customer_id": customer.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Customer created",
        customer_from_entity(customer),
        None,
    ))
}

pub async fn update_customer(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateCustomerRequest,
) -> AppResult<ApiResponse<Customer>> {
    let repo = Repository::<Customers>::new(&state.orm);
    let existing = repo.find_by_id_or_throw(id).await?;
    ensure_customer_access(state, user, id).await?;

    let mut active: CustomerActive = existing.into();
    if let Some(full_name) = payload.full_name {
        active.full_name = Set(full_name);
    }
    if let Some(email) = payload.email {
        active.email = Set(Some(email));
    }
    if let Some(telegram) = payload.telegram {
        active.telegram = Set(Some(telegram));
    }
    if let Some(company) = payload.company {
        active.company = Set(Some(company));
    }
    active.updated_at = Set(Utc::now().into());

    let customer = repo.update(active).await?;

    state.cache.invalidate_prefixes(CUSTOMER_CACHE_PREFIXES).await;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "customer_update",
        Some("customers"),
        Some(serde_json::json!({ "customer_id": customer.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Customer updated",
        customer_from_entity(customer),
        None,
    ))
}

pub async fn delete_customer(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let repo = Repository::<Customers>::new(&state.orm);
    repo.find_by_id_or_throw(id).await?;
    ensure_customer_access(state, user, id).await?;

    // Linked orders fall back to "no customer" via the FK's ON DELETE SET
    // NULL, so the order caches are stale after this too.
    repo.delete_by_id(id).await?;

    state.cache.invalidate_prefixes(LINK_CACHE_PREFIXES).await;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "customer_delete",
        Some("customers"),
        Some(serde_json::json!({ "customer_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("Deleted", serde_json::json!({}), None))
}

/// Attach orders to a customer. Additive only: an order already carrying a
/// customer link is rejected, even when the link points at this customer.
pub async fn attach_orders(
    state: &AppState,
    user: &AuthUser,
    customer_id: Uuid,
    payload: AttachOrdersRequest,
) -> AppResult<ApiResponse<Customer>> {
    ensure_roles(user, &roles::ALL)?;
    if payload.order_ids.is_empty() {
        return Err(AppError::BadRequest("order_ids must not be empty".into()));
    }

    let customer = Repository::<Customers>::new(&state.orm)
        .find_by_id_or_throw(customer_id)
        .await?;

    // Validate the whole batch before the first write.
    let order_repo = Repository::<Orders>::new(&state.orm);
    let mut to_link = Vec::with_capacity(payload.order_ids.len());
    for order_id in &payload.order_ids {
        let order = order_repo.find_by_id_or_throw(*order_id).await?;
        ensure_owner(user, order.user_id, &[roles::ADMIN])?;
        if order.customer_id.is_some() {
            return Err(AppError::Conflict(format!(
                "Order {} is already assigned to a customer",
                order.id
            )));
        }
        to_link.push(order);
    }

    for order in to_link {
        let mut active: OrderActive = order.into();
        active.customer_id = Set(Some(customer.id));
        active.updated_at = Set(Utc::now().into());
        order_repo.update(active).await?;
    }

    state.cache.invalidate_prefixes(LINK_CACHE_PREFIXES).await;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "customer_attach_orders",
        Some("customers"),
        Some(serde_json::json!({
            "customer_id": customer.id,
            "order_ids": payload.order_ids,
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Orders attached",
        customer_from_entity(customer),
        None,
    ))
}

/// Undo one link so the order can be attached elsewhere.
pub async fn detach_order(
    state: &AppState,
    user: &AuthUser,
    customer_id: Uuid,
    order_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    Repository::<Customers>::new(&state.orm)
        .find_by_id_or_throw(customer_id)
        .await?;

    let order_repo = Repository::<Orders>::new(&state.orm);
    let order = order_repo.find_by_id_or_throw(order_id).await?;
    ensure_owner(user, order.user_id, &[roles::ADMIN])?;
    if order.customer_id != Some(customer_id) {
        return Err(AppError::BadRequest(
            "Order is not linked to this customer".into(),
        ));
    }

    let mut active: OrderActive = order.into();
    active.customer_id = Set(None);
    active.updated_at = Set(Utc::now().into());
    order_repo.update(active).await?;

    state.cache.invalidate_prefixes(LINK_CACHE_PREFIXES).await;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "customer_detach_order",
        Some("customers"),
        Some(serde_json::json!({
            "customer_id": customer_id,
            "order_id": order_id,
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order detached",
        serde_json::json!({}),
        None,
    ))
}

pub async fn list_customer_orders(
    state: &AppState,
    user: &AuthUser,
    customer_id: Uuid,
    pagination: Pagination,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, per_page) = pagination.normalize();

    Repository::<Customers>::new(&state.orm)
        .find_by_id_or_throw(customer_id)
        .await?;
    ensure_customer_access(state, user, customer_id).await?;

    let scope = (user.role != roles::ADMIN).then_some(user.user_id);
    let filter = serde_json::json!({ "customer": customer_id, "owner": scope }).to_string();
    let key = cache::list_key("orders", page, per_page, "created_at", "desc", &filter);

    if let Some(cached) = state.cache.get_json::<Page<Order>>(&key).await {
        let meta = cached.meta.clone();
        return Ok(ApiResponse::success(
            "Orders",
            OrderList { items: cached.data },
            Some(meta),
        ));
    }

    let mut condition = Condition::all().add(OrderCol::CustomerId.eq(customer_id));
    if let Some(owner) = scope {
        condition = condition.add(OrderCol::UserId.eq(owner));
    }
    let finder = Orders::find()
        .filter(condition)
        .order_by_desc(OrderCol::CreatedAt);

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

/// A non-admin caller may only touch a customer they share an order with.
async fn ensure_customer_access(
    state: &AppState,
    user: &AuthUser,
    customer_id: Uuid,
) -> AppResult<()> {
    if user.role == roles::ADMIN {
        return Ok(());
    }
    let owns = Repository::<Orders>::new(&state.orm)
        .exists(
            Condition::all()
                .add(OrderCol::CustomerId.eq(customer_id))
                .add(OrderCol::UserId.eq(user.user_id)),
        )
        .await?;
    if owns { Ok(()) } else { Err(AppError::Forbidden) }
}

fn customer_from_entity(model: CustomerModel) -> Customer {
    Customer {
        id: model.id,
        full_name: model.full_name,
        email: model.email,
        telegram: model.telegram,
        company: model.company,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}
