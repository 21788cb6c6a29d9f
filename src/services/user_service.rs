use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::Utc;
use password_hash::rand_core::OsRng;
use sea_orm::{ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, Set};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    cache,
    dto::users::{ChangePasswordRequest, UpdateUserRequest, UserList},
    entity::users::{
        ActiveModel as UserActive, Column as UserCol, Entity as Users, Model as UserModel,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin, ensure_self},
    models::{User, roles},
    pagination::Page,
    repository::Repository,
    response::ApiResponse,
    routes::params::{SortOrder, UserListQuery},
    state::AppState,
};

const USER_CACHE_PREFIXES: &[&str] = &["users", "user"];
/// Deleting a user cascades into their orders, so those caches go too.
const DELETE_CACHE_PREFIXES: &[&str] = &["users", "user", "orders", "order", "stats"];

pub async fn list_users(
    state: &AppState,
    user: &AuthUser,
    query: UserListQuery,
) -> AppResult<ApiResponse<UserList>> {
    ensure_admin(user)?;
    let (page, per_page) = query.pagination.normalize();
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut condition = Condition::all();
    if let Some(role) = query.role.as_ref().filter(|r| !r.is_empty()) {
        validate_role(role)?;
        condition = condition.add(UserCol::Role.eq(role.clone()));
    }

    let filter = serde_json::json!({ "role": query.role }).to_string();
    let key = cache::list_key(
        "users",
        page,
        per_page,
        "created_at",
        sort_order.as_str(),
        &filter,
    );

    if let Some(cached) = state.cache.get_json::<Page<User>>(&key).await {
        let meta = cached.meta.clone();
        return Ok(ApiResponse::success(
            "Users",
            UserList { items: cached.data },
            Some(meta),
        ));
    }

    let mut finder = Users::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(UserCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(UserCol::CreatedAt),
    };

    let result = Repository::<Users>::new(&state.orm)
        .find_many_paginated(finder, page, per_page)
        .await?;
    let result = Page {
        data: result
            .data
            .into_iter()
            .map(user_from_entity)
            .collect::<Vec<_>>(),
        meta: result.meta,
    };
    state.cache.put_json(&key, &result).await;

    let meta = result.meta.clone();
    Ok(ApiResponse::success(
        "Users",
        UserList { items: result.data },
        Some(meta),
    ))
}

pub async fn get_user(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<ApiResponse<User>> {
    let key = cache::detail_key("user", id);
    if let Some(cached) = state.cache.get_json::<User>(&key).await {
        ensure_self(user, cached.id)?;
        return Ok(ApiResponse::success("User", cached, None));
    }

    let target = Repository::<Users>::new(&state.orm)
        .find_by_id_or_throw(id)
        .await?;
    ensure_self(user, target.id)?;

    let target = user_from_entity(target);
    state.cache.put_json(&key, &target).await;
    Ok(ApiResponse::success("User", target, None))
}

pub async fn update_user(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateUserRequest,
) -> AppResult<ApiResponse<User>> {
    let repo = Repository::<Users>::new(&state.orm);
    let existing = repo.find_by_id_or_throw(id).await?;
    ensure_self(user, existing.id)?;

    if let Some(email) = payload.email.as_ref().filter(|e| **e != existing.email) {
        let taken = repo
            .exists(Condition::all().add(UserCol::Email.eq(email.clone())))
            .await?;
        if taken {
            return Err(AppError::Conflict("Email is already taken".into()));
        }
    }

    let mut active: UserActive = existing.into();
    if let Some(first_name) = payload.first_name {
        active.first_name = Set(first_name);
    }
    if let Some(last_name) = payload.last_name {
        active.last_name = Set(last_name);
    }
    if let Some(email) = payload.email {
        // A changed address has to be proven again.
        active.email = Set(email);
        active.is_email_verified = Set(Some(false));
    }
    if let Some(country) = payload.country {
        active.country = Set(Some(country));
    }
    active.updated_at = Set(Utc::now().into());

    let updated = repo.update(active).await?;

    state.cache.invalidate_prefixes(USER_CACHE_PREFIXES).await;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "user_update",
        Some("users"),
        Some(serde_json::json!({ "target_user_id": updated.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "User updated",
        user_from_entity(updated),
        None,
    ))
}

pub async fn change_password(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: ChangePasswordRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let repo = Repository::<Users>::new(&state.orm);
    let existing = repo.find_by_id_or_throw(id).await?;
    ensure_self(user, existing.id)?;

    verify_password(&payload.old_password, &existing.password_hash)?;
    let new_hash = hash_password(&payload.new_password)?;

    let mut active: UserActive = existing.into();
    active.password_hash = Set(new_hash);
    active.updated_at = Set(Utc::now().into());
    repo.update(active).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "user_password_change",
        Some("users"),
        Some(serde_json::json!({ "target_user_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Password changed",
        serde_json::json!({}),
        None,
    ))
}

pub async fn delete_user(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;

    let rows = Repository::<Users>::new(&state.orm).delete_by_id(id).await?;
    if rows == 0 {
        return Err(AppError::NotFound);
    }

    state.cache.invalidate_prefixes(DELETE_CACHE_PREFIXES).await;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "user_delete",
        Some("users"),
        Some(serde_json::json!({ "target_user_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("Deleted", serde_json::json!({}), None))
}

fn validate_role(role: &str) -> Result<(), AppError> {
    if roles::ALL.contains(&role) {
        Ok(())
    } else {
        Err(AppError::BadRequest("Invalid role".into()))
    }
}

pub(crate) fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?
        .to_string();
    Ok(hash)
}

pub(crate) fn verify_password(password: &str, password_hash: &str) -> AppResult<()> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AppError::Unauthorized("Invalid credentials".into()))
}

pub(crate) fn user_from_entity(model: UserModel) -> User {
    User {
        id: model.id,
        first_name: model.first_name,
        last_name: model.last_name,
        email: model.email,
        country: model.country,
        is_email_verified: model.is_email_verified,
        role: model.role,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_validation() {
        for role in roles::ALL {
            assert!(validate_role(role).is_ok());
        }
        assert!(validate_role("SUPERUSER").is_err());
        assert!(validate_role("admin").is_err());
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &hash).is_ok());
        assert!(verify_password("hunter3", &hash).is_err());
    }
}
