use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::Rng;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ColumnTrait, Condition, Set};
use std::time::Duration as StdDuration;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    config::AppConfig,
    dto::auth::{
        Claims, ForgotPasswordRequest, LoginRequest, RefreshClaims, RefreshRequest,
        RegisterRequest, ResetPasswordRequest, TokenPair, VerifyEmailRequest,
    },
    entity::users::{
        ActiveModel as UserActive, Column as UserCol, Entity as Users, Model as UserModel,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{User, roles},
    repository::Repository,
    response::ApiResponse,
    services::user_service::{hash_password, user_from_entity, verify_password},
    state::AppState,
};

/// Logout responds only after this fixed delay; the pause is part of the
/// operation's contract, not an implementation accident.
const LOGOUT_DELAY: StdDuration = StdDuration::from_millis(1500);

pub async fn register_user(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<User>> {
    let repo = Repository::<Users>::new(&state.orm);
    let taken = repo
        .exists(Condition::all().add(UserCol::Email.eq(payload.email.clone())))
        .await?;
    if taken {
        return Err(AppError::Conflict("Email is already taken".into()));
    }

    let password_hash = hash_password(&payload.password)?;
    let active = UserActive {
        id: Set(Uuid::new_v4()),
        first_name: Set(payload.first_name),
        last_name: Set(payload.last_name),
        email: Set(payload.email),
        password_hash: Set(password_hash),
        country: Set(payload.country),
        is_email_verified: Set(Some(false)),
        role: Set(roles::FREELANCER.into()),
        created_at: NotSet,
        updated_at: NotSet,
    };
    let user = repo.insert(active).await?;

    state.cache.invalidate_prefixes(&["users", "user"]).await;

    send_one_time_code(state, &user.email, "Verify your email").await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.id),
        "user_register",
        Some("users"),
        Some(serde_json::json!({ "user_id": user.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "User created",
        user_from_entity(user),
        None,
    ))
}

pub async fn login_user(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<TokenPair>> {
    let user = Repository::<Users>::new(&state.orm)
        .find_first(Condition::all().add(UserCol::Email.eq(payload.email.clone())))
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid email or password".into()))?;

    verify_password(&payload.password, &user.password_hash)
        .map_err(|_| AppError::Unauthorized("Invalid email or password".into()))?;

    let pair = issue_token_pair(&state.config, &user)?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.id),
        "user_login",
        Some("users"),
        Some(serde_json::json!({ "user_id": user.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("Logged in", pair, None))
}

pub async fn refresh_tokens(
    state: &AppState,
    payload: RefreshRequest,
) -> AppResult<ApiResponse<TokenPair>> {
    let decoded = decode::<RefreshClaims>(
        &payload.refresh_token,
        &DecodingKey::from_secret(state.config.jwt_refresh_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized("Invalid or expired refresh token".into()))?;

    let user_id = Uuid::parse_str(&decoded.claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid user id in token".into()))?;

    let user = Repository::<Users>::new(&state.orm)
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Unknown user".into()))?;

    let pair = issue_token_pair(&state.config, &user)?;
    Ok(ApiResponse::success("Tokens refreshed", pair, None))
}

pub async fn logout_user(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<serde_json::Value>> {
    tokio::time::sleep(LOGOUT_DELAY).await;

    // The token stays structurally valid until it expires, so it goes on the
    // revocation ledger for its remaining maximum lifetime.
    state.cache.revoke_token(&user.token).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "user_logout",
        Some("users"),
        Some(serde_json::json!({ "user_id": user.user_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("Logged out", serde_json::json!({}), None))
}

pub async fn verify_email(
    state: &AppState,
    payload: VerifyEmailRequest,
) -> AppResult<ApiResponse<User>> {
    check_code(state, &payload.email, &payload.code).await?;

    let repo = Repository::<Users>::new(&state.orm);
    let user = repo
        .find_first_or_throw(Condition::all().add(UserCol::Email.eq(payload.email.clone())))
        .await?;

    let mut active: UserActive = user.into();
    active.is_email_verified = Set(Some(true));
    active.updated_at = Set(Utc::now().into());
    let user = repo.update(active).await?;

    state.cache.delete_code(&payload.email).await?;
    state.cache.invalidate_prefixes(&["users", "user"]).await;

    Ok(ApiResponse::success(
        "Email verified",
        user_from_entity(user),
        None,
    ))
}

pub async fn forgot_password(
    state: &AppState,
    payload: ForgotPasswordRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    Repository::<Users>::new(&state.orm)
        .find_first_or_throw(Condition::all().add(UserCol::Email.eq(payload.email.clone())))
        .await?;

    send_one_time_code(state, &payload.email, "Password reset").await?;

    Ok(ApiResponse::success(
        "Reset code sent",
        serde_json::json!({}),
        None,
    ))
}

pub async fn reset_password(
    state: &AppState,
    payload: ResetPasswordRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    check_code(state, &payload.email, &payload.code).await?;

    let repo = Repository::<Users>::new(&state.orm);
    let user = repo
        .find_first_or_throw(Condition::all().add(UserCol::Email.eq(payload.email.clone())))
        .await?;

    let new_hash = hash_password(&payload.new_password)?;
    let user_id = user.id;
    let mut active: UserActive = user.into();
    active.password_hash = Set(new_hash);
    active.updated_at = Set(Utc::now().into());
    repo.update(active).await?;

    state.cache.delete_code(&payload.email).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user_id),
        "user_password_reset",
        Some("users"),
        Some(serde_json::json!({ "user_id": user_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Password reset",
        serde_json::json!({}),
        None,
    ))
}

async fn check_code(state: &AppState, email: &str, code: &str) -> AppResult<()> {
    let stored = state.cache.get_code(email).await?;
    if stored.as_deref() != Some(code) {
        return Err(AppError::Unauthorized("Invalid or expired code".into()));
    }
    Ok(())
}

/// Store a fresh one-time code, then mail it out. The code write is
/// authoritative; a failed email is logged and the code stays usable.
async fn send_one_time_code(state: &AppState, email: &str, subject: &str) -> AppResult<()> {
    let code = generate_code();
    state.cache.put_code(email, &code).await?;
    let body = format!("Your code is {code}. It expires in 15 minutes.");
    if let Err(err) = state.mailer.send(email, subject, &body).await {
        tracing::warn!(error = %err, email, "one-time code email failed");
    }
    Ok(())
}

fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    format!("{:06}", rng.gen_range(0..1_000_000))
}

fn issue_token_pair(config: &AppConfig, user: &UserModel) -> AppResult<TokenPair> {
    let access_exp = Utc::now()
        .checked_add_signed(Duration::seconds(config.jwt_access_expiry_secs))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;
    let claims = Claims {
        sub: user.id.to_string(),
        role: user.role.clone(),
        exp: access_exp.timestamp() as usize,
    };
    let access_token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_access_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?;

    let refresh_exp = Utc::now()
        .checked_add_signed(Duration::seconds(config.jwt_refresh_expiry_secs))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;
    let refresh_claims = RefreshClaims {
        sub: user.id.to_string(),
        exp: refresh_exp.timestamp() as usize,
    };
    let refresh_token = encode(
        &Header::default(),
        &refresh_claims,
        &EncodingKey::from_secret(config.jwt_refresh_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?;

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
