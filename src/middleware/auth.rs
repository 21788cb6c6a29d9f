use axum::{
    extract::{FromRef, FromRequestParts},
    http::header,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use uuid::Uuid;

use crate::{dto::auth::Claims, error::AppError, models::roles, state::AppState};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: String,
    /// Raw bearer token, kept so logout can write it to the revocation ledger.
    pub token: String,
}

pub fn ensure_admin(user: &AuthUser) -> Result<(), AppError> {
    ensure_roles(user, &[roles::ADMIN])
}

pub fn ensure_roles(user: &AuthUser, allowed: &[&str]) -> Result<(), AppError> {
    if allowed.contains(&user.role.as_str()) {
        return Ok(());
    }
    Err(AppError::Forbidden)
}

/// Ownership gate. The caller must own the resource unless their role is in
/// the privileged list. Callers confirm existence before invoking this, so
/// NotFound and Forbidden stay distinguishable.
pub fn ensure_owner(user: &AuthUser, owner_id: Uuid, privileged: &[&str]) -> Result<(), AppError> {
    if user.user_id == owner_id || privileged.contains(&user.role.as_str()) {
        return Ok(());
    }
    Err(AppError::Forbidden)
}

/// Self gate: user resources may only be touched by their subject or an admin.
pub fn ensure_self(user: &AuthUser, target_id: Uuid) -> Result<(), AppError> {
    ensure_owner(user, target_id, &[roles::ADMIN])
}

impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;
    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);

        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;

        let auth_str = auth_header
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid Authorization header".into()))?;

        if !auth_str.starts_with("Bearer ") {
            return Err(AppError::Unauthorized("Invalid Authorization scheme".into()));
        }
        let token = auth_str.trim_start_matches("Bearer ").trim();

        let decoded = decode::<Claims>(
            token,
            &DecodingKey::from_secret(state.config.jwt_access_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;

        // A token that still validates may have been revoked at logout.
        if state.cache.is_token_revoked(token).await? {
            return Err(AppError::Unauthorized("Token revoked".into()));
        }

        let user_id = Uuid::parse_str(&decoded.claims.sub)
            .map_err(|_| AppError::Unauthorized("Invalid user id in token".into()))?;

        Ok(AuthUser {
            user_id,
            role: decoded.claims.role.clone(),
            token: token.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: &str) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            role: role.into(),
            token: "token".into(),
        }
    }

    #[test]
    fn admin_gate_rejects_other_roles() {
        assert!(ensure_admin(&user(roles::ADMIN)).is_ok());
        assert!(ensure_admin(&user(roles::MANAGER)).is_err());
        assert!(ensure_admin(&user(roles::FREELANCER)).is_err());
    }

    #[test]
    fn role_gate_matches_allow_list() {
        let manager = user(roles::MANAGER);
        assert!(ensure_roles(&manager, &roles::ALL).is_ok());
        assert!(ensure_roles(&manager, &[roles::ADMIN, roles::MANAGER]).is_ok());
        assert!(ensure_roles(&manager, &[roles::ADMIN]).is_err());
    }

    #[test]
    fn owner_gate_allows_owner_and_privileged() {
        let freelancer = user(roles::FREELANCER);
        assert!(ensure_owner(&freelancer, freelancer.user_id, &[roles::ADMIN]).is_ok());
        assert!(ensure_owner(&freelancer, Uuid::new_v4(), &[roles::ADMIN]).is_err());

        let admin = user(roles::ADMIN);
        assert!(ensure_owner(&admin, Uuid::new_v4(), &[roles::ADMIN]).is_ok());

        let manager = user(roles::MANAGER);
        assert!(ensure_owner(&manager, Uuid::new_v4(), &[roles::ADMIN]).is_err());
        assert!(ensure_owner(&manager, Uuid::new_v4(), &[roles::ADMIN, roles::MANAGER]).is_ok());
    }

    #[test]
    fn self_gate_allows_subject_and_admin_only() {
        let freelancer = user(roles::FREELANCER);
        assert!(ensure_self(&freelancer, freelancer.user_id).is_ok());
        assert!(ensure_self(&freelancer, Uuid::new_v4()).is_err());
        assert!(ensure_self(&user(roles::MANAGER), Uuid::new_v4()).is_err());
        assert!(ensure_self(&user(roles::ADMIN), Uuid::new_v4()).is_ok());
    }
}
