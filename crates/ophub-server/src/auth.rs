//! Development authentication.
//!
//! The caller names itself with an `X-User-Id` header. When the id resolves to an
//! active user, a [`Principal`] is attached to the request and handlers receive
//! it explicitly; nothing reads the current user from ambient state.

use axum::{
    Extension,
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use ophub_db::entities::users;
use ophub_domain::{Role, UserStatus};
use sea_orm::EntityTrait;

use crate::error::ApiError;
use crate::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    pub email: String,
    pub role: Role,
}

impl Principal {
    /// Only active users with a known role become principals.
    pub fn from_user(user: &users::Model) -> Option<Self> {
        let status = user.status.parse::<UserStatus>().ok()?;
        if status != UserStatus::Active {
            return None;
        }
        Some(Self {
            user_id: user.id,
            email: user.email.clone(),
            role: user.role.parse().ok()?,
        })
    }

    pub fn ensure(&self, allowed: bool, action: &str) -> Result<(), ApiError> {
        if allowed {
            return Ok(());
        }
        tracing::info!(user_id = self.user_id, email = %self.email, role = %self.role, action, "access denied");
        Err(ApiError::Forbidden(format!(
            "role {} is not allowed to {action}",
            self.role
        )))
    }
}

/// Unwraps the principal attached by [`dev_auth`], or fails with 401.
pub fn require(principal: Option<Extension<Principal>>) -> Result<Principal, ApiError> {
    principal
        .map(|Extension(p)| p)
        .ok_or(ApiError::Unauthorized)
}

fn header_user_id(req: &Request<Body>) -> Option<i64> {
    req.headers()
        .get(USER_ID_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

// Middleware: resolve `X-User-Id` into a principal.
//
// A malformed or unknown id leaves the request anonymous; handlers decide
// whether that is acceptable.
pub async fn dev_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(user_id) = header_user_id(&req) {
        match users::Entity::find_by_id(user_id).one(&*state.db).await {
            Ok(Some(user)) => match Principal::from_user(&user) {
                Some(principal) => {
                    tracing::debug!(
                        user_id,
                        email = %principal.email,
                        role = %principal.role,
                        "dev auth resolved principal"
                    );
                    req.extensions_mut().insert(principal);
                }
                None => tracing::debug!(user_id, status = %user.status, "dev auth ignored inactive user"),
            },
            Ok(None) => tracing::debug!(user_id, "dev auth ignored unknown user"),
            Err(err) => return ApiError::Db(err).into_response(),
        }
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[tokio::test]
    async fn disabled_users_are_not_principals() {
        let db = testing::test_db().await;
        let active = testing::insert_user(&db, "a@ops.test", Role::Manager, UserStatus::Active).await;
        let disabled =
            testing::insert_user(&db, "d@ops.test", Role::Admin, UserStatus::Disabled).await;

        let principal = Principal::from_user(&active).unwrap();
        assert_eq!(principal.user_id, active.id);
        assert_eq!(principal.email, "a@ops.test");
        assert_eq!(principal.role, Role::Manager);
        assert!(Principal::from_user(&disabled).is_none());
    }

    #[test]
    fn require_maps_missing_principal_to_unauthorized() {
        assert!(matches!(require(None), Err(ApiError::Unauthorized)));
    }

    #[test]
    fn ensure_reports_the_role() {
        let principal = Principal {
            user_id: 7,
            email: "u@ops.test".into(),
            role: Role::User,
        };
        let err = principal.ensure(false, "read the audit log").unwrap_err();
        assert_eq!(err.to_string(), "role USER is not allowed to read the audit log");
        assert!(principal.ensure(true, "list tasks").is_ok());
    }
}
