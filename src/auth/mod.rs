//! Caller identity.
//!
//! Authentication happens in front of this service. The gateway asserts who is calling with
//! `x-actor-id` and `x-actor-role`; handlers take an [`Actor`] and services enforce ownership
//! and role checks against it.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::entities::user::UserRole;
use crate::errors::ServiceError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// The authenticated user a request acts on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: i32,
    pub role: UserRole,
}

impl Actor {
    pub fn new(user_id: i32, role: UserRole) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn require_admin(&self) -> Result<(), ServiceError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "Administrator privileges required.".to_string(),
            ))
        }
    }

    /// Stored in `resolved_by` columns.
    pub fn audit_label(&self) -> String {
        format!("{}:{}", self.role, self.user_id)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(ACTOR_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i32>().ok())
            .filter(|id| *id > 0)
            .ok_or_else(|| ServiceError::Unauthorized("Authentication required.".to_string()))?;

        let role = match parts
            .headers
            .get(ACTOR_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            None => UserRole::Player,
            Some(raw) => UserRole::from_str(raw.trim().to_ascii_lowercase().as_str())
                .map_err(|_| ServiceError::Unauthorized("Unknown actor role.".to_string()))?,
        };

        Ok(Actor { user_id, role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::http::Request;

    async fn extract(headers: &[(&str, &str)]) -> Result<Actor, ServiceError> {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        Actor::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_id_and_role() {
        let actor = extract(&[(ACTOR_ID_HEADER, "7"), (ACTOR_ROLE_HEADER, "Admin")])
            .await
            .unwrap();
        assert_eq!(actor, Actor::new(7, UserRole::Admin));
        assert_eq!(actor.audit_label(), "admin:7");
    }

    #[tokio::test]
    async fn role_defaults_to_player() {
        let actor = extract(&[(ACTOR_ID_HEADER, "3")]).await.unwrap();
        assert_eq!(actor.role, UserRole::Player);
        assert_matches!(actor.require_admin(), Err(ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn missing_or_bad_identity_is_unauthorized() {
        assert_matches!(extract(&[]).await, Err(ServiceError::Unauthorized(_)));
        assert_matches!(
            extract(&[(ACTOR_ID_HEADER, "abc")]).await,
            Err(ServiceError::Unauthorized(_))
        );
        assert_matches!(
            extract(&[(ACTOR_ID_HEADER, "1"), (ACTOR_ROLE_HEADER, "root")]).await,
            Err(ServiceError::Unauthorized(_))
        );
    }
}
