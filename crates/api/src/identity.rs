//! Caller identity, as injected by the upstream auth middleware.
//!
//! Authentication happens before requests reach this service; the
//! verified user id and role arrive as `x-user-id` and `x-user-role`.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::UserId;
use domain::{Actor, ActorRole};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Any authenticated caller.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Actor);

impl Caller {
    pub fn user_id(&self) -> UserId {
        self.0.id
    }
}

/// A caller with the admin role.
#[derive(Debug, Clone, Copy)]
pub struct AdminCaller(pub Actor);

fn actor_from_parts(parts: &Parts) -> Result<Actor, ApiError> {
    let id = parts
        .headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| UserId::parse(v.trim()).ok())
        .ok_or(ApiError::Unauthorized)?;

    let role = match parts
        .headers
        .get(USER_ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        Some(role) if role.trim().eq_ignore_ascii_case("admin") => ActorRole::Admin,
        _ => ActorRole::Customer,
    };

    Ok(Actor { id, role })
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        actor_from_parts(parts).map(Caller)
    }
}

impl<S> FromRequestParts<S> for AdminCaller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor = actor_from_parts(parts)?;
        if !actor.is_admin() {
            tracing::warn!(user_id = %actor.id, "non-admin caller on admin route");
            return Err(ApiError::Forbidden);
        }
        Ok(AdminCaller(actor))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_customer_by_default() {
        let id = UserId::new();
        let id_header = id.to_string();
        let actor = actor_from_parts(&parts(&[(USER_ID_HEADER, id_header.as_str())])).unwrap();

        assert_eq!(actor, Actor::customer(id));
    }

    #[test]
    fn test_admin_role() {
        let id_header = UserId::new().to_string();
        let actor = actor_from_parts(&parts(&[
            (USER_ID_HEADER, id_header.as_str()),
            (USER_ROLE_HEADER, "Admin"),
        ]))
        .unwrap();

        assert!(actor.is_admin());
    }

    #[test]
    fn test_missing_or_malformed_id() {
        assert!(matches!(
            actor_from_parts(&parts(&[])),
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(
            actor_from_parts(&parts(&[(USER_ID_HEADER, "not-a-uuid")])),
            Err(ApiError::Unauthorized)
        ));
    }
}
