use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::AppError;
use crate::hub::Role;

/// Caller identity, established by the external auth collaborator and
/// forwarded on every call as `x-account-id` / `x-account-role` headers.
#[derive(Debug, Clone, Copy)]
pub struct Identity {
    pub account: Uuid,
    pub role: Role,
}

impl Identity {
    pub fn require(self, role: Role) -> Result<Self, AppError> {
        if self.role == role {
            Ok(self)
        } else {
            let wanted = match role {
                Role::Requester => "requester",
                Role::Provider => "provider",
            };
            Err(AppError::Conflict(format!("{wanted} account required")))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let account = parts
            .headers
            .get("x-account-id")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value).ok())
            .ok_or_else(|| {
                AppError::Validation("missing or invalid x-account-id header".to_string())
            })?;

        let role = parts
            .headers
            .get("x-account-role")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<Role>().ok())
            .ok_or_else(|| {
                AppError::Validation("missing or invalid x-account-role header".to_string())
            })?;

        Ok(Self { account, role })
    }
}
