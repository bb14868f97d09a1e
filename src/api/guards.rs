use async_trait::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::{header, request::Parts, HeaderMap};
use sha2::{Digest, Sha256};

use crate::api::errors::ApiError;
use crate::core::{state::AppState, time::primitive_now_utc};
use crate::db::models::User;
use crate::services::error::ReviewError;
use crate::services::identity::{self, IdentityInput};

pub(crate) const USER_ID_HEADER: &str = "x-user-id";
pub(crate) const USER_ALIAS_HEADER: &str = "x-user-alias";
pub(crate) const USER_NICKNAME_HEADER: &str = "x-user-nickname";

/// The front-end presenting the shared service token.
pub(crate) struct ServiceCaller;

/// The end user the front-end acts for, resolved from the identity headers.
pub(crate) struct CurrentUser(pub(crate) User);

fn digest(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

fn bearer_matches(expected: &str, presented: &str) -> bool {
    digest(expected) == digest(presented)
}

async fn app_state(parts: &mut Parts, state: &AppState) -> Result<AppState, ApiError> {
    let State(app_state) = State::<AppState>::from_request_parts(parts, state)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to access application state"))?;
    Ok(app_state)
}

#[async_trait]
impl FromRequestParts<AppState> for ServiceCaller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let app_state = app_state(parts, state).await?;
        let expected = app_state.settings().security().service_token.as_str();
        if expected.is_empty() {
            return Ok(ServiceCaller);
        }

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized("Invalid service token"))?;

        if !bearer_matches(expected, token.trim()) {
            return Err(ApiError::Unauthorized("Invalid service token"));
        }
        Ok(ServiceCaller)
    }
}

fn header_text(headers: &HeaderMap, name: &str) -> Result<Option<String>, ApiError> {
    let Some(value) = headers.get(name) else {
        return Ok(None);
    };
    let text = value
        .to_str()
        .map_err(|_| ApiError::BadRequest(format!("Header {name} is not valid text")))?
        .trim();
    Ok((!text.is_empty()).then(|| text.to_string()))
}

pub(crate) fn identity_from_headers(headers: &HeaderMap) -> Result<IdentityInput, ApiError> {
    let tg_id = header_text(headers, USER_ID_HEADER)?
        .map(|raw| {
            raw.parse::<i64>().map_err(|_| {
                ApiError::from(ReviewError::InvalidIdentity(format!("non-numeric id {raw}")))
            })
        })
        .transpose()?;

    Ok(IdentityInput {
        tg_id,
        alias: header_text(headers, USER_ALIAS_HEADER)?,
        nickname: header_text(headers, USER_NICKNAME_HEADER)?,
    })
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        ServiceCaller::from_request_parts(parts, state).await?;
        let app_state = app_state(parts, state).await?;

        let input = identity_from_headers(&parts.headers)?;
        let user =
            identity::resolve_user(app_state.store(), &input, primitive_now_utc()).await?;
        Ok(CurrentUser(user))
    }
}
