//! Identifies the calling organization member.
//!
//! Authentication happens upstream; the proxy forwards the member id in
//! [`MEMBER_HEADER`]. Handlers take [`CurrentMember`] to get a loaded scope.

use axum::{extract::FromRequestParts, http::request::Parts};
use db::access_control::MemberScope;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

pub const MEMBER_HEADER: &str = "x-canopy-member";

#[derive(Debug, Clone)]
pub struct CurrentMember(pub MemberScope);

/// Member id carried by the request, if present and well formed.
pub fn member_id_from_headers(headers: &axum::http::HeaderMap) -> Option<Uuid> {
    let raw = headers.get(MEMBER_HEADER)?.to_str().ok()?;
    Uuid::parse_str(raw.trim()).ok()
}

impl FromRequestParts<AppState> for CurrentMember {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let member_id = member_id_from_headers(&parts.headers).ok_or(ApiError::Unauthorized)?;
        let scope = MemberScope::load(&state.db().pool, member_id)
            .await?
            .ok_or(ApiError::Unauthorized)?;
        Ok(Self(scope))
    }
}
