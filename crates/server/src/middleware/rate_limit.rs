use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request, StatusCode, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};
use db::models::member::OrgMember;
use tracing::warn;
use utils::response::ApiResponse;

use crate::{AppState, auth::member_id_from_headers};

const EXEMPT_PATHS: [&str; 1] = ["/api/health"];

/// First `x-forwarded-for` hop, else a shared bucket.
pub fn client_key(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map_or_else(|| "anonymous".to_string(), |ip| format!("ip:{ip}"))
}

/// Bucket for a request: the member when the header names a real member,
/// otherwise the client address. Unverified header values never get their
/// own bucket.
pub async fn rate_limit_key(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(member_id) = member_id_from_headers(headers) {
        match OrgMember::find_by_id(&state.db().pool, member_id).await {
            Ok(Some(member)) => return format!("member:{}", member.id),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to look up member for rate limiting"),
        }
    }
    client_key(headers)
}

pub async fn rate_limit(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    if EXEMPT_PATHS.contains(&req.uri().path()) {
        return next.run(req).await;
    }

    let key = rate_limit_key(&state, req.headers()).await;
    let decision = state.rate_limiter().check(&key).await;
    if !decision.allowed {
        let retry_after = decision
            .retry_after
            .map(|wait| wait.as_secs_f64().ceil() as u64)
            .unwrap_or(1)
            .max(1);
        warn!(key = %key, retry_after, "Rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(RETRY_AFTER, retry_after.to_string())],
            Json(ApiResponse::<()>::error("rate limit exceeded")),
        )
            .into_response();
    }

    let mut resp = next.run(req).await;
    resp.headers_mut()
        .insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    resp
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_client_key_uses_first_forwarded_hop() {
        assert_eq!(
            client_key(&headers(&[("x-forwarded-for", " 203.0.113.7 , 10.0.0.1")])),
            "ip:203.0.113.7"
        );
        assert_eq!(
            client_key(&headers(&[
                ("x-canopy-member", "6f1c"),
                ("x-forwarded-for", "203.0.113.7")
            ])),
            "ip:203.0.113.7"
        );
        assert_eq!(client_key(&headers(&[("x-forwarded-for", " ")])), "anonymous");
        assert_eq!(client_key(&HeaderMap::new()), "anonymous");
    }
}
