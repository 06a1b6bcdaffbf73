/// Request extractors: the anonymous caller and the admin bearer
use crate::{
    api::middleware::{client_ip, extract_bearer_token, SESSION_COOKIE},
    context::AppContext,
    error::ApiError,
    identity::ClientIdentity,
};
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::cookie::CookieJar;
use std::net::SocketAddr;

/// Header a client may use to send its device fingerprint
pub const FINGERPRINT_HEADER: &str = "x-device-fingerprint";

/// Everything the request says about the anonymous caller
#[derive(Debug, Clone)]
pub struct ClientContext {
    pub identity: ClientIdentity,
}

#[async_trait]
impl FromRequestParts<AppContext> for ClientContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        let jar = CookieJar::from_headers(&parts.headers);
        let session_token = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());

        let fingerprint = parts
            .headers
            .get(FINGERPRINT_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);

        let identity = ClientIdentity::new(client_ip(&parts.headers, peer))
            .with_session_token(session_token)
            .with_fingerprint(fingerprint);

        Ok(ClientContext { identity })
    }
}

/// Admin authentication context - requires the configured admin token
#[derive(Debug, Clone)]
pub struct AdminAuthContext;

#[async_trait]
impl FromRequestParts<AppContext> for AdminAuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let expected = state
            .config
            .admin
            .token
            .as_deref()
            .ok_or_else(|| ApiError::ServiceUnavailable("Admin API is disabled".to_string()))?;

        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized("Missing authorization header".to_string()))?;

        if !constant_time_eq(token.as_bytes(), expected.as_bytes()) {
            return Err(ApiError::Unauthorized("Invalid admin token".to_string()));
        }

        Ok(AdminAuthContext)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
