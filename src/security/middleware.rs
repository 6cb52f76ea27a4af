//! Security Middleware Module
//!
//! Axum middleware for authentication, rate limiting, maintenance mode and
//! security headers.

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{HeaderMap, HeaderValue, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use tracing::{debug, warn};

use crate::api::app_state::AppState;
use crate::cache::MAINTENANCE_KEY;
use crate::error::{AppError, Result};
use crate::models::{SubscriptionTier, User};
use crate::security::auth::TokenType;
use crate::security::rate_limit::{RateLimitInfo, RateLimitResult, RateLimitScope};
use crate::storage::Collection;

/// Authenticated user, inserted into request extensions by [`require_auth`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl CurrentUser {
    pub fn id(&self) -> &str {
        &self.0.id
    }

    /// 403 unless the user's effective tier is at least `tier`.
    pub fn require_tier(&self, tier: SubscriptionTier) -> Result<()> {
        if self.0.effective_tier().satisfies(tier) {
            Ok(())
        } else {
            Err(AppError::Authorization(format!(
                "This feature requires a {} subscription",
                tier
            )))
        }
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| AppError::Authentication("Not authenticated".into()))
    }
}

/// Extract the bearer token from the Authorization header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.strip_prefix("Bearer ")
                .or_else(|| v.strip_prefix("bearer "))
        })
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolve the active user behind an access token.
pub async fn authenticate(state: &AppState, token: &str) -> Result<User> {
    let claims = state.tokens.verify(token, TokenType::Access)?;
    let users: Collection<User> = Collection::new(state.store.clone());
    let user = users
        .get(&claims.sub)
        .await?
        .ok_or_else(|| AppError::Authentication("User not found".into()))?;
    if !user.is_active {
        return Err(AppError::Validation("Inactive user".into()));
    }
    Ok(user)
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(req.headers()).map(str::to_string) else {
        return AppError::Authentication("Missing bearer token".into()).into_response();
    };

    match authenticate(&state, &token).await {
        Ok(user) => {
            debug!(user_id = %user.id, "Authenticated request");
            req.extensions_mut().insert(CurrentUser(user));
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}

/// Client address: first X-Forwarded-For hop, then X-Real-IP, then the peer.
pub fn client_ip(req: &Request) -> String {
    let headers = req.headers();
    if let Some(forwarded) = headers.get("X-Forwarded-For").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next().map(str::trim) {
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(real_ip) = headers.get("X-Real-IP").and_then(|v| v.to_str().ok()) {
        return real_ip.trim().to_string();
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    if !state.rate_limiter.is_enabled() {
        return next.run(req).await;
    }

    let scope = if req.uri().path().starts_with("/api/v1/auth") {
        RateLimitScope::Auth
    } else {
        RateLimitScope::Api
    };
    let client = client_ip(&req);

    match state.rate_limiter.check(scope, &client).await {
        RateLimitResult::Allowed => next.run(req).await,
        RateLimitResult::AllowedWithInfo(info) => {
            let mut response = next.run(req).await;
            add_rate_limit_headers(response.headers_mut(), &info);
            response
        }
        RateLimitResult::Limited { retry_after, limit } => {
            warn!(client = %client, scope = %scope, "Rate limit exceeded");
            let mut response = AppError::RateLimited { retry_after }.into_response();
            add_rate_limit_headers(response.headers_mut(), &limit);
            response
        }
    }
}

/// Add rate limit headers to response
fn add_rate_limit_headers(headers: &mut HeaderMap, info: &RateLimitInfo) {
    headers.insert("X-RateLimit-Limit", HeaderValue::from(info.limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(info.remaining));
    headers.insert(
        "X-RateLimit-Reset",
        HeaderValue::from(info.reset_at.timestamp()),
    );
}

/// Maintenance mode: `/api/` answers 503 while the cache flag is set.
/// Monitoring stays reachable so the flag can be cleared.
pub async fn maintenance_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let guarded = {
        let path = req.uri().path();
        path.starts_with("/api/") && !path.starts_with("/api/v1/monitoring")
    };
    if guarded {
        match state.cache.get(MAINTENANCE_KEY).await {
            Ok(Some(flag)) if flag == "true" => return AppError::Maintenance.into_response(),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Maintenance flag lookup failed"),
        }
    }
    next.run(req).await
}

/// Security headers middleware
pub async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        "X-Content-Type-Options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert(
        "X-XSS-Protection",
        HeaderValue::from_static("1; mode=block"),
    );
    headers.insert(
        "Strict-Transport-Security",
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert(
        "Content-Security-Policy",
        HeaderValue::from_static(
            "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'",
        ),
    );
    headers.insert(
        "Referrer-Policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );

    response
}
