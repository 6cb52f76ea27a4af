//! API 模块
//!
//! 提供 REST API 支持。

#[cfg(test)]
mod api_tests;
pub mod app_state;
pub mod dto;
pub mod handlers;
pub mod routes;

use crate::api::app_state::AppState;
use crate::api::dto::*;
use crate::observability::{create_observability_router, metrics_middleware};
use crate::security::TokenPair;
use crate::security::middleware::{
    maintenance_middleware, rate_limit_middleware, require_auth, security_headers_middleware,
};
use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::get,
};
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;

/// OpenAPI 文档
#[derive(OpenApi)]
#[openapi(
    info(title = "Scholarly API", description = "AI research assistant backend"),
    components(schemas(
        RegisterRequest, LoginRequest, LoginForm, RefreshRequest, VerifyEmailRequest,
        ForgotPasswordRequest, ResetPasswordRequest, UserResponse, TokenPair,
        UpdateProfileRequest, ChangePasswordRequest, ProfileStats, ProfileResponse,
        UserStatsResponse, RecentActivity,
        AddPaperRequest, UploadQuery, UploadResponse, LibraryQuery, UpdateLibraryEntryRequest,
        PaperSearchFilters, PaperSearchRequest, BulkAddRequest, BulkItemResult, BulkAddResponse,
        PaperResponse, LibraryEntryResponse, LibraryPaperResponse, AddPaperResponse,
        LibraryListResponse, PaperSearchResponse, PaperSummaryResponse, PaperStatsResponse,
        Recommendation, ReprocessResponse,
        NetworkQuery, AddCitationRequest, NetworkNode, NetworkEdge, CitationNetwork,
        CitationLink, CitationListResponse, InfluenceMetrics, ResearchGap, ResearchGapsResponse,
        CreateKnowledgeRequest, UpdateKnowledgeRequest, KnowledgeListQuery,
        KnowledgeSearchRequest, KnowledgeResponse, KnowledgeListResponse,
        KnowledgeSearchResponse, KnowledgeStatsResponse,
        GlobalSearchQuery, GlobalSearchResponse, SuggestionsQuery, SuggestionsResponse,
        TaskStatusResponse, MaintenanceRequest, MaintenanceResponse, SystemStatusResponse,
        PageParams, PageInfo, MessageResponse, LimitQuery, TagCount,
    )),
    tags(
        (name = "auth"), (name = "users"), (name = "papers"), (name = "citations"),
        (name = "knowledge"), (name = "search"), (name = "tasks"), (name = "monitoring"),
    )
)]
pub struct ApiDoc;

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

/// `*` 或空列表时放开全部来源
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn create_router(app_state: AppState) -> Router {
    let server = &app_state.config.server;

    let protected = Router::new()
        .merge(routes::auth_routes::create_session_router())
        .merge(routes::user_routes::create_user_router())
        .merge(routes::paper_routes::create_paper_router(
            app_state.config.sources.upload_max_size,
        ))
        .merge(routes::citation_routes::create_citation_router())
        .merge(routes::knowledge_routes::create_knowledge_router())
        .merge(routes::search_routes::create_search_router())
        .merge(routes::task_routes::create_task_router())
        .merge(routes::monitoring_routes::create_monitoring_router())
        .route_layer(from_fn_with_state(app_state.clone(), require_auth));

    let api = Router::new()
        .merge(routes::auth_routes::create_auth_router())
        .merge(protected);

    let mut router = Router::new()
        .nest("/api/v1", api)
        .route("/docs", get(openapi_json))
        .layer(from_fn_with_state(app_state.clone(), rate_limit_middleware))
        .layer(from_fn_with_state(app_state.clone(), maintenance_middleware))
        .with_state(app_state.clone())
        .merge(create_observability_router(app_state.observability.clone()))
        .route_layer(from_fn_with_state(
            app_state.observability.clone(),
            metrics_middleware,
        ));

    if let Some(dir) = &server.static_dir {
        router = router.nest_service("/static", ServeDir::new(dir));
    }

    router
        .layer(DefaultBodyLimit::max(server.max_request_size))
        .layer(TimeoutLayer::new(Duration::from_secs(server.request_timeout)))
        // Add security headers middleware to all routes
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(&server.cors_origins))
        .layer(TraceLayer::new_for_http())
}
