use axum::{Json, extract::State, response::IntoResponse};
use std::time::Duration;
use tracing::{info, warn};

use crate::{
    api::{app_state::AppState, dto::*},
    cache::MAINTENANCE_KEY,
    error::AppError,
    models::SubscriptionTier,
    security::CurrentUser,
};

/// 维护模式默认持续时间
const DEFAULT_MAINTENANCE_TTL: u64 = 3600;

/// 队列与后端概览（机构用户）
pub async fn system_status(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    user.require_tier(SubscriptionTier::Institution)?;

    let mut queues = Vec::with_capacity(state.config.worker.queues.len());
    for queue in &state.config.worker.queues {
        queues.push(state.broker.stats(queue).await?);
    }

    let maintenance_mode = match state.cache.get(MAINTENANCE_KEY).await {
        Ok(flag) => flag.as_deref() == Some("true"),
        Err(e) => {
            warn!(error = %e, "Maintenance flag lookup failed");
            false
        }
    };
    let unhealthy = state
        .observability
        .run_checks()
        .await
        .iter()
        .any(|check| !check.healthy);

    Ok(Json(SystemStatusResponse {
        status: if unhealthy { "degraded" } else { "operational" }.to_string(),
        version: state.config.version.clone(),
        environment: state.config.environment.clone(),
        broker_backend: state.broker.backend().to_string(),
        store_backend: state.store.backend().to_string(),
        ai_provider: state.analyzer.provider_name().to_string(),
        queues,
        maintenance_mode,
        uptime_seconds: state.observability.uptime_seconds(),
    }))
}

/// 开关维护模式（机构用户）
pub async fn set_maintenance(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<MaintenanceRequest>,
) -> Result<impl IntoResponse, AppError> {
    user.require_tier(SubscriptionTier::Institution)?;

    if request.enabled {
        let ttl = Duration::from_secs(request.ttl.unwrap_or(DEFAULT_MAINTENANCE_TTL).max(1));
        state.cache.set_ex(MAINTENANCE_KEY, "true", ttl).await?;
    } else {
        state.cache.delete(MAINTENANCE_KEY).await?;
    }
    info!(user_id = %user.id(), enabled = request.enabled, "Maintenance mode toggled");

    Ok(Json(MaintenanceResponse {
        maintenance_mode: request.enabled,
        message: if request.enabled {
            "Maintenance mode enabled"
        } else {
            "Maintenance mode disabled"
        }
        .to_string(),
    }))
}
