//! 可观测性模块
//!
//! 提供 Prometheus 指标、结构化日志和健康检查。

pub mod logging;
pub mod metrics;

use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{MatchedPath, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::Result;
use crate::jobs::broker::JobBroker;
use crate::storage::DocumentStore;

pub use logging::init_tracing;
pub use metrics::AppMetrics;

/// 单个探针的超时
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// 保留的最近检查记录数
const RECENT_CHECKS: usize = 10;

// ===== Health Probes =====

/// 依赖服务探针
#[async_trait]
pub trait HealthProbe: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self) -> Result<()>;
}

/// 数据库探针
pub struct StoreProbe(pub Arc<dyn DocumentStore>);

#[async_trait]
impl HealthProbe for StoreProbe {
    fn name(&self) -> &str {
        "database"
    }

    async fn check(&self) -> Result<()> {
        self.0.ping().await
    }
}

/// Broker 探针
pub struct BrokerProbe(pub Arc<dyn JobBroker>);

#[async_trait]
impl HealthProbe for BrokerProbe {
    fn name(&self) -> &str {
        "broker"
    }

    async fn check(&self) -> Result<()> {
        self.0.ping().await
    }
}

// ===== Health Check =====

/// 健康检查状态
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub environment: String,
    pub timestamp: String,
    pub uptime_seconds: f64,
    pub checks: Vec<HealthCheck>,
}

/// 单个健康检查项
#[derive(Debug, Serialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: String,
    pub message: Option<String>,
    pub latency_ms: Option<u64>,
}

/// 健康检查结果
#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    pub name: String,
    pub healthy: bool,
    pub message: String,
    pub latency_ms: u64,
    pub checked_at: DateTime<Utc>,
}

impl From<&HealthCheckResult> for HealthCheck {
    fn from(c: &HealthCheckResult) -> Self {
        HealthCheck {
            name: c.name.clone(),
            status: if c.healthy { "healthy" } else { "unhealthy" }.to_string(),
            message: Some(c.message.clone()),
            latency_ms: Some(c.latency_ms),
        }
    }
}

/// 可观测性状态
#[derive(Clone)]
pub struct ObservabilityState {
    pub metrics: Arc<AppMetrics>,
    pub probes: Arc<Vec<Arc<dyn HealthProbe>>>,
    pub recent_checks: Arc<Mutex<Vec<HealthCheckResult>>>,
    pub start_time: DateTime<Utc>,
    pub version: String,
    pub environment: String,
}

impl ObservabilityState {
    pub fn new(
        metrics: Arc<AppMetrics>,
        probes: Vec<Arc<dyn HealthProbe>>,
        version: String,
        environment: String,
    ) -> Self {
        Self {
            metrics,
            probes: Arc::new(probes),
            recent_checks: Arc::new(Mutex::new(Vec::new())),
            start_time: Utc::now(),
            version,
            environment,
        }
    }

    /// 添加健康检查结果
    pub async fn add_health_check(&self, result: HealthCheckResult) {
        let mut checks = self.recent_checks.lock().await;
        checks.push(result);
        if checks.len() > RECENT_CHECKS {
            checks.remove(0);
        }
    }

    /// 执行全部探针
    pub async fn run_checks(&self) -> Vec<HealthCheckResult> {
        let mut results = Vec::with_capacity(self.probes.len());
        for probe in self.probes.iter() {
            let start = Instant::now();
            let outcome = tokio::time::timeout(PROBE_TIMEOUT, probe.check()).await;
            let (healthy, message) = match outcome {
                Ok(Ok(())) => (true, "ok".to_string()),
                Ok(Err(e)) => (false, e.to_string()),
                Err(_) => (false, format!("timed out after {:?}", PROBE_TIMEOUT)),
            };
            if !healthy {
                warn!(probe = probe.name(), message = %message, "Health probe failed");
            }
            let result = HealthCheckResult {
                name: probe.name().to_string(),
                healthy,
                message,
                latency_ms: start.elapsed().as_millis() as u64,
                checked_at: Utc::now(),
            };
            self.add_health_check(result.clone()).await;
            results.push(result);
        }
        results
    }

    /// 获取应用正常运行时间
    pub fn uptime_seconds(&self) -> f64 {
        (Utc::now() - self.start_time).num_milliseconds() as f64 / 1000.0
    }
}

// ===== Health Check Handlers =====

/// 完整健康状态
///
/// 进程能处理请求即返回 200，依赖异常时状态为 degraded。
pub async fn health_check(State(state): State<Arc<ObservabilityState>>) -> impl IntoResponse {
    let checks = state.run_checks().await;
    let all_healthy = checks.iter().all(|c| c.healthy);

    Json(HealthStatus {
        status: if all_healthy { "healthy" } else { "degraded" }.to_string(),
        version: state.version.clone(),
        environment: state.environment.clone(),
        timestamp: Utc::now().to_rfc3339(),
        uptime_seconds: state.uptime_seconds(),
        checks: checks.iter().map(HealthCheck::from).collect(),
    })
}

/// 简单存活检查
pub async fn liveness() -> impl IntoResponse {
    "OK"
}

/// 就绪检查（检查依赖服务）
pub async fn readiness(State(state): State<Arc<ObservabilityState>>) -> impl IntoResponse {
    let checks = state.run_checks().await;
    let all_healthy = checks.iter().all(|c| c.healthy);

    let body = Json(serde_json::json!({
        "ready": all_healthy,
        "checks": checks.iter().map(HealthCheck::from).collect::<Vec<_>>(),
    }));
    if all_healthy {
        (StatusCode::OK, body)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, body)
    }
}

/// Prometheus 指标端点
pub async fn metrics(State(state): State<Arc<ObservabilityState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4",
        )],
        state.metrics.gather(),
    )
}

/// 版本信息端点
pub async fn version(State(state): State<Arc<ObservabilityState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "version": state.version,
        "environment": state.environment,
        "api_version": "v1",
        "features": [
            "paper_processing",
            "ai_analysis",
            "citation_network",
            "knowledge_base",
            "background_jobs",
        ],
        "uptime_seconds": state.uptime_seconds(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// 创建可观测性路由
pub fn create_observability_router(state: Arc<ObservabilityState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
        .route("/metrics", get(metrics))
        .route("/version", get(version))
        .with_state(state)
}

// ===== Request Metrics Middleware =====

/// 记录请求指标的中间件
pub async fn metrics_middleware(
    State(state): State<Arc<ObservabilityState>>,
    req: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    let status = response.status();
    state.metrics.record_http_request(
        &method,
        &route,
        status.as_u16(),
        start.elapsed().as_secs_f64(),
    );
    if status.is_server_error() {
        state.metrics.record_error(status.as_str());
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use tower::ServiceExt;

    struct FailingProbe;

    #[async_trait]
    impl HealthProbe for FailingProbe {
        fn name(&self) -> &str {
            "broker"
        }

        async fn check(&self) -> Result<()> {
            Err(AppError::Connection("refused".into()))
        }
    }

    fn state(probes: Vec<Arc<dyn HealthProbe>>) -> Arc<ObservabilityState> {
        Arc::new(ObservabilityState::new(
            Arc::new(AppMetrics::new().unwrap()),
            probes,
            "1.0.0".into(),
            "test".into(),
        ))
    }

    async fn get_status(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(HttpRequest::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (
            status,
            serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null),
        )
    }

    #[tokio::test]
    async fn test_health_is_ok_when_dependency_fails() {
        let router = create_observability_router(state(vec![Arc::new(FailingProbe)]));

        let (status, body) = get_status(router.clone(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["checks"][0]["status"], "unhealthy");

        let (status, body) = get_status(router, "/health/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["ready"], false);
    }

    #[tokio::test]
    async fn test_health_healthy_with_store_probe() {
        let store: Arc<dyn DocumentStore> = Arc::new(crate::storage::MemoryStore::new());
        let router = create_observability_router(state(vec![Arc::new(StoreProbe(store))]));

        let (status, body) = get_status(router.clone(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["environment"], "test");

        let (status, _) = get_status(router.clone(), "/health/ready").await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = get_status(router, "/version").await;
        assert_eq!(body["api_version"], "v1");
    }

    #[tokio::test]
    async fn test_recent_checks_are_bounded() {
        let state = state(vec![Arc::new(FailingProbe)]);
        for _ in 0..15 {
            state.run_checks().await;
        }
        assert_eq!(state.recent_checks.lock().await.len(), RECENT_CHECKS);
    }
}
