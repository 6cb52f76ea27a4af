//! 应用状态
//!
//! 所有 Handler 与中间件共享的服务和后端连接。

use std::sync::Arc;

use crate::ai::{AiAnalyzer, create_providers};
use crate::cache::Cache;
use crate::config::config::AppConfig;
use crate::error::Result;
use crate::jobs::{JobBroker, ResearchTasks, TaskDispatcher, TaskTracker};
use crate::observability::{AppMetrics, BrokerProbe, HealthProbe, ObservabilityState, StoreProbe};
use crate::security::{PasswordHasher, RateLimiter, TokenService};
use crate::services::{
    AuthService, CitationService, KnowledgeService, MetadataExtractor, PaperService,
    SearchService, UserService, create_auth_service, create_citation_service,
    create_knowledge_service, create_paper_service, create_search_service, create_user_service,
};
use crate::storage::DocumentStore;

/// Application state containing all shared services and backends
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// 文档存储
    pub store: Arc<dyn DocumentStore>,
    /// 任务队列
    pub broker: Arc<dyn JobBroker>,
    /// 推荐缓存与维护开关
    pub cache: Arc<dyn Cache>,
    pub dispatcher: TaskDispatcher,
    pub metrics: Arc<AppMetrics>,
    pub tokens: TokenService,
    pub rate_limiter: Arc<RateLimiter>,
    pub observability: Arc<ObservabilityState>,
    pub analyzer: AiAnalyzer,
    pub auth: AuthService,
    pub users: UserService,
    pub papers: PaperService,
    pub citations: CitationService,
    pub knowledge: KnowledgeService,
    pub search: SearchService,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("environment", &self.config.environment)
            .field("store", &self.store.backend())
            .field("broker", &self.broker.backend())
            .field("ai_provider", &self.analyzer.provider_name())
            .field("rate_limit_enabled", &self.rate_limiter.is_enabled())
            .finish()
    }
}

impl AppState {
    /// 根据配置与已连接的后端组装全部服务
    pub fn build(
        config: AppConfig,
        store: Arc<dyn DocumentStore>,
        broker: Arc<dyn JobBroker>,
        cache: Arc<dyn Cache>,
        rate_limiter: RateLimiter,
    ) -> Result<Self> {
        let metrics = Arc::new(AppMetrics::new()?);
        let tokens = TokenService::new(&config.security);
        let hasher = PasswordHasher::new(config.security.password_hash_iterations);

        let providers = create_providers(&config.ai)?;
        let analyzer = AiAnalyzer::new(providers, &config.ai, metrics.clone());
        let dispatcher = TaskDispatcher::new(
            broker.clone(),
            TaskTracker::new(store.clone()),
            metrics.clone(),
            config.worker.max_retries,
        );

        let auth = create_auth_service(
            store.clone(),
            hasher.clone(),
            tokens.clone(),
            config.environment == "development",
        );
        let users = create_user_service(store.clone(), hasher);
        let papers = create_paper_service(
            store.clone(),
            MetadataExtractor::new(&config.sources)?,
            analyzer.clone(),
            dispatcher.clone(),
            cache.clone(),
            metrics.clone(),
            config.sources.clone(),
        );
        let citations = create_citation_service(store.clone());
        let knowledge = create_knowledge_service(store.clone(), analyzer.clone());
        let search = create_search_service(store.clone(), knowledge.clone());

        let probes: Vec<Arc<dyn HealthProbe>> = vec![
            Arc::new(StoreProbe(store.clone())),
            Arc::new(BrokerProbe(broker.clone())),
        ];
        let observability = Arc::new(ObservabilityState::new(
            metrics.clone(),
            probes,
            config.version.clone(),
            config.environment.clone(),
        ));

        tracing::info!(
            store = store.backend(),
            broker = broker.backend(),
            ai_provider = analyzer.provider_name(),
            "Application state initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            broker,
            cache,
            dispatcher,
            metrics,
            tokens,
            rate_limiter: Arc::new(rate_limiter),
            observability,
            analyzer,
            auth,
            users,
            papers,
            citations,
            knowledge,
            search,
        })
    }

    /// Worker 使用的任务执行器
    pub fn task_handler(&self) -> ResearchTasks {
        ResearchTasks::new(
            self.papers.clone(),
            self.citations.clone(),
            self.dispatcher.clone(),
        )
    }
}
