//! 服务层测试夹具：内存存储、内存队列、内存缓存与启发式分析器

use std::sync::Arc;

use crate::ai::{AiAnalyzer, create_providers};
use crate::cache::{Cache, MemoryCache};
use crate::config::config::{AiConfig, SourcesConfig};
use crate::jobs::{JobBroker, MemoryBroker, TaskDispatcher, TaskTracker};
use crate::observability::AppMetrics;
use crate::services::{
    CitationService, KnowledgeService, MetadataExtractor, PaperService, SearchService,
};
use crate::storage::{DocumentStore, MemoryStore};

pub(crate) struct TestContext {
    pub store: Arc<dyn DocumentStore>,
    pub broker: Arc<dyn JobBroker>,
    pub cache: Arc<dyn Cache>,
    pub dispatcher: TaskDispatcher,
    pub papers: PaperService,
    pub citations: CitationService,
    pub knowledge: KnowledgeService,
    pub search: SearchService,
}

impl TestContext {
    pub async fn new() -> Self {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let broker: Arc<dyn JobBroker> = Arc::new(MemoryBroker::new(60));
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
        let metrics = Arc::new(AppMetrics::new().unwrap());

        let ai_config = AiConfig::default();
        let providers = create_providers(&ai_config).unwrap();
        let analyzer = AiAnalyzer::new(providers, &ai_config, metrics.clone());

        let dispatcher = TaskDispatcher::new(
            broker.clone(),
            TaskTracker::new(store.clone()),
            metrics.clone(),
            3,
        );
        let sources = SourcesConfig::default();
        let papers = PaperService::new(
            store.clone(),
            MetadataExtractor::new(&sources).unwrap(),
            analyzer.clone(),
            dispatcher.clone(),
            cache.clone(),
            metrics.clone(),
            sources,
        );
        let knowledge = KnowledgeService::new(store.clone(), analyzer.clone());
        let search = SearchService::new(store.clone(), knowledge.clone());

        Self {
            citations: CitationService::new(store.clone()),
            store,
            broker,
            cache,
            dispatcher,
            papers,
            knowledge,
            search,
        }
    }
}
