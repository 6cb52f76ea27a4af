//! 搜索服务
//!
//! 跨论文与知识库的全局搜索，以及基于书库标题的搜索建议。

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Instant;

use crate::api::dto::{
    GlobalSearchQuery, GlobalSearchResponse, KnowledgeSearchRequest, PaperResponse,
    SuggestionsQuery, SuggestionsResponse,
};
use crate::error::{AppError, Result};
use crate::models::{Paper, UserPaper};
use crate::services::knowledge::KnowledgeService;
use crate::services::paper::paper_matches;
use crate::storage::{Collection, DocumentStore, Filter};

/// 建议的最短查询长度
const MIN_SUGGESTION_QUERY: usize = 2;

const MAX_SUGGESTIONS: usize = 10;

const MAX_GLOBAL_LIMIT: usize = 100;

#[derive(Clone)]
pub struct SearchService {
    papers: Collection<Paper>,
    library: Collection<UserPaper>,
    knowledge: KnowledgeService,
}

impl SearchService {
    pub fn new(store: Arc<dyn DocumentStore>, knowledge: KnowledgeService) -> Self {
        Self {
            papers: Collection::new(store.clone()),
            library: Collection::new(store),
            knowledge,
        }
    }

    async fn library_papers(&self, user_id: &str) -> Result<Vec<Paper>> {
        let entries = self.library.find(&Filter::new().eq("user_id", user_id)).await?;
        let fetched = join_all(entries.iter().map(|e| self.papers.get(&e.paper_id))).await;
        let mut papers = Vec::with_capacity(fetched.len());
        for paper in fetched {
            if let Some(paper) = paper? {
                papers.push(paper);
            }
        }
        Ok(papers)
    }

    /// 在书库论文与知识条目中同时搜索
    pub async fn global(&self, user_id: &str, query: &GlobalSearchQuery) -> Result<GlobalSearchResponse> {
        let q = query.q.trim();
        if q.is_empty() {
            return Err(AppError::Validation("Search query must not be empty".into()));
        }
        let limit = query.limit.clamp(1, MAX_GLOBAL_LIMIT);
        let started = Instant::now();

        let papers: Vec<PaperResponse> = if query.include_papers {
            let needle = q.to_lowercase();
            let mut matched: Vec<Paper> = self
                .library_papers(user_id)
                .await?
                .into_iter()
                .filter(|p| paper_matches(p, &needle))
                .collect();
            matched.sort_by(|a, b| b.influence_score.total_cmp(&a.influence_score));
            matched.iter().take(limit).map(PaperResponse::from).collect()
        } else {
            Vec::new()
        };

        let knowledge = if query.include_knowledge {
            self.knowledge
                .search(
                    user_id,
                    &KnowledgeSearchRequest {
                        query: q.to_string(),
                        entry_types: None,
                        tags: None,
                        paper_id: None,
                        limit,
                    },
                )
                .await?
                .entries
        } else {
            Vec::new()
        };

        let took_ms = started.elapsed().as_millis() as u64;
        tracing::info!(user_id = user_id, query = q, papers = papers.len(), knowledge = knowledge.len(), "Global search completed");
        Ok(GlobalSearchResponse {
            query: q.to_string(),
            total_results: papers.len() + knowledge.len(),
            papers,
            knowledge,
            took_ms,
        })
    }

    /// 书库中以查询开头的论文标题（不区分大小写）
    pub async fn suggestions(&self, user_id: &str, query: &SuggestionsQuery) -> Result<SuggestionsResponse> {
        let q = query.q.trim();
        if q.chars().count() < MIN_SUGGESTION_QUERY {
            return Ok(SuggestionsResponse {
                query: q.to_string(),
                suggestions: Vec::new(),
            });
        }

        let prefix = q.to_lowercase();
        let mut titles: Vec<String> = self
            .library_papers(user_id)
            .await?
            .into_iter()
            .map(|p| p.title)
            .filter(|title| title.to_lowercase().starts_with(&prefix))
            .collect();
        titles.sort();
        titles.dedup();
        titles.truncate(query.limit.clamp(1, MAX_SUGGESTIONS));

        Ok(SuggestionsResponse {
            query: q.to_string(),
            suggestions: titles,
        })
    }
}

pub fn create_search_service(store: Arc<dyn DocumentStore>, knowledge: KnowledgeService) -> SearchService {
    SearchService::new(store, knowledge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::dto::CreateKnowledgeRequest;
    use crate::models::{EntryType, PaperSource};

    use crate::services::test_support::TestContext;

    async fn seed(ctx: &TestContext) {
        let papers: Collection<Paper> = Collection::new(ctx.store.clone());
        let library: Collection<UserPaper> = Collection::new(ctx.store.clone());
        for (id, title) in [
            ("p1", "Graph Attention Networks"),
            ("p2", "Graph Neural Networks: A Review"),
            ("p3", "Deep Residual Learning"),
        ] {
            let mut paper = Paper::new(title.to_string(), PaperSource::Url);
            paper.id = id.into();
            papers.create(&paper).await.unwrap();
            library.create(&UserPaper::new("u1", id)).await.unwrap();
        }
        let mut foreign = Paper::new("Graph Kernels".to_string(), PaperSource::Url);
        foreign.id = "p4".into();
        papers.create(&foreign).await.unwrap();

        ctx.knowledge
            .create(
                "u1",
                &CreateKnowledgeRequest {
                    title: "Graph notes".into(),
                    content: "Attention over neighbours".into(),
                    entry_type: EntryType::Note,
                    paper_id: Some("p1".into()),
                    tags: vec![],
                    section_reference: None,
                    page_number: None,
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_global_search_respects_flags() {
        let ctx = TestContext::new().await;
        seed(&ctx).await;

        let query = GlobalSearchQuery {
            q: "graph".into(),
            include_papers: true,
            include_knowledge: true,
            limit: 10,
        };
        let all = ctx.search.global("u1", &query).await.unwrap();
        assert_eq!(all.papers.len(), 2);
        assert_eq!(all.knowledge.len(), 1);
        assert_eq!(all.total_results, 3);

        let papers_only = ctx
            .search
            .global("u1", &GlobalSearchQuery { include_knowledge: false, ..query })
            .await
            .unwrap();
        assert!(papers_only.knowledge.is_empty());
        assert_eq!(papers_only.total_results, 2);
    }

    #[tokio::test]
    async fn test_suggestions() {
        let ctx = TestContext::new().await;
        seed(&ctx).await;

        let short = ctx
            .search
            .suggestions("u1", &SuggestionsQuery { q: "g".into(), limit: 10 })
            .await
            .unwrap();
        assert!(short.suggestions.is_empty());

        let result = ctx
            .search
            .suggestions("u1", &SuggestionsQuery { q: "GRAPH".into(), limit: 10 })
            .await
            .unwrap();
        assert_eq!(
            result.suggestions,
            vec!["Graph Attention Networks", "Graph Neural Networks: A Review"]
        );
    }
}
