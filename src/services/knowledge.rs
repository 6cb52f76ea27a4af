//! 知识库服务
//!
//! 知识条目的增删改查（仅限本人）、检索、统计与相关条目。

use chrono::{Duration, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use validator::Validate;

use crate::ai::{AiAnalyzer, truncate_chars};
use crate::api::dto::{
    CreateKnowledgeRequest, KnowledgeListQuery, KnowledgeListResponse, KnowledgeResponse,
    KnowledgeSearchRequest, KnowledgeSearchResponse, KnowledgeStatsResponse, MessageResponse,
    PageParams, UpdateKnowledgeRequest, top_tags,
};
use crate::error::{AppError, Result};
use crate::models::KnowledgeEntry;
use crate::storage::{Collection, DocumentStore, Filter, SortOrder};

/// 超过该长度的正文生成 AI 摘要
const SUMMARY_THRESHOLD_CHARS: usize = 500;

/// 送去摘要的正文上限
const SUMMARY_INPUT_CHARS: usize = 2000;

const RECENT_DAYS: i64 = 7;

const TOP_TAGS_LIMIT: usize = 10;

pub const RELATED_LIMIT: usize = 5;

#[derive(Clone)]
pub struct KnowledgeService {
    entries: Collection<KnowledgeEntry>,
    analyzer: AiAnalyzer,
}

impl KnowledgeService {
    pub fn new(store: Arc<dyn DocumentStore>, analyzer: AiAnalyzer) -> Self {
        Self {
            entries: Collection::new(store),
            analyzer,
        }
    }

    fn user_filter(user_id: &str) -> Filter {
        Filter::new().eq("user_id", user_id)
    }

    /// 获取本人的条目，其他用户的条目视为不存在
    async fn owned(&self, user_id: &str, entry_id: &str) -> Result<KnowledgeEntry> {
        self.entries
            .get(entry_id)
            .await?
            .filter(|entry| entry.user_id == user_id)
            .ok_or_else(|| AppError::NotFound(format!("Knowledge entry not found: {}", entry_id)))
    }

    /// 长正文生成摘要，失败时只记录警告
    async fn summarize(&self, content: &str) -> Option<String> {
        if content.chars().count() <= SUMMARY_THRESHOLD_CHARS {
            return None;
        }
        match self
            .analyzer
            .summarize_text(truncate_chars(content, SUMMARY_INPUT_CHARS))
            .await
        {
            Ok(summary) if !summary.is_empty() => Some(summary),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to summarize knowledge entry");
                None
            }
        }
    }

    pub async fn create(&self, user_id: &str, request: &CreateKnowledgeRequest) -> Result<KnowledgeResponse> {
        request.validate()?;
        let mut entry = KnowledgeEntry::new(user_id, &request.title, &request.content, request.entry_type);
        entry.paper_id = request.paper_id.clone();
        entry.tags = normalize_tags(&request.tags);
        entry.section_reference = request.section_reference.clone();
        entry.page_number = request.page_number;
        entry.summary = self.summarize(&entry.content).await;

        self.entries.create(&entry).await?;
        tracing::info!(user_id = user_id, entry_id = %entry.id, entry_type = %entry.entry_type, "Knowledge entry created");
        Ok(KnowledgeResponse::from(&entry))
    }

    pub async fn get(&self, user_id: &str, entry_id: &str) -> Result<KnowledgeResponse> {
        Ok(KnowledgeResponse::from(&self.owned(user_id, entry_id).await?))
    }

    /// 更新条目；正文变化后重新生成摘要
    pub async fn update(
        &self,
        user_id: &str,
        entry_id: &str,
        request: &UpdateKnowledgeRequest,
    ) -> Result<KnowledgeResponse> {
        request.validate()?;
        let mut entry = self.owned(user_id, entry_id).await?;

        if let Some(title) = &request.title {
            entry.title = title.clone();
        }
        if let Some(entry_type) = request.entry_type {
            entry.entry_type = entry_type;
        }
        if let Some(tags) = &request.tags {
            entry.tags = normalize_tags(tags);
        }
        if let Some(section) = &request.section_reference {
            entry.section_reference = Some(section.clone());
        }
        if let Some(page) = request.page_number {
            entry.page_number = Some(page);
        }
        if let Some(content) = &request.content {
            entry.content = content.clone();
            if let Some(summary) = self.summarize(content).await {
                entry.summary = Some(summary);
            }
        }

        entry.touch();
        self.entries.save(&entry).await?;
        tracing::info!(user_id = user_id, entry_id = entry_id, "Knowledge entry updated");
        Ok(KnowledgeResponse::from(&entry))
    }

    pub async fn delete(&self, user_id: &str, entry_id: &str) -> Result<MessageResponse> {
        self.owned(user_id, entry_id).await?;
        self.entries.delete(entry_id).await?;
        tracing::info!(user_id = user_id, entry_id = entry_id, "Knowledge entry deleted");
        Ok(MessageResponse::new("Knowledge entry deleted successfully"))
    }

    /// 分页列表，按创建时间倒序
    pub async fn list(&self, user_id: &str, query: &KnowledgeListQuery) -> Result<KnowledgeListResponse> {
        let mut filter = Self::user_filter(user_id);
        if let Some(entry_type) = query.entry_type {
            filter = filter.eq("entry_type", entry_type.to_string());
        }
        if let Some(paper_id) = &query.paper_id {
            filter = filter.eq("paper_id", paper_id.as_str());
        }
        if let Some(tag) = &query.tag {
            filter = filter.contains("tags", tag.as_str());
        }

        let page = PageParams::new(query.page.unwrap_or(1), query.per_page.unwrap_or(20));
        let total = self.entries.count(&filter).await? as usize;
        let entries = self
            .entries
            .find(
                &filter
                    .order_by("created_at", SortOrder::Desc)
                    .start(page.offset())
                    .limit(page.per_page),
            )
            .await?;

        Ok(KnowledgeListResponse {
            entries: entries.iter().map(KnowledgeResponse::from).collect(),
            pagination: page.info(total),
        })
    }

    /// 不区分大小写检索标题、正文与摘要，按更新时间倒序
    pub async fn search(&self, user_id: &str, request: &KnowledgeSearchRequest) -> Result<KnowledgeSearchResponse> {
        request.validate()?;
        let started = Instant::now();

        let mut filter = Self::user_filter(user_id);
        if let Some(types) = &request.entry_types {
            if !types.is_empty() {
                filter = filter.any_of("entry_type", types.iter().map(|t| t.to_string()));
            }
        }
        if let Some(paper_id) = &request.paper_id {
            filter = filter.eq("paper_id", paper_id.as_str());
        }

        let needle = request.query.trim().to_lowercase();
        let wanted_tags: Vec<&String> = request.tags.iter().flatten().collect();
        let entries: Vec<KnowledgeResponse> = self
            .entries
            .find(&filter.order_by("updated_at", SortOrder::Desc))
            .await?
            .iter()
            .filter(|entry| entry.matches(&needle))
            .filter(|entry| wanted_tags.is_empty() || wanted_tags.iter().any(|t| entry.tags.contains(t)))
            .take(request.limit)
            .map(KnowledgeResponse::from)
            .collect();

        let took_ms = started.elapsed().as_millis() as u64;
        tracing::info!(user_id = user_id, query = %request.query, total = entries.len(), took_ms = took_ms, "Knowledge search completed");
        Ok(KnowledgeSearchResponse {
            total: entries.len(),
            entries,
            query: request.query.clone(),
            took_ms,
        })
    }

    pub async fn stats(&self, user_id: &str) -> Result<KnowledgeStatsResponse> {
        let entries = self.entries.find(&Self::user_filter(user_id)).await?;
        let since = Utc::now() - Duration::days(RECENT_DAYS);

        let mut by_type: BTreeMap<String, u64> = BTreeMap::new();
        for entry in &entries {
            *by_type.entry(entry.entry_type.to_string()).or_insert(0) += 1;
        }
        let unique_tags = entries
            .iter()
            .flat_map(|e| &e.tags)
            .collect::<HashSet<_>>()
            .len();

        Ok(KnowledgeStatsResponse {
            total_entries: entries.len() as u64,
            by_type,
            recent_entries: entries.iter().filter(|e| e.created_at >= since).count() as u64,
            unique_tags,
            top_tags: top_tags(entries.iter().flat_map(|e| &e.tags), TOP_TAGS_LIMIT),
        })
    }

    /// 共享标签越多越相关；源条目没有标签时返回最新的条目
    pub async fn related(&self, user_id: &str, entry_id: &str, limit: usize) -> Result<Vec<KnowledgeResponse>> {
        let source = self.owned(user_id, entry_id).await?;
        let candidates = self
            .entries
            .find(&Self::user_filter(user_id).order_by("created_at", SortOrder::Desc))
            .await?;

        let mut scored: Vec<(usize, KnowledgeEntry)> = candidates
            .into_iter()
            .filter(|entry| entry.id != source.id)
            .map(|entry| {
                let shared = entry.tags.iter().filter(|t| source.tags.contains(t)).count();
                (shared, entry)
            })
            .filter(|(shared, _)| source.tags.is_empty() || *shared > 0)
            .collect();
        // 稳定排序保留创建时间倒序
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(scored
            .iter()
            .take(limit)
            .map(|(_, entry)| KnowledgeResponse::from(entry))
            .collect())
    }
}

fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

pub fn create_knowledge_service(store: Arc<dyn DocumentStore>, analyzer: AiAnalyzer) -> KnowledgeService {
    KnowledgeService::new(store, analyzer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntryType;
    use crate::services::test_support::TestContext;

    fn request(title: &str, content: &str, entry_type: EntryType, tags: &[&str]) -> CreateKnowledgeRequest {
        CreateKnowledgeRequest {
            title: title.into(),
            content: content.into(),
            entry_type,
            paper_id: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            section_reference: None,
            page_number: None,
        }
    }

    #[tokio::test]
    async fn test_crud_is_owner_scoped() {
        let ctx = TestContext::new().await;
        let created = ctx
            .knowledge
            .create("u1", &request("Attention", "Self attention notes", EntryType::Note, &["nlp"]))
            .await
            .unwrap();
        assert!(created.summary.is_none());

        assert!(matches!(
            ctx.knowledge.get("u2", &created.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            ctx.knowledge.delete("u2", &created.id).await,
            Err(AppError::NotFound(_))
        ));

        let updated = ctx
            .knowledge
            .update(
                "u1",
                &created.id,
                &UpdateKnowledgeRequest {
                    title: Some("Attention is all you need".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Attention is all you need");
        assert_eq!(updated.content, "Self attention notes");

        ctx.knowledge.delete("u1", &created.id).await.unwrap();
        assert!(ctx.knowledge.get("u1", &created.id).await.is_err());
    }

    #[tokio::test]
    async fn test_long_content_gets_summary() {
        let ctx = TestContext::new().await;
        let content = "Transformers replace recurrence with attention. ".repeat(20);
        let created = ctx
            .knowledge
            .create("u1", &request("Long", &content, EntryType::Insight, &[]))
            .await
            .unwrap();
        assert!(created.summary.is_some());
    }

    #[tokio::test]
    async fn test_search_filters_and_stats() {
        let ctx = TestContext::new().await;
        ctx.knowledge
            .create("u1", &request("Graph networks", "Message passing", EntryType::Note, &["gnn", "ml"]))
            .await
            .unwrap();
        ctx.knowledge
            .create("u1", &request("Open question", "Does message passing scale?", EntryType::Question, &["gnn"]))
            .await
            .unwrap();
        ctx.knowledge
            .create("u2", &request("Other user", "message passing too", EntryType::Note, &[]))
            .await
            .unwrap();

        let all = ctx
            .knowledge
            .search(
                "u1",
                &KnowledgeSearchRequest {
                    query: "MESSAGE".into(),
                    entry_types: None,
                    tags: None,
                    paper_id: None,
                    limit: 20,
                },
            )
            .await
            .unwrap();
        assert_eq!(all.total, 2);
        assert_eq!(all.entries[0].title, "Open question");

        let questions = ctx
            .knowledge
            .search(
                "u1",
                &KnowledgeSearchRequest {
                    query: "message".into(),
                    entry_types: Some(vec![EntryType::Question]),
                    tags: Some(vec!["gnn".into()]),
                    paper_id: None,
                    limit: 20,
                },
            )
            .await
            .unwrap();
        assert_eq!(questions.total, 1);

        let stats = ctx.knowledge.stats("u1").await.unwrap();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.by_type.get("note"), Some(&1));
        assert_eq!(stats.by_type.get("question"), Some(&1));
        assert_eq!(stats.recent_entries, 2);
        assert_eq!(stats.unique_tags, 2);
        assert_eq!(stats.top_tags[0].tag, "gnn");
    }

    #[tokio::test]
    async fn test_list_pagination_and_related() {
        let ctx = TestContext::new().await;
        let source = ctx
            .knowledge
            .create("u1", &request("Source", "a", EntryType::Note, &["rl", "robotics"]))
            .await
            .unwrap();
        ctx.knowledge
            .create("u1", &request("One shared", "b", EntryType::Note, &["rl"]))
            .await
            .unwrap();
        ctx.knowledge
            .create("u1", &request("Two shared", "c", EntryType::Note, &["robotics", "rl"]))
            .await
            .unwrap();
        ctx.knowledge
            .create("u1", &request("Unrelated", "d", EntryType::Highlight, &["vision"]))
            .await
            .unwrap();

        let related = ctx.knowledge.related("u1", &source.id, RELATED_LIMIT).await.unwrap();
        let titles: Vec<&str> = related.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Two shared", "One shared"]);

        let page = ctx
            .knowledge
            .list(
                "u1",
                &KnowledgeListQuery {
                    per_page: Some(3),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.entries.len(), 3);
        assert_eq!(page.pagination.total, 4);
        assert!(page.pagination.has_next);

        let tagged = ctx
            .knowledge
            .list(
                "u1",
                &KnowledgeListQuery {
                    tag: Some("rl".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(tagged.pagination.total, 3);
    }
}
