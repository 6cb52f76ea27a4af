//! 论文服务
//!
//! 论文导入、AI 处理流水线、用户书库、检索、推荐与上传校验。

use chrono::Utc;
use futures_util::future::join_all;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use validator::Validate;

use crate::ai::AiAnalyzer;
use crate::api::dto::{
    AddPaperRequest, AddPaperResponse, BulkAddRequest, BulkAddResponse, BulkItemResult,
    LibraryListResponse, LibraryPaperResponse, LibraryQuery, MessageResponse, PageParams,
    PaperResponse, PaperSearchFilters, PaperSearchRequest, PaperSearchResponse,
    PaperStatsResponse, PaperSummaryResponse, Recommendation, ReprocessResponse,
    UpdateLibraryEntryRequest, UploadResponse,
};
use crate::cache::Cache;
use crate::config::config::SourcesConfig;
use crate::error::{AppError, Result};
use crate::jobs::TaskDispatcher;
use crate::models::{Paper, ProcessingStatus, ReadingStatus, UserPaper};
use crate::observability::AppMetrics;
use crate::services::metadata::{MetadataExtractor, PaperMetadata};
use crate::storage::{Collection, DocumentStore, Filter, SortOrder};

/// 推荐结果缓存时间
pub const RECOMMENDATION_TTL: Duration = Duration::from_secs(3600);

/// 缓存的推荐条数
pub const RECOMMENDATION_LIMIT: usize = 20;

/// 推荐时扫描的候选论文数量
const CANDIDATE_SCAN_LIMIT: usize = 1000;

/// 嵌入输入的字符上限
const EMBEDDING_TEXT_LIMIT: usize = 8000;

pub fn recommendation_cache_key(user_id: &str) -> String {
    format!("recommendations:{}", user_id)
}

/// 论文服务
#[derive(Clone)]
pub struct PaperService {
    papers: Collection<Paper>,
    library: Collection<UserPaper>,
    extractor: MetadataExtractor,
    analyzer: AiAnalyzer,
    dispatcher: TaskDispatcher,
    cache: Arc<dyn Cache>,
    metrics: Arc<AppMetrics>,
    sources: SourcesConfig,
}

impl PaperService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        extractor: MetadataExtractor,
        analyzer: AiAnalyzer,
        dispatcher: TaskDispatcher,
        cache: Arc<dyn Cache>,
        metrics: Arc<AppMetrics>,
        sources: SourcesConfig,
    ) -> Self {
        Self {
            papers: Collection::new(store.clone()),
            library: Collection::new(store),
            extractor,
            analyzer,
            dispatcher,
            cache,
            metrics,
            sources,
        }
    }

    pub async fn get_paper(&self, paper_id: &str) -> Result<Paper> {
        self.papers
            .get(paper_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Paper not found: {}", paper_id)))
    }

    pub async fn save_paper(&self, paper: &Paper) -> Result<()> {
        self.papers.save(paper).await
    }

    async fn find_by(&self, field: &str, value: &str) -> Result<Option<Paper>> {
        self.papers.find_one(&Filter::new().eq(field, value)).await
    }

    /// 按 DOI、arXiv ID、PMID、URL 的顺序查找已存在的论文
    async fn find_existing(&self, metadata: &PaperMetadata, url: &str) -> Result<Option<Paper>> {
        let keys = [
            ("doi", metadata.doi.as_deref()),
            ("arxiv_id", metadata.arxiv_id.as_deref()),
            ("pmid", metadata.pmid.as_deref()),
            ("url", Some(url)),
        ];
        for (field, value) in keys {
            if let Some(value) = value {
                if let Some(paper) = self.find_by(field, value).await? {
                    return Ok(Some(paper));
                }
            }
        }
        Ok(None)
    }

    /// 确保论文在用户书库中，返回书库条目
    pub async fn ensure_in_library(
        &self,
        user_id: &str,
        paper_id: &str,
        tags: Option<&[String]>,
        notes: Option<&str>,
    ) -> Result<UserPaper> {
        if let Some(mut entry) = self.library.get(&UserPaper::key(user_id, paper_id)).await? {
            entry.touch();
            self.library.save(&entry).await?;
            return Ok(entry);
        }

        let mut entry = UserPaper::new(user_id, paper_id);
        entry.tags = tags.map(<[String]>::to_vec).unwrap_or_default();
        entry.notes = notes.map(str::to_string);
        match self.library.create(&entry).await {
            Ok(()) => Ok(entry),
            // 并发添加同一篇论文时以已存在的条目为准
            Err(AppError::Conflict(_)) => self
                .library
                .get(&entry.id)
                .await?
                .ok_or_else(|| AppError::Internal("Library entry vanished".into())),
            Err(e) => Err(e),
        }
    }

    /// 通过 URL 导入论文
    ///
    /// 已存在的论文只加入书库；新论文以 pending 状态保存并提交处理任务。
    /// 返回 (论文, 是否新建, 任务 ID)。
    pub async fn process_paper_from_url(
        &self,
        url: &str,
        user_id: &str,
        tags: Option<&[String]>,
        notes: Option<&str>,
    ) -> Result<(Paper, bool, Option<String>)> {
        tracing::info!(user_id = user_id, url = url, "Processing paper from URL");

        if let Some(existing) = self.find_by("url", url).await? {
            self.ensure_in_library(user_id, &existing.id, tags, notes).await?;
            return Ok((existing, false, None));
        }

        let metadata = self.extractor.extract(url).await?;
        if let Some(existing) = self.find_existing(&metadata, url).await? {
            tracing::info!(paper_id = %existing.id, "Paper already exists");
            self.ensure_in_library(user_id, &existing.id, tags, notes).await?;
            return Ok((existing, false, None));
        }

        let paper = metadata.into_paper(url);
        match self.papers.create(&paper).await {
            Ok(()) => {}
            Err(AppError::Conflict(_)) => {
                return Err(AppError::Conflict("Paper already exists".into()));
            }
            Err(e) => return Err(e),
        }
        self.metrics.record_paper_ingested(&paper.source.to_string());
        self.ensure_in_library(user_id, &paper.id, tags, notes).await?;

        let job = self
            .dispatcher
            .submit(
                "process_paper",
                serde_json::json!({ "paper_id": paper.id, "user_id": user_id }),
            )
            .await?;

        tracing::info!(paper_id = %paper.id, task_id = %job.id, "Paper created and queued");
        Ok((paper, true, Some(job.id)))
    }

    pub async fn add_paper(&self, user_id: &str, request: &AddPaperRequest) -> Result<AddPaperResponse> {
        request.validate()?;
        let (paper, is_new, task_id) = self
            .process_paper_from_url(
                &request.url,
                user_id,
                request.tags.as_deref(),
                request.notes.as_deref(),
            )
            .await?;

        let message = if is_new {
            "Paper added and queued for processing"
        } else {
            "Paper already exists and was added to your library"
        };
        Ok(AddPaperResponse {
            paper: PaperResponse::from(&paper),
            is_new,
            task_id,
            message: message.into(),
        })
    }

    /// 运行 AI 分析流水线
    ///
    /// 没有可分析的内容时标记失败；分析出错时记录错误并返回。
    pub async fn process_paper_content(&self, paper_id: &str) -> Result<Paper> {
        let mut paper = self.get_paper(paper_id).await?;
        paper.mark_processing();
        self.papers.save(&paper).await?;

        let Some(content) = paper.analysis_content() else {
            let message = "No content available for processing";
            paper.mark_failed(message);
            self.papers.save(&paper).await?;
            return Err(AppError::Validation(message.into()));
        };

        let started = Instant::now();
        match self
            .analyzer
            .analyze_paper(&paper.title, &paper.author_names(), &content)
            .await
        {
            Ok(analysis) => {
                paper.summary = Some(analysis.summary);
                paper.key_insights = analysis.insights.into_iter().map(|i| i.insight).collect();
                paper.methodology = Some(analysis.methodology).filter(|m| !m.is_empty());
                paper.limitations = Some(analysis.limitations).filter(|l| !l.is_empty());
                paper.contributions = analysis
                    .contributions
                    .into_iter()
                    .map(|c| c.contribution)
                    .collect();
                paper.mark_completed();
                self.papers.save(&paper).await?;
                tracing::info!(
                    paper_id = paper_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Paper processing completed"
                );
                Ok(paper)
            }
            Err(e) => {
                tracing::error!(paper_id = paper_id, error = %e, "Paper processing failed");
                paper.mark_failed(e.to_string());
                self.papers.save(&paper).await?;
                Err(e)
            }
        }
    }

    /// 把论文标记为最终失败（重试耗尽时调用）
    pub async fn mark_failed(&self, paper_id: &str, error: &str) -> Result<()> {
        let mut paper = self.get_paper(paper_id).await?;
        paper.mark_failed(error);
        self.papers.save(&paper).await
    }

    /// 为标题与摘要生成嵌入向量并保存
    pub async fn generate_embedding(&self, paper_id: &str) -> Result<usize> {
        let mut paper = self.get_paper(paper_id).await?;
        let text = format!(
            "{} {}",
            paper.title,
            paper.r#abstract.as_deref().unwrap_or_default()
        );
        let text: String = text.chars().take(EMBEDDING_TEXT_LIMIT).collect();
        let embedding = self.analyzer.embed(&text).await?;
        let dimension = embedding.len();
        paper.embedding = Some(embedding);
        paper.touch();
        self.papers.save(&paper).await?;
        Ok(dimension)
    }

    /// 最早创建的 pending 论文
    pub async fn pending_papers(&self, limit: usize) -> Result<Vec<Paper>> {
        self.papers
            .find(
                &Filter::new()
                    .eq("processing_status", ProcessingStatus::Pending.to_string())
                    .order_by("created_at", SortOrder::Asc)
                    .limit(limit),
            )
            .await
    }

    async fn library_entry(&self, user_id: &str, paper_id: &str) -> Result<UserPaper> {
        self.library
            .get(&UserPaper::key(user_id, paper_id))
            .await?
            .ok_or_else(|| AppError::NotFound("Paper not found in library".into()))
    }

    /// 校验访问权限：论文不存在为 404，不在书库中为 403
    async fn accessible(&self, user_id: &str, paper_id: &str) -> Result<(Paper, UserPaper)> {
        let paper = self.get_paper(paper_id).await?;
        let entry = self
            .library
            .get(&UserPaper::key(user_id, paper_id))
            .await?
            .ok_or_else(|| AppError::Authorization("Paper is not in your library".into()))?;
        Ok((paper, entry))
    }

    async fn with_papers(&self, entries: Vec<UserPaper>) -> Result<Vec<(Paper, UserPaper)>> {
        let papers = join_all(entries.iter().map(|e| self.papers.get(&e.paper_id))).await;
        let mut pairs = Vec::with_capacity(entries.len());
        for (entry, paper) in entries.into_iter().zip(papers) {
            match paper? {
                Some(paper) => pairs.push((paper, entry)),
                None => tracing::warn!(paper_id = %entry.paper_id, "Library entry points at a missing paper"),
            }
        }
        Ok(pairs)
    }

    /// 用户书库（按加入时间倒序）
    pub async fn list_library(&self, user_id: &str, query: &LibraryQuery) -> Result<LibraryListResponse> {
        let page = PageParams::new(query.page.unwrap_or(1), query.per_page.unwrap_or(20));
        let mut filter = Filter::new().eq("user_id", user_id);
        if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
            let status: ReadingStatus = status.parse().map_err(AppError::Validation)?;
            filter = filter.eq("status", status.to_string());
        }

        let total = self.library.count(&filter).await? as usize;
        let entries = self
            .library
            .find(
                &filter
                    .order_by("created_at", SortOrder::Desc)
                    .start(page.offset())
                    .limit(page.per_page),
            )
            .await?;

        let papers = self
            .with_papers(entries)
            .await?
            .iter()
            .map(|(paper, entry)| LibraryPaperResponse::new(paper, entry))
            .collect();
        Ok(LibraryListResponse {
            papers,
            pagination: page.info(total),
        })
    }

    /// 查看书库中的论文并刷新访问时间
    pub async fn get_library_paper(&self, user_id: &str, paper_id: &str) -> Result<LibraryPaperResponse> {
        let (paper, mut entry) = self.accessible(user_id, paper_id).await?;
        entry.last_accessed_at = Utc::now();
        self.library.save(&entry).await?;
        Ok(LibraryPaperResponse::new(&paper, &entry))
    }

    /// 更新阅读状态、进度、评分等
    pub async fn update_library_entry(
        &self,
        user_id: &str,
        paper_id: &str,
        request: &UpdateLibraryEntryRequest,
    ) -> Result<LibraryPaperResponse> {
        request.validate()?;
        let paper = self.get_paper(paper_id).await?;
        let mut entry = self.library_entry(user_id, paper_id).await?;

        if let Some(status) = request.status {
            entry.status = status;
            if status == ReadingStatus::Completed && request.reading_progress.is_none() {
                entry.reading_progress = 100;
            }
        }
        if let Some(progress) = request.reading_progress {
            entry.reading_progress = progress;
        }
        if let Some(rating) = request.rating {
            entry.rating = Some(rating);
        }
        if let Some(tags) = &request.tags {
            entry.tags = tags.clone();
        }
        if let Some(notes) = &request.notes {
            entry.notes = Some(notes.clone()).filter(|n| !n.is_empty());
        }
        if let Some(time_spent) = request.time_spent {
            entry.time_spent = time_spent;
        }
        entry.touch();
        self.library.save(&entry).await?;

        tracing::info!(
            user_id = user_id,
            paper_id = paper_id,
            progress = entry.reading_progress,
            "Library entry updated"
        );
        Ok(LibraryPaperResponse::new(&paper, &entry))
    }

    pub async fn remove_from_library(&self, user_id: &str, paper_id: &str) -> Result<MessageResponse> {
        if !self.library.delete(&UserPaper::key(user_id, paper_id)).await? {
            return Err(AppError::NotFound("Paper not found in library".into()));
        }
        tracing::info!(user_id = user_id, paper_id = paper_id, "Paper removed from library");
        Ok(MessageResponse::new("Paper removed from library"))
    }

    /// AI 摘要视图
    ///
    /// 处理中返回 202，失败返回 500，已完成但没有摘要返回 404。
    pub async fn summary(&self, user_id: &str, paper_id: &str) -> Result<PaperSummaryResponse> {
        let (paper, _) = self.accessible(user_id, paper_id).await?;
        match paper.processing_status {
            ProcessingStatus::Pending | ProcessingStatus::Processing => Err(AppError::Accepted(
                "Paper is still being processed".into(),
            )),
            ProcessingStatus::Failed => Err(AppError::Internal(format!(
                "Paper processing failed: {}",
                paper.processing_error.as_deref().unwrap_or("unknown error")
            ))),
            ProcessingStatus::Completed => {
                let summary = paper
                    .summary
                    .clone()
                    .ok_or_else(|| AppError::NotFound("Summary not available".into()))?;
                Ok(PaperSummaryResponse {
                    paper_id: paper.id.clone(),
                    title: paper.title.clone(),
                    summary,
                    key_insights: paper.key_insights.clone(),
                    methodology: paper.methodology.clone(),
                    limitations: paper.limitations.clone(),
                    contributions: paper.contributions.clone(),
                    processed_at: paper.processed_at,
                })
            }
        }
    }

    /// 重新提交处理任务
    pub async fn reprocess(&self, user_id: &str, paper_id: &str) -> Result<ReprocessResponse> {
        let (mut paper, _) = self.accessible(user_id, paper_id).await?;
        if paper.processing_status == ProcessingStatus::Processing {
            return Err(AppError::Conflict("Paper is already being processed".into()));
        }
        paper.processing_status = ProcessingStatus::Pending;
        paper.processing_error = None;
        paper.touch();
        self.papers.save(&paper).await?;

        let job = self
            .dispatcher
            .submit(
                "process_paper",
                serde_json::json!({ "paper_id": paper.id, "user_id": user_id }),
            )
            .await?;
        Ok(ReprocessResponse {
            paper_id: paper.id,
            task_id: job.id,
            message: "Paper queued for reprocessing".into(),
        })
    }

    /// 书库内检索
    pub async fn search(&self, user_id: &str, request: &PaperSearchRequest) -> Result<PaperSearchResponse> {
        request.validate()?;
        let started = Instant::now();
        let needle = request.query.trim().to_lowercase();

        let entries = self.library.find(&Filter::new().eq("user_id", user_id)).await?;
        let mut matches: Vec<(Paper, UserPaper)> = self
            .with_papers(entries)
            .await?
            .into_iter()
            .filter(|(paper, _)| paper_matches(paper, &needle))
            .filter(|(paper, _)| {
                request
                    .filters
                    .as_ref()
                    .is_none_or(|filters| passes_filters(paper, filters))
            })
            .collect();

        sort_papers(&mut matches, &request.sort_by, SortOrder::parse(&request.sort_order));

        let page = PageParams::new(request.page, request.per_page);
        let total = matches.len();
        let papers = page
            .slice(matches)
            .iter()
            .map(|(paper, entry)| LibraryPaperResponse::new(paper, entry))
            .collect();

        let took_ms = started.elapsed().as_millis() as u64;
        tracing::info!(user_id = user_id, query = %request.query, total = total, took_ms = took_ms, "Paper search completed");
        Ok(PaperSearchResponse {
            papers,
            pagination: page.info(total),
            query: request.query.clone(),
            took_ms,
        })
    }

    /// 批量导入，逐个 URL 记录成功或失败
    pub async fn bulk_add(&self, user_id: &str, request: &BulkAddRequest) -> Result<BulkAddResponse> {
        request.validate()?;
        let mut results = Vec::with_capacity(request.urls.len());

        for url in &request.urls {
            let result = match self
                .process_paper_from_url(url, user_id, request.tags.as_deref(), None)
                .await
            {
                Ok((paper, is_new, _)) => BulkItemResult {
                    url: url.clone(),
                    success: true,
                    paper_id: Some(paper.id),
                    is_new: Some(is_new),
                    error: None,
                },
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Bulk add failed for URL");
                    BulkItemResult {
                        url: url.clone(),
                        success: false,
                        paper_id: None,
                        is_new: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            results.push(result);
        }

        let succeeded = results.iter().filter(|r| r.success).count();
        Ok(BulkAddResponse {
            total: results.len(),
            failed: results.len() - succeeded,
            succeeded,
            results,
        })
    }

    /// 用户论文统计
    pub async fn user_stats(&self, user_id: &str) -> Result<PaperStatsResponse> {
        let entries = self.library.find(&Filter::new().eq("user_id", user_id)).await?;
        let count = |status: ReadingStatus| entries.iter().filter(|e| e.status == status).count() as u64;
        Ok(PaperStatsResponse {
            total_papers: entries.len() as u64,
            reading: count(ReadingStatus::Reading),
            completed: count(ReadingStatus::Completed),
            saved: count(ReadingStatus::Saved),
            archived: count(ReadingStatus::Archived),
            total_reading_time: entries.iter().map(|e| e.time_spent).sum(),
        })
    }

    /// 推荐（优先读缓存）
    pub async fn recommendations(&self, user_id: &str, limit: usize) -> Result<Vec<Recommendation>> {
        let key = recommendation_cache_key(user_id);
        match self.cache.get(&key).await {
            Ok(Some(cached)) => match serde_json::from_str::<Vec<Recommendation>>(&cached) {
                Ok(mut recommendations) => {
                    recommendations.truncate(limit);
                    return Ok(recommendations);
                }
                Err(e) => tracing::warn!(error = %e, "Discarding unreadable cached recommendations"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Recommendation cache lookup failed"),
        }

        let mut recommendations = self.refresh_recommendations(user_id).await?;
        recommendations.truncate(limit);
        Ok(recommendations)
    }

    /// 重新计算推荐并写入缓存
    pub async fn refresh_recommendations(&self, user_id: &str) -> Result<Vec<Recommendation>> {
        let recommendations = self
            .compute_recommendations(user_id, RECOMMENDATION_LIMIT)
            .await?;
        let payload = serde_json::to_string(&recommendations)?;
        if let Err(e) = self.cache.set_ex(&recommendation_cache_key(user_id), &payload, RECOMMENDATION_TTL).await {
            tracing::warn!(error = %e, "Failed to cache recommendations");
        }
        Ok(recommendations)
    }

    /// 计算推荐
    ///
    /// 没有读完的论文时推荐热门论文；否则推荐与已读论文关键词重叠、且不在书库中的论文。
    pub async fn compute_recommendations(&self, user_id: &str, limit: usize) -> Result<Vec<Recommendation>> {
        let entries = self.library.find(&Filter::new().eq("user_id", user_id)).await?;
        let owned: HashSet<&str> = entries.iter().map(|e| e.paper_id.as_str()).collect();
        let completed: Vec<UserPaper> = entries
            .iter()
            .filter(|e| e.status == ReadingStatus::Completed)
            .cloned()
            .collect();

        let candidates = self
            .papers
            .find(
                &Filter::new()
                    .order_by("citation_count", SortOrder::Desc)
                    .limit(CANDIDATE_SCAN_LIMIT),
            )
            .await?;

        if completed.is_empty() {
            return Ok(candidates
                .iter()
                .filter(|p| !owned.contains(p.id.as_str()))
                .take(limit)
                .map(|p| recommendation(p, 0.5, "Popular paper in the community", "popular"))
                .collect());
        }

        let keywords: HashSet<String> = self
            .with_papers(completed)
            .await?
            .iter()
            .flat_map(|(paper, _)| paper.keywords.iter().map(|k| k.to_lowercase()))
            .collect();
        if keywords.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, &Paper)> = candidates
            .iter()
            .filter(|p| !owned.contains(p.id.as_str()))
            .map(|p| {
                let overlap = p
                    .keywords
                    .iter()
                    .filter(|k| keywords.contains(&k.to_lowercase()))
                    .count();
                (overlap, p)
            })
            .filter(|(overlap, _)| *overlap > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, p)| recommendation(p, 0.7, "Similar to your reading interests", "similar_topic"))
            .collect())
    }

    /// 上传校验：扩展名白名单与大小限制（不解析文件内容）
    pub fn validate_upload(&self, filename: &str, size: usize) -> Result<UploadResponse> {
        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .ok_or_else(|| AppError::Validation("File has no extension".into()))?;
        if !self
            .sources
            .allowed_file_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&extension))
        {
            return Err(AppError::Validation(format!(
                "File type not allowed. Allowed: {}",
                self.sources.allowed_file_types.join(", ")
            )));
        }
        if size == 0 {
            return Err(AppError::Validation("Uploaded file is empty".into()));
        }
        if size > self.sources.upload_max_size {
            return Err(AppError::PayloadTooLarge(format!(
                "File too large. Maximum size: {} bytes",
                self.sources.upload_max_size
            )));
        }

        Ok(UploadResponse {
            filename: filename.to_string(),
            size,
            message: "File validated; PDF processing is not available, submit the paper URL instead".into(),
        })
    }
}

#[allow(clippy::too_many_arguments)]
pub fn create_paper_service(
    store: Arc<dyn DocumentStore>,
    extractor: MetadataExtractor,
    analyzer: AiAnalyzer,
    dispatcher: TaskDispatcher,
    cache: Arc<dyn Cache>,
    metrics: Arc<AppMetrics>,
    sources: SourcesConfig,
) -> PaperService {
    PaperService::new(store, extractor, analyzer, dispatcher, cache, metrics, sources)
}

fn recommendation(paper: &Paper, score: f64, reason: &str, kind: &str) -> Recommendation {
    Recommendation {
        paper_id: paper.id.clone(),
        title: paper.title.clone(),
        authors: paper.author_names(),
        publication_year: paper.publication_year,
        score,
        reason: reason.into(),
        recommendation_type: kind.into(),
    }
}

/// 标题、摘要或关键词包含查询词（不区分大小写）
pub fn paper_matches(paper: &Paper, needle_lower: &str) -> bool {
    needle_lower.is_empty()
        || paper.title.to_lowercase().contains(needle_lower)
        || paper
            .r#abstract
            .as_deref()
            .is_some_and(|a| a.to_lowercase().contains(needle_lower))
        || paper
            .keywords
            .iter()
            .any(|k| k.to_lowercase().contains(needle_lower))
}

fn passes_filters(paper: &Paper, filters: &PaperSearchFilters) -> bool {
    if filters.publication_year.is_some() && paper.publication_year != filters.publication_year {
        return false;
    }
    if let Some(source) = &filters.source {
        if !paper.source.to_string().eq_ignore_ascii_case(source) {
            return false;
        }
    }
    if let Some(journal) = &filters.journal {
        let journal = journal.to_lowercase();
        if !paper
            .journal
            .as_deref()
            .is_some_and(|j| j.to_lowercase().contains(&journal))
        {
            return false;
        }
    }
    if let Some(authors) = filters.authors.as_ref().filter(|a| !a.is_empty()) {
        let wanted: Vec<String> = authors.iter().map(|a| a.to_lowercase()).collect();
        if !paper
            .authors
            .iter()
            .any(|a| wanted.iter().any(|w| a.name.to_lowercase().contains(w)))
        {
            return false;
        }
    }
    if let Some(has_pdf) = filters.has_pdf {
        if paper.pdf_url.is_some() != has_pdf {
            return false;
        }
    }
    if filters.citation_count_min.is_some_and(|min| paper.citation_count < min) {
        return false;
    }
    if filters.citation_count_max.is_some_and(|max| paper.citation_count > max) {
        return false;
    }
    true
}

fn sort_papers(items: &mut [(Paper, UserPaper)], sort_by: &str, order: SortOrder) {
    let compare = |a: &Paper, b: &Paper| -> Ordering {
        match sort_by {
            "date" => a
                .publication_date
                .unwrap_or(a.created_at)
                .cmp(&b.publication_date.unwrap_or(b.created_at)),
            "citations" => a.citation_count.cmp(&b.citation_count),
            "title" => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
            _ => a
                .influence_score
                .partial_cmp(&b.influence_score)
                .unwrap_or(Ordering::Equal),
        }
    };
    items.sort_by(|(a, _), (b, _)| match order {
        SortOrder::Asc => compare(a, b),
        SortOrder::Desc => compare(b, a),
    });
}
