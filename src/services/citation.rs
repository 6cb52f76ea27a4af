//! 引用服务
//!
//! 引用网络遍历、施引与参考文献列表、影响力指标、研究空白与引用计数维护。

use chrono::{Datelike, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use validator::Validate;

use crate::api::dto::{
    AddCitationRequest, CitationLink, CitationListResponse, CitationNetwork, InfluenceMetrics,
    NetworkEdge, NetworkNode, ResearchGap, ResearchGapsResponse,
};
use crate::ai::truncate_chars;
use crate::error::{AppError, Result};
use crate::models::{Citation, Paper, ProcessingStatus, UserPaper};
use crate::storage::{Collection, DocumentStore, Filter, SortOrder};

/// 边上下文的最大字符数
const EDGE_CONTEXT_CHARS: usize = 100;

/// 被引用超过该次数才算研究空白
const GAP_CITATION_THRESHOLD: usize = 5;

const MAX_GAPS: usize = 10;

/// 遍历深度上限
const MAX_NETWORK_DEPTH: usize = 5;

/// 节点数上限
const MAX_NETWORK_PAPERS: usize = 500;

/// 引用计数折算为影响力的系数
const INFLUENCE_PER_CITATION: f64 = 0.1;

#[derive(Clone)]
pub struct CitationService {
    citations: Collection<Citation>,
    papers: Collection<Paper>,
    library: Collection<UserPaper>,
}

impl CitationService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            citations: Collection::new(store.clone()),
            papers: Collection::new(store.clone()),
            library: Collection::new(store),
        }
    }

    async fn paper(&self, paper_id: &str) -> Result<Paper> {
        self.papers
            .get(paper_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Paper not found: {}", paper_id)))
    }

    async fn citing(&self, paper_id: &str) -> Result<Vec<Citation>> {
        self.citations
            .find(&Filter::new().eq("cited_paper_id", paper_id))
            .await
    }

    async fn cited_by(&self, paper_id: &str) -> Result<Vec<Citation>> {
        self.citations
            .find(&Filter::new().eq("citing_paper_id", paper_id))
            .await
    }

    /// 以中心论文为起点，双向广度优先构建引用网络
    pub async fn build_citation_network(
        &self,
        center_paper_id: &str,
        depth: usize,
        max_papers: usize,
    ) -> Result<CitationNetwork> {
        let depth = depth.min(MAX_NETWORK_DEPTH);
        let max_papers = max_papers.clamp(1, MAX_NETWORK_PAPERS);
        let center = self.paper(center_paper_id).await?;
        tracing::info!(paper_id = center_paper_id, depth = depth, "Building citation network");

        let mut nodes: Vec<NetworkNode> = Vec::new();
        let mut node_ids: HashSet<String> = HashSet::new();
        let mut edges: HashMap<String, Citation> = HashMap::new();
        let mut queue: VecDeque<(String, usize)> = VecDeque::from([(center.id.clone(), 0)]);

        while let Some((paper_id, level)) = queue.pop_front() {
            if nodes.len() >= max_papers {
                break;
            }
            if node_ids.contains(&paper_id) {
                continue;
            }
            let paper = if paper_id == center.id {
                center.clone()
            } else {
                match self.papers.get(&paper_id).await? {
                    Some(paper) => paper,
                    None => continue,
                }
            };

            node_ids.insert(paper_id.clone());
            nodes.push(NetworkNode {
                paper_id: paper.id.clone(),
                title: paper.title.clone(),
                authors: paper.author_names(),
                year: paper.publication_year,
                citation_count: paper.citation_count,
                influence_score: paper.influence_score,
                is_center: paper.id == center.id,
                depth: level,
            });

            if level >= depth {
                continue;
            }
            let incoming = self.citing(&paper_id).await?;
            let outgoing = self.cited_by(&paper_id).await?;
            for citation in incoming.into_iter().chain(outgoing) {
                let neighbour = if citation.cited_paper_id == paper_id {
                    citation.citing_paper_id.clone()
                } else {
                    citation.cited_paper_id.clone()
                };
                if !node_ids.contains(&neighbour) {
                    queue.push_back((neighbour, level + 1));
                }
                edges.entry(citation.id.clone()).or_insert(citation);
            }
        }

        let mut edges: Vec<NetworkEdge> = edges
            .into_values()
            .filter(|c| node_ids.contains(&c.citing_paper_id) && node_ids.contains(&c.cited_paper_id))
            .map(|c| NetworkEdge {
                source: c.citing_paper_id,
                target: c.cited_paper_id,
                context: c
                    .context
                    .as_deref()
                    .map(|ctx| truncate_chars(ctx, EDGE_CONTEXT_CHARS).to_string()),
                sentiment: c.sentiment,
                strength: c.strength,
            })
            .collect();
        edges.sort_by(|a, b| (&a.source, &a.target).cmp(&(&b.source, &b.target)));

        tracing::info!(nodes = nodes.len(), edges = edges.len(), "Citation network built");
        Ok(CitationNetwork {
            center_paper_id: center.id,
            total_nodes: nodes.len(),
            total_edges: edges.len(),
            nodes,
            edges,
            depth,
        })
    }

    async fn links(&self, citations: Vec<Citation>, incoming: bool, limit: usize) -> Result<Vec<CitationLink>> {
        let mut links = Vec::new();
        for citation in citations.into_iter().take(limit) {
            let other = if incoming {
                &citation.citing_paper_id
            } else {
                &citation.cited_paper_id
            };
            if let Some(paper) = self.papers.get(other).await? {
                links.push(CitationLink {
                    paper_id: paper.id.clone(),
                    title: paper.title.clone(),
                    authors: paper.author_names(),
                    year: paper.publication_year,
                    citation_count: paper.citation_count,
                    context: citation.context,
                    section: citation.section,
                    sentiment: citation.sentiment,
                });
            }
        }
        Ok(links)
    }

    /// 引用了该论文的论文
    pub async fn citing_papers(&self, paper_id: &str, limit: usize) -> Result<CitationListResponse> {
        self.paper(paper_id).await?;
        let papers = self.links(self.citing(paper_id).await?, true, limit).await?;
        Ok(CitationListResponse {
            paper_id: paper_id.to_string(),
            total: papers.len(),
            papers,
        })
    }

    /// 该论文引用的论文
    pub async fn referenced_papers(&self, paper_id: &str, limit: usize) -> Result<CitationListResponse> {
        self.paper(paper_id).await?;
        let papers = self.links(self.cited_by(paper_id).await?, false, limit).await?;
        Ok(CitationListResponse {
            paper_id: paper_id.to_string(),
            total: papers.len(),
            papers,
        })
    }

    /// 影响力指标
    ///
    /// influence = min((direct×0.5 + second_order×0.3 + h×0.2) / 100, 1.0)
    pub async fn influence_metrics(&self, paper_id: &str) -> Result<InfluenceMetrics> {
        let paper = self.paper(paper_id).await?;
        let direct = self.citing(paper_id).await?;

        let citing_ids: Vec<String> = direct.iter().map(|c| c.citing_paper_id.clone()).collect();
        let second_order = if citing_ids.is_empty() {
            0
        } else {
            self.citations
                .count(&Filter::new().any_of("cited_paper_id", citing_ids.clone()))
                .await? as usize
        };

        let mut citing_counts = Vec::with_capacity(citing_ids.len());
        for id in &citing_ids {
            if let Some(citing) = self.papers.get(id).await? {
                citing_counts.push(citing.citation_count);
            }
        }
        let h = h_index(citing_counts);
        let direct_count = direct.len();

        let influence_score = ((direct_count as f64 * 0.5 + second_order as f64 * 0.3 + h as f64 * 0.2)
            / 100.0)
            .min(1.0);

        let age_years = paper
            .publication_date
            .map(|date| (Utc::now() - date).num_days() / 365)
            .or_else(|| paper.publication_year.map(|year| i64::from(Utc::now().year() - year)))
            .unwrap_or(0);
        let citation_rate_per_year = if age_years > 0 {
            direct_count as f64 / age_years as f64
        } else {
            0.0
        };

        Ok(InfluenceMetrics {
            paper_id: paper.id,
            direct_citations: direct_count,
            second_order_citations: second_order,
            h_index: h,
            influence_score,
            citation_rate_per_year,
        })
    }

    /// 研究空白：被引用超过 5 次、但不在用户书库中的论文
    pub async fn research_gaps(&self, user_id: &str) -> Result<ResearchGapsResponse> {
        let owned: HashSet<String> = self
            .library
            .find(&Filter::new().eq("user_id", user_id))
            .await?
            .into_iter()
            .map(|e| e.paper_id)
            .collect();
        if owned.is_empty() {
            return Ok(ResearchGapsResponse {
                gaps: Vec::new(),
                total: 0,
            });
        }

        let mut counts: HashMap<String, usize> = HashMap::new();
        for citation in self.citations.find(&Filter::new()).await? {
            *counts.entry(citation.cited_paper_id).or_insert(0) += 1;
        }
        let mut frequent: Vec<(String, usize)> = counts
            .into_iter()
            .filter(|(id, count)| *count > GAP_CITATION_THRESHOLD && !owned.contains(id))
            .collect();
        frequent.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut gaps = Vec::new();
        for (paper_id, count) in frequent {
            if gaps.len() >= MAX_GAPS {
                break;
            }
            if let Some(paper) = self.papers.get(&paper_id).await? {
                gaps.push(ResearchGap {
                    paper_id,
                    title: paper.title.clone(),
                    authors: paper.author_names(),
                    year: paper.publication_year,
                    citation_count: count,
                    reason: "Highly cited paper in your research area".into(),
                });
            }
        }
        Ok(ResearchGapsResponse {
            total: gaps.len(),
            gaps,
        })
    }

    /// 添加引用关系（不允许自引，同一对论文只能有一条）
    pub async fn add_citation(&self, request: &AddCitationRequest) -> Result<Citation> {
        request.validate()?;
        if request.citing_paper_id == request.cited_paper_id {
            return Err(AppError::Validation("A paper cannot cite itself".into()));
        }
        self.paper(&request.citing_paper_id).await?;
        self.paper(&request.cited_paper_id).await?;

        let mut citation = Citation::new(&request.citing_paper_id, &request.cited_paper_id);
        citation.context = request.context.clone();
        citation.section = request.section.clone();
        citation.sentiment = request.sentiment.clone();
        if let Some(strength) = request.strength {
            citation.strength = strength;
        }

        self.citations.create(&citation).await.map_err(|e| match e {
            AppError::Conflict(_) => AppError::Conflict("Citation already exists".into()),
            other => other,
        })?;
        self.refresh_metrics(&request.cited_paper_id).await?;

        tracing::info!(
            citing = %citation.citing_paper_id,
            cited = %citation.cited_paper_id,
            "Citation added"
        );
        Ok(citation)
    }

    /// 重新计算单篇论文的引用数与影响力：influence = min(count × 0.1, 1.0)
    pub async fn refresh_metrics(&self, paper_id: &str) -> Result<(u64, f64)> {
        let mut paper = self.paper(paper_id).await?;
        let count = self
            .citations
            .count(&Filter::new().eq("cited_paper_id", paper_id))
            .await?;
        paper.citation_count = count;
        paper.influence_score = (count as f64 * INFLUENCE_PER_CITATION).min(1.0);
        paper.touch();
        self.papers.save(&paper).await?;
        Ok((paper.citation_count, paper.influence_score))
    }

    /// 批量更新已完成论文的引用指标，返回更新数量
    pub async fn update_paper_metrics(&self, limit: usize) -> Result<usize> {
        let papers = self
            .papers
            .find(
                &Filter::new()
                    .eq("processing_status", ProcessingStatus::Completed.to_string())
                    .order_by("updated_at", SortOrder::Asc)
                    .limit(limit),
            )
            .await?;

        let mut updated = 0;
        for paper in papers {
            match self.refresh_metrics(&paper.id).await {
                Ok(_) => updated += 1,
                Err(e) => tracing::warn!(paper_id = %paper.id, error = %e, "Failed to update paper metrics"),
            }
        }
        tracing::info!(updated = updated, "Paper metrics updated");
        Ok(updated)
    }
}

/// 最大的 h，使得至少 h 篇施引论文各自被引用至少 h 次
pub fn h_index(mut counts: Vec<u64>) -> usize {
    counts.sort_unstable_by(|a, b| b.cmp(a));
    counts
        .iter()
        .enumerate()
        .take_while(|(i, count)| **count >= (*i as u64 + 1))
        .count()
}

pub fn create_citation_service(store: Arc<dyn DocumentStore>) -> CitationService {
    CitationService::new(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaperSource;
    use crate::storage::MemoryStore;
    use rstest::rstest;

    struct Fixture {
        service: CitationService,
        papers: Collection<Paper>,
        library: Collection<UserPaper>,
    }

    fn fixture() -> Fixture {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        Fixture {
            service: CitationService::new(store.clone()),
            papers: Collection::new(store.clone()),
            library: Collection::new(store),
        }
    }

    async fn add_paper(f: &Fixture, id: &str) {
        let mut paper = Paper::new(format!("Paper {}", id), PaperSource::Url);
        paper.id = id.to_string();
        paper.processing_status = ProcessingStatus::Completed;
        f.papers.create(&paper).await.unwrap();
    }

    async fn cite(f: &Fixture, citing: &str, cited: &str) {
        f.service
            .add_citation(&AddCitationRequest {
                citing_paper_id: citing.into(),
                cited_paper_id: cited.into(),
                context: Some("x".repeat(150)),
                section: None,
                sentiment: Some("positive".into()),
                strength: None,
            })
            .await
            .unwrap();
    }

    #[rstest]
    #[case(vec![], 0)]
    #[case(vec![0, 0], 0)]
    #[case(vec![10, 8, 5, 4, 3], 4)]
    #[case(vec![1, 1, 1], 1)]
    #[case(vec![25, 8, 5, 3, 3], 3)]
    fn test_h_index(#[case] counts: Vec<u64>, #[case] expected: usize) {
        assert_eq!(h_index(counts), expected);
    }

    #[tokio::test]
    async fn test_network_respects_depth_and_truncates_context() {
        let f = fixture();
        for id in ["a", "b", "c", "d"] {
            add_paper(&f, id).await;
        }
        // b -> a, a -> c, c -> d
        cite(&f, "b", "a").await;
        cite(&f, "a", "c").await;
        cite(&f, "c", "d").await;

        let network = f.service.build_citation_network("a", 1, 50).await.unwrap();
        assert_eq!(network.total_nodes, 3);
        assert_eq!(network.total_edges, 2);
        assert!(network.nodes.iter().any(|n| n.paper_id == "a" && n.is_center));
        assert!(network.edges.iter().all(|e| e.context.as_ref().unwrap().chars().count() == 100));

        let deep = f.service.build_citation_network("a", 2, 50).await.unwrap();
        assert_eq!(deep.total_nodes, 4);
        assert_eq!(deep.total_edges, 3);

        let capped = f.service.build_citation_network("a", 2, 2).await.unwrap();
        assert_eq!(capped.total_nodes, 2);
        assert_eq!(capped.total_edges, 1);
    }

    #[tokio::test]
    async fn test_add_citation_rules_and_metrics() {
        let f = fixture();
        add_paper(&f, "a").await;
        add_paper(&f, "b").await;

        let self_cite = AddCitationRequest {
            citing_paper_id: "a".into(),
            cited_paper_id: "a".into(),
            context: None,
            section: None,
            sentiment: None,
            strength: None,
        };
        assert!(matches!(
            f.service.add_citation(&self_cite).await,
            Err(AppError::Validation(_))
        ));

        cite(&f, "b", "a").await;
        let duplicate = AddCitationRequest {
            citing_paper_id: "b".into(),
            cited_paper_id: "a".into(),
            ..self_cite
        };
        assert!(matches!(
            f.service.add_citation(&duplicate).await,
            Err(AppError::Conflict(_))
        ));

        let paper = f.papers.get("a").await.unwrap().unwrap();
        assert_eq!(paper.citation_count, 1);
        assert!((paper.influence_score - 0.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_influence_metrics() {
        let f = fixture();
        for id in ["a", "b", "c", "d"] {
            add_paper(&f, id).await;
        }
        cite(&f, "b", "a").await;
        cite(&f, "c", "a").await;
        cite(&f, "d", "b").await;

        let metrics = f.service.influence_metrics("a").await.unwrap();
        assert_eq!(metrics.direct_citations, 2);
        assert_eq!(metrics.second_order_citations, 1);
        assert_eq!(metrics.h_index, 1);
        let expected = (2.0 * 0.5 + 1.0 * 0.3 + 1.0 * 0.2) / 100.0;
        assert!((metrics.influence_score - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_research_gaps() {
        let f = fixture();
        add_paper(&f, "hub").await;
        add_paper(&f, "mine").await;
        for i in 0..6 {
            let id = format!("c{}", i);
            add_paper(&f, &id).await;
            cite(&f, &id, "hub").await;
        }

        assert!(f.service.research_gaps("u1").await.unwrap().gaps.is_empty());

        f.library.create(&UserPaper::new("u1", "mine")).await.unwrap();
        let gaps = f.service.research_gaps("u1").await.unwrap();
        assert_eq!(gaps.total, 1);
        assert_eq!(gaps.gaps[0].paper_id, "hub");
        assert_eq!(gaps.gaps[0].citation_count, 6);

        f.library.create(&UserPaper::new("u1", "hub")).await.unwrap();
        assert!(f.service.research_gaps("u1").await.unwrap().gaps.is_empty());
    }

    #[tokio::test]
    async fn test_update_paper_metrics() {
        let f = fixture();
        add_paper(&f, "a").await;
        add_paper(&f, "b").await;
        cite(&f, "b", "a").await;

        assert_eq!(f.service.update_paper_metrics(100).await.unwrap(), 2);
        let a = f.papers.get("a").await.unwrap().unwrap();
        assert_eq!(a.citation_count, 1);
    }
}
