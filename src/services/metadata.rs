//! 论文元数据抽取
//!
//! 根据 URL 识别来源：
//!
//! - `arxiv.org/abs/<id>`: arXiv Atom 接口
//! - `pubmed.ncbi.nlm.nih.gov/<pmid>`: NCBI esummary JSON 接口
//! - 以 `.pdf` 结尾: 仅记录 PDF 地址（不解析 PDF）
//! - 其他: 抓取网页，读取 `<title>` 与 `citation_*` meta 标签

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

use crate::config::config::SourcesConfig;
use crate::error::{AppError, Result};
use crate::models::{Author, Paper, PaperSource};

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
const ARXIV_NS: &str = "http://arxiv.org/schemas/atom";

/// 网页抓取失败时使用的标题
pub const FALLBACK_TITLE: &str = "Academic Paper";

/// PDF 链接使用的标题
pub const PDF_TITLE: &str = "PDF Document";

static ARXIV_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"arxiv\.org/(?:abs|pdf)/([^?#\s]+)").expect("valid regex"));
static PUBMED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"pubmed\.ncbi\.nlm\.nih\.gov/(\d+)").expect("valid regex"));
static DOI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"doi\.org/(10\.\d{4,9}/[^\s?#]+)").expect("valid regex"));
static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid regex"));
static META_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<meta\s[^>]*>").expect("valid regex"));
static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)([a-z_:-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid regex")
});
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// 抽取出的论文元数据
#[derive(Debug, Clone, PartialEq)]
pub struct PaperMetadata {
    pub source: PaperSource,
    pub title: String,
    pub r#abstract: Option<String>,
    pub authors: Vec<Author>,
    pub keywords: Vec<String>,
    pub journal: Option<String>,
    pub doi: Option<String>,
    pub arxiv_id: Option<String>,
    pub pmid: Option<String>,
    pub publication_date: Option<DateTime<Utc>>,
    pub publication_year: Option<i32>,
    pub pdf_url: Option<String>,
}

impl PaperMetadata {
    fn new(source: PaperSource, title: impl Into<String>) -> Self {
        Self {
            source,
            title: title.into(),
            r#abstract: None,
            authors: Vec::new(),
            keywords: Vec::new(),
            journal: None,
            doi: None,
            arxiv_id: None,
            pmid: None,
            publication_date: None,
            publication_year: None,
            pdf_url: None,
        }
    }

    /// 由元数据构造待处理的论文
    pub fn into_paper(self, url: &str) -> Paper {
        let mut paper = Paper::new(self.title, self.source);
        paper.r#abstract = self.r#abstract.filter(|a| !a.is_empty());
        paper.authors = self.authors;
        paper.keywords = self.keywords;
        paper.journal = self.journal.filter(|j| !j.is_empty());
        paper.doi = self.doi;
        paper.arxiv_id = self.arxiv_id;
        paper.pmid = self.pmid;
        paper.publication_year = self
            .publication_year
            .or_else(|| self.publication_date.map(|d| d.year()));
        paper.publication_date = self.publication_date;
        paper.pdf_url = self.pdf_url;
        paper.url = Some(url.to_string());
        paper
    }
}

/// URL 对应的来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Arxiv(String),
    Pubmed(String),
    Pdf,
    Web,
}

/// 识别 URL 来源
pub fn detect_source(url: &str) -> SourceKind {
    if let Some(caps) = ARXIV_RE.captures(url) {
        let id = caps[1].trim_end_matches('/').trim_end_matches(".pdf");
        return SourceKind::Arxiv(id.to_string());
    }
    if let Some(caps) = PUBMED_RE.captures(url) {
        return SourceKind::Pubmed(caps[1].to_string());
    }
    let path = url.split(['?', '#']).next().unwrap_or(url);
    if path.to_lowercase().ends_with(".pdf") {
        return SourceKind::Pdf;
    }
    SourceKind::Web
}

/// URL 中的 DOI（doi.org 链接）
pub fn doi_from_url(url: &str) -> Option<String> {
    DOI_RE.captures(url).map(|c| c[1].to_string())
}

/// 元数据抽取器
#[derive(Clone)]
pub struct MetadataExtractor {
    client: reqwest::Client,
    arxiv_api_base: String,
    pubmed_api_base: String,
}

impl MetadataExtractor {
    pub fn new(config: &SourcesConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout))
            .user_agent(concat!("scholarly/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            arxiv_api_base: config.arxiv_api_base.clone(),
            pubmed_api_base: config.pubmed_api_base.clone(),
        })
    }

    /// 抽取元数据；arXiv 与 PubMed 的接口错误会向上返回，网页抓取失败则降级
    pub async fn extract(&self, url: &str) -> Result<PaperMetadata> {
        let mut metadata = match detect_source(url) {
            SourceKind::Arxiv(id) => self.fetch_arxiv(&id).await?,
            SourceKind::Pubmed(pmid) => self.fetch_pubmed(&pmid).await?,
            SourceKind::Pdf => {
                let mut metadata = PaperMetadata::new(PaperSource::PdfUpload, PDF_TITLE);
                metadata.pdf_url = Some(url.to_string());
                metadata
            }
            SourceKind::Web => match self.fetch_html(url).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    tracing::warn!(url = url, error = %e, "Failed to extract page metadata");
                    PaperMetadata::new(PaperSource::Url, FALLBACK_TITLE)
                }
            },
        };

        if metadata.doi.is_none() {
            metadata.doi = doi_from_url(url);
        }
        if metadata.title.trim().is_empty() {
            metadata.title = FALLBACK_TITLE.to_string();
        }
        tracing::debug!(url = url, source = %metadata.source, title = %metadata.title, "Extracted metadata");
        Ok(metadata)
    }

    async fn get_text(&self, url: &str, query: &[(&str, &str)]) -> Result<String> {
        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Upstream(format!(
                "Metadata request to {} failed with status {}",
                url, status
            )));
        }
        Ok(response.text().await?)
    }

    async fn fetch_arxiv(&self, arxiv_id: &str) -> Result<PaperMetadata> {
        let xml = self
            .get_text(&self.arxiv_api_base, &[("id_list", arxiv_id)])
            .await?;
        let mut metadata = parse_arxiv_atom(&xml)?;
        metadata.arxiv_id = Some(arxiv_id.to_string());
        metadata.pdf_url = Some(format!("https://arxiv.org/pdf/{}.pdf", arxiv_id));
        Ok(metadata)
    }

    async fn fetch_pubmed(&self, pmid: &str) -> Result<PaperMetadata> {
        let body = self
            .get_text(
                &self.pubmed_api_base,
                &[("db", "pubmed"), ("id", pmid), ("retmode", "json")],
            )
            .await?;
        let data: serde_json::Value = serde_json::from_str(&body)?;
        parse_pubmed_summary(&data, pmid)
    }

    async fn fetch_html(&self, url: &str) -> Result<PaperMetadata> {
        let html = self.get_text(url, &[]).await?;
        Ok(parse_html_metadata(&html))
    }
}

fn clean_text(text: &str) -> String {
    WHITESPACE_RE.replace_all(text.trim(), " ").into_owned()
}

/// 解析 arXiv Atom 响应中的第一个 entry
pub fn parse_arxiv_atom(xml: &str) -> Result<PaperMetadata> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| AppError::Upstream(format!("Invalid arXiv response: {}", e)))?;

    let entry = doc
        .descendants()
        .find(|n| n.has_tag_name((ATOM_NS, "entry")))
        .ok_or_else(|| AppError::NotFound("No entry found in arXiv response".into()))?;

    let child_text = |name: &str| {
        entry
            .children()
            .find(|n| n.has_tag_name((ATOM_NS, name)))
            .and_then(|n| n.text())
            .map(clean_text)
    };

    let mut metadata = PaperMetadata::new(PaperSource::Arxiv, child_text("title").unwrap_or_default());
    metadata.r#abstract = child_text("summary");
    metadata.authors = entry
        .children()
        .filter(|n| n.has_tag_name((ATOM_NS, "author")))
        .filter_map(|author| {
            author
                .children()
                .find(|n| n.has_tag_name((ATOM_NS, "name")))
                .and_then(|n| n.text())
        })
        .map(|name| Author::new(clean_text(name)))
        .collect();
    metadata.keywords = entry
        .children()
        .filter(|n| n.has_tag_name((ATOM_NS, "category")) || n.has_tag_name((ARXIV_NS, "primary_category")))
        .filter_map(|n| n.attribute("term"))
        .fold(Vec::new(), |mut acc: Vec<String>, term| {
            if !acc.iter().any(|t| t == term) {
                acc.push(term.to_string());
            }
            acc
        });
    metadata.doi = entry
        .children()
        .find(|n| n.has_tag_name((ARXIV_NS, "doi")))
        .and_then(|n| n.text())
        .map(clean_text);
    metadata.journal = entry
        .children()
        .find(|n| n.has_tag_name((ARXIV_NS, "journal_ref")))
        .and_then(|n| n.text())
        .map(clean_text);

    if let Some(published) = child_text("published") {
        if let Ok(date) = DateTime::parse_from_rfc3339(&published) {
            let date = date.with_timezone(&Utc);
            metadata.publication_year = Some(date.year());
            metadata.publication_date = Some(date);
        }
    }

    Ok(metadata)
}

/// 解析 esummary JSON 中指定 PMID 的记录
pub fn parse_pubmed_summary(data: &serde_json::Value, pmid: &str) -> Result<PaperMetadata> {
    let record = data
        .get("result")
        .and_then(|r| r.get(pmid))
        .filter(|r| r.get("error").is_none())
        .ok_or_else(|| AppError::NotFound(format!("PubMed record {} not found", pmid)))?;

    let text = |key: &str| {
        record
            .get(key)
            .and_then(|v| v.as_str())
            .map(clean_text)
            .filter(|s| !s.is_empty())
    };

    let mut metadata = PaperMetadata::new(PaperSource::Journal, text("title").unwrap_or_default());
    metadata.authors = record
        .get("authors")
        .and_then(|a| a.as_array())
        .map(|authors| {
            authors
                .iter()
                .filter_map(|a| a.get("name").and_then(|n| n.as_str()))
                .filter(|n| !n.trim().is_empty())
                .map(Author::new)
                .collect()
        })
        .unwrap_or_default();
    metadata.journal = text("source");
    metadata.doi = record
        .get("articleids")
        .and_then(|ids| ids.as_array())
        .and_then(|ids| {
            ids.iter().find(|id| id.get("idtype").and_then(|t| t.as_str()) == Some("doi"))
        })
        .and_then(|id| id.get("value").and_then(|v| v.as_str()))
        .map(str::to_string);
    metadata.pmid = Some(pmid.to_string());
    metadata.publication_date = text("pubdate").and_then(|d| parse_pubmed_date(&d));
    metadata.publication_year = metadata.publication_date.map(|d| d.year());
    Ok(metadata)
}

/// 解析 PubMed 日期：`YYYY`、`YYYY Mon`、`YYYY Mon DD`、`MM/DD/YYYY`
pub fn parse_pubmed_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let date = if value.contains('/') {
        let parts: Vec<&str> = value.split('/').collect();
        match parts.as_slice() {
            [month, day, year, ..] => NaiveDate::from_ymd_opt(
                year.trim().parse().ok()?,
                month.trim().parse().ok()?,
                day.trim().parse().ok()?,
            )?,
            _ => return None,
        }
    } else {
        let mut parts = value.split_whitespace();
        let year: i32 = parts.next()?.parse().ok()?;
        let month = match parts.next() {
            Some(m) => month_from_abbrev(m)?,
            None => 1,
        };
        let day = parts
            .next()
            .and_then(|d| d.parse().ok())
            .unwrap_or(1);
        NaiveDate::from_ymd_opt(year, month, day)?
    };
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

fn month_from_abbrev(value: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let prefix: String = value.chars().take(3).collect::<String>().to_lowercase();
    MONTHS
        .iter()
        .position(|m| *m == prefix)
        .map(|i| i as u32 + 1)
}

fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
}

/// 从 HTML 中读取标题与学术 meta 标签
pub fn parse_html_metadata(html: &str) -> PaperMetadata {
    let mut metadata = PaperMetadata::new(
        PaperSource::Url,
        TITLE_RE
            .captures(html)
            .map(|c| decode_entities(&clean_text(&c[1])))
            .unwrap_or_default(),
    );
    let mut description = None;

    for tag in META_RE.find_iter(html) {
        let mut name = None;
        let mut content = None;
        for attr in ATTR_RE.captures_iter(tag.as_str()) {
            let value = attr.get(2).or_else(|| attr.get(3)).map_or("", |m| m.as_str());
            match attr[1].to_lowercase().as_str() {
                "name" | "property" => name = Some(value.to_lowercase()),
                "content" => content = Some(decode_entities(&clean_text(value))),
                _ => {}
            }
        }
        let (Some(name), Some(content)) = (name, content) else {
            continue;
        };
        if content.is_empty() {
            continue;
        }

        match name.as_str() {
            "citation_title" => metadata.title = content,
            "citation_author" => metadata.authors.push(Author::new(content)),
            "citation_doi" => metadata.doi = Some(content.trim_start_matches("doi:").to_string()),
            "citation_journal_title" => metadata.journal = Some(content),
            "citation_abstract" => metadata.r#abstract = Some(content),
            "citation_keywords" => metadata.keywords.extend(
                content
                    .split([';', ','])
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(str::to_string),
            ),
            "citation_publication_date" | "citation_date" => {
                let year = content.get(..4).and_then(|y| y.parse().ok());
                metadata.publication_year = metadata.publication_year.or(year);
            }
            "description" | "og:description" => {
                description.get_or_insert(content);
            }
            _ => {}
        }
    }

    if metadata.r#abstract.is_none() {
        metadata.r#abstract = description;
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ARXIV_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <entry>
    <id>http://arxiv.org/abs/1706.03762v7</id>
    <published>2017-06-12T17:57:34Z</published>
    <title>Attention Is All
      You Need</title>
    <summary>  The dominant sequence transduction models are based on recurrent networks. </summary>
    <author><name>Ashish Vaswani</name></author>
    <author><name>Noam Shazeer</name></author>
    <arxiv:primary_category term="cs.CL"/>
    <category term="cs.CL"/>
    <category term="cs.LG"/>
  </entry>
</feed>"#;

    fn extractor(base: &str) -> MetadataExtractor {
        MetadataExtractor::new(&SourcesConfig {
            arxiv_api_base: format!("{}/api/query", base),
            pubmed_api_base: format!("{}/esummary.fcgi", base),
            ..Default::default()
        })
        .unwrap()
    }

    #[rstest]
    #[case("https://arxiv.org/abs/1706.03762", SourceKind::Arxiv("1706.03762".into()))]
    #[case("https://arxiv.org/pdf/1706.03762v7.pdf", SourceKind::Arxiv("1706.03762v7".into()))]
    #[case("https://pubmed.ncbi.nlm.nih.gov/31452104/", SourceKind::Pubmed("31452104".into()))]
    #[case("https://example.com/files/paper.PDF?dl=1", SourceKind::Pdf)]
    #[case("https://example.com/article", SourceKind::Web)]
    fn test_detect_source(#[case] url: &str, #[case] expected: SourceKind) {
        assert_eq!(detect_source(url), expected);
    }

    #[rstest]
    #[case("2019", Some((2019, 1, 1)))]
    #[case("2019 Aug", Some((2019, 8, 1)))]
    #[case("2019 Aug 27", Some((2019, 8, 27)))]
    #[case("08/27/2019", Some((2019, 8, 27)))]
    #[case("Summer", None)]
    #[case("", None)]
    fn test_parse_pubmed_date(#[case] input: &str, #[case] expected: Option<(i32, u32, u32)>) {
        let parsed = parse_pubmed_date(input).map(|d| (d.year(), d.month(), d.day()));
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_parse_arxiv_atom() {
        let metadata = parse_arxiv_atom(ARXIV_FEED).unwrap();
        assert_eq!(metadata.title, "Attention Is All You Need");
        assert_eq!(metadata.authors.len(), 2);
        assert_eq!(metadata.keywords, vec!["cs.CL".to_string(), "cs.LG".to_string()]);
        assert_eq!(metadata.publication_year, Some(2017));
        assert!(metadata.r#abstract.unwrap().starts_with("The dominant"));
    }

    #[test]
    fn test_parse_arxiv_without_entry() {
        let empty = r#"<feed xmlns="http://www.w3.org/2005/Atom"></feed>"#;
        assert!(matches!(parse_arxiv_atom(empty), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_parse_html_metadata() {
        let html = r#"<html><head>
            <title>Journal Page &amp; More</title>
            <meta name="citation_title" content="Deep Residual Learning">
            <meta content="Kaiming He" name="citation_author">
            <meta name="citation_author" content="Xiangyu Zhang" />
            <meta name="citation_doi" content="doi:10.1109/CVPR.2016.90">
            <meta name="description" content="Residual networks ease training.">
        </head></html>"#;
        let metadata = parse_html_metadata(html);
        assert_eq!(metadata.title, "Deep Residual Learning");
        assert_eq!(metadata.authors.len(), 2);
        assert_eq!(metadata.authors[0].name, "Kaiming He");
        assert_eq!(metadata.doi.as_deref(), Some("10.1109/CVPR.2016.90"));
        assert_eq!(metadata.r#abstract.as_deref(), Some("Residual networks ease training."));
    }

    #[tokio::test]
    async fn test_extract_arxiv() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/query"))
            .and(query_param("id_list", "1706.03762"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ARXIV_FEED))
            .mount(&server)
            .await;

        let metadata = extractor(&server.uri())
            .extract("https://arxiv.org/abs/1706.03762")
            .await
            .unwrap();
        assert_eq!(metadata.source, PaperSource::Arxiv);
        assert_eq!(metadata.arxiv_id.as_deref(), Some("1706.03762"));
        assert_eq!(
            metadata.pdf_url.as_deref(),
            Some("https://arxiv.org/pdf/1706.03762.pdf")
        );
    }

    #[tokio::test]
    async fn test_extract_pubmed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/esummary.fcgi"))
            .and(query_param("id", "31452104"))
            .and(query_param("retmode", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": {
                    "uids": ["31452104"],
                    "31452104": {
                        "title": "A study of things.",
                        "authors": [{"name": "Smith J"}, {"name": "Doe A"}],
                        "source": "Nature",
                        "pubdate": "2019 Aug 27",
                        "articleids": [{"idtype": "doi", "value": "10.1038/xyz"}]
                    }
                }
            })))
            .mount(&server)
            .await;

        let metadata = extractor(&server.uri())
            .extract("https://pubmed.ncbi.nlm.nih.gov/31452104/")
            .await
            .unwrap();
        assert_eq!(metadata.source, PaperSource::Journal);
        assert_eq!(metadata.journal.as_deref(), Some("Nature"));
        assert_eq!(metadata.pmid.as_deref(), Some("31452104"));
        assert_eq!(metadata.doi.as_deref(), Some("10.1038/xyz"));
        assert_eq!(metadata.publication_year, Some(2019));
    }

    #[tokio::test]
    async fn test_extract_pdf_and_failed_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let extractor = extractor(&server.uri());

        let pdf = extractor.extract("https://example.com/paper.pdf").await.unwrap();
        assert_eq!(pdf.source, PaperSource::PdfUpload);
        assert_eq!(pdf.title, PDF_TITLE);
        assert_eq!(pdf.pdf_url.as_deref(), Some("https://example.com/paper.pdf"));

        let page = extractor
            .extract(&format!("{}/missing", server.uri()))
            .await
            .unwrap();
        assert_eq!(page.source, PaperSource::Url);
        assert_eq!(page.title, FALLBACK_TITLE);
    }
}
