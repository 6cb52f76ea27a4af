//! 通用 DTO
//!
//! 分页参数、分页信息与简单消息响应。

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// 默认每页条数
pub const DEFAULT_PER_PAGE: usize = 20;

/// 每页条数上限
pub const MAX_PER_PAGE: usize = 100;

/// 分页参数
#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(default)]
pub struct PageParams {
    /// 页码，从 1 开始
    pub page: usize,
    /// 每页条数
    pub per_page: usize,
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl PageParams {
    pub fn new(page: usize, per_page: usize) -> Self {
        Self { page, per_page }.normalized()
    }

    /// 页码至少为 1，每页条数限制在 1..=100
    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            per_page: self.per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page.max(1) - 1) * self.per_page
    }

    /// 对内存中的结果做分页
    pub fn slice<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset())
            .take(self.per_page)
            .collect()
    }

    pub fn info(&self, total: usize) -> PageInfo {
        PageInfo {
            page: self.page,
            per_page: self.per_page,
            total,
            has_next: self.offset() + self.per_page < total,
            has_prev: self.page > 1,
        }
    }
}

/// 分页信息
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PageInfo {
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub has_next: bool,
    pub has_prev: bool,
}

/// 消息响应
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// 条数参数
#[derive(Debug, Clone, Copy, Default, Deserialize, ToSchema)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    /// 未指定时取 `default`，并限制在 1..=`max`
    pub fn resolve(&self, default: usize, max: usize) -> usize {
        self.limit.unwrap_or(default).clamp(1, max)
    }
}

/// 标签计数
#[derive(Debug, Clone, Serialize, PartialEq, Eq, ToSchema)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

/// 按出现次数降序（次数相同按标签名）取前 `limit` 个
pub fn top_tags<'a>(tags: impl IntoIterator<Item = &'a String>, limit: usize) -> Vec<TagCount> {
    let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for tag in tags {
        *counts.entry(tag.as_str()).or_default() += 1;
    }
    let mut ranked: Vec<TagCount> = counts
        .into_iter()
        .map(|(tag, count)| TagCount {
            tag: tag.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_info() {
        let page = PageParams::new(2, 10);
        assert_eq!(page.offset(), 10);

        let info = page.info(25);
        assert!(info.has_next);
        assert!(info.has_prev);

        let info = PageParams::new(3, 10).info(25);
        assert!(!info.has_next);
    }

    #[test]
    fn test_page_params_normalized() {
        let page = PageParams::new(0, 1000);
        assert_eq!(page.page, 1);
        assert_eq!(page.per_page, MAX_PER_PAGE);
        assert_eq!(PageParams::new(1, 2).slice(vec![1, 2, 3]), vec![1, 2]);
    }

    #[test]
    fn test_top_tags() {
        let tags: Vec<String> = ["ml", "nlp", "ml", "cv", "nlp", "ml"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let top = top_tags(&tags, 2);
        assert_eq!(top[0], TagCount { tag: "ml".into(), count: 3 });
        assert_eq!(top[1].tag, "nlp");
        assert_eq!(top.len(), 2);
    }
}
