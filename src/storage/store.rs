//! 文档存储抽象
//!
//! 所有实体都以 JSON 文档的形式保存在按表划分的存储中，
//! 后端只需要实现 [`DocumentStore`]，业务层通过类型化的 [`Collection`] 访问。

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cmp::Ordering;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{AppError, Result};

/// 可持久化实体
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// 表名
    const TABLE: &'static str;

    /// 主键
    fn id(&self) -> &str;
}

/// 排序方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("asc") {
            SortOrder::Asc
        } else {
            SortOrder::Desc
        }
    }
}

/// 过滤条件
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    Ne(String, Value),
    In(String, Vec<Value>),
    Lt(String, Value),
    Gt(String, Value),
    Lte(String, Value),
    Gte(String, Value),
    IsNull(String),
    NotNull(String),
    /// 数组字段包含指定元素
    ArrayContains(String, Value),
}

impl Condition {
    pub fn field(&self) -> &str {
        match self {
            Condition::Eq(f, _)
            | Condition::Ne(f, _)
            | Condition::In(f, _)
            | Condition::Lt(f, _)
            | Condition::Gt(f, _)
            | Condition::Lte(f, _)
            | Condition::Gte(f, _)
            | Condition::IsNull(f)
            | Condition::NotNull(f)
            | Condition::ArrayContains(f, _) => f,
        }
    }

    /// 判断文档是否满足条件
    pub fn matches(&self, doc: &Value) -> bool {
        let actual = lookup(doc, self.field());
        match self {
            Condition::Eq(_, expected) => values_equal(actual, expected),
            Condition::Ne(_, expected) => !values_equal(actual, expected),
            Condition::In(_, options) => options.iter().any(|v| values_equal(actual, v)),
            Condition::Lt(_, bound) => compare_values(actual, bound) == Some(Ordering::Less),
            Condition::Gt(_, bound) => compare_values(actual, bound) == Some(Ordering::Greater),
            Condition::Lte(_, bound) => matches!(
                compare_values(actual, bound),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Condition::Gte(_, bound) => matches!(
                compare_values(actual, bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Condition::IsNull(_) => actual.is_null(),
            Condition::NotNull(_) => !actual.is_null(),
            Condition::ArrayContains(_, item) => actual
                .as_array()
                .is_some_and(|items| items.iter().any(|v| values_equal(v, item))),
        }
    }
}

/// 查询过滤器
///
/// 条件之间为 AND 关系。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub conditions: Vec<Condition>,
    pub order_by: Option<(String, SortOrder)>,
    pub limit: Option<usize>,
    pub start: usize,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Eq(field.to_string(), value.into()));
        self
    }

    pub fn ne(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Ne(field.to_string(), value.into()));
        self
    }

    pub fn any_of<V: Into<Value>>(mut self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.conditions.push(Condition::In(
            field.to_string(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn lt(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Lt(field.to_string(), value.into()));
        self
    }

    pub fn gt(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Gt(field.to_string(), value.into()));
        self
    }

    pub fn lte(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Lte(field.to_string(), value.into()));
        self
    }

    pub fn gte(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Gte(field.to_string(), value.into()));
        self
    }

    pub fn is_null(mut self, field: &str) -> Self {
        self.conditions.push(Condition::IsNull(field.to_string()));
        self
    }

    pub fn not_null(mut self, field: &str) -> Self {
        self.conditions.push(Condition::NotNull(field.to_string()));
        self
    }

    pub fn contains(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::ArrayContains(field.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, field: &str, order: SortOrder) -> Self {
        self.order_by = Some((field.to_string(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn start(mut self, start: usize) -> Self {
        self.start = start;
        self
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.conditions.iter().all(|c| c.matches(doc))
    }

    /// 过滤条件不变，去掉排序与分页（用于计数）
    pub fn without_paging(&self) -> Self {
        Self {
            conditions: self.conditions.clone(),
            order_by: None,
            limit: None,
            start: 0,
        }
    }

    /// 对已过滤的文档排序并分页
    pub fn apply_paging(&self, mut docs: Vec<Value>) -> Vec<Value> {
        if let Some((field, order)) = &self.order_by {
            docs.sort_by(|a, b| compare_for_sort(lookup(a, field), lookup(b, field), *order));
        }
        let iter = docs.into_iter().skip(self.start);
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

/// 按点号路径读取字段，缺失时为 null
pub fn lookup<'a>(doc: &'a Value, path: &str) -> &'a Value {
    let mut current = doc;
    for part in path.split('.') {
        match current.get(part) {
            Some(next) => current = next,
            None => return &Value::Null,
        }
    }
    current
}

fn parse_datetime(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value).ok()
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// 比较两个 JSON 值：数值按大小，时间字符串按时间，其它字符串按字典序
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => match (parse_datetime(x), parse_datetime(y)) {
            (Some(dx), Some(dy)) => Some(dx.cmp(&dy)),
            _ => Some(x.cmp(y)),
        },
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// 排序时 null 无论升降序都排在最后
fn compare_for_sort(a: &Value, b: &Value, order: SortOrder) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => {
            let ordering = compare_values(a, b).unwrap_or(Ordering::Equal);
            match order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        }
    }
}

/// 文档存储后端
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// 后端名称
    fn backend(&self) -> &'static str;

    /// 插入文档，主键已存在时返回 Conflict
    async fn insert(&self, table: &str, id: &str, doc: Value) -> Result<()>;

    /// 插入或覆盖文档
    async fn upsert(&self, table: &str, id: &str, doc: Value) -> Result<()>;

    /// 按主键读取
    async fn fetch(&self, table: &str, id: &str) -> Result<Option<Value>>;

    /// 删除文档，返回是否存在
    async fn remove(&self, table: &str, id: &str) -> Result<bool>;

    /// 条件查询
    async fn find(&self, table: &str, filter: &Filter) -> Result<Vec<Value>>;

    /// 条件计数
    async fn count(&self, table: &str, filter: &Filter) -> Result<u64>;

    /// 连通性检查
    async fn ping(&self) -> Result<()>;
}

/// 类型化集合
pub struct Collection<T> {
    store: Arc<dyn DocumentStore>,
    _marker: PhantomData<T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Record> Collection<T> {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    fn encode(entity: &T) -> Result<Value> {
        serde_json::to_value(entity).map_err(AppError::from)
    }

    fn decode(doc: Value) -> Result<T> {
        serde_json::from_value(doc)
            .map_err(|e| AppError::Serialization(format!("{}: {}", T::TABLE, e)))
    }

    pub async fn create(&self, entity: &T) -> Result<()> {
        self.store
            .insert(T::TABLE, entity.id(), Self::encode(entity)?)
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<T>> {
        self.store
            .fetch(T::TABLE, id)
            .await?
            .map(Self::decode)
            .transpose()
    }

    pub async fn save(&self, entity: &T) -> Result<()> {
        self.store
            .upsert(T::TABLE, entity.id(), Self::encode(entity)?)
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        self.store.remove(T::TABLE, id).await
    }

    pub async fn find(&self, filter: &Filter) -> Result<Vec<T>> {
        self.store
            .find(T::TABLE, filter)
            .await?
            .into_iter()
            .map(Self::decode)
            .collect()
    }

    pub async fn find_one(&self, filter: &Filter) -> Result<Option<T>> {
        let filter = filter.clone().limit(1);
        Ok(self.find(&filter).await?.into_iter().next())
    }

    pub async fn count(&self, filter: &Filter) -> Result<u64> {
        self.store.count(T::TABLE, filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_conditions() {
        let doc = json!({
            "status": "completed",
            "count": 7,
            "tags": ["ml", "nlp"],
            "created_at": "2024-05-01T10:00:00Z",
            "pdf_url": null
        });

        assert!(Filter::new().eq("status", "completed").matches(&doc));
        assert!(Filter::new().ne("status", "failed").matches(&doc));
        assert!(Filter::new().any_of("status", ["pending", "completed"]).matches(&doc));
        assert!(Filter::new().gte("count", 7).lt("count", 7.5).matches(&doc));
        assert!(!Filter::new().gt("count", 7).matches(&doc));
        assert!(Filter::new().contains("tags", "nlp").matches(&doc));
        assert!(Filter::new().is_null("pdf_url").is_null("missing").matches(&doc));
        assert!(Filter::new().not_null("tags").matches(&doc));
        assert!(
            !Filter::new()
                .lt("created_at", "2024-05-01T11:00:00+01:00")
                .matches(&doc)
        );
        assert!(
            Filter::new()
                .lt("created_at", "2024-05-02T00:00:00Z")
                .matches(&doc)
        );
    }

    #[test]
    fn test_paging_sorts_nulls_last() {
        let docs = vec![
            json!({"id": "a", "score": 0.2}),
            json!({"id": "b", "score": null}),
            json!({"id": "c", "score": 0.9}),
            json!({"id": "d", "score": 0.5}),
        ];
        let filter = Filter::new()
            .order_by("score", SortOrder::Desc)
            .start(1)
            .limit(2);
        let ids: Vec<_> = filter
            .apply_paging(docs.clone())
            .into_iter()
            .map(|d| d["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["d", "a"]);

        let asc = Filter::new().order_by("score", SortOrder::Asc).apply_paging(docs);
        assert_eq!(asc.last().unwrap()["id"], "b");
    }
}
