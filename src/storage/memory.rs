//! 进程内文档存储
//!
//! 开发模式、嵌入式 Worker 与测试使用。

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::storage::store::{DocumentStore, Filter};

/// 基于 DashMap 的内存存储，每张表一个 DashMap
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: DashMap<String, DashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_id(id: &str, mut doc: Value) -> Value {
        if let Value::Object(map) = &mut doc {
            map.insert("id".to_string(), Value::String(id.to_string()));
        }
        doc
    }

    fn scan(&self, table: &str, filter: &Filter) -> Vec<Value> {
        match self.tables.get(table) {
            Some(rows) => rows
                .iter()
                .filter(|row| filter.matches(row.value()))
                .map(|row| row.value().clone())
                .collect(),
            None => Vec::new(),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn insert(&self, table: &str, id: &str, doc: Value) -> Result<()> {
        let rows = self.tables.entry(table.to_string()).or_default();
        match rows.entry(id.to_string()) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!("{}:{}", table, id))),
            Entry::Vacant(slot) => {
                slot.insert(Self::with_id(id, doc));
                Ok(())
            }
        }
    }

    async fn upsert(&self, table: &str, id: &str, doc: Value) -> Result<()> {
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(id.to_string(), Self::with_id(id, doc));
        Ok(())
    }

    async fn fetch(&self, table: &str, id: &str) -> Result<Option<Value>> {
        Ok(self
            .tables
            .get(table)
            .and_then(|rows| rows.get(id).map(|row| row.value().clone())))
    }

    async fn remove(&self, table: &str, id: &str) -> Result<bool> {
        Ok(self
            .tables
            .get(table)
            .is_some_and(|rows| rows.remove(id).is_some()))
    }

    async fn find(&self, table: &str, filter: &Filter) -> Result<Vec<Value>> {
        Ok(filter.apply_paging(self.scan(table, filter)))
    }

    async fn count(&self, table: &str, filter: &Filter) -> Result<u64> {
        Ok(self.scan(table, filter).len() as u64)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::store::SortOrder;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_conflict_and_upsert() {
        let store = MemoryStore::new();
        store.insert("paper", "p1", json!({"title": "A"})).await.unwrap();

        let err = store
            .insert("paper", "p1", json!({"title": "B"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        store.upsert("paper", "p1", json!({"title": "C"})).await.unwrap();
        let doc = store.fetch("paper", "p1").await.unwrap().unwrap();
        assert_eq!(doc["title"], "C");
        assert_eq!(doc["id"], "p1");

        assert!(store.remove("paper", "p1").await.unwrap());
        assert!(!store.remove("paper", "p1").await.unwrap());
        assert!(store.fetch("missing", "p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_and_count() {
        let store = MemoryStore::new();
        for (id, year) in [("a", 2019), ("b", 2021), ("c", 2023)] {
            store
                .insert("paper", id, json!({"publication_year": year, "user": "u1"}))
                .await
                .unwrap();
        }

        let filter = Filter::new()
            .eq("user", "u1")
            .gte("publication_year", 2020)
            .order_by("publication_year", SortOrder::Desc);
        let docs = store.find("paper", &filter).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["id"], "c");

        assert_eq!(store.count("paper", &filter.limit(1)).await.unwrap(), 2);
    }
}
