use async_trait::async_trait;
use serde_json::Value;
use surrealdb::{
    Surreal,
    engine::any::{Any, connect},
    opt::auth::Root,
};
use tracing::{debug, info};

use crate::config::config::DatabaseConfig;
use crate::error::{AppError, Result};
use crate::storage::store::{Condition, DocumentStore, Filter, SortOrder};

/// 唯一索引定义
const SCHEMA: &str = "
    DEFINE INDEX IF NOT EXISTS user_email ON TABLE user COLUMNS email UNIQUE;
    DEFINE INDEX IF NOT EXISTS user_paper_pair ON TABLE user_paper COLUMNS user_id, paper_id UNIQUE;
    DEFINE INDEX IF NOT EXISTS citation_pair ON TABLE citation COLUMNS citing_paper_id, cited_paper_id UNIQUE;
    DEFINE INDEX IF NOT EXISTS paper_status ON TABLE paper COLUMNS processing_status;
    DEFINE INDEX IF NOT EXISTS knowledge_user ON TABLE knowledge_entry COLUMNS user_id;
";

/// SurrealDB 文档存储
#[derive(Clone)]
pub struct SurrealStore {
    db: Surreal<Any>,
}

impl SurrealStore {
    /// 连接并初始化 schema
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let db: Surreal<Any> = tokio::time::timeout(
            std::time::Duration::from_secs(config.connection_timeout),
            connect(config.url.as_str()),
        )
        .await
        .map_err(|_| AppError::Connection(format!("connect to {} timed out", config.url)))?
        .map_err(|e| AppError::Connection(e.to_string()))?;

        // 认证
        db.signin(Root {
            username: &config.username,
            password: &config.password,
        })
        .await?;

        // 选择命名空间和数据库
        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await?;

        let store = Self { db };
        store.init_schema().await?;
        info!(
            "SurrealDB connected: {} ns={} db={}",
            config.url, config.namespace, config.database
        );
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        self.db.query(SCHEMA).await?.check()?;
        Ok(())
    }

    /// 获取内部数据库实例
    pub fn inner(&self) -> &Surreal<Any> {
        &self.db
    }
}

/// 字段名只允许标识符与点号路径，防止拼接进查询语句时被注入
fn checked_field(field: &str) -> Result<&str> {
    let valid = !field.is_empty()
        && field
            .split('.')
            .all(|part| {
                !part.is_empty()
                    && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                    && !part.starts_with(|c: char| c.is_ascii_digit())
            });
    if valid {
        Ok(field)
    } else {
        Err(AppError::Validation(format!("invalid field name: {}", field)))
    }
}

/// 将过滤器编译为 WHERE 子句与绑定参数
fn where_clause(filter: &Filter) -> Result<(String, Vec<(String, Value)>)> {
    let mut parts = Vec::with_capacity(filter.conditions.len());
    let mut binds = Vec::new();

    for (i, condition) in filter.conditions.iter().enumerate() {
        let field = checked_field(condition.field())?;
        let param = format!("p{}", i);
        let clause = match condition {
            Condition::Eq(_, v) => {
                binds.push((param.clone(), v.clone()));
                format!("{} = ${}", field, param)
            }
            Condition::Ne(_, v) => {
                binds.push((param.clone(), v.clone()));
                format!("{} != ${}", field, param)
            }
            Condition::In(_, values) => {
                binds.push((param.clone(), Value::Array(values.clone())));
                format!("{} INSIDE ${}", field, param)
            }
            Condition::Lt(_, v) => {
                binds.push((param.clone(), v.clone()));
                format!("{} < ${}", field, param)
            }
            Condition::Gt(_, v) => {
                binds.push((param.clone(), v.clone()));
                format!("{} > ${}", field, param)
            }
            Condition::Lte(_, v) => {
                binds.push((param.clone(), v.clone()));
                format!("{} <= ${}", field, param)
            }
            Condition::Gte(_, v) => {
                binds.push((param.clone(), v.clone()));
                format!("{} >= ${}", field, param)
            }
            Condition::IsNull(_) => format!("({0} IS NONE OR {0} IS NULL)", field),
            Condition::NotNull(_) => format!("({0} IS NOT NONE AND {0} IS NOT NULL)", field),
            Condition::ArrayContains(_, v) => {
                binds.push((param.clone(), v.clone()));
                format!("{} CONTAINS ${}", field, param)
            }
        };
        parts.push(clause);
    }

    let clause = if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    };
    Ok((clause, binds))
}

fn strip_id(mut doc: Value) -> Value {
    if let Value::Object(map) = &mut doc {
        map.remove("id");
    }
    doc
}

fn is_duplicate(error: &surrealdb::Error) -> bool {
    let message = error.to_string();
    message.contains("already exists") || message.contains("already contains")
}

#[async_trait]
impl DocumentStore for SurrealStore {
    fn backend(&self) -> &'static str {
        "surrealdb"
    }

    async fn insert(&self, table: &str, id: &str, doc: Value) -> Result<()> {
        let result = self
            .db
            .query("CREATE type::thing($tb, $id) CONTENT $data RETURN NONE")
            .bind(("tb", table.to_string()))
            .bind(("id", id.to_string()))
            .bind(("data", strip_id(doc)))
            .await?
            .check();

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate(&e) => Err(AppError::Conflict(format!("{}:{}", table, id))),
            Err(e) => Err(e.into()),
        }
    }

    async fn upsert(&self, table: &str, id: &str, doc: Value) -> Result<()> {
        let result = self
            .db
            .query("UPSERT type::thing($tb, $id) CONTENT $data RETURN NONE")
            .bind(("tb", table.to_string()))
            .bind(("id", id.to_string()))
            .bind(("data", strip_id(doc)))
            .await?
            .check();

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate(&e) => Err(AppError::Conflict(format!("{}:{}", table, id))),
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch(&self, table: &str, id: &str) -> Result<Option<Value>> {
        let rows: Vec<Value> = self
            .db
            .query("SELECT *, meta::id(id) AS id FROM type::thing($tb, $id)")
            .bind(("tb", table.to_string()))
            .bind(("id", id.to_string()))
            .await?
            .take(0)?;
        Ok(rows.into_iter().next())
    }

    async fn remove(&self, table: &str, id: &str) -> Result<bool> {
        let removed: Vec<Value> = self
            .db
            .query("DELETE type::thing($tb, $id) RETURN BEFORE")
            .bind(("tb", table.to_string()))
            .bind(("id", id.to_string()))
            .await?
            .take(0)?;
        Ok(!removed.is_empty())
    }

    async fn find(&self, table: &str, filter: &Filter) -> Result<Vec<Value>> {
        let (clause, binds) = where_clause(filter)?;
        let mut sql = format!(
            "SELECT *, meta::id(id) AS id FROM type::table($tb){}",
            clause
        );
        if let Some((field, order)) = &filter.order_by {
            let direction = match order {
                SortOrder::Asc => "ASC",
                SortOrder::Desc => "DESC",
            };
            sql.push_str(&format!(" ORDER BY {} {}", checked_field(field)?, direction));
        }
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if filter.start > 0 {
            sql.push_str(&format!(" START {}", filter.start));
        }
        debug!("surreal find: {}", sql);

        let mut query = self.db.query(sql).bind(("tb", table.to_string()));
        for (name, value) in binds {
            query = query.bind((name, value));
        }
        let rows: Vec<Value> = query.await?.take(0)?;
        Ok(rows)
    }

    async fn count(&self, table: &str, filter: &Filter) -> Result<u64> {
        let (clause, binds) = where_clause(filter)?;
        let sql = format!(
            "SELECT count() FROM type::table($tb){} GROUP ALL",
            clause
        );
        let mut query = self.db.query(sql).bind(("tb", table.to_string()));
        for (name, value) in binds {
            query = query.bind((name, value));
        }
        let result: Vec<Value> = query.await?.take(0)?;
        Ok(result
            .first()
            .and_then(|v| v.get("count"))
            .and_then(|c| c.as_u64())
            .unwrap_or(0))
    }

    async fn ping(&self) -> Result<()> {
        self.db.health().await?;
        Ok(())
    }
}
