use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::Record;

/// 订阅等级
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Display)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    /// 免费用户
    #[default]
    #[display("free")]
    Free,
    /// 研究者
    #[display("researcher")]
    Researcher,
    /// 机构用户
    #[display("institution")]
    Institution,
}

impl SubscriptionTier {
    /// 等级数值，越高权限越大
    pub fn level(self) -> u8 {
        match self {
            SubscriptionTier::Free => 0,
            SubscriptionTier::Researcher => 1,
            SubscriptionTier::Institution => 2,
        }
    }

    /// 当前等级是否满足所需等级
    pub fn satisfies(self, required: SubscriptionTier) -> bool {
        self.level() >= required.level()
    }
}

/// 用户实体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// 用户唯一标识
    pub id: String,
    /// 邮箱（小写，唯一）
    pub email: String,
    /// 密码哈希
    pub hashed_password: String,
    /// 姓名
    pub full_name: Option<String>,
    /// 是否启用
    pub is_active: bool,
    /// 邮箱是否已验证
    pub is_verified: bool,
    /// 是否为超级管理员
    pub is_superuser: bool,
    /// 订阅等级
    pub subscription_tier: SubscriptionTier,
    /// 订阅到期时间
    pub subscription_expires_at: Option<DateTime<Utc>>,
    /// 研究兴趣
    #[serde(default)]
    pub research_interests: Vec<String>,
    /// 偏好的 AI 模型
    pub preferred_ai_model: String,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 更新时间
    pub updated_at: DateTime<Utc>,
    /// 最后登录时间
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    /// 创建新用户
    pub fn new(email: &str, hashed_password: String, full_name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            email: normalize_email(email),
            hashed_password,
            full_name,
            is_active: true,
            is_verified: false,
            is_superuser: false,
            subscription_tier: SubscriptionTier::Free,
            subscription_expires_at: None,
            research_interests: Vec::new(),
            preferred_ai_model: "gpt-4".into(),
            created_at: now,
            updated_at: now,
            last_login_at: None,
        }
    }

    /// 更新修改时间
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// 当前生效的订阅等级（过期后降为免费）
    pub fn effective_tier(&self) -> SubscriptionTier {
        match self.subscription_expires_at {
            Some(expires_at) if expires_at < Utc::now() => SubscriptionTier::Free,
            _ => self.subscription_tier,
        }
    }
}

impl Record for User {
    const TABLE: &'static str = "user";

    fn id(&self) -> &str {
        &self.id
    }
}

/// 邮箱规范化
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
