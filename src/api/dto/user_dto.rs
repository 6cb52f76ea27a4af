//! 用户 DTO
//!
//! 定义个人资料与统计相关的请求和响应数据结构。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::auth_dto::UserResponse;
use super::common_dto::TagCount;

/// 更新个人资料请求
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(default)]
pub struct UpdateProfileRequest {
    /// 姓名
    #[validate(length(max = 255))]
    pub full_name: Option<String>,
    /// 研究兴趣
    pub research_interests: Option<Vec<String>>,
    /// 偏好的 AI 模型
    #[validate(length(min = 1, max = 100))]
    pub preferred_ai_model: Option<String>,
}

/// 修改密码请求
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    /// 当前密码
    pub current_password: String,
    /// 新密码
    #[validate(length(min = 8, max = 100, message = "Password must be 8-100 characters"))]
    pub new_password: String,
}

/// 个人资料统计
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct ProfileStats {
    /// 书库中的论文数
    pub papers_count: u64,
    /// 知识条目数
    pub knowledge_entries_count: u64,
    /// 累计阅读时长（秒）
    pub total_reading_time: u64,
}

/// 个人资料响应
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    pub stats: ProfileStats,
}

/// 详细统计
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserStatsResponse {
    /// 已读完的论文数
    pub papers_read: u64,
    /// 收藏的论文总数
    pub papers_saved: u64,
    pub knowledge_entries: u64,
    /// 累计阅读时长（秒）
    pub total_reading_time: u64,
    /// 平均评分（无评分时为空）
    pub average_rating: Option<f64>,
    /// 最常用标签
    pub favorite_tags: Vec<TagCount>,
    /// 近 7 天活动
    pub recent_activity: RecentActivity,
    pub member_since: DateTime<Utc>,
}

/// 近期活动
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct RecentActivity {
    pub papers_added: u64,
    pub knowledge_entries_added: u64,
}
