//! 用户服务
//!
//! 个人资料、修改密码、统计与注销账号。

use chrono::{Duration, Utc};
use std::sync::Arc;
use validator::Validate;

use crate::api::dto::{
    ChangePasswordRequest, MessageResponse, ProfileResponse, ProfileStats, RecentActivity,
    UpdateProfileRequest, UserResponse, UserStatsResponse, top_tags,
};
use crate::error::{AppError, Result};
use crate::models::{KnowledgeEntry, ReadingStatus, User, UserPaper};
use crate::security::PasswordHasher;
use crate::storage::{Collection, DocumentStore, Filter};

/// 统计中展示的标签数量
const FAVORITE_TAGS_LIMIT: usize = 10;

/// 近期活动窗口（天）
const RECENT_DAYS: i64 = 7;

#[derive(Clone)]
pub struct UserService {
    users: Collection<User>,
    library: Collection<UserPaper>,
    knowledge: Collection<KnowledgeEntry>,
    hasher: PasswordHasher,
}

impl UserService {
    pub fn new(store: Arc<dyn DocumentStore>, hasher: PasswordHasher) -> Self {
        Self {
            users: Collection::new(store.clone()),
            library: Collection::new(store.clone()),
            knowledge: Collection::new(store),
            hasher,
        }
    }

    async fn library_of(&self, user_id: &str) -> Result<Vec<UserPaper>> {
        self.library.find(&Filter::new().eq("user_id", user_id)).await
    }

    /// 个人资料与基础统计
    pub async fn profile(&self, user: &User) -> Result<ProfileResponse> {
        let entries = self.library_of(&user.id).await?;
        let knowledge_entries_count = self
            .knowledge
            .count(&Filter::new().eq("user_id", user.id.as_str()))
            .await?;

        Ok(ProfileResponse {
            user: UserResponse::from(user),
            stats: ProfileStats {
                papers_count: entries.len() as u64,
                knowledge_entries_count,
                total_reading_time: entries.iter().map(|e| e.time_spent).sum(),
            },
        })
    }

    /// 更新个人资料
    pub async fn update_profile(
        &self,
        user: &User,
        request: &UpdateProfileRequest,
    ) -> Result<UserResponse> {
        request.validate()?;
        let mut user = user.clone();

        if let Some(full_name) = &request.full_name {
            user.full_name = Some(full_name.trim().to_string()).filter(|n| !n.is_empty());
        }
        if let Some(interests) = &request.research_interests {
            user.research_interests = interests
                .iter()
                .map(|i| i.trim().to_string())
                .filter(|i| !i.is_empty())
                .collect();
        }
        if let Some(model) = &request.preferred_ai_model {
            user.preferred_ai_model = model.clone();
        }

        user.touch();
        self.users.save(&user).await?;
        tracing::info!(user_id = %user.id, "Profile updated");
        Ok(UserResponse::from(&user))
    }

    /// 修改密码，需要提供当前密码
    pub async fn change_password(
        &self,
        user: &User,
        request: &ChangePasswordRequest,
    ) -> Result<MessageResponse> {
        request.validate()?;
        if !self.hasher.verify(&request.current_password, &user.hashed_password) {
            return Err(AppError::Validation("Incorrect current password".into()));
        }

        let mut user = user.clone();
        user.hashed_password = self.hasher.hash(&request.new_password)?;
        user.touch();
        self.users.save(&user).await?;

        tracing::info!(user_id = %user.id, "Password changed");
        Ok(MessageResponse::new("Password changed successfully"))
    }

    /// 详细统计
    pub async fn stats(&self, user: &User) -> Result<UserStatsResponse> {
        let entries = self.library_of(&user.id).await?;
        let knowledge = self
            .knowledge
            .find(&Filter::new().eq("user_id", user.id.as_str()))
            .await?;
        let since = Utc::now() - Duration::days(RECENT_DAYS);

        let ratings: Vec<f64> = entries
            .iter()
            .filter_map(|e| e.rating)
            .map(f64::from)
            .collect();
        let average_rating = (!ratings.is_empty())
            .then(|| (ratings.iter().sum::<f64>() / ratings.len() as f64 * 100.0).round() / 100.0);

        Ok(UserStatsResponse {
            papers_read: entries
                .iter()
                .filter(|e| e.status == ReadingStatus::Completed)
                .count() as u64,
            papers_saved: entries.len() as u64,
            knowledge_entries: knowledge.len() as u64,
            total_reading_time: entries.iter().map(|e| e.time_spent).sum(),
            average_rating,
            favorite_tags: top_tags(entries.iter().flat_map(|e| &e.tags), FAVORITE_TAGS_LIMIT),
            recent_activity: RecentActivity {
                papers_added: entries.iter().filter(|e| e.created_at >= since).count() as u64,
                knowledge_entries_added: knowledge
                    .iter()
                    .filter(|k| k.created_at >= since)
                    .count() as u64,
            },
            member_since: user.created_at,
        })
    }

    /// 注销账号（软删除）
    pub async fn deactivate(&self, user: &User) -> Result<MessageResponse> {
        let mut user = user.clone();
        user.is_active = false;
        user.touch();
        self.users.save(&user).await?;
        tracing::info!(user_id = %user.id, "Account deactivated");
        Ok(MessageResponse::new("Account deactivated successfully"))
    }
}

pub fn create_user_service(store: Arc<dyn DocumentStore>, hasher: PasswordHasher) -> UserService {
    UserService::new(store, hasher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntryType;
    use crate::storage::MemoryStore;

    async fn setup() -> (UserService, User) {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let hasher = PasswordHasher::new(1000);
        let user = User::new("a@example.com", hasher.hash("password123").unwrap(), None);
        Collection::<User>::new(store.clone()).create(&user).await.unwrap();

        let library: Collection<UserPaper> = Collection::new(store.clone());
        let mut read = UserPaper::new(&user.id, "p1");
        read.status = ReadingStatus::Completed;
        read.time_spent = 600;
        read.rating = Some(4);
        read.tags = vec!["nlp".into(), "rag".into()];
        library.create(&read).await.unwrap();

        let mut saved = UserPaper::new(&user.id, "p2");
        saved.time_spent = 120;
        saved.rating = Some(5);
        saved.tags = vec!["nlp".into()];
        library.create(&saved).await.unwrap();

        let knowledge: Collection<KnowledgeEntry> = Collection::new(store.clone());
        knowledge
            .create(&KnowledgeEntry::new(&user.id, "Note", "Body", EntryType::Note))
            .await
            .unwrap();

        (UserService::new(store, hasher), user)
    }

    #[tokio::test]
    async fn test_profile_stats() {
        let (service, user) = setup().await;
        let profile = service.profile(&user).await.unwrap();
        assert_eq!(profile.stats.papers_count, 2);
        assert_eq!(profile.stats.knowledge_entries_count, 1);
        assert_eq!(profile.stats.total_reading_time, 720);
    }

    #[tokio::test]
    async fn test_detailed_stats() {
        let (service, user) = setup().await;
        let stats = service.stats(&user).await.unwrap();
        assert_eq!(stats.papers_read, 1);
        assert_eq!(stats.papers_saved, 2);
        assert_eq!(stats.average_rating, Some(4.5));
        assert_eq!(stats.favorite_tags[0].tag, "nlp");
        assert_eq!(stats.favorite_tags[0].count, 2);
        assert_eq!(stats.recent_activity.papers_added, 2);
    }

    #[tokio::test]
    async fn test_change_password_requires_current() {
        let (service, user) = setup().await;
        let wrong = ChangePasswordRequest {
            current_password: "nope-nope".into(),
            new_password: "new-password-1".into(),
        };
        assert!(matches!(
            service.change_password(&user, &wrong).await,
            Err(AppError::Validation(_))
        ));

        let right = ChangePasswordRequest {
            current_password: "password123".into(),
            new_password: "new-password-1".into(),
        };
        service.change_password(&user, &right).await.unwrap();
        let stored = service.users.get(&user.id).await.unwrap().unwrap();
        assert!(service.hasher.verify("new-password-1", &stored.hashed_password));
    }

    #[tokio::test]
    async fn test_update_and_deactivate() {
        let (service, user) = setup().await;
        let updated = service
            .update_profile(
                &user,
                &UpdateProfileRequest {
                    full_name: Some("  Ada Lovelace ".into()),
                    research_interests: Some(vec!["ml".into(), " ".into()]),
                    preferred_ai_model: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.full_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(updated.research_interests, vec!["ml".to_string()]);

        service.deactivate(&user).await.unwrap();
        let stored = service.users.get(&user.id).await.unwrap().unwrap();
        assert!(!stored.is_active);
    }
}
