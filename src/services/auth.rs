//! 认证服务
//!
//! 注册、登录、令牌刷新、邮箱验证与密码重置。
//! 邮件发送不在本服务范围内：验证与重置令牌仅在开发环境随响应返回，其他环境只写日志。

use chrono::Utc;
use std::sync::Arc;
use validator::Validate;

use crate::api::dto::{LoginRequest, MessageResponse, RegisterRequest, ResetPasswordRequest};
use crate::error::{AppError, Result};
use crate::models::user::normalize_email;
use crate::models::User;
use crate::security::{PasswordHasher, TokenPair, TokenService, TokenType, validate_password};
use crate::storage::{Collection, DocumentStore, Filter};

/// 忘记密码的统一响应，不暴露邮箱是否存在
const FORGOT_PASSWORD_MESSAGE: &str = "If the email exists, a password reset link has been sent";

/// 认证服务
#[derive(Clone)]
pub struct AuthService {
    users: Collection<User>,
    hasher: PasswordHasher,
    tokens: TokenService,
    expose_tokens: bool,
}

impl AuthService {
    /// `expose_tokens` 为真时，验证/重置令牌写入响应消息（仅开发环境）
    pub fn new(
        store: Arc<dyn DocumentStore>,
        hasher: PasswordHasher,
        tokens: TokenService,
        expose_tokens: bool,
    ) -> Self {
        Self {
            users: Collection::new(store),
            hasher,
            tokens,
            expose_tokens,
        }
    }

    /// 按邮箱查找用户
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.users
            .find_one(&Filter::new().eq("email", normalize_email(email)))
            .await
    }

    /// 注册新用户并返回令牌
    pub async fn register(&self, request: &RegisterRequest) -> Result<(User, TokenPair)> {
        request.validate()?;
        validate_password(&request.password)?;

        if self.find_by_email(&request.email).await?.is_some() {
            return Err(AppError::Conflict("Email already registered".into()));
        }

        let hashed = self.hasher.hash(&request.password)?;
        let mut user = User::new(&request.email, hashed, request.full_name.clone());
        user.research_interests = request.research_interests.clone();
        self.users.create(&user).await?;

        let verification = self.tokens.issue(&user.id, TokenType::EmailVerification)?;
        tracing::info!(user_id = %user.id, "User registered");
        tracing::debug!(user_id = %user.id, token = %verification, "Email verification token issued");

        let pair = self.tokens.issue_pair(&user.id)?;
        Ok((user, pair))
    }

    /// 校验邮箱密码并签发令牌
    pub async fn login(&self, request: &LoginRequest) -> Result<TokenPair> {
        let mut user = self
            .find_by_email(&request.email)
            .await?
            .filter(|u| self.hasher.verify(&request.password, &u.hashed_password))
            .ok_or_else(|| AppError::Authentication("Incorrect email or password".into()))?;

        if !user.is_active {
            return Err(AppError::Validation("Inactive user".into()));
        }

        user.last_login_at = Some(Utc::now());
        user.touch();
        self.users.save(&user).await?;

        tracing::info!(user_id = %user.id, "User logged in");
        self.tokens.issue_pair(&user.id)
    }

    /// 使用刷新令牌换取新令牌对
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let claims = self.tokens.verify(refresh_token, TokenType::Refresh)?;
        let user = self
            .users
            .get(&claims.sub)
            .await?
            .ok_or_else(|| AppError::Authentication("User not found".into()))?;
        if !user.is_active {
            return Err(AppError::Authentication("Inactive user".into()));
        }
        self.tokens.issue_pair(&user.id)
    }

    /// 令牌是无状态的，注销只做确认
    pub fn logout(&self, user: &User) -> MessageResponse {
        tracing::info!(user_id = %user.id, "User logged out");
        MessageResponse::new("Successfully logged out")
    }

    /// 邮箱验证
    pub async fn verify_email(&self, token: &str) -> Result<MessageResponse> {
        let claims = self.tokens.verify(token, TokenType::EmailVerification)?;
        let mut user = self
            .users
            .get(&claims.sub)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;

        if !user.is_verified {
            user.is_verified = true;
            user.touch();
            self.users.save(&user).await?;
            tracing::info!(user_id = %user.id, "Email verified");
        }
        Ok(MessageResponse::new("Email verified successfully"))
    }

    /// 忘记密码：无论邮箱是否存在都返回相同消息
    pub async fn forgot_password(&self, email: &str) -> Result<MessageResponse> {
        let Some(user) = self.find_by_email(email).await? else {
            tracing::debug!("Password reset requested for unknown email");
            return Ok(MessageResponse::new(FORGOT_PASSWORD_MESSAGE));
        };

        let token = self.tokens.issue(&user.email, TokenType::PasswordReset)?;
        tracing::info!(user_id = %user.id, "Password reset token issued");

        if self.expose_tokens {
            Ok(MessageResponse::new(format!(
                "{}. Reset token: {}",
                FORGOT_PASSWORD_MESSAGE, token
            )))
        } else {
            Ok(MessageResponse::new(FORGOT_PASSWORD_MESSAGE))
        }
    }

    /// 使用重置令牌设置新密码
    pub async fn reset_password(&self, request: &ResetPasswordRequest) -> Result<MessageResponse> {
        request.validate()?;
        let claims = self.tokens.verify(&request.token, TokenType::PasswordReset)?;
        let mut user = self
            .find_by_email(&claims.sub)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;

        user.hashed_password = self.hasher.hash(&request.new_password)?;
        user.touch();
        self.users.save(&user).await?;

        tracing::info!(user_id = %user.id, "Password reset");
        Ok(MessageResponse::new("Password reset successfully"))
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }
}

/// 创建认证服务
pub fn create_auth_service(
    store: Arc<dyn DocumentStore>,
    hasher: PasswordHasher,
    tokens: TokenService,
    expose_tokens: bool,
) -> AuthService {
    AuthService::new(store, hasher, tokens, expose_tokens)
}
