//! Security Module
//!
//! Security features for the Scholarly API:
//! - Password hashing (PBKDF2)
//! - JWT tokens
//! - Rate Limiting
//! - Security Middleware

pub mod auth;
pub mod middleware;
pub mod password;
pub mod rate_limit;


pub use auth::{Claims, TokenPair, TokenService, TokenType};
pub use middleware::CurrentUser;
pub use password::{PasswordHasher, validate_password};
pub use rate_limit::{RateLimitResult, RateLimitScope, RateLimiter, create_rate_limiter};
