//! 服务模块

pub mod auth;
pub mod citation;
pub mod knowledge;
pub mod metadata;
pub mod paper;
pub mod search;
pub mod user;

#[cfg(test)]
pub(crate) mod test_support;

pub use auth::{AuthService, create_auth_service};
pub use citation::{CitationService, create_citation_service};
pub use knowledge::{KnowledgeService, create_knowledge_service};
pub use metadata::{MetadataExtractor, PaperMetadata, SourceKind};
pub use paper::{PaperService, create_paper_service};
pub use search::{SearchService, create_search_service};
pub use user::{UserService, create_user_service};
