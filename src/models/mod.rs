//! 核心数据模型模块
//!
//! 定义用户、论文、书库条目、引用关系、知识条目与后台任务记录。

pub mod citation;
pub mod knowledge;
pub mod library;
pub mod paper;
pub mod task;
pub mod user;

pub use citation::Citation;
pub use knowledge::{EntryType, KnowledgeEntry};
pub use library::{ReadingStatus, UserPaper};
pub use paper::{
    Author, KeyInsight, Paper, PaperContribution, PaperSource, PaperSummary, ProcessingStatus,
};
pub use task::{ProcessingTask, TaskStatus};
pub use user::{SubscriptionTier, User};
