//! 后台任务
//!
//! - `broker`: 队列后端抽象（Redis / 内存）
//! - `tracker`: ProcessingTask 状态跟踪与作业提交
//! - `tasks`: 任务实现
//! - `worker_pool`: Worker 池
//! - `scheduler`: 周期任务调度

pub mod broker;
pub mod job;
pub mod memory_broker;
pub mod redis_broker;
pub mod scheduler;
pub mod tasks;
pub mod tracker;
pub mod worker_pool;

pub use broker::{JobBroker, QueueStats, create_broker};
pub use job::{Job, JobOutcome, JobResult, route_task};
pub use memory_broker::MemoryBroker;
pub use redis_broker::RedisBroker;
pub use scheduler::{Beat, Schedule, ScheduleEntry, default_entries};
pub use tasks::{ResearchTasks, TaskHandler};
pub use tracker::{TaskDispatcher, TaskTracker};
pub use worker_pool::{PoolStats, WorkerPool};
