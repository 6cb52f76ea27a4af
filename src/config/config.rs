use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 服务地址
    pub host: String,
    /// 服务端口
    pub port: u16,
    /// 请求超时（秒）
    pub request_timeout: u64,
    /// 最大请求体大小（字节）
    pub max_request_size: usize,
    /// 允许的跨域来源
    pub cors_origins: Vec<String>,
    /// 静态文件目录（挂载到 /static）
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            request_timeout: 30,
            max_request_size: 10 * 1024 * 1024,
            cors_origins: vec![
                "http://localhost:3000".into(),
                "http://localhost:8080".into(),
            ],
            static_dir: None,
        }
    }
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// 存储后端: "memory" 或 "surrealdb"
    pub backend: String,
    /// SurrealDB 连接地址
    pub url: String,
    /// 命名空间
    pub namespace: String,
    /// 数据库名称
    pub database: String,
    /// 用户名
    pub username: String,
    /// 密码
    pub password: String,
    /// 连接超时（秒）
    pub connection_timeout: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: "memory".into(),
            url: "http://localhost:8001".into(),
            namespace: "scholarly".into(),
            database: "research".into(),
            username: "root".into(),
            password: "root".into(),
            connection_timeout: 30,
        }
    }
}

/// 任务队列 / 缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// 后端: "memory" 或 "redis"
    pub backend: String,
    /// Redis 地址
    pub url: String,
    /// 结果存储地址，未配置时与 url 相同
    pub result_url: Option<String>,
    /// 键前缀
    pub key_prefix: String,
    /// 任务结果保留时间（秒）
    pub result_ttl: u64,
    /// 每个队列保留的死信上限
    pub dead_letter_max: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            backend: "memory".into(),
            url: "redis://localhost:6379/0".into(),
            result_url: None,
            key_prefix: "scholarly".into(),
            result_ttl: 3600,
            dead_letter_max: 1000,
        }
    }
}

impl BrokerConfig {
    /// 结果存储的实际地址
    pub fn result_backend_url(&self) -> &str {
        self.result_url.as_deref().unwrap_or(&self.url)
    }
}

/// 安全配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// JWT 签名密钥（至少 32 个字符）
    pub secret_key: String,
    /// JWT 算法
    pub algorithm: String,
    /// 访问令牌有效期（分钟）
    pub access_token_expire_minutes: i64,
    /// 刷新令牌有效期（天）
    pub refresh_token_expire_days: i64,
    /// 令牌签发者
    pub issuer: String,
    /// PBKDF2 迭代次数
    pub password_hash_iterations: u32,
    /// 是否启用限流
    pub rate_limit_enabled: bool,
    /// 窗口内允许的请求数
    pub rate_limit_requests: u32,
    /// 限流窗口（秒）
    pub rate_limit_window: u64,
    /// 认证接口窗口内允许的请求数
    pub auth_rate_limit_requests: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            algorithm: "HS256".into(),
            access_token_expire_minutes: 30,
            refresh_token_expire_days: 30,
            issuer: "scholarly".into(),
            password_hash_iterations: 100_000,
            rate_limit_enabled: true,
            rate_limit_requests: 100,
            rate_limit_window: 60,
            auth_rate_limit_requests: 20,
        }
    }
}

/// AI 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// 默认提供方: "heuristic"、"openai" 或 "anthropic"
    pub provider: String,
    /// OpenAI API Key
    pub openai_api_key: Option<String>,
    /// Anthropic API Key
    pub anthropic_api_key: Option<String>,
    /// OpenAI 接口地址
    pub openai_base_url: String,
    /// Anthropic 接口地址
    pub anthropic_base_url: String,
    /// 默认对话模型
    pub default_model: String,
    /// Anthropic 模型
    pub anthropic_model: String,
    /// 向量模型
    pub embedding_model: String,
    /// 批处理大小
    pub batch_size: usize,
    /// 请求超时（秒）
    pub timeout: u64,
    /// 送入模型的最大文本长度（字符）
    pub max_paper_length: usize,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: "heuristic".into(),
            openai_api_key: None,
            anthropic_api_key: None,
            openai_base_url: "https://api.openai.com/v1".into(),
            anthropic_base_url: "https://api.anthropic.com/v1".into(),
            default_model: "gpt-4".into(),
            anthropic_model: "claude-3-sonnet-20240229".into(),
            embedding_model: "text-embedding-3-large".into(),
            batch_size: 5,
            timeout: 120,
            max_paper_length: 50_000,
        }
    }
}

/// 论文来源配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// arXiv 查询接口
    pub arxiv_api_base: String,
    /// PubMed esummary 接口
    pub pubmed_api_base: String,
    /// 上传文件大小上限（字节）
    pub upload_max_size: usize,
    /// 允许上传的文件扩展名
    pub allowed_file_types: Vec<String>,
    /// 元数据抓取超时（秒）
    pub fetch_timeout: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            arxiv_api_base: "http://export.arxiv.org/api/query".into(),
            pubmed_api_base: "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esummary.fcgi".into(),
            upload_max_size: 50 * 1024 * 1024,
            allowed_file_types: vec!["pdf".into(), "doc".into(), "docx".into()],
            fetch_timeout: 30,
        }
    }
}

/// 后台 Worker 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// 并发 Worker 数量（固定配置）
    pub concurrency: usize,
    /// 消费的队列
    pub queues: Vec<String>,
    /// 空闲轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 软超时（秒），超过后记录告警
    pub soft_time_limit: u64,
    /// 硬超时（秒），超过后中止任务
    pub hard_time_limit: u64,
    /// 最大重试次数
    pub max_retries: u32,
    /// 指数退避基数（秒）
    pub retry_backoff_base: u64,
    /// 停机等待时间（秒）
    pub shutdown_timeout: u64,
    /// API 进程内是否同时运行 Worker 与调度器
    pub embedded: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            queues: vec![
                "paper_processing".into(),
                "ai_processing".into(),
                "citations".into(),
                "default".into(),
            ],
            poll_interval_ms: 500,
            soft_time_limit: 300,
            hard_time_limit: 600,
            max_retries: 3,
            retry_backoff_base: 60,
            shutdown_timeout: 30,
            embedded: false,
        }
    }
}

/// 调度器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 是否启用周期任务
    pub enabled: bool,
    /// 调度检查间隔（毫秒）
    pub tick_interval_ms: u64,
    /// 单例锁有效期（秒）
    pub lock_ttl: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_ms: 1000,
            lock_ttl: 30,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
    /// 结构化日志格式
    pub structured: bool,
    /// 日志文件目录
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            structured: false,
            log_dir: None,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 数据库配置
    pub database: DatabaseConfig,
    /// 任务队列配置
    pub broker: BrokerConfig,
    /// 安全配置
    pub security: SecurityConfig,
    /// AI 配置
    pub ai: AiConfig,
    /// 论文来源配置
    pub sources: SourcesConfig,
    /// Worker 配置
    pub worker: WorkerConfig,
    /// 调度器配置
    pub scheduler: SchedulerConfig,
    /// 日志配置
    pub logging: LoggingConfig,
    /// 应用名称
    pub app_name: String,
    /// 版本号
    pub version: String,
    /// 环境
    pub environment: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::development()
    }
}

impl AppConfig {
    /// 创建开发环境配置
    pub fn development() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            broker: BrokerConfig::default(),
            security: SecurityConfig {
                secret_key: "dev-secret-change-in-production-min-32-chars".into(),
                rate_limit_enabled: false,
                ..SecurityConfig::default()
            },
            ai: AiConfig::default(),
            sources: SourcesConfig::default(),
            worker: WorkerConfig {
                embedded: true,
                ..WorkerConfig::default()
            },
            scheduler: SchedulerConfig::default(),
            logging: LoggingConfig {
                level: "debug".into(),
                ..LoggingConfig::default()
            },
            app_name: "AI Research Assistant".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            environment: "development".into(),
        }
    }

    /// 创建生产环境配置
    pub fn production() -> Self {
        let mut config = Self::development();
        config.environment = "production".into();
        config.logging.level = "info".into();
        config.logging.structured = true;
        config.database.backend = "surrealdb".into();
        config.broker.backend = "redis".into();
        config.security.secret_key = String::new();
        config.security.rate_limit_enabled = true;
        config.worker.embedded = false;
        config
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
