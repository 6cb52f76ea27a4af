use crate::config::config::AppConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use std::path::{Path, PathBuf};

/// 环境变量前缀
pub const ENV_PREFIX: &str = "SCHOLARLY_";

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从默认路径加载配置
    ///
    /// 合并顺序（后者覆盖前者）：
    /// 1. 按 `SCHOLARLY_ENVIRONMENT` 选择的内置预设
    /// 2. `SCHOLARLY_CONFIG` 指定的文件，默认 ./config.yaml
    /// 3. `SCHOLARLY_` 前缀的环境变量，`__` 分隔嵌套字段
    pub fn load() -> Result<AppConfig, figment::Error> {
        let path = std::env::var(format!("{}CONFIG", ENV_PREFIX))
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_config_path());
        Self::load_from(&path)
    }

    /// 从指定路径加载配置
    pub fn load_from(path: &Path) -> Result<AppConfig, figment::Error> {
        Self::figment(path).extract()
    }

    fn figment(path: &Path) -> Figment {
        let preset = match std::env::var(format!("{}ENVIRONMENT", ENV_PREFIX)).as_deref() {
            Ok("production") => AppConfig::production(),
            _ => AppConfig::development(),
        };

        Figment::from(Serialized::defaults(preset))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// 验证配置
    pub fn validate(config: &AppConfig) -> Result<(), ConfigValidationError> {
        if config.server.port == 0 {
            return Err(ConfigValidationError::InvalidPort);
        }

        if config.security.secret_key.chars().count() < 32 {
            return Err(ConfigValidationError::WeakSecretKey);
        }

        if config.security.algorithm != "HS256" {
            return Err(ConfigValidationError::UnsupportedAlgorithm(
                config.security.algorithm.clone(),
            ));
        }

        match config.database.backend.as_str() {
            "memory" => {}
            "surrealdb" if config.database.url.is_empty() => {
                return Err(ConfigValidationError::MissingDatabaseUrl);
            }
            "surrealdb" => {}
            other => return Err(ConfigValidationError::UnknownBackend(other.to_string())),
        }

        match config.broker.backend.as_str() {
            "memory" => {}
            "redis" if !config.broker.url.starts_with("redis://")
                && !config.broker.url.starts_with("rediss://") =>
            {
                return Err(ConfigValidationError::InvalidBrokerUrl(
                    config.broker.url.clone(),
                ));
            }
            "redis" => {}
            other => return Err(ConfigValidationError::UnknownBackend(other.to_string())),
        }

        if config.worker.concurrency == 0 {
            return Err(ConfigValidationError::InvalidConcurrency);
        }

        if config.worker.soft_time_limit > config.worker.hard_time_limit {
            return Err(ConfigValidationError::InvalidTimeLimits);
        }

        match config.ai.provider.as_str() {
            "heuristic" => {}
            "openai" if config.ai.openai_api_key.is_none() => {
                return Err(ConfigValidationError::MissingApiKey("openai"));
            }
            "anthropic" if config.ai.anthropic_api_key.is_none() => {
                return Err(ConfigValidationError::MissingApiKey("anthropic"));
            }
            "openai" | "anthropic" => {}
            other => return Err(ConfigValidationError::UnknownAiProvider(other.to_string())),
        }

        Ok(())
    }
}

/// 配置验证错误
#[derive(thiserror::Error, Debug)]
pub enum ConfigValidationError {
    #[error("服务端口无效，必须大于 0")]
    InvalidPort,

    #[error("密钥长度至少为 32 个字符")]
    WeakSecretKey,

    #[error("不支持的 JWT 算法: {0}")]
    UnsupportedAlgorithm(String),

    #[error("数据库连接 URL 未配置")]
    MissingDatabaseUrl,

    #[error("未知的后端类型: {0}")]
    UnknownBackend(String),

    #[error("Broker 地址必须以 redis:// 开头: {0}")]
    InvalidBrokerUrl(String),

    #[error("Worker 并发数必须大于 0")]
    InvalidConcurrency,

    #[error("软超时不能大于硬超时")]
    InvalidTimeLimits,

    #[error("未知的 AI 提供方: {0}")]
    UnknownAiProvider(String),

    #[error("{0} 提供方缺少 API Key")]
    MissingApiKey(&'static str),
}

/// 获取默认配置文件路径
pub fn default_config_path() -> PathBuf {
    PathBuf::from("config.yaml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_development_config_is_valid() {
        let config = AppConfig::development();
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_production_requires_secret() {
        let config = AppConfig::production();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigValidationError::WeakSecretKey)
        ));
    }

    #[test]
    fn test_soft_limit_above_hard_limit_rejected() {
        let mut config = AppConfig::development();
        config.worker.soft_time_limit = 900;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigValidationError::InvalidTimeLimits)
        ));
    }

    #[test]
    fn test_openai_provider_requires_key() {
        let mut config = AppConfig::development();
        config.ai.provider = "openai".into();
        assert!(ConfigLoader::validate(&config).is_err());

        config.ai.openai_api_key = Some("sk-test".into());
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_yaml_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "server:\n  port: 9100\nworker:\n  concurrency: 2\napp_name: Test Assistant"
        )
        .unwrap();

        let config = ConfigLoader::load_from(file.path()).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.worker.concurrency, 2);
        assert_eq!(config.app_name, "Test Assistant");
        assert_eq!(config.broker.result_ttl, 3600);
    }

    #[test]
    fn test_missing_file_falls_back_to_preset() {
        let config = ConfigLoader::load_from(Path::new("/nonexistent/scholarly.yaml")).unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.broker.url, "redis://localhost:6379/0");
    }
}
