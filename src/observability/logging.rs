//! 结构化日志
//!
//! stdout 输出 JSON 或可读格式，配置 `log_dir` 时额外按天滚动写入文件。

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::config::LoggingConfig;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// 构造日志过滤器：RUST_LOG 优先，其次为命令行/配置中的级别
pub fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = level.to_lowercase();
        EnvFilter::new(format!("{level},scholarly={level},tower_http=info,hyper=warn"))
    })
}

/// 初始化日志
///
/// 重复调用不会报错（只有第一次生效）。返回的 guard 需要保持到进程退出，
/// 否则文件日志的缓冲不会被刷新。
pub fn init_tracing(config: &LoggingConfig, level_override: Option<&str>) -> Option<WorkerGuard> {
    let level = level_override.unwrap_or(&config.level);
    let mut layers: Vec<BoxedLayer> = Vec::new();

    let stdout_layer = if config.structured {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .boxed()
    };
    layers.push(stdout_layer);

    let mut guard = None;
    if let Some(dir) = &config.log_dir {
        let appender = tracing_appender::rolling::daily(dir, "scholarly.log");
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        );
        guard = Some(file_guard);
    }

    match tracing_subscriber::registry()
        .with(layers)
        .with(build_filter(level))
        .try_init()
    {
        Ok(()) => guard,
        // 已有全局 subscriber
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let config = LoggingConfig::default();
        let _first = init_tracing(&config, Some("debug"));
        let second = init_tracing(&config, None);
        assert!(second.is_none());
    }
}
