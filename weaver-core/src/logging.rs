//! 日志初始化
//!
//! 对应配置中的 `[logging]` 表，由 [`ContainerConfig::init_logging`](crate::ContainerConfig::init_logging)
//! 在部署应用配置时安装全局订阅者。宿主已经安装了订阅者时保留宿主的。

use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{WeaverError, WeaverResult};

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Compact,
    /// 每行一个 JSON 对象，适合日志采集
    Json,
    Pretty,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,

    /// 过滤指令，例如 "weaver_proxy=trace,weaver_core=debug"
    ///
    /// 未设置时依次使用 `RUST_LOG` 与 `level`
    pub filter: Option<String>,

    /// 输出线程 ID，排查跨线程分发时有用
    pub thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            filter: None,
            thread_ids: false,
        }
    }
}

impl LoggingConfig {
    /// 实际生效的过滤指令
    pub fn directives(&self) -> String {
        self.filter
            .clone()
            .or_else(|| std::env::var("RUST_LOG").ok().filter(|v| !v.trim().is_empty()))
            .unwrap_or_else(|| self.level.directive().to_string())
    }

    fn env_filter(&self) -> WeaverResult<EnvFilter> {
        let directives = self.directives();
        EnvFilter::try_new(&directives).map_err(|e| {
            WeaverError::Configuration(format!("invalid [logging] filter '{}': {}", directives, e))
        })
    }

    /// 安装全局订阅者
    ///
    /// 返回 `false` 表示进程里已经有订阅者，本次配置被忽略。
    /// 过滤指令非法时返回配置错误。
    pub fn init(&self) -> WeaverResult<bool> {
        let filter = self.env_filter()?;
        let builder = fmt().with_env_filter(filter).with_thread_ids(self.thread_ids);

        let installed = match self.format {
            LogFormat::Compact => builder.compact().try_init(),
            LogFormat::Json => builder.json().try_init(),
            LogFormat::Pretty => builder.pretty().try_init(),
        };

        match installed {
            Ok(()) => {
                tracing::debug!("Logging initialized ({:?}, {})", self.format, self.directives());
                Ok(true)
            }
            Err(e) => {
                tracing::debug!("Keeping the existing global subscriber: {}", e);
                Ok(false)
            }
        }
    }
}
