//! 容器配置
//!
//! 从 TOML 读取：
//!
//! ```toml
//! [logging]
//! level = "debug"
//! format = "json"
//!
//! [decorators]
//! enabled = ["app::AuditDecorator", "app::CachingDecorator"]
//!
//! [proxy]
//! context_loader_retry = true
//! class_name_suffix = "$$WeaverProxy"
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::classloader::DeploymentKey;
use crate::constants::DEFAULT_PROXY_CLASS_SUFFIX;
use crate::decorator::DecoratorsManager;
use crate::error::{WeaverError, WeaverResult};
use crate::logging::LoggingConfig;
use crate::types::TypeKey;

/// 容器配置
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    pub logging: LoggingConfig,
    pub decorators: DecoratorConfig,
    pub proxy: ProxyConfig,
}

/// 装饰器配置
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DecoratorConfig {
    /// 装饰器启用顺序（类型全限定名）
    pub enabled: Vec<String>,
}

/// 代理构建配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// 定义代理类失败时，是否用调用线程的上下文类加载器重试一次
    pub context_loader_retry: bool,

    /// 代理类名后缀
    pub class_name_suffix: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            context_loader_retry: true,
            class_name_suffix: DEFAULT_PROXY_CLASS_SUFFIX.to_string(),
        }
    }
}

impl ContainerConfig {
    /// 从 TOML 字符串解析
    pub fn from_toml_str(content: &str) -> WeaverResult<Self> {
        toml::from_str(content)
            .map_err(|e| WeaverError::Configuration(format!("Failed to parse TOML: {}", e)))
    }

    /// 从文件加载
    pub fn from_file(path: impl AsRef<Path>) -> WeaverResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            WeaverError::Configuration(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        tracing::debug!("Loaded container configuration from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// 启用的装饰器类
    pub fn enabled_decorators(&self) -> Vec<TypeKey> {
        self.decorators
            .enabled
            .iter()
            .map(|name| TypeKey::new(name.as_str()))
            .collect()
    }

    /// 按 `[logging]` 表安装日志订阅者，宿主已安装时返回 `false`
    pub fn init_logging(&self) -> WeaverResult<bool> {
        self.logging.init()
    }

    /// 把装饰器启用顺序写入部署的 DecoratorsManager
    pub fn apply(&self, key: DeploymentKey) -> WeaverResult<()> {
        if let Some(blank) = self.decorators.enabled.iter().find(|name| name.trim().is_empty()) {
            return Err(WeaverError::Configuration(format!(
                "invalid decorator class name '{}' in [decorators] enabled",
                blank
            )));
        }
        let manager = DecoratorsManager::instance_for(key)?;
        manager.set_enabled(self.enabled_decorators())?;
        tracing::info!(
            "Applied configuration to {}: {} decorator(s) enabled",
            key,
            self.decorators.enabled.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classloader::ClassLoader;
    use crate::logging::{LogFormat, LogLevel};

    #[test]
    fn test_defaults() {
        let config = ContainerConfig::from_toml_str("").unwrap();
        assert!(config.proxy.context_loader_retry);
        assert_eq!(config.proxy.class_name_suffix, DEFAULT_PROXY_CLASS_SUFFIX);
        assert!(config.decorators.enabled.is_empty());
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_parse_all_sections() {
        let config = ContainerConfig::from_toml_str(
            r#"
            [logging]
            level = "debug"
            format = "json"

            [decorators]
            enabled = ["app::Audit", "app::Cache"]

            [proxy]
            context_loader_retry = false
            class_name_suffix = "$Proxy"
            "#,
        )
        .unwrap();

        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(
            config.enabled_decorators(),
            vec![TypeKey::new("app::Audit"), TypeKey::new("app::Cache")]
        );
        assert!(!config.proxy.context_loader_retry);
        assert_eq!(config.proxy.class_name_suffix, "$Proxy");
    }

    #[test]
    fn test_invalid_toml() {
        let err = ContainerConfig::from_toml_str("[proxy\n").unwrap_err();
        assert!(matches!(err, WeaverError::Configuration(_)));
    }

    #[test]
    fn test_apply_sets_decorator_order() {
        let key = ClassLoader::new("configured").key();
        let config = ContainerConfig::from_toml_str(
            r#"
            [decorators]
            enabled = ["app::Second", "app::First"]
            "#,
        )
        .unwrap();

        config.apply(key).unwrap();
        let manager = DecoratorsManager::instance_for(key).unwrap();
        assert_eq!(
            manager.compare(&TypeKey::new("app::Second"), &TypeKey::new("app::First")),
            std::cmp::Ordering::Less
        );
    }

    #[test]
    fn test_init_logging_uses_logging_table() {
        let config = ContainerConfig::from_toml_str(
            r#"
            [logging]
            filter = "weaver_core=nonsense"
            "#,
        )
        .unwrap();
        assert!(matches!(config.init_logging(), Err(WeaverError::Configuration(_))));

        let config = ContainerConfig::from_toml_str("[logging]\nlevel = \"debug\"").unwrap();
        assert!(config.init_logging().is_ok());
        assert!(!config.init_logging().unwrap());
    }

    #[test]
    fn test_apply_rejects_duplicates() {
        let config = ContainerConfig::from_toml_str(
            r#"
            [decorators]
            enabled = ["app::Twice", "app::Twice"]
            "#,
        )
        .unwrap();
        assert!(config.apply(ClassLoader::new("dup").key()).is_err());
    }
}
