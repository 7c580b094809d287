//! Weaver Proxy - 上下文引用代理
//!
//! 为托管 Bean 生成客户端代理，支持：
//! - Normal 作用域代理（Application / Request / Session / Conversation）
//! - Dependent Bean 的拦截与装饰，无可观察拦截时直接返回实例
//! - EJB 本地接口代理、抽象装饰器子类、注解字面量
//! - 按部署隔离的代理工厂与并发代理类缓存

pub mod annotation;
pub mod builder;
pub mod cache;
pub mod class;
pub mod factory;
pub mod handler;
pub mod object;
pub mod security;

// 重新导出核心类型
pub use annotation::{AnnotationHandler, AnnotationMember, AnnotationType, AnnotationValue};
pub use builder::ProxyClassBuilder;
pub use cache::{ProxyCache, ProxyRole};
pub use class::{ProxyClass, ProxyClassSpec, ProxyMethod, PROXY_OBJECT};
pub use factory::ProxyFactory;
pub use handler::{ApplicationScopedHandler, DependentScopedHandler, NormalScopedHandler};
pub use object::{as_proxy, is_proxy_instance, MethodHandler, ProxyObject};
pub use security::{ClassDefiner, PrivilegedClassDefiner};

use weaver_core::{ContainerConfig, DeploymentKey, WeaverResult};

/// 将容器配置应用到部署：日志、装饰器启用顺序与代理构建设置
///
/// 进程里已有全局订阅者时沿用它，`[logging]` 表只在第一次安装时生效
pub fn apply_config(config: &ContainerConfig, key: DeploymentKey) -> WeaverResult<()> {
    config.init_logging()?;
    config.apply(key)?;
    ProxyFactory::instance_for(key)?.configure(&config.proxy);
    tracing::info!("Container configuration applied to deployment {}", key);
    Ok(())
}

/// 预导入模块
pub mod prelude {
    pub use crate::annotation::{AnnotationType, AnnotationValue};
    pub use crate::class::{ProxyClass, ProxyClassSpec};
    pub use crate::factory::ProxyFactory;
    pub use crate::object::{as_proxy, is_proxy_instance, MethodHandler, ProxyObject};
    pub use crate::security::ClassDefiner;
    pub use crate::{apply_config, invoke};
}

/// 简化代理方法调用的宏，参数自动装箱为 `Value`
///
/// 使用示例：
/// ```ignore
/// use weaver_proxy::invoke;
///
/// let greeting = invoke!(proxy, "greet", "world".to_string())?;
/// ```
#[macro_export]
macro_rules! invoke {
    ($proxy:expr, $method:expr $(, $arg:expr)* $(,)?) => {
        $proxy.invoke(
            $method,
            &[$(::std::sync::Arc::new($arg) as ::std::sync::Arc<dyn ::std::any::Any + Send + Sync>),*],
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use weaver_core::{
        Bean, ClassLoader, CreationalContext, DecoratorsManager, Method, Scope, TypeDescriptor,
        TypeKey, Value,
    };

    #[test]
    fn test_apply_config() {
        let key = ClassLoader::new("apply-config").key();
        let config = ContainerConfig::from_toml_str(
            r#"
            [decorators]
            enabled = ["demo::Audit", "demo::Cache"]

            [proxy]
            class_name_suffix = "$$Configured"
            "#,
        )
        .unwrap();

        apply_config(&config, key).unwrap();

        let manager = DecoratorsManager::instance_for(key).unwrap();
        assert_eq!(
            manager.enabled(),
            vec![TypeKey::new("demo::Audit"), TypeKey::new("demo::Cache")]
        );
        let settings = ProxyFactory::instance_for(key).unwrap().settings();
        assert_eq!(settings.class_name_suffix, "$$Configured");
        assert!(settings.context_loader_retry);
    }

    #[test]
    fn test_apply_config_twice_tolerates_installed_subscriber() {
        let config = ContainerConfig::from_toml_str(
            r#"
            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();

        apply_config(&config, ClassLoader::new("logging-first").key()).unwrap();
        apply_config(&config, ClassLoader::new("logging-second").key()).unwrap();

        let broken = ContainerConfig::from_toml_str("[logging]\nfilter = \"weaver_proxy=loud\"").unwrap();
        let key = ClassLoader::new("logging-broken").key();
        assert!(apply_config(&broken, key).is_err());
        assert!(DecoratorsManager::instance_for(key).unwrap().enabled().is_empty());
    }

    #[test]
    fn test_invoke_macro_boxes_arguments() {
        let key = ClassLoader::new("invoke-macro").key();
        let class = TypeDescriptor::class("demo::Adder")
            .method(Method::new("add", |_, args| {
                let sum: i64 = args.iter().filter_map(|a| a.downcast_ref::<i64>()).sum();
                Ok(Arc::new(sum) as Value)
            }))
            .build();
        let bean = Bean::builder("adder", &class)
            .scope(Scope::Application)
            .producer(|_| Ok(Arc::new(()) as weaver_core::Instance))
            .build();

        let proxy = ProxyFactory::instance_for(key)
            .unwrap()
            .create_normal_scoped_bean_proxy(&bean, &CreationalContext::non_contextual())
            .unwrap();
        let sum = invoke!(proxy, "add", 2i64, 40i64).unwrap();
        assert_eq!(sum.downcast_ref::<i64>(), Some(&42));
    }
}
