use thiserror::Error;

use crate::scope::Scope;

/// 统一的错误处理类型
///
/// 分发路径（代理方法调用、生产者回调）使用 anyhow::Result，
/// 目标方法抛出的原始错误会原样穿过代理返回给调用方。
///
/// # 示例
///
/// ```rust,ignore
/// use anyhow::Result;
///
/// fn greet(proxy: &Arc<ProxyObject>) -> Result<String> {
///     let value = proxy.invoke("greet", &[])?;
///     Ok(value.downcast_ref::<String>().cloned().unwrap_or_default())
/// }
/// ```
pub use anyhow::Result;

/// 容器构造期错误
///
/// 代理构造、反射实例化、配置、服务查找等失败统一归入此类型。
#[derive(Debug, Error)]
pub enum WeaverError {
    /// 代理类合成或实例化失败
    #[error("Proxy creation failed: {0}")]
    ProxyCreation(String),

    /// 配置错误（例如重复安装不同的单例策略）
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Dependent 代理的实例已被释放
    #[error("Instance of bean '{0}' has already been released")]
    MissingInstance(String),

    /// 目标方法抛出的错误，仅在拦截链内部使用，返回调用方前会被剥离
    #[error("Target method failed: {0}")]
    InvocationTarget(anyhow::Error),

    /// 未注册的单例服务
    #[error("Singleton service '{0}' is not registered")]
    ServiceNotFound(String),

    /// 服务类型不匹配
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// 作用域上下文未激活
    #[error("No active context for scope {0}")]
    ContextNotActive(Scope),

    /// 方法不存在
    #[error("No method '{method}' on {type_name}")]
    NoSuchMethod { type_name: String, method: String },

    /// 调用了没有实现的抽象方法
    #[error("Method '{0}' is abstract and has no implementation")]
    AbstractMethod(String),

    /// 同一线程内重入激活同一个 Bean
    #[error("Circular activation of bean '{0}'")]
    CircularActivation(String),
}

impl WeaverError {
    /// 将目标方法的错误标记为 InvocationTarget
    pub fn invocation_target(error: anyhow::Error) -> anyhow::Error {
        anyhow::Error::new(WeaverError::InvocationTarget(error))
    }

    /// 剥离所有 InvocationTarget 包装，返回最内层的原始错误
    pub fn unwrap_invocation_target(mut error: anyhow::Error) -> anyhow::Error {
        loop {
            if !matches!(
                error.downcast_ref::<WeaverError>(),
                Some(WeaverError::InvocationTarget(_))
            ) {
                return error;
            }
            match error.downcast::<WeaverError>() {
                Ok(WeaverError::InvocationTarget(inner)) => error = inner,
                Ok(other) => return anyhow::Error::new(other),
                Err(original) => return original,
            }
        }
    }
}

/// 构造期操作的结果类型
pub type WeaverResult<T> = std::result::Result<T, WeaverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("boom")]
    struct Boom;

    #[test]
    fn test_unwrap_nested_invocation_target() {
        let wrapped = WeaverError::invocation_target(WeaverError::invocation_target(Boom.into()));
        let unwrapped = WeaverError::unwrap_invocation_target(wrapped);
        assert!(unwrapped.downcast_ref::<Boom>().is_some());
    }

    #[test]
    fn test_unwrap_leaves_other_errors_untouched() {
        let error: anyhow::Error = WeaverError::MissingInstance("greeter".to_string()).into();
        let unwrapped = WeaverError::unwrap_invocation_target(error);
        assert!(matches!(
            unwrapped.downcast_ref::<WeaverError>(),
            Some(WeaverError::MissingInstance(name)) if name == "greeter"
        ));
    }
}
