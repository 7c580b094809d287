// weaver-core: 上下文依赖注入容器的核心模型
//
// 提供代理层所依赖的全部协作者：
// - 运行时类型模型（类、接口、注解、方法表）
// - 类加载器与部署标识
// - Bean 描述、创建上下文、作用域上下文
// - 拦截器链与装饰器顺序
// - 按部署隔离的单例注册表

pub mod bean;
pub mod bean_manager;
pub mod classloader;
pub mod config;
pub mod constants;
pub mod context;
pub mod decorator;
pub mod error;
pub mod intercept;
pub mod logging;
pub mod matcher;
pub mod scope;
pub mod singleton;
pub mod types;

// 重新导出常用类型
pub use bean::{Bean, BeanBuilder, BeanId, Producer};
pub use bean_manager::BeanManager;
pub use classloader::{ClassLoader, ContextLoaderGuard, DeploymentKey};
pub use config::{ContainerConfig, DecoratorConfig, ProxyConfig};
pub use constants::*;
pub use context::{CreationalContext, DependentInstance};
pub use decorator::{Decorator, DecoratorComparator, DecoratorsManager};
pub use error::{Result, WeaverError, WeaverResult};
pub use intercept::{FnInterceptor, InterceptionType, Interceptor, InterceptorData, InvocationContext};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use matcher::{MethodMatcher, Pattern};
pub use scope::{Scope, ScopeContext, StandardContext};
pub use singleton::{
    DefaultSingletonService, Service, ServiceRegistration, SingletonRegistry, SingletonService,
};
pub use types::{
    Instance, Invoker, Method, TypeBuilder, TypeDescriptor, TypeKey, TypeKind, Value, Visibility,
    ANNOTATION, ANNOTATION_LITERAL, OBJECT, SERIALIZABLE,
};

// 导出 inventory，供注册服务使用
pub use inventory;

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::bean::{Bean, BeanId};
    pub use crate::bean_manager::BeanManager;
    pub use crate::classloader::{ClassLoader, DeploymentKey};
    pub use crate::context::CreationalContext;
    pub use crate::decorator::{Decorator, DecoratorsManager};
    pub use crate::error::{Result, WeaverError, WeaverResult};
    pub use crate::intercept::{FnInterceptor, Interceptor, InterceptorData, InvocationContext};
    pub use crate::matcher::MethodMatcher;
    pub use crate::scope::{Scope, ScopeContext, StandardContext};
    pub use crate::types::{Instance, Method, TypeDescriptor, TypeKey, Value};
    // Re-export anyhow for convenience
    pub use anyhow::{anyhow, Context};
}
