/// 容器全局服务名称常量
///
/// 单例注册表按服务名称查找创建函数，注册方与查找方必须使用同一个名称，
/// 新增全局服务时在这里添加对应的常量。

/// BeanManager 服务名称
pub const BEAN_MANAGER_SERVICE: &str = "weaver.BeanManager";

/// DecoratorsManager 服务名称
pub const DECORATORS_MANAGER_SERVICE: &str = "weaver.DecoratorsManager";

/// ProxyFactory 服务名称
pub const PROXY_FACTORY_SERVICE: &str = "weaver.ProxyFactory";

/// 代理类名中的默认分隔后缀
pub const DEFAULT_PROXY_CLASS_SUFFIX: &str = "$$WeaverProxy";

