//! 代理实例
//!
//! 代理实例 = 共享的代理类（方法表）+ 每个实例一个的处理器槽位。
//! 槽位是 `OnceCell`：工厂在把代理交给调用方之前安装处理器，
//! 之后任何线程通过 happens-before 边拿到代理时都能看到它。

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use weaver_core::{Instance, Result, Value, WeaverError, WeaverResult};

use crate::class::{ProxyClass, ProxyMethod};

/// 代理方法处理器
pub trait MethodHandler: Send + Sync {
    /// 处理一次代理方法调用
    fn invoke(&self, proxy: &Arc<ProxyObject>, method: &ProxyMethod, args: &[Value]) -> Result<Value>;

    /// 用于向下转型到具体处理器
    fn as_any(&self) -> &dyn Any;
}

/// 代理实例
pub struct ProxyObject {
    class: Arc<ProxyClass>,
    handler: OnceCell<Arc<dyn MethodHandler>>,
}

impl ProxyObject {
    /// 实例化代理类，处理器槽位为空
    pub fn instantiate(class: &Arc<ProxyClass>) -> Arc<Self> {
        Arc::new(Self {
            class: Arc::clone(class),
            handler: OnceCell::new(),
        })
    }

    pub fn proxy_class(&self) -> &Arc<ProxyClass> {
        &self.class
    }

    /// 安装处理器，只能安装一次
    pub fn set_handler(&self, handler: Arc<dyn MethodHandler>) -> WeaverResult<()> {
        self.handler.set(handler).map_err(|_| {
            WeaverError::ProxyCreation(format!(
                "handler of {} is already installed",
                self.class.name()
            ))
        })
    }

    pub fn handler(&self) -> Option<&Arc<dyn MethodHandler>> {
        self.handler.get()
    }

    /// 以具体类型获取处理器
    pub fn handler_as<H: MethodHandler + 'static>(&self) -> Option<&H> {
        self.handler.get()?.as_any().downcast_ref::<H>()
    }

    /// 按名称调用方法
    ///
    /// 方法表中的方法交给处理器；没有处理器时（装饰器、拦截器 Bean 的代理）
    /// 以及不可覆盖的方法直接在代理自身上执行父类实现。
    pub fn invoke(self: &Arc<Self>, name: &str, args: &[Value]) -> Result<Value> {
        if let Some(method) = self.class.method(name) {
            return match self.handler.get() {
                Some(handler) => handler.invoke(self, method, args),
                None => match method.implementation() {
                    Some(implementation) => implementation.invoke(&self.as_instance(), args),
                    None => Err(WeaverError::AbstractMethod(name.to_string()).into()),
                },
            };
        }

        match self.class.superclass().find_method(name) {
            Some(method) => method.invoke(&self.as_instance(), args),
            None => Err(WeaverError::NoSuchMethod {
                type_name: self.class.name().to_string(),
                method: name.to_string(),
            }
            .into()),
        }
    }

    /// 作为容器实例使用
    pub fn as_instance(self: &Arc<Self>) -> Instance {
        Arc::clone(self) as Instance
    }
}

impl fmt::Debug for ProxyObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyObject")
            .field("class", &self.class.name())
            .field("has_handler", &self.handler.get().is_some())
            .finish()
    }
}

/// 判断实例是否为代理
pub fn is_proxy_instance(instance: &Instance) -> bool {
    instance.is::<ProxyObject>()
}

/// 将实例转换为代理
pub fn as_proxy(instance: &Instance) -> Option<Arc<ProxyObject>> {
    Arc::clone(instance).downcast::<ProxyObject>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ProxyClassSpec;
    use weaver_core::{ClassLoader, Method, TypeDescriptor};

    struct Echo;

    impl MethodHandler for Echo {
        fn invoke(&self, _proxy: &Arc<ProxyObject>, method: &ProxyMethod, _args: &[Value]) -> Result<Value> {
            Ok(Arc::new(format!("handled {}", method.name())) as Value)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn proxy_class() -> Arc<ProxyClass> {
        let class = TypeDescriptor::class("demo::Widget")
            .method(Method::new("name", |_, _| Ok(Arc::new("widget".to_string()) as Value)))
            .method(
                Method::new("version", |_, _| Ok(Arc::new(3u32) as Value)).final_method(),
            )
            .build();
        ProxyClass::define(
            &ProxyClassSpec::new("demo::Widget$$Proxy").superclass(&class),
            &ClassLoader::new("test"),
        )
        .unwrap()
    }

    #[test]
    fn test_handler_dispatch() {
        let proxy = ProxyObject::instantiate(&proxy_class());
        proxy.set_handler(Arc::new(Echo)).unwrap();

        let result = proxy.invoke("name", &[]).unwrap();
        assert_eq!(result.downcast_ref::<String>().unwrap(), "handled name");
        assert!(proxy.handler_as::<Echo>().is_some());
    }

    #[test]
    fn test_final_method_bypasses_handler() {
        let proxy = ProxyObject::instantiate(&proxy_class());
        proxy.set_handler(Arc::new(Echo)).unwrap();

        let result = proxy.invoke("version", &[]).unwrap();
        assert_eq!(result.downcast_ref::<u32>(), Some(&3));
    }

    #[test]
    fn test_without_handler_runs_superclass_code() {
        let proxy = ProxyObject::instantiate(&proxy_class());
        let result = proxy.invoke("name", &[]).unwrap();
        assert_eq!(result.downcast_ref::<String>().unwrap(), "widget");
    }

    #[test]
    fn test_handler_installs_once() {
        let proxy = ProxyObject::instantiate(&proxy_class());
        proxy.set_handler(Arc::new(Echo)).unwrap();
        let err = proxy.set_handler(Arc::new(Echo)).unwrap_err();
        assert!(matches!(err, WeaverError::ProxyCreation(_)));
    }

    #[test]
    fn test_unknown_method() {
        let proxy = ProxyObject::instantiate(&proxy_class());
        let err = proxy.invoke("missing", &[]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WeaverError>(),
            Some(WeaverError::NoSuchMethod { .. })
        ));
    }

    #[test]
    fn test_is_proxy_instance() {
        let proxy = ProxyObject::instantiate(&proxy_class());
        let plain: Instance = Arc::new("plain".to_string());

        assert!(is_proxy_instance(&proxy.as_instance()));
        assert!(!is_proxy_instance(&plain));
        assert!(as_proxy(&proxy.as_instance()).is_some());
        assert!(as_proxy(&plain).is_none());
    }
}
