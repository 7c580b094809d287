//! 拦截器分发处理器
//!
//! 每次代理方法调用：
//! 1. 解析上下文实例（Application / 其他 Normal 作用域 / Dependent）
//! 2. 组装执行链：排好序的装饰器在前，业务方法拦截器在后
//! 3. 执行链，链尾在上下文实例上调用方法实现
//! 4. 把调用中新建的 Dependent 子实例转移到所属的创建上下文
//! 5. 剥离链内部的包装，把目标方法的原始错误返回给调用方

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use weaver_core::{
    Bean, BeanManager, CreationalContext, Decorator, DecoratorComparator, DecoratorsManager,
    DeploymentKey, Instance, Interceptor, InvocationContext, Result, Scope, ScopeContext, Value,
    WeaverError,
};

use crate::class::ProxyMethod;
use crate::object::{MethodHandler, ProxyObject};

/// 三种处理器共享的分发逻辑
struct InterceptorHandler {
    bean: Arc<Bean>,
    creational_context: Weak<CreationalContext>,
    deployment: DeploymentKey,
    decorators: OnceCell<Vec<Arc<Decorator>>>,
}

impl InterceptorHandler {
    fn new(bean: &Arc<Bean>, creational_context: &Arc<CreationalContext>, deployment: DeploymentKey) -> Self {
        Self {
            bean: Arc::clone(bean),
            creational_context: Arc::downgrade(creational_context),
            deployment,
            decorators: OnceCell::new(),
        }
    }

    /// 按部署的启用顺序排好的装饰器栈，首次使用时排序
    fn decorators(&self) -> &[Arc<Decorator>] {
        self.decorators.get_or_init(|| {
            let mut stack = self
                .bean
                .decorator_stack()
                .map(|stack| stack.to_vec())
                .unwrap_or_default();
            if stack.len() > 1 {
                match DecoratorsManager::instance_for(self.deployment) {
                    Ok(manager) => DecoratorComparator::new(manager).sort(&mut stack),
                    Err(e) => tracing::warn!(
                        "Decorators of bean '{}' left unordered: {}",
                        self.bean.name(),
                        e
                    ),
                }
            }
            stack
        })
    }

    fn chain_for(&self, method: &str) -> Vec<Arc<dyn Interceptor>> {
        let type_name = self.bean.bean_class().name();
        let decorators = self
            .decorators()
            .iter()
            .filter(|d| d.applies_to(method))
            .map(|d| Arc::clone(d.logic()));
        let interceptors = self
            .bean
            .interceptor_stack()
            .unwrap_or_default()
            .iter()
            .filter(|data| data.applies_to(type_name, method))
            .map(|data| Arc::clone(data.interceptor()));
        decorators.chain(interceptors).collect()
    }

    fn dispatch(&self, instance: &Instance, method: &ProxyMethod, args: &[Value]) -> Result<Value> {
        let chain = self.chain_for(method.name());
        let child = CreationalContext::new(Some(Arc::clone(&self.bean)));

        tracing::trace!(
            "Dispatching {}::{} through {} chain element(s)",
            self.bean.name(),
            method.name(),
            chain.len()
        );

        let result = {
            let mut ctx = InvocationContext::new(
                instance,
                self.bean.bean_class(),
                method.name(),
                args.to_vec(),
                &chain,
                &child,
            );
            ctx.proceed()
        };

        match self.creational_context.upgrade() {
            Some(governing) => governing.absorb(&child),
            None => {
                let dropped = child.release();
                if !dropped.is_empty() {
                    tracing::debug!(
                        "Creational context of bean '{}' is gone, dropped {} dependent(s)",
                        self.bean.name(),
                        dropped.len()
                    );
                }
            }
        }

        result.map_err(WeaverError::unwrap_invocation_target)
    }

    /// 在作用域上下文中查找或激活上下文实例
    fn contextual_instance(&self, context: &dyn ScopeContext) -> Result<Instance> {
        if let Some(instance) = context.get(&self.bean) {
            return Ok(instance);
        }
        let creational_context = CreationalContext::new(Some(Arc::clone(&self.bean)));
        context.get_or_create(&self.bean, &creational_context)
    }
}

/// Application 作用域处理器
///
/// 缓存 Application 上下文，每次调用仍从上下文重新取实例，
/// 作用域销毁重建后代理会看到新的实例。
pub struct ApplicationScopedHandler {
    inner: InterceptorHandler,
    context: OnceCell<Arc<dyn ScopeContext>>,
}

impl ApplicationScopedHandler {
    pub fn new(bean: &Arc<Bean>, creational_context: &Arc<CreationalContext>, deployment: DeploymentKey) -> Self {
        Self {
            inner: InterceptorHandler::new(bean, creational_context, deployment),
            context: OnceCell::new(),
        }
    }

    pub fn bean(&self) -> &Arc<Bean> {
        &self.inner.bean
    }

    fn context(&self) -> Result<&Arc<dyn ScopeContext>> {
        let context = self.context.get_or_try_init(|| {
            BeanManager::instance_for(self.inner.deployment)?.context(Scope::Application)
        })?;
        Ok(context)
    }
}

impl MethodHandler for ApplicationScopedHandler {
    fn invoke(&self, _proxy: &Arc<ProxyObject>, method: &ProxyMethod, args: &[Value]) -> Result<Value> {
        let instance = self.inner.contextual_instance(self.context()?.as_ref())?;
        self.inner.dispatch(&instance, method, args)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for ApplicationScopedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationScopedHandler")
            .field("bean", &self.inner.bean.name())
            .finish()
    }
}

/// 其他 Normal 作用域（请求、会话、对话）的处理器
///
/// 每次调用都从当前绑定的作用域上下文解析实例
pub struct NormalScopedHandler {
    inner: InterceptorHandler,
    bean_manager: OnceCell<Arc<BeanManager>>,
}

impl NormalScopedHandler {
    pub fn new(bean: &Arc<Bean>, creational_context: &Arc<CreationalContext>, deployment: DeploymentKey) -> Self {
        Self {
            inner: InterceptorHandler::new(bean, creational_context, deployment),
            bean_manager: OnceCell::new(),
        }
    }

    pub fn bean(&self) -> &Arc<Bean> {
        &self.inner.bean
    }

    fn bean_manager(&self) -> Result<&Arc<BeanManager>> {
        let manager = self
            .bean_manager
            .get_or_try_init(|| BeanManager::instance_for(self.inner.deployment))?;
        Ok(manager)
    }
}

impl MethodHandler for NormalScopedHandler {
    fn invoke(&self, _proxy: &Arc<ProxyObject>, method: &ProxyMethod, args: &[Value]) -> Result<Value> {
        let context = self.bean_manager()?.context(self.inner.bean.scope())?;
        let instance = self.inner.contextual_instance(context.as_ref())?;
        self.inner.dispatch(&instance, method, args)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for NormalScopedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NormalScopedHandler")
            .field("bean", &self.inner.bean.name())
            .field("scope", &self.inner.bean.scope())
            .finish()
    }
}

/// Dependent 作用域处理器，持有构造时捕获的实例
pub struct DependentScopedHandler {
    inner: InterceptorHandler,
    instance: Mutex<Option<Instance>>,
}

impl DependentScopedHandler {
    pub fn new(
        bean: &Arc<Bean>,
        instance: Instance,
        creational_context: &Arc<CreationalContext>,
        deployment: DeploymentKey,
    ) -> Self {
        Self {
            inner: InterceptorHandler::new(bean, creational_context, deployment),
            instance: Mutex::new(Some(instance)),
        }
    }

    pub fn bean(&self) -> &Arc<Bean> {
        &self.inner.bean
    }

    /// 释放捕获的实例，之后的调用返回 [`WeaverError::MissingInstance`]
    pub fn release(&self) -> Option<Instance> {
        let released = self.instance.lock().take();
        if released.is_some() {
            tracing::debug!("Released dependent instance of bean '{}'", self.inner.bean.name());
        }
        released
    }

    pub fn instance(&self) -> Option<Instance> {
        self.instance.lock().clone()
    }
}

impl MethodHandler for DependentScopedHandler {
    fn invoke(&self, _proxy: &Arc<ProxyObject>, method: &ProxyMethod, args: &[Value]) -> Result<Value> {
        let instance = self
            .instance()
            .ok_or_else(|| WeaverError::MissingInstance(self.inner.bean.name().to_string()))?;
        self.inner.dispatch(&instance, method, args)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for DependentScopedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependentScopedHandler")
            .field("bean", &self.inner.bean.name())
            .field("released", &self.instance.lock().is_none())
            .finish()
    }
}
