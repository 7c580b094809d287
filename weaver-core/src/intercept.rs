//! 拦截器与调用上下文
//!
//! 代理处理器把装饰器与拦截器组装成一条链，链上的每个元素通过
//! [`InvocationContext::proceed`] 把调用交给下一个元素，链尾在
//! 上下文实例上调用 Bean 类的方法实现。

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::context::CreationalContext;
use crate::error::{Result, WeaverError};
use crate::matcher::MethodMatcher;
use crate::types::{Instance, TypeDescriptor, Value};

/// 拦截类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterceptionType {
    AroundInvoke,
    AroundTimeout,
    PostConstruct,
    PreDestroy,
    PostActivate,
    PrePassivate,
}

impl InterceptionType {
    /// 生命周期回调不在业务方法分发中执行
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            InterceptionType::PostConstruct
                | InterceptionType::PreDestroy
                | InterceptionType::PostActivate
                | InterceptionType::PrePassivate
        )
    }
}

/// 拦截器 Trait
///
/// 实现 `around_invoke` 并在其中调用 `ctx.proceed()` 继续执行链，
/// 也可以不调用以短路目标方法。
pub trait Interceptor: Send + Sync {
    /// 拦截器名称
    fn name(&self) -> &str;

    /// 环绕调用
    fn around_invoke(&self, ctx: &mut InvocationContext<'_>) -> Result<Value>;
}

/// 由闭包实现的拦截器
pub struct FnInterceptor<F> {
    name: String,
    func: F,
}

impl<F> FnInterceptor<F>
where
    F: Fn(&mut InvocationContext<'_>) -> Result<Value> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, func: F) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            func,
        })
    }
}

impl<F> Interceptor for FnInterceptor<F>
where
    F: Fn(&mut InvocationContext<'_>) -> Result<Value> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn around_invoke(&self, ctx: &mut InvocationContext<'_>) -> Result<Value> {
        (self.func)(ctx)
    }
}

/// 拦截器栈中的一项
pub struct InterceptorData {
    interceptor: Arc<dyn Interceptor>,
    interception_type: InterceptionType,
    defined_in_interceptor_class: bool,
    matcher: MethodMatcher,
}

impl InterceptorData {
    /// 定义在拦截器类中、作用于所有业务方法的 AroundInvoke 拦截器
    pub fn around_invoke(interceptor: Arc<dyn Interceptor>) -> Self {
        Self {
            interceptor,
            interception_type: InterceptionType::AroundInvoke,
            defined_in_interceptor_class: true,
            matcher: MethodMatcher::All,
        }
    }

    /// 生命周期拦截器
    pub fn lifecycle(interceptor: Arc<dyn Interceptor>, interception_type: InterceptionType) -> Self {
        Self {
            interceptor,
            interception_type,
            defined_in_interceptor_class: true,
            matcher: MethodMatcher::All,
        }
    }

    /// 标记为 Bean 类自身声明的拦截方法
    pub fn defined_in_bean_class(mut self) -> Self {
        self.defined_in_interceptor_class = false;
        self
    }

    /// 限定作用的方法
    pub fn matching(mut self, matcher: MethodMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn interceptor(&self) -> &Arc<dyn Interceptor> {
        &self.interceptor
    }

    pub fn interception_type(&self) -> InterceptionType {
        self.interception_type
    }

    pub fn is_defined_in_interceptor_class(&self) -> bool {
        self.defined_in_interceptor_class
    }

    pub fn is_lifecycle_interceptor(&self) -> bool {
        self.interception_type.is_lifecycle()
    }

    /// 是否参与给定业务方法的分发
    pub fn applies_to(&self, type_name: &str, method: &str) -> bool {
        !self.is_lifecycle_interceptor() && self.matcher.matches(type_name, method)
    }
}

impl fmt::Debug for InterceptorData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorData")
            .field("interceptor", &self.interceptor.name())
            .field("interception_type", &self.interception_type)
            .field("defined_in_interceptor_class", &self.defined_in_interceptor_class)
            .field("matcher", &self.matcher)
            .finish()
    }
}

/// 一次业务方法调用的执行链
pub struct InvocationContext<'a> {
    target: &'a Instance,
    target_class: &'a TypeDescriptor,
    method: &'a str,
    args: Vec<Value>,
    chain: &'a [Arc<dyn Interceptor>],
    position: usize,
    creational_context: &'a Arc<CreationalContext>,
}

impl<'a> InvocationContext<'a> {
    pub fn new(
        target: &'a Instance,
        target_class: &'a TypeDescriptor,
        method: &'a str,
        args: Vec<Value>,
        chain: &'a [Arc<dyn Interceptor>],
        creational_context: &'a Arc<CreationalContext>,
    ) -> Self {
        Self {
            target,
            target_class,
            method,
            args,
            chain,
            position: 0,
            creational_context,
        }
    }

    /// 继续执行链上的下一个元素；链尾调用目标方法
    ///
    /// 目标方法的错误被包装为 [`WeaverError::InvocationTarget`]，
    /// 由处理器在返回调用方前剥离。
    pub fn proceed(&mut self) -> Result<Value> {
        if let Some(next) = self.chain.get(self.position) {
            let next = Arc::clone(next);
            self.position += 1;
            tracing::trace!("  ├─ {} -> {}", self.signature(), next.name());
            let result = next.around_invoke(self);
            self.position -= 1;
            return result;
        }

        let method = self.target_class.find_method(self.method).ok_or_else(|| {
            WeaverError::NoSuchMethod {
                type_name: self.target_class.name().to_string(),
                method: self.method.to_string(),
            }
        })?;
        method
            .invoke(self.target, &self.args)
            .map_err(WeaverError::invocation_target)
    }

    /// 上下文实例
    pub fn target(&self) -> &Instance {
        self.target
    }

    pub fn target_class(&self) -> &TypeDescriptor {
        self.target_class
    }

    pub fn method(&self) -> &str {
        self.method
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// 替换传给后续元素的参数
    pub fn set_args(&mut self, args: Vec<Value>) {
        self.args = args;
    }

    /// 按位置取参数并向下转型
    pub fn arg<T: Any + Send + Sync>(&self, index: usize) -> Option<&T> {
        self.args.get(index)?.downcast_ref::<T>()
    }

    /// 本次调用的创建上下文，调用中创建的 Dependent 实例记录在此
    pub fn creational_context(&self) -> &Arc<CreationalContext> {
        self.creational_context
    }

    /// 完整的方法签名
    pub fn signature(&self) -> String {
        format!("{}::{}", self.target_class.name(), self.method)
    }
}

impl fmt::Debug for InvocationContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("signature", &self.signature())
            .field("args", &self.args.len())
            .field("position", &self.position)
            .field("chain", &self.chain.len())
            .finish()
    }
}
