use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::context::CreationalContext;
use crate::decorator::Decorator;
use crate::error::{Result, WeaverError};
use crate::intercept::InterceptorData;
use crate::scope::Scope;
use crate::types::{Instance, TypeDescriptor};

static NEXT_BEAN_ID: AtomicU64 = AtomicU64::new(1);

/// 分配新的 Bean 标识
pub(crate) fn next_bean_id() -> BeanId {
    BeanId(NEXT_BEAN_ID.fetch_add(1, Ordering::Relaxed))
}

/// Bean 的稳定标识，作为代理缓存的键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BeanId(u64);

impl fmt::Display for BeanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bean#{}", self.0)
    }
}

/// 生产者回调 - 在给定的创建上下文中创建 Bean 实例
pub type Producer = Arc<dyn Fn(&Arc<CreationalContext>) -> Result<Instance> + Send + Sync>;

/// Bean 描述 - 由外部 Bean 管理层提供
///
/// 相等性与哈希只看 [`BeanId`]。
pub struct Bean {
    id: BeanId,
    name: String,
    scope: Scope,
    bean_class: Arc<TypeDescriptor>,
    types: Vec<Arc<TypeDescriptor>>,
    is_decorator: bool,
    is_interceptor: bool,
    interceptor_stack: Option<Vec<Arc<InterceptorData>>>,
    decorator_stack: Option<Vec<Arc<Decorator>>>,
    producer: Option<Producer>,
}

impl Bean {
    /// 创建 Bean 构建器，类型闭包默认取 `bean_class` 的全部超类型
    pub fn builder(name: impl Into<String>, bean_class: &Arc<TypeDescriptor>) -> BeanBuilder {
        BeanBuilder {
            name: name.into(),
            scope: Scope::default(),
            bean_class: Arc::clone(bean_class),
            types: None,
            is_decorator: false,
            is_interceptor: false,
            interceptor_stack: None,
            decorator_stack: None,
            producer: None,
        }
    }

    pub fn id(&self) -> BeanId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn bean_class(&self) -> &Arc<TypeDescriptor> {
        &self.bean_class
    }

    /// 类型闭包（Bean 可以被收窄成的所有类型）
    pub fn types(&self) -> &[Arc<TypeDescriptor>] {
        &self.types
    }

    pub fn is_decorator(&self) -> bool {
        self.is_decorator
    }

    pub fn is_interceptor(&self) -> bool {
        self.is_interceptor
    }

    pub fn interceptor_stack(&self) -> Option<&[Arc<InterceptorData>]> {
        self.interceptor_stack.as_deref()
    }

    pub fn decorator_stack(&self) -> Option<&[Arc<Decorator>]> {
        self.decorator_stack.as_deref()
    }

    /// 通过生产者创建新实例
    pub fn create(&self, creational_context: &Arc<CreationalContext>) -> Result<Instance> {
        let producer = self.producer.as_ref().ok_or_else(|| {
            WeaverError::Configuration(format!("Bean '{}' has no producer", self.name))
        })?;
        tracing::debug!("Creating instance of bean '{}' ({})", self.name, self.id);
        producer(creational_context)
    }
}

impl PartialEq for Bean {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Bean {}

impl Hash for Bean {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Bean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bean")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("bean_class", &self.bean_class.key())
            .field("types", &self.types.len())
            .field("is_decorator", &self.is_decorator)
            .field("is_interceptor", &self.is_interceptor)
            .field(
                "interceptors",
                &self.interceptor_stack.as_ref().map(|stack| stack.len()),
            )
            .field(
                "decorators",
                &self.decorator_stack.as_ref().map(|stack| stack.len()),
            )
            .finish()
    }
}

/// Bean 构建器
pub struct BeanBuilder {
    name: String,
    scope: Scope,
    bean_class: Arc<TypeDescriptor>,
    types: Option<Vec<Arc<TypeDescriptor>>>,
    is_decorator: bool,
    is_interceptor: bool,
    interceptor_stack: Option<Vec<Arc<InterceptorData>>>,
    decorator_stack: Option<Vec<Arc<Decorator>>>,
    producer: Option<Producer>,
}

impl BeanBuilder {
    /// 设置作用域
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// 显式指定类型闭包
    pub fn types(mut self, types: Vec<Arc<TypeDescriptor>>) -> Self {
        self.types = Some(types);
        self
    }

    /// 标记为装饰器 Bean
    pub fn decorator(mut self) -> Self {
        self.is_decorator = true;
        self
    }

    /// 标记为拦截器 Bean
    pub fn interceptor(mut self) -> Self {
        self.is_interceptor = true;
        self
    }

    /// 设置拦截器栈
    pub fn interceptors(mut self, stack: Vec<Arc<InterceptorData>>) -> Self {
        self.interceptor_stack = Some(stack);
        self
    }

    /// 设置装饰器栈
    pub fn decorators(mut self, stack: Vec<Arc<Decorator>>) -> Self {
        self.decorator_stack = Some(stack);
        self
    }

    /// 设置生产者
    pub fn producer<F>(mut self, producer: F) -> Self
    where
        F: Fn(&Arc<CreationalContext>) -> Result<Instance> + Send + Sync + 'static,
    {
        self.producer = Some(Arc::new(producer));
        self
    }

    pub fn build(self) -> Arc<Bean> {
        let types = self
            .types
            .unwrap_or_else(|| self.bean_class.type_closure());
        Arc::new(Bean {
            id: next_bean_id(),
            name: self.name,
            scope: self.scope,
            bean_class: self.bean_class,
            types,
            is_decorator: self.is_decorator,
            is_interceptor: self.is_interceptor,
            interceptor_stack: self.interceptor_stack,
            decorator_stack: self.decorator_stack,
            producer: self.producer,
        })
    }
}
