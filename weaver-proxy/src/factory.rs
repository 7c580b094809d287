//! 代理工厂
//!
//! 上下文引用的唯一入口：决定返回原始实例还是代理，
//! 按 Bean 缓存代理类，并为代理实例安装对应作用域的处理器。

use std::sync::Arc;

use once_cell::sync::OnceCell;
use weaver_core::{
    singleton, Bean, ClassLoader, CreationalContext, DecoratorsManager, DeploymentKey, Instance,
    ProxyConfig, Scope, Service, ServiceRegistration, TypeDescriptor, WeaverError, WeaverResult,
    ANNOTATION_LITERAL, PROXY_FACTORY_SERVICE,
};

use crate::annotation::{annotation_interfaces, AnnotationHandler, AnnotationType, AnnotationValue};
use crate::builder::ProxyClassBuilder;
use crate::cache::{ProxyCache, ProxyRole};
use crate::class::{ProxyClass, ProxyClassSpec};
use crate::handler::{ApplicationScopedHandler, DependentScopedHandler, NormalScopedHandler};
use crate::object::{self, MethodHandler, ProxyObject};
use crate::security::{ClassDefiner, PrivilegedClassDefiner};

/// 代理工厂
pub struct ProxyFactory {
    cache: ProxyCache,
    builder: ProxyClassBuilder,
    key: OnceCell<DeploymentKey>,
}

impl ProxyFactory {
    pub fn new() -> Self {
        Self::with_definer(Arc::new(PrivilegedClassDefiner))
    }

    /// 使用宿主提供的类定义器
    pub fn with_definer(definer: Arc<dyn ClassDefiner>) -> Self {
        Self {
            cache: ProxyCache::new(),
            builder: ProxyClassBuilder::new(definer, ProxyConfig::default()),
            key: OnceCell::new(),
        }
    }

    /// 获取部署的代理工厂
    pub fn instance_for(key: DeploymentKey) -> WeaverResult<Arc<Self>> {
        let factory = singleton::get_singleton::<Self>(PROXY_FACTORY_SERVICE, key)?;
        factory.bind(key);
        Ok(factory)
    }

    /// 以当前线程上下文类加载器为部署标识获取代理工厂
    pub fn instance() -> WeaverResult<Arc<Self>> {
        Self::instance_for(ClassLoader::current().key())
    }

    /// 绑定部署标识，已绑定时忽略
    pub fn bind(&self, key: DeploymentKey) {
        if self.key.set(key).is_ok() {
            tracing::debug!("Proxy factory bound to deployment {}", key);
        }
    }

    /// 处理器解析容器服务所用的部署标识；未绑定时取当前线程的上下文类加载器
    pub fn deployment_key(&self) -> DeploymentKey {
        self.key
            .get()
            .copied()
            .unwrap_or_else(|| ClassLoader::current().key())
    }

    pub fn configure(&self, settings: &ProxyConfig) {
        self.builder.configure(settings.clone());
    }

    pub fn settings(&self) -> ProxyConfig {
        self.builder.settings()
    }

    pub fn cache(&self) -> &ProxyCache {
        &self.cache
    }

    fn cached_class(&self, role: ProxyRole, bean: &Bean) -> WeaverResult<Arc<ProxyClass>> {
        if let Some(class) = self.cache.get(role, bean.id()) {
            return Ok(class);
        }
        tracing::debug!("Proxy class cache miss for bean '{}' ({:?})", bean.name(), role);
        let built = self.builder.build(bean, &ClassLoader::current())?;
        Ok(self.cache.put_if_absent(role, bean.id(), built))
    }

    /// 装饰器栈中的类必须都已在部署中启用
    fn validate_decorators(&self, bean: &Bean) -> WeaverResult<()> {
        match bean.decorator_stack() {
            Some(stack) if !stack.is_empty() => {
                DecoratorsManager::instance_for(self.deployment_key())?.validate(stack)
            }
            _ => Ok(()),
        }
    }

    /// 装饰器与拦截器 Bean 的代理不安装处理器
    fn is_pass_through(bean: &Bean) -> bool {
        bean.is_decorator() || bean.is_interceptor()
    }

    fn instantiate(class: &Arc<ProxyClass>, handler: Option<Arc<dyn MethodHandler>>) -> WeaverResult<Arc<ProxyObject>> {
        let proxy = ProxyObject::instantiate(class);
        if let Some(handler) = handler {
            proxy.set_handler(handler)?;
        }
        Ok(proxy)
    }

    /// 创建 Normal 作用域 Bean 的客户端代理
    ///
    /// 装饰器与拦截器 Bean 的代理不安装处理器，方法直接执行父类实现。
    pub fn create_normal_scoped_bean_proxy(
        &self,
        bean: &Arc<Bean>,
        creational_context: &Arc<CreationalContext>,
    ) -> WeaverResult<Arc<ProxyObject>> {
        self.validate_decorators(bean)?;
        let class = self.cached_class(ProxyRole::NormalScoped, bean)?;

        let handler: Option<Arc<dyn MethodHandler>> = if Self::is_pass_through(bean) {
            None
        } else if bean.scope() == Scope::Application {
            Some(Arc::new(ApplicationScopedHandler::new(
                bean,
                creational_context,
                self.deployment_key(),
            )))
        } else {
            Some(Arc::new(NormalScopedHandler::new(
                bean,
                creational_context,
                self.deployment_key(),
            )))
        };

        tracing::trace!(
            "Created proxy of {} for bean '{}' (handler: {})",
            class.name(),
            bean.name(),
            handler.is_some()
        );
        Self::instantiate(&class, handler)
    }

    /// 创建 Dependent Bean 的引用
    ///
    /// 没有可观察的拦截时直接返回实例本身；否则返回持有该实例的代理。
    pub fn create_dependent_scoped_bean_proxy(
        &self,
        bean: &Arc<Bean>,
        instance: Instance,
        creational_context: &Arc<CreationalContext>,
    ) -> WeaverResult<Instance> {
        if !Self::needs_dependent_proxy(bean) {
            if creational_context.is_owned_by(bean) {
                creational_context.add_dependent(Arc::clone(&instance), Arc::clone(bean), Arc::clone(&instance));
            }
            tracing::trace!("Bean '{}' has no observable interception, returning instance", bean.name());
            return Ok(instance);
        }

        self.validate_decorators(bean)?;
        let class = self.cached_class(ProxyRole::DependentScoped, bean)?;
        let handler: Option<Arc<dyn MethodHandler>> = if Self::is_pass_through(bean) {
            None
        } else {
            Some(Arc::new(DependentScopedHandler::new(
                bean,
                instance,
                creational_context,
                self.deployment_key(),
            )))
        };
        let proxy = Self::instantiate(&class, handler)?;
        Ok(proxy.as_instance())
    }

    /// 业务方法拦截器，或 Bean 类之外定义的生命周期拦截器，或任意装饰器
    fn needs_dependent_proxy(bean: &Bean) -> bool {
        let intercepted = bean.interceptor_stack().is_some_and(|stack| {
            stack
                .iter()
                .any(|data| data.is_defined_in_interceptor_class() || !data.is_lifecycle_interceptor())
        });
        let decorated = bean.decorator_stack().is_some_and(|stack| !stack.is_empty());
        intercepted || decorated
    }

    /// 定义 EJB 本地接口代理类，按 (Bean, 接口) 缓存
    pub fn define_ejb_bean_proxy_class(
        &self,
        bean: &Bean,
        iface: &Arc<TypeDescriptor>,
        spec: &ProxyClassSpec,
    ) -> WeaverResult<Arc<ProxyClass>> {
        let row = self.cache.ejb_row(bean.id());
        if let Some(class) = row.get(iface.key()) {
            return Ok(Arc::clone(class.value()));
        }

        let spec = spec.clone().interface(iface);
        let defined = self
            .builder
            .define(&spec, &bean.bean_class().defining_loader(), &ClassLoader::current())?;
        tracing::debug!(
            "Defined EJB proxy class {} for bean '{}' and interface {}",
            defined.name(),
            bean.name(),
            iface.name()
        );
        Ok(self.cache.put_ejb_if_absent(bean.id(), iface.key().clone(), defined))
    }

    pub fn get_ejb_bean_proxy_class(&self, bean: &Bean, iface: &TypeDescriptor) -> Option<Arc<ProxyClass>> {
        self.cache.get_ejb(bean.id(), iface.key())
    }

    /// 为抽象装饰器生成可实例化的子类，不缓存
    pub fn create_abstract_decorator_proxy_class(&self, bean: &Bean) -> WeaverResult<Arc<ProxyClass>> {
        let class = self.builder.build(bean, &ClassLoader::current())?;
        tracing::debug!(
            "Created concrete subclass {} of decorator '{}'",
            class.name(),
            bean.name()
        );
        Ok(class)
    }

    /// 拦截器子系统使用的代理类
    pub fn interceptor_proxy_class(&self, bean: &Bean) -> WeaverResult<Arc<ProxyClass>> {
        self.cached_class(ProxyRole::Interceptor, bean)
    }

    /// 创建所有成员取默认值的注解实例
    pub fn create_new_annotation_proxy(&self, annotation_type: &Arc<AnnotationType>) -> WeaverResult<Arc<ProxyObject>> {
        self.create_annotation_proxy_with(annotation_type, std::iter::empty())
    }

    /// 创建注解实例，未给出的成员取默认值
    pub fn create_annotation_proxy_with(
        &self,
        annotation_type: &Arc<AnnotationType>,
        values: impl IntoIterator<Item = (String, AnnotationValue)>,
    ) -> WeaverResult<Arc<ProxyObject>> {
        let values = annotation_type.resolve_values(values)?;

        let mut spec = ProxyClassSpec::new(format!(
            "{}{}",
            annotation_type.name(),
            self.builder.settings().class_name_suffix
        ))
        .superclass(&ANNOTATION_LITERAL);
        for iface in annotation_interfaces(annotation_type) {
            spec.add_interface(&iface);
        }

        let class = self.builder.define(
            &spec,
            &annotation_type.descriptor().defining_loader(),
            &ClassLoader::current(),
        )?;
        let handler = AnnotationHandler::new(annotation_type, values);
        Self::instantiate(&class, Some(Arc::new(handler)))
    }

    pub fn is_proxy_instance(instance: &Instance) -> bool {
        object::is_proxy_instance(instance)
    }

    /// 清空全部缓存；已发出的代理实例不受影响
    pub fn clear(&self) {
        self.cache.clear();
    }
}

impl Default for ProxyFactory {
    fn default() -> Self {
        Self::new()
    }
}

fn create_proxy_factory() -> Service {
    Arc::new(ProxyFactory::new())
}

inventory::submit! {
    ServiceRegistration::new(PROXY_FACTORY_SERVICE, create_proxy_factory)
}
