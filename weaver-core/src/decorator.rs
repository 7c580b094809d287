//! 装饰器与装饰器顺序
//!
//! 装饰器的先后顺序由部署声明的启用顺序决定，[`DecoratorsManager`] 是每个部署的
//! 单例服务，[`DecoratorComparator`] 在代理分发时据此为装饰器排序。

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::bean::{next_bean_id, BeanId};
use crate::classloader::{ClassLoader, DeploymentKey};
use crate::constants::DECORATORS_MANAGER_SERVICE;
use crate::error::{WeaverError, WeaverResult};
use crate::intercept::Interceptor;
use crate::singleton::{self, Service, ServiceRegistration};
use crate::types::{TypeDescriptor, TypeKey};

/// 装饰器描述
///
/// `logic` 在代理的执行链中运行，调用 `ctx.proceed()` 即调用被装饰的委托。
pub struct Decorator {
    id: BeanId,
    class: Arc<TypeDescriptor>,
    logic: Arc<dyn Interceptor>,
}

impl Decorator {
    pub fn new(class: &Arc<TypeDescriptor>, logic: Arc<dyn Interceptor>) -> Arc<Self> {
        Arc::new(Self {
            id: next_bean_id(),
            class: Arc::clone(class),
            logic,
        })
    }

    pub fn id(&self) -> BeanId {
        self.id
    }

    /// 装饰器的实现类
    pub fn class(&self) -> &Arc<TypeDescriptor> {
        &self.class
    }

    pub fn logic(&self) -> &Arc<dyn Interceptor> {
        &self.logic
    }

    /// 装饰器类（或其非平台超类型）声明了该方法时才参与分发
    pub fn applies_to(&self, method: &str) -> bool {
        self.class
            .type_closure()
            .iter()
            .filter(|t| !t.is_platform())
            .any(|t| t.declared_methods().iter().any(|m| m.name() == method))
    }
}

impl PartialEq for Decorator {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Decorator {}

impl fmt::Debug for Decorator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decorator")
            .field("id", &self.id)
            .field("class", &self.class.key())
            .field("logic", &self.logic.name())
            .finish()
    }
}

/// 装饰器启用顺序
#[derive(Debug, Default)]
pub struct DecoratorsManager {
    enabled: RwLock<Vec<TypeKey>>,
}

impl DecoratorsManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取部署的 DecoratorsManager
    pub fn instance_for(key: DeploymentKey) -> WeaverResult<Arc<Self>> {
        singleton::get_singleton::<Self>(DECORATORS_MANAGER_SERVICE, key)
    }

    /// 以当前线程上下文类加载器为部署标识获取 DecoratorsManager
    pub fn instance() -> WeaverResult<Arc<Self>> {
        Self::instance_for(ClassLoader::current().key())
    }

    /// 替换启用列表，重复的类是配置错误
    pub fn set_enabled(&self, classes: Vec<TypeKey>) -> WeaverResult<()> {
        for (i, class) in classes.iter().enumerate() {
            if classes[..i].contains(class) {
                return Err(WeaverError::Configuration(format!(
                    "decorator class '{}' is enabled more than once",
                    class
                )));
            }
        }
        tracing::debug!("Enabled {} decorator class(es)", classes.len());
        *self.enabled.write() = classes;
        Ok(())
    }

    /// 在启用列表末尾追加一个类
    pub fn add_enabled(&self, class: TypeKey) -> WeaverResult<()> {
        let mut enabled = self.enabled.write();
        if enabled.contains(&class) {
            return Err(WeaverError::Configuration(format!(
                "decorator class '{}' is enabled more than once",
                class
            )));
        }
        enabled.push(class);
        Ok(())
    }

    pub fn is_enabled(&self, class: &TypeKey) -> bool {
        self.enabled.read().contains(class)
    }

    pub fn enabled(&self) -> Vec<TypeKey> {
        self.enabled.read().clone()
    }

    /// 按启用顺序比较两个装饰器类
    ///
    /// 未启用的类排在所有已启用的类之后，彼此相等。
    /// 代理创建前应先用 [`validate`](Self::validate) 拒绝未启用的装饰器。
    pub fn compare(&self, a: &TypeKey, b: &TypeKey) -> Ordering {
        let enabled = self.enabled.read();
        let position = |key: &TypeKey| enabled.iter().position(|k| k == key);
        match (position(a), position(b)) {
            (Some(pa), Some(pb)) => pa.cmp(&pb),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    /// 校验装饰器栈中的类都已启用
    pub fn validate(&self, decorators: &[Arc<Decorator>]) -> WeaverResult<()> {
        let enabled = self.enabled.read();
        match decorators.iter().find(|d| !enabled.contains(d.class().key())) {
            Some(d) => Err(WeaverError::Configuration(format!(
                "decorator class '{}' is not enabled",
                d.class().name()
            ))),
            None => Ok(()),
        }
    }

    pub fn clear(&self) {
        self.enabled.write().clear();
    }
}

fn create_decorators_manager() -> Service {
    Arc::new(DecoratorsManager::new())
}

inventory::submit! {
    ServiceRegistration::new(DECORATORS_MANAGER_SERVICE, create_decorators_manager)
}

/// 装饰器比较器
pub struct DecoratorComparator {
    manager: Arc<DecoratorsManager>,
}

impl DecoratorComparator {
    pub fn new(manager: Arc<DecoratorsManager>) -> Self {
        Self { manager }
    }

    /// 相同的装饰器直接相等，否则按实现类的启用顺序比较
    pub fn compare(&self, d1: &Decorator, d2: &Decorator) -> Ordering {
        if d1 == d2 {
            return Ordering::Equal;
        }
        self.manager.compare(d1.class().key(), d2.class().key())
    }

    /// 稳定排序：未启用的装饰器保持原有相对顺序
    pub fn sort(&self, decorators: &mut [Arc<Decorator>]) {
        decorators.sort_by(|a, b| self.compare(a, b));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intercept::FnInterceptor;
    use crate::types::Method;

    fn decorator(name: &str) -> Arc<Decorator> {
        let class = TypeDescriptor::class(format!("demo::{}", name))
            .abstract_class()
            .method(Method::abstract_method("greet"))
            .build();
        Decorator::new(&class, FnInterceptor::new(name.to_string(), |ctx| ctx.proceed()))
    }

    #[test]
    fn test_compare_follows_enablement_order() {
        let manager = DecoratorsManager::new();
        let a = TypeKey::new("demo::A");
        let b = TypeKey::new("demo::B");
        let c = TypeKey::new("demo::C");
        manager.set_enabled(vec![b.clone(), a.clone()]).unwrap();

        assert_eq!(manager.compare(&b, &a), Ordering::Less);
        assert_eq!(manager.compare(&a, &b), Ordering::Greater);
        assert_eq!(manager.compare(&a, &c), Ordering::Less);
        assert_eq!(manager.compare(&c, &b), Ordering::Greater);
        assert_eq!(manager.compare(&c, &TypeKey::new("demo::D")), Ordering::Equal);
    }

    #[test]
    fn test_disabled_decorator_does_not_block_reordering() {
        let a = decorator("A");
        let x = decorator("X");
        let b = decorator("B");
        let manager = Arc::new(DecoratorsManager::new());
        manager
            .set_enabled(vec![b.class().key().clone(), a.class().key().clone()])
            .unwrap();

        let mut stack = vec![Arc::clone(&a), Arc::clone(&x), Arc::clone(&b)];
        DecoratorComparator::new(Arc::clone(&manager)).sort(&mut stack);
        assert_eq!(stack, vec![b, a, Arc::clone(&x)]);
        assert!(manager.validate(&stack).is_err());
    }

    #[test]
    fn test_duplicate_enablement_is_rejected() {
        let manager = DecoratorsManager::new();
        let a = TypeKey::new("demo::A");
        let err = manager.set_enabled(vec![a.clone(), a.clone()]).unwrap_err();
        assert!(matches!(err, WeaverError::Configuration(_)));

        manager.add_enabled(a.clone()).unwrap();
        assert!(manager.add_enabled(a).is_err());
    }

    #[test]
    fn test_comparator_sorts_decorators() {
        let first = decorator("First");
        let second = decorator("Second");
        let manager = Arc::new(DecoratorsManager::new());
        manager
            .set_enabled(vec![first.class().key().clone(), second.class().key().clone()])
            .unwrap();
        let comparator = DecoratorComparator::new(Arc::clone(&manager));

        assert_eq!(comparator.compare(&first, &first), Ordering::Equal);

        let mut stack = vec![Arc::clone(&second), Arc::clone(&first)];
        comparator.sort(&mut stack);
        assert_eq!(stack[0], first);
        assert_eq!(stack[1], second);
    }

    #[test]
    fn test_validate_reports_disabled_decorators() {
        let enabled = decorator("Enabled");
        let disabled = decorator("Disabled");
        let manager = DecoratorsManager::new();
        manager.add_enabled(enabled.class().key().clone()).unwrap();

        assert!(manager.validate(&[Arc::clone(&enabled)]).is_ok());
        assert!(manager.validate(&[enabled, disabled]).is_err());
    }

    #[test]
    fn test_applies_to_declared_methods_only() {
        let d = decorator("Greeting");
        assert!(d.applies_to("greet"));
        assert!(!d.applies_to("toString"));
    }

    #[test]
    fn test_manager_is_per_deployment() {
        let a = DecoratorsManager::instance_for(ClassLoader::new("a").key()).unwrap();
        let b = DecoratorsManager::instance_for(ClassLoader::new("b").key()).unwrap();
        a.add_enabled(TypeKey::new("demo::Only")).unwrap();

        assert!(a.is_enabled(&TypeKey::new("demo::Only")));
        assert!(!b.is_enabled(&TypeKey::new("demo::Only")));
    }
}
