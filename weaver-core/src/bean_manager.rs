use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::classloader::{ClassLoader, DeploymentKey};
use crate::constants::BEAN_MANAGER_SERVICE;
use crate::error::{WeaverError, WeaverResult};
use crate::scope::{Scope, ScopeContext, StandardContext};
use crate::singleton::{self, Service, ServiceRegistration};

/// BeanManager - 每个部署的作用域上下文注册中心
///
/// 创建时自带一个已激活的 Application 上下文；
/// 其他 Normal 作用域的上下文由外部作用域层通过 [`add_context`](Self::add_context) 注册。
pub struct BeanManager {
    application: Arc<StandardContext>,
    contexts: RwLock<HashMap<Scope, Arc<dyn ScopeContext>>>,
}

impl BeanManager {
    pub fn new() -> Self {
        let application = StandardContext::new(Scope::Application);
        let mut contexts: HashMap<Scope, Arc<dyn ScopeContext>> = HashMap::new();
        contexts.insert(Scope::Application, Arc::clone(&application) as Arc<dyn ScopeContext>);
        Self {
            application,
            contexts: RwLock::new(contexts),
        }
    }

    /// 获取部署的 BeanManager
    pub fn instance_for(key: DeploymentKey) -> WeaverResult<Arc<Self>> {
        singleton::get_singleton::<Self>(BEAN_MANAGER_SERVICE, key)
    }

    /// 以当前线程上下文类加载器为部署标识获取 BeanManager
    pub fn instance() -> WeaverResult<Arc<Self>> {
        Self::instance_for(ClassLoader::current().key())
    }

    /// 注册作用域上下文，同一作用域只能注册一次
    pub fn add_context(&self, context: Arc<dyn ScopeContext>) -> WeaverResult<()> {
        let scope = context.scope();
        if !scope.is_normal() {
            return Err(WeaverError::Configuration(format!(
                "scope {} is not a normal scope",
                scope
            )));
        }

        let mut contexts = self.contexts.write();
        if contexts.contains_key(&scope) {
            return Err(WeaverError::Configuration(format!(
                "a context for scope {} is already registered",
                scope
            )));
        }
        contexts.insert(scope, context);
        tracing::debug!("Registered context for scope {}", scope);
        Ok(())
    }

    /// 获取作用域的激活上下文
    pub fn context(&self, scope: Scope) -> WeaverResult<Arc<dyn ScopeContext>> {
        self.contexts
            .read()
            .get(&scope)
            .filter(|context| context.is_active())
            .cloned()
            .ok_or(WeaverError::ContextNotActive(scope))
    }

    /// 内置的 Application 上下文
    pub fn application_context(&self) -> &Arc<StandardContext> {
        &self.application
    }

    pub fn has_context(&self, scope: Scope) -> bool {
        self.contexts.read().contains_key(&scope)
    }
}

impl Default for BeanManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BeanManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scopes: Vec<Scope> = self.contexts.read().keys().copied().collect();
        f.debug_struct("BeanManager").field("scopes", &scopes).finish()
    }
}

fn create_bean_manager() -> Service {
    Arc::new(BeanManager::new())
}

inventory::submit! {
    ServiceRegistration::new(BEAN_MANAGER_SERVICE, create_bean_manager)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_context_is_builtin() {
        let manager = BeanManager::new();
        let context = manager.context(Scope::Application).unwrap();
        assert_eq!(context.scope(), Scope::Application);
        assert!(context.is_active());
    }

    #[test]
    fn test_missing_or_inactive_context() {
        let manager = BeanManager::new();
        assert!(matches!(
            manager.context(Scope::Request),
            Err(WeaverError::ContextNotActive(Scope::Request))
        ));

        manager.application_context().deactivate();
        assert!(manager.context(Scope::Application).is_err());
        manager.application_context().activate();
        assert!(manager.context(Scope::Application).is_ok());
    }

    #[test]
    fn test_add_context() {
        let manager = BeanManager::new();
        manager.add_context(StandardContext::new(Scope::Request)).unwrap();
        assert!(manager.context(Scope::Request).is_ok());

        let duplicate = manager.add_context(StandardContext::new(Scope::Request));
        assert!(matches!(duplicate, Err(WeaverError::Configuration(_))));

        let pseudo = manager.add_context(StandardContext::new(Scope::Dependent));
        assert!(matches!(pseudo, Err(WeaverError::Configuration(_))));
    }

    #[test]
    fn test_instance_is_per_deployment() {
        let key = ClassLoader::new("bean-manager").key();
        let a = BeanManager::instance_for(key).unwrap();
        let b = BeanManager::instance_for(key).unwrap();
        let other = BeanManager::instance_for(ClassLoader::new("other").key()).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &other));
    }
}
