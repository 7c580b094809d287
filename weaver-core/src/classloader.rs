//! 类加载器与部署标识
//!
//! 容器的全局服务按部署标识（[`DeploymentKey`]）隔离，默认策略下部署标识
//! 就是当前线程上下文类加载器的身份。类加载器同时决定代理类能否被定义：
//! 受限的加载器只能看到平台类型和显式列出的类型。

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::types::{TypeDescriptor, TypeKey};

static NEXT_LOADER_ID: AtomicU64 = AtomicU64::new(1);

static SYSTEM_LOADER: Lazy<Arc<ClassLoader>> = Lazy::new(|| ClassLoader::create("system", None, None));

thread_local! {
    static CONTEXT_LOADER: RefCell<Option<Arc<ClassLoader>>> = const { RefCell::new(None) };
}

/// 部署标识 - 划分容器全局服务的不透明身份
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeploymentKey(u64);

impl DeploymentKey {
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DeploymentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deployment#{}", self.0)
    }
}

/// 类加载器
pub struct ClassLoader {
    key: DeploymentKey,
    name: String,
    parent: Option<Arc<ClassLoader>>,
    /// None 表示可见所有类型
    visible: Option<HashSet<TypeKey>>,
}

impl ClassLoader {
    fn create(
        name: &str,
        parent: Option<Arc<ClassLoader>>,
        visible: Option<HashSet<TypeKey>>,
    ) -> Arc<Self> {
        let id = NEXT_LOADER_ID.fetch_add(1, Ordering::Relaxed);
        Arc::new(Self {
            key: DeploymentKey(id),
            name: name.to_string(),
            parent,
            visible,
        })
    }

    /// 创建可见所有类型的类加载器
    pub fn new(name: &str) -> Arc<Self> {
        Self::create(name, None, None)
    }

    /// 创建受限类加载器，只能看到平台类型、列出的类型以及父加载器可见的类型
    pub fn isolated(
        name: &str,
        parent: Option<&Arc<ClassLoader>>,
        visible: impl IntoIterator<Item = TypeKey>,
    ) -> Arc<Self> {
        Self::create(name, parent.cloned(), Some(visible.into_iter().collect()))
    }

    /// 系统类加载器
    pub fn system() -> Arc<Self> {
        Arc::clone(&SYSTEM_LOADER)
    }

    /// 当前线程的上下文类加载器，未设置时为系统类加载器
    pub fn current() -> Arc<Self> {
        CONTEXT_LOADER
            .with(|slot| slot.borrow().clone())
            .unwrap_or_else(Self::system)
    }

    /// 设置当前线程的上下文类加载器，guard 释放时恢复原值
    pub fn set_context(loader: &Arc<ClassLoader>) -> ContextLoaderGuard {
        let previous = CONTEXT_LOADER.with(|slot| slot.replace(Some(Arc::clone(loader))));
        tracing::trace!("Context class loader set to '{}'", loader.name);
        ContextLoaderGuard { previous }
    }

    pub fn key(&self) -> DeploymentKey {
        self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<ClassLoader>> {
        self.parent.as_ref()
    }

    /// 判断此加载器（或其祖先）是否为 `other`
    pub fn delegates_to(&self, other: &ClassLoader) -> bool {
        self.key == other.key || self.parent.as_ref().is_some_and(|p| p.delegates_to(other))
    }

    /// 判断类型对此加载器是否可见
    pub fn can_see(&self, ty: &TypeDescriptor) -> bool {
        if ty.is_platform() || self.delegates_to(&ty.defining_loader()) {
            return true;
        }
        self.sees_key(ty.key())
    }

    fn sees_key(&self, key: &TypeKey) -> bool {
        match &self.visible {
            None => true,
            Some(keys) => {
                keys.contains(key) || self.parent.as_ref().is_some_and(|p| p.sees_key(key))
            }
        }
    }
}

impl fmt::Debug for ClassLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassLoader")
            .field("key", &self.key)
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name.clone()))
            .field("restricted", &self.visible.is_some())
            .finish()
    }
}

/// 上下文类加载器的 RAII guard
pub struct ContextLoaderGuard {
    previous: Option<Arc<ClassLoader>>,
}

impl Drop for ContextLoaderGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CONTEXT_LOADER.with(|slot| {
            *slot.borrow_mut() = previous;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SERIALIZABLE;

    #[test]
    fn test_context_loader_guard_restores_previous() {
        let outer = ClassLoader::new("outer");
        let inner = ClassLoader::new("inner");

        assert_eq!(ClassLoader::current().key(), ClassLoader::system().key());
        {
            let _outer_guard = ClassLoader::set_context(&outer);
            assert_eq!(ClassLoader::current().key(), outer.key());
            {
                let _inner_guard = ClassLoader::set_context(&inner);
                assert_eq!(ClassLoader::current().key(), inner.key());
            }
            assert_eq!(ClassLoader::current().key(), outer.key());
        }
        assert_eq!(ClassLoader::current().key(), ClassLoader::system().key());
    }

    #[test]
    fn test_context_loader_is_thread_local() {
        let loader = ClassLoader::new("deployment");
        let _guard = ClassLoader::set_context(&loader);

        let other_thread_key = std::thread::spawn(|| ClassLoader::current().key())
            .join()
            .unwrap();
        assert_eq!(other_thread_key, ClassLoader::system().key());
    }

    #[test]
    fn test_isolated_visibility() {
        let app_type = TypeDescriptor::interface("app::Service").build();
        let hidden = TypeDescriptor::interface("lib::Hidden").build();
        let loader = ClassLoader::isolated("app", None, [app_type.key().clone()]);

        assert!(loader.can_see(&app_type));
        assert!(loader.can_see(&SERIALIZABLE));
        assert!(!loader.can_see(&hidden));
        assert!(ClassLoader::new("open").can_see(&hidden));
    }

    #[test]
    fn test_loader_sees_types_it_defined() {
        let loader = ClassLoader::isolated("app", None, []);
        let child = ClassLoader::isolated("web", Some(&loader), []);
        let own = TypeDescriptor::class("app::Own").defined_by(&loader).build();

        assert!(loader.can_see(&own));
        assert!(child.can_see(&own));
    }
}
