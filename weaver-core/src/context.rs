//! 创建上下文（Creational Context）
//!
//! 代表一次依赖注入调用点，记录在满足请求过程中创建的 Dependent 子实例。
//! 核心只追加子实例，释放由外部生命周期层负责。

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bean::Bean;
use crate::types::{same_instance, Instance};

/// Dependent 子实例：(身份, Bean, 实例)
#[derive(Clone)]
pub struct DependentInstance {
    pub identity: Instance,
    pub bean: Arc<Bean>,
    pub instance: Instance,
}

impl fmt::Debug for DependentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependentInstance")
            .field("bean", &self.bean.name())
            .finish()
    }
}

/// 创建上下文
///
/// 持有 Dependent 子实例的强引用；子实例（以及代理处理器）只弱引用上下文，
/// 从而打破 Bean / 上下文 / 代理之间的循环引用。
pub struct CreationalContext {
    owner: Option<Arc<Bean>>,
    dependents: Mutex<Vec<DependentInstance>>,
}

impl CreationalContext {
    /// 创建属于 `owner` 的上下文；`None` 表示非上下文注入
    pub fn new(owner: Option<Arc<Bean>>) -> Arc<Self> {
        Arc::new(Self {
            owner,
            dependents: Mutex::new(Vec::new()),
        })
    }

    /// 非上下文注入使用的上下文
    pub fn non_contextual() -> Arc<Self> {
        Self::new(None)
    }

    /// 拥有此上下文的 Bean
    pub fn owning_bean(&self) -> Option<&Arc<Bean>> {
        self.owner.as_ref()
    }

    /// 判断此上下文是否属于给定 Bean
    pub fn is_owned_by(&self, bean: &Bean) -> bool {
        self.owner.as_deref().is_some_and(|owner| owner == bean)
    }

    /// 追加一个 Dependent 子实例
    pub fn add_dependent(&self, identity: Instance, bean: Arc<Bean>, instance: Instance) {
        tracing::trace!("Recording dependent instance of bean '{}'", bean.name());
        self.dependents.lock().push(DependentInstance {
            identity,
            bean,
            instance,
        });
    }

    /// 将另一个上下文中的子实例全部转移到此上下文
    pub fn absorb(&self, other: &CreationalContext) {
        if std::ptr::eq(self, other) {
            return;
        }
        let moved: Vec<DependentInstance> = other.dependents.lock().drain(..).collect();
        if moved.is_empty() {
            return;
        }
        tracing::trace!("Absorbing {} dependent instance(s)", moved.len());
        self.dependents.lock().extend(moved);
    }

    /// 当前记录的子实例快照
    pub fn dependents(&self) -> Vec<DependentInstance> {
        self.dependents.lock().clone()
    }

    pub fn dependent_count(&self) -> usize {
        self.dependents.lock().len()
    }

    /// 判断给定实例是否已作为子实例记录
    pub fn contains_dependent(&self, instance: &Instance) -> bool {
        self.dependents
            .lock()
            .iter()
            .any(|d| same_instance(&d.instance, instance))
    }

    /// 释放上下文，返回被移除的子实例
    pub fn release(&self) -> Vec<DependentInstance> {
        let released: Vec<DependentInstance> = self.dependents.lock().drain(..).collect();
        tracing::debug!(
            "Released creational context of {:?} with {} dependent(s)",
            self.owner.as_ref().map(|b| b.name()),
            released.len()
        );
        released
    }
}

impl fmt::Debug for CreationalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreationalContext")
            .field("owner", &self.owner.as_ref().map(|b| b.name()))
            .field("dependents", &self.dependent_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeDescriptor;

    fn bean(name: &str) -> Arc<Bean> {
        let class = TypeDescriptor::class(format!("demo::{}", name)).build();
        Bean::builder(name, &class).build()
    }

    #[test]
    fn test_ownership() {
        let owner = bean("owner");
        let other = bean("other");
        let cc = CreationalContext::new(Some(Arc::clone(&owner)));

        assert!(cc.is_owned_by(&owner));
        assert!(!cc.is_owned_by(&other));
        assert!(!CreationalContext::non_contextual().is_owned_by(&owner));
    }

    #[test]
    fn test_add_absorb_release() {
        let owner = bean("owner");
        let child_bean = bean("child");
        let parent = CreationalContext::new(Some(Arc::clone(&owner)));
        let child = CreationalContext::new(Some(Arc::clone(&child_bean)));

        let instance: Instance = Arc::new("dep".to_string());
        child.add_dependent(Arc::clone(&instance), Arc::clone(&child_bean), Arc::clone(&instance));
        assert_eq!(child.dependent_count(), 1);

        parent.absorb(&child);
        assert_eq!(child.dependent_count(), 0);
        assert!(parent.contains_dependent(&instance));

        let released = parent.release();
        assert_eq!(released.len(), 1);
        assert_eq!(parent.dependent_count(), 0);
    }
}
