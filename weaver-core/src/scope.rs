//! 作用域与作用域上下文
//!
//! Normal 作用域的上下文实例由 [`StandardContext`] 管理，每个 Bean 的槽位
//! 遵循 `Absent -> Activating -> Active(x)` 状态机：并发调用方在激活期间等待，
//! 生产者失败时回到 `Absent`，作用域销毁时回到 `Absent`。

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};

use crate::bean::{Bean, BeanId};
use crate::context::CreationalContext;
use crate::error::{Result, WeaverError};
use crate::types::Instance;

/// Bean 的作用域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// 每个注入点拥有自己的实例，生命周期由所属创建上下文决定
    Dependent,

    /// 整个应用共享一个上下文实例
    Application,

    /// 请求作用域
    Request,

    /// 会话作用域
    Session,

    /// 对话作用域
    Conversation,

    /// 伪作用域单例 - 不使用客户端代理
    Singleton,
}

impl Scope {
    /// Normal 作用域通过透明代理延迟解析目标实例
    pub fn is_normal(&self) -> bool {
        matches!(
            self,
            Scope::Application | Scope::Request | Scope::Session | Scope::Conversation
        )
    }

    pub fn is_pseudo(&self) -> bool {
        !self.is_normal()
    }
}

impl Default for Scope {
    fn default() -> Self {
        Scope::Dependent
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scope::Dependent => "Dependent",
            Scope::Application => "ApplicationScoped",
            Scope::Request => "RequestScoped",
            Scope::Session => "SessionScoped",
            Scope::Conversation => "ConversationScoped",
            Scope::Singleton => "Singleton",
        };
        f.write_str(name)
    }
}

/// 作用域上下文 - 外部作用域层的契约
pub trait ScopeContext: Send + Sync {
    /// 此上下文服务的作用域
    fn scope(&self) -> Scope;

    /// 上下文是否处于激活状态
    fn is_active(&self) -> bool;

    /// 获取已存在的上下文实例
    fn get(&self, bean: &Bean) -> Option<Instance>;

    /// 获取上下文实例，不存在时通过 Bean 的生产者在给定创建上下文中激活
    fn get_or_create(
        &self,
        bean: &Arc<Bean>,
        creational_context: &Arc<CreationalContext>,
    ) -> Result<Instance>;

    /// 销毁所有上下文实例
    fn destroy(&self);
}

enum Slot {
    Activating(ThreadId),
    Active {
        instance: Instance,
        creational_context: Arc<CreationalContext>,
    },
}

/// 默认的作用域上下文实现
pub struct StandardContext {
    scope: Scope,
    active: AtomicBool,
    /// 每次停用加一，激活中的实例只能写回开始时的那一代
    epoch: AtomicU64,
    slots: Mutex<HashMap<BeanId, Slot>>,
    ready: Condvar,
}

impl StandardContext {
    /// 创建处于激活状态的上下文
    pub fn new(scope: Scope) -> Arc<Self> {
        Arc::new(Self {
            scope,
            active: AtomicBool::new(true),
            epoch: AtomicU64::new(0),
            slots: Mutex::new(HashMap::new()),
            ready: Condvar::new(),
        })
    }

    /// 激活上下文
    pub fn activate(&self) {
        self.active.store(true, Ordering::Release);
        tracing::debug!("Scope {} activated", self.scope);
    }

    /// 停用上下文并销毁所有实例
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.destroy();
        tracing::debug!("Scope {} deactivated", self.scope);
    }

    /// 当前持有的上下文实例数量
    pub fn instance_count(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Active { .. }))
            .count()
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.is_active() && self.epoch.load(Ordering::SeqCst) == epoch
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(WeaverError::ContextNotActive(self.scope).into())
        }
    }
}

impl ScopeContext for StandardContext {
    fn scope(&self) -> Scope {
        self.scope
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn get(&self, bean: &Bean) -> Option<Instance> {
        if !self.is_active() {
            return None;
        }
        match self.slots.lock().get(&bean.id()) {
            Some(Slot::Active { instance, .. }) => Some(Arc::clone(instance)),
            _ => None,
        }
    }

    fn get_or_create(
        &self,
        bean: &Arc<Bean>,
        creational_context: &Arc<CreationalContext>,
    ) -> Result<Instance> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        self.ensure_active()?;
        let current = thread::current().id();

        {
            let mut slots = self.slots.lock();
            loop {
                match slots.get(&bean.id()) {
                    Some(Slot::Active { instance, .. }) => return Ok(Arc::clone(instance)),
                    Some(Slot::Activating(owner)) if *owner == current => {
                        return Err(WeaverError::CircularActivation(bean.name().to_string()).into());
                    }
                    Some(Slot::Activating(_)) => {
                        self.ready.wait(&mut slots);
                    }
                    None => {
                        slots.insert(bean.id(), Slot::Activating(current));
                        break;
                    }
                }
            }
        }

        // 生产者返回错误或 panic 时，guard 把槽位恢复为 Absent 并唤醒等待者
        let _activation = ActivationGuard {
            context: self,
            bean: bean.id(),
        };

        tracing::debug!("Activating bean '{}' in scope {}", bean.name(), self.scope);
        let instance = bean.create(creational_context).map_err(|e| {
            tracing::warn!(
                "Activation of bean '{}' in scope {} failed: {}",
                bean.name(),
                self.scope,
                e
            );
            e
        })?;

        {
            let mut slots = self.slots.lock();
            if self.is_current(epoch) {
                slots.insert(
                    bean.id(),
                    Slot::Active {
                        instance: Arc::clone(&instance),
                        creational_context: Arc::clone(creational_context),
                    },
                );
                return Ok(instance);
            }
        }

        tracing::debug!(
            "Scope {} was deactivated while activating bean '{}', discarding instance",
            self.scope,
            bean.name()
        );
        creational_context.release();
        Err(WeaverError::ContextNotActive(self.scope).into())
    }

    fn destroy(&self) {
        let drained: Vec<Slot> = {
            let mut slots = self.slots.lock();
            let ids: Vec<BeanId> = slots
                .iter()
                .filter(|(_, slot)| matches!(slot, Slot::Active { .. }))
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter().filter_map(|id| slots.remove(&id)).collect()
        };

        for slot in drained {
            if let Slot::Active {
                creational_context, ..
            } = slot
            {
                creational_context.release();
            }
        }
    }
}

/// 激活结束时清理仍处于 `Activating` 的槽位
struct ActivationGuard<'a> {
    context: &'a StandardContext,
    bean: BeanId,
}

impl Drop for ActivationGuard<'_> {
    fn drop(&mut self) {
        {
            let mut slots = self.context.slots.lock();
            if matches!(slots.get(&self.bean), Some(Slot::Activating(_))) {
                slots.remove(&self.bean);
            }
        }
        self.context.ready.notify_all();
    }
}

impl fmt::Debug for StandardContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandardContext")
            .field("scope", &self.scope)
            .field("active", &self.is_active())
            .field("instances", &self.instance_count())
            .finish()
    }
}
