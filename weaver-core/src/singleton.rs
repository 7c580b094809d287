//! 单例注册表
//!
//! 容器的全局服务（BeanManager、DecoratorsManager、ProxyFactory）不是进程级单例，
//! 而是按部署标识隔离：部署标识 -> (服务名 -> 服务实例)。
//!
//! 服务通过 inventory 在链接期注册创建函数：
//!
//! ```ignore
//! fn create_my_service() -> Service {
//!     Arc::new(MyService::new())
//! }
//!
//! inventory::submit! {
//!     ServiceRegistration::new("my.Service", create_my_service)
//! }
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::classloader::{ClassLoader, DeploymentKey};
use crate::error::{WeaverError, WeaverResult};

/// 注册在单例注册表中的服务实例
pub type Service = Arc<dyn Any + Send + Sync>;

/// 服务注册器
///
/// 用于 inventory 自动收集服务的创建函数
pub struct ServiceRegistration {
    /// 服务名称
    pub name: &'static str,

    /// 创建服务实例的函数
    pub creator: fn() -> Service,
}

impl ServiceRegistration {
    pub const fn new(name: &'static str, creator: fn() -> Service) -> Self {
        Self { name, creator }
    }

    /// 创建服务实例
    pub fn create_instance(&self) -> Service {
        (self.creator)()
    }
}

inventory::collect!(ServiceRegistration);

/// 按名称查找服务注册器
pub fn find_registration(name: &str) -> Option<&'static ServiceRegistration> {
    inventory::iter::<ServiceRegistration>().find(|r| r.name == name)
}

/// 单例策略
///
/// 宿主（例如嵌入容器的应用服务器）可以安装自己的策略来替换部署标识的划分方式。
pub trait SingletonService: Send + Sync {
    /// 获取服务，不存在时创建；并发调用时先写入者胜出
    fn get(&self, key: DeploymentKey, name: &str) -> WeaverResult<Service>;

    /// 获取已存在的服务，从不创建
    fn get_existing(&self, key: DeploymentKey, name: &str) -> Option<Service>;

    /// 反查服务所属的部署标识
    fn get_key(&self, service: &Service) -> Option<DeploymentKey>;

    /// 清除部署标识下的所有服务
    fn clear(&self, key: DeploymentKey);
}

/// 默认单例策略
#[derive(Default)]
pub struct DefaultSingletonService {
    bags: RwLock<HashMap<DeploymentKey, HashMap<String, Service>>>,
}

impl DefaultSingletonService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SingletonService for DefaultSingletonService {
    fn get(&self, key: DeploymentKey, name: &str) -> WeaverResult<Service> {
        if let Some(existing) = self.get_existing(key, name) {
            return Ok(existing);
        }

        let registration =
            find_registration(name).ok_or_else(|| WeaverError::ServiceNotFound(name.to_string()))?;

        // 在锁外创建，服务的构造函数可能回调注册表
        let created = registration.create_instance();

        let mut bags = self.bags.write();
        let winner = bags
            .entry(key)
            .or_default()
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!("Created singleton service '{}' for {}", name, key);
                created
            });
        Ok(Arc::clone(winner))
    }

    fn get_existing(&self, key: DeploymentKey, name: &str) -> Option<Service> {
        self.bags
            .read()
            .get(&key)
            .and_then(|bag| bag.get(name))
            .cloned()
    }

    fn get_key(&self, service: &Service) -> Option<DeploymentKey> {
        let bags = self.bags.read();
        bags.iter()
            .find(|(_, bag)| {
                bag.values()
                    .any(|s| std::ptr::addr_eq(Arc::as_ptr(s), Arc::as_ptr(service)))
            })
            .map(|(key, _)| *key)
    }

    fn clear(&self, key: DeploymentKey) {
        if let Some(bag) = self.bags.write().remove(&key) {
            tracing::debug!("Cleared {} singleton service(s) for {}", bag.len(), key);
        }
    }
}

struct StrategySlot {
    service: Arc<dyn SingletonService>,
    custom_used: bool,
}

/// 单例查找入口
///
/// 策略槽与 `custom_used` 标志由同一把写锁保护，相等性检查与赋值是一个原子步骤。
pub struct SingletonRegistry {
    slot: RwLock<StrategySlot>,
}

impl SingletonRegistry {
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(StrategySlot {
                service: Arc::new(DefaultSingletonService::new()),
                custom_used: false,
            }),
        }
    }

    /// 当前生效的策略
    pub fn service(&self) -> Arc<dyn SingletonService> {
        Arc::clone(&self.slot.read().service)
    }

    /// 使用当前线程上下文类加载器作为部署标识获取服务
    pub fn get_singleton_instance(&self, name: &str) -> WeaverResult<Service> {
        self.get_singleton_instance_for(name, ClassLoader::current().key())
    }

    pub fn get_singleton_instance_for(&self, name: &str, key: DeploymentKey) -> WeaverResult<Service> {
        self.service().get(key, name)
    }

    pub fn get_existing_singleton_instance(&self, name: &str, key: DeploymentKey) -> Option<Service> {
        self.service().get_existing(key, name)
    }

    pub fn clear_instances(&self, key: DeploymentKey) {
        self.service().clear(key);
    }

    pub fn get_singleton_key(&self, service: &Service) -> Option<DeploymentKey> {
        self.service().get_key(service)
    }

    /// 安装自定义策略
    ///
    /// 只能安装一次；再次安装同一个策略（指针相同）不做任何事，安装不同的策略失败。
    pub fn set_singleton_service(&self, strategy: Arc<dyn SingletonService>) -> WeaverResult<()> {
        let mut slot = self.slot.write();
        let same = std::ptr::addr_eq(Arc::as_ptr(&slot.service), Arc::as_ptr(&strategy));

        if slot.custom_used {
            if same {
                return Ok(());
            }
            return Err(WeaverError::Configuration(
                "a different singleton service strategy has already been installed".to_string(),
            ));
        }

        slot.service = strategy;
        slot.custom_used = true;
        tracing::info!("Installed custom singleton service strategy");
        Ok(())
    }

    pub fn is_custom_service_used(&self) -> bool {
        self.slot.read().custom_used
    }

    /// 获取服务并向下转型
    pub fn get_singleton<T: Any + Send + Sync>(&self, name: &str, key: DeploymentKey) -> WeaverResult<Arc<T>> {
        let service = self.get_singleton_instance_for(name, key)?;
        service
            .downcast::<T>()
            .map_err(|_| WeaverError::TypeMismatch {
                expected: std::any::type_name::<T>().to_string(),
                found: format!("service '{}'", name),
            })
    }
}

impl Default for SingletonRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// 进程级单例注册表
static GLOBAL_SINGLETON_REGISTRY: Lazy<SingletonRegistry> = Lazy::new(SingletonRegistry::new);

/// 获取进程级单例注册表
pub fn global() -> &'static SingletonRegistry {
    &GLOBAL_SINGLETON_REGISTRY
}

/// 从进程级注册表获取类型化的服务
pub fn get_singleton<T: Any + Send + Sync>(name: &str, key: DeploymentKey) -> WeaverResult<Arc<T>> {
    global().get_singleton::<T>(name, key)
}
