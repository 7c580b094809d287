use std::sync::Arc;

use dashmap::DashMap;
use weaver_core::{BeanId, TypeKey};

use crate::class::ProxyClass;

/// 代理类在缓存中的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyRole {
    NormalScoped,
    DependentScoped,
    Interceptor,
}

/// 代理类缓存
///
/// 四张并发映射，均以 Bean 标识为键；EJB 映射按本地接口再分一层。
/// 写入是 put-if-absent：竞争失败方的类对象被丢弃，所有调用方拿到同一个胜出者。
#[derive(Default)]
pub struct ProxyCache {
    normal_scoped: DashMap<BeanId, Arc<ProxyClass>>,
    dependent_scoped: DashMap<BeanId, Arc<ProxyClass>>,
    interceptor: DashMap<BeanId, Arc<ProxyClass>>,
    ejb: DashMap<BeanId, Arc<DashMap<TypeKey, Arc<ProxyClass>>>>,
}

impl ProxyCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, role: ProxyRole) -> &DashMap<BeanId, Arc<ProxyClass>> {
        match role {
            ProxyRole::NormalScoped => &self.normal_scoped,
            ProxyRole::DependentScoped => &self.dependent_scoped,
            ProxyRole::Interceptor => &self.interceptor,
        }
    }

    pub fn get(&self, role: ProxyRole, bean: BeanId) -> Option<Arc<ProxyClass>> {
        self.map(role).get(&bean).map(|entry| Arc::clone(entry.value()))
    }

    /// 写入并返回胜出者
    pub fn put_if_absent(&self, role: ProxyRole, bean: BeanId, class: Arc<ProxyClass>) -> Arc<ProxyClass> {
        let winner = Arc::clone(self.map(role).entry(bean).or_insert(class).value());
        winner
    }

    /// Bean 的 EJB 接口映射，不存在时创建
    pub fn ejb_row(&self, bean: BeanId) -> Arc<DashMap<TypeKey, Arc<ProxyClass>>> {
        if let Some(row) = self.ejb.get(&bean) {
            return Arc::clone(row.value());
        }
        let row = self
            .ejb
            .entry(bean)
            .or_insert_with(|| Arc::new(DashMap::new()))
            .value()
            .clone();
        row
    }

    pub fn get_ejb(&self, bean: BeanId, iface: &TypeKey) -> Option<Arc<ProxyClass>> {
        let row = self.ejb.get(&bean).map(|row| Arc::clone(row.value()))?;
        let class = row.get(iface).map(|entry| Arc::clone(entry.value()));
        class
    }

    pub fn put_ejb_if_absent(&self, bean: BeanId, iface: TypeKey, class: Arc<ProxyClass>) -> Arc<ProxyClass> {
        let row = self.ejb_row(bean);
        let winner = Arc::clone(row.entry(iface).or_insert(class).value());
        winner
    }

    pub fn len(&self, role: ProxyRole) -> usize {
        self.map(role).len()
    }

    /// 所有 EJB 代理类的数量
    pub fn ejb_len(&self) -> usize {
        self.ejb.iter().map(|row| row.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.normal_scoped.is_empty()
            && self.dependent_scoped.is_empty()
            && self.interceptor.is_empty()
            && self.ejb.is_empty()
    }

    /// 清空四张映射；已发出的代理实例不受影响
    pub fn clear(&self) {
        self.normal_scoped.clear();
        self.dependent_scoped.clear();
        self.interceptor.clear();
        self.ejb.clear();
        tracing::debug!("Proxy cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ProxyClassSpec;
    use weaver_core::{Bean, ClassLoader, TypeDescriptor};

    fn class() -> Arc<ProxyClass> {
        ProxyClass::define(&ProxyClassSpec::new("cached"), &ClassLoader::new("cache")).unwrap()
    }

    fn bean_id() -> BeanId {
        Bean::builder("cached", &TypeDescriptor::class("demo::Cached").build())
            .build()
            .id()
    }

    #[test]
    fn test_first_writer_wins() {
        let cache = ProxyCache::new();
        let id = bean_id();
        let first = class();
        let second = class();

        let winner = cache.put_if_absent(ProxyRole::NormalScoped, id, Arc::clone(&first));
        let loser = cache.put_if_absent(ProxyRole::NormalScoped, id, second);
        assert!(Arc::ptr_eq(&winner, &first));
        assert!(Arc::ptr_eq(&loser, &first));
        assert!(cache.get(ProxyRole::DependentScoped, id).is_none());
    }

    #[test]
    fn test_ejb_rows_are_keyed_by_interface() {
        let cache = ProxyCache::new();
        let id = bean_id();
        let local = TypeKey::new("demo::Local");
        let remote = TypeKey::new("demo::Remote");

        let a = cache.put_ejb_if_absent(id, local.clone(), class());
        let b = cache.put_ejb_if_absent(id, remote.clone(), class());
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&cache.get_ejb(id, &local).unwrap(), &a));
        assert_eq!(cache.ejb_len(), 2);
    }

    #[test]
    fn test_clear() {
        let cache = ProxyCache::new();
        let id = bean_id();
        cache.put_if_absent(ProxyRole::Interceptor, id, class());
        cache.put_ejb_if_absent(id, TypeKey::new("demo::Local"), class());
        assert!(!cache.is_empty());

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get(ProxyRole::Interceptor, id).is_none());
    }

    #[test]
    fn test_concurrent_put_agrees() {
        let cache = Arc::new(ProxyCache::new());
        let id = bean_id();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.put_if_absent(ProxyRole::DependentScoped, id, class()))
            })
            .collect();
        let winners: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(winners.iter().all(|w| Arc::ptr_eq(w, &winners[0])));
    }
}
