use std::sync::Arc;

use parking_lot::RwLock;
use weaver_core::{Bean, ClassLoader, ProxyConfig, WeaverResult, SERIALIZABLE};

use crate::class::{ProxyClass, ProxyClassSpec};
use crate::security::ClassDefiner;

/// 代理类构建器
///
/// 从 Bean 的类型闭包推导父类与接口，并通过 [`ClassDefiner`] 定义代理类。
/// 构建结果不做缓存：并发构建可能得到不同的类对象，由代理缓存决定胜出者。
pub struct ProxyClassBuilder {
    definer: Arc<dyn ClassDefiner>,
    settings: RwLock<ProxyConfig>,
}

impl ProxyClassBuilder {
    pub fn new(definer: Arc<dyn ClassDefiner>, settings: ProxyConfig) -> Self {
        Self {
            definer,
            settings: RwLock::new(settings),
        }
    }

    pub fn configure(&self, settings: ProxyConfig) {
        *self.settings.write() = settings;
    }

    pub fn settings(&self) -> ProxyConfig {
        self.settings.read().clone()
    }

    /// 推导代理类的父类与接口
    ///
    /// 接口全部收集；父类取最具体的非根类；始终实现可序列化标记。
    pub fn spec_for_bean(&self, bean: &Bean) -> ProxyClassSpec {
        let mut spec = ProxyClassSpec::new(format!(
            "{}{}",
            bean.bean_class().name(),
            self.settings.read().class_name_suffix
        ));

        for ty in bean.types() {
            if ty.is_interface() {
                spec.add_interface(ty);
                continue;
            }
            let replace = match &spec.superclass {
                None => true,
                Some(current) => current.is_assignable_from(ty) && !ty.is_object(),
            };
            if replace {
                spec.superclass = Some(Arc::clone(ty));
            }
        }

        spec.add_interface(&SERIALIZABLE);
        spec
    }

    /// 为 Bean 构建代理类
    ///
    /// 先在 Bean 类的定义加载器下定义；失败时用调用线程的上下文类加载器重试一次。
    pub fn build(&self, bean: &Bean, context_loader: &Arc<ClassLoader>) -> WeaverResult<Arc<ProxyClass>> {
        let spec = self.spec_for_bean(bean);
        self.define(&spec, &bean.bean_class().defining_loader(), context_loader)
    }

    /// 在指定加载器下定义，按配置决定是否用上下文类加载器重试
    pub fn define(
        &self,
        spec: &ProxyClassSpec,
        loader: &Arc<ClassLoader>,
        context_loader: &Arc<ClassLoader>,
    ) -> WeaverResult<Arc<ProxyClass>> {
        match self.definer.define(spec, loader) {
            Ok(class) => Ok(class),
            Err(e) if self.settings.read().context_loader_retry && context_loader.key() != loader.key() => {
                tracing::warn!(
                    "Defining {} in class loader '{}' failed ({}), retrying with context class loader '{}'",
                    spec.name_hint,
                    loader.name(),
                    e,
                    context_loader.name()
                );
                self.definer.define(spec, context_loader)
            }
            Err(e) => Err(e),
        }
    }
}
