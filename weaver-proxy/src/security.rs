//! 代理类定义的安全入口
//!
//! 宿主可以安装自己的 [`ClassDefiner`]，在受控权限下执行代理类合成。

use std::sync::Arc;

use weaver_core::{ClassLoader, WeaverResult};

use crate::class::{ProxyClass, ProxyClassSpec};

/// 代理类定义器
pub trait ClassDefiner: Send + Sync {
    fn define(&self, spec: &ProxyClassSpec, loader: &Arc<ClassLoader>) -> WeaverResult<Arc<ProxyClass>>;
}

/// 默认定义器，直接在给定类加载器下定义代理类
#[derive(Debug, Default, Clone, Copy)]
pub struct PrivilegedClassDefiner;

impl ClassDefiner for PrivilegedClassDefiner {
    fn define(&self, spec: &ProxyClassSpec, loader: &Arc<ClassLoader>) -> WeaverResult<Arc<ProxyClass>> {
        tracing::trace!("Defining proxy class for {} in '{}'", spec.name_hint, loader.name());
        ProxyClass::define(spec, loader)
    }
}
