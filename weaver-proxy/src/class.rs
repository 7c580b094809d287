//! 代理类
//!
//! 代理类是一张共享的方法表（vtable）：父类链与接口上所有公有、非 final、非 static 的
//! 方法都登记在表中，调用经由代理实例的处理器槽位分发。

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use weaver_core::{ClassLoader, Method, TypeDescriptor, TypeKey, WeaverError, WeaverResult, OBJECT};

static NEXT_PROXY_CLASS_ID: AtomicU64 = AtomicU64::new(1);

/// 处理器槽位标记接口，所有代理类都实现它
pub static PROXY_OBJECT: Lazy<Arc<TypeDescriptor>> =
    Lazy::new(|| TypeDescriptor::interface("weaver::proxy::ProxyObject").build());

/// 代理类的构建参数
#[derive(Clone)]
pub struct ProxyClassSpec {
    /// 父类，`None` 表示根类型
    pub superclass: Option<Arc<TypeDescriptor>>,

    /// 实现的接口
    pub interfaces: Vec<Arc<TypeDescriptor>>,

    /// 生成类名的前缀
    pub name_hint: String,
}

impl ProxyClassSpec {
    pub fn new(name_hint: impl Into<String>) -> Self {
        Self {
            superclass: None,
            interfaces: Vec::new(),
            name_hint: name_hint.into(),
        }
    }

    pub fn superclass(mut self, superclass: &Arc<TypeDescriptor>) -> Self {
        self.superclass = Some(Arc::clone(superclass));
        self
    }

    /// 添加接口（已存在时忽略）
    pub fn interface(mut self, iface: &Arc<TypeDescriptor>) -> Self {
        self.add_interface(iface);
        self
    }

    pub fn add_interface(&mut self, iface: &Arc<TypeDescriptor>) {
        if !self.interfaces.iter().any(|i| i.key() == iface.key()) {
            self.interfaces.push(Arc::clone(iface));
        }
    }
}

impl fmt::Debug for ProxyClassSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyClassSpec")
            .field("superclass", &self.superclass.as_ref().map(|s| s.key().clone()))
            .field(
                "interfaces",
                &self.interfaces.iter().map(|i| i.key().clone()).collect::<Vec<_>>(),
            )
            .field("name_hint", &self.name_hint)
            .finish()
    }
}

/// 代理方法表中的一项
#[derive(Clone)]
pub struct ProxyMethod {
    name: Arc<str>,
    declared_by: TypeKey,
    implementation: Option<Method>,
}

impl ProxyMethod {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 声明此方法的类型
    pub fn declared_by(&self) -> &TypeKey {
        &self.declared_by
    }

    /// 父类链上的实现，抽象方法为 `None`
    pub fn implementation(&self) -> Option<&Method> {
        self.implementation.as_ref()
    }

    pub fn is_abstract(&self) -> bool {
        self.implementation.is_none()
    }
}

impl fmt::Debug for ProxyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyMethod")
            .field("name", &self.name)
            .field("declared_by", &self.declared_by)
            .field("is_abstract", &self.is_abstract())
            .finish()
    }
}

/// 代理类
pub struct ProxyClass {
    id: u64,
    name: String,
    superclass: Arc<TypeDescriptor>,
    interfaces: Vec<Arc<TypeDescriptor>>,
    methods: Vec<ProxyMethod>,
    loader: Arc<ClassLoader>,
}

impl ProxyClass {
    /// 在给定类加载器下定义代理类
    ///
    /// 父类为 final 或为接口、或某个类型对加载器不可见时失败。
    pub fn define(spec: &ProxyClassSpec, loader: &Arc<ClassLoader>) -> WeaverResult<Arc<Self>> {
        let superclass = spec.superclass.clone().unwrap_or_else(|| Arc::clone(&OBJECT));

        if superclass.is_interface() {
            return Err(WeaverError::ProxyCreation(format!(
                "{} is an interface and cannot be a proxy superclass",
                superclass.name()
            )));
        }
        if superclass.is_final() {
            return Err(WeaverError::ProxyCreation(format!(
                "{} is final and cannot be proxied",
                superclass.name()
            )));
        }
        if let Some(not_interface) = spec.interfaces.iter().find(|i| !i.is_interface()) {
            return Err(WeaverError::ProxyCreation(format!(
                "{} is not an interface",
                not_interface.name()
            )));
        }

        let mut interfaces = spec.interfaces.clone();
        if !interfaces.iter().any(|i| i.key() == PROXY_OBJECT.key()) {
            interfaces.push(Arc::clone(&PROXY_OBJECT));
        }

        let invisible = std::iter::once(&superclass)
            .chain(interfaces.iter())
            .find(|ty| !loader.can_see(ty));
        if let Some(ty) = invisible {
            return Err(WeaverError::ProxyCreation(format!(
                "{} is not visible from class loader '{}'",
                ty.name(),
                loader.name()
            )));
        }

        let methods = Self::collect_methods(&superclass, &interfaces);
        let id = NEXT_PROXY_CLASS_ID.fetch_add(1, Ordering::Relaxed);
        let class = Arc::new(Self {
            id,
            name: format!("{}_{}", spec.name_hint, id),
            superclass,
            interfaces,
            methods,
            loader: Arc::clone(loader),
        });

        tracing::debug!(
            "Defined proxy class {} ({} method(s)) in class loader '{}'",
            class.name,
            class.methods.len(),
            loader.name()
        );
        Ok(class)
    }

    /// 收集可代理的方法：父类链由子到父，然后是接口；同名方法只登记第一次出现
    fn collect_methods(
        superclass: &Arc<TypeDescriptor>,
        interfaces: &[Arc<TypeDescriptor>],
    ) -> Vec<ProxyMethod> {
        let mut chain = Vec::new();
        let mut current = Some(superclass);
        while let Some(ty) = current {
            chain.push(Arc::clone(ty));
            current = ty.superclass();
        }
        for iface in interfaces {
            chain.extend(iface.type_closure());
        }

        let mut seen: HashSet<&str> = HashSet::new();
        let mut sealed: HashSet<&str> = HashSet::new();
        let mut methods = Vec::new();

        for ty in &chain {
            for method in ty.declared_methods() {
                let name = method.name();
                if seen.contains(name) || sealed.contains(name) {
                    continue;
                }
                // 子类中 final 的方法不能再被覆盖
                if !method.is_proxyable() {
                    if method.is_final() {
                        sealed.insert(name);
                    }
                    continue;
                }
                seen.insert(name);
                methods.push(ProxyMethod {
                    name: Arc::from(name),
                    declared_by: ty.key().clone(),
                    implementation: superclass.find_implementation(name).cloned(),
                });
            }
        }

        methods
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn superclass(&self) -> &Arc<TypeDescriptor> {
        &self.superclass
    }

    pub fn interfaces(&self) -> &[Arc<TypeDescriptor>] {
        &self.interfaces
    }

    /// 代理方法表
    pub fn methods(&self) -> &[ProxyMethod] {
        &self.methods
    }

    pub fn method(&self, name: &str) -> Option<&ProxyMethod> {
        self.methods.iter().find(|m| m.name() == name)
    }

    /// 定义代理类的类加载器
    pub fn loader(&self) -> &Arc<ClassLoader> {
        &self.loader
    }

    /// 代理实例能否赋值给给定类型
    pub fn is_assignable_to(&self, ty: &TypeDescriptor) -> bool {
        ty.is_assignable_from(&self.superclass)
            || self.interfaces.iter().any(|i| ty.is_assignable_from(i))
    }

    pub fn implements(&self, key: &TypeKey) -> bool {
        self.interfaces.iter().any(|i| i.key() == key)
    }
}

impl PartialEq for ProxyClass {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ProxyClass {}

impl fmt::Debug for ProxyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyClass")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("superclass", self.superclass.key())
            .field(
                "interfaces",
                &self.interfaces.iter().map(|i| i.key().clone()).collect::<Vec<_>>(),
            )
            .field("methods", &self.methods)
            .field("loader", &self.loader.name())
            .finish()
    }
}
