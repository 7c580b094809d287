//! 运行时类型模型
//!
//! Rust 没有运行时反射，容器用 [`TypeDescriptor`] 描述一个"类"：
//! 名称、种类、父类、实现的接口，以及携带调用器的方法表。
//! 代理类的合成、可赋值性判断、目标方法调用都建立在这份描述之上。

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::classloader::ClassLoader;
use crate::error::{Result, WeaverError};

/// 容器管理的实例
pub type Instance = Arc<dyn Any + Send + Sync>;

/// 方法参数与返回值
pub type Value = Arc<dyn Any + Send + Sync>;

/// 方法调用器：接收目标实例与参数，返回结果
pub type Invoker = Arc<dyn Fn(&Instance, &[Value]) -> Result<Value> + Send + Sync>;

/// 判断两个实例是否为同一个对象（只比较数据指针）
pub fn same_instance(a: &Instance, b: &Instance) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// 基于地址的身份哈希
pub fn identity_hash(instance: &Instance) -> i32 {
    let addr = Arc::as_ptr(instance) as *const () as usize as u64;
    (addr ^ (addr >> 32)) as i32
}

/// 类型的稳定标识（全限定名）
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeKey(Arc<str>);

impl TypeKey {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        TypeKey(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 类型种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Class,
    Interface,
    Annotation,
}

/// 方法可见性
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Protected,
    Package,
    Private,
}

/// 方法描述
///
/// 没有调用器的方法视为抽象方法。方法按名称识别，不支持重载。
#[derive(Clone)]
pub struct Method {
    name: Arc<str>,
    visibility: Visibility,
    is_final: bool,
    is_static: bool,
    invoker: Option<Invoker>,
}

impl Method {
    /// 创建带实现的公有方法
    pub fn new<F>(name: impl Into<Arc<str>>, invoker: F) -> Self
    where
        F: Fn(&Instance, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            visibility: Visibility::Public,
            is_final: false,
            is_static: false,
            invoker: Some(Arc::new(invoker)),
        }
    }

    /// 创建抽象方法
    pub fn abstract_method(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            visibility: Visibility::Public,
            is_final: false,
            is_static: false,
            invoker: None,
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn final_method(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn static_method(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn is_abstract(&self) -> bool {
        self.invoker.is_none()
    }

    /// 代理类可以覆盖的方法：公有、非 final、非 static
    pub fn is_proxyable(&self) -> bool {
        self.is_public() && !self.is_final && !self.is_static
    }

    /// 在目标实例上调用此方法
    pub fn invoke(&self, target: &Instance, args: &[Value]) -> Result<Value> {
        match &self.invoker {
            Some(invoker) => invoker(target, args),
            None => Err(WeaverError::AbstractMethod(self.name.to_string()).into()),
        }
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("visibility", &self.visibility)
            .field("is_final", &self.is_final)
            .field("is_static", &self.is_static)
            .field("is_abstract", &self.is_abstract())
            .finish()
    }
}

/// 类型描述 - 容器眼中的"类"
pub struct TypeDescriptor {
    key: TypeKey,
    kind: TypeKind,
    is_abstract: bool,
    is_final: bool,
    platform: bool,
    superclass: Option<Arc<TypeDescriptor>>,
    interfaces: Vec<Arc<TypeDescriptor>>,
    methods: Vec<Method>,
    loader: Option<Arc<ClassLoader>>,
}

impl TypeDescriptor {
    /// 定义一个类，父类默认为 [`OBJECT`]
    pub fn class(name: impl Into<Arc<str>>) -> TypeBuilder {
        TypeBuilder::new(name, TypeKind::Class).extends(&OBJECT)
    }

    /// 定义一个接口
    pub fn interface(name: impl Into<Arc<str>>) -> TypeBuilder {
        TypeBuilder::new(name, TypeKind::Interface)
    }

    /// 定义一个注解类型，自动实现 [`ANNOTATION`]
    pub fn annotation(name: impl Into<Arc<str>>) -> TypeBuilder {
        TypeBuilder::new(name, TypeKind::Annotation).implements(&ANNOTATION)
    }

    pub fn key(&self) -> &TypeKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        self.key.as_str()
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn is_interface(&self) -> bool {
        matches!(self.kind, TypeKind::Interface | TypeKind::Annotation)
    }

    pub fn is_annotation(&self) -> bool {
        self.kind == TypeKind::Annotation
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract || self.is_interface()
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    /// 平台类型对所有类加载器可见
    pub fn is_platform(&self) -> bool {
        self.platform
    }

    pub fn is_object(&self) -> bool {
        self.key == *OBJECT.key()
    }

    pub fn superclass(&self) -> Option<&Arc<TypeDescriptor>> {
        self.superclass.as_ref()
    }

    pub fn interfaces(&self) -> &[Arc<TypeDescriptor>] {
        &self.interfaces
    }

    pub fn declared_methods(&self) -> &[Method] {
        &self.methods
    }

    /// 定义此类型的类加载器，未指定时为系统类加载器
    pub fn defining_loader(&self) -> Arc<ClassLoader> {
        self.loader.clone().unwrap_or_else(ClassLoader::system)
    }

    /// 判断 `other` 能否赋值给当前类型
    pub fn is_assignable_from(&self, other: &TypeDescriptor) -> bool {
        if self.key == other.key || self.is_object() {
            return true;
        }
        other
            .superclass
            .as_ref()
            .is_some_and(|parent| self.is_assignable_from(parent))
            || other
                .interfaces
                .iter()
                .any(|iface| self.is_assignable_from(iface))
    }

    /// 沿父类链查找具体实现
    pub fn find_implementation(&self, name: &str) -> Option<&Method> {
        self.methods
            .iter()
            .find(|m| m.name() == name && !m.is_abstract())
            .or_else(|| self.superclass.as_ref()?.find_implementation(name))
    }

    /// 查找方法：先查实现，再查接口声明
    pub fn find_method(&self, name: &str) -> Option<&Method> {
        self.find_implementation(name)
            .or_else(|| self.methods.iter().find(|m| m.name() == name))
            .or_else(|| self.superclass.as_ref()?.find_method(name))
            .or_else(|| {
                self.interfaces
                    .iter()
                    .find_map(|iface| iface.find_method(name))
            })
    }

    /// 类型闭包：自身、父类链与全部接口（去重，保持发现顺序）
    pub fn type_closure(self: &Arc<Self>) -> Vec<Arc<TypeDescriptor>> {
        let mut closure: Vec<Arc<TypeDescriptor>> = Vec::new();
        let mut pending = vec![Arc::clone(self)];

        while let Some(current) = pending.pop() {
            if closure.iter().any(|t| t.key == current.key) {
                continue;
            }
            for iface in current.interfaces.iter().rev() {
                pending.push(Arc::clone(iface));
            }
            if let Some(parent) = &current.superclass {
                pending.push(Arc::clone(parent));
            }
            closure.push(current);
        }

        closure
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for TypeDescriptor {}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("superclass", &self.superclass.as_ref().map(|s| s.key.clone()))
            .field(
                "interfaces",
                &self.interfaces.iter().map(|i| i.key.clone()).collect::<Vec<_>>(),
            )
            .field("methods", &self.methods.len())
            .finish()
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// TypeDescriptor 构建器
pub struct TypeBuilder {
    key: TypeKey,
    kind: TypeKind,
    is_abstract: bool,
    is_final: bool,
    platform: bool,
    superclass: Option<Arc<TypeDescriptor>>,
    interfaces: Vec<Arc<TypeDescriptor>>,
    methods: Vec<Method>,
    loader: Option<Arc<ClassLoader>>,
}

impl TypeBuilder {
    fn new(name: impl Into<Arc<str>>, kind: TypeKind) -> Self {
        Self {
            key: TypeKey::new(name),
            kind,
            is_abstract: false,
            is_final: false,
            platform: false,
            superclass: None,
            interfaces: Vec::new(),
            methods: Vec::new(),
            loader: None,
        }
    }

    /// 设置父类（仅对类有效）
    pub fn extends(mut self, superclass: &Arc<TypeDescriptor>) -> Self {
        if self.kind == TypeKind::Class {
            self.superclass = Some(Arc::clone(superclass));
        }
        self
    }

    /// 添加实现（或继承）的接口
    pub fn implements(mut self, iface: &Arc<TypeDescriptor>) -> Self {
        self.interfaces.push(Arc::clone(iface));
        self
    }

    /// 添加方法
    pub fn method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn final_class(mut self) -> Self {
        self.is_final = true;
        self
    }

    /// 指定定义此类型的类加载器
    pub fn defined_by(mut self, loader: &Arc<ClassLoader>) -> Self {
        self.loader = Some(Arc::clone(loader));
        self
    }

    fn platform(mut self) -> Self {
        self.platform = true;
        self
    }

    pub fn build(self) -> Arc<TypeDescriptor> {
        Arc::new(TypeDescriptor {
            key: self.key,
            kind: self.kind,
            is_abstract: self.is_abstract,
            is_final: self.is_final,
            platform: self.platform,
            superclass: self.superclass,
            interfaces: self.interfaces,
            methods: self.methods,
            loader: self.loader,
        })
    }
}

// ============================================================================
// 平台类型
// ============================================================================

/// 根类型，提供基于身份的 equals / hashCode / toString
pub static OBJECT: Lazy<Arc<TypeDescriptor>> = Lazy::new(|| {
    TypeBuilder::new("weaver::lang::Object", TypeKind::Class)
        .platform()
        .method(Method::new("equals", |target, args| {
            let equal = args.first().is_some_and(|other| same_instance(target, other));
            Ok(Arc::new(equal) as Value)
        }))
        .method(Method::new("hashCode", |target, _| {
            Ok(Arc::new(identity_hash(target)) as Value)
        }))
        .method(Method::new("toString", |target, _| {
            let addr = Arc::as_ptr(target) as *const () as usize;
            Ok(Arc::new(format!("Object@{:x}", addr)) as Value)
        }))
        .build()
});

/// 可序列化标记接口
pub static SERIALIZABLE: Lazy<Arc<TypeDescriptor>> = Lazy::new(|| {
    TypeBuilder::new("weaver::lang::Serializable", TypeKind::Interface)
        .platform()
        .build()
});

/// 所有注解类型的根接口
pub static ANNOTATION: Lazy<Arc<TypeDescriptor>> = Lazy::new(|| {
    TypeBuilder::new("weaver::lang::Annotation", TypeKind::Interface)
        .platform()
        .method(Method::abstract_method("annotationType"))
        .method(Method::abstract_method("equals"))
        .method(Method::abstract_method("hashCode"))
        .method(Method::abstract_method("toString"))
        .build()
});

/// 注解代理的基类
pub static ANNOTATION_LITERAL: Lazy<Arc<TypeDescriptor>> = Lazy::new(|| {
    TypeBuilder::new("weaver::AnnotationLiteral", TypeKind::Class)
        .extends(&OBJECT)
        .implements(&SERIALIZABLE)
        .abstract_class()
        .platform()
        .build()
});

#[cfg(test)]
mod tests {
    use super::*;

    fn greeter() -> Arc<TypeDescriptor> {
        TypeDescriptor::interface("demo::Greeter")
            .method(Method::abstract_method("greet"))
            .build()
    }

    #[test]
    fn test_assignability_follows_hierarchy() {
        let iface = greeter();
        let base = TypeDescriptor::class("demo::BaseGreeter")
            .implements(&iface)
            .build();
        let derived = TypeDescriptor::class("demo::LoudGreeter").extends(&base).build();

        assert!(iface.is_assignable_from(&derived));
        assert!(base.is_assignable_from(&derived));
        assert!(!derived.is_assignable_from(&base));
        assert!(OBJECT.is_assignable_from(&iface));
    }

    #[test]
    fn test_type_closure_contains_supertypes_once() {
        let iface = greeter();
        let base = TypeDescriptor::class("demo::BaseGreeter")
            .implements(&iface)
            .build();
        let derived = TypeDescriptor::class("demo::LoudGreeter")
            .extends(&base)
            .implements(&iface)
            .build();

        let closure = derived.type_closure();
        let names: Vec<&str> = closure.iter().map(|t| t.name()).collect();
        assert_eq!(names[0], "demo::LoudGreeter");
        assert!(names.contains(&"demo::BaseGreeter"));
        assert!(names.contains(&"weaver::lang::Object"));
        assert_eq!(names.iter().filter(|n| **n == "demo::Greeter").count(), 1);
    }

    #[test]
    fn test_find_method_prefers_implementation() {
        let iface = greeter();
        let class = TypeDescriptor::class("demo::PlainGreeter")
            .implements(&iface)
            .method(Method::new("greet", |_, _| Ok(Arc::new("hi".to_string()) as Value)))
            .build();

        let method = class.find_method("greet").unwrap();
        assert!(!method.is_abstract());
        assert!(iface.find_method("greet").unwrap().is_abstract());
        assert!(class.find_method("missing").is_none());
    }

    #[test]
    fn test_abstract_method_invocation_fails() {
        let method = Method::abstract_method("greet");
        let target: Instance = Arc::new(());
        let err = method.invoke(&target, &[]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WeaverError>(),
            Some(WeaverError::AbstractMethod(name)) if name == "greet"
        ));
    }

    #[test]
    fn test_object_equals_uses_identity() {
        let a: Instance = Arc::new(1u8);
        let b: Instance = Arc::new(1u8);
        let equals = OBJECT.find_method("equals").unwrap();

        let same = equals.invoke(&a, &[Arc::clone(&a)]).unwrap();
        let different = equals.invoke(&a, &[b]).unwrap();
        assert_eq!(same.downcast_ref::<bool>(), Some(&true));
        assert_eq!(different.downcast_ref::<bool>(), Some(&false));
    }
}
