//! 注解字面量代理
//!
//! 注解代理继承 [`ANNOTATION_LITERAL`]，实现注解类型与 [`ANNOTATION`] 根接口，
//! 成员方法从捕获的值表中取值。相等性与哈希遵循平台的注解规则：
//! 成员值逐一相等即相等，哈希为 `Σ (127 * 成员名哈希) ^ 成员值哈希`。

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use weaver_core::{
    Method, Result, TypeDescriptor, TypeKey, Value, WeaverError, WeaverResult, ANNOTATION,
};

use crate::class::ProxyMethod;
use crate::object::{as_proxy, MethodHandler, ProxyObject};

/// 与 `java.lang.String#hashCode` 相同的字符串哈希
fn string_hash(s: &str) -> i32 {
    s.encode_utf16()
        .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(c as i32))
}

/// 注解成员值
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationValue {
    Bool(bool),
    Int(i64),
    Str(String),
    Class(TypeKey),
    Enum { type_name: String, constant: String },
    Array(Vec<AnnotationValue>),
}

impl AnnotationValue {
    /// 成员值哈希
    pub fn value_hash(&self) -> i32 {
        match self {
            AnnotationValue::Bool(true) => 1231,
            AnnotationValue::Bool(false) => 1237,
            AnnotationValue::Int(v) => (v ^ (v >> 32)) as i32,
            AnnotationValue::Str(s) => string_hash(s),
            AnnotationValue::Class(key) => string_hash(key.as_str()),
            AnnotationValue::Enum { constant, .. } => string_hash(constant),
            AnnotationValue::Array(items) => items
                .iter()
                .fold(1i32, |h, item| h.wrapping_mul(31).wrapping_add(item.value_hash())),
        }
    }
}

impl fmt::Display for AnnotationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnotationValue::Bool(b) => write!(f, "{}", b),
            AnnotationValue::Int(i) => write!(f, "{}", i),
            AnnotationValue::Str(s) => write!(f, "\"{}\"", s),
            AnnotationValue::Class(key) => write!(f, "{}.class", key),
            AnnotationValue::Enum { type_name, constant } => write!(f, "{}.{}", type_name, constant),
            AnnotationValue::Array(items) => {
                write!(f, "{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// 注解成员
#[derive(Debug, Clone)]
pub struct AnnotationMember {
    pub name: String,
    pub default: Option<AnnotationValue>,
}

/// 注解类型：类型描述 + 成员表
pub struct AnnotationType {
    descriptor: Arc<TypeDescriptor>,
    members: Vec<AnnotationMember>,
}

impl AnnotationType {
    pub fn builder(name: impl Into<String>) -> AnnotationTypeBuilder {
        AnnotationTypeBuilder {
            name: name.into(),
            members: Vec::new(),
        }
    }

    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn members(&self) -> &[AnnotationMember] {
        &self.members
    }

    pub fn member(&self, name: &str) -> Option<&AnnotationMember> {
        self.members.iter().find(|m| m.name == name)
    }

    /// 用默认值补全成员值，按成员声明顺序返回
    pub fn resolve_values(
        &self,
        values: impl IntoIterator<Item = (String, AnnotationValue)>,
    ) -> WeaverResult<Vec<(String, AnnotationValue)>> {
        let mut given: Vec<(String, AnnotationValue)> = Vec::new();
        for (name, value) in values {
            if self.member(&name).is_none() {
                return Err(WeaverError::ProxyCreation(format!(
                    "@{} has no member '{}'",
                    self.name(),
                    name
                )));
            }
            given.retain(|(n, _)| *n != name);
            given.push((name, value));
        }

        self.members
            .iter()
            .map(|member| {
                let value = given
                    .iter()
                    .find(|(n, _)| *n == member.name)
                    .map(|(_, v)| v.clone())
                    .or_else(|| member.default.clone())
                    .ok_or_else(|| {
                        WeaverError::ProxyCreation(format!(
                            "@{} member '{}' has no value and no default",
                            self.name(),
                            member.name
                        ))
                    })?;
                Ok((member.name.clone(), value))
            })
            .collect()
    }
}

impl fmt::Debug for AnnotationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnotationType")
            .field("name", &self.name())
            .field("members", &self.members)
            .finish()
    }
}

/// AnnotationType 构建器
pub struct AnnotationTypeBuilder {
    name: String,
    members: Vec<AnnotationMember>,
}

impl AnnotationTypeBuilder {
    /// 添加没有默认值的成员
    pub fn member(mut self, name: impl Into<String>) -> Self {
        self.members.push(AnnotationMember {
            name: name.into(),
            default: None,
        });
        self
    }

    /// 添加带默认值的成员
    pub fn member_with_default(mut self, name: impl Into<String>, default: AnnotationValue) -> Self {
        self.members.push(AnnotationMember {
            name: name.into(),
            default: Some(default),
        });
        self
    }

    pub fn build(self) -> Arc<AnnotationType> {
        let descriptor = self
            .members
            .iter()
            .fold(TypeDescriptor::annotation(self.name), |builder, member| {
                builder.method(Method::abstract_method(member.name.as_str()))
            })
            .build();
        Arc::new(AnnotationType {
            descriptor,
            members: self.members,
        })
    }
}

/// 注解代理的处理器
pub struct AnnotationHandler {
    annotation_type: Arc<AnnotationType>,
    values: Vec<(String, AnnotationValue)>,
}

impl AnnotationHandler {
    pub fn new(annotation_type: &Arc<AnnotationType>, values: Vec<(String, AnnotationValue)>) -> Self {
        Self {
            annotation_type: Arc::clone(annotation_type),
            values,
        }
    }

    pub fn annotation_type(&self) -> &Arc<AnnotationType> {
        &self.annotation_type
    }

    pub fn value(&self, member: &str) -> Option<&AnnotationValue> {
        self.values.iter().find(|(n, _)| n == member).map(|(_, v)| v)
    }

    /// 注解哈希
    pub fn annotation_hash(&self) -> i32 {
        self.values.iter().fold(0i32, |sum, (name, value)| {
            sum.wrapping_add(string_hash(name).wrapping_mul(127) ^ value.value_hash())
        })
    }

    /// 注解相等：同一注解类型且成员值逐一相等
    pub fn annotation_equals(&self, other: &AnnotationHandler) -> bool {
        self.annotation_type.descriptor().key() == other.annotation_type.descriptor().key()
            && self.values == other.values
    }

    fn describe(&self) -> String {
        let members: Vec<String> = self
            .values
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        format!("@{}({})", self.annotation_type.name(), members.join(", "))
    }
}

impl MethodHandler for AnnotationHandler {
    fn invoke(&self, _proxy: &Arc<ProxyObject>, method: &ProxyMethod, args: &[Value]) -> Result<Value> {
        match method.name() {
            "annotationType" => Ok(Arc::new(Arc::clone(self.annotation_type.descriptor())) as Value),
            "hashCode" => Ok(Arc::new(self.annotation_hash()) as Value),
            "toString" => Ok(Arc::new(self.describe()) as Value),
            "equals" => {
                let equal = args
                    .first()
                    .and_then(as_proxy)
                    .and_then(|other| {
                        other
                            .handler_as::<AnnotationHandler>()
                            .map(|handler| self.annotation_equals(handler))
                    })
                    .unwrap_or(false);
                Ok(Arc::new(equal) as Value)
            }
            member => self
                .value(member)
                .map(|value| Arc::new(value.clone()) as Value)
                .ok_or_else(|| {
                    WeaverError::NoSuchMethod {
                        type_name: self.annotation_type.name().to_string(),
                        method: member.to_string(),
                    }
                    .into()
                }),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for AnnotationHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// 注解代理的接口集合：注解类型 + 注解根接口
pub(crate) fn annotation_interfaces(annotation_type: &AnnotationType) -> [Arc<TypeDescriptor>; 2] {
    [Arc::clone(annotation_type.descriptor()), Arc::clone(&ANNOTATION)]
}
