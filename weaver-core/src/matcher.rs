//! 方法匹配表达式
//!
//! 决定拦截器作用于哪些业务方法

use regex::Regex;
use std::sync::Arc;

/// 通配符模式，构建时编译一次
///
/// - `*` - 匹配任意字符串
/// - `get*` - 以 get 开头
/// - `*Service` - 以 Service 结尾
#[derive(Clone)]
pub enum Pattern {
    Any,
    Exact(String),
    Wildcard(Regex),
}

impl Pattern {
    pub fn new(pattern: &str) -> Self {
        if pattern == "*" {
            return Pattern::Any;
        }
        if !pattern.contains('*') {
            return Pattern::Exact(pattern.to_string());
        }

        let regex_pattern = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        match Regex::new(&format!("^{}$", regex_pattern)) {
            Ok(regex) => Pattern::Wildcard(regex),
            Err(e) => {
                tracing::warn!("Wildcard pattern '{}' could not be compiled: {}", pattern, e);
                Pattern::Exact(pattern.to_string())
            }
        }
    }

    pub fn is_match(&self, target: &str) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Exact(exact) => exact == target,
            Pattern::Wildcard(regex) => regex.is_match(target),
        }
    }
}

impl std::fmt::Debug for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pattern::Any => write!(f, "*"),
            Pattern::Exact(exact) => write!(f, "{}", exact),
            Pattern::Wildcard(regex) => write!(f, "{}", regex.as_str()),
        }
    }
}

/// 方法匹配表达式
///
/// 按 (声明类型名, 方法名) 匹配
#[derive(Clone)]
pub enum MethodMatcher {
    /// 匹配所有方法
    All,

    /// 匹配方法名，支持 * 通配符
    /// 例如：MethodMatcher::method("get*")
    Method(Pattern),

    /// 匹配类型名，支持 * 通配符
    /// 例如：MethodMatcher::type_name("*Service")
    Type(Pattern),

    /// 使用正则表达式匹配方法名
    MethodRegex(Regex),

    /// 自定义匹配函数，参数为 (类型名, 方法名)
    Custom(Arc<dyn Fn(&str, &str) -> bool + Send + Sync>),

    /// 与运算（AND）
    And(Box<MethodMatcher>, Box<MethodMatcher>),

    /// 或运算（OR）
    Or(Box<MethodMatcher>, Box<MethodMatcher>),

    /// 非运算（NOT）
    Not(Box<MethodMatcher>),
}

impl MethodMatcher {
    /// 检查方法是否匹配
    pub fn matches(&self, type_name: &str, method: &str) -> bool {
        match self {
            MethodMatcher::All => true,
            MethodMatcher::Method(pattern) => pattern.is_match(method),
            MethodMatcher::Type(pattern) => pattern.is_match(type_name),
            MethodMatcher::MethodRegex(regex) => regex.is_match(method),
            MethodMatcher::Custom(func) => func(type_name, method),
            MethodMatcher::And(left, right) => {
                left.matches(type_name, method) && right.matches(type_name, method)
            }
            MethodMatcher::Or(left, right) => {
                left.matches(type_name, method) || right.matches(type_name, method)
            }
            MethodMatcher::Not(expr) => !expr.matches(type_name, method),
        }
    }

    /// 按方法名匹配
    pub fn method(pattern: &str) -> Self {
        MethodMatcher::Method(Pattern::new(pattern))
    }

    /// 按声明类型名匹配
    pub fn type_name(pattern: &str) -> Self {
        MethodMatcher::Type(Pattern::new(pattern))
    }

    /// 解析 "Type.method" 形式的表达式，两部分均可使用通配符
    ///
    /// 没有 `.` 时只匹配方法名
    pub fn execution(expression: &str) -> Self {
        let expression = expression.trim().trim_end_matches("(..)");
        match expression.rsplit_once('.') {
            Some((type_pattern, method_pattern)) => {
                MethodMatcher::type_name(type_pattern).and(MethodMatcher::method(method_pattern))
            }
            None => MethodMatcher::method(expression),
        }
    }

    /// 自定义匹配函数
    pub fn custom<F>(func: F) -> Self
    where
        F: Fn(&str, &str) -> bool + Send + Sync + 'static,
    {
        MethodMatcher::Custom(Arc::new(func))
    }

    pub fn and(self, other: MethodMatcher) -> Self {
        MethodMatcher::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: MethodMatcher) -> Self {
        MethodMatcher::Or(Box::new(self), Box::new(other))
    }

    pub fn not(self) -> Self {
        MethodMatcher::Not(Box::new(self))
    }
}

impl Default for MethodMatcher {
    fn default() -> Self {
        MethodMatcher::All
    }
}

impl std::fmt::Debug for MethodMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MethodMatcher::All => write!(f, "All"),
            MethodMatcher::Method(p) => write!(f, "Method({:?})", p),
            MethodMatcher::Type(p) => write!(f, "Type({:?})", p),
            MethodMatcher::MethodRegex(r) => write!(f, "MethodRegex({})", r.as_str()),
            MethodMatcher::Custom(_) => write!(f, "Custom(...)"),
            MethodMatcher::And(l, r) => write!(f, "And({:?}, {:?})", l, r),
            MethodMatcher::Or(l, r) => write!(f, "Or({:?}, {:?})", l, r),
            MethodMatcher::Not(e) => write!(f, "Not({:?})", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcards() {
        assert!(MethodMatcher::method("*").matches("demo::Greeter", "greet"));
        assert!(MethodMatcher::method("get*").matches("demo::Repo", "getId"));
        assert!(!MethodMatcher::method("get*").matches("demo::Repo", "setId"));
        assert!(MethodMatcher::type_name("*Repo").matches("demo::Repo", "getId"));
    }

    #[test]
    fn test_wildcard_escapes_regex_metacharacters() {
        let matcher = MethodMatcher::type_name("demo::*");
        assert!(matcher.matches("demo::Repo", "find"));
        assert!(!MethodMatcher::method("a.c").matches("demo::Repo", "abc"));
    }

    #[test]
    fn test_patterns_are_compiled_up_front() {
        assert!(matches!(Pattern::new("*"), Pattern::Any));
        assert!(matches!(Pattern::new("greet"), Pattern::Exact(_)));
        assert!(matches!(Pattern::new("get*"), Pattern::Wildcard(_)));

        let matcher = MethodMatcher::execution("demo::*.get*(..)");
        assert!(matches!(
            &matcher,
            MethodMatcher::And(left, right)
                if matches!(**left, MethodMatcher::Type(Pattern::Wildcard(_)))
                    && matches!(**right, MethodMatcher::Method(Pattern::Wildcard(_)))
        ));
        assert!(matcher.matches("demo::Repo", "getId"));
    }

    #[test]
    fn test_execution_expression() {
        let matcher = MethodMatcher::execution("demo::Repo.find*(..)");
        assert!(matcher.matches("demo::Repo", "findAll"));
        assert!(!matcher.matches("demo::Other", "findAll"));
        assert!(!matcher.matches("demo::Repo", "save"));

        let bare = MethodMatcher::execution("save");
        assert!(bare.matches("anything", "save"));
    }

    #[test]
    fn test_combinators() {
        let matcher = MethodMatcher::method("get*")
            .or(MethodMatcher::MethodRegex(Regex::new("^find").unwrap()))
            .and(MethodMatcher::method("getSecret").not());

        assert!(matcher.matches("demo::Repo", "getId"));
        assert!(matcher.matches("demo::Repo", "findAll"));
        assert!(!matcher.matches("demo::Repo", "getSecret"));
        assert!(!matcher.matches("demo::Repo", "delete"));

        let custom = MethodMatcher::custom(|_, method| method.len() > 3);
        assert!(custom.matches("demo::Repo", "save"));
        assert!(!custom.matches("demo::Repo", "get"));
    }
}
