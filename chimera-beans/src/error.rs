//! 统一的错误处理类型
//!
//! 引擎内部所有可失败操作都返回 [`BeanResult`]。用户提供的回调（实例 supplier、
//! 工厂方法、init/destroy 方法、`FactoryBean::get_object`）使用 `anyhow::Result`，
//! 失败时由引擎包装为 [`BeanError::BeanCreation`]，原始错误通过 `source()` 保留。
//!
//! # 示例
//!
//! ```rust,ignore
//! match factory.get_bean("userService") {
//!     Err(e) if e.contains_currently_in_creation() => { /* 循环引用 */ }
//!     Err(e) => return Err(e),
//!     Ok(bean) => { /* ... */ }
//! }
//! ```

use thiserror::Error;

/// 引擎统一的结果类型
pub type BeanResult<T> = std::result::Result<T, BeanError>;

/// Bean 解析与生命周期错误
#[derive(Debug, Error)]
pub enum BeanError {
    /// 本地和父容器中都没有该名称的定义
    #[error("No bean named '{name}' available")]
    NoSuchBeanDefinition { name: String },

    /// 定义本身无效，例如父定义链无法解析
    #[error("Invalid bean definition with name '{name}': {message}")]
    BeanDefinitionStore { name: String, message: String },

    /// 抽象定义只能作为模板，不能实例化
    #[error("Bean definition '{0}' is abstract")]
    BeanIsAbstract(String),

    /// 创建失败，包装原始原因
    #[error("Error creating bean with name '{name}': {message}")]
    BeanCreation {
        name: String,
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Bean 正在创建中（无法解析的循环引用）
    #[error("Error creating bean with name '{name}': {message}")]
    BeanCurrentlyInCreation { name: String, message: String },

    /// 显式 depends-on 声明之间存在环
    #[error("Circular depends-on relationship between '{name}' and '{dependency}'")]
    CircularDependsOn { name: String, dependency: String },

    /// depends-on 指向一个不存在的定义
    #[error("'{name}' depends on missing bean '{dependency}'")]
    MissingDependency { name: String, dependency: String },

    /// 作用域未注册或当前不处于活动状态
    #[error("Scope '{scope}' is not active for the current thread (bean '{name}'): {reason}")]
    ScopeNotActive {
        name: String,
        scope: String,
        reason: String,
    },

    /// 实例不是要求的类型
    #[error("Bean named '{name}' is expected to be of type '{required}' but was actually of type '{actual}'")]
    BeanNotOfRequiredType {
        name: String,
        required: String,
        actual: String,
    },

    /// 请求了 `&name` 但实例不具备 FactoryBean 能力
    #[error("Bean named '{name}' is expected to be a FactoryBean but was actually of type '{actual}'")]
    BeanIsNotAFactory { name: String, actual: String },

    /// 禁止覆盖已有的定义
    #[error("Cannot register bean definition for bean '{0}': there is already a definition bound and overriding is disabled")]
    BeanDefinitionOverride(String),

    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// 配置加载失败
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to initialize logging: {0}")]
    LoggingInitFailed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BeanError {
    pub fn no_such_bean(name: impl Into<String>) -> Self {
        BeanError::NoSuchBeanDefinition { name: name.into() }
    }

    /// 创建失败，带原始原因
    pub fn creation(
        name: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        BeanError::BeanCreation {
            name: name.into(),
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建失败，没有下层原因
    pub fn creation_message(name: impl Into<String>, message: impl Into<String>) -> Self {
        BeanError::BeanCreation {
            name: name.into(),
            message: message.into(),
            source: None,
        }
    }

    /// 标准的 "currently in creation" 错误
    pub fn currently_in_creation(name: impl Into<String>) -> Self {
        BeanError::BeanCurrentlyInCreation {
            name: name.into(),
            message: "Requested bean is currently in creation: Is there an unresolvable circular reference?"
                .to_string(),
        }
    }

    pub fn currently_in_creation_with(name: impl Into<String>, message: impl Into<String>) -> Self {
        BeanError::BeanCurrentlyInCreation {
            name: name.into(),
            message: message.into(),
        }
    }

    /// 错误所属的 Bean 名称（如果有）
    pub fn bean_name(&self) -> Option<&str> {
        match self {
            BeanError::NoSuchBeanDefinition { name }
            | BeanError::BeanDefinitionStore { name, .. }
            | BeanError::BeanCreation { name, .. }
            | BeanError::BeanCurrentlyInCreation { name, .. }
            | BeanError::CircularDependsOn { name, .. }
            | BeanError::MissingDependency { name, .. }
            | BeanError::ScopeNotActive { name, .. }
            | BeanError::BeanNotOfRequiredType { name, .. }
            | BeanError::BeanIsNotAFactory { name, .. } => Some(name),
            BeanError::BeanIsAbstract(name) | BeanError::BeanDefinitionOverride(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_no_such_bean_definition(&self) -> bool {
        matches!(self, BeanError::NoSuchBeanDefinition { .. })
    }

    pub fn is_currently_in_creation(&self) -> bool {
        matches!(self, BeanError::BeanCurrentlyInCreation { .. })
    }

    /// 沿着 `source()` 链查找 "currently in creation" 错误
    pub fn contains_currently_in_creation(&self) -> bool {
        let mut current: Option<&(dyn std::error::Error + 'static)> = Some(self);
        while let Some(err) = current {
            if let Some(bean_error) = err.downcast_ref::<BeanError>() {
                if bean_error.is_currently_in_creation() {
                    return true;
                }
            }
            current = err.source();
        }
        false
    }

    /// 把用户回调返回的 anyhow 错误转换为创建错误
    ///
    /// "currently in creation" 错误原样返回，不要包装它；
    /// 同一个 Bean 的创建错误也不再重复包装。带有用户上下文的错误整体保留。
    pub(crate) fn wrap_creation(name: &str, message: &str, err: anyhow::Error) -> Self {
        let outermost_is_bean_error = err
            .chain()
            .next()
            .is_some_and(|e| e.is::<BeanError>());
        if !outermost_is_bean_error {
            return BeanError::creation(name, message, err);
        }
        match err.downcast::<BeanError>() {
            Ok(bean_error) => {
                let preserve = match &bean_error {
                    BeanError::BeanCurrentlyInCreation { .. } => true,
                    BeanError::BeanCreation { name: failed, .. } => failed == name,
                    _ => false,
                };
                if preserve {
                    bean_error
                } else {
                    BeanError::creation(name, message, bean_error)
                }
            }
            Err(err) => BeanError::creation(name, message, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_preserves_currently_in_creation() {
        let inner = anyhow::Error::new(BeanError::currently_in_creation("serviceA"));
        let wrapped = BeanError::wrap_creation("serviceB", "Instantiation of bean failed", inner);

        assert!(wrapped.is_currently_in_creation());
        assert_eq!(wrapped.bean_name(), Some("serviceA"));
    }

    #[test]
    fn test_wrap_plain_error() {
        let wrapped = BeanError::wrap_creation(
            "serviceA",
            "Instantiation of bean failed",
            anyhow::anyhow!("connection refused"),
        );

        match &wrapped {
            BeanError::BeanCreation { name, message, source } => {
                assert_eq!(name, "serviceA");
                assert_eq!(message, "Instantiation of bean failed");
                assert_eq!(source.as_ref().unwrap().to_string(), "connection refused");
            }
            other => panic!("Expected BeanCreation, got {:?}", other),
        }
        assert!(!wrapped.contains_currently_in_creation());
    }

    #[test]
    fn test_wrap_keeps_user_context() {
        use anyhow::Context;

        let inner: BeanResult<()> = Err(BeanError::currently_in_creation("serviceA"));
        let err = inner.context("loading serviceA").unwrap_err();
        let wrapped = BeanError::wrap_creation("serviceB", "Instantiation of bean failed", err);

        assert!(!wrapped.is_currently_in_creation());
        assert!(wrapped.contains_currently_in_creation());
        assert!(format!("{:?}", wrapped).contains("loading serviceA"));
    }

    #[test]
    fn test_contains_currently_in_creation_through_chain() {
        let innermost = BeanError::currently_in_creation("serviceA");
        let middle = BeanError::creation("serviceB", "dependency failed", innermost);
        let outer = BeanError::creation("serviceC", "dependency failed", middle);

        assert!(!outer.is_currently_in_creation());
        assert!(outer.contains_currently_in_creation());
    }
}
