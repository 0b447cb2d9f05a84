//! 创建上下文
//!
//! 每次外部调用 `get_bean` 都会创建一个新的 [`CreationContext`]，嵌套的依赖查找
//! 通过 [`BeanCreation`] 沿用同一个上下文。正在创建的原型 Bean 记录在上下文中，
//! 而不是线程局部变量里。

use std::any::Any;
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use crate::bean::{describe_instance, BeanArgs, BeanHandle, BeanInstance, BeanType};
use crate::bean_factory::{ConfigurableBeanFactory, DefaultBeanFactory};
use crate::definition::{BeanDefinition, MergedBeanDefinition};
use crate::error::{BeanError, BeanResult};
use crate::utils::naming;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// 一次解析调用链的上下文
#[derive(Debug)]
pub struct CreationContext {
    id: u64,
    thread: ThreadId,
    prototypes_in_creation: RefCell<Vec<String>>,
}

impl CreationContext {
    pub fn new() -> Self {
        Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            thread: thread::current().id(),
            prototypes_in_creation: RefCell::new(Vec::new()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    pub fn is_prototype_in_creation(&self, name: &str) -> bool {
        self.prototypes_in_creation.borrow().iter().any(|n| n == name)
    }

    pub fn prototypes_in_creation(&self) -> Vec<String> {
        self.prototypes_in_creation.borrow().clone()
    }

    /// 标记原型（或自定义作用域）Bean 正在创建，守卫释放时移除
    pub(crate) fn enter_prototype(&self, name: &str) -> PrototypeCreationGuard<'_> {
        self.prototypes_in_creation.borrow_mut().push(name.to_string());
        PrototypeCreationGuard {
            ctx: self,
            name: name.to_string(),
        }
    }
}

impl Default for CreationContext {
    fn default() -> Self {
        Self::new()
    }
}

/// 无论创建成功与否都会把名称移出正在创建的集合
pub(crate) struct PrototypeCreationGuard<'a> {
    ctx: &'a CreationContext,
    name: String,
}

impl Drop for PrototypeCreationGuard<'_> {
    fn drop(&mut self) {
        let mut names = self.ctx.prototypes_in_creation.borrow_mut();
        if let Some(idx) = names.iter().rposition(|n| *n == self.name) {
            names.remove(idx);
        }
    }
}

/// 交给实例 supplier 和工厂方法的构建上下文
///
/// 通过它获取依赖时，嵌套调用与当前构建属于同一条调用链，
/// 因此单例循环引用可以拿到早期引用，原型循环会被检测出来。
pub struct BeanCreation<'a> {
    factory: &'a DefaultBeanFactory,
    ctx: &'a CreationContext,
    name: &'a str,
    mbd: &'a Arc<MergedBeanDefinition>,
    args: Option<&'a BeanArgs>,
}

impl<'a> BeanCreation<'a> {
    pub(crate) fn new(
        factory: &'a DefaultBeanFactory,
        ctx: &'a CreationContext,
        name: &'a str,
        mbd: &'a Arc<MergedBeanDefinition>,
        args: Option<&'a BeanArgs>,
    ) -> Self {
        Self {
            factory,
            ctx,
            name,
            mbd,
            args,
        }
    }

    pub fn bean_name(&self) -> &str {
        self.name
    }

    pub fn merged_definition(&self) -> &Arc<MergedBeanDefinition> {
        self.mbd
    }

    pub fn factory(&self) -> &DefaultBeanFactory {
        self.factory
    }

    pub fn context(&self) -> &CreationContext {
        self.ctx
    }

    /// 显式参数
    pub fn args(&self) -> Option<&BeanArgs> {
        self.args
    }

    /// 第 `index` 个显式参数
    pub fn arg<T: Any + Send + Sync>(&self, index: usize) -> Option<Arc<T>> {
        self.args
            .and_then(|args| args.get(index))
            .and_then(|arg| Arc::clone(arg).downcast::<T>().ok())
    }

    /// 获取依赖，并登记当前 Bean 依赖于它
    pub fn get_bean(&self, name: &str) -> BeanResult<BeanInstance> {
        let bean = self.factory.do_get_bean(name, None, None, false, self.ctx)?;
        self.register_dependency(name);
        Ok(bean)
    }

    pub fn get_bean_typed<T: Any + Send + Sync>(&self, name: &str) -> BeanResult<Arc<T>> {
        let bean = self
            .factory
            .do_get_bean(name, Some(BeanType::of::<T>()), None, false, self.ctx)?;
        self.register_dependency(name);
        bean.downcast::<T>()
            .map_err(|bean| BeanError::BeanNotOfRequiredType {
                name: name.to_string(),
                required: std::any::type_name::<T>().to_string(),
                actual: describe_instance(&bean),
            })
    }

    pub fn get_bean_with_args(&self, name: &str, args: BeanArgs) -> BeanResult<BeanInstance> {
        let bean = self
            .factory
            .do_get_bean(name, None, Some(&args), false, self.ctx)?;
        self.register_dependency(name);
        Ok(bean)
    }

    fn register_dependency(&self, requested: &str) {
        let canonical = self
            .factory
            .canonical_name(naming::transformed_bean_name(requested));
        if canonical != self.name {
            self.factory.register_dependent_bean(&canonical, self.name);
        }
    }

    /// 在依赖注入之前暴露早期引用，使循环引用的单例可以拿到当前实例
    ///
    /// 只有单例、且容器允许循环引用时才会暴露，返回是否已暴露。
    pub fn expose_early_reference(&self, bean: BeanHandle) -> bool {
        self.factory.expose_early_reference(self.name, self.mbd, bean)
    }

    /// 创建内部 Bean
    ///
    /// 内部 Bean 的定义按当前 Bean 合并，不缓存，随当前 Bean 一起销毁。
    pub fn create_inner_bean(
        &self,
        inner_name: Option<&str>,
        definition: BeanDefinition,
    ) -> BeanResult<BeanInstance> {
        self.factory
            .create_inner_bean(self.ctx, self.name, self.mbd, inner_name, definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_ids_are_unique() {
        let a = CreationContext::new();
        let b = CreationContext::new();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.thread(), b.thread());
    }

    #[test]
    fn test_prototype_guard_pops_on_drop() {
        let ctx = CreationContext::new();
        {
            let _outer = ctx.enter_prototype("a");
            {
                let _inner = ctx.enter_prototype("b");
                assert!(ctx.is_prototype_in_creation("a"));
                assert!(ctx.is_prototype_in_creation("b"));
            }
            assert!(!ctx.is_prototype_in_creation("b"));
            assert_eq!(ctx.prototypes_in_creation(), vec!["a".to_string()]);
        }
        assert!(ctx.prototypes_in_creation().is_empty());
    }

    #[test]
    fn test_prototype_guard_pops_on_panic() {
        let ctx = CreationContext::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = ctx.enter_prototype("a");
            panic!("construction panicked");
        }));
        assert!(result.is_err());
        assert!(!ctx.is_prototype_in_creation("a"));
    }
}
