//! 合并定义解析
//!
//! 沿父定义链展开原始定义，结果按名称缓存。原始定义变化时只把缓存项标记为
//! 过期，下次访问时重新合并，并在构造签名不变时保留已解析的类型信息。

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::ReentrantMutex;

use crate::definition::{BeanDefinition, MergedBeanDefinition};
use crate::error::{BeanError, BeanResult};
use crate::scope::SCOPE_SINGLETON;
use crate::utils::naming;

/// 合并过程需要从容器获取的信息
pub(crate) trait MergeContext {
    /// 按名称获取合并定义（本地没有时查找父容器）
    fn lookup_merged_definition(&self, name: &str) -> BeanResult<Arc<MergedBeanDefinition>>;

    /// 父容器中的合并定义，没有父容器时返回 None
    fn lookup_parent_merged_definition(
        &self,
        name: &str,
    ) -> Option<BeanResult<Arc<MergedBeanDefinition>>>;

    /// 该名称的合并结果是否可以缓存
    fn is_eligible_for_metadata_caching(&self, name: &str) -> bool;
}

#[derive(Default)]
struct MergeState {
    merged: HashMap<String, Arc<MergedBeanDefinition>>,
    /// 当前线程正在合并的名称，用于发现父定义链中的环
    merging: Vec<String>,
}

/// 合并定义缓存
///
/// 整个缓存由一把可重入锁保护：合并子定义时会在同一线程内递归合并父定义。
#[derive(Default)]
pub(crate) struct MergedDefinitionCache {
    state: ReentrantMutex<RefCell<MergeState>>,
}

impl MergedDefinitionCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 未过期的缓存项
    pub(crate) fn get_fresh(&self, name: &str) -> Option<Arc<MergedBeanDefinition>> {
        let guard = self.state.lock();
        let state = guard.borrow();
        state
            .merged
            .get(name)
            .filter(|mbd| !mbd.is_stale())
            .cloned()
    }

    /// 合并 `raw`，`containing` 为外层定义（内部 Bean）
    pub(crate) fn resolve<C: MergeContext + ?Sized>(
        &self,
        name: &str,
        raw: &BeanDefinition,
        containing: Option<&MergedBeanDefinition>,
        ctx: &C,
    ) -> BeanResult<Arc<MergedBeanDefinition>> {
        // 在持有缓存锁之前判断，判断过程会读取工厂自身的锁
        let cacheable = containing.is_none() && ctx.is_eligible_for_metadata_caching(name);
        let guard = self.state.lock();

        let previous = {
            let state = guard.borrow();
            let cached = state.merged.get(name).cloned();
            if containing.is_none() {
                if let Some(mbd) = cached.as_ref().filter(|mbd| !mbd.is_stale()) {
                    return Ok(mbd.clone());
                }
            }
            if state.merging.iter().any(|n| n == name) {
                let mut chain = state.merging.clone();
                chain.push(name.to_string());
                return Err(BeanError::BeanDefinitionStore {
                    name: name.to_string(),
                    message: format!("Circular parent definition chain: {}", chain.join(" -> ")),
                });
            }
            cached
        };

        guard.borrow_mut().merging.push(name.to_string());
        let computed = self.compute(name, raw, containing, ctx);
        guard.borrow_mut().merging.pop();
        let mbd = Arc::new(computed?);

        if let Some(previous) = previous.as_ref() {
            mbd.copy_memos_from(previous);
        }

        if cacheable {
            guard
                .borrow_mut()
                .merged
                .insert(name.to_string(), mbd.clone());
            tracing::trace!("Cached merged bean definition: {}", name);
        }

        Ok(mbd)
    }

    fn compute<C: MergeContext + ?Sized>(
        &self,
        name: &str,
        raw: &BeanDefinition,
        containing: Option<&MergedBeanDefinition>,
        ctx: &C,
    ) -> BeanResult<MergedBeanDefinition> {
        let mut definition = match raw.parent_name.as_deref() {
            None => raw.clone(),
            Some(parent) => {
                let parent_name = naming::transformed_bean_name(parent);
                let lookup = if parent_name != name {
                    ctx.lookup_merged_definition(parent_name)
                } else {
                    match ctx.lookup_parent_merged_definition(parent_name) {
                        Some(result) => result,
                        None => Err(BeanError::no_such_bean(parent_name)),
                    }
                };
                let parent_mbd = lookup.map_err(|e| match e {
                    BeanError::NoSuchBeanDefinition { .. } => {
                        let reason = if parent_name == name {
                            format!(
                                "Parent name '{}' is equal to bean name '{}': cannot be resolved without a parent factory",
                                parent, name
                            )
                        } else {
                            format!("Could not resolve parent bean definition '{}'", parent)
                        };
                        BeanError::BeanDefinitionStore {
                            name: name.to_string(),
                            message: reason,
                        }
                    }
                    other => other,
                })?;

                let mut merged = parent_mbd.definition().clone();
                merged.override_from(raw);
                merged
            }
        };
        definition.parent_name = None;

        let mut scope = definition
            .scope
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| SCOPE_SINGLETON.to_string());

        // 非单例外层定义中的内部 Bean 不能仅因继承而成为单例
        if let Some(outer) = containing {
            if !outer.is_singleton() && scope == SCOPE_SINGLETON {
                scope = outer.scope().to_string();
            }
        }

        Ok(MergedBeanDefinition::new(name, definition, scope))
    }

    /// 标记过期，下次访问时重新合并
    pub(crate) fn mark_stale(&self, name: &str) {
        let guard = self.state.lock();
        let state = guard.borrow();
        if let Some(mbd) = state.merged.get(name) {
            mbd.mark_stale();
        }
    }

    #[cfg(test)]
    pub(crate) fn names(&self) -> Vec<String> {
        let guard = self.state.lock();
        let state = guard.borrow();
        state.merged.keys().cloned().collect()
    }

    /// 移除不再需要的缓存项
    pub(crate) fn retain<F>(&self, keep: F)
    where
        F: Fn(&str) -> bool,
    {
        let guard = self.state.lock();
        guard.borrow_mut().merged.retain(|name, _| keep(name));
    }

    pub(crate) fn remove(&self, name: &str) {
        let guard = self.state.lock();
        guard.borrow_mut().merged.remove(name);
    }
}
