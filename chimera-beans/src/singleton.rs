//! 单例注册表与创建协调
//!
//! 同一名称任意时刻最多只有一个构建在执行；其它调用方阻塞等待构建结束，
//! 成功时拿到同一个实例，失败时重新尝试构建。同一调用链内的重入请求
//! （循环引用）通过构建方暴露的早期引用解决，而不是死锁或无限递归。

use std::collections::HashMap;
use std::thread::ThreadId;

use parking_lot::{Condvar, Mutex};

use crate::bean::BeanHandle;
use crate::creation::CreationContext;
use crate::error::{BeanError, BeanResult};
use crate::scope::DestructionCallback;
use crate::utils::dependency::DependentBeanGraph;

/// 早期引用工厂，在第一次被循环引用请求时调用
pub type EarlyReferenceFactory = Box<dyn FnOnce() -> BeanResult<BeanHandle> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CreationOwner {
    context: u64,
    thread: ThreadId,
}

impl CreationOwner {
    fn of(ctx: &CreationContext) -> Self {
        Self {
            context: ctx.id(),
            thread: ctx.thread(),
        }
    }

    /// 同一调用链，或者同一线程上另起的调用（等待它只会自我死锁）
    fn is_reentrant(&self, other: &CreationOwner) -> bool {
        self.context == other.context || self.thread == other.thread
    }
}

#[derive(Default)]
struct SingletonState {
    /// 完整构建的单例
    singletons: HashMap<String, BeanHandle>,
    /// 尚未被请求的早期引用工厂
    early_factories: HashMap<String, EarlyReferenceFactory>,
    /// 已经交出去的早期引用
    early_singletons: HashMap<String, BeanHandle>,
    /// 注册顺序
    registered: Vec<String>,
    in_creation: HashMap<String, CreationOwner>,
    /// 调用链 -> 正在等待的名称
    waiting: HashMap<u64, String>,
    destroying: bool,
}

impl SingletonState {
    /// 等待 `holder` 是否会形成等待环
    fn would_deadlock(&self, me: u64, holder: CreationOwner) -> bool {
        let mut current = holder.context;
        for _ in 0..=self.waiting.len() {
            if current == me {
                return true;
            }
            let next = self
                .waiting
                .get(&current)
                .and_then(|name| self.in_creation.get(name));
            match next {
                Some(owner) => current = owner.context,
                None => return false,
            }
        }
        false
    }

    fn insert(&mut self, name: &str, handle: BeanHandle) {
        self.singletons.insert(name.to_string(), handle);
        self.early_factories.remove(name);
        self.early_singletons.remove(name);
        if !self.registered.iter().any(|n| n == name) {
            self.registered.push(name.to_string());
        }
    }

    fn remove(&mut self, name: &str) {
        self.singletons.remove(name);
        self.early_factories.remove(name);
        self.early_singletons.remove(name);
        self.registered.retain(|n| n != name);
    }
}

/// 单例注册表
#[derive(Default)]
pub struct SingletonRegistry {
    state: Mutex<SingletonState>,
    /// 单例构建结束（成功或失败）时通知等待者
    creation_finished: Condvar,
    graph: Mutex<DependentBeanGraph>,
    disposables: Mutex<Vec<(String, DestructionCallback)>>,
}

/// 构建结束时清理创建状态并唤醒等待者
struct InCreationGuard<'a> {
    registry: &'a SingletonRegistry,
    name: &'a str,
}

impl Drop for InCreationGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.registry.state.lock();
        state.in_creation.remove(self.name);
        if !state.singletons.contains_key(self.name) {
            state.early_factories.remove(self.name);
            state.early_singletons.remove(self.name);
        }
        self.registry.creation_finished.notify_all();
    }
}

impl SingletonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取或创建单例
    ///
    /// `build` 最多只有一个在执行。同一调用链内的重入请求返回早期引用，
    /// 没有早期引用时返回 "currently in creation" 错误。
    pub fn get_or_create<F>(
        &self,
        name: &str,
        ctx: &CreationContext,
        build: F,
    ) -> BeanResult<BeanHandle>
    where
        F: FnOnce() -> BeanResult<BeanHandle>,
    {
        let me = CreationOwner::of(ctx);
        let mut state = self.state.lock();
        loop {
            if let Some(existing) = state.singletons.get(name) {
                return Ok(existing.clone());
            }
            if state.destroying {
                return Err(BeanError::creation_message(
                    name,
                    "Singleton bean creation not allowed while singletons of this factory are in destruction",
                ));
            }
            let holder = match state.in_creation.get(name) {
                None => break,
                Some(holder) => *holder,
            };

            if me.is_reentrant(&holder) {
                drop(state);
                return self.resolve_circular_reference(name);
            }
            if state.would_deadlock(me.context, holder) {
                tracing::debug!(
                    "Waiting for singleton '{}' would deadlock, resolving as circular reference",
                    name
                );
                drop(state);
                return self.resolve_circular_reference(name);
            }

            tracing::trace!("Waiting for singleton '{}' created by another thread", name);
            state.waiting.insert(me.context, name.to_string());
            self.creation_finished.wait(&mut state);
            state.waiting.remove(&me.context);
        }

        state.in_creation.insert(name.to_string(), me);
        drop(state);

        let _guard = InCreationGuard {
            registry: self,
            name,
        };
        tracing::debug!("Creating shared instance of singleton bean '{}'", name);
        let handle = build()?;
        self.add_singleton(name, handle.clone());
        Ok(handle)
    }

    fn resolve_circular_reference(&self, name: &str) -> BeanResult<BeanHandle> {
        match self.take_early_reference(name)? {
            Some(early) => {
                tracing::debug!(
                    "Returning eagerly cached instance of singleton bean '{}' that is not fully initialized yet - a consequence of a circular reference",
                    name
                );
                Ok(early)
            }
            None => Err(BeanError::currently_in_creation(name)),
        }
    }

    /// 完整单例，或者同一调用链内正在创建的单例的早期引用
    pub fn get_singleton(&self, name: &str, ctx: Option<&CreationContext>) -> BeanResult<Option<BeanHandle>> {
        let reentrant = {
            let state = self.state.lock();
            if let Some(existing) = state.singletons.get(name) {
                return Ok(Some(existing.clone()));
            }
            match (ctx, state.in_creation.get(name)) {
                (Some(ctx), Some(holder)) => CreationOwner::of(ctx).is_reentrant(holder),
                _ => false,
            }
        };
        if reentrant {
            self.take_early_reference(name)
        } else {
            Ok(None)
        }
    }

    /// 已经交出的早期引用（不会触发早期引用工厂）
    pub fn early_singleton(&self, name: &str) -> Option<BeanHandle> {
        self.state.lock().early_singletons.get(name).cloned()
    }

    /// 取早期引用，必要时调用早期引用工厂
    ///
    /// 工厂在锁外执行：它会调用后处理器，后处理器可能回调容器。
    fn take_early_reference(&self, name: &str) -> BeanResult<Option<BeanHandle>> {
        let factory = {
            let mut state = self.state.lock();
            if let Some(existing) = state.singletons.get(name) {
                return Ok(Some(existing.clone()));
            }
            if let Some(early) = state.early_singletons.get(name) {
                return Ok(Some(early.clone()));
            }
            match state.early_factories.remove(name) {
                Some(factory) => factory,
                None => return Ok(None),
            }
        };

        let early = factory()?;

        let mut state = self.state.lock();
        if let Some(existing) = state.singletons.get(name) {
            return Ok(Some(existing.clone()));
        }
        let stored = state
            .early_singletons
            .entry(name.to_string())
            .or_insert(early)
            .clone();
        Ok(Some(stored))
    }

    /// 注册早期引用工厂
    pub fn add_early_reference_factory(&self, name: &str, factory: EarlyReferenceFactory) {
        let mut state = self.state.lock();
        if !state.singletons.contains_key(name) {
            state.early_factories.insert(name.to_string(), factory);
            state.early_singletons.remove(name);
        }
    }

    fn add_singleton(&self, name: &str, handle: BeanHandle) {
        self.state.lock().insert(name, handle);
    }

    /// 注册外部创建的单例
    ///
    /// 检查和写入在同一次加锁内完成；正在创建中的名称同样拒绝。
    pub fn register_singleton(&self, name: &str, handle: BeanHandle) -> BeanResult<()> {
        let mut state = self.state.lock();
        if state.singletons.contains_key(name) {
            return Err(BeanError::IllegalState(format!(
                "Could not register object under bean name '{}': there is already an object bound",
                name
            )));
        }
        if state.in_creation.contains_key(name) {
            return Err(BeanError::IllegalState(format!(
                "Could not register object under bean name '{}': the bean is currently in creation",
                name
            )));
        }
        state.insert(name, handle);
        drop(state);

        tracing::debug!("Registered singleton: {}", name);
        Ok(())
    }

    pub fn contains_singleton(&self, name: &str) -> bool {
        self.state.lock().singletons.contains_key(name)
    }

    /// 按注册顺序返回单例名称
    pub fn singleton_names(&self) -> Vec<String> {
        self.state.lock().registered.clone()
    }

    pub fn singleton_count(&self) -> usize {
        self.state.lock().registered.len()
    }

    pub fn is_currently_in_creation(&self, name: &str) -> bool {
        self.state.lock().in_creation.contains_key(name)
    }

    pub fn is_destroying(&self) -> bool {
        self.state.lock().destroying
    }

    pub fn register_dependent_bean(&self, bean: &str, dependent: &str) {
        self.graph.lock().register_dependent(bean, dependent);
    }

    pub fn register_contained_bean(&self, inner: &str, containing: &str) {
        self.graph.lock().register_contained(inner, containing);
    }

    /// `dependent` 是否直接或间接依赖 `bean`
    pub fn is_dependent(&self, bean: &str, dependent: &str) -> bool {
        self.graph.lock().is_dependent(bean, dependent)
    }

    pub fn has_dependent_bean(&self, bean: &str) -> bool {
        self.graph.lock().has_dependents(bean)
    }

    pub fn dependent_beans(&self, bean: &str) -> Vec<String> {
        self.graph.lock().dependents_of(bean)
    }

    pub fn dependencies_for_bean(&self, bean: &str) -> Vec<String> {
        self.graph.lock().dependencies_of(bean)
    }

    /// 注册销毁回调，同名回调替换原有回调并保持原位置
    pub fn register_disposable_bean(&self, name: &str, callback: DestructionCallback) {
        let mut disposables = self.disposables.lock();
        match disposables.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = callback,
            None => disposables.push((name.to_string(), callback)),
        }
    }

    /// 销毁单个单例：先销毁依赖它的 Bean，再执行它自己的销毁回调，最后销毁它包含的内部 Bean
    ///
    /// `on_remove` 在每个名称从注册表移除时调用。
    pub fn destroy_singleton(&self, name: &str, on_remove: &dyn Fn(&str)) {
        self.state.lock().remove(name);
        on_remove(name);

        let callback = {
            let mut disposables = self.disposables.lock();
            disposables
                .iter()
                .position(|(n, _)| n == name)
                .map(|idx| disposables.remove(idx).1)
        };
        self.destroy_bean(name, callback, on_remove);
    }

    fn destroy_bean(&self, name: &str, callback: Option<DestructionCallback>, on_remove: &dyn Fn(&str)) {
        let dependents = self.graph.lock().take_dependents(name);
        if !dependents.is_empty() {
            tracing::debug!(
                "Retrieved dependent beans for bean '{}': {:?}",
                name,
                dependents
            );
        }
        for dependent in dependents {
            self.destroy_singleton(&dependent, on_remove);
        }

        if let Some(callback) = callback {
            callback();
        }

        let contained = self.graph.lock().take_contained(name);
        for inner in contained {
            self.destroy_singleton(&inner, on_remove);
        }

        self.graph.lock().remove_bean(name);
    }

    /// 按注册的逆序销毁所有单例
    pub fn destroy_singletons(&self, on_remove: &dyn Fn(&str)) {
        self.state.lock().destroying = true;
        tracing::info!("Destroying singletons");

        let names: Vec<String> = self
            .disposables
            .lock()
            .iter()
            .map(|(name, _)| name.clone())
            .collect();
        for name in names.iter().rev() {
            self.destroy_singleton(name, on_remove);
        }

        self.graph.lock().clear();
        let removed = {
            let mut state = self.state.lock();
            let removed = std::mem::take(&mut state.registered);
            state.singletons.clear();
            state.early_factories.clear();
            state.early_singletons.clear();
            state.destroying = false;
            removed
        };
        for name in &removed {
            on_remove(name);
        }
    }
}
