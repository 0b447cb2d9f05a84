//! Bean 作用域
//!
//! `singleton` 和 `prototype` 由容器内置处理，其它名称由注册的 [`Scope`] 实现负责。

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use thiserror::Error;

use crate::bean::BeanHandle;
use crate::error::{BeanError, BeanResult};

pub const SCOPE_SINGLETON: &str = "singleton";
pub const SCOPE_PROTOTYPE: &str = "prototype";

/// 销毁回调
pub type DestructionCallback = Box<dyn FnOnce() + Send>;

/// 作用域名称的解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeanScope {
    /// 单例模式 - 容器中只有一个实例
    Singleton,

    /// 原型模式 - 每次请求都创建新实例
    Prototype,

    /// 自定义作用域
    Custom(String),
}

impl BeanScope {
    pub fn as_str(&self) -> &str {
        match self {
            BeanScope::Singleton => SCOPE_SINGLETON,
            BeanScope::Prototype => SCOPE_PROTOTYPE,
            BeanScope::Custom(name) => name,
        }
    }

    pub fn is_singleton(&self) -> bool {
        matches!(self, BeanScope::Singleton)
    }

    pub fn is_prototype(&self) -> bool {
        matches!(self, BeanScope::Prototype)
    }
}

impl Default for BeanScope {
    fn default() -> Self {
        BeanScope::Singleton
    }
}

impl From<&str> for BeanScope {
    fn from(name: &str) -> Self {
        match name {
            "" | SCOPE_SINGLETON => BeanScope::Singleton,
            SCOPE_PROTOTYPE => BeanScope::Prototype,
            other => BeanScope::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for BeanScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 作用域实现返回的错误
#[derive(Debug, Error)]
pub enum ScopeError {
    /// 作用域当前不处于活动状态
    #[error("Scope is not active: {0}")]
    Inactive(String),

    /// 创建回调本身失败
    #[error(transparent)]
    Bean(#[from] BeanError),
}

/// 自定义作用域
///
/// `get` 在对象不存在时调用 `object_factory` 创建，对象的保存策略完全由实现决定。
pub trait Scope: Send + Sync {
    fn get(
        &self,
        name: &str,
        object_factory: &mut dyn FnMut() -> BeanResult<BeanHandle>,
    ) -> Result<BeanHandle, ScopeError>;

    /// 移除对象，不执行销毁回调
    fn remove(&self, name: &str) -> Option<BeanHandle>;

    /// 注册对象销毁时要执行的回调
    fn register_destruction_callback(&self, name: &str, callback: DestructionCallback);

    fn conversation_id(&self) -> Option<String> {
        None
    }
}

#[derive(Default)]
struct SimpleMapState {
    objects: HashMap<String, BeanHandle>,
    callbacks: HashMap<String, DestructionCallback>,
}

/// 基于 HashMap 的作用域
///
/// 可以手动激活/停用，停用期间 `get` 返回 [`ScopeError::Inactive`]；
/// `clear` 执行所有已注册的销毁回调并开始新的一代。
pub struct SimpleMapScope {
    name: String,
    active: Mutex<bool>,
    generation: AtomicU64,
    state: Mutex<SimpleMapState>,
}

impl SimpleMapScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            active: Mutex::new(true),
            generation: AtomicU64::new(0),
            state: Mutex::new(SimpleMapState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn activate(&self) {
        *self.active.lock() = true;
    }

    pub fn deactivate(&self) {
        *self.active.lock() = false;
    }

    pub fn is_active(&self) -> bool {
        *self.active.lock()
    }

    pub fn len(&self) -> usize {
        self.state.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 清空对象并执行销毁回调
    pub fn clear(&self) {
        let callbacks = {
            let mut state = self.state.lock();
            state.objects.clear();
            std::mem::take(&mut state.callbacks)
        };
        self.generation.fetch_add(1, Ordering::AcqRel);

        tracing::debug!(
            "Clearing scope '{}', running {} destruction callbacks",
            self.name,
            callbacks.len()
        );
        for (_, callback) in callbacks {
            callback();
        }
    }
}

impl Scope for SimpleMapScope {
    fn get(
        &self,
        name: &str,
        object_factory: &mut dyn FnMut() -> BeanResult<BeanHandle>,
    ) -> Result<BeanHandle, ScopeError> {
        if !self.is_active() {
            return Err(ScopeError::Inactive(format!(
                "scope '{}' has been deactivated",
                self.name
            )));
        }

        if let Some(existing) = self.state.lock().objects.get(name) {
            return Ok(existing.clone());
        }

        // 创建期间不持有锁，创建回调可能请求同一作用域中的其它对象
        let created = object_factory()?;

        let mut state = self.state.lock();
        let stored = state
            .objects
            .entry(name.to_string())
            .or_insert(created)
            .clone();
        Ok(stored)
    }

    fn remove(&self, name: &str) -> Option<BeanHandle> {
        let mut state = self.state.lock();
        state.callbacks.remove(name);
        state.objects.remove(name)
    }

    fn register_destruction_callback(&self, name: &str, callback: DestructionCallback) {
        self.state.lock().callbacks.insert(name.to_string(), callback);
    }

    fn conversation_id(&self) -> Option<String> {
        Some(format!(
            "{}-{}",
            self.name,
            self.generation.load(Ordering::Acquire)
        ))
    }
}

impl fmt::Debug for SimpleMapScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleMapScope")
            .field("name", &self.name)
            .field("active", &self.is_active())
            .field("objects", &self.len())
            .finish()
    }
}
