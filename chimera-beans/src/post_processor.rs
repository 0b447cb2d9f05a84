//! BeanPostProcessor - Bean 工厂扩展机制
//!
//! 提供在 Bean 实例化、初始化、销毁等阶段进行自定义处理的钩子，类似 Spring 的
//! BeanPostProcessor 体系。处理器的扩展能力通过 `as_*` 视图方法声明，
//! 容器按能力把处理器列表划分为缓存的子列表，列表变化时缓存失效。

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::bean::{BeanHandle, BeanType};
use crate::definition::MergedBeanDefinition;

/// BeanPostProcessor trait
///
/// 在 Bean 初始化回调（init 方法）前后提供钩子，允许替换或包装 Bean 实例
///
/// # 示例
///
/// ```ignore
/// struct LoggingPostProcessor;
///
/// impl BeanPostProcessor for LoggingPostProcessor {
///     fn post_process_after_initialization(
///         &self,
///         bean: BeanHandle,
///         bean_name: &str,
///     ) -> anyhow::Result<BeanHandle> {
///         tracing::info!("After initialization: {}", bean_name);
///         Ok(bean)
///     }
/// }
/// ```
pub trait BeanPostProcessor: Send + Sync {
    /// 在 Bean 初始化回调之前调用
    fn post_process_before_initialization(
        &self,
        bean: BeanHandle,
        _bean_name: &str,
    ) -> anyhow::Result<BeanHandle> {
        Ok(bean)
    }

    /// 在 Bean 初始化回调之后调用
    ///
    /// 典型用途是创建代理或包装 Bean。FactoryBean 生产的对象也会经过此方法。
    fn post_process_after_initialization(
        &self,
        bean: BeanHandle,
        _bean_name: &str,
    ) -> anyhow::Result<BeanHandle> {
        Ok(bean)
    }

    /// 获取处理器的名称（用于日志和调试）
    fn name(&self) -> &str {
        "BeanPostProcessor"
    }

    /// 获取处理器的优先级（数字越小优先级越高）
    fn order(&self) -> i32 {
        1000
    }

    fn as_instantiation_aware(
        self: Arc<Self>,
    ) -> Option<Arc<dyn InstantiationAwareBeanPostProcessor>> {
        None
    }

    fn as_smart_instantiation_aware(
        self: Arc<Self>,
    ) -> Option<Arc<dyn SmartInstantiationAwareBeanPostProcessor>> {
        None
    }

    fn as_destruction_aware(self: Arc<Self>) -> Option<Arc<dyn DestructionAwareBeanPostProcessor>> {
        None
    }

    fn as_merged_definition(
        self: Arc<Self>,
    ) -> Option<Arc<dyn MergedBeanDefinitionPostProcessor>> {
        None
    }
}

/// 实例化之前的钩子
pub trait InstantiationAwareBeanPostProcessor: Send + Sync {
    /// 返回 Some 时跳过默认实例化，直接进入初始化后处理
    fn post_process_before_instantiation(
        &self,
        _mbd: &MergedBeanDefinition,
        _bean_name: &str,
    ) -> anyhow::Result<Option<BeanHandle>> {
        Ok(None)
    }
}

/// 类型预测与早期引用
pub trait SmartInstantiationAwareBeanPostProcessor: InstantiationAwareBeanPostProcessor {
    /// 预测最终暴露的类型（例如代理类型），None 表示不改变预测
    fn predict_bean_type(&self, _bean_type: Option<BeanType>, _bean_name: &str) -> Option<BeanType> {
        None
    }

    /// 循环引用时暴露给其它 Bean 的早期引用
    fn early_bean_reference(&self, bean: BeanHandle, _bean_name: &str) -> anyhow::Result<BeanHandle> {
        Ok(bean)
    }
}

/// 销毁之前的钩子
pub trait DestructionAwareBeanPostProcessor: Send + Sync {
    fn post_process_before_destruction(&self, bean: &BeanHandle, bean_name: &str)
        -> anyhow::Result<()>;

    fn requires_destruction(&self, _bean: &BeanHandle) -> bool {
        true
    }
}

/// 合并定义后处理，每个合并定义只执行一次
pub trait MergedBeanDefinitionPostProcessor: Send + Sync {
    fn post_process_merged_bean_definition(
        &self,
        mbd: &MergedBeanDefinition,
        bean_name: &str,
    ) -> anyhow::Result<()>;

    /// 定义被重置（重新注册或移除）时通知
    fn reset_bean_definition(&self, _bean_name: &str) {}
}

/// 按能力划分的处理器子列表
#[derive(Default)]
pub struct BeanPostProcessorCache {
    pub instantiation_aware: Vec<Arc<dyn InstantiationAwareBeanPostProcessor>>,
    pub smart_instantiation_aware: Vec<Arc<dyn SmartInstantiationAwareBeanPostProcessor>>,
    pub destruction_aware: Vec<Arc<dyn DestructionAwareBeanPostProcessor>>,
    pub merged_definition: Vec<Arc<dyn MergedBeanDefinitionPostProcessor>>,
}

impl BeanPostProcessorCache {
    fn build(processors: &[Arc<dyn BeanPostProcessor>]) -> Self {
        let mut cache = Self::default();
        for processor in processors {
            if let Some(p) = processor.clone().as_instantiation_aware() {
                cache.instantiation_aware.push(p);
            }
            if let Some(p) = processor.clone().as_smart_instantiation_aware() {
                cache.smart_instantiation_aware.push(p);
            }
            if let Some(p) = processor.clone().as_destruction_aware() {
                cache.destruction_aware.push(p);
            }
            if let Some(p) = processor.clone().as_merged_definition() {
                cache.merged_definition.push(p);
            }
        }
        cache
    }
}

/// 有序的处理器列表，附带按能力划分的缓存
#[derive(Default)]
pub struct BeanPostProcessors {
    processors: RwLock<Vec<Arc<dyn BeanPostProcessor>>>,
    cache: Mutex<Option<Arc<BeanPostProcessorCache>>>,
}

fn same_processor(a: &Arc<dyn BeanPostProcessor>, b: &Arc<dyn BeanPostProcessor>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl BeanPostProcessors {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加处理器，同一个处理器重复添加时移到新位置
    pub fn add(&self, processor: Arc<dyn BeanPostProcessor>) {
        {
            let mut processors = self.processors.write();
            processors.retain(|p| !same_processor(p, &processor));
            tracing::debug!(
                "Registering BeanPostProcessor: {} (order: {})",
                processor.name(),
                processor.order()
            );
            processors.push(processor);
            // 稳定排序，相同优先级保持注册顺序
            processors.sort_by_key(|p| p.order());
        }
        self.invalidate();
    }

    pub fn add_all<I>(&self, processors: I)
    where
        I: IntoIterator<Item = Arc<dyn BeanPostProcessor>>,
    {
        for processor in processors {
            self.add(processor);
        }
    }

    pub fn remove(&self, processor: &Arc<dyn BeanPostProcessor>) -> bool {
        let removed = {
            let mut processors = self.processors.write();
            let before = processors.len();
            processors.retain(|p| !same_processor(p, processor));
            processors.len() != before
        };
        if removed {
            self.invalidate();
        }
        removed
    }

    pub fn clear(&self) {
        self.processors.write().clear();
        self.invalidate();
    }

    pub fn len(&self) -> usize {
        self.processors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.read().is_empty()
    }

    /// 当前处理器列表的快照
    pub fn snapshot(&self) -> Vec<Arc<dyn BeanPostProcessor>> {
        self.processors.read().clone()
    }

    /// 按能力划分的缓存，首次访问或列表变化后重新构建
    pub fn cache(&self) -> Arc<BeanPostProcessorCache> {
        let mut cache = self.cache.lock();
        if let Some(existing) = cache.as_ref() {
            return existing.clone();
        }
        let built = Arc::new(BeanPostProcessorCache::build(&self.processors.read()));
        tracing::trace!(
            "Rebuilt BeanPostProcessor cache: {} instantiation-aware, {} destruction-aware, {} merged-definition",
            built.instantiation_aware.len(),
            built.destruction_aware.len(),
            built.merged_definition.len()
        );
        *cache = Some(built.clone());
        built
    }

    pub fn has_instantiation_aware(&self) -> bool {
        !self.cache().instantiation_aware.is_empty()
    }

    pub fn has_destruction_aware(&self) -> bool {
        !self.cache().destruction_aware.is_empty()
    }

    fn invalidate(&self) {
        *self.cache.lock() = None;
    }
}
