use std::sync::Arc;

use crate::bean::{BeanHandle, DisposableBean};
use crate::definition::{LifecycleMethod, MergedBeanDefinition};
use crate::post_processor::DestructionAwareBeanPostProcessor;
use crate::scope::DestructionCallback;

/// 把 Bean 的各种销毁能力合并为一个回调
///
/// 执行顺序：销毁感知后处理器、`DisposableBean::destroy`、定义中的 destroy 方法。
/// 任何一步失败只记录警告，不影响后续步骤。
pub(crate) struct DisposableBeanAdapter {
    name: String,
    bean: BeanHandle,
    disposable: Option<Arc<dyn DisposableBean>>,
    destroy_method: Option<LifecycleMethod>,
    processors: Vec<Arc<dyn DestructionAwareBeanPostProcessor>>,
}

impl DisposableBeanAdapter {
    pub(crate) fn new(
        name: &str,
        bean: BeanHandle,
        mbd: &MergedBeanDefinition,
        processors: &[Arc<dyn DestructionAwareBeanPostProcessor>],
    ) -> Self {
        let disposable = bean.as_disposable().cloned();
        // 同名 destroy 方法与 DisposableBean::destroy 只调用一次
        let destroy_method = mbd
            .definition()
            .destroy_method
            .clone()
            .filter(|m| !(disposable.is_some() && m.name == "destroy"));
        let processors = applicable_processors(&bean, processors);

        Self {
            name: name.to_string(),
            bean,
            disposable,
            destroy_method,
            processors,
        }
    }

    /// Bean 是否需要在销毁时执行回调
    pub(crate) fn requires_destruction(
        bean: &BeanHandle,
        mbd: &MergedBeanDefinition,
        processors: &[Arc<dyn DestructionAwareBeanPostProcessor>],
    ) -> bool {
        if bean.is_null() {
            return false;
        }
        bean.as_disposable().is_some()
            || mbd.definition().destroy_method.is_some()
            || processors.iter().any(|p| p.requires_destruction(bean))
    }

    pub(crate) fn destroy(&self) {
        for processor in &self.processors {
            if let Err(e) = processor.post_process_before_destruction(&self.bean, &self.name) {
                tracing::warn!(
                    "Destruction post-processing of bean '{}' failed: {:#}",
                    self.name,
                    e
                );
            }
        }

        if let Some(disposable) = &self.disposable {
            tracing::trace!("Invoking destroy() on bean with name '{}'", self.name);
            if let Err(e) = disposable.destroy() {
                tracing::warn!("Invocation of destroy method failed on bean with name '{}': {:#}", self.name, e);
            }
        }

        if let Some(method) = &self.destroy_method {
            tracing::trace!(
                "Invoking custom destroy method '{}' on bean with name '{}'",
                method.name,
                self.name
            );
            if let Err(e) = method.invoke(&self.bean) {
                tracing::warn!(
                    "Custom destroy method '{}' on bean with name '{}' failed: {:#}",
                    method.name,
                    self.name,
                    e
                );
            }
        }
    }

    pub(crate) fn into_callback(self) -> DestructionCallback {
        Box::new(move || self.destroy())
    }
}

fn applicable_processors(
    bean: &BeanHandle,
    processors: &[Arc<dyn DestructionAwareBeanPostProcessor>],
) -> Vec<Arc<dyn DestructionAwareBeanPostProcessor>> {
    processors
        .iter()
        .filter(|p| p.requires_destruction(bean))
        .cloned()
        .collect()
}
