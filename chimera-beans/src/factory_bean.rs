//! FactoryBean 生产对象的解析与缓存
//!
//! 单例 FactoryBean 生产的对象单独缓存，与工厂实例本身分开；工厂合法返回
//! "无对象" 时缓存 [`NullBean`] 占位符，避免把 "没有缓存" 与 "结果为空" 混淆。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};

use crate::bean::{BeanHandle, BeanInstance, FactoryBean, NullBean};
use crate::error::{BeanError, BeanResult};

/// 生产对象时需要从容器获取的信息
pub(crate) trait FactoryBeanHost {
    fn contains_singleton(&self, name: &str) -> bool;

    fn is_singleton_currently_in_creation(&self, name: &str) -> bool;

    /// 对生产出的对象应用初始化后处理
    fn post_process_object_from_factory_bean(
        &self,
        object: BeanHandle,
        name: &str,
    ) -> anyhow::Result<BeanHandle>;
}

/// FactoryBean 生产对象缓存
#[derive(Default)]
pub(crate) struct FactoryBeanObjectCache {
    objects: Mutex<HashMap<String, BeanInstance>>,
    /// 每个名称一把可重入的生产锁，保证单例对象最多生产一次
    production_locks: Mutex<HashMap<String, Arc<ReentrantMutex<()>>>>,
    post_processing: Mutex<HashSet<String>>,
    null_bean: Mutex<Option<BeanInstance>>,
}

impl FactoryBeanObjectCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn cached_object(&self, name: &str) -> Option<BeanInstance> {
        self.objects.lock().get(name).cloned()
    }

    pub(crate) fn remove(&self, name: &str) {
        self.objects.lock().remove(name);
        self.production_locks.lock().remove(name);
    }

    pub(crate) fn clear(&self) {
        self.objects.lock().clear();
        self.production_locks.lock().clear();
    }

    fn production_lock(&self, name: &str) -> Arc<ReentrantMutex<()>> {
        self.production_locks
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    fn null_bean(&self) -> BeanInstance {
        self.null_bean
            .lock()
            .get_or_insert_with(|| Arc::new(NullBean))
            .clone()
    }

    /// 从 FactoryBean 获取对象
    ///
    /// 单例工厂且已注册为单例时缓存结果；其余情况每次都重新生产。
    pub(crate) fn get_object_from_factory_bean(
        &self,
        factory: &dyn FactoryBean,
        name: &str,
        should_post_process: bool,
        host: &dyn FactoryBeanHost,
    ) -> BeanResult<BeanInstance> {
        if !(factory.is_singleton() && host.contains_singleton(name)) {
            let object = self.produce(factory, name, host)?;
            if !should_post_process {
                return Ok(object);
            }
            return self
                .post_process(factory, object, name, host)
                .map_err(|e| {
                    BeanError::wrap_creation(name, "Post-processing of FactoryBean's object failed", e)
                });
        }

        let lock = self.production_lock(name);
        let _production = lock.lock();

        if let Some(cached) = self.cached_object(name) {
            return Ok(cached);
        }

        let mut object = self.produce(factory, name, host)?;

        // 生产过程中可能已经通过循环引用缓存了结果
        if let Some(already_there) = self.cached_object(name) {
            return Ok(already_there);
        }

        if should_post_process {
            if host.is_singleton_currently_in_creation(name) {
                // 工厂本身还在创建中，暂时返回未经后处理的对象且不缓存
                return Ok(object);
            }
            if !self.post_processing.lock().insert(name.to_string()) {
                return Err(BeanError::currently_in_creation(name));
            }
            let processed = self.post_process(factory, object, name, host);
            self.post_processing.lock().remove(name);
            object = processed.map_err(|e| {
                BeanError::wrap_creation(
                    name,
                    "Post-processing of FactoryBean's singleton object failed",
                    e,
                )
            })?;
        }

        if host.contains_singleton(name) {
            self.objects.lock().insert(name.to_string(), object.clone());
            tracing::trace!("Cached object produced by FactoryBean '{}'", name);
        }
        Ok(object)
    }

    fn produce(
        &self,
        factory: &dyn FactoryBean,
        name: &str,
        host: &dyn FactoryBeanHost,
    ) -> BeanResult<BeanInstance> {
        let produced = factory.get_object().map_err(|e| {
            BeanError::wrap_creation(name, "FactoryBean threw exception on object creation", e)
        })?;

        match produced {
            Some(object) => Ok(object),
            None => {
                if host.is_singleton_currently_in_creation(name) {
                    return Err(BeanError::currently_in_creation_with(
                        name,
                        "FactoryBean which is currently in creation returned null from get_object",
                    ));
                }
                Ok(self.null_bean())
            }
        }
    }

    fn post_process(
        &self,
        factory: &dyn FactoryBean,
        object: BeanInstance,
        name: &str,
        host: &dyn FactoryBeanHost,
    ) -> anyhow::Result<BeanInstance> {
        let handle = BeanHandle::from_instance(object, factory.object_type());
        host.post_process_object_from_factory_bean(handle, name)
            .map(BeanHandle::into_instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::{is_null_bean, BeanType};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct Host {
        singleton: bool,
        in_creation: AtomicBool,
        fail_post_processing: bool,
        post_processed: AtomicUsize,
    }

    impl Host {
        fn singleton() -> Self {
            Self {
                singleton: true,
                in_creation: AtomicBool::new(false),
                fail_post_processing: false,
                post_processed: AtomicUsize::new(0),
            }
        }
    }

    impl FactoryBeanHost for Host {
        fn contains_singleton(&self, _name: &str) -> bool {
            self.singleton
        }

        fn is_singleton_currently_in_creation(&self, _name: &str) -> bool {
            self.in_creation.load(Ordering::SeqCst)
        }

        fn post_process_object_from_factory_bean(
            &self,
            object: BeanHandle,
            _name: &str,
        ) -> anyhow::Result<BeanHandle> {
            if self.fail_post_processing {
                anyhow::bail!("proxy generation failed");
            }
            self.post_processed.fetch_add(1, Ordering::SeqCst);
            Ok(object)
        }
    }

    struct Counting {
        calls: AtomicUsize,
        returns_none: bool,
        singleton: bool,
    }

    impl Counting {
        fn new(returns_none: bool, singleton: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                returns_none,
                singleton,
            }
        }
    }

    impl FactoryBean for Counting {
        fn get_object(&self) -> anyhow::Result<Option<BeanInstance>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.returns_none {
                Ok(None)
            } else {
                Ok(Some(Arc::new(n)))
            }
        }

        fn object_type(&self) -> Option<BeanType> {
            Some(BeanType::of::<usize>())
        }

        fn is_singleton(&self) -> bool {
            self.singleton
        }
    }

    #[test]
    fn test_singleton_object_cached() {
        let cache = FactoryBeanObjectCache::new();
        let host = Host::singleton();
        let factory = Counting::new(false, true);

        let first = cache
            .get_object_from_factory_bean(&factory, "counter", true, &host)
            .unwrap();
        let second = cache
            .get_object_from_factory_bean(&factory, "counter", true, &host)
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.calls.load(Ordering::SeqCst), 1);
        assert_eq!(host.post_processed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_null_result_cached_as_placeholder() {
        let cache = FactoryBeanObjectCache::new();
        let host = Host::singleton();
        let factory = Counting::new(true, true);

        let first = cache
            .get_object_from_factory_bean(&factory, "empty", false, &host)
            .unwrap();
        let second = cache
            .get_object_from_factory_bean(&factory, "empty", false, &host)
            .unwrap();

        assert!(is_null_bean(&first));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_null_while_in_creation_fails() {
        let cache = FactoryBeanObjectCache::new();
        let host = Host::singleton();
        host.in_creation.store(true, Ordering::SeqCst);
        let factory = Counting::new(true, true);

        let err = cache
            .get_object_from_factory_bean(&factory, "empty", false, &host)
            .unwrap_err();
        assert!(err.is_currently_in_creation());
    }

    #[test]
    fn test_non_singleton_factory_produces_each_time() {
        let cache = FactoryBeanObjectCache::new();
        let host = Host::singleton();
        let factory = Counting::new(false, false);

        cache
            .get_object_from_factory_bean(&factory, "counter", true, &host)
            .unwrap();
        cache
            .get_object_from_factory_bean(&factory, "counter", true, &host)
            .unwrap();
        assert_eq!(factory.calls.load(Ordering::SeqCst), 2);
        assert!(cache.cached_object("counter").is_none());
    }

    #[test]
    fn test_post_processing_skipped_while_factory_in_creation() {
        let cache = FactoryBeanObjectCache::new();
        let host = Host::singleton();
        host.in_creation.store(true, Ordering::SeqCst);
        let factory = Counting::new(false, true);

        cache
            .get_object_from_factory_bean(&factory, "counter", true, &host)
            .unwrap();
        assert_eq!(host.post_processed.load(Ordering::SeqCst), 0);
        assert!(cache.cached_object("counter").is_none());
    }

    #[test]
    fn test_post_processing_failure_is_creation_error() {
        let cache = FactoryBeanObjectCache::new();
        let mut host = Host::singleton();
        host.fail_post_processing = true;
        let factory = Counting::new(false, true);

        let err = cache
            .get_object_from_factory_bean(&factory, "counter", true, &host)
            .unwrap_err();
        match err {
            BeanError::BeanCreation { name, message, .. } => {
                assert_eq!(name, "counter");
                assert_eq!(message, "Post-processing of FactoryBean's singleton object failed");
            }
            other => panic!("Expected BeanCreation, got {:?}", other),
        }
        assert!(cache.cached_object("counter").is_none());
    }
}
