//! Bean 工厂
//!
//! 接口层次与 Spring 保持一致：
//!
//! - [`BeanFactory`]：按名称获取 Bean 和基本的类型查询，可以作为 trait object 使用
//! - [`ListableBeanFactory`]：列举定义和按类型查找名称
//! - [`ConfigurableBeanFactory`]：作用域、后处理器、单例注册和销毁
//! - [`ConfigurableListableBeanFactory`]：预实例化、冻结配置、依赖校验
//!
//! [`DefaultBeanFactory`] 是默认实现。

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::bean::{describe_instance, BeanArgs, BeanHandle, BeanInstance, BeanType};
use crate::config::BeanFactoryConfig;
use crate::creation::{BeanCreation, CreationContext};
use crate::definition::{BeanDefinition, MergedBeanDefinition};
use crate::disposable::DisposableBeanAdapter;
use crate::error::{BeanError, BeanResult};
use crate::factory_bean::FactoryBeanObjectCache;
use crate::instantiator::{BeanInstantiator, SupplierInstantiator};
use crate::merged::MergedDefinitionCache;
use crate::post_processor::{BeanPostProcessor, BeanPostProcessors};
use crate::registry::{BeanDefinitionRegistry, SimpleBeanDefinitionRegistry};
use crate::scope::{BeanScope, Scope, ScopeError, SCOPE_PROTOTYPE, SCOPE_SINGLETON};
use crate::singleton::SingletonRegistry;
use crate::utils::dependency::{validate_dependency_graph, DependencyValidationError};
use crate::utils::naming;

/// BeanFactory - 最基础的容器接口
///
/// 注意：此 trait 不包含泛型方法，因此可以作为 trait object 使用
pub trait BeanFactory: Send + Sync {
    /// 通过名称获取 Bean，`&name` 返回 FactoryBean 本身
    fn get_bean(&self, name: &str) -> BeanResult<BeanInstance>;

    /// 获取 Bean 并校验类型
    fn get_bean_of_type(&self, name: &str, required_type: BeanType) -> BeanResult<BeanInstance>;

    /// 使用显式参数创建 Bean（只对非单例有意义）
    fn get_bean_with_args(&self, name: &str, args: BeanArgs) -> BeanResult<BeanInstance>;

    /// 检查是否包含指定名称的 Bean（包括父容器）
    fn contains_bean(&self, name: &str) -> bool;

    fn is_singleton(&self, name: &str) -> BeanResult<bool>;

    fn is_prototype(&self, name: &str) -> BeanResult<bool>;

    /// 名称对应的 Bean 是否匹配指定类型，必要时允许初始化 FactoryBean
    fn is_type_match(&self, name: &str, type_to_match: BeanType) -> BeanResult<bool>;

    /// 名称对应的 Bean 的类型，无法确定时返回 None
    fn get_type(&self, name: &str) -> BeanResult<Option<BeanType>>;

    /// 名称的所有别名（不包括请求的名称本身）
    fn get_aliases(&self, name: &str) -> Vec<String>;
}

/// BeanFactoryExt - BeanFactory 的扩展 trait
///
/// 提供泛型方法，不能作为 trait object 使用
pub trait BeanFactoryExt: BeanFactory {
    /// 获取 Bean 并向下转型
    fn get_bean_typed<T: Any + Send + Sync>(&self, name: &str) -> BeanResult<Arc<T>> {
        let bean = self.get_bean_of_type(name, BeanType::of::<T>())?;
        bean.downcast::<T>()
            .map_err(|bean| BeanError::BeanNotOfRequiredType {
                name: name.to_string(),
                required: std::any::type_name::<T>().to_string(),
                actual: describe_instance(&bean),
            })
    }

    fn is_type_match_of<T: Any + Send + Sync>(&self, name: &str) -> BeanResult<bool> {
        self.is_type_match(name, BeanType::of::<T>())
    }
}

impl<F: BeanFactory + ?Sized> BeanFactoryExt for F {}

/// ListableBeanFactory - 可列举的 Bean 工厂
///
/// 只列举本容器的定义，不包括父容器
pub trait ListableBeanFactory: BeanFactory {
    fn contains_bean_definition(&self, name: &str) -> bool;

    fn bean_definition_count(&self) -> usize;

    /// 按注册顺序返回定义名称
    fn bean_definition_names(&self) -> Vec<String>;

    /// 匹配指定类型的 Bean 名称
    ///
    /// FactoryBean 先按其生产的对象匹配，不匹配时再按 `&name` 匹配工厂本身。
    fn bean_names_for_type(
        &self,
        bean_type: BeanType,
        include_non_singletons: bool,
        allow_eager_init: bool,
    ) -> BeanResult<Vec<String>>;
}

/// 按类型获取 Bean 的泛型扩展
pub trait ListableBeanFactoryExt: ListableBeanFactory {
    /// 通过类型获取唯一的 Bean
    fn get_bean_by_type<T: Any + Send + Sync>(&self) -> BeanResult<Arc<T>> {
        let names = self.bean_names_for_type(BeanType::of::<T>(), true, true)?;
        match names.as_slice() {
            [name] => self.get_bean_typed::<T>(name),
            [] => Err(BeanError::no_such_bean(std::any::type_name::<T>())),
            _ => Err(BeanError::IllegalState(format!(
                "Expected single matching bean of type '{}' but found {}: {}",
                std::any::type_name::<T>(),
                names.len(),
                names.join(", ")
            ))),
        }
    }

    /// 获取指定类型的所有 Bean，按定义注册顺序排列
    fn get_beans_of_type<T: Any + Send + Sync>(&self) -> BeanResult<Vec<(String, Arc<T>)>> {
        self.bean_names_for_type(BeanType::of::<T>(), true, true)?
            .into_iter()
            .map(|name| {
                let bean = self.get_bean_typed::<T>(&name)?;
                Ok((name, bean))
            })
            .collect()
    }
}

impl<F: ListableBeanFactory + ?Sized> ListableBeanFactoryExt for F {}

/// ConfigurableBeanFactory - 可配置的 Bean 工厂
///
/// 提供作用域、后处理器、手动单例和销毁相关的能力，也是父容器需要实现的接口
pub trait ConfigurableBeanFactory: BeanFactory {
    fn parent_bean_factory(&self) -> Option<Arc<dyn ConfigurableBeanFactory>>;

    /// 获取 Bean 的句柄，保留 FactoryBean、DisposableBean 等能力
    fn resolve_bean_handle(
        &self,
        name: &str,
        required_type: Option<BeanType>,
        args: Option<&BeanArgs>,
    ) -> BeanResult<BeanHandle>;

    /// 合并后的定义，本地没有定义时查找父容器
    fn merged_bean_definition(&self, name: &str) -> BeanResult<Arc<MergedBeanDefinition>>;

    /// `allow_factory_bean_init` 为 false 时不会为了确定类型而创建 FactoryBean
    fn get_type_with_init(
        &self,
        name: &str,
        allow_factory_bean_init: bool,
    ) -> BeanResult<Option<BeanType>>;

    fn is_type_match_with_init(
        &self,
        name: &str,
        type_to_match: BeanType,
        allow_factory_bean_init: bool,
    ) -> BeanResult<bool>;

    fn is_factory_bean(&self, name: &str) -> BeanResult<bool>;

    /// 单例是否正在创建
    fn is_currently_in_creation(&self, name: &str) -> bool;

    /// 只检查本容器
    fn contains_local_bean(&self, name: &str) -> bool;

    /// 注册自定义作用域，不能替换 singleton 和 prototype
    fn register_scope(&self, name: &str, scope: Arc<dyn Scope>) -> BeanResult<()>;

    fn registered_scope_names(&self) -> Vec<String>;

    fn registered_scope(&self, name: &str) -> Option<Arc<dyn Scope>>;

    /// 添加 BeanPostProcessor
    fn add_bean_post_processor(&self, processor: Arc<dyn BeanPostProcessor>);

    fn bean_post_processor_count(&self) -> usize;

    /// 注册一个已经构建好的单例
    fn register_singleton(&self, name: &str, singleton: BeanHandle) -> BeanResult<()>;

    fn contains_singleton(&self, name: &str) -> bool;

    fn singleton_names(&self) -> Vec<String>;

    /// 登记 `dependent` 依赖于 `bean`，销毁 `bean` 之前会先销毁 `dependent`
    fn register_dependent_bean(&self, bean: &str, dependent: &str);

    fn dependent_beans(&self, name: &str) -> Vec<String>;

    fn dependencies_for_bean(&self, name: &str) -> Vec<String>;

    /// 按定义执行实例的销毁回调（通常用于原型 Bean）
    fn destroy_bean(&self, name: &str, bean: BeanHandle) -> BeanResult<()>;

    /// 从自定义作用域中移除并销毁 Bean
    fn destroy_scoped_bean(&self, name: &str) -> BeanResult<()>;

    fn destroy_singleton(&self, name: &str);

    /// 销毁所有单例 Bean（调用 destroy 回调）
    fn destroy_singletons(&self);
}

/// ConfigurableListableBeanFactory - 可配置且可列举的 Bean 工厂
pub trait ConfigurableListableBeanFactory: ListableBeanFactory + ConfigurableBeanFactory {
    /// 预实例化所有非懒加载的单例 Bean
    fn preinstantiate_singletons(&self) -> BeanResult<()>;

    /// 冻结配置（不再允许修改 Bean 定义）
    fn freeze_configuration(&self);

    /// 检查配置是否已冻结
    fn is_configuration_frozen(&self) -> bool;

    /// 校验 depends-on 声明：不能缺失，不能成环
    fn validate_dependencies(&self) -> BeanResult<()>;
}

/// DefaultBeanFactory - ConfigurableListableBeanFactory 的默认实现
pub struct DefaultBeanFactory {
    config: RwLock<BeanFactoryConfig>,

    /// Bean 定义存储
    registry: Arc<dyn BeanDefinitionRegistry>,

    instantiator: Arc<dyn BeanInstantiator>,

    parent: Option<Arc<dyn ConfigurableBeanFactory>>,

    /// 合并定义缓存
    pub(crate) merged: MergedDefinitionCache,

    /// 单例缓存、创建协调与依赖关系
    pub(crate) singletons: SingletonRegistry,

    /// FactoryBean 生产的单例对象
    pub(crate) factory_objects: FactoryBeanObjectCache,

    scopes: RwLock<HashMap<String, Arc<dyn Scope>>>,

    /// Bean 后置处理器列表（按优先级排序）
    pub(crate) post_processors: BeanPostProcessors,

    /// 至少创建过一次的 Bean
    already_created: RwLock<HashSet<String>>,

    /// 配置是否已冻结
    configuration_frozen: RwLock<bool>,

    inner_bean_counter: AtomicU64,
}

impl DefaultBeanFactory {
    /// 创建新的 Bean 工厂
    pub fn new() -> Self {
        Self::with_config(BeanFactoryConfig::default())
    }

    pub fn with_config(config: BeanFactoryConfig) -> Self {
        Self {
            config: RwLock::new(config),
            registry: Arc::new(SimpleBeanDefinitionRegistry::new()),
            instantiator: Arc::new(SupplierInstantiator),
            parent: None,
            merged: MergedDefinitionCache::new(),
            singletons: SingletonRegistry::new(),
            factory_objects: FactoryBeanObjectCache::new(),
            scopes: RwLock::new(HashMap::new()),
            post_processors: BeanPostProcessors::new(),
            already_created: RwLock::new(HashSet::new()),
            configuration_frozen: RwLock::new(false),
            inner_bean_counter: AtomicU64::new(0),
        }
    }

    pub fn builder() -> BeanFactoryBuilder {
        BeanFactoryBuilder::new()
    }

    pub fn config(&self) -> BeanFactoryConfig {
        self.config.read().clone()
    }

    pub(crate) fn allow_circular_references(&self) -> bool {
        self.config.read().allow_circular_references
    }

    pub fn set_allow_circular_references(&self, allow: bool) {
        self.config.write().allow_circular_references = allow;
    }

    pub fn set_allow_raw_injection_despite_wrapping(&self, allow: bool) {
        self.config.write().allow_raw_injection_despite_wrapping = allow;
    }

    /// 关闭后只缓存已经创建过的 Bean 的合并定义
    pub fn set_cache_bean_metadata(&self, cache: bool) {
        self.config.write().cache_bean_metadata = cache;
    }

    pub fn registry(&self) -> &Arc<dyn BeanDefinitionRegistry> {
        &self.registry
    }

    /// 别名解析后的规范名称
    pub fn canonical_name(&self, name: &str) -> String {
        self.registry.canonical_name(name)
    }

    /// 去掉 `&` 前缀并解析别名
    pub(crate) fn transformed_bean_name(&self, name: &str) -> String {
        self.canonical_name(naming::transformed_bean_name(name))
    }

    // ---------------------------------------------------------------
    // 定义注册
    // ---------------------------------------------------------------

    /// 注册 Bean 定义
    ///
    /// 覆盖已有定义（或同名的手动单例）时会重置旧的合并定义和单例实例，
    /// 以它为父定义的子定义也会一并重置。
    pub fn register_bean_definition(
        &self,
        name: &str,
        definition: BeanDefinition,
    ) -> BeanResult<()> {
        self.check_configuration_not_frozen(name)?;

        let existing = self.registry.contains_bean_definition(name);
        if existing && !self.config.read().allow_bean_definition_overriding {
            return Err(BeanError::BeanDefinitionOverride(name.to_string()));
        }

        self.registry.register_bean_definition(name, definition)?;
        if existing {
            tracing::debug!("Overriding bean definition for bean '{}'", name);
        } else {
            tracing::trace!("Registered bean definition for bean '{}'", name);
        }

        if existing || self.singletons.contains_singleton(name) {
            self.reset_bean_definition(name);
        }
        Ok(())
    }

    /// 移除 Bean 定义，同时销毁对应的单例
    pub fn remove_bean_definition(&self, name: &str) -> BeanResult<BeanDefinition> {
        self.check_configuration_not_frozen(name)?;

        let removed = self.registry.remove_bean_definition(name)?;
        self.reset_bean_definition(name);
        self.merged.remove(name);
        tracing::debug!("Removed bean definition for bean '{}'", name);
        Ok(removed)
    }

    pub fn bean_definition(&self, name: &str) -> Option<BeanDefinition> {
        self.registry.bean_definition(name)
    }

    pub fn register_alias(&self, name: &str, alias: &str) -> BeanResult<()> {
        self.registry.register_alias(name, alias)
    }

    pub fn remove_alias(&self, alias: &str) -> BeanResult<()> {
        self.registry.remove_alias(alias)
    }

    fn check_configuration_not_frozen(&self, name: &str) -> BeanResult<()> {
        if *self.configuration_frozen.read() {
            return Err(BeanError::IllegalState(format!(
                "Cannot modify bean definition '{}': configuration is frozen",
                name
            )));
        }
        Ok(())
    }

    fn reset_bean_definition(&self, name: &str) {
        let mut visited = HashSet::new();
        self.reset_bean_definition_recursive(name, &mut visited);
    }

    fn reset_bean_definition_recursive(&self, name: &str, visited: &mut HashSet<String>) {
        if !visited.insert(name.to_string()) {
            return;
        }

        self.merged.mark_stale(name);
        self.destroy_singleton(name);

        let cache = self.post_processors.cache();
        for processor in &cache.merged_definition {
            processor.reset_bean_definition(name);
        }

        // 以它为父定义的子定义也需要重新合并
        for child in self.registry.bean_definition_names() {
            let is_child = self
                .registry
                .bean_definition(&child)
                .and_then(|definition| definition.parent_name)
                .map(|parent| self.canonical_name(&parent) == name)
                .unwrap_or(false);
            if is_child {
                self.reset_bean_definition_recursive(&child, visited);
            }
        }
    }

    // ---------------------------------------------------------------
    // 合并定义
    // ---------------------------------------------------------------

    /// 本地定义的合并结果
    pub(crate) fn merged_local_bean_definition(
        &self,
        bean_name: &str,
    ) -> BeanResult<Arc<MergedBeanDefinition>> {
        if let Some(mbd) = self.merged.get_fresh(bean_name) {
            return Ok(mbd);
        }
        let raw = self
            .registry
            .bean_definition(bean_name)
            .ok_or_else(|| BeanError::no_such_bean(bean_name))?;
        self.merged.resolve(bean_name, &raw, None, self)
    }

    /// 当前 Bean 至少创建过一次
    pub fn has_been_created(&self, name: &str) -> bool {
        self.already_created.read().contains(name)
    }

    pub fn has_bean_creation_started(&self) -> bool {
        !self.already_created.read().is_empty()
    }

    /// 丢弃尚未创建过的 Bean 的合并定义，下次访问时重新合并
    pub fn clear_metadata_cache(&self) {
        let created = self.already_created.read().clone();
        self.merged.retain(|name| created.contains(name));
        tracing::debug!("Cleared merged bean definitions for beans not yet created");
    }

    fn mark_bean_as_created(&self, bean_name: &str) {
        if self.already_created.read().contains(bean_name) {
            return;
        }
        let newly_created = self.already_created.write().insert(bean_name.to_string());
        if newly_created {
            // 真正创建前重新合并一次，以防定义在此期间被修改
            // 写锁已释放，合并缓存的锁不能与它同时持有
            self.merged.mark_stale(bean_name);
        }
    }

    fn cleanup_after_bean_creation_failure(&self, bean_name: &str) {
        self.already_created.write().remove(bean_name);
    }

    /// 只为类型检查创建的单例可以直接移除
    fn remove_singleton_if_created_for_type_check_only(&self, bean_name: &str) -> bool {
        if self.has_been_created(bean_name) {
            return false;
        }
        self.destroy_singleton(bean_name);
        true
    }

    // ---------------------------------------------------------------
    // 获取 Bean
    // ---------------------------------------------------------------

    pub(crate) fn do_get_bean(
        &self,
        name: &str,
        required_type: Option<BeanType>,
        args: Option<&BeanArgs>,
        type_check_only: bool,
        ctx: &CreationContext,
    ) -> BeanResult<BeanInstance> {
        self.resolve_bean(name, required_type, args, type_check_only, ctx)
            .map(BeanHandle::into_instance)
    }

    /// 获取 Bean 的完整流程
    ///
    /// 1. 去掉 `&` 前缀并解析别名
    /// 2. 单例缓存（同一调用链内可能拿到早期引用）
    /// 3. 同一调用链内的原型循环检测
    /// 4. 本地没有定义时交给父容器
    /// 5. 合并定义，先创建 depends-on 声明的 Bean
    /// 6. 按作用域创建：单例、原型、自定义作用域
    /// 7. FactoryBean 解引用，最后检查要求的类型
    pub(crate) fn resolve_bean(
        &self,
        name: &str,
        required_type: Option<BeanType>,
        args: Option<&BeanArgs>,
        type_check_only: bool,
        ctx: &CreationContext,
    ) -> BeanResult<BeanHandle> {
        let bean_name = self.transformed_bean_name(name);

        if args.is_none() {
            if let Some(shared) = self.singletons.get_singleton(&bean_name, Some(ctx))? {
                tracing::trace!("Returning cached instance of singleton bean '{}'", bean_name);
                let bean = self.object_for_bean_instance(shared, name, &bean_name, None)?;
                return self.adapt_bean_instance(&bean_name, bean, required_type);
            }
        }

        if ctx.is_prototype_in_creation(&bean_name) {
            return Err(BeanError::currently_in_creation(bean_name));
        }

        if let Some(parent) = &self.parent {
            if !self.registry.contains_bean_definition(&bean_name) {
                let lookup = naming::original_bean_name(name, &bean_name);
                tracing::trace!("Delegating lookup of bean '{}' to parent factory", lookup);
                return parent.resolve_bean_handle(&lookup, required_type, args);
            }
        }

        if !type_check_only {
            self.mark_bean_as_created(&bean_name);
        }

        let bean = match self.create_bean_for_scope(name, &bean_name, args, ctx) {
            Ok(bean) => bean,
            Err(e) => {
                self.cleanup_after_bean_creation_failure(&bean_name);
                return Err(e);
            }
        };
        self.adapt_bean_instance(&bean_name, bean, required_type)
    }

    fn create_bean_for_scope(
        &self,
        name: &str,
        bean_name: &str,
        args: Option<&BeanArgs>,
        ctx: &CreationContext,
    ) -> BeanResult<BeanHandle> {
        let mbd = self.merged_local_bean_definition(bean_name)?;
        if mbd.is_abstract() {
            return Err(BeanError::BeanIsAbstract(bean_name.to_string()));
        }

        // 先初始化 depends-on 声明的 Bean
        for dependency in mbd.depends_on() {
            let canonical = self.transformed_bean_name(dependency);
            if self.singletons.is_dependent(bean_name, &canonical) {
                return Err(BeanError::CircularDependsOn {
                    name: bean_name.to_string(),
                    dependency: dependency.clone(),
                });
            }
            self.singletons.register_dependent_bean(&canonical, bean_name);
            match self.do_get_bean(dependency, None, None, false, ctx) {
                Ok(_) => {}
                Err(e) if e.is_no_such_bean_definition() => {
                    return Err(BeanError::MissingDependency {
                        name: bean_name.to_string(),
                        dependency: dependency.clone(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let instance = match BeanScope::from(mbd.scope()) {
            BeanScope::Singleton => self.singletons.get_or_create(bean_name, ctx, || {
                self.create_bean(bean_name, &mbd, args, ctx).map_err(|e| {
                    // 清理创建过程中可能已经登记的依赖关系和销毁回调
                    self.destroy_singleton(bean_name);
                    e
                })
            })?,
            BeanScope::Prototype => {
                let _in_creation = ctx.enter_prototype(bean_name);
                self.create_bean(bean_name, &mbd, args, ctx)?
            }
            BeanScope::Custom(scope_name) => {
                let scope = self.registered_scope(&scope_name).ok_or_else(|| {
                    BeanError::ScopeNotActive {
                        name: bean_name.to_string(),
                        scope: scope_name.clone(),
                        reason: format!("No Scope registered for scope name '{}'", scope_name),
                    }
                })?;
                let mut object_factory = || {
                    let _in_creation = ctx.enter_prototype(bean_name);
                    self.create_bean(bean_name, &mbd, args, ctx)
                };
                match scope.get(bean_name, &mut object_factory) {
                    Ok(bean) => bean,
                    Err(ScopeError::Inactive(reason)) => {
                        return Err(BeanError::ScopeNotActive {
                            name: bean_name.to_string(),
                            scope: scope_name,
                            reason,
                        });
                    }
                    Err(ScopeError::Bean(e)) => return Err(e),
                }
            }
        };

        self.object_for_bean_instance(instance, name, bean_name, Some(&mbd))
    }

    /// 请求的名称与实例之间的 FactoryBean 语义
    ///
    /// `&name` 返回工厂本身；普通名称遇到 FactoryBean 时返回它生产的对象。
    pub(crate) fn object_for_bean_instance(
        &self,
        instance: BeanHandle,
        name: &str,
        bean_name: &str,
        mbd: Option<&Arc<MergedBeanDefinition>>,
    ) -> BeanResult<BeanHandle> {
        if naming::is_factory_dereference(name) {
            if instance.is_null() {
                return Ok(instance);
            }
            if !instance.is_factory_bean() {
                return Err(BeanError::BeanIsNotAFactory {
                    name: bean_name.to_string(),
                    actual: instance.type_name().to_string(),
                });
            }
            if let Some(mbd) = mbd {
                mbd.set_factory_bean(true);
            }
            return Ok(instance);
        }

        let factory = match instance.as_factory() {
            Some(factory) => factory.clone(),
            None => return Ok(instance),
        };

        let synthetic = match mbd {
            Some(mbd) => {
                mbd.set_factory_bean(true);
                mbd.is_synthetic()
            }
            None => {
                if let Some(cached) = self.factory_objects.cached_object(bean_name) {
                    return Ok(BeanHandle::from_instance(cached, factory.object_type()));
                }
                self.registry.contains_bean_definition(bean_name)
                    && self
                        .merged_local_bean_definition(bean_name)
                        .map(|mbd| mbd.is_synthetic())
                        .unwrap_or(false)
            }
        };

        let object = self.factory_objects.get_object_from_factory_bean(
            factory.as_ref(),
            bean_name,
            !synthetic,
            self,
        )?;
        Ok(BeanHandle::from_instance(object, factory.object_type()))
    }

    fn adapt_bean_instance(
        &self,
        bean_name: &str,
        bean: BeanHandle,
        required_type: Option<BeanType>,
    ) -> BeanResult<BeanHandle> {
        match required_type {
            Some(required) if !required.is_instance(bean.instance()) => {
                Err(BeanError::BeanNotOfRequiredType {
                    name: bean_name.to_string(),
                    required: required.name().to_string(),
                    actual: bean.type_name().to_string(),
                })
            }
            _ => Ok(bean),
        }
    }

    // ---------------------------------------------------------------
    // 创建 Bean
    // ---------------------------------------------------------------

    /// 创建 Bean 实例并调用生命周期回调
    ///
    /// # Bean 生命周期顺序
    /// 1. InstantiationAwareBeanPostProcessor 可以直接返回实例（短路）
    /// 2. MergedBeanDefinitionPostProcessor（每个合并定义一次）
    /// 3. 实例化（supplier 或工厂方法，期间完成依赖注入并可暴露早期引用）
    /// 4. BeanPostProcessor.post_process_before_initialization
    /// 5. 自定义 init-method
    /// 6. BeanPostProcessor.post_process_after_initialization
    /// 7. 注册销毁回调
    pub(crate) fn create_bean(
        &self,
        bean_name: &str,
        mbd: &Arc<MergedBeanDefinition>,
        args: Option<&BeanArgs>,
        ctx: &CreationContext,
    ) -> BeanResult<BeanHandle> {
        tracing::trace!("Creating instance of bean '{}'", bean_name);

        let short_circuit = self.resolve_before_instantiation(bean_name, mbd).map_err(|e| {
            BeanError::wrap_creation(
                bean_name,
                "BeanPostProcessor before instantiation of bean failed",
                e,
            )
        })?;
        if let Some(bean) = short_circuit {
            return Ok(bean);
        }

        let bean = self.do_create_bean(bean_name, mbd, args, ctx)?;
        tracing::trace!("Finished creating instance of bean '{}'", bean_name);
        Ok(bean)
    }

    fn resolve_before_instantiation(
        &self,
        bean_name: &str,
        mbd: &MergedBeanDefinition,
    ) -> anyhow::Result<Option<BeanHandle>> {
        if mbd.before_instantiation_resolved() == Some(false) {
            return Ok(None);
        }

        let mut bean = None;
        if !mbd.is_synthetic() && self.post_processors.has_instantiation_aware() {
            let cache = self.post_processors.cache();
            for processor in &cache.instantiation_aware {
                if let Some(result) = processor.post_process_before_instantiation(mbd, bean_name)? {
                    bean = Some(result);
                    break;
                }
            }
            if let Some(result) = bean.take() {
                bean = Some(self.apply_bean_post_processors_after_initialization(result, bean_name)?);
            }
        }
        mbd.set_before_instantiation_resolved(bean.is_some());
        Ok(bean)
    }

    fn do_create_bean(
        &self,
        bean_name: &str,
        mbd: &Arc<MergedBeanDefinition>,
        args: Option<&BeanArgs>,
        ctx: &CreationContext,
    ) -> BeanResult<BeanHandle> {
        let cache = self.post_processors.cache();
        mbd.post_process_once(|mbd| {
            for processor in &cache.merged_definition {
                processor.post_process_merged_bean_definition(mbd, bean_name)?;
            }
            Ok(())
        })
        .map_err(|e| {
            BeanError::wrap_creation(bean_name, "Post-processing of merged bean definition failed", e)
        })?;

        // 1. 实例化 Bean（构造函数 + 依赖注入）
        let creation = BeanCreation::new(self, ctx, bean_name, mbd, args);
        let bean = self
            .instantiator
            .construct(&creation)
            .map_err(|e| BeanError::wrap_creation(bean_name, "Instantiation of bean failed", e))?;
        if let Some(bean_type) = bean.bean_type() {
            mbd.set_target_type(bean_type);
        }

        // 2. 初始化
        let mut exposed = self.initialize_bean(bean_name, bean.clone(), mbd)?;

        // 3. 早期引用已经交出时，最终实例必须与之一致
        if mbd.is_singleton() {
            if let Some(early) = self.singletons.early_singleton(bean_name) {
                if exposed.ptr_eq(&bean) {
                    exposed = early;
                } else if !self.config.read().allow_raw_injection_despite_wrapping
                    && self.singletons.has_dependent_bean(bean_name)
                {
                    let actual_dependents: Vec<String> = self
                        .singletons
                        .dependent_beans(bean_name)
                        .into_iter()
                        .filter(|dependent| !self.remove_singleton_if_created_for_type_check_only(dependent))
                        .collect();
                    if !actual_dependents.is_empty() {
                        return Err(BeanError::currently_in_creation_with(
                            bean_name,
                            format!(
                                "Bean with name '{}' has been injected into other beans [{}] in its raw version as part of a circular reference, but has eventually been wrapped. This means that said other beans do not use the final version of the bean.",
                                bean_name,
                                actual_dependents.join(",")
                            ),
                        ));
                    }
                }
            }
        }

        // 4. 注册销毁回调
        self.register_disposable_bean_if_necessary(bean_name, bean, mbd)?;

        Ok(exposed)
    }

    fn initialize_bean(
        &self,
        bean_name: &str,
        bean: BeanHandle,
        mbd: &MergedBeanDefinition,
    ) -> BeanResult<BeanHandle> {
        let mut wrapped = bean;

        if !mbd.is_synthetic() {
            wrapped = self
                .apply_bean_post_processors_before_initialization(wrapped, bean_name)
                .map_err(|e| BeanError::wrap_creation(bean_name, "Initialization of bean failed", e))?;
        }

        if let Some(init) = &mbd.definition().init_method {
            tracing::trace!(
                "Invoking init method '{}' on bean with name '{}'",
                init.name,
                bean_name
            );
            init.invoke(&wrapped).map_err(|e| {
                BeanError::wrap_creation(
                    bean_name,
                    &format!("Invocation of init method '{}' failed", init.name),
                    e,
                )
            })?;
        }

        if !mbd.is_synthetic() {
            wrapped = self
                .apply_bean_post_processors_after_initialization(wrapped, bean_name)
                .map_err(|e| BeanError::wrap_creation(bean_name, "Initialization of bean failed", e))?;
        }

        Ok(wrapped)
    }

    /// 应用 BeanPostProcessor.post_process_before_initialization
    fn apply_bean_post_processors_before_initialization(
        &self,
        mut bean: BeanHandle,
        bean_name: &str,
    ) -> anyhow::Result<BeanHandle> {
        for processor in self.post_processors.snapshot() {
            bean = processor.post_process_before_initialization(bean, bean_name)?;
        }
        Ok(bean)
    }

    /// 应用 BeanPostProcessor.post_process_after_initialization
    pub(crate) fn apply_bean_post_processors_after_initialization(
        &self,
        mut bean: BeanHandle,
        bean_name: &str,
    ) -> anyhow::Result<BeanHandle> {
        for processor in self.post_processors.snapshot() {
            bean = processor.post_process_after_initialization(bean, bean_name)?;
        }
        Ok(bean)
    }

    fn register_disposable_bean_if_necessary(
        &self,
        bean_name: &str,
        bean: BeanHandle,
        mbd: &MergedBeanDefinition,
    ) -> BeanResult<()> {
        if mbd.is_prototype() {
            return Ok(());
        }
        let cache = self.post_processors.cache();
        if !DisposableBeanAdapter::requires_destruction(&bean, mbd, &cache.destruction_aware) {
            return Ok(());
        }

        let adapter = DisposableBeanAdapter::new(bean_name, bean, mbd, &cache.destruction_aware);
        if mbd.is_singleton() {
            self.singletons
                .register_disposable_bean(bean_name, adapter.into_callback());
        } else {
            let scope = self.registered_scope(mbd.scope()).ok_or_else(|| {
                BeanError::IllegalState(format!(
                    "No Scope registered for scope name '{}'",
                    mbd.scope()
                ))
            })?;
            scope.register_destruction_callback(bean_name, adapter.into_callback());
        }
        Ok(())
    }

    /// 为正在创建的单例登记早期引用工厂
    ///
    /// 早期引用在第一次被循环引用请求时才经过 SmartInstantiationAwareBeanPostProcessor 处理。
    pub(crate) fn expose_early_reference(
        &self,
        bean_name: &str,
        mbd: &MergedBeanDefinition,
        bean: BeanHandle,
    ) -> bool {
        let allowed = mbd.is_singleton()
            && self.allow_circular_references()
            && self.singletons.is_currently_in_creation(bean_name);
        if !allowed {
            return false;
        }

        tracing::trace!(
            "Eagerly caching bean '{}' to allow for resolving potential circular references",
            bean_name
        );
        let processors = if mbd.is_synthetic() {
            None
        } else {
            Some(self.post_processors.cache())
        };
        let name = bean_name.to_string();
        self.singletons.add_early_reference_factory(
            bean_name,
            Box::new(move || -> BeanResult<BeanHandle> {
                let mut exposed = bean;
                if let Some(cache) = processors {
                    for processor in &cache.smart_instantiation_aware {
                        exposed = processor.early_bean_reference(exposed, &name).map_err(|e| {
                            BeanError::wrap_creation(&name, "Early bean reference post-processing failed", e)
                        })?;
                    }
                }
                Ok(exposed)
            }),
        );
        true
    }

    /// 创建内部 Bean
    ///
    /// 定义按外层 Bean 合并且不缓存；内部 Bean 登记为外层 Bean 包含的 Bean，随外层一起销毁。
    pub(crate) fn create_inner_bean(
        &self,
        ctx: &CreationContext,
        outer_name: &str,
        outer_mbd: &MergedBeanDefinition,
        inner_name: Option<&str>,
        definition: BeanDefinition,
    ) -> BeanResult<BeanInstance> {
        let actual_name = match inner_name {
            Some(name) if !self.is_bean_name_in_use(name) => name.to_string(),
            other => naming::inner_bean_name(
                other,
                self.inner_bean_counter.fetch_add(1, Ordering::Relaxed),
            ),
        };

        let result = self.do_create_inner_bean(ctx, outer_name, outer_mbd, &actual_name, &definition);
        result.map_err(|e| {
            if e.is_currently_in_creation() {
                e
            } else {
                BeanError::creation(
                    outer_name,
                    format!("Cannot create inner bean '{}'", actual_name),
                    e,
                )
            }
        })
    }

    fn do_create_inner_bean(
        &self,
        ctx: &CreationContext,
        outer_name: &str,
        outer_mbd: &MergedBeanDefinition,
        inner_name: &str,
        definition: &BeanDefinition,
    ) -> BeanResult<BeanInstance> {
        let mbd = self
            .merged
            .resolve(inner_name, definition, Some(outer_mbd), self)?;
        self.singletons.register_contained_bean(inner_name, outer_name);

        for dependency in mbd.depends_on() {
            let canonical = self.transformed_bean_name(dependency);
            self.singletons.register_dependent_bean(&canonical, inner_name);
            self.do_get_bean(dependency, None, None, false, ctx)?;
        }

        let bean = self.create_bean(inner_name, &mbd, None, ctx)?;
        match bean.as_factory() {
            Some(factory) => self.factory_objects.get_object_from_factory_bean(
                factory.as_ref(),
                inner_name,
                !mbd.is_synthetic(),
                self,
            ),
            None => Ok(bean.into_instance()),
        }
    }

    fn is_bean_name_in_use(&self, name: &str) -> bool {
        self.registry.is_alias(name)
            || self.contains_local_bean(name)
            || self.singletons.has_dependent_bean(name)
    }

    fn destroy_bean_with(&self, bean_name: &str, bean: BeanHandle, mbd: &MergedBeanDefinition) {
        let cache = self.post_processors.cache();
        DisposableBeanAdapter::new(bean_name, bean, mbd, &cache.destruction_aware).destroy();
    }
}

impl Default for DefaultBeanFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DefaultBeanFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultBeanFactory")
            .field("definitions", &self.registry.bean_definition_names())
            .field("singletons", &self.singletons.singleton_names())
            .field("scopes", &self.registered_scope_names())
            .field("post_processors", &self.post_processors.len())
            .field("has_parent", &self.parent.is_some())
            .field("frozen", &*self.configuration_frozen.read())
            .finish()
    }
}

impl crate::merged::MergeContext for DefaultBeanFactory {
    fn lookup_merged_definition(&self, name: &str) -> BeanResult<Arc<MergedBeanDefinition>> {
        self.merged_bean_definition(name)
    }

    fn lookup_parent_merged_definition(
        &self,
        name: &str,
    ) -> Option<BeanResult<Arc<MergedBeanDefinition>>> {
        self.parent
            .as_ref()
            .map(|parent| parent.merged_bean_definition(name))
    }

    fn is_eligible_for_metadata_caching(&self, name: &str) -> bool {
        self.config.read().cache_bean_metadata
            || *self.configuration_frozen.read()
            || self.has_been_created(name)
    }
}

impl crate::factory_bean::FactoryBeanHost for DefaultBeanFactory {
    fn contains_singleton(&self, name: &str) -> bool {
        self.singletons.contains_singleton(name)
    }

    fn is_singleton_currently_in_creation(&self, name: &str) -> bool {
        self.singletons.is_currently_in_creation(name)
    }

    fn post_process_object_from_factory_bean(
        &self,
        object: BeanHandle,
        name: &str,
    ) -> anyhow::Result<BeanHandle> {
        self.apply_bean_post_processors_after_initialization(object, name)
    }
}

impl BeanFactory for DefaultBeanFactory {
    fn get_bean(&self, name: &str) -> BeanResult<BeanInstance> {
        self.do_get_bean(name, None, None, false, &CreationContext::new())
    }

    fn get_bean_of_type(&self, name: &str, required_type: BeanType) -> BeanResult<BeanInstance> {
        self.do_get_bean(name, Some(required_type), None, false, &CreationContext::new())
    }

    fn get_bean_with_args(&self, name: &str, args: BeanArgs) -> BeanResult<BeanInstance> {
        self.do_get_bean(name, None, Some(&args), false, &CreationContext::new())
    }

    fn contains_bean(&self, name: &str) -> bool {
        let bean_name = self.transformed_bean_name(name);
        if self.singletons.contains_singleton(&bean_name)
            || self.registry.contains_bean_definition(&bean_name)
        {
            return !naming::is_factory_dereference(name)
                || self.is_factory_bean(name).unwrap_or(false);
        }
        match &self.parent {
            Some(parent) => parent.contains_bean(&naming::original_bean_name(name, &bean_name)),
            None => false,
        }
    }

    fn is_singleton(&self, name: &str) -> BeanResult<bool> {
        self.resolve_is_singleton(name)
    }

    fn is_prototype(&self, name: &str) -> BeanResult<bool> {
        self.resolve_is_prototype(name)
    }

    fn is_type_match(&self, name: &str, type_to_match: BeanType) -> BeanResult<bool> {
        self.resolve_type_match(name, type_to_match, true)
    }

    fn get_type(&self, name: &str) -> BeanResult<Option<BeanType>> {
        self.resolve_type(name, true)
    }

    fn get_aliases(&self, name: &str) -> Vec<String> {
        let bean_name = self.transformed_bean_name(name);
        let is_dereference = naming::is_factory_dereference(name);
        let with_prefix = |n: &str| {
            if is_dereference {
                naming::factory_dereference(n)
            } else {
                n.to_string()
            }
        };

        let mut aliases = Vec::new();
        let full_name = with_prefix(&bean_name);
        if full_name != name {
            aliases.push(full_name.clone());
        }
        for alias in self.registry.aliases(&bean_name) {
            let alias = with_prefix(&alias);
            if alias != name {
                aliases.push(alias);
            }
        }

        if !self.singletons.contains_singleton(&bean_name)
            && !self.registry.contains_bean_definition(&bean_name)
        {
            if let Some(parent) = &self.parent {
                aliases.extend(parent.get_aliases(&full_name));
            }
        }
        aliases
    }
}

impl ListableBeanFactory for DefaultBeanFactory {
    fn contains_bean_definition(&self, name: &str) -> bool {
        self.registry.contains_bean_definition(name)
    }

    fn bean_definition_count(&self) -> usize {
        self.registry.bean_definition_count()
    }

    fn bean_definition_names(&self) -> Vec<String> {
        self.registry.bean_definition_names()
    }

    fn bean_names_for_type(
        &self,
        bean_type: BeanType,
        include_non_singletons: bool,
        allow_eager_init: bool,
    ) -> BeanResult<Vec<String>> {
        self.resolve_bean_names_for_type(bean_type, include_non_singletons, allow_eager_init)
    }
}

impl ConfigurableBeanFactory for DefaultBeanFactory {
    fn parent_bean_factory(&self) -> Option<Arc<dyn ConfigurableBeanFactory>> {
        self.parent.clone()
    }

    fn resolve_bean_handle(
        &self,
        name: &str,
        required_type: Option<BeanType>,
        args: Option<&BeanArgs>,
    ) -> BeanResult<BeanHandle> {
        self.resolve_bean(name, required_type, args, false, &CreationContext::new())
    }

    fn merged_bean_definition(&self, name: &str) -> BeanResult<Arc<MergedBeanDefinition>> {
        let bean_name = self.transformed_bean_name(name);
        if !self.registry.contains_bean_definition(&bean_name) {
            if let Some(parent) = &self.parent {
                return parent.merged_bean_definition(&bean_name);
            }
        }
        self.merged_local_bean_definition(&bean_name)
    }

    fn get_type_with_init(
        &self,
        name: &str,
        allow_factory_bean_init: bool,
    ) -> BeanResult<Option<BeanType>> {
        self.resolve_type(name, allow_factory_bean_init)
    }

    fn is_type_match_with_init(
        &self,
        name: &str,
        type_to_match: BeanType,
        allow_factory_bean_init: bool,
    ) -> BeanResult<bool> {
        self.resolve_type_match(name, type_to_match, allow_factory_bean_init)
    }

    fn is_factory_bean(&self, name: &str) -> BeanResult<bool> {
        let bean_name = self.transformed_bean_name(name);
        if let Some(instance) = self.singletons.get_singleton(&bean_name, None)? {
            return Ok(instance.is_factory_bean());
        }
        if !self.registry.contains_bean_definition(&bean_name) {
            if let Some(parent) = &self.parent {
                return parent.is_factory_bean(name);
            }
        }
        let mbd = self.merged_local_bean_definition(&bean_name)?;
        Ok(self.is_factory_bean_definition(&bean_name, &mbd))
    }

    fn is_currently_in_creation(&self, name: &str) -> bool {
        self.singletons
            .is_currently_in_creation(&self.transformed_bean_name(name))
    }

    fn contains_local_bean(&self, name: &str) -> bool {
        let bean_name = self.transformed_bean_name(name);
        (self.singletons.contains_singleton(&bean_name)
            || self.registry.contains_bean_definition(&bean_name))
            && (!naming::is_factory_dereference(name)
                || self.is_factory_bean(&bean_name).unwrap_or(false))
    }

    fn register_scope(&self, name: &str, scope: Arc<dyn Scope>) -> BeanResult<()> {
        if name == SCOPE_SINGLETON || name == SCOPE_PROTOTYPE {
            return Err(BeanError::IllegalArgument(
                "Cannot replace existing scopes 'singleton' and 'prototype'".to_string(),
            ));
        }
        if name.is_empty() {
            return Err(BeanError::IllegalArgument(
                "Scope identifier must not be empty".to_string(),
            ));
        }
        let previous = self.scopes.write().insert(name.to_string(), scope);
        if previous.is_some() {
            tracing::debug!("Replacing scope '{}'", name);
        } else {
            tracing::debug!("Registering scope '{}'", name);
        }
        Ok(())
    }

    fn registered_scope_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.scopes.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn registered_scope(&self, name: &str) -> Option<Arc<dyn Scope>> {
        self.scopes.read().get(name).cloned()
    }

    fn add_bean_post_processor(&self, processor: Arc<dyn BeanPostProcessor>) {
        tracing::debug!("Adding bean post processor '{}'", processor.name());
        self.post_processors.add(processor);
    }

    fn bean_post_processor_count(&self) -> usize {
        self.post_processors.len()
    }

    fn register_singleton(&self, name: &str, singleton: BeanHandle) -> BeanResult<()> {
        self.singletons.register_singleton(name, singleton)
    }

    fn contains_singleton(&self, name: &str) -> bool {
        self.singletons.contains_singleton(name)
    }

    fn singleton_names(&self) -> Vec<String> {
        self.singletons.singleton_names()
    }

    fn register_dependent_bean(&self, bean: &str, dependent: &str) {
        let canonical = self.canonical_name(bean);
        self.singletons.register_dependent_bean(&canonical, dependent);
    }

    fn dependent_beans(&self, name: &str) -> Vec<String> {
        self.singletons.dependent_beans(&self.transformed_bean_name(name))
    }

    fn dependencies_for_bean(&self, name: &str) -> Vec<String> {
        self.singletons
            .dependencies_for_bean(&self.transformed_bean_name(name))
    }

    fn destroy_bean(&self, name: &str, bean: BeanHandle) -> BeanResult<()> {
        let bean_name = self.transformed_bean_name(name);
        let mbd = self.merged_local_bean_definition(&bean_name)?;
        self.destroy_bean_with(&bean_name, bean, &mbd);
        Ok(())
    }

    fn destroy_scoped_bean(&self, name: &str) -> BeanResult<()> {
        let bean_name = self.transformed_bean_name(name);
        let mbd = self.merged_local_bean_definition(&bean_name)?;
        if mbd.is_singleton() || mbd.is_prototype() {
            return Err(BeanError::IllegalArgument(format!(
                "Bean name '{}' does not correspond to an object in a mutable scope",
                bean_name
            )));
        }
        let scope = self.registered_scope(mbd.scope()).ok_or_else(|| {
            BeanError::IllegalState(format!(
                "No Scope registered for scope name '{}'",
                mbd.scope()
            ))
        })?;
        if let Some(bean) = scope.remove(&bean_name) {
            self.destroy_bean_with(&bean_name, bean, &mbd);
        }
        Ok(())
    }

    fn destroy_singleton(&self, name: &str) {
        self.singletons
            .destroy_singleton(name, &|removed: &str| self.factory_objects.remove(removed));
    }

    fn destroy_singletons(&self) {
        self.singletons
            .destroy_singletons(&|removed: &str| self.factory_objects.remove(removed));
        self.factory_objects.clear();
    }
}

impl ConfigurableListableBeanFactory for DefaultBeanFactory {
    fn preinstantiate_singletons(&self) -> BeanResult<()> {
        tracing::debug!("Pre-instantiating singletons in {:?}", self);

        let mut count = 0;
        for name in self.registry.bean_definition_names() {
            let mbd = self.merged_local_bean_definition(&name)?;
            if mbd.is_abstract() || !mbd.is_singleton() || mbd.is_lazy_init() {
                continue;
            }
            if self.is_factory_bean(&name)? {
                self.get_bean(&naming::factory_dereference(&name))?;
            } else {
                self.get_bean(&name)?;
            }
            count += 1;
        }
        tracing::info!("Pre-instantiated {} singletons", count);
        Ok(())
    }

    fn freeze_configuration(&self) {
        *self.configuration_frozen.write() = true;
        tracing::debug!("Bean factory configuration frozen");
    }

    fn is_configuration_frozen(&self) -> bool {
        *self.configuration_frozen.read()
    }

    fn validate_dependencies(&self) -> BeanResult<()> {
        let mut graph = HashMap::new();
        for name in self.registry.bean_definition_names() {
            let mbd = self.merged_local_bean_definition(&name)?;
            let depends_on = mbd
                .depends_on()
                .iter()
                .map(|dependency| self.transformed_bean_name(dependency))
                .collect();
            graph.insert(name, depends_on);
        }

        validate_dependency_graph(&graph, |name| self.contains_bean(name)).map_err(|e| match e {
            DependencyValidationError::CircularDependency { cycle } => {
                let name = cycle.first().cloned().unwrap_or_default();
                let dependency = cycle.get(1).cloned().unwrap_or_else(|| name.clone());
                BeanError::CircularDependsOn { name, dependency }
            }
            DependencyValidationError::MissingDependency { bean, missing } => {
                BeanError::MissingDependency {
                    name: bean,
                    dependency: missing,
                }
            }
        })
    }
}

/// BeanFactory 构建器
#[derive(Default)]
pub struct BeanFactoryBuilder {
    config: Option<BeanFactoryConfig>,
    registry: Option<Arc<dyn BeanDefinitionRegistry>>,
    instantiator: Option<Arc<dyn BeanInstantiator>>,
    parent: Option<Arc<dyn ConfigurableBeanFactory>>,
    scopes: Vec<(String, Arc<dyn Scope>)>,
    post_processors: Vec<Arc<dyn BeanPostProcessor>>,
}

impl BeanFactoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: BeanFactoryConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 使用外部的定义注册表
    pub fn registry(mut self, registry: Arc<dyn BeanDefinitionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn instantiator(mut self, instantiator: Arc<dyn BeanInstantiator>) -> Self {
        self.instantiator = Some(instantiator);
        self
    }

    /// 父容器，本地找不到的定义交给它
    pub fn parent(mut self, parent: Arc<dyn ConfigurableBeanFactory>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn scope(mut self, name: impl Into<String>, scope: Arc<dyn Scope>) -> Self {
        self.scopes.push((name.into(), scope));
        self
    }

    pub fn post_processor(mut self, processor: Arc<dyn BeanPostProcessor>) -> Self {
        self.post_processors.push(processor);
        self
    }

    pub fn build(self) -> BeanResult<DefaultBeanFactory> {
        let mut factory = DefaultBeanFactory::with_config(self.config.unwrap_or_default());
        if let Some(registry) = self.registry {
            factory.registry = registry;
        }
        if let Some(instantiator) = self.instantiator {
            factory.instantiator = instantiator;
        }
        factory.parent = self.parent;

        for (name, scope) in self.scopes {
            factory.register_scope(&name, scope)?;
        }
        factory.post_processors.add_all(self.post_processors);

        tracing::debug!("Built {:?}", factory);
        Ok(factory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::FactoryBean;
    use crate::scope::SimpleMapScope;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    struct Repository {
        url: String,
    }

    struct Service {
        repository: Arc<Repository>,
    }

    fn repository_definition(url: &str) -> BeanDefinition {
        let url = url.to_string();
        BeanDefinition::of(move |_| {
            Ok(Repository {
                url: url.clone(),
            })
        })
    }

    #[test]
    fn test_singleton_identity() {
        let factory = DefaultBeanFactory::new();
        factory
            .register_bean_definition("repository", repository_definition("mem://"))
            .unwrap();

        let a = factory.get_bean_typed::<Repository>("repository").unwrap();
        let b = factory.get_bean_typed::<Repository>("repository").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.url, "mem://");
        assert!(factory.has_been_created("repository"));
    }

    #[test]
    fn test_prototype_creates_new_instances() {
        let factory = DefaultBeanFactory::new();
        factory
            .register_bean_definition(
                "repository",
                repository_definition("mem://").with_scope(SCOPE_PROTOTYPE),
            )
            .unwrap();

        let a = factory.get_bean_typed::<Repository>("repository").unwrap();
        let b = factory.get_bean_typed::<Repository>("repository").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(factory.is_prototype("repository").unwrap());
        assert!(!factory.is_singleton("repository").unwrap());
    }

    #[test]
    fn test_dependency_via_creation_context() {
        let factory = DefaultBeanFactory::new();
        factory
            .register_bean_definition("repository", repository_definition("mem://"))
            .unwrap();
        factory
            .register_bean_definition(
                "service",
                BeanDefinition::of(|creation| {
                    Ok(Service {
                        repository: creation.get_bean_typed::<Repository>("repository")?,
                    })
                }),
            )
            .unwrap();

        let service = factory.get_bean_typed::<Service>("service").unwrap();
        let repository = factory.get_bean_typed::<Repository>("repository").unwrap();
        assert!(Arc::ptr_eq(&service.repository, &repository));
        assert_eq!(factory.dependent_beans("repository"), vec!["service"]);
        assert_eq!(factory.dependencies_for_bean("service"), vec!["repository"]);
    }

    #[test]
    fn test_unknown_bean() {
        let factory = DefaultBeanFactory::new();
        let err = factory.get_bean("missing").unwrap_err();
        assert!(err.is_no_such_bean_definition());
        assert!(!factory.contains_bean("missing"));
    }

    #[test]
    fn test_abstract_definition_cannot_be_created() {
        let factory = DefaultBeanFactory::new();
        factory
            .register_bean_definition(
                "template",
                repository_definition("mem://").with_abstract(true),
            )
            .unwrap();
        assert!(matches!(
            factory.get_bean("template"),
            Err(BeanError::BeanIsAbstract(_))
        ));
    }

    #[test]
    fn test_required_type_mismatch() {
        let factory = DefaultBeanFactory::new();
        factory
            .register_bean_definition("repository", repository_definition("mem://"))
            .unwrap();
        let err = factory
            .get_bean_of_type("repository", BeanType::of::<Service>())
            .unwrap_err();
        assert!(matches!(err, BeanError::BeanNotOfRequiredType { .. }));
    }

    #[test]
    fn test_alias_resolves_to_same_singleton() {
        let factory = DefaultBeanFactory::new();
        factory
            .register_bean_definition("repository", repository_definition("mem://"))
            .unwrap();
        factory.register_alias("repository", "repo").unwrap();

        let a = factory.get_bean("repo").unwrap();
        let b = factory.get_bean("repository").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(factory.get_aliases("repository"), vec!["repo"]);
        assert_eq!(factory.get_aliases("repo"), vec!["repository"]);
    }

    #[test]
    fn test_creation_failure_is_cleaned_up() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let factory = DefaultBeanFactory::new();
        factory
            .register_bean_definition(
                "flaky",
                BeanDefinition::of(move |_| {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        anyhow::bail!("connection refused");
                    }
                    Ok(Repository {
                        url: "retry://".to_string(),
                    })
                }),
            )
            .unwrap();

        let err = factory.get_bean("flaky").unwrap_err();
        assert!(matches!(err, BeanError::BeanCreation { .. }));
        assert!(!factory.has_been_created("flaky"));
        assert!(!factory.contains_singleton("flaky"));
        assert!(!factory.is_currently_in_creation("flaky"));

        factory.get_bean("flaky").unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_missing_supplier() {
        let factory = DefaultBeanFactory::new();
        factory
            .register_bean_definition("empty", BeanDefinition::new())
            .unwrap();
        let err = factory.get_bean("empty").unwrap_err();
        assert!(err
            .to_string()
            .contains("No instance supplier or factory method specified"));
    }

    #[test]
    fn test_factory_method_on_factory_bean_instance() {
        struct ConnectionFactory {
            prefix: String,
        }

        let factory = DefaultBeanFactory::new();
        factory
            .register_bean_definition(
                "connectionFactory",
                BeanDefinition::of(|_| {
                    Ok(ConnectionFactory {
                        prefix: "db://".to_string(),
                    })
                }),
            )
            .unwrap();
        factory
            .register_bean_definition(
                "repository",
                BeanDefinition::new().with_factory_method(
                    Some("connectionFactory"),
                    "createRepository",
                    |instance, _| {
                        let connections = instance
                            .and_then(|i| Arc::clone(i).downcast::<ConnectionFactory>().ok())
                            .ok_or_else(|| anyhow::anyhow!("factory instance missing"))?;
                        Ok(BeanHandle::new(Arc::new(Repository {
                            url: format!("{}main", connections.prefix),
                        })))
                    },
                ),
            )
            .unwrap();

        // 工厂方法的返回类型在创建之前无法预测
        assert_eq!(factory.get_type("repository").unwrap(), None);

        let repository = factory.get_bean_typed::<Repository>("repository").unwrap();
        assert_eq!(repository.url, "db://main");
        assert_eq!(
            factory.get_type("repository").unwrap(),
            Some(BeanType::of::<Repository>())
        );
        assert_eq!(
            factory.dependent_beans("connectionFactory"),
            vec!["repository"]
        );
    }

    #[test]
    fn test_factory_method_pointing_to_itself() {
        let factory = DefaultBeanFactory::new();
        factory
            .register_bean_definition(
                "selfish",
                BeanDefinition::new().with_factory_method(Some("selfish"), "create", |_, _| {
                    Ok(BeanHandle::new(Arc::new(1u32)))
                }),
            )
            .unwrap();
        let err = factory.get_bean("selfish").unwrap_err();
        assert!(format!("{:?}", err).contains("factory-bean reference points back"));
    }

    struct CounterFactory {
        produced: AtomicUsize,
    }

    impl FactoryBean for CounterFactory {
        fn get_object(&self) -> anyhow::Result<Option<BeanInstance>> {
            let n = self.produced.fetch_add(1, Ordering::SeqCst);
            Ok(Some(Arc::new(n as u64)))
        }

        fn object_type(&self) -> Option<BeanType> {
            Some(BeanType::of::<u64>())
        }
    }

    #[test]
    fn test_factory_bean_dereference() {
        let factory = DefaultBeanFactory::new();
        factory
            .register_bean_definition(
                "counter",
                BeanDefinition::factory_bean(|_| {
                    Ok(CounterFactory {
                        produced: AtomicUsize::new(0),
                    })
                }),
            )
            .unwrap();

        assert!(factory.is_factory_bean("counter").unwrap());
        assert_eq!(
            factory.get_type("counter").unwrap(),
            Some(BeanType::of::<u64>())
        );
        assert!(factory.is_type_match("counter", BeanType::of::<u64>()).unwrap());
        assert!(factory
            .is_type_match("&counter", BeanType::of::<CounterFactory>())
            .unwrap());

        let a = factory.get_bean_typed::<u64>("counter").unwrap();
        let b = factory.get_bean_typed::<u64>("counter").unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let counter = factory.get_bean_typed::<CounterFactory>("&counter").unwrap();
        assert_eq!(counter.produced.load(Ordering::SeqCst), 1);
        assert!(factory.contains_bean("&counter"));
    }

    #[test]
    fn test_dereference_of_plain_bean_fails() {
        let factory = DefaultBeanFactory::new();
        factory
            .register_bean_definition("repository", repository_definition("mem://"))
            .unwrap();
        let err = factory.get_bean("&repository").unwrap_err();
        assert!(matches!(err, BeanError::BeanIsNotAFactory { .. }));
        assert!(!factory.contains_bean("&repository"));
    }

    #[test]
    fn test_custom_scope() {
        let factory = DefaultBeanFactory::new();
        let scope = Arc::new(SimpleMapScope::new("request"));
        factory.register_scope("request", scope.clone()).unwrap();
        factory
            .register_bean_definition(
                "repository",
                repository_definition("mem://").with_scope("request"),
            )
            .unwrap();

        let a = factory.get_bean("repository").unwrap();
        let b = factory.get_bean("repository").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(scope.len(), 1);

        factory.destroy_scoped_bean("repository").unwrap();
        assert!(scope.is_empty());
        let c = factory.get_bean("repository").unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_unregistered_scope() {
        let factory = DefaultBeanFactory::new();
        factory
            .register_bean_definition(
                "repository",
                repository_definition("mem://").with_scope("session"),
            )
            .unwrap();
        let err = factory.get_bean("repository").unwrap_err();
        assert!(matches!(err, BeanError::ScopeNotActive { ref scope, .. } if scope == "session"));
        assert!(!factory.has_been_created("repository"));
    }

    #[test]
    fn test_builtin_scopes_cannot_be_replaced() {
        let factory = DefaultBeanFactory::new();
        let scope = Arc::new(SimpleMapScope::new("singleton"));
        assert!(matches!(
            factory.register_scope(SCOPE_SINGLETON, scope.clone()),
            Err(BeanError::IllegalArgument(_))
        ));
        assert!(factory.register_scope(SCOPE_PROTOTYPE, scope).is_err());
    }

    #[test]
    fn test_overriding_disabled() {
        let config = BeanFactoryConfig {
            allow_bean_definition_overriding: false,
            ..BeanFactoryConfig::default()
        };
        let factory = DefaultBeanFactory::with_config(config);
        factory
            .register_bean_definition("repository", repository_definition("a://"))
            .unwrap();
        let err = factory
            .register_bean_definition("repository", repository_definition("b://"))
            .unwrap_err();
        assert!(matches!(err, BeanError::BeanDefinitionOverride(_)));
    }

    #[test]
    fn test_overriding_resets_singleton() {
        let factory = DefaultBeanFactory::new();
        factory
            .register_bean_definition("repository", repository_definition("a://"))
            .unwrap();
        let first = factory.get_bean_typed::<Repository>("repository").unwrap();
        assert_eq!(first.url, "a://");

        factory
            .register_bean_definition("repository", repository_definition("b://"))
            .unwrap();
        let second = factory.get_bean_typed::<Repository>("repository").unwrap();
        assert_eq!(second.url, "b://");
    }

    #[test]
    fn test_clear_metadata_cache_keeps_created_beans() {
        let factory = DefaultBeanFactory::new();
        factory
            .register_bean_definition("repository", repository_definition("a://"))
            .unwrap();
        factory
            .register_bean_definition("idle", repository_definition("b://").with_lazy_init(true))
            .unwrap();

        factory.get_bean("repository").unwrap();
        let created = factory.merged_bean_definition("repository").unwrap();
        let idle = factory.merged_bean_definition("idle").unwrap();

        factory.clear_metadata_cache();
        assert!(Arc::ptr_eq(
            &created,
            &factory.merged_bean_definition("repository").unwrap()
        ));
        assert!(!Arc::ptr_eq(&idle, &factory.merged_bean_definition("idle").unwrap()));
    }

    #[test]
    fn test_frozen_configuration_rejects_registration() {
        let factory = DefaultBeanFactory::new();
        factory.freeze_configuration();
        assert!(factory.is_configuration_frozen());
        assert!(matches!(
            factory.register_bean_definition("repository", repository_definition("a://")),
            Err(BeanError::IllegalState(_))
        ));
    }

    #[test]
    fn test_init_and_destroy_methods() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let init_events = events.clone();
        let destroy_events = events.clone();
        let factory = DefaultBeanFactory::new();
        factory
            .register_bean_definition(
                "repository",
                repository_definition("mem://")
                    .with_init_method("open", move |_| {
                        init_events.lock().push("open");
                        Ok(())
                    })
                    .with_destroy_method("close", move |_| {
                        destroy_events.lock().push("close");
                        Ok(())
                    }),
            )
            .unwrap();

        factory.get_bean("repository").unwrap();
        assert_eq!(*events.lock(), vec!["open"]);

        factory.destroy_singletons();
        assert_eq!(*events.lock(), vec!["open", "close"]);
        assert!(!factory.contains_singleton("repository"));
    }

    #[test]
    fn test_parent_factory_delegation() {
        let parent = Arc::new(DefaultBeanFactory::new());
        parent
            .register_bean_definition("repository", repository_definition("parent://"))
            .unwrap();

        let child = DefaultBeanFactory::builder()
            .parent(parent.clone())
            .build()
            .unwrap();
        let repository = child.get_bean_typed::<Repository>("repository").unwrap();
        assert_eq!(repository.url, "parent://");
        assert!(child.contains_bean("repository"));
        assert!(!child.contains_local_bean("repository"));
        assert!(parent.contains_singleton("repository"));
    }

    #[test]
    fn test_get_bean_by_type() {
        let factory = DefaultBeanFactory::new();
        factory
            .register_bean_definition("repository", repository_definition("mem://"))
            .unwrap();
        factory
            .register_bean_definition(
                "count",
                BeanDefinition::of(|_| Ok(42u32)),
            )
            .unwrap();

        let repository = factory.get_bean_by_type::<Repository>().unwrap();
        assert_eq!(repository.url, "mem://");
        assert!(factory.get_bean_by_type::<Service>().is_err());
        assert_eq!(
            factory
                .bean_names_for_type(BeanType::of::<u32>(), true, true)
                .unwrap(),
            vec!["count"]
        );
    }
}
