use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bean::{BeanHandle, BeanInstance, BeanType, FactoryBean};
use crate::creation::BeanCreation;
use crate::scope::{SCOPE_PROTOTYPE, SCOPE_SINGLETON};

/// 实例 supplier - 直接构造原始实例
pub type InstanceSupplier =
    Arc<dyn Fn(&BeanCreation<'_>) -> anyhow::Result<BeanHandle> + Send + Sync>;

/// 工厂方法 - 第一个参数是工厂 Bean 实例（静态工厂方法为 None）
pub type FactoryMethod = Arc<
    dyn Fn(Option<&BeanInstance>, &BeanCreation<'_>) -> anyhow::Result<BeanHandle> + Send + Sync,
>;

/// init / destroy 方法
pub type LifecycleCallback = Arc<dyn Fn(&BeanHandle) -> anyhow::Result<()> + Send + Sync>;

/// 带名称的生命周期方法
#[derive(Clone)]
pub struct LifecycleMethod {
    pub name: String,
    pub callback: LifecycleCallback,
}

impl LifecycleMethod {
    pub fn new<F>(name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&BeanHandle) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            callback: Arc::new(callback),
        }
    }

    pub fn invoke(&self, bean: &BeanHandle) -> anyhow::Result<()> {
        (self.callback)(bean)
    }
}

impl fmt::Debug for LifecycleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Bean 定义 - 描述如何创建和管理 Bean
///
/// 原始定义由注册表持有，按约定不可变；合并时通过 `override_from`
/// 把子定义显式设置的字段覆盖到父定义的副本上。
#[derive(Clone, Default)]
pub struct BeanDefinition {
    /// 父定义名称
    pub parent_name: Option<String>,

    /// 目标类型
    pub bean_type: Option<BeanType>,

    /// 实例 supplier
    pub instance_supplier: Option<InstanceSupplier>,

    /// 工厂 Bean 名称（实例工厂方法）
    pub factory_bean_name: Option<String>,

    /// 工厂方法名称
    pub factory_method_name: Option<String>,

    pub factory_method: Option<FactoryMethod>,

    /// 作用域名称，未设置时合并为 singleton
    pub scope: Option<String>,

    /// 抽象定义只作为父模板
    pub is_abstract: bool,

    /// 是否延迟初始化（仅对单例有效）
    pub lazy_init: Option<bool>,

    /// 显式声明的依赖
    pub depends_on: Vec<String>,

    pub init_method: Option<LifecycleMethod>,

    pub destroy_method: Option<LifecycleMethod>,

    /// 由框架内部生成的定义，不应用后处理器
    pub synthetic: bool,

    /// FactoryBean 生产对象类型的声明（避免为判断类型而实例化工厂）
    pub factory_bean_object_type: Option<BeanType>,

    pub description: Option<String>,
}

impl BeanDefinition {
    /// 空定义，通常配合 `with_parent` 作为子定义使用
    pub fn new() -> Self {
        Self::default()
    }

    /// 子定义
    pub fn child(parent_name: impl Into<String>) -> Self {
        Self::default().with_parent(parent_name)
    }

    /// 由返回值构造的定义
    pub fn of<T, F>(supplier: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&BeanCreation<'_>) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self {
            bean_type: Some(BeanType::of::<T>()),
            instance_supplier: Some(Arc::new(move |ctx| {
                supplier(ctx).map(|value| BeanHandle::new(Arc::new(value)))
            })),
            ..Self::default()
        }
    }

    /// 由 `Arc` 构造的定义，supplier 可以在填充字段之前暴露早期引用
    pub fn shared<T, F>(supplier: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&BeanCreation<'_>) -> anyhow::Result<Arc<T>> + Send + Sync + 'static,
    {
        Self {
            bean_type: Some(BeanType::of::<T>()),
            instance_supplier: Some(Arc::new(move |ctx| supplier(ctx).map(BeanHandle::new))),
            ..Self::default()
        }
    }

    /// FactoryBean 定义
    pub fn factory_bean<F, S>(supplier: S) -> Self
    where
        F: FactoryBean + Any,
        S: Fn(&BeanCreation<'_>) -> anyhow::Result<F> + Send + Sync + 'static,
    {
        Self {
            bean_type: Some(BeanType::factory::<F>()),
            instance_supplier: Some(Arc::new(move |ctx| {
                supplier(ctx).map(|factory| BeanHandle::factory(Arc::new(factory)))
            })),
            ..Self::default()
        }
    }

    /// 直接返回 [`BeanHandle`] 的定义，用于需要声明额外能力的实例
    pub fn from_supplier<F>(bean_type: Option<BeanType>, supplier: F) -> Self
    where
        F: Fn(&BeanCreation<'_>) -> anyhow::Result<BeanHandle> + Send + Sync + 'static,
    {
        Self {
            bean_type,
            instance_supplier: Some(Arc::new(supplier)),
            ..Self::default()
        }
    }

    pub fn with_parent(mut self, parent_name: impl Into<String>) -> Self {
        self.parent_name = Some(parent_name.into());
        self
    }

    pub fn with_bean_type(mut self, bean_type: BeanType) -> Self {
        self.bean_type = Some(bean_type);
        self
    }

    pub fn with_supplier<F>(mut self, supplier: F) -> Self
    where
        F: Fn(&BeanCreation<'_>) -> anyhow::Result<BeanHandle> + Send + Sync + 'static,
    {
        self.instance_supplier = Some(Arc::new(supplier));
        self
    }

    /// 设置工厂方法
    ///
    /// `factory_bean_name` 为 None 时是静态工厂方法，否则方法在该工厂 Bean 上调用。
    pub fn with_factory_method<F>(
        mut self,
        factory_bean_name: Option<&str>,
        method_name: impl Into<String>,
        method: F,
    ) -> Self
    where
        F: Fn(Option<&BeanInstance>, &BeanCreation<'_>) -> anyhow::Result<BeanHandle>
            + Send
            + Sync
            + 'static,
    {
        self.factory_bean_name = factory_bean_name.map(str::to_string);
        self.factory_method_name = Some(method_name.into());
        self.factory_method = Some(Arc::new(method));
        self
    }

    /// 设置作用域
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_abstract(mut self, is_abstract: bool) -> Self {
        self.is_abstract = is_abstract;
        self
    }

    /// 设置延迟初始化
    pub fn with_lazy_init(mut self, lazy: bool) -> Self {
        self.lazy_init = Some(lazy);
        self
    }

    /// 设置依赖列表
    pub fn with_depends_on<I, S>(mut self, depends_on: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = depends_on.into_iter().map(Into::into).collect();
        self
    }

    /// 设置初始化方法
    pub fn with_init_method<F>(mut self, name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&BeanHandle) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.init_method = Some(LifecycleMethod::new(name, callback));
        self
    }

    /// 设置销毁方法
    pub fn with_destroy_method<F>(mut self, name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&BeanHandle) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.destroy_method = Some(LifecycleMethod::new(name, callback));
        self
    }

    pub fn with_synthetic(mut self, synthetic: bool) -> Self {
        self.synthetic = synthetic;
        self
    }

    pub fn with_factory_bean_object_type(mut self, object_type: BeanType) -> Self {
        self.factory_bean_object_type = Some(object_type);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_singleton(&self) -> bool {
        matches!(self.scope.as_deref(), None | Some("") | Some(SCOPE_SINGLETON))
    }

    pub fn is_prototype(&self) -> bool {
        self.scope.as_deref() == Some(SCOPE_PROTOTYPE)
    }

    pub fn is_lazy_init(&self) -> bool {
        self.lazy_init.unwrap_or(false)
    }

    /// 把 `other` 显式设置的字段覆盖到当前定义上
    ///
    /// abstract、depends-on 和 synthetic 总是取自 `other`，其余字段仅在
    /// `other` 设置了值时覆盖。父名称不参与覆盖。
    pub fn override_from(&mut self, other: &BeanDefinition) {
        if other.bean_type.is_some() {
            self.bean_type = other.bean_type;
        }
        if other.instance_supplier.is_some() {
            self.instance_supplier = other.instance_supplier.clone();
        }
        if other.factory_bean_name.is_some() {
            self.factory_bean_name = other.factory_bean_name.clone();
        }
        if other.factory_method_name.is_some() {
            self.factory_method_name = other.factory_method_name.clone();
            self.factory_method = other.factory_method.clone();
        }
        if other.scope.as_deref().is_some_and(|s| !s.is_empty()) {
            self.scope = other.scope.clone();
        }
        self.is_abstract = other.is_abstract;
        if other.lazy_init.is_some() {
            self.lazy_init = other.lazy_init;
        }
        self.depends_on = other.depends_on.clone();
        if other.init_method.is_some() {
            self.init_method = other.init_method.clone();
        }
        if other.destroy_method.is_some() {
            self.destroy_method = other.destroy_method.clone();
        }
        self.synthetic = other.synthetic;
        if other.factory_bean_object_type.is_some() {
            self.factory_bean_object_type = other.factory_bean_object_type;
        }
        if other.description.is_some() {
            self.description = other.description.clone();
        }
    }
}

impl fmt::Debug for BeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanDefinition")
            .field("parent_name", &self.parent_name)
            .field("bean_type", &self.bean_type)
            .field("scope", &self.scope)
            .field("abstract", &self.is_abstract)
            .field("lazy_init", &self.lazy_init)
            .field("depends_on", &self.depends_on)
            .field("factory_bean_name", &self.factory_bean_name)
            .field("factory_method_name", &self.factory_method_name)
            .field("init_method", &self.init_method)
            .field("destroy_method", &self.destroy_method)
            .finish()
    }
}

/// 合并后的 Bean 定义
///
/// 父链已经展开，作用域已经解析。类型信息等派生字段延迟计算并缓存在这里，
/// `stale` 标记表示原始定义已变化、下次访问时需要重新合并。
pub struct MergedBeanDefinition {
    name: String,
    definition: BeanDefinition,
    scope: String,
    stale: AtomicBool,
    target_type: Mutex<Option<BeanType>>,
    is_factory_bean: Mutex<Option<bool>>,
    before_instantiation_resolved: Mutex<Option<bool>>,
    post_processed: Mutex<bool>,
}

impl MergedBeanDefinition {
    pub(crate) fn new(name: impl Into<String>, mut definition: BeanDefinition, scope: String) -> Self {
        definition.scope = Some(scope.clone());
        Self {
            name: name.into(),
            definition,
            scope,
            stale: AtomicBool::new(false),
            target_type: Mutex::new(None),
            is_factory_bean: Mutex::new(None),
            before_instantiation_resolved: Mutex::new(None),
            post_processed: Mutex::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 展开后的定义
    pub fn definition(&self) -> &BeanDefinition {
        &self.definition
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn is_singleton(&self) -> bool {
        self.scope == SCOPE_SINGLETON
    }

    pub fn is_prototype(&self) -> bool {
        self.scope == SCOPE_PROTOTYPE
    }

    pub fn is_abstract(&self) -> bool {
        self.definition.is_abstract
    }

    pub fn is_lazy_init(&self) -> bool {
        self.definition.is_lazy_init()
    }

    pub fn is_synthetic(&self) -> bool {
        self.definition.synthetic
    }

    pub fn depends_on(&self) -> &[String] {
        &self.definition.depends_on
    }

    pub fn bean_type(&self) -> Option<BeanType> {
        self.definition.bean_type
    }

    pub fn factory_bean_name(&self) -> Option<&str> {
        self.definition.factory_bean_name.as_deref()
    }

    pub fn factory_method_name(&self) -> Option<&str> {
        self.definition.factory_method_name.as_deref()
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    pub(crate) fn mark_stale(&self) {
        self.stale.store(true, Ordering::Release);
    }

    /// 已解析的目标类型
    pub fn target_type(&self) -> Option<BeanType> {
        *self.target_type.lock()
    }

    pub(crate) fn set_target_type(&self, bean_type: BeanType) {
        *self.target_type.lock() = Some(bean_type);
    }

    /// FactoryBean 标记：None 表示尚未确定
    pub fn is_factory_bean(&self) -> Option<bool> {
        *self.is_factory_bean.lock()
    }

    pub(crate) fn set_factory_bean(&self, is_factory: bool) {
        *self.is_factory_bean.lock() = Some(is_factory);
    }

    pub(crate) fn before_instantiation_resolved(&self) -> Option<bool> {
        *self.before_instantiation_resolved.lock()
    }

    pub(crate) fn set_before_instantiation_resolved(&self, resolved: bool) {
        *self.before_instantiation_resolved.lock() = Some(resolved);
    }

    /// 仅执行一次合并定义后处理
    ///
    /// 处理期间持有锁，同一定义的并发创建会等待处理完成。
    pub(crate) fn post_process_once<F>(&self, apply: F) -> anyhow::Result<()>
    where
        F: FnOnce(&MergedBeanDefinition) -> anyhow::Result<()>,
    {
        let mut processed = self.post_processed.lock();
        if *processed {
            return Ok(());
        }
        apply(self)?;
        *processed = true;
        Ok(())
    }

    /// 构造签名（类型、工厂 Bean、工厂方法）是否一致
    pub(crate) fn has_same_signature(&self, other: &MergedBeanDefinition) -> bool {
        self.definition.bean_type == other.definition.bean_type
            && self.definition.factory_bean_name == other.definition.factory_bean_name
            && self.definition.factory_method_name == other.definition.factory_method_name
    }

    /// 从过期的前一个版本复制可安全复用的缓存字段
    pub(crate) fn copy_memos_from(&self, previous: &MergedBeanDefinition) {
        if !self.has_same_signature(previous) {
            return;
        }
        if let Some(target) = previous.target_type() {
            self.set_target_type(target);
        }
        if let Some(is_factory) = previous.is_factory_bean() {
            self.set_factory_bean(is_factory);
        }
    }
}

impl fmt::Debug for MergedBeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergedBeanDefinition")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("stale", &self.is_stale())
            .field("target_type", &self.target_type())
            .field("is_factory_bean", &self.is_factory_bean())
            .field("definition", &self.definition)
            .finish()
    }
}
