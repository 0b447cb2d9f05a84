use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// 容器中 Bean 实例的统一表示
pub type BeanInstance = Arc<dyn Any + Send + Sync>;

/// `get_bean_with_args` 的显式参数
pub type BeanArgs = Vec<BeanInstance>;

/// Bean 的类型描述
///
/// Rust 没有运行时反射，类型在注册时通过泛型捕获。`factory` 标记该类型
/// 本身具备 [`FactoryBean`] 能力，用于在不实例化的情况下判断工厂 Bean。
#[derive(Clone, Copy)]
pub struct BeanType {
    id: TypeId,
    name: &'static str,
    factory: bool,
}

impl BeanType {
    /// 普通类型
    pub fn of<T: ?Sized + Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            factory: false,
        }
    }

    /// 实现了 [`FactoryBean`] 的类型
    pub fn factory<F: FactoryBean + Any>() -> Self {
        Self {
            id: TypeId::of::<F>(),
            name: std::any::type_name::<F>(),
            factory: true,
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_factory_bean(&self) -> bool {
        self.factory
    }

    /// 类型是否一致（Rust 中没有子类型，按 TypeId 比较）
    pub fn matches(&self, other: &BeanType) -> bool {
        self.id == other.id
    }

    /// 实例是否是此类型
    pub fn is_instance(&self, instance: &BeanInstance) -> bool {
        (**instance).type_id() == self.id
    }
}

impl PartialEq for BeanType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for BeanType {}

impl Hash for BeanType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for BeanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.factory {
            write!(f, "BeanType({}, factory)", self.name)
        } else {
            write!(f, "BeanType({})", self.name)
        }
    }
}

impl fmt::Display for BeanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// FactoryBean 合法返回"无对象"时缓存的占位符
///
/// 缓存中存放同一个 `NullBean` 实例，因此重复获取得到的是同一个对象。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NullBean;

/// 实例是否是 [`NullBean`] 占位符
pub fn is_null_bean(instance: &BeanInstance) -> bool {
    instance.as_ref().is::<NullBean>()
}

/// 类型擦除后的实例描述，用于错误信息
///
/// 擦除后的实例拿不到类型名，有 [`BeanHandle`] 时应使用 [`BeanHandle::type_name`]。
pub fn describe_instance(instance: &BeanInstance) -> String {
    if is_null_bean(instance) {
        "null".to_string()
    } else {
        "unknown".to_string()
    }
}

/// FactoryBean - 由容器保存的实例本身是工厂，对外暴露的是它生产的对象
///
/// 通过 `&name` 可以获取工厂本身。
pub trait FactoryBean: Send + Sync {
    /// 生产对象，`Ok(None)` 表示合法的空结果
    fn get_object(&self) -> anyhow::Result<Option<BeanInstance>>;

    /// 生产对象的类型（未知时返回 None）
    fn object_type(&self) -> Option<BeanType>;

    /// 生产的对象是否是单例
    fn is_singleton(&self) -> bool {
        true
    }
}

/// 销毁回调能力，类似 Spring 的 DisposableBean
pub trait DisposableBean: Send + Sync {
    fn destroy(&self) -> anyhow::Result<()>;
}

/// 原始 Bean 实例及其能力视图
///
/// 能力（是否是工厂、是否需要销毁）在构造时确定一次，之后不再做运行时类型检查。
#[derive(Clone)]
pub struct BeanHandle {
    instance: BeanInstance,
    bean_type: Option<BeanType>,
    factory: Option<Arc<dyn FactoryBean>>,
    disposable: Option<Arc<dyn DisposableBean>>,
}

impl BeanHandle {
    /// 普通对象
    pub fn new<T: Any + Send + Sync>(instance: Arc<T>) -> Self {
        Self {
            instance,
            bean_type: Some(BeanType::of::<T>()),
            factory: None,
            disposable: None,
        }
    }

    /// 类型未知或已被擦除的对象
    pub fn from_instance(instance: BeanInstance, bean_type: Option<BeanType>) -> Self {
        Self {
            instance,
            bean_type,
            factory: None,
            disposable: None,
        }
    }

    /// 具备 FactoryBean 能力的对象
    pub fn factory<F: FactoryBean + Any>(factory: Arc<F>) -> Self {
        Self {
            instance: factory.clone(),
            bean_type: Some(BeanType::factory::<F>()),
            factory: Some(factory),
            disposable: None,
        }
    }

    /// 具备销毁回调能力的对象
    pub fn disposable<T: DisposableBean + Any>(instance: Arc<T>) -> Self {
        Self {
            instance: instance.clone(),
            bean_type: Some(BeanType::of::<T>()),
            factory: None,
            disposable: Some(instance),
        }
    }

    /// 追加销毁能力（例如工厂本身也需要销毁）
    pub fn with_disposable(mut self, disposable: Arc<dyn DisposableBean>) -> Self {
        self.disposable = Some(disposable);
        self
    }

    /// 空对象占位符
    pub fn null() -> Self {
        Self::new(Arc::new(NullBean))
    }

    pub fn instance(&self) -> &BeanInstance {
        &self.instance
    }

    pub fn into_instance(self) -> BeanInstance {
        self.instance
    }

    pub fn bean_type(&self) -> Option<BeanType> {
        self.bean_type
    }

    pub fn type_name(&self) -> &'static str {
        if self.is_null() {
            return "null";
        }
        self.bean_type.map(|t| t.name()).unwrap_or("unknown")
    }

    pub fn as_factory(&self) -> Option<&Arc<dyn FactoryBean>> {
        self.factory.as_ref()
    }

    pub fn is_factory_bean(&self) -> bool {
        self.factory.is_some()
    }

    pub fn as_disposable(&self) -> Option<&Arc<dyn DisposableBean>> {
        self.disposable.as_ref()
    }

    pub fn is_null(&self) -> bool {
        is_null_bean(&self.instance)
    }

    /// 转换为具体类型
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.instance).downcast::<T>().ok()
    }

    /// 是否指向同一个对象
    pub fn ptr_eq(&self, other: &BeanHandle) -> bool {
        Arc::ptr_eq(&self.instance, &other.instance)
    }
}

impl fmt::Debug for BeanHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanHandle")
            .field("type_name", &self.type_name())
            .field("factory", &self.factory.is_some())
            .field("disposable", &self.disposable.is_some())
            .finish()
    }
}
