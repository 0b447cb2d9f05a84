// chimera-beans: Bean 解析与生命周期引擎
//
// 负责把注册的 Bean 定义变成实例：
// - 父子定义合并与缓存
// - 单例创建协调（多线程下最多创建一次，支持循环引用的早期引用）
// - 单例、原型和自定义作用域
// - FactoryBean 解引用与产品缓存
// - BeanPostProcessor 扩展点与销毁回调

pub mod bean;
pub mod bean_factory;
pub mod config;
pub mod creation;
pub mod definition;
mod disposable;
pub mod error;
mod factory_bean;
pub mod instantiator;
pub mod logging;
mod merged;
pub mod post_processor;
pub mod registry;
pub mod scope;
pub mod singleton;
mod type_resolution;
pub mod utils;

// 重新导出常用类型
pub use bean::{
    is_null_bean, BeanArgs, BeanHandle, BeanInstance, BeanType, DisposableBean, FactoryBean,
    NullBean,
};
pub use bean_factory::{
    BeanFactory, BeanFactoryBuilder, BeanFactoryExt, ConfigurableBeanFactory,
    ConfigurableListableBeanFactory, DefaultBeanFactory, ListableBeanFactory,
    ListableBeanFactoryExt,
};
pub use config::BeanFactoryConfig;
pub use creation::{BeanCreation, CreationContext};
pub use definition::{BeanDefinition, LifecycleMethod, MergedBeanDefinition};
pub use error::{BeanError, BeanResult};
pub use instantiator::{BeanInstantiator, SupplierInstantiator};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use post_processor::{
    BeanPostProcessor, DestructionAwareBeanPostProcessor, InstantiationAwareBeanPostProcessor,
    MergedBeanDefinitionPostProcessor, SmartInstantiationAwareBeanPostProcessor,
};
pub use registry::{BeanDefinitionRegistry, SimpleBeanDefinitionRegistry};
pub use scope::{BeanScope, Scope, ScopeError, SimpleMapScope, SCOPE_PROTOTYPE, SCOPE_SINGLETON};

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::bean::{BeanArgs, BeanHandle, BeanInstance, BeanType, DisposableBean, FactoryBean};
    pub use crate::bean_factory::{
        BeanFactory, BeanFactoryExt, ConfigurableBeanFactory, ConfigurableListableBeanFactory,
        DefaultBeanFactory, ListableBeanFactory, ListableBeanFactoryExt,
    };
    pub use crate::config::BeanFactoryConfig;
    pub use crate::creation::BeanCreation;
    pub use crate::definition::{BeanDefinition, MergedBeanDefinition};
    pub use crate::error::{BeanError, BeanResult};
    pub use crate::logging::{LogFormat, LogLevel, LoggingConfig};
    pub use crate::post_processor::{
        BeanPostProcessor, DestructionAwareBeanPostProcessor, InstantiationAwareBeanPostProcessor,
        MergedBeanDefinitionPostProcessor, SmartInstantiationAwareBeanPostProcessor,
    };
    pub use crate::registry::BeanDefinitionRegistry;
    pub use crate::scope::{Scope, ScopeError, SimpleMapScope, SCOPE_PROTOTYPE, SCOPE_SINGLETON};
    pub use crate::utils;
    // Re-export anyhow for convenience
    pub use anyhow::{anyhow, Context};
}
