use crate::bean::BeanHandle;
use crate::creation::BeanCreation;
use crate::error::BeanError;

/// 实例化策略 - 负责构造原始实例
///
/// 构造过程中可以通过 [`BeanCreation`] 回调容器获取依赖。
pub trait BeanInstantiator: Send + Sync {
    fn construct(&self, creation: &BeanCreation<'_>) -> anyhow::Result<BeanHandle>;
}

/// 默认实例化策略：优先调用工厂方法，否则调用实例 supplier
#[derive(Debug, Default, Clone, Copy)]
pub struct SupplierInstantiator;

impl BeanInstantiator for SupplierInstantiator {
    fn construct(&self, creation: &BeanCreation<'_>) -> anyhow::Result<BeanHandle> {
        let name = creation.bean_name();
        let definition = creation.merged_definition().definition();

        if let Some(method_name) = definition.factory_method_name.as_deref() {
            let method = definition.factory_method.as_ref().ok_or_else(|| {
                BeanError::creation_message(
                    name,
                    format!("No implementation bound for factory method '{}'", method_name),
                )
            })?;

            let factory_instance = match definition.factory_bean_name.as_deref() {
                Some(factory_bean) if factory_bean == name => {
                    return Err(BeanError::BeanDefinitionStore {
                        name: name.to_string(),
                        message: "factory-bean reference points back to the same bean definition"
                            .to_string(),
                    }
                    .into());
                }
                Some(factory_bean) => Some(creation.get_bean(factory_bean)?),
                None => None,
            };

            tracing::trace!(
                "Instantiating bean '{}' via factory method '{}'",
                name,
                method_name
            );
            return method(factory_instance.as_ref(), creation);
        }

        if let Some(supplier) = &definition.instance_supplier {
            return supplier(creation);
        }

        Err(BeanError::creation_message(
            name,
            "No instance supplier or factory method specified",
        )
        .into())
    }
}
