//! 类型查询
//!
//! 在不创建 Bean 的前提下尽量回答类型问题：优先使用已创建的单例，
//! 其次使用定义中声明的类型（可被 SmartInstantiationAwareBeanPostProcessor 改写），
//! 只有允许时才为了确定 FactoryBean 的产品类型而创建工厂本身。

use crate::bean::BeanType;
use crate::bean_factory::{ConfigurableBeanFactory, DefaultBeanFactory, ListableBeanFactory};
use crate::creation::CreationContext;
use crate::definition::MergedBeanDefinition;
use crate::error::BeanResult;
use crate::utils::naming;

impl DefaultBeanFactory {
    /// 预测定义最终暴露的类型
    ///
    /// 工厂方法创建的 Bean 在第一次创建之前无法预测，返回 None。
    pub(crate) fn predict_bean_type(
        &self,
        bean_name: &str,
        mbd: &MergedBeanDefinition,
    ) -> Option<BeanType> {
        let target = determine_target_type(mbd);
        if target.is_some() && !mbd.is_synthetic() && self.post_processors.has_instantiation_aware()
        {
            let cache = self.post_processors.cache();
            for processor in &cache.smart_instantiation_aware {
                if let Some(predicted) = processor.predict_bean_type(target, bean_name) {
                    return Some(predicted);
                }
            }
        }
        target
    }

    /// 定义是否描述一个 FactoryBean，结果缓存在合并定义上
    pub(crate) fn is_factory_bean_definition(
        &self,
        bean_name: &str,
        mbd: &MergedBeanDefinition,
    ) -> bool {
        if let Some(is_factory) = mbd.is_factory_bean() {
            return is_factory;
        }
        let is_factory = self
            .predict_bean_type(bean_name, mbd)
            .map(|bean_type| bean_type.is_factory_bean())
            .unwrap_or(false);
        mbd.set_factory_bean(is_factory);
        is_factory
    }

    /// FactoryBean 生产的对象类型
    ///
    /// 定义上声明的产品类型优先；否则在允许时创建工厂本身再询问它。
    /// 工厂正在创建中或者是懒加载时，创建失败视为类型未知。
    fn type_for_factory_bean(
        &self,
        bean_name: &str,
        mbd: &MergedBeanDefinition,
        allow_init: bool,
    ) -> BeanResult<Option<BeanType>> {
        if let Some(object_type) = mbd.definition().factory_bean_object_type {
            return Ok(Some(object_type));
        }
        if !allow_init || !mbd.is_singleton() {
            return Ok(None);
        }

        let ctx = CreationContext::new();
        match self.resolve_bean(&naming::factory_dereference(bean_name), None, None, true, &ctx) {
            Ok(factory) => Ok(factory.as_factory().and_then(|f| f.object_type())),
            Err(e) if e.contains_currently_in_creation() => {
                tracing::trace!(
                    "Bean currently in creation on FactoryBean type check: {}",
                    e
                );
                Ok(None)
            }
            Err(e) if mbd.is_lazy_init() => {
                tracing::trace!("Bean creation exception on lazy FactoryBean type check: {}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub(crate) fn resolve_type(
        &self,
        name: &str,
        allow_factory_bean_init: bool,
    ) -> BeanResult<Option<BeanType>> {
        let bean_name = self.transformed_bean_name(name);
        let is_dereference = naming::is_factory_dereference(name);

        if let Some(instance) = self.singletons.get_singleton(&bean_name, None)? {
            if instance.is_null() {
                return Ok(None);
            }
            return Ok(match instance.as_factory() {
                Some(factory) if !is_dereference => factory.object_type(),
                _ => instance.bean_type(),
            });
        }

        if !self.contains_bean_definition(&bean_name) {
            if let Some(parent) = self.parent_bean_factory() {
                return parent.get_type_with_init(
                    &naming::original_bean_name(name, &bean_name),
                    allow_factory_bean_init,
                );
            }
        }

        let mbd = self.merged_local_bean_definition(&bean_name)?;
        match self.predict_bean_type(&bean_name, &mbd) {
            Some(bean_type) if bean_type.is_factory_bean() => {
                if is_dereference {
                    Ok(Some(bean_type))
                } else {
                    self.type_for_factory_bean(&bean_name, &mbd, allow_factory_bean_init)
                }
            }
            // `&name` 指向的不是 FactoryBean
            _ if is_dereference => Ok(None),
            predicted => Ok(predicted),
        }
    }

    pub(crate) fn resolve_type_match(
        &self,
        name: &str,
        type_to_match: BeanType,
        allow_factory_bean_init: bool,
    ) -> BeanResult<bool> {
        let bean_name = self.transformed_bean_name(name);
        let is_dereference = naming::is_factory_dereference(name);

        if let Some(instance) = self.singletons.get_singleton(&bean_name, None)? {
            if instance.is_null() {
                return Ok(false);
            }
            return Ok(match instance.as_factory() {
                Some(factory) if !is_dereference => factory
                    .object_type()
                    .map_or(false, |object_type| object_type.matches(&type_to_match)),
                Some(_) => type_to_match.is_instance(instance.instance()),
                None => !is_dereference && type_to_match.is_instance(instance.instance()),
            });
        }

        if !self.contains_bean_definition(&bean_name) {
            if let Some(parent) = self.parent_bean_factory() {
                return parent.is_type_match_with_init(
                    &naming::original_bean_name(name, &bean_name),
                    type_to_match,
                    allow_factory_bean_init,
                );
            }
        }

        let mbd = self.merged_local_bean_definition(&bean_name)?;
        let predicted = match self.predict_bean_type(&bean_name, &mbd) {
            Some(predicted) => predicted,
            None => return Ok(false),
        };

        let bean_type = if predicted.is_factory_bean() {
            if is_dereference {
                Some(predicted)
            } else {
                self.type_for_factory_bean(&bean_name, &mbd, allow_factory_bean_init)?
            }
        } else if is_dereference {
            None
        } else {
            Some(predicted)
        };

        Ok(bean_type.map_or(false, |bean_type| bean_type.matches(&type_to_match)))
    }

    pub(crate) fn resolve_is_singleton(&self, name: &str) -> BeanResult<bool> {
        let bean_name = self.transformed_bean_name(name);
        let is_dereference = naming::is_factory_dereference(name);

        if let Some(instance) = self.singletons.get_singleton(&bean_name, None)? {
            return Ok(match instance.as_factory() {
                Some(factory) => is_dereference || factory.is_singleton(),
                None => !is_dereference,
            });
        }

        if !self.contains_bean_definition(&bean_name) {
            if let Some(parent) = self.parent_bean_factory() {
                return parent.is_singleton(&naming::original_bean_name(name, &bean_name));
            }
        }

        let mbd = self.merged_local_bean_definition(&bean_name)?;
        if !mbd.is_singleton() {
            return Ok(false);
        }
        if !self.is_factory_bean_definition(&bean_name, &mbd) {
            return Ok(!is_dereference);
        }
        if is_dereference {
            return Ok(true);
        }
        let factory = self.resolve_bean_handle(&naming::factory_dereference(&bean_name), None, None)?;
        Ok(factory.as_factory().map_or(false, |f| f.is_singleton()))
    }

    pub(crate) fn resolve_is_prototype(&self, name: &str) -> BeanResult<bool> {
        let bean_name = self.transformed_bean_name(name);
        let is_dereference = naming::is_factory_dereference(name);

        if !self.contains_bean_definition(&bean_name) {
            if let Some(parent) = self.parent_bean_factory() {
                return parent.is_prototype(&naming::original_bean_name(name, &bean_name));
            }
        }

        let mbd = self.merged_local_bean_definition(&bean_name)?;
        if mbd.is_prototype() {
            return Ok(!is_dereference || self.is_factory_bean_definition(&bean_name, &mbd));
        }
        if is_dereference || !self.is_factory_bean_definition(&bean_name, &mbd) {
            return Ok(false);
        }
        // 单例 FactoryBean 生产的对象可能不是单例
        let factory = self.resolve_bean_handle(&naming::factory_dereference(&bean_name), None, None)?;
        Ok(factory.as_factory().map_or(false, |f| !f.is_singleton()))
    }

    pub(crate) fn resolve_bean_names_for_type(
        &self,
        bean_type: BeanType,
        include_non_singletons: bool,
        allow_eager_init: bool,
    ) -> BeanResult<Vec<String>> {
        let mut result = Vec::new();

        for name in self.bean_definition_names() {
            let mbd = self.merged_local_bean_definition(&name)?;
            if mbd.is_abstract() {
                continue;
            }
            let allow_factory_bean_init = allow_eager_init && !mbd.is_lazy_init();
            let is_factory = self.is_factory_bean_definition(&name, &mbd);

            let matched = (include_non_singletons || mbd.is_singleton())
                && self.resolve_type_match(&name, bean_type, allow_factory_bean_init)?;
            if matched {
                result.push(name);
                continue;
            }
            if is_factory {
                let factory_name = naming::factory_dereference(&name);
                if (include_non_singletons || mbd.is_singleton())
                    && self.resolve_type_match(&factory_name, bean_type, allow_factory_bean_init)?
                {
                    result.push(factory_name);
                }
            }
        }

        // 手动注册且没有定义的单例
        for name in self.singleton_names() {
            if self.contains_bean_definition(&name) || result.contains(&name) {
                continue;
            }
            if self.resolve_type_match(&name, bean_type, allow_eager_init)? {
                result.push(name);
            } else if self.resolve_type_match(
                &naming::factory_dereference(&name),
                bean_type,
                allow_eager_init,
            )? {
                result.push(naming::factory_dereference(&name));
            }
        }

        Ok(result)
    }
}

/// 定义声明的目标类型
fn determine_target_type(mbd: &MergedBeanDefinition) -> Option<BeanType> {
    if let Some(target) = mbd.target_type() {
        return Some(target);
    }
    if mbd.factory_method_name().is_some() {
        return None;
    }
    let target = mbd.bean_type()?;
    mbd.set_target_type(target);
    Some(target)
}
