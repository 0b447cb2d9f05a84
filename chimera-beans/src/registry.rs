//! Bean 定义注册表
//!
//! 保存原始定义和别名。注册表本身不做合并，也不持有实例。

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::definition::BeanDefinition;
use crate::error::{BeanError, BeanResult};
use crate::utils::naming;

/// Bean 定义注册表
pub trait BeanDefinitionRegistry: Send + Sync {
    /// 注册定义，已存在时替换并返回旧定义
    fn register_bean_definition(
        &self,
        name: &str,
        definition: BeanDefinition,
    ) -> BeanResult<Option<BeanDefinition>>;

    fn remove_bean_definition(&self, name: &str) -> BeanResult<BeanDefinition>;

    /// 原始定义（按规范名称查找）
    fn bean_definition(&self, name: &str) -> Option<BeanDefinition>;

    fn contains_bean_definition(&self, name: &str) -> bool;

    /// 按注册顺序返回的定义名称
    fn bean_definition_names(&self) -> Vec<String>;

    fn bean_definition_count(&self) -> usize {
        self.bean_definition_names().len()
    }

    fn register_alias(&self, name: &str, alias: &str) -> BeanResult<()>;

    fn remove_alias(&self, alias: &str) -> BeanResult<()>;

    fn is_alias(&self, name: &str) -> bool;

    /// 指向 `name` 的所有别名（包括别名的别名）
    fn aliases(&self, name: &str) -> Vec<String>;

    /// 沿别名链解析出规范名称
    fn canonical_name(&self, name: &str) -> String;
}

#[derive(Default)]
struct RegistryState {
    definitions: HashMap<String, BeanDefinition>,
    names: Vec<String>,
    /// alias -> name
    aliases: HashMap<String, String>,
}

impl RegistryState {
    fn has_alias(&self, name: &str, alias: &str) -> bool {
        let mut current = name;
        let mut steps = 0;
        while let Some(target) = self.aliases.get(current) {
            if target == alias {
                return true;
            }
            current = target;
            steps += 1;
            if steps > self.aliases.len() {
                break;
            }
        }
        false
    }
}

/// 内存中的注册表实现
#[derive(Default)]
pub struct SimpleBeanDefinitionRegistry {
    state: RwLock<RegistryState>,
}

impl SimpleBeanDefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以生成的名称注册定义
    ///
    /// 名称取类型名的 camelCase 形式，已被占用时追加 `#n`。
    pub fn register_with_generated_name(&self, definition: BeanDefinition) -> BeanResult<String> {
        let base = match definition.bean_type {
            Some(bean_type) => naming::default_bean_name(bean_type.name()),
            None => {
                return Err(BeanError::IllegalArgument(
                    "Cannot generate bean name for definition without a bean type".to_string(),
                ))
            }
        };

        let name = {
            let state = self.state.read();
            let mut candidate = base.clone();
            let mut counter = 0;
            while state.definitions.contains_key(&candidate) || state.aliases.contains_key(&candidate) {
                candidate = format!("{}{}{}", base, naming::GENERATED_BEAN_NAME_SEPARATOR, counter);
                counter += 1;
            }
            candidate
        };

        self.register_bean_definition(&name, definition)?;
        Ok(name)
    }
}

impl BeanDefinitionRegistry for SimpleBeanDefinitionRegistry {
    fn register_bean_definition(
        &self,
        name: &str,
        definition: BeanDefinition,
    ) -> BeanResult<Option<BeanDefinition>> {
        if name.is_empty() {
            return Err(BeanError::IllegalArgument(
                "Bean name must not be empty".to_string(),
            ));
        }
        if naming::is_factory_dereference(name) {
            return Err(BeanError::IllegalArgument(format!(
                "Bean name '{}' must not start with '{}'",
                name,
                naming::FACTORY_BEAN_PREFIX
            )));
        }

        let mut state = self.state.write();
        if state.aliases.contains_key(name) {
            return Err(BeanError::BeanDefinitionStore {
                name: name.to_string(),
                message: "name is already used as an alias".to_string(),
            });
        }

        let previous = state.definitions.insert(name.to_string(), definition);
        if previous.is_none() {
            state.names.push(name.to_string());
        }
        tracing::trace!("Registered bean definition: {}", name);
        Ok(previous)
    }

    fn remove_bean_definition(&self, name: &str) -> BeanResult<BeanDefinition> {
        let mut state = self.state.write();
        let removed = state
            .definitions
            .remove(name)
            .ok_or_else(|| BeanError::no_such_bean(name))?;
        state.names.retain(|n| n != name);
        tracing::trace!("Removed bean definition: {}", name);
        Ok(removed)
    }

    fn bean_definition(&self, name: &str) -> Option<BeanDefinition> {
        self.state.read().definitions.get(name).cloned()
    }

    fn contains_bean_definition(&self, name: &str) -> bool {
        self.state.read().definitions.contains_key(name)
    }

    fn bean_definition_names(&self) -> Vec<String> {
        self.state.read().names.clone()
    }

    fn bean_definition_count(&self) -> usize {
        self.state.read().names.len()
    }

    fn register_alias(&self, name: &str, alias: &str) -> BeanResult<()> {
        if name.is_empty() || alias.is_empty() {
            return Err(BeanError::IllegalArgument(
                "Alias and name must not be empty".to_string(),
            ));
        }

        let mut state = self.state.write();
        if alias == name {
            state.aliases.remove(alias);
            return Ok(());
        }
        if let Some(existing) = state.aliases.get(alias) {
            if existing == name {
                return Ok(());
            }
        }
        if state.has_alias(name, alias) {
            return Err(BeanError::IllegalState(format!(
                "Cannot register alias '{}' for name '{}': circular reference - '{}' is a direct or indirect alias for '{}' already",
                alias, name, name, alias
            )));
        }

        state.aliases.insert(alias.to_string(), name.to_string());
        tracing::trace!("Registered alias '{}' for bean '{}'", alias, name);
        Ok(())
    }

    fn remove_alias(&self, alias: &str) -> BeanResult<()> {
        self.state
            .write()
            .aliases
            .remove(alias)
            .map(|_| ())
            .ok_or_else(|| BeanError::IllegalState(format!("No alias '{}' registered", alias)))
    }

    fn is_alias(&self, name: &str) -> bool {
        self.state.read().aliases.contains_key(name)
    }

    fn aliases(&self, name: &str) -> Vec<String> {
        let state = self.state.read();
        let mut result = Vec::new();
        let mut pending = vec![name.to_string()];
        while let Some(target) = pending.pop() {
            let mut direct: Vec<&String> = state
                .aliases
                .iter()
                .filter(|(_, t)| **t == target)
                .map(|(alias, _)| alias)
                .collect();
            direct.sort();
            for alias in direct {
                if !result.contains(alias) && alias != name {
                    result.push(alias.clone());
                    pending.push(alias.clone());
                }
            }
        }
        result
    }

    fn canonical_name(&self, name: &str) -> String {
        let state = self.state.read();
        let mut canonical = name;
        let mut steps = 0;
        while let Some(target) = state.aliases.get(canonical) {
            canonical = target;
            steps += 1;
            if steps > state.aliases.len() {
                break;
            }
        }
        canonical.to_string()
    }
}
