//! Bean 工厂配置
//!
//! 支持 TOML 文件和 `CHIMERA_BEANS_*` 环境变量，环境变量优先级更高。
//!
//! ```toml
//! cache_bean_metadata = true
//! allow_circular_references = true
//! allow_raw_injection_despite_wrapping = false
//! allow_bean_definition_overriding = true
//!
//! [logging]
//! level = "debug"
//! format = "compact"
//! filter = "chimera_beans=trace"
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{BeanError, BeanResult};
use crate::logging::{LogFormat, LogLevel, LoggingConfig};

/// 环境变量前缀
pub const ENV_PREFIX: &str = "CHIMERA_BEANS_";

/// Bean 工厂配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BeanFactoryConfig {
    /// 是否缓存合并定义（关闭后只有已创建的 Bean 才缓存）
    pub cache_bean_metadata: bool,

    /// 是否允许单例之间的循环引用
    pub allow_circular_references: bool,

    /// 早期引用被交出后，后处理器又替换了最终实例时是否仍然允许
    pub allow_raw_injection_despite_wrapping: bool,

    /// 是否允许用同名定义覆盖已有定义
    pub allow_bean_definition_overriding: bool,

    pub logging: Option<LoggingSection>,
}

impl Default for BeanFactoryConfig {
    fn default() -> Self {
        Self {
            cache_bean_metadata: true,
            allow_circular_references: true,
            allow_raw_injection_despite_wrapping: false,
            allow_bean_definition_overriding: true,
            logging: None,
        }
    }
}

/// `[logging]` 配置段
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    pub level: Option<LogLevel>,
    pub format: Option<LogFormat>,
    pub filter: Option<String>,
}

impl LoggingSection {
    pub fn to_logging_config(&self) -> LoggingConfig {
        let mut config = LoggingConfig::default();
        if let Some(level) = self.level {
            config.level = level;
        }
        if let Some(format) = self.format {
            config.format = format;
        }
        config.filter = self.filter.clone();
        config
    }
}

impl BeanFactoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 TOML 字符串加载
    pub fn from_toml_str(content: &str) -> BeanResult<Self> {
        toml::from_str(content)
            .map_err(|e| BeanError::Config(format!("Failed to parse bean factory config: {}", e)))
    }

    /// 从 TOML 文件加载
    pub fn from_file(path: impl AsRef<Path>) -> BeanResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            BeanError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        tracing::debug!("Loading bean factory config from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// 默认配置叠加环境变量
    pub fn from_env() -> BeanResult<Self> {
        Self::default().with_env_overrides()
    }

    /// 用 `CHIMERA_BEANS_*` 环境变量覆盖当前配置
    pub fn with_env_overrides(self) -> BeanResult<Self> {
        self.with_overrides(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> BeanResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let flags: [(&str, &mut bool); 4] = [
            ("CACHE_BEAN_METADATA", &mut self.cache_bean_metadata),
            ("ALLOW_CIRCULAR_REFERENCES", &mut self.allow_circular_references),
            (
                "ALLOW_RAW_INJECTION_DESPITE_WRAPPING",
                &mut self.allow_raw_injection_despite_wrapping,
            ),
            (
                "ALLOW_BEAN_DEFINITION_OVERRIDING",
                &mut self.allow_bean_definition_overriding,
            ),
        ];
        for (key, flag) in flags {
            if let Some(raw) = lookup(key) {
                *flag = parse_bool(&raw).ok_or_else(|| {
                    BeanError::Config(format!(
                        "Invalid boolean for {}{}: '{}'",
                        ENV_PREFIX, key, raw
                    ))
                })?;
            }
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            let level = level.parse::<LogLevel>().map_err(BeanError::Config)?;
            self.logging.get_or_insert_with(LoggingSection::default).level = Some(level);
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            let format = format.parse::<LogFormat>().map_err(BeanError::Config)?;
            self.logging.get_or_insert_with(LoggingSection::default).format = Some(format);
        }

        Ok(self)
    }

    /// 日志配置（未配置 `[logging]` 时读取标准环境变量）
    pub fn logging_config(&self) -> LoggingConfig {
        match &self.logging {
            Some(section) => section.to_logging_config(),
            None => LoggingConfig::from_env(),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}
