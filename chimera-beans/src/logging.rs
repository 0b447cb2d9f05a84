//! 引擎日志
//!
//! 引擎只通过 `tracing` 宏输出事件，是否安装订阅者由使用方决定。
//! 单独使用本 crate 时可以用 [`LoggingConfig::init`] 安装一个 `fmt` 订阅者：
//!
//! ```rust,ignore
//! LoggingConfig::new()
//!     .level(LogLevel::Debug)
//!     .show_thread_ids(true)
//!     .init()?;
//! ```

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::error::{BeanError, BeanResult};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
}

impl LogLevel {
    const ALL: [LogLevel; 5] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    fn level_filter(self) -> LevelFilter {
        LevelFilter::from_level(Level::from(self))
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        if lower == "warning" {
            return Ok(LogLevel::Warn);
        }
        LogLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == lower)
            .ok_or_else(|| format!("Invalid log level: {}", s))
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// 紧凑格式（默认）
    Compact,
    /// 完整格式
    Full,
    /// 每行一个 JSON 对象
    Json,
    /// 多行美化格式，适合开发
    Pretty,
}

impl LogFormat {
    const ALL: [LogFormat; 4] = [
        LogFormat::Compact,
        LogFormat::Full,
        LogFormat::Json,
        LogFormat::Pretty,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Compact => "compact",
            LogFormat::Full => "full",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        LogFormat::ALL
            .into_iter()
            .find(|format| format.as_str() == lower)
            .ok_or_else(|| format!("Invalid log format: {}", s))
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// 没有过滤器时使用的默认级别（默认：Info）
    pub level: LogLevel,

    pub format: LogFormat,

    pub show_timestamp: bool,

    /// 是否显示目标（模块路径）
    pub show_target: bool,

    /// 是否显示线程 ID
    ///
    /// 等待其它线程创建单例的调用会阻塞，排查这类问题时打开。
    pub show_thread_ids: bool,

    pub show_thread_names: bool,

    /// EnvFilter 指令，例如 "chimera_beans=trace,my_app=info"
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            show_timestamp: true,
            show_target: false,
            show_thread_ids: false,
            show_thread_names: false,
            filter: None,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn show_timestamp(mut self, show: bool) -> Self {
        self.show_timestamp = show;
        self
    }

    pub fn show_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    pub fn show_thread_ids(mut self, show: bool) -> Self {
        self.show_thread_ids = show;
        self
    }

    pub fn show_thread_names(mut self, show: bool) -> Self {
        self.show_thread_names = show;
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// 读取 `RUST_LOG`、`LOG_LEVEL` 和 `LOG_FORMAT`，无法解析的值被忽略
    pub fn from_env() -> Self {
        Self::default().with_lookup(|key| std::env::var(key).ok())
    }

    fn with_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(filter) = lookup("RUST_LOG").filter(|f| !f.trim().is_empty()) {
            self.filter = Some(filter);
        }
        if let Some(level) = lookup("LOG_LEVEL").and_then(|raw| raw.parse().ok()) {
            self.level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT").and_then(|raw| raw.parse().ok()) {
            self.format = format;
        }
        self
    }

    fn env_filter(&self) -> EnvFilter {
        let builder = EnvFilter::builder().with_default_directive(self.level.level_filter().into());
        match &self.filter {
            Some(filter) => builder.parse_lossy(filter),
            None => builder.from_env_lossy(),
        }
    }

    fn fmt_layer(&self) -> BoxedLayer {
        let layer = tracing_subscriber::fmt::layer()
            .with_target(self.show_target)
            .with_thread_ids(self.show_thread_ids)
            .with_thread_names(self.show_thread_names);

        match (self.format, self.show_timestamp) {
            (LogFormat::Compact, true) => layer.compact().boxed(),
            (LogFormat::Compact, false) => layer.compact().without_time().boxed(),
            (LogFormat::Full, true) => layer.boxed(),
            (LogFormat::Full, false) => layer.without_time().boxed(),
            (LogFormat::Json, _) => layer.json().boxed(),
            (LogFormat::Pretty, _) => layer.pretty().boxed(),
        }
    }

    /// 安装全局订阅者
    ///
    /// 全局订阅者只能安装一次，重复调用返回 [`BeanError::LoggingInitFailed`]。
    pub fn init(self) -> BeanResult<()> {
        tracing_subscriber::registry()
            .with(self.fmt_layer())
            .with(self.env_filter())
            .try_init()
            .map_err(|e| BeanError::LoggingInitFailed(e.to_string()))?;

        tracing::debug!(
            "Logging initialized: level={}, format={}",
            self.level,
            self.format
        );
        Ok(())
    }
}
