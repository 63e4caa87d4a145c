//! 日志模块
//!
//! 提供跨 UI 的统一日志级别和条目定义，以及注入到各组件的 [`Logger`] 句柄。
//!
//! 所有日志都经过 `log` 门面输出；若附加了 [`LogSink`]，同一条目还会转发给
//! UI（例如桌面端的日志面板）。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// 日志级别
///
/// 实现了 `PartialOrd` 以便过滤。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl LogLevel {
    /// 获取显示名称
    pub fn name(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }

    fn as_log_level(self) -> log::Level {
        match self {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ERROR" => Ok(LogLevel::Error),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "INFO" => Ok(LogLevel::Info),
            "DEBUG" => Ok(LogLevel::Debug),
            _ => Err(()),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 日志条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub target: String,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            target: target.into(),
            message: message.into(),
        }
    }
}

/// 日志条目接收端
pub trait LogSink: Send + Sync {
    fn emit(&self, entry: LogEntry);
}

impl LogSink for mpsc::UnboundedSender<LogEntry> {
    fn emit(&self, entry: LogEntry) {
        // 接收端已关闭时静默丢弃
        let _ = self.send(entry);
    }
}

/// 组件日志句柄
///
/// 构造组件时注入，替代进程级全局单例。克隆开销很小。
#[derive(Clone)]
pub struct Logger {
    target: &'static str,
    sink: Option<Arc<dyn LogSink>>,
}

impl Logger {
    pub fn new(target: &'static str) -> Self {
        Self { target, sink: None }
    }

    /// 附加一个转发目标
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// 派生一个共享同一转发目标、但使用不同 target 的句柄
    pub fn scoped(&self, target: &'static str) -> Self {
        Self {
            target,
            sink: self.sink.clone(),
        }
    }

    pub fn target(&self) -> &'static str {
        self.target
    }

    pub fn log(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        log::log!(target: self.target, level.as_log_level(), "{}", args);

        if let Some(sink) = &self.sink {
            sink.emit(LogEntry::new(level, self.target, args.to_string()));
        }
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Debug, args);
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Info, args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Warn, args);
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Error, args);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new("blade")
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("target", &self.target)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

/// 内存日志收集器，便于在测试中断言日志输出
#[derive(Default)]
pub struct MemorySink {
    entries: crate::sync::Guarded<Vec<LogEntry>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.snapshot()
    }

    /// 统计包含指定片段的条目数
    pub fn count_containing(&self, needle: &str) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.message.contains(needle))
            .count()
    }
}

impl LogSink for MemorySink {
    fn emit(&self, entry: LogEntry) {
        self.entries.lock().push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert_eq!("warning".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_sink_receives_entries() {
        let sink = MemorySink::new();
        let logger = Logger::new("blade::test").with_sink(sink.clone());

        logger.info(format_args!("hello {}", 42));
        logger.scoped("blade::other").warn(format_args!("careful"));

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "hello 42");
        assert_eq!(entries[0].target, "blade::test");
        assert_eq!(entries[1].level, LogLevel::Warn);
        assert_eq!(entries[1].target, "blade::other");
    }

    #[tokio::test]
    async fn test_channel_sink() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let logger = Logger::new("blade::test").with_sink(Arc::new(tx));

        logger.error(format_args!("boom"));

        let entry = rx.recv().await.unwrap();
        assert_eq!(entry, LogEntry::new(LogLevel::Error, "blade::test", "boom"));
    }
}
