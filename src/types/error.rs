use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("工具执行失败 [{tool}]: {message}")]
    ToolExecutionFailure { tool: String, message: String },

    #[error("配置错误: {0}")]
    ConfigurationError(String),

    #[error("数据源无法解析: {0}")]
    SourceResolutionWarning(String),

    #[error("持久化失败: {0}")]
    PersistenceError(String),

    #[error("合并失败: {0}")]
    MergeError(String),

    #[error("节点未找到: {0}")]
    NodeNotFound(Uuid),

    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("图像错误: {0}")]
    Image(#[from] image::ImageError),
}

impl PipelineError {
    pub fn tool_failure(tool: &str, message: impl Into<String>) -> Self {
        Self::ToolExecutionFailure {
            tool: tool.to_string(),
            message: message.into(),
        }
    }
}

/// 错误级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorLevel {
    Info,
    Warning,
    Error,
}

/// 错误收集器中的一条记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub level: ErrorLevel,
    /// 产生错误的位置,例如 `pipeline_load_error` 或工具名称
    pub target: String,
    pub message: String,
    /// 连续重复次数
    pub count: usize,
}

/// 错误收集器,归属于某个 Wrapper 或 LoosePipeline
///
/// 连续相同的消息只增加计数,不会无限增长。
#[derive(Debug, Clone, Default)]
pub struct ErrorHolder {
    entries: Vec<ErrorEntry>,
}

impl ErrorHolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加一条记录
    ///
    /// # Arguments
    /// * `level` - 错误级别
    /// * `target` - 错误来源
    /// * `message` - 错误描述
    pub fn add(&mut self, level: ErrorLevel, target: &str, message: impl Into<String>) {
        let message = message.into();
        match level {
            ErrorLevel::Error => tracing::error!(origin = %target, "{}", message),
            ErrorLevel::Warning => tracing::warn!(origin = %target, "{}", message),
            ErrorLevel::Info => tracing::info!(origin = %target, "{}", message),
        }

        if let Some(last) = self.entries.last_mut() {
            if last.level == level && last.target == target && last.message == message {
                last.count += 1;
                return;
            }
        }

        self.entries.push(ErrorEntry {
            level,
            target: target.to_string(),
            message,
            count: 1,
        });
    }

    pub fn add_error(&mut self, target: &str, error: &PipelineError) {
        self.add(ErrorLevel::Error, target, error.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 错误级别记录的条数(不含重复计数)
    pub fn error_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.level == ErrorLevel::Error)
            .count()
    }

    pub fn last(&self) -> Option<&ErrorEntry> {
        self.entries.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ErrorEntry> {
        self.entries.iter()
    }

    pub fn contains_target(&self, target: &str) -> bool {
        self.entries.iter().any(|e| e.target == target)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
