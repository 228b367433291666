//! # **unimq** 错误定义

use thiserror::Error;

/// 消费者生命周期错误枚举
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// 消费者配置错误
    #[error("消费者配置错误：{0}")]
    InvalidConfig(String),
    /// 消费者重复启动
    #[error("消费者已启动：{0}")]
    AlreadyStarted(String),
    /// 消费者已停止，不可再次启动
    #[error("消费者已停止：{0}")]
    Terminated(String),
    /// 同一消费组已有运行中的订阅
    #[error("消费组已存在运行中的订阅：{0}")]
    DuplicateGroup(String),
    /// 消息传输层错误
    #[error("消息传输层错误：{0}")]
    Transport(TransportError),
}

impl ConsumerError {
    /// 返回用于日志的简短标签
    pub fn as_label(&self) -> &'static str {
        match self {
            ConsumerError::InvalidConfig(_) => "invalid_config",
            ConsumerError::AlreadyStarted(_) => "already_started",
            ConsumerError::Terminated(_) => "terminated",
            ConsumerError::DuplicateGroup(_) => "duplicate_group",
            ConsumerError::Transport(_) => "transport",
        }
    }
}

impl From<TransportError> for ConsumerError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::DuplicateGroup(group) => ConsumerError::DuplicateGroup(group),
            other => ConsumerError::Transport(other),
        }
    }
}

impl From<validator::ValidationErrors> for ConsumerError {
    fn from(e: validator::ValidationErrors) -> Self {
        ConsumerError::InvalidConfig(e.to_string())
    }
}

/// 消息传输层错误枚举
#[derive(Debug, Error)]
pub enum TransportError {
    /// 客户端错误
    #[error("客户端错误：{0}")]
    Client(String),
    /// 同一消费组重复订阅
    #[error("消费组 {0} 重复订阅")]
    DuplicateGroup(String),
    /// 发送错误
    #[error("发送错误：{0}")]
    Send(String),
    /// 关闭错误
    #[error("关闭错误：{0}")]
    Shutdown(String),
    /// 传输未设置或已关闭
    #[error("传输未设置或已关闭")]
    Closed,
}

/// 配置加载错误枚举
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置源加载错误
    #[error("加载配置失败：{0}")]
    Load(#[from] config::ConfigError),
    /// 配置验证错误
    #[error("配置'{section}.{key}'验证失败：{message}")]
    ValidationError {
        /// 配置节
        section: String,
        /// 配置键
        key: String,
        /// 错误信息
        message: String,
    },
}
