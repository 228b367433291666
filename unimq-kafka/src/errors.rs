//! # Kafka 实现错误定义

use thiserror::Error;
use unimq::errors::{ConfigError, TransportError};

/// Kafka 客户端错误枚举
#[derive(Debug, Error)]
pub enum ClientError {
    /// Kafka 错误
    #[error("Kafka错误：{0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
    /// 配置错误
    #[error("{0}")]
    Config(#[from] ConfigError),
}

impl From<ClientError> for TransportError {
    fn from(e: ClientError) -> Self {
        TransportError::Client(e.to_string())
    }
}
