//! # Kafka 配置
//!
//! 从分层配置的 `kafka` 节加载，`consumer` 与 `producer` 为透传给 librdkafka 的客户端参数。

use crate::errors::ClientError;
use rdkafka::ClientConfig;
use serde::Deserialize;
use std::{collections::HashMap, path::PathBuf};
use tokio::time::Duration;
use unimq::{
    config::build_config,
    errors::ConfigError,
    transport::ThreadBounds,
};
use validator::Validate;

const SECTION: &str = "kafka";

/// Kafka 配置
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct KafkaConfig {
    /// 集群地址
    #[validate(length(min = 1, message = "属性'bootstrap'不能为空"))]
    pub bootstrap: String,
    /// 发送与关闭的超时秒数
    #[validate(range(min = 1))]
    pub timeout: u64,
    /// 默认最小消费线程数
    #[validate(range(min = 1))]
    pub threads_min: usize,
    /// 默认最大消费线程数
    #[validate(range(min = 1))]
    pub threads_max: usize,
    /// 消费者客户端参数
    pub consumer: HashMap<String, String>,
    /// 生产者客户端参数
    pub producer: HashMap<String, String>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap: "localhost:9092".to_owned(),
            timeout: 45,
            threads_min: 20,
            threads_max: 64,
            consumer: HashMap::new(),
            producer: HashMap::new(),
        }
    }
}

impl KafkaConfig {
    /// 从本包的配置目录加载
    pub fn load() -> Result<Self, ClientError> {
        let config = build_config(PathBuf::from(env!("CARGO_MANIFEST_DIR")))?;
        Ok(Self::from_config(&config)?)
    }

    /// 从已构建的配置加载并验证，缺少 `kafka` 节时取默认值
    pub fn from_config(config: &config::Config) -> Result<Self, ConfigError> {
        let cfg = match config.get::<KafkaConfig>(SECTION) {
            Ok(cfg) => cfg,
            Err(config::ConfigError::NotFound(_)) => KafkaConfig::default(),
            Err(e) => return Err(e.into()),
        };
        if cfg.threads_min > cfg.threads_max {
            return Err(ConfigError::ValidationError {
                section: SECTION.to_owned(),
                key: "threads_min".to_owned(),
                message: format!("最小线程数 {} 大于最大线程数 {}", cfg.threads_min, cfg.threads_max),
            });
        }
        cfg.validate().map_err(|e| ConfigError::ValidationError {
            section: SECTION.to_owned(),
            key: e
                .field_errors()
                .keys()
                .map(|k| k.to_string())
                .collect::<Vec<_>>()
                .join(","),
            message: e.to_string(),
        })?;
        Ok(cfg)
    }

    /// 超时时长
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// 默认消费线程数范围
    pub fn thread_bounds(&self) -> ThreadBounds {
        ThreadBounds {
            min: self.threads_min,
            max: self.threads_max,
        }
    }

    pub(crate) fn consumer_config(&self) -> ClientConfig {
        client_config(&self.bootstrap, &self.consumer)
    }

    pub(crate) fn producer_config(&self) -> ClientConfig {
        client_config(&self.bootstrap, &self.producer)
    }
}

fn client_config(bootstrap: &str, settings: &HashMap<String, String>) -> ClientConfig {
    let mut config = ClientConfig::new();
    for (key, value) in settings {
        config.set(key, value);
    }
    config.set("bootstrap.servers", bootstrap);
    config
}
