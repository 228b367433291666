//! # 配置
//!
//! 分层加载：`{root}/default`、`{root}/{UNIMQ_ENV}`，最后是 `UNIMQ__` 前缀的环境变量。

use crate::errors::{ConfigError, ConsumerError};
use config::{Config, Environment, File};
use serde::{Deserialize, de::DeserializeOwned};
use std::{collections::HashMap, fmt::Debug, path::PathBuf, str::FromStr};
use validator::Validate;

/// 命名配置集合，按名称取值，缺失时取默认值
#[derive(Debug, Clone)]
pub struct NamedConfig<T> {
    configs: HashMap<String, T>,
}

impl<T> NamedConfig<T>
where
    T: DeserializeOwned + Validate + Clone + Send + Sync + Default + 'static,
{
    /// 获取指定名称的配置
    pub fn get(&self, name: &str) -> T {
        self.configs.get(name).cloned().unwrap_or_default()
    }

    /// 全部配置名称
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.configs.keys().map(String::as_str)
    }
}

/// 构建分层配置
pub fn build_config(crate_dir: PathBuf) -> Result<Config, ConfigError> {
    let config_root = std::env::var("UNIMQ_CONFIG_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| crate_dir.join("config"));
    let env = std::env::var("UNIMQ_ENV").unwrap_or_else(|_| "dev".to_string());
    let config = Config::builder()
        .add_source(File::from(config_root.join("default")).required(false))
        .add_source(File::from(config_root.join(env)).required(false))
        .add_source(
            Environment::with_prefix("UNIMQ")
                .separator("__")
                .list_separator(","),
        )
        .build()?;
    Ok(config)
}

/// 加载并验证命名配置
pub fn load_named_config<T>(config: &Config, section: &str) -> Result<NamedConfig<T>, ConfigError>
where
    T: DeserializeOwned + Validate + Clone + Default,
{
    let configs = match config.get::<HashMap<String, T>>(section) {
        Ok(configs) => configs,
        Err(config::ConfigError::NotFound(_)) => HashMap::new(),
        Err(e) => return Err(e.into()),
    };

    for (key, cfg) in &configs {
        cfg.validate().map_err(|e| ConfigError::ValidationError {
            section: section.to_string(),
            key: key.to_string(),
            message: e.to_string(),
        })?;
    }

    Ok(NamedConfig { configs })
}

/// 消费起始位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsumeFromWhere {
    /// 从最新偏移量开始
    #[default]
    ConsumeFromLastOffset,
    /// 从最早偏移量开始
    ConsumeFromFirstOffset,
    /// 从指定时间戳开始
    ConsumeFromTimestamp,
}

/// 消息模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageModel {
    /// 集群消费，同组实例分摊消息
    #[default]
    Clustering,
    /// 广播消费，每个实例收到全部消息
    Broadcasting,
}

/// 消费模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsumeMode {
    /// 并发消费
    #[default]
    #[serde(alias = "CONCURRENT")]
    Concurrently,
    /// 顺序消费，一个队列一个线程
    Orderly,
}

impl FromStr for ConsumeMode {
    type Err = ConsumerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CONCURRENTLY" | "CONCURRENT" => Ok(ConsumeMode::Concurrently),
            "ORDERLY" => Ok(ConsumeMode::Orderly),
            _ => Err(ConsumerError::InvalidConfig(format!(
                "属性'consume_mode'取值错误：{s}"
            ))),
        }
    }
}

/// 消费者配置
#[derive(Debug, Deserialize, Validate, Clone)]
#[serde(default)]
pub struct ConsumerConfig {
    /// 消费组
    #[validate(length(min = 1, message = "属性'consumer_group'不能为空"))]
    pub consumer_group: String,
    /// 主题到标签过滤表达式的映射
    pub subscriptions: HashMap<String, String>,
    /// 最小消费线程数
    #[validate(range(min = 1))]
    pub consume_thread_min: Option<usize>,
    /// 最大消费线程数
    #[validate(range(min = 1))]
    pub consume_thread_max: Option<usize>,
    /// 消费起始位置
    pub consume_from_where: ConsumeFromWhere,
    /// 消息模式
    pub message_model: MessageModel,
    /// 消费模式
    pub consume_mode: ConsumeMode,
    /// 并发消费失败时的重试延迟级别
    #[validate(range(min = -1))]
    pub delay_level_when_next_consume: i32,
    /// 顺序消费失败时暂停队列的时长（毫秒）
    #[validate(range(min = -1))]
    pub suspend_current_queue_time_millis: i64,
    /// 单批次最大消息数
    #[validate(range(min = 1, max = 1024))]
    pub consume_message_batch_max_size: usize,
    /// 最大重新消费次数，-1 使用传输层默认值
    #[validate(range(min = -1))]
    pub max_reconsume_times: i32,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            consumer_group: String::new(),
            subscriptions: HashMap::new(),
            consume_thread_min: None,
            consume_thread_max: None,
            consume_from_where: ConsumeFromWhere::default(),
            message_model: MessageModel::default(),
            consume_mode: ConsumeMode::default(),
            delay_level_when_next_consume: 0,
            suspend_current_queue_time_millis: -1,
            consume_message_batch_max_size: 1,
            max_reconsume_times: -1,
        }
    }
}

impl ConsumerConfig {
    /// 构造指定消费组的默认配置
    pub fn new(consumer_group: impl Into<String>) -> Self {
        Self {
            consumer_group: consumer_group.into(),
            ..Default::default()
        }
    }

    /// 订阅主题
    pub fn subscribe(mut self, topic: impl Into<String>, expr: impl Into<String>) -> Self {
        self.subscriptions.insert(topic.into(), expr.into());
        self
    }

    /// 设置消费模式
    pub fn with_consume_mode(mut self, mode: ConsumeMode) -> Self {
        self.consume_mode = mode;
        self
    }

    /// 设置消息模式
    pub fn with_message_model(mut self, model: MessageModel) -> Self {
        self.message_model = model;
        self
    }

    /// 设置消费起始位置
    pub fn with_consume_from_where(mut self, from_where: ConsumeFromWhere) -> Self {
        self.consume_from_where = from_where;
        self
    }

    /// 设置消费线程数范围
    pub fn with_threads(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.consume_thread_min = min;
        self.consume_thread_max = max;
        self
    }

    /// 设置并发消费失败的重试延迟级别
    pub fn with_delay_level(mut self, level: i32) -> Self {
        self.delay_level_when_next_consume = level;
        self
    }

    /// 设置顺序消费失败的暂停时长
    pub fn with_suspend_millis(mut self, millis: i64) -> Self {
        self.suspend_current_queue_time_millis = millis;
        self
    }

    /// 设置单批次最大消息数
    pub fn with_batch_max_size(mut self, size: usize) -> Self {
        self.consume_message_batch_max_size = size;
        self
    }

    /// 设置最大重新消费次数
    pub fn with_max_reconsume_times(mut self, times: i32) -> Self {
        self.max_reconsume_times = times;
        self
    }
}
