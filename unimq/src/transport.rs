//! # 消息传输层边界
//!
//! 框架只依赖这里的特征，具体的消息客户端（如 `unimq-kafka`）实现它们。

use crate::{
    config::{ConsumeFromWhere, ConsumerConfig, MessageModel},
    errors::TransportError,
    listener::Listener,
    message::{Message, SendResult},
    subscription::Subscription,
};
use std::future::Future;

/// 消费线程数范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadBounds {
    /// 最小线程数
    pub min: usize,
    /// 最大线程数
    pub max: usize,
}

impl ThreadBounds {
    /// 以传输层默认值为基础，应用配置的线程数
    ///
    /// 配置的最大值覆盖默认最大值；最小值大于最大值时，最小值降为最大值。
    pub fn resolve(defaults: ThreadBounds, min: Option<usize>, max: Option<usize>) -> Self {
        let mut bounds = defaults;
        if let Some(min) = min {
            bounds.min = min;
        }
        if let Some(max) = max {
            bounds.max = max;
        }
        if bounds.min > bounds.max {
            bounds.min = bounds.max;
        }
        bounds
    }
}

/// 推送订阅的构建参数
#[derive(Debug, Clone)]
pub struct PushSettings {
    /// 消费组
    pub consumer_group: String,
    /// 实例名称
    pub instance_name: String,
    /// 订阅列表
    pub subscriptions: Vec<Subscription>,
    /// 消费线程数范围
    pub threads: ThreadBounds,
    /// 消费起始位置
    pub consume_from_where: ConsumeFromWhere,
    /// 消息模式
    pub message_model: MessageModel,
    /// 单批次最大消息数
    pub batch_max_size: usize,
    /// 最大重新消费次数，-1 使用传输层默认值
    pub max_reconsume_times: i32,
}

impl PushSettings {
    pub(crate) fn new(
        config: &ConsumerConfig,
        instance_name: String,
        subscriptions: Vec<Subscription>,
        threads: ThreadBounds,
    ) -> Self {
        Self {
            consumer_group: config.consumer_group.clone(),
            instance_name,
            subscriptions,
            threads,
            consume_from_where: config.consume_from_where,
            message_model: config.message_model,
            batch_max_size: config.consume_message_batch_max_size,
            max_reconsume_times: config.max_reconsume_times,
        }
    }

    /// 判断消息是否被订阅
    pub fn accepts(&self, topic: &str, tags: Option<&str>) -> bool {
        self.subscriptions.iter().any(|s| s.accepts(topic, tags))
    }

    /// 订阅的主题列表
    pub fn topics(&self) -> Vec<&str> {
        self.subscriptions.iter().map(|s| s.topic.as_str()).collect()
    }
}

/// 推送式消费传输层
pub trait Transport: Send + Sync + 'static {
    /// 订阅句柄
    type Handle: SubscriptionHandle;

    /// 传输层默认的消费线程数范围
    fn default_thread_bounds(&self) -> ThreadBounds;

    /// 创建并启动订阅，之后由传输层以批次调用监听器
    fn subscribe(
        &self,
        settings: PushSettings,
        listener: Listener,
    ) -> impl Future<Output = Result<Self::Handle, TransportError>> + Send;
}

/// 订阅句柄
pub trait SubscriptionHandle: Send + Sync + 'static {
    /// 关闭订阅，不中断正在执行的消息处理
    fn shutdown(self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// 生产者传输层
pub trait ProducerTransport: Send + Sync + 'static {
    /// 同步发送
    fn send(&self, msg: &Message) -> impl Future<Output = Result<SendResult, TransportError>> + Send;

    /// 单向发送，不等待结果
    fn send_one_way(&self, msg: &Message) -> Result<(), TransportError>;

    /// 关闭
    fn shutdown(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}
