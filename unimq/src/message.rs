//! # 消息结构

use bytes::Bytes;
use std::{collections::HashMap, fmt};

/// 待发送消息
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// 主题
    pub topic: String,
    /// 标签
    pub tags: Option<String>,
    /// 业务键
    pub keys: Option<String>,
    /// 消息体
    pub body: Bytes,
    /// 用户属性
    pub properties: HashMap<String, String>,
}

impl Message {
    /// 构造函数
    pub fn new(topic: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            tags: None,
            keys: None,
            body: body.into(),
            properties: HashMap::new(),
        }
    }

    /// 设置标签
    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = Some(tags.into());
        self
    }

    /// 设置业务键
    pub fn with_keys(mut self, keys: impl Into<String>) -> Self {
        self.keys = Some(keys.into());
        self
    }

    /// 设置用户属性
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// 消费端收到的消息
#[derive(Debug, Clone, PartialEq)]
pub struct MessageExt {
    /// 消息 Id
    pub msg_id: String,
    /// 主题
    pub topic: String,
    /// 标签
    pub tags: Option<String>,
    /// 业务键
    pub keys: Option<String>,
    /// 队列 Id
    pub queue_id: i32,
    /// 队列偏移量
    pub queue_offset: i64,
    /// 已重新消费次数
    pub reconsume_times: i32,
    /// 生产时间戳（毫秒）
    pub born_timestamp: i64,
    /// 消息体
    pub body: Bytes,
    /// 用户属性
    pub properties: HashMap<String, String>,
}

impl MessageExt {
    /// 所属消息队列
    pub fn queue(&self) -> MessageQueue {
        MessageQueue {
            topic: self.topic.clone(),
            queue_id: self.queue_id,
        }
    }

    /// 按原消息内容构造下一次重新消费的消息
    pub fn redelivered(&self) -> Self {
        Self {
            reconsume_times: self.reconsume_times.saturating_add(1),
            ..self.clone()
        }
    }
}

impl fmt::Display for MessageExt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MessageExt[msg_id={}, topic={}, tags={}, queue_id={}, queue_offset={}, reconsume_times={}, body_len={}]",
            self.msg_id,
            self.topic,
            self.tags.as_deref().unwrap_or(""),
            self.queue_id,
            self.queue_offset,
            self.reconsume_times,
            self.body.len()
        )
    }
}

/// 消息队列，即顺序分区
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageQueue {
    /// 主题
    pub topic: String,
    /// 队列 Id
    pub queue_id: i32,
}

impl fmt::Display for MessageQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.topic, self.queue_id)
    }
}

/// 发送状态枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// 已存储
    SendOk,
    /// 刷盘超时
    FlushDiskTimeout,
    /// 同步从节点超时
    FlushSlaveTimeout,
    /// 从节点不可用
    SlaveNotAvailable,
}

/// 传输层发送结果
#[derive(Debug, Clone, PartialEq)]
pub struct SendResult {
    /// 发送状态
    pub status: SendStatus,
    /// 消息 Id
    pub msg_id: String,
    /// 写入的消息队列
    pub queue: MessageQueue,
    /// 写入的队列偏移量
    pub queue_offset: i64,
}

impl fmt::Display for SendResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SendResult[status={:?}, msg_id={}, queue={}, queue_offset={}]",
            self.status, self.msg_id, self.queue, self.queue_offset
        )
    }
}

/// 批次消费结果枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeStatus {
    /// 并发消费成功
    ConsumeSuccess,
    /// 并发消费失败，按延迟级别稍后重新消费
    ReconsumeLater {
        /// 延迟级别：-1 不重试直接进入死信，0 由服务端决定，大于 0 由客户端指定
        delay_level: i32,
    },
    /// 顺序消费成功
    Success,
    /// 顺序消费失败，暂停当前队列
    SuspendQueue {
        /// 暂停时长（毫秒），-1 使用传输层默认值
        suspend_millis: i64,
    },
}

impl ConsumeStatus {
    /// 是否消费成功
    pub fn is_success(&self) -> bool {
        matches!(self, ConsumeStatus::ConsumeSuccess | ConsumeStatus::Success)
    }
}
