//! # 批次分发策略
//!
//! 传输层以批次调用 [`Listener`]，监听器依次把消息交给业务处理函数，
//! 并把处理失败转换为传输层的重新投递指令。

use crate::{
    config::{ConsumeMode, ConsumerConfig},
    message::{ConsumeStatus, MessageExt, MessageQueue},
};
use std::{
    any::Any,
    collections::HashMap,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
    time::Instant,
};
use tracing::{error, info, warn};

/// 消息处理特征
///
/// 返回 `false` 或发生 panic 均视为该消息处理失败。
pub trait MessageHandler: Send + Sync + 'static {
    /// 处理单条消息
    fn consume_msg(&self, body: &[u8], msg: &MessageExt) -> bool;
}

impl<F> MessageHandler for F
where
    F: Fn(&[u8], &MessageExt) -> bool + Send + Sync + 'static,
{
    #[inline(always)]
    fn consume_msg(&self, body: &[u8], msg: &MessageExt) -> bool {
        self(body, msg)
    }
}

/// 订阅者特征
pub trait Subscriber: MessageHandler {
    /// 消费组
    fn consumer_group(&self) -> String;
    /// 主题到标签过滤表达式的映射
    fn subscribe_topic_tags(&self) -> HashMap<String, String>;
}

/// 批次监听器，按消费模式选择分发策略
#[derive(Clone)]
pub enum Listener {
    /// 并发消费
    Concurrently {
        /// 消息处理函数
        handler: Arc<dyn MessageHandler>,
        /// 失败时的重试延迟级别
        delay_level: i32,
    },
    /// 顺序消费
    Orderly {
        /// 消息处理函数
        handler: Arc<dyn MessageHandler>,
        /// 失败时暂停队列的时长（毫秒）
        suspend_millis: i64,
    },
}

impl Listener {
    /// 按配置的消费模式构造监听器
    pub fn select(config: &ConsumerConfig, handler: Arc<dyn MessageHandler>) -> Self {
        match config.consume_mode {
            ConsumeMode::Concurrently => Listener::Concurrently {
                handler,
                delay_level: config.delay_level_when_next_consume,
            },
            ConsumeMode::Orderly => Listener::Orderly {
                handler,
                suspend_millis: config.suspend_current_queue_time_millis,
            },
        }
    }

    /// 消费模式
    pub fn mode(&self) -> ConsumeMode {
        match self {
            Listener::Concurrently { .. } => ConsumeMode::Concurrently,
            Listener::Orderly { .. } => ConsumeMode::Orderly,
        }
    }

    /// 该模式下批次失败时的消费状态
    pub fn failure(&self) -> ConsumeStatus {
        match self {
            Listener::Concurrently { delay_level, .. } => ConsumeStatus::ReconsumeLater {
                delay_level: *delay_level,
            },
            Listener::Orderly { suspend_millis, .. } => ConsumeStatus::SuspendQueue {
                suspend_millis: *suspend_millis,
            },
        }
    }

    /// 消费一个批次
    ///
    /// 逐条处理，遇到第一条失败的消息即放弃该批次剩余消息。
    pub fn consume(&self, msgs: &[MessageExt], queue: &MessageQueue) -> ConsumeStatus {
        match self {
            Listener::Concurrently {
                handler,
                delay_level,
            } => consume_concurrently(handler.as_ref(), *delay_level, msgs, queue),
            Listener::Orderly {
                handler,
                suspend_millis,
            } => consume_orderly(handler.as_ref(), *suspend_millis, msgs, queue),
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Listener::Concurrently { delay_level, .. } => f
                .debug_struct("Concurrently")
                .field("delay_level", delay_level)
                .finish(),
            Listener::Orderly { suspend_millis, .. } => f
                .debug_struct("Orderly")
                .field("suspend_millis", suspend_millis)
                .finish(),
        }
    }
}

fn consume_concurrently(
    handler: &dyn MessageHandler,
    delay_level: i32,
    msgs: &[MessageExt],
    queue: &MessageQueue,
) -> ConsumeStatus {
    for msg in msgs {
        if let Err(reason) = invoke(handler, msg) {
            error!("消费消息失败，队列 {queue}，{msg}：{reason}");
            return ConsumeStatus::ReconsumeLater { delay_level };
        }
    }
    ConsumeStatus::ConsumeSuccess
}

fn consume_orderly(
    handler: &dyn MessageHandler,
    suspend_millis: i64,
    msgs: &[MessageExt],
    queue: &MessageQueue,
) -> ConsumeStatus {
    for msg in msgs {
        if let Err(reason) = invoke(handler, msg) {
            warn!("消费消息失败，暂停队列 {queue}，{msg}：{reason}");
            return ConsumeStatus::SuspendQueue { suspend_millis };
        }
    }
    ConsumeStatus::Success
}

fn invoke(handler: &dyn MessageHandler, msg: &MessageExt) -> Result<(), String> {
    let now = Instant::now();
    let result = catch_unwind(AssertUnwindSafe(|| handler.consume_msg(&msg.body, msg)));
    let cost = now.elapsed().as_millis();
    info!("消费消息 {} 耗时 {cost} ms", msg.msg_id);
    match result {
        Ok(true) => Ok(()),
        Ok(false) => Err("处理函数返回失败".to_owned()),
        Err(panic) => Err(format!("处理函数发生 panic：{}", panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "未知错误".to_owned()
    }
}
