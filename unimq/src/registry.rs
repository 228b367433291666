//! # 消费者注册表
//!
//! 只读持有消费者引用，不启动也不停止消费者。

use crate::consumer::{ConsumerInfo, ConsumerState};
use std::sync::{Arc, RwLock};

/// 消费者注册表
#[derive(Default)]
pub struct ConsumerRegistry {
    consumers: RwLock<Vec<Arc<dyn ConsumerInfo>>>,
}

impl ConsumerRegistry {
    /// 构造函数
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记消费者
    pub fn register(&self, consumer: Arc<dyn ConsumerInfo>) {
        self.consumers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(consumer);
    }

    /// 全部消费者快照
    pub fn consumers(&self) -> Vec<Arc<dyn ConsumerInfo>> {
        self.consumers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// 按消费组查找
    pub fn find(&self, consumer_group: &str) -> Option<Arc<dyn ConsumerInfo>> {
        self.consumers()
            .into_iter()
            .find(|c| c.consumer_group() == consumer_group)
    }

    /// 运行中的消费者数
    pub fn running(&self) -> usize {
        self.consumers()
            .iter()
            .filter(|c| c.state() == ConsumerState::Running)
            .count()
    }

    /// 登记数
    pub fn len(&self) -> usize {
        self.consumers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
