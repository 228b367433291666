//! # 测试工具
//!
//! 内存传输层、内存生产者与记录型处理函数，供本库及下游实现的测试使用。

mod producer;
mod transport;

pub use producer::MemoryProducer;
pub use transport::{MemoryHandle, MemoryTransport};

use crate::{listener::MessageHandler, message::MessageExt};
use bytes::Bytes;
use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

/// 构造测试消息
pub fn message(topic: &str, msg_id: &str) -> MessageExt {
    MessageExt {
        msg_id: msg_id.to_owned(),
        topic: topic.to_owned(),
        tags: None,
        keys: None,
        queue_id: 0,
        queue_offset: 0,
        reconsume_times: 0,
        born_timestamp: 0,
        body: Bytes::from(msg_id.to_owned()),
        properties: HashMap::new(),
    }
}

/// 构造带标签的测试消息
pub fn tagged(topic: &str, msg_id: &str, tags: &str) -> MessageExt {
    MessageExt {
        tags: Some(tags.to_owned()),
        ..message(topic, msg_id)
    }
}

/// 记录调用顺序的处理函数
#[derive(Debug, Default)]
pub struct RecordingHandler {
    calls: Mutex<Vec<String>>,
    failures: HashSet<String>,
    panics: HashSet<String>,
}

impl RecordingHandler {
    /// 构造函数
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定消息处理返回失败
    pub fn fail_on(mut self, msg_id: &str) -> Self {
        self.failures.insert(msg_id.to_owned());
        self
    }

    /// 指定消息处理发生 panic
    pub fn panic_on(mut self, msg_id: &str) -> Self {
        self.panics.insert(msg_id.to_owned());
        self
    }

    /// 已处理的消息 Id
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl MessageHandler for RecordingHandler {
    fn consume_msg(&self, _body: &[u8], msg: &MessageExt) -> bool {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(msg.msg_id.clone());
        }
        if self.panics.contains(&msg.msg_id) {
            panic!("处理消息 {} 失败", msg.msg_id);
        }
        !self.failures.contains(&msg.msg_id)
    }
}
