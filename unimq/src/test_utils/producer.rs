use crate::{
    errors::TransportError,
    message::{Message, MessageQueue, SendResult, SendStatus},
    transport::ProducerTransport,
};
use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};
use uuid::Uuid;

/// 内存生产者
///
/// 按预设顺序返回发送结果，未预设时返回 `SendOk`。
#[derive(Default)]
pub struct MemoryProducer {
    scripted: Mutex<VecDeque<Result<SendStatus, String>>>,
    sent: Mutex<Vec<Message>>,
    one_way: Mutex<Vec<Message>>,
    fail_one_way: AtomicBool,
    shutdowns: AtomicUsize,
}

impl MemoryProducer {
    /// 构造函数
    pub fn new() -> Self {
        Self::default()
    }

    /// 预设下一次发送的状态
    pub fn then_status(self, status: SendStatus) -> Self {
        if let Ok(mut s) = self.scripted.lock() {
            s.push_back(Ok(status));
        }
        self
    }

    /// 预设下一次发送的错误
    pub fn then_error(self, reason: &str) -> Self {
        if let Ok(mut s) = self.scripted.lock() {
            s.push_back(Err(reason.to_owned()));
        }
        self
    }

    /// 令单向发送失败
    pub fn failing_one_way(self) -> Self {
        self.fail_one_way.store(true, Ordering::SeqCst);
        self
    }

    /// 同步发送过的消息
    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// 单向发送过的消息
    pub fn one_way(&self) -> Vec<Message> {
        self.one_way.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// 关闭次数
    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

impl ProducerTransport for MemoryProducer {
    async fn send(&self, msg: &Message) -> Result<SendResult, TransportError> {
        let next = self
            .scripted
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or(Ok(SendStatus::SendOk));
        let status = next.map_err(TransportError::Send)?;
        let offset = match self.sent.lock() {
            Ok(mut sent) => {
                sent.push(msg.clone());
                sent.len() as i64 - 1
            }
            Err(_) => -1,
        };
        Ok(SendResult {
            status,
            msg_id: Uuid::new_v4().simple().to_string(),
            queue: MessageQueue {
                topic: msg.topic.clone(),
                queue_id: 0,
            },
            queue_offset: offset,
        })
    }

    fn send_one_way(&self, msg: &Message) -> Result<(), TransportError> {
        if self.fail_one_way.load(Ordering::SeqCst) {
            return Err(TransportError::Send("单向发送失败".to_owned()));
        }
        if let Ok(mut one_way) = self.one_way.lock() {
            one_way.push(msg.clone());
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
