use crate::{
    errors::TransportError,
    listener::Listener,
    message::{ConsumeStatus, MessageExt},
    transport::{PushSettings, SubscriptionHandle, ThreadBounds, Transport},
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::debug;

#[derive(Default)]
struct Inner {
    active: HashMap<String, (PushSettings, Listener)>,
    fail_next: Option<String>,
    shutdowns: usize,
}

/// 内存传输层
///
/// 同一消费组同时只允许一个运行中的订阅，批次由测试通过 [`MemoryTransport::deliver`] 投递。
#[derive(Clone)]
pub struct MemoryTransport {
    defaults: ThreadBounds,
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    /// 构造函数，默认线程数范围为 20..=20
    pub fn new() -> Self {
        Self::with_defaults(ThreadBounds { min: 20, max: 20 })
    }

    /// 指定默认线程数范围
    pub fn with_defaults(defaults: ThreadBounds) -> Self {
        Self {
            defaults,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 令下一次订阅失败
    pub fn fail_next_subscribe(&self, reason: &str) {
        self.lock().fail_next = Some(reason.to_owned());
    }

    /// 指定消费组是否存在运行中的订阅
    pub fn is_subscribed(&self, group: &str) -> bool {
        self.lock().active.contains_key(group)
    }

    /// 指定消费组的订阅参数
    pub fn settings(&self, group: &str) -> Option<PushSettings> {
        self.lock().active.get(group).map(|(s, _)| s.clone())
    }

    /// 已关闭的订阅数
    pub fn shutdowns(&self) -> usize {
        self.lock().shutdowns
    }

    /// 向指定消费组投递一个批次
    ///
    /// 按订阅过滤消息，无可投递消息或消费组未订阅时返回 `None`。
    pub fn deliver(&self, group: &str, msgs: Vec<MessageExt>) -> Option<ConsumeStatus> {
        let (settings, listener) = self.lock().active.get(group).cloned()?;
        let batch: Vec<MessageExt> = msgs
            .into_iter()
            .filter(|m| settings.accepts(&m.topic, m.tags.as_deref()))
            .collect();
        let queue = batch.first()?.queue();
        debug!("向消费组 {group} 投递 {} 条消息", batch.len());
        Some(listener.consume(&batch, &queue))
    }
}

impl Transport for MemoryTransport {
    type Handle = MemoryHandle;

    fn default_thread_bounds(&self) -> ThreadBounds {
        self.defaults
    }

    async fn subscribe(
        &self,
        settings: PushSettings,
        listener: Listener,
    ) -> Result<MemoryHandle, TransportError> {
        let mut inner = self.lock();
        if let Some(reason) = inner.fail_next.take() {
            return Err(TransportError::Client(reason));
        }
        let group = settings.consumer_group.clone();
        if inner.active.contains_key(&group) {
            return Err(TransportError::DuplicateGroup(group));
        }
        inner.active.insert(group.clone(), (settings, listener));
        Ok(MemoryHandle {
            group,
            inner: Arc::clone(&self.inner),
        })
    }
}

/// 内存订阅句柄
pub struct MemoryHandle {
    group: String,
    inner: Arc<Mutex<Inner>>,
}

impl SubscriptionHandle for MemoryHandle {
    async fn shutdown(self) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.active.remove(&self.group);
        inner.shutdowns += 1;
        Ok(())
    }
}
