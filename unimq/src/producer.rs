//! # 生产者
//!
//! 发送错误全部吸收为 [`SendOutcome`]，不向调用方传播。

use crate::{
    errors::TransportError,
    message::{Message, SendStatus},
    transport::ProducerTransport,
};
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, instrument};

/// 发送结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// 消息已存储
    Ok,
    /// 发送失败
    Failed(String),
}

impl SendOutcome {
    /// 是否发送成功
    pub fn is_ok(&self) -> bool {
        matches!(self, SendOutcome::Ok)
    }
}

/// 生产者包装
pub struct Producer<P: ProducerTransport> {
    transport: RwLock<Option<Arc<P>>>,
}

impl<P: ProducerTransport> Default for Producer<P> {
    fn default() -> Self {
        Self {
            transport: RwLock::new(None),
        }
    }
}

impl<P: ProducerTransport> Producer<P> {
    /// 构造函数
    pub fn new(transport: P) -> Self {
        Self {
            transport: RwLock::new(Some(Arc::new(transport))),
        }
    }

    /// 以共享的传输层构造
    pub fn from_arc(transport: Arc<P>) -> Self {
        Self {
            transport: RwLock::new(Some(transport)),
        }
    }

    /// 设置或替换传输层，已关闭的生产者可重新启用
    pub fn set_transport(&self, transport: P) {
        let mut slot = self.transport.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(Arc::new(transport));
    }

    fn transport(&self) -> Option<Arc<P>> {
        self.transport
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// 同步发送，仅当传输层返回已存储状态时成功
    #[instrument(name = "send_message", skip_all, fields(topic = %msg.topic))]
    pub async fn send(&self, msg: &Message) -> SendOutcome {
        let Some(transport) = self.transport() else {
            let e = TransportError::Closed;
            error!("发送消息失败：{e}");
            return SendOutcome::Failed(e.to_string());
        };
        match transport.send(msg).await {
            Ok(result) => {
                info!("{result}");
                match result.status {
                    SendStatus::SendOk => SendOutcome::Ok,
                    status => {
                        error!("发送消息未存储：{status:?}");
                        SendOutcome::Failed(format!("发送状态 {status:?}"))
                    }
                }
            }
            Err(e) => {
                error!("发送消息错误：{e}");
                SendOutcome::Failed(e.to_string())
            }
        }
    }

    /// 同步发送，返回是否成功
    pub async fn send_msg(&self, msg: &Message) -> bool {
        self.send(msg).await.is_ok()
    }

    /// 单向发送，错误只记录日志
    pub fn send_one_way(&self, msg: &Message) {
        match self.transport() {
            Some(transport) => {
                if let Err(e) = transport.send_one_way(msg) {
                    error!("单向发送消息错误：{e}");
                }
            }
            None => error!("单向发送消息失败：{}", TransportError::Closed),
        }
    }

    /// 关闭生产者，可重复调用
    pub async fn shutdown(&self) {
        let transport = {
            let mut slot = self.transport.write().unwrap_or_else(|e| e.into_inner());
            slot.take()
        };
        match transport {
            Some(transport) => {
                if let Err(e) = transport.shutdown().await {
                    error!("关闭生产者失败：{e}");
                }
                info!("生产者已关闭");
            }
            None => debug!("生产者未设置或已关闭，忽略关闭"),
        }
    }
}
