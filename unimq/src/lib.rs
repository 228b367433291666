//! # **unimq** 核心库
//!
//! 推送式消息消费框架：按消费组订阅主题，将批量消息分发给业务处理器，
//! 以并发或顺序两种模式把处理结果折算为批次的消费状态。
//!
//! 具体的消息中间件经由 [`transport::Transport`] 与 [`transport::ProducerTransport`] 接入。

#![warn(missing_docs)]

pub mod app;
pub mod config;
pub mod consumer;
pub mod errors;
pub mod identity;
pub mod listener;
pub mod message;
pub mod producer;
pub mod registry;
pub mod subscription;
pub mod transport;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{ConsumeFromWhere, ConsumeMode, ConsumerConfig, MessageModel};
pub use consumer::{ConsumerInfo, ConsumerState, PushConsumer};
pub use errors::{ConsumerError, TransportError};
pub use listener::{Listener, MessageHandler, Subscriber};
pub use message::{ConsumeStatus, Message, MessageExt, MessageQueue, SendResult, SendStatus};
pub use producer::{Producer, SendOutcome};
