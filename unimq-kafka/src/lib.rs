//! # **unimq** 的 Kafka 实现
//!
//! 以 Kafka 分区作为消息队列，消息头携带标签与重新消费次数。

pub(crate) mod dispatch;

pub mod config;
pub mod errors;
pub mod mapping;
pub mod producer;
pub mod retry;
pub mod transport;

pub use config::KafkaConfig;
pub use producer::KafkaProducer;
pub use transport::{KafkaHandle, KafkaTransport};
