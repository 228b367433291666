//! # Kafka 生产者传输层

use crate::{config::KafkaConfig, errors::ClientError, mapping::message_headers};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer, future_producer::Delivery};
use tokio::time::Duration;
use tracing::{debug, info};
use unimq::{
    errors::TransportError,
    message::{Message, MessageQueue, SendResult, SendStatus},
    transport::ProducerTransport,
};

/// Kafka 生产者
pub struct KafkaProducer {
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaProducer {
    /// 构造函数
    pub fn new(config: &KafkaConfig) -> Result<Self, ClientError> {
        let producer = config.producer_config().create()?;
        info!("成功创建 Kafka 生产者");
        Ok(Self {
            producer,
            timeout: config.timeout(),
        })
    }

    /// 以本包配置目录中的配置构造
    pub fn load() -> Result<Self, ClientError> {
        Self::new(&KafkaConfig::load()?)
    }
}

fn record(msg: &Message) -> FutureRecord<'_, str, [u8]> {
    let record = FutureRecord::to(&msg.topic)
        .payload(&msg.body[..])
        .headers(message_headers(msg));
    match &msg.keys {
        Some(keys) => record.key(keys.as_str()),
        None => record,
    }
}

impl ProducerTransport for KafkaProducer {
    async fn send(&self, msg: &Message) -> Result<SendResult, TransportError> {
        let Delivery {
            partition,
            offset,
            timestamp: _,
        } = self
            .producer
            .send(record(msg), self.timeout)
            .await
            .map_err(|(e, _)| TransportError::Send(e.to_string()))?;
        debug!("消息写到主题 {} 分区 {partition} 偏移 {offset}", msg.topic);
        Ok(SendResult {
            status: SendStatus::SendOk,
            msg_id: format!("{}-{partition}-{offset}", msg.topic),
            queue: MessageQueue {
                topic: msg.topic.clone(),
                queue_id: partition,
            },
            queue_offset: offset,
        })
    }

    fn send_one_way(&self, msg: &Message) -> Result<(), TransportError> {
        self.producer
            .send_result(record(msg))
            .map(|_| ())
            .map_err(|(e, _)| TransportError::Send(e.to_string()))
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        let producer = self.producer.clone();
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(|e| TransportError::Shutdown(e.to_string()))?
            .map_err(|e| TransportError::Shutdown(e.to_string()))?;
        info!("Kafka 生产者已刷出全部消息");
        Ok(())
    }
}
