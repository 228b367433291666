use std::sync::Arc;
use tracing::{Level, error, info};
use unimq::{Message, Producer, app::app};
use unimq_kafka::KafkaProducer;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();
    let producer = match KafkaProducer::load() {
        Ok(p) => Arc::new(Producer::new(p)),
        Err(e) => {
            error!("创建 Kafka 生产者失败：{e}");
            return;
        }
    };
    let context = app().await;
    context.register_producer(Arc::clone(&producer));

    for i in 0..10 {
        let msg = Message::new("payment", format!("payment-{i}"))
            .with_tags("paid")
            .with_keys(format!("order-{}", i % 3))
            .with_property("seq", i.to_string());
        let outcome = producer.send(&msg).await;
        info!("第 {i} 条消息发送结果：{outcome:?}");
    }
    producer.send_one_way(&Message::new("payment", "one-way"));

    context.shutdown().await;
}
