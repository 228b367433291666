use std::{collections::HashMap, sync::Arc};
use tracing::{Level, error, info};
use unimq::{ConsumeMode, ConsumerConfig, MessageExt, MessageHandler, PushConsumer, Subscriber, app::app};
use unimq_kafka::KafkaTransport;

struct PaymentSubscriber;

impl MessageHandler for PaymentSubscriber {
    fn consume_msg(&self, body: &[u8], msg: &MessageExt) -> bool {
        info!(
            "队列 {} 偏移 {} 第 {} 次消费：{}",
            msg.queue(),
            msg.queue_offset,
            msg.reconsume_times,
            String::from_utf8_lossy(body)
        );
        !body.is_empty()
    }
}

impl Subscriber for PaymentSubscriber {
    fn consumer_group(&self) -> String {
        "payment-group".to_owned()
    }

    fn subscribe_topic_tags(&self) -> HashMap<String, String> {
        HashMap::from([("payment".to_owned(), "*".to_owned())])
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();
    let transport = match KafkaTransport::load() {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            error!("加载 Kafka 配置失败：{e}");
            return;
        }
    };

    let context = app().await;
    let consumer = Arc::new(PushConsumer::new(transport));
    context.register_consumer(Arc::clone(&consumer));
    let config = ConsumerConfig::default()
        .with_consume_mode(ConsumeMode::Orderly)
        .with_suspend_millis(2000)
        .with_batch_max_size(8);
    if let Err(e) = consumer.launch(Arc::new(PaymentSubscriber), config).await {
        error!("消费者启动失败：{e}");
        return;
    }

    info!("按 Ctrl-C 退出");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("监听 Ctrl-C 信号失败: {e}");
    }
    context.shutdown().await;
}
