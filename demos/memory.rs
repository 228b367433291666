use std::{collections::HashMap, sync::Arc};
use tracing::{Level, info};
use unimq::{
    ConsumerConfig, MessageExt, MessageHandler, Producer, PushConsumer, Subscriber,
    app::App,
    test_utils::{MemoryProducer, MemoryTransport, tagged},
};

struct OrderSubscriber;

impl MessageHandler for OrderSubscriber {
    fn consume_msg(&self, body: &[u8], msg: &MessageExt) -> bool {
        info!("收到订单消息 {}：{}", msg.msg_id, String::from_utf8_lossy(body));
        msg.msg_id != "o3"
    }
}

impl Subscriber for OrderSubscriber {
    fn consumer_group(&self) -> String {
        "order-group".to_owned()
    }

    fn subscribe_topic_tags(&self) -> HashMap<String, String> {
        HashMap::from([("order".to_owned(), "paid || created".to_owned())])
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_max_level(Level::DEBUG).init();
    let app = App::new();
    let transport = Arc::new(MemoryTransport::new());

    let consumer = Arc::new(PushConsumer::new(Arc::clone(&transport)));
    app.register_consumer(Arc::clone(&consumer));
    if let Err(e) = consumer
        .launch(Arc::new(OrderSubscriber), ConsumerConfig::default().with_delay_level(2))
        .await
    {
        info!("消费者启动失败：{e}");
        return;
    }

    let producer = Arc::new(Producer::new(MemoryProducer::new()));
    app.register_producer(Arc::clone(&producer));
    let outcome = producer
        .send(&unimq::Message::new("order", "o1").with_tags("paid"))
        .await;
    info!("发送结果：{outcome:?}");

    let status = transport.deliver(
        "order-group",
        vec![
            tagged("order", "o1", "paid"),
            tagged("order", "o2", "refunded"),
            tagged("order", "o3", "created"),
        ],
    );
    info!("批次消费状态：{status:?}");
    for c in app.registry().consumers() {
        info!("消费者 {} 状态 {}", c.consumer_group(), c.state());
    }

    app.shutdown().await;
}
