mod common;
use common::*;
use std::sync::{Arc, Mutex};
use tokio::time::{Duration, Instant, sleep};
use unimq::{
    ConsumeMode, ConsumerConfig, Message, MessageExt, Producer, PushConsumer,
    config::ConsumeFromWhere, errors::ConsumerError,
};
use unimq_kafka::{KafkaConfig, KafkaProducer, KafkaTransport};

fn topic(name: &str) -> String {
    format!("unimq-test-{name}-{}", std::process::id())
}

#[tokio::test]
#[ignore = "需要 Kafka 集群"]
async fn produce_then_consume_in_order() {
    let cfg = KafkaConfig::from_config(&CFG).unwrap();
    let topic = topic("order");
    let producer = Producer::new(KafkaProducer::new(&cfg).unwrap());
    for i in 0..5 {
        let msg = Message::new(&topic, format!("body-{i}"))
            .with_tags(if i % 2 == 0 { "paid" } else { "created" })
            .with_keys("order-1");
        assert!(producer.send_msg(&msg).await);
    }

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let handler = move |body: &[u8], _msg: &MessageExt| {
        sink.lock()
            .unwrap()
            .push(String::from_utf8_lossy(body).into_owned());
        true
    };
    let consumer = PushConsumer::new(Arc::new(KafkaTransport::new(cfg)));
    let config = ConsumerConfig::new(format!("{topic}-group"))
        .subscribe(&topic, "paid")
        .with_consume_mode(ConsumeMode::Orderly)
        .with_consume_from_where(ConsumeFromWhere::ConsumeFromFirstOffset);
    consumer.start(config, Arc::new(handler)).await.unwrap();

    let deadline = Instant::now() + Duration::from_secs(30);
    while received.lock().unwrap().len() < 3 && Instant::now() < deadline {
        sleep(Duration::from_millis(200)).await;
    }
    consumer.stop().await;
    producer.shutdown().await;

    assert_eq!(
        *received.lock().unwrap(),
        vec!["body-0", "body-2", "body-4"]
    );
}

#[tokio::test]
#[ignore = "需要 Kafka 集群"]
async fn same_group_rejected_within_transport() {
    let transport = Arc::new(KafkaTransport::new(KafkaConfig::from_config(&CFG).unwrap()));
    let topic = topic("dup");
    let handler = |_: &[u8], _: &MessageExt| true;
    let first = PushConsumer::new(Arc::clone(&transport));
    let second = PushConsumer::new(Arc::clone(&transport));
    let config = ConsumerConfig::new(format!("{topic}-group")).subscribe(&topic, "*");

    first.start(config.clone(), Arc::new(handler)).await.unwrap();
    let err = second.start(config, Arc::new(handler)).await.unwrap_err();
    assert!(matches!(err, ConsumerError::DuplicateGroup(_)));

    first.stop().await;
}
