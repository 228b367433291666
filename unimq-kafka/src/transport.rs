//! # Kafka 推送式消费传输层

use crate::{
    config::KafkaConfig,
    dispatch::{Dispatcher, Outlet, Router},
    errors::ClientError,
    mapping::{dead_letter_headers, retry_headers, to_message_ext},
};
use rdkafka::{
    ClientConfig, ClientContext,
    consumer::{BaseConsumer, CommitMode, Consumer, ConsumerContext, Rebalance, StreamConsumer},
    message::OwnedHeaders,
    producer::{FutureProducer, FutureRecord},
};
use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};
use tokio::{
    sync::{Notify, mpsc, watch},
    task::JoinHandle,
    time::Duration,
};
use tracing::{debug, error, info, instrument, warn};
use unimq::{
    config::{ConsumeFromWhere, ConsumeMode, MessageModel},
    errors::TransportError,
    listener::Listener,
    message::{MessageExt, MessageQueue},
    transport::{PushSettings, SubscriptionHandle, ThreadBounds, Transport},
};

/// Kafka 传输层
///
/// 同一消费组只允许一个运行中的订阅，该约束仅在同一个 `KafkaTransport` 实例内生效；
/// 进程内的多个实例之间互不检查，应在进程内共享同一个实例。
pub struct KafkaTransport {
    config: KafkaConfig,
    groups: Arc<Mutex<HashSet<String>>>,
}

impl KafkaTransport {
    /// 构造函数
    pub fn new(config: KafkaConfig) -> Self {
        Self {
            config,
            groups: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// 以本包配置目录中的配置构造
    pub fn load() -> Result<Self, ClientError> {
        Ok(Self::new(KafkaConfig::load()?))
    }

    fn consumer_config(&self, settings: &PushSettings) -> ClientConfig {
        let mut config = self.config.consumer_config();
        config
            .set("group.id", group_id(settings))
            .set("client.id", &settings.instance_name)
            .set("auto.offset.reset", offset_reset(settings.consume_from_where))
            .set("enable.auto.offset.store", "false");
        config
    }
}

/// 集群消费共用消费组；广播消费每个实例独占一个消费组
pub(crate) fn group_id(settings: &PushSettings) -> String {
    match settings.message_model {
        MessageModel::Clustering => settings.consumer_group.clone(),
        MessageModel::Broadcasting => {
            format!("{}-{}", settings.consumer_group, settings.instance_name)
        }
    }
}

pub(crate) fn offset_reset(from_where: ConsumeFromWhere) -> &'static str {
    match from_where {
        ConsumeFromWhere::ConsumeFromLastOffset => "latest",
        ConsumeFromWhere::ConsumeFromFirstOffset => "earliest",
        ConsumeFromWhere::ConsumeFromTimestamp => {
            warn!("Kafka 不支持按时间戳确定起始位置，改为从最早偏移量开始");
            "earliest"
        }
    }
}

/// 死信主题
pub fn dead_letter_topic(consumer_group: &str) -> String {
    format!("{consumer_group}.DLQ")
}

/// 并发消费的重试主题，按实际使用的 `group.id` 区分
pub fn retry_topic(group_id: &str) -> String {
    format!("{group_id}.RETRY")
}

/// 分区回收时通知接收循环停止对应的消费任务
pub(crate) struct RebalanceContext {
    revoked: mpsc::UnboundedSender<Vec<MessageQueue>>,
}

impl ClientContext for RebalanceContext {}

impl ConsumerContext for RebalanceContext {
    fn pre_rebalance(&self, _consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Revoke(partitions) => {
                let queues: Vec<_> = partitions
                    .elements()
                    .iter()
                    .map(|p| MessageQueue {
                        topic: p.topic().to_owned(),
                        queue_id: p.partition(),
                    })
                    .collect();
                info!("回收分区 {queues:?}");
                if self.revoked.send(queues).is_err() {
                    debug!("接收循环已退出，忽略分区回收");
                }
            }
            Rebalance::Assign(partitions) => info!("分配分区数 {}", partitions.count()),
            Rebalance::Error(e) => error!("分区再均衡错误：{e}"),
        }
    }
}

type RebalanceConsumer = StreamConsumer<RebalanceContext>;

struct GroupRegistration {
    group: String,
    groups: Arc<Mutex<HashSet<String>>>,
}

impl GroupRegistration {
    fn acquire(groups: &Arc<Mutex<HashSet<String>>>, group: &str) -> Result<Self, TransportError> {
        let mut active = groups.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(group.to_owned()) {
            return Err(TransportError::DuplicateGroup(group.to_owned()));
        }
        Ok(Self {
            group: group.to_owned(),
            groups: Arc::clone(groups),
        })
    }
}

impl Drop for GroupRegistration {
    fn drop(&mut self) {
        let mut active = self.groups.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.group);
    }
}

struct KafkaOutlet {
    consumer: Arc<RebalanceConsumer>,
    producer: FutureProducer,
    retry_topic: String,
    dlq_topic: String,
    timeout: Duration,
}

impl KafkaOutlet {
    async fn publish(
        &self,
        topic: &str,
        msg: &MessageExt,
        headers: OwnedHeaders,
    ) -> Result<(), TransportError> {
        let mut record = FutureRecord::<str, [u8]>::to(topic)
            .payload(&msg.body[..])
            .headers(headers);
        if let Some(keys) = &msg.keys {
            record = record.key(keys.as_str());
        }
        self.producer
            .send(record, self.timeout)
            .await
            .map(|_| ())
            .map_err(|(e, _)| ClientError::from(e).into())
    }
}

impl Outlet for KafkaOutlet {
    fn store(&self, queue: &MessageQueue, offset: i64) {
        if let Err(e) = self
            .consumer
            .store_offset(&queue.topic, queue.queue_id, offset)
        {
            warn!("存储队列 {queue} 的偏移量 {offset} 失败：{e}");
        }
    }

    async fn retry(&self, msgs: &[MessageExt], due_at: i64) -> Result<(), TransportError> {
        for msg in msgs {
            self.publish(&self.retry_topic, msg, retry_headers(msg, due_at))
                .await?;
            debug!("消息 {} 已转入重试主题 {}", msg.msg_id, self.retry_topic);
        }
        Ok(())
    }

    async fn dead_letter(&self, msgs: &[MessageExt]) -> Result<(), TransportError> {
        for msg in msgs {
            self.publish(&self.dlq_topic, msg, dead_letter_headers(msg))
                .await?;
            warn!("消息 {} 已转入死信主题 {}", msg.msg_id, self.dlq_topic);
        }
        Ok(())
    }
}

impl Transport for KafkaTransport {
    type Handle = KafkaHandle;

    fn default_thread_bounds(&self) -> ThreadBounds {
        self.config.thread_bounds()
    }

    #[instrument(name = "kafka_subscribe", skip_all, fields(consumer_group = %settings.consumer_group))]
    async fn subscribe(
        &self,
        settings: PushSettings,
        listener: Listener,
    ) -> Result<KafkaHandle, TransportError> {
        let registration = GroupRegistration::acquire(&self.groups, &settings.consumer_group)?;
        let (revoked_tx, revoked_rx) = mpsc::unbounded_channel();
        let consumer: RebalanceConsumer = self
            .consumer_config(&settings)
            .create_with_context(RebalanceContext {
                revoked: revoked_tx,
            })
            .map_err(ClientError::from)?;
        let retry_topic = retry_topic(&group_id(&settings));
        let mut topics = settings.topics();
        if listener.mode() == ConsumeMode::Concurrently {
            topics.push(&retry_topic);
        }
        consumer.subscribe(&topics).map_err(ClientError::from)?;
        let producer: FutureProducer = self
            .config
            .producer_config()
            .create()
            .map_err(ClientError::from)?;
        info!("成功订阅主题 {topics:?}");

        let consumer = Arc::new(consumer);
        let outlet = KafkaOutlet {
            consumer: Arc::clone(&consumer),
            producer,
            retry_topic,
            dlq_topic: dead_letter_topic(&settings.consumer_group),
            timeout: self.config.timeout(),
        };
        let dispatcher = Arc::new(Dispatcher::new(listener, settings, outlet));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ready = Arc::new(Notify::new());
        let task = tokio::spawn(receive(
            Arc::clone(&consumer),
            dispatcher,
            shutdown_rx,
            revoked_rx,
            Arc::clone(&ready),
        ));
        ready.notified().await;

        Ok(KafkaHandle {
            consumer,
            shutdown_tx,
            task,
            _registration: registration,
        })
    }
}

async fn receive(
    consumer: Arc<RebalanceConsumer>,
    dispatcher: Arc<Dispatcher<KafkaOutlet>>,
    mut shutdown: watch::Receiver<bool>,
    mut revoked: mpsc::UnboundedReceiver<Vec<MessageQueue>>,
    ready: Arc<Notify>,
) {
    let mut router = Router::new(dispatcher, shutdown.clone());
    ready.notify_one();
    loop {
        tokio::select! {
            biased;
            _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => {
                info!("收到关闭信号，开始优雅退出");
                break;
            }
            Some(queues) = revoked.recv() => router.revoke(&queues),
            data = async { consumer.recv().await.map(|msg| to_message_ext(&msg)) } => match data {
                Ok(msg) => router.route(msg).await,
                Err(e) => error!("消息错误：{e}"),
            }
        }
    }
    router.close().await;
}

/// Kafka 订阅句柄
pub struct KafkaHandle {
    consumer: Arc<RebalanceConsumer>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
    _registration: GroupRegistration,
}

impl SubscriptionHandle for KafkaHandle {
    async fn shutdown(self) -> Result<(), TransportError> {
        self.shutdown_tx.send_replace(true);
        self.task
            .await
            .map_err(|e| TransportError::Shutdown(e.to_string()))?;

        let consumer = Arc::clone(&self.consumer);
        let committed =
            tokio::task::spawn_blocking(move || consumer.commit_consumer_state(CommitMode::Sync))
                .await
                .map_err(|e| TransportError::Shutdown(e.to_string()))?;
        match committed {
            Ok(()) => debug!("已提交存储的偏移量"),
            Err(e) => warn!("提交偏移量失败：{e}"),
        }
        self.consumer.unsubscribe();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unimq::subscription::{Subscription, SubscriptionExpr};

    fn settings(model: MessageModel) -> PushSettings {
        PushSettings {
            consumer_group: "g-order".to_owned(),
            instance_name: "pid7_index3".to_owned(),
            subscriptions: vec![Subscription {
                topic: "order".to_owned(),
                expr: SubscriptionExpr::All,
            }],
            threads: ThreadBounds { min: 1, max: 4 },
            consume_from_where: ConsumeFromWhere::ConsumeFromLastOffset,
            message_model: model,
            batch_max_size: 1,
            max_reconsume_times: -1,
        }
    }

    #[test]
    fn group_id_by_message_model() {
        assert_eq!(group_id(&settings(MessageModel::Clustering)), "g-order");
        assert_eq!(
            group_id(&settings(MessageModel::Broadcasting)),
            "g-order-pid7_index3"
        );
    }

    #[test]
    fn offset_reset_by_start_position() {
        assert_eq!(offset_reset(ConsumeFromWhere::ConsumeFromLastOffset), "latest");
        assert_eq!(offset_reset(ConsumeFromWhere::ConsumeFromFirstOffset), "earliest");
        assert_eq!(offset_reset(ConsumeFromWhere::ConsumeFromTimestamp), "earliest");
    }

    #[test]
    fn consumer_config_overrides() {
        let transport = KafkaTransport::new(KafkaConfig::default());
        let config = transport.consumer_config(&settings(MessageModel::Clustering));
        assert_eq!(config.get("group.id"), Some("g-order"));
        assert_eq!(config.get("client.id"), Some("pid7_index3"));
        assert_eq!(config.get("enable.auto.offset.store"), Some("false"));
        assert_eq!(config.get("bootstrap.servers"), Some("localhost:9092"));
        assert_eq!(transport.default_thread_bounds(), ThreadBounds { min: 20, max: 64 });
    }

    #[test]
    fn group_registration_released_on_drop() {
        let groups = Arc::new(Mutex::new(HashSet::new()));
        let first = GroupRegistration::acquire(&groups, "g").unwrap();
        assert!(matches!(
            GroupRegistration::acquire(&groups, "g"),
            Err(TransportError::DuplicateGroup(_))
        ));
        drop(first);
        assert!(GroupRegistration::acquire(&groups, "g").is_ok());
    }

    #[test]
    fn dead_letter_topic_per_group() {
        assert_eq!(dead_letter_topic("g-order"), "g-order.DLQ");
    }

    #[test]
    fn retry_topic_per_group_id() {
        let clustering = settings(MessageModel::Clustering);
        let broadcasting = settings(MessageModel::Broadcasting);
        assert_eq!(retry_topic(&group_id(&clustering)), "g-order.RETRY");
        assert_eq!(
            retry_topic(&group_id(&broadcasting)),
            "g-order-pid7_index3.RETRY"
        );
    }

    #[test]
    fn revoked_partitions_forwarded() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let context = RebalanceContext { revoked: tx };
        let consumer: BaseConsumer<RebalanceContext> = ClientConfig::new()
            .set("group.id", "g-order")
            .create_with_context(RebalanceContext {
                revoked: mpsc::unbounded_channel().0,
            })
            .unwrap();
        let mut partitions = rdkafka::TopicPartitionList::new();
        partitions.add_partition("order", 2);

        context.pre_rebalance(&consumer, &Rebalance::Revoke(&partitions));

        let queues = rx.try_recv().unwrap();
        assert_eq!(
            queues,
            vec![MessageQueue {
                topic: "order".to_owned(),
                queue_id: 2,
            }]
        );
    }
}
