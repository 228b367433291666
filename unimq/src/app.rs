//! # 应用上下文
//!
//! 持有进程内的消费者与生产者，创建时启动消费者，退出时统一关闭。

use crate::{
    config::ConsumerConfig,
    consumer::PushConsumer,
    errors::ConsumerError,
    listener::MessageHandler,
    producer::Producer,
    registry::ConsumerRegistry,
    transport::{ProducerTransport, Transport},
};
use std::{
    future::Future,
    pin::Pin,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::sync::OnceCell;
use tracing::{error, info};

/// 可关闭的资源
pub trait Teardown: Send + Sync {
    /// 关闭，可重复调用
    fn teardown(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

impl<T: Transport> Teardown for PushConsumer<T> {
    fn teardown(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(self.stop())
    }
}

impl<P: ProducerTransport> Teardown for Producer<P> {
    fn teardown(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(self.shutdown())
    }
}

static APP: OnceCell<Arc<App>> = OnceCell::const_new();
/// 进程级应用上下文，收到 Ctrl-C 信号时优雅关闭
pub async fn app() -> Arc<App> {
    Arc::clone(
        APP.get_or_init(|| async {
            let app = App::new();
            let app_clone = Arc::clone(&app);
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(_) => info!("收到 Ctrl-C 信号"),
                    Err(e) => {
                        error!("监听 Ctrl-C 信号失败: {e}");
                        info!("启用备用关闭机制");
                    }
                }
                app_clone.shutdown().await;
            });
            app
        })
        .await,
    )
}

/// 应用上下文结构
#[derive(Default)]
pub struct App {
    initiated: AtomicBool,
    closed: OnceCell<()>,
    consumers: Mutex<Vec<Arc<dyn Teardown>>>,
    producers: Mutex<Vec<Arc<dyn Teardown>>>,
    registry: ConsumerRegistry,
}

impl App {
    /// 构造函数
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 登记消费者，退出时关闭
    pub fn register_consumer<T: Transport>(&self, consumer: Arc<PushConsumer<T>>) {
        self.registry.register(consumer.clone());
        lock(&self.consumers).push(consumer);
    }

    /// 登记并启动消费者
    pub async fn start_consumer<T: Transport>(
        &self,
        consumer: Arc<PushConsumer<T>>,
        config: ConsumerConfig,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), ConsumerError> {
        self.register_consumer(Arc::clone(&consumer));
        consumer.start(config, handler).await.inspect_err(|e| {
            error!("启动消费者失败（{}）：{e}", e.as_label());
        })
    }

    /// 登记生产者，退出时关闭
    pub fn register_producer<P: ProducerTransport>(&self, producer: Arc<Producer<P>>) {
        lock(&self.producers).push(producer);
    }

    /// 消费者注册表
    pub fn registry(&self) -> &ConsumerRegistry {
        &self.registry
    }

    /// 是否已开始关闭
    pub fn is_shutdown(&self) -> bool {
        self.initiated.load(Ordering::SeqCst)
    }

    /// 优雅关闭：先停止全部消费者，再关闭全部生产者
    ///
    /// 并发调用者等待同一次关闭完成。
    pub async fn shutdown(&self) {
        self.initiated.store(true, Ordering::SeqCst);
        self.closed
            .get_or_init(|| async {
                info!("开始优雅退出");
                let consumers = lock(&self.consumers).clone();
                for consumer in consumers {
                    consumer.teardown().await;
                }
                let producers = lock(&self.producers).clone();
                for producer in producers {
                    producer.teardown().await;
                }
                info!("优雅退出所有消费者与生产者");
            })
            .await;
    }
}

fn lock(list: &Mutex<Vec<Arc<dyn Teardown>>>) -> std::sync::MutexGuard<'_, Vec<Arc<dyn Teardown>>> {
    list.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        consumer::{ConsumerInfo, ConsumerState},
        test_utils::{MemoryProducer, MemoryTransport, RecordingHandler},
    };

    #[tokio::test]
    async fn shutdown_stops_everything_once() {
        let transport = Arc::new(MemoryTransport::new());
        let app = App::new();
        let consumer = Arc::new(PushConsumer::new(Arc::clone(&transport)));
        let idle = Arc::new(PushConsumer::new(Arc::clone(&transport)));
        let sender = Arc::new(MemoryProducer::new());
        let producer = Arc::new(Producer::from_arc(Arc::clone(&sender)));

        app.start_consumer(
            Arc::clone(&consumer),
            ConsumerConfig::new("g-app").subscribe("order", "*"),
            Arc::new(RecordingHandler::new()),
        )
        .await
        .unwrap();
        app.register_consumer(Arc::clone(&idle));
        app.register_producer(Arc::clone(&producer));
        assert_eq!(app.registry().running(), 1);

        app.shutdown().await;
        app.shutdown().await;

        assert!(app.is_shutdown());
        assert_eq!(consumer.state(), ConsumerState::Stopped);
        assert_eq!(idle.state(), ConsumerState::Stopped);
        assert!(!transport.is_subscribed("g-app"));
        assert_eq!(transport.shutdowns(), 1);
        assert_eq!(sender.shutdowns(), 1);
    }

    #[tokio::test]
    async fn concurrent_shutdown_waits_for_completion() {
        let transport = Arc::new(MemoryTransport::new());
        let app = App::new();
        let consumer = Arc::new(PushConsumer::new(Arc::clone(&transport)));
        app.start_consumer(
            Arc::clone(&consumer),
            ConsumerConfig::new("g-join").subscribe("order", "*"),
            Arc::new(RecordingHandler::new()),
        )
        .await
        .unwrap();

        tokio::join!(app.shutdown(), app.shutdown());

        assert_eq!(consumer.state(), ConsumerState::Stopped);
        assert_eq!(transport.shutdowns(), 1);
    }

    #[tokio::test]
    async fn failed_start_still_torn_down() {
        let transport = Arc::new(MemoryTransport::new());
        let app = App::new();
        let consumer = Arc::new(PushConsumer::new(Arc::clone(&transport)));

        let err = app
            .start_consumer(
                Arc::clone(&consumer),
                ConsumerConfig::new("").subscribe("order", "*"),
                Arc::new(RecordingHandler::new()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ConsumerError::InvalidConfig(_)));

        app.shutdown().await;
        assert_eq!(consumer.state(), ConsumerState::Stopped);
    }
}
