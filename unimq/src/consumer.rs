//! # 推送式消费者
//!
//! 生命周期：`NotStarted → Running → Stopped`，`Stopped` 为终态。

use crate::{
    config::{ConsumeMode, ConsumerConfig},
    errors::ConsumerError,
    identity::unique_instance_name,
    listener::{Listener, MessageHandler, Subscriber},
    subscription::{Subscription, SubscriptionExpr},
    transport::{PushSettings, SubscriptionHandle, ThreadBounds, Transport},
};
use std::{
    fmt,
    sync::{Arc, RwLock},
};
use tokio::sync::Mutex;
use tracing::{Span, debug, error, info, instrument};
use validator::Validate;

/// 消费者状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// 未启动
    NotStarted,
    /// 运行中
    Running,
    /// 已停止
    Stopped,
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsumerState::NotStarted => write!(f, "未启动"),
            ConsumerState::Running => write!(f, "运行中"),
            ConsumerState::Stopped => write!(f, "已停止"),
        }
    }
}

/// 消费者只读信息，供注册表查看
pub trait ConsumerInfo: Send + Sync {
    /// 消费组，启动前为空
    fn consumer_group(&self) -> String;
    /// 实例名称，启动前为空
    fn instance_name(&self) -> Option<String>;
    /// 消费模式，启动前为空
    fn consume_mode(&self) -> Option<ConsumeMode>;
    /// 当前状态
    fn state(&self) -> ConsumerState;
}

enum Lifecycle<H> {
    NotStarted,
    Running(H),
    Stopped,
}

#[derive(Debug, Clone)]
struct Snapshot {
    state: ConsumerState,
    consumer_group: String,
    instance_name: Option<String>,
    consume_mode: Option<ConsumeMode>,
}

/// 推送式消费者
///
/// 独占一个订阅句柄与一个分发策略，句柄仅在关闭时释放一次。
pub struct PushConsumer<T: Transport> {
    transport: Arc<T>,
    lifecycle: Mutex<Lifecycle<T::Handle>>,
    snapshot: RwLock<Snapshot>,
}

impl<T: Transport> PushConsumer<T> {
    /// 构造函数，多个消费者可共享同一传输层客户端
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            lifecycle: Mutex::new(Lifecycle::NotStarted),
            snapshot: RwLock::new(Snapshot {
                state: ConsumerState::NotStarted,
                consumer_group: String::new(),
                instance_name: None,
                consume_mode: None,
            }),
        }
    }

    /// 启动消费者
    #[instrument(name = "start_consumer", skip_all, fields(consumer_group = %config.consumer_group, instance_name))]
    pub async fn start(
        &self,
        config: ConsumerConfig,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), ConsumerError> {
        let mut lifecycle = self.lifecycle.lock().await;
        match *lifecycle {
            Lifecycle::Running(_) => {
                return Err(ConsumerError::AlreadyStarted(config.consumer_group));
            }
            Lifecycle::Stopped => {
                return Err(ConsumerError::Terminated(config.consumer_group));
            }
            Lifecycle::NotStarted => {}
        }

        if config.consumer_group.trim().is_empty() {
            return Err(ConsumerError::InvalidConfig(
                "属性'consumer_group'不能为空".to_owned(),
            ));
        }
        config.validate()?;
        let subscriptions = parse_subscriptions(&config)?;

        let threads = ThreadBounds::resolve(
            self.transport.default_thread_bounds(),
            config.consume_thread_min,
            config.consume_thread_max,
        );
        let instance_name = unique_instance_name();
        Span::current().record("instance_name", instance_name.as_str());
        debug!("消费线程数范围 {}..={}", threads.min, threads.max);

        let listener = Listener::select(&config, handler);
        let mode = listener.mode();
        let settings = PushSettings::new(&config, instance_name.clone(), subscriptions, threads);
        let handle = self.transport.subscribe(settings, listener).await?;
        *lifecycle = Lifecycle::Running(handle);

        self.update(|s| {
            s.state = ConsumerState::Running;
            s.consumer_group = config.consumer_group.clone();
            s.instance_name = Some(instance_name);
            s.consume_mode = Some(mode);
        });
        info!("消费者启动成功，消费模式 {mode:?}");
        Ok(())
    }

    /// 以订阅者提供的消费组与订阅启动消费者
    pub async fn launch<S: Subscriber>(
        &self,
        subscriber: Arc<S>,
        config: ConsumerConfig,
    ) -> Result<(), ConsumerError> {
        let config = ConsumerConfig {
            consumer_group: subscriber.consumer_group(),
            subscriptions: subscriber.subscribe_topic_tags(),
            ..config
        };
        self.start(config, subscriber).await
    }

    /// 停止消费者
    ///
    /// 未运行时为空操作；关闭失败只记录日志，状态仍转为 `Stopped`。
    #[instrument(name = "stop_consumer", skip_all, fields(consumer_group = %self.consumer_group()))]
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Running(handle) => {
                if let Err(e) = handle.shutdown().await {
                    error!("关闭订阅失败：{e}");
                }
                info!("消费者已关闭");
            }
            Lifecycle::NotStarted => debug!("消费者未启动，直接置为已停止"),
            Lifecycle::Stopped => debug!("消费者已停止，忽略重复关闭"),
        }
        self.update(|s| s.state = ConsumerState::Stopped);
    }

    fn update(&self, f: impl FnOnce(&mut Snapshot)) {
        let mut snapshot = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
        f(&mut snapshot);
    }

    fn snapshot(&self) -> Snapshot {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl<T: Transport> ConsumerInfo for PushConsumer<T> {
    fn consumer_group(&self) -> String {
        self.snapshot().consumer_group
    }

    fn instance_name(&self) -> Option<String> {
        self.snapshot().instance_name
    }

    fn consume_mode(&self) -> Option<ConsumeMode> {
        self.snapshot().consume_mode
    }

    fn state(&self) -> ConsumerState {
        self.snapshot().state
    }
}

impl<T: Transport> fmt::Debug for PushConsumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.snapshot();
        f.debug_struct("PushConsumer")
            .field("consumer_group", &s.consumer_group)
            .field("instance_name", &s.instance_name)
            .field("consume_mode", &s.consume_mode)
            .field("state", &s.state)
            .finish()
    }
}

fn parse_subscriptions(config: &ConsumerConfig) -> Result<Vec<Subscription>, ConsumerError> {
    if config.subscriptions.is_empty() {
        return Err(ConsumerError::InvalidConfig("未订阅任何主题".to_owned()));
    }
    let mut subscriptions = config
        .subscriptions
        .iter()
        .map(|(topic, expr)| {
            if topic.trim().is_empty() {
                return Err(ConsumerError::InvalidConfig("订阅主题不能为空".to_owned()));
            }
            Ok(Subscription {
                topic: topic.clone(),
                expr: SubscriptionExpr::parse(expr)?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    subscriptions.sort_by(|a, b| a.topic.cmp(&b.topic));
    Ok(subscriptions)
}
