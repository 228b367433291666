//! # 分区分发
//!
//! 每个队列一个消费任务，保证同一队列同时只有一个批次在处理；
//! 监听器在阻塞线程池上执行，并发数由信号量限制为最大消费线程数。
//!
//! 并发消费的失败批次转入重试主题后立即提交，不阻塞所在分区；
//! 顺序消费的失败批次在原分区暂停后重新投递。

use crate::{
    mapping::restore_retry,
    retry::{Action, decide, now_millis},
    transport::{group_id, retry_topic},
};
use std::{collections::HashMap, future::Future, sync::Arc};
use tokio::{
    sync::{Semaphore, mpsc, watch},
    task::{self, AbortHandle, JoinSet},
    time::Duration,
};
use tracing::{debug, error, info, warn};
use unimq::{
    errors::TransportError,
    listener::Listener,
    message::{ConsumeStatus, MessageExt, MessageQueue},
    transport::PushSettings,
};

/// 每个队列缓冲的消息数下限
pub(crate) const PARTITION_BUFFER: usize = 256;

/// 转发失败后的重试间隔
pub(crate) const FORWARD_BACKOFF: Duration = Duration::from_secs(1);

/// 批次处置的出口
pub(crate) trait Outlet: Send + Sync + 'static {
    /// 记录队列已处理完的偏移量
    fn store(&self, queue: &MessageQueue, offset: i64);

    /// 转入重试主题，`due_at` 毫秒时间戳之后重新投递
    fn retry(
        &self,
        msgs: &[MessageExt],
        due_at: i64,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// 转入死信
    fn dead_letter(
        &self,
        msgs: &[MessageExt],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

#[derive(Debug, Clone, Copy)]
enum Forward {
    Retry(i64),
    DeadLetter,
}

pub(crate) struct Dispatcher<O> {
    listener: Listener,
    settings: PushSettings,
    retry_topic: String,
    semaphore: Arc<Semaphore>,
    outlet: O,
}

impl<O: Outlet> Dispatcher<O> {
    pub(crate) fn new(listener: Listener, settings: PushSettings, outlet: O) -> Self {
        debug!(
            "消费线程数范围 {}..={}，单批次最多 {} 条消息",
            settings.threads.min, settings.threads.max, settings.batch_max_size
        );
        Self {
            semaphore: Arc::new(Semaphore::new(settings.threads.max)),
            retry_topic: retry_topic(&group_id(&settings)),
            listener,
            settings,
            outlet,
        }
    }

    /// 处理一个批次，直至提交、转入重试主题或转入死信
    ///
    /// 等待期间收到关闭信号时返回 `false`，偏移量不存储，消息在重启后重新投递。
    pub(crate) async fn process(
        &self,
        queue: &MessageQueue,
        batch: Vec<MessageExt>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let Some(last) = batch.last().map(|m| m.queue_offset) else {
            return true;
        };
        let from_retry = queue.topic == self.retry_topic;
        let mut due_at = None;
        let mut pending = Vec::with_capacity(batch.len());
        for msg in batch {
            let msg = if from_retry {
                let (msg, due) = restore_retry(msg);
                due_at = due_at.max(due);
                msg
            } else {
                msg
            };
            if self.settings.accepts(&msg.topic, msg.tags.as_deref()) {
                pending.push(msg);
            }
        }
        if pending.is_empty() {
            debug!("队列 {queue} 的批次没有订阅的消息");
            self.outlet.store(queue, last);
            return true;
        }

        if let Some(due_at) = due_at {
            let wait = due_at.saturating_sub(now_millis());
            if wait > 0 {
                debug!("队列 {queue} 的重试消息在 {wait} ms 后到期");
                if !pause(Duration::from_millis(wait as u64), shutdown).await {
                    info!("收到关闭信号，放弃队列 {queue} 的重试消息");
                    return false;
                }
            }
        }

        loop {
            let status = self.run(pending.clone(), queue.clone()).await;
            let times = pending.iter().map(|m| m.reconsume_times).max().unwrap_or(0);
            match decide(status, times, self.settings.max_reconsume_times) {
                Action::Commit => break,
                Action::DeadLetter => {
                    warn!("队列 {queue} 的 {} 条消息转入死信", pending.len());
                    if !self
                        .forward(queue, &pending, Forward::DeadLetter, shutdown)
                        .await
                    {
                        return false;
                    }
                    break;
                }
                Action::Retry(delay) => {
                    let retried: Vec<_> = pending.iter().map(MessageExt::redelivered).collect();
                    let due_at = now_millis().saturating_add(delay.as_millis() as i64);
                    debug!(
                        "队列 {queue} 的 {} 条消息转入重试主题，{delay:?} 后重新投递",
                        retried.len()
                    );
                    if !self
                        .forward(queue, &retried, Forward::Retry(due_at), shutdown)
                        .await
                    {
                        return false;
                    }
                    break;
                }
                Action::Suspend(delay) => {
                    debug!("暂停队列 {queue}，{delay:?} 后重新投递 {} 条消息", pending.len());
                    if !pause(delay, shutdown).await {
                        info!("收到关闭信号，放弃队列 {queue} 的重新投递");
                        return false;
                    }
                    pending = pending.iter().map(MessageExt::redelivered).collect();
                }
            }
        }
        self.outlet.store(queue, last);
        true
    }

    /// 转发直至成功，收到关闭信号时返回 `false`
    async fn forward(
        &self,
        queue: &MessageQueue,
        msgs: &[MessageExt],
        target: Forward,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        loop {
            let sent = match target {
                Forward::Retry(due_at) => self.outlet.retry(msgs, due_at).await,
                Forward::DeadLetter => self.outlet.dead_letter(msgs).await,
            };
            match sent {
                Ok(()) => return true,
                Err(e) => {
                    error!("队列 {queue} 的 {} 条消息转发失败（{target:?}）：{e}", msgs.len());
                    if !pause(FORWARD_BACKOFF, shutdown).await {
                        info!("收到关闭信号，放弃队列 {queue} 的消息转发");
                        return false;
                    }
                }
            }
        }
    }

    async fn run(&self, batch: Vec<MessageExt>, queue: MessageQueue) -> ConsumeStatus {
        let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                error!("获取消费线程失败：{e}");
                return self.listener.failure();
            }
        };
        let listener = self.listener.clone();
        let handle = task::spawn_blocking(move || {
            let _permit = permit;
            listener.consume(&batch, &queue)
        });
        match handle.await {
            Ok(status) => status,
            Err(e) => {
                error!("消费任务发生错误：{e}");
                self.listener.failure()
            }
        }
    }
}

async fn pause(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = shutdown.wait_for(|stop| *stop) => false,
    }
}

/// 取出首条消息之后立即可得的消息，组成不超过 `max` 条的批次
pub(crate) fn drain_batch(
    first: MessageExt,
    rx: &mut mpsc::Receiver<MessageExt>,
    max: usize,
) -> Vec<MessageExt> {
    let mut batch = vec![first];
    while batch.len() < max {
        match rx.try_recv() {
            Ok(msg) => batch.push(msg),
            Err(_) => break,
        }
    }
    batch
}

async fn partition_worker<O: Outlet>(
    dispatcher: Arc<Dispatcher<O>>,
    queue: MessageQueue,
    mut rx: mpsc::Receiver<MessageExt>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!("启动队列 {queue} 的消费任务");
    loop {
        let first = tokio::select! {
            biased;
            _ = shutdown.wait_for(|stop| *stop) => break,
            msg = rx.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };
        let batch = drain_batch(first, &mut rx, dispatcher.settings.batch_max_size);
        if !dispatcher.process(&queue, batch, &mut shutdown).await {
            break;
        }
    }
    debug!("队列 {queue} 的消费任务退出");
}

struct Worker {
    tx: mpsc::Sender<MessageExt>,
    abort: AbortHandle,
}

/// 按队列路由消息，首次见到的队列启动对应的消费任务
pub(crate) struct Router<O> {
    dispatcher: Arc<Dispatcher<O>>,
    shutdown: watch::Receiver<bool>,
    workers: HashMap<MessageQueue, Worker>,
    tasks: JoinSet<()>,
}

impl<O: Outlet> Router<O> {
    pub(crate) fn new(dispatcher: Arc<Dispatcher<O>>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            dispatcher,
            shutdown,
            workers: HashMap::new(),
            tasks: JoinSet::new(),
        }
    }

    /// 路由一条消息，队列缓冲已满时等待，收到关闭信号时放弃
    pub(crate) async fn route(&mut self, msg: MessageExt) {
        let Router {
            dispatcher,
            shutdown,
            workers,
            tasks,
        } = self;
        let worker = workers.entry(msg.queue()).or_insert_with_key(|queue| {
            let capacity = PARTITION_BUFFER.max(dispatcher.settings.batch_max_size);
            let (tx, rx) = mpsc::channel(capacity);
            let abort = tasks.spawn(partition_worker(
                Arc::clone(dispatcher),
                queue.clone(),
                rx,
                shutdown.clone(),
            ));
            Worker { tx, abort }
        });
        tokio::select! {
            sent = worker.tx.send(msg) => {
                if let Err(e) = sent {
                    debug!("队列消费任务已退出，丢弃消息 {}", e.0.msg_id);
                }
            }
            _ = shutdown.wait_for(|stop| *stop) => debug!("收到关闭信号，停止路由"),
        }
    }

    /// 停止已被回收队列的消费任务，缓冲中的消息与未提交的批次一并丢弃
    pub(crate) fn revoke(&mut self, queues: &[MessageQueue]) {
        for queue in queues {
            if let Some(worker) = self.workers.remove(queue) {
                worker.abort.abort();
                info!("队列 {queue} 已被回收，停止其消费任务");
            }
        }
    }

    pub(crate) fn queues(&self) -> usize {
        self.workers.len()
    }

    /// 关闭全部队列消费任务，未收到关闭信号时先处理完已路由的消息
    pub(crate) async fn close(mut self) {
        self.workers.clear();
        while let Some(result) = self.tasks.join_next().await {
            match result {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => debug!("队列消费任务已取消"),
                Err(e) => error!("队列消费任务发生错误：{e}"),
            }
        }
    }
}
