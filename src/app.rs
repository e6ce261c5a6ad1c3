use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use dayflow_domain::{EventBus, ScheduleTaskRepository, SourceLifecycleEvent};
use dayflow_infrastructure::{
    InMemoryEventBus, InMemoryScheduleTaskRepository, SqliteScheduleTaskRepository,
};
use dayflow_scheduler::{
    ReminderTriggerStrategy, SchedulePoller, ScheduleTaskExecutor, ScheduleTaskFactory,
    SourceEventBridge, StrategyRegistry,
};

use crate::config::AppConfig;

/// 应用组合根
///
/// 启动时一次性装配仓储、事件总线、触发策略与调度组件，
/// 运行期不做任何动态解析。
pub struct Application {
    poller: Arc<SchedulePoller>,
    bridge: Arc<SourceEventBridge>,
    source_event_rx: tokio::sync::Mutex<Option<mpsc::Receiver<SourceLifecycleEvent>>>,
    source_event_tx: mpsc::Sender<SourceLifecycleEvent>,
    event_bus: Arc<dyn EventBus>,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let repository: Arc<dyn ScheduleTaskRepository> = if config.database.url == "memory" {
            info!("使用内存仓储");
            Arc::new(InMemoryScheduleTaskRepository::new())
        } else {
            info!("使用SQLite仓储: {}", config.database.url);
            Arc::new(
                SqliteScheduleTaskRepository::new_embedded(
                    &config.database.url,
                    config.database.max_connections,
                )
                .await
                .context("初始化SQLite仓储失败")?,
            )
        };

        let event_bus: Arc<dyn EventBus> =
            Arc::new(InMemoryEventBus::new(config.scheduler.event_bus_capacity));

        let mut registry = StrategyRegistry::new();
        registry.register(Arc::new(ReminderTriggerStrategy::new()));
        let factory = Arc::new(ScheduleTaskFactory::new(Arc::new(registry)));

        let bridge = Arc::new(SourceEventBridge::new(
            Arc::clone(&factory),
            Arc::clone(&repository),
            Arc::clone(&event_bus),
        ));

        let executor = Arc::new(ScheduleTaskExecutor::new(
            Arc::clone(&repository),
            Arc::clone(&event_bus),
        ));
        let poller = Arc::new(SchedulePoller::new(
            executor,
            Duration::from_secs(config.scheduler.poll_interval_seconds),
        ));

        let (source_event_tx, source_event_rx) = mpsc::channel(256);

        Ok(Self {
            poller,
            bridge,
            source_event_rx: tokio::sync::Mutex::new(Some(source_event_rx)),
            source_event_tx,
            event_bus,
        })
    }

    /// 来源模块投递生命周期事件的入口
    pub fn source_event_sender(&self) -> mpsc::Sender<SourceLifecycleEvent> {
        self.source_event_tx.clone()
    }

    /// 订阅计划任务领域事件（下游通知模块使用）
    pub fn subscribe_events(
        &self,
    ) -> broadcast::Receiver<dayflow_domain::ScheduleDomainEvent> {
        self.event_bus.subscribe()
    }

    /// 运行应用直到收到关闭信号
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let mut source_event_rx = self
            .source_event_rx
            .lock()
            .await
            .take()
            .context("应用已经在运行")?;

        // 来源事件桥接循环：通道关闭即退出
        let bridge = Arc::clone(&self.bridge);
        let bridge_handle = tokio::spawn(async move {
            while let Some(event) = source_event_rx.recv().await {
                bridge.handle(event).await;
            }
            info!("来源事件通道已关闭，桥接循环退出");
        });

        self.poller.run(shutdown_rx).await;

        bridge_handle.abort();
        if let Err(e) = bridge_handle.await {
            if !e.is_cancelled() {
                warn!("桥接循环异常退出: {e}");
            }
        }
        Ok(())
    }
}
