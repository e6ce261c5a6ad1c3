use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use dayflow_domain::{EventBus, ScheduleDomainEvent, ScheduleResult};

/// 进程内事件总线
///
/// 基于tokio广播通道，订阅者各自持有接收端。没有订阅者时发布
/// 不算失败，事件直接丢弃。
pub struct InMemoryEventBus {
    sender: broadcast::Sender<ScheduleDomainEvent>,
}

impl InMemoryEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: ScheduleDomainEvent) -> ScheduleResult<()> {
        match self.sender.send(event.clone()) {
            Ok(receivers) => {
                debug!(
                    "发布领域事件 {} 给 {} 个订阅者",
                    event.event_type(),
                    receivers
                );
            }
            Err(_) => {
                debug!("领域事件 {} 没有订阅者，丢弃", event.event_type());
            }
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ScheduleDomainEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dayflow_domain::SourceModule;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_subscriber_receives_published_event() {
        let bus = InMemoryEventBus::new(16);
        let mut rx = bus.subscribe();

        let event = ScheduleDomainEvent::TaskExecuted {
            task_uuid: Uuid::new_v4(),
            source_module: SourceModule::Reminder,
            source_entity_id: "reminder-1".to_string(),
            executed_at: Utc::now(),
        };
        bus.publish(event.clone()).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type(), "ScheduleTaskExecuted");
        assert_eq!(received.task_uuid(), event.task_uuid());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = InMemoryEventBus::new(16);
        let event = ScheduleDomainEvent::TaskDeleted {
            task_uuid: Uuid::new_v4(),
            source_module: SourceModule::Task,
            source_entity_id: "task-1".to_string(),
            occurred_at: Utc::now(),
        };
        assert!(bus.publish(event).await.is_ok());
    }
}
