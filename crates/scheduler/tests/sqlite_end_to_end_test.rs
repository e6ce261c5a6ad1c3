use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::json;
use tempfile::TempDir;
use uuid::Uuid;

use dayflow_domain::{
    EventBus, ScheduleStatus, ScheduleTaskRepository, SourceEntitySnapshot, SourceEventKind,
    SourceLifecycleEvent, SourceModule,
};
use dayflow_infrastructure::{InMemoryEventBus, SqliteScheduleTaskRepository};
use dayflow_scheduler::{
    ReminderTriggerStrategy, ScheduleTaskExecutor, ScheduleTaskFactory, SourceEventBridge,
    StrategyRegistry,
};

/// 从来源事件到SQLite落盘再到执行的完整链路
#[tokio::test]
async fn test_reminder_lifecycle_on_sqlite() {
    let dir = TempDir::new().unwrap();
    let path = format!("sqlite://{}/dayflow_test.db", dir.path().display());
    let repo: Arc<dyn ScheduleTaskRepository> = Arc::new(
        SqliteScheduleTaskRepository::new_embedded(&path, 5)
            .await
            .unwrap(),
    );
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::default());

    let mut registry = StrategyRegistry::new();
    registry.register(Arc::new(ReminderTriggerStrategy::new()));
    let factory = Arc::new(ScheduleTaskFactory::new(Arc::new(registry)));
    let bridge = SourceEventBridge::new(factory, Arc::clone(&repo), Arc::clone(&bus));
    let executor = ScheduleTaskExecutor::new(Arc::clone(&repo), Arc::clone(&bus));

    let deadline = Utc.with_ymd_and_hms(2030, 6, 1, 10, 0, 0).unwrap();
    bridge
        .handle(SourceLifecycleEvent {
            account_uuid: Uuid::new_v4(),
            source_module: SourceModule::Reminder,
            source_entity_id: "reminder-e2e".to_string(),
            kind: SourceEventKind::Created,
            snapshot: Some(SourceEntitySnapshot {
                title: "交房租".to_string(),
                enabled: true,
                status: "active".to_string(),
                trigger: json!({"type": "once", "at": deadline}),
            }),
            occurred_at: Utc::now(),
        })
        .await;

    let tasks = repo
        .find_by_source_entity(SourceModule::Reminder, "reminder-e2e")
        .await
        .unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].next_run_at, Some(deadline));

    let executed = executor.scan_and_execute(deadline).await.unwrap();
    assert_eq!(executed, 1);

    let reloaded = repo.find_by_uuid(tasks[0].uuid).await.unwrap().unwrap();
    assert_eq!(reloaded.status, ScheduleStatus::Completed);
    assert_eq!(reloaded.last_run_at, Some(deadline));
    assert_eq!(reloaded.next_run_at, None);

    // 再扫描一轮不会重复触发
    let executed = executor.scan_and_execute(deadline).await.unwrap();
    assert_eq!(executed, 0);
}
