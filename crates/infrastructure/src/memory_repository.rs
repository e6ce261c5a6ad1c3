use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use dayflow_domain::{
    ScheduleError, ScheduleResult, ScheduleTask, ScheduleTaskRepository, SourceModule,
};

/// 内存计划任务仓储
///
/// 测试与演示场景使用，与SQLite实现遵守同一套版本号与认领约定。
#[derive(Default)]
pub struct InMemoryScheduleTaskRepository {
    tasks: RwLock<HashMap<Uuid, ScheduleTask>>,
}

impl InMemoryScheduleTaskRepository {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

#[async_trait]
impl ScheduleTaskRepository for InMemoryScheduleTaskRepository {
    async fn find_by_uuid(&self, uuid: Uuid) -> ScheduleResult<Option<ScheduleTask>> {
        Ok(self.tasks.read().await.get(&uuid).cloned())
    }

    async fn find_by_source_entity(
        &self,
        source_module: SourceModule,
        source_entity_id: &str,
    ) -> ScheduleResult<Vec<ScheduleTask>> {
        let tasks = self.tasks.read().await;
        let mut found: Vec<ScheduleTask> = tasks
            .values()
            .filter(|t| {
                t.source_module == source_module && t.source_entity_id == source_entity_id
            })
            .cloned()
            .collect();
        found.sort_by_key(|t| t.created_at);
        Ok(found)
    }

    async fn find_due(&self, before: DateTime<Utc>) -> ScheduleResult<Vec<ScheduleTask>> {
        let tasks = self.tasks.read().await;
        let mut due: Vec<ScheduleTask> = tasks
            .values()
            .filter(|t| t.can_execute(before))
            .cloned()
            .collect();
        due.sort_by_key(|t| t.next_run_at);
        Ok(due)
    }

    async fn save(&self, task: &mut ScheduleTask) -> ScheduleResult<()> {
        let mut tasks = self.tasks.write().await;
        if let Some(stored) = tasks.get(&task.uuid) {
            if stored.version != task.persisted_version() {
                return Err(ScheduleError::VersionConflict {
                    uuid: task.uuid,
                    expected: task.persisted_version(),
                    actual: stored.version,
                });
            }
        } else if !task.is_new() {
            return Err(ScheduleError::TaskNotFound { uuid: task.uuid });
        }
        task.mark_persisted();
        tasks.insert(task.uuid, task.clone());
        Ok(())
    }

    async fn delete_by_uuid(&self, uuid: Uuid) -> ScheduleResult<()> {
        self.tasks.write().await.remove(&uuid);
        Ok(())
    }

    async fn claim_due(
        &self,
        uuid: Uuid,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> ScheduleResult<bool> {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&uuid) {
            Some(stored)
                if stored.version == expected_version && stored.can_execute(now) =>
            {
                stored.mark_claimed(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use dayflow_domain::TriggerConfig;

    fn one_shot_task(at: DateTime<Utc>, now: DateTime<Utc>) -> ScheduleTask {
        ScheduleTask::new(
            Uuid::new_v4(),
            SourceModule::Task,
            "task-1",
            "截止提醒",
            TriggerConfig::one_shot(at).unwrap(),
            now,
        )
    }

    #[tokio::test]
    async fn test_save_detects_stale_version() {
        let repo = InMemoryScheduleTaskRepository::new();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let mut task = one_shot_task(at, now);
        repo.save(&mut task).await.unwrap();

        let mut copy_a = repo.find_by_uuid(task.uuid).await.unwrap().unwrap();
        let mut copy_b = repo.find_by_uuid(task.uuid).await.unwrap().unwrap();
        copy_a.disable(now);
        repo.save(&mut copy_a).await.unwrap();
        copy_b.disable(now);
        assert!(matches!(
            repo.save(&mut copy_b).await,
            Err(ScheduleError::VersionConflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_claim_due_is_single_winner() {
        let repo = InMemoryScheduleTaskRepository::new();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let mut task = one_shot_task(at, now);
        repo.save(&mut task).await.unwrap();

        assert!(repo.claim_due(task.uuid, 1, at).await.unwrap());
        assert!(!repo.claim_due(task.uuid, 1, at).await.unwrap());
    }
}
