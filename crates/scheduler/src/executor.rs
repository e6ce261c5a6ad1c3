use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use dayflow_domain::{
    EventBus, ScheduleError, ScheduleResult, ScheduleTask, ScheduleTaskRepository,
};

/// 计划任务执行器
///
/// 负责到期任务的查询、认领与执行落盘。执行前通过仓储的原子认领
/// 挡掉并发重复触发：同一到期只有一个执行者认领成功，其余跳过。
pub struct ScheduleTaskExecutor {
    repository: Arc<dyn ScheduleTaskRepository>,
    event_bus: Arc<dyn EventBus>,
}

impl ScheduleTaskExecutor {
    pub fn new(
        repository: Arc<dyn ScheduleTaskRepository>,
        event_bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            repository,
            event_bus,
        }
    }

    /// 查询指定时刻前到期的任务，最早到期的排前面
    pub async fn find_due_tasks(
        &self,
        before: DateTime<Utc>,
    ) -> ScheduleResult<Vec<ScheduleTask>> {
        self.repository.find_due(before).await
    }

    /// 以当前时刻执行单个任务
    pub async fn execute_schedule_task(&self, uuid: Uuid) -> ScheduleResult<bool> {
        self.execute_at(uuid, Utc::now()).await
    }

    /// 以指定时刻执行单个任务
    ///
    /// 返回 Ok(true) 表示本次调用完成了一次触发；Ok(false) 表示任务
    /// 当前不可执行或已被其他执行者认领，均属正常情况。
    pub async fn execute_at(&self, uuid: Uuid, now: DateTime<Utc>) -> ScheduleResult<bool> {
        let mut task = self
            .repository
            .find_by_uuid(uuid)
            .await?
            .ok_or(ScheduleError::TaskNotFound { uuid })?;

        if let Some(reason) = task.execution_blocked_reason(now) {
            debug!("{}不可执行: {}", task.entity_description(), reason);
            return Ok(false);
        }

        // 认领失败说明另一个执行者抢先处理了这次到期
        let claimed = self
            .repository
            .claim_due(uuid, task.persisted_version(), now)
            .await?;
        if !claimed {
            warn!("{}已被其他执行者认领，跳过", task.entity_description());
            return Ok(false);
        }
        task.mark_claimed(now);

        if !task.execute(now) {
            // 认领通过后聚合仍拒绝执行，属于内部不一致
            return Err(ScheduleError::Internal(format!(
                "认领成功但聚合拒绝执行: {uuid}"
            )));
        }

        match self.repository.save(&mut task).await {
            Ok(()) => {}
            // 认领与保存之间被其他进程改写了同一行，按已处理跳过
            Err(ScheduleError::VersionConflict { .. }) => {
                warn!(
                    "{}保存时版本冲突，已被其他进程处理",
                    task.entity_description()
                );
                return Ok(false);
            }
            Err(e) => return Err(e),
        }
        info!(
            "{}执行完成, 下次触发: {:?}",
            task.entity_description(),
            task.next_run_at
        );

        for event in task.take_events() {
            let event_type = event.event_type();
            if let Err(e) = self.event_bus.publish(event).await {
                warn!("发布领域事件 {} 失败: {}", event_type, e);
            }
        }
        Ok(true)
    }

    /// 扫描并执行一轮到期任务，返回成功触发的数量
    ///
    /// 单个任务失败只记录日志，不影响同批次的其他任务。
    pub async fn scan_and_execute(&self, now: DateTime<Utc>) -> ScheduleResult<usize> {
        let due = self.repository.find_due(now).await?;
        if due.is_empty() {
            return Ok(0);
        }
        debug!("本轮扫描到 {} 个到期任务", due.len());

        let mut executed = 0;
        for task in due {
            match self.execute_at(task.uuid, now).await {
                Ok(true) => executed += 1,
                Ok(false) => {}
                Err(e) => {
                    error!("执行{}失败: {}", task.entity_description(), e);
                }
            }
        }
        Ok(executed)
    }
}
