use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use dayflow_domain::{
    EventBus, ScheduleDomainEvent, ScheduleError, ScheduleResult, ScheduleTask,
    ScheduleTaskRepository, SourceEntitySnapshot, SourceEventKind, SourceLifecycleEvent,
};

use crate::factory::{CreateScheduleTaskInput, ScheduleTaskFactory};

/// 来源事件桥
///
/// 消费各业务模块的实体生命周期事件，把计划任务的增删改挂接到
/// 来源实体的生命周期上。所有处理都是幂等的：事件可能乱序或重复
/// 投递，桥接层不能因此产生重复任务或误报错误。
///
/// 处理失败只记录日志，从不向事件循环传播——调度投影坏掉不应该
/// 拖垮来源模块自身的业务流程。
pub struct SourceEventBridge {
    factory: Arc<ScheduleTaskFactory>,
    repository: Arc<dyn ScheduleTaskRepository>,
    event_bus: Arc<dyn EventBus>,
}

impl SourceEventBridge {
    pub fn new(
        factory: Arc<ScheduleTaskFactory>,
        repository: Arc<dyn ScheduleTaskRepository>,
        event_bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            factory,
            repository,
            event_bus,
        }
    }

    /// 处理一条来源生命周期事件
    ///
    /// 错误在此吞掉；`NoScheduleRequired` 按预期结果记 info，
    /// 其余错误记 error。
    pub async fn handle(&self, event: SourceLifecycleEvent) {
        let now = Utc::now();
        let result = match event.kind {
            SourceEventKind::Created => self.on_created(&event, now).await,
            SourceEventKind::Updated => self.on_updated(&event, now).await,
            SourceEventKind::Enabled => self.on_enabled(&event, now).await,
            SourceEventKind::Paused => self.on_paused(&event, now).await,
            SourceEventKind::Deleted => self.on_deleted(&event, now).await,
        };

        match result {
            Ok(()) => {}
            Err(e) if e.is_expected() => {
                info!(
                    "来源实体 {}/{} 不需要调度: {}",
                    event.source_module, event.source_entity_id, e
                );
            }
            Err(e) => {
                error!(
                    "处理来源事件失败 ({:?} {}/{}): {}",
                    event.kind, event.source_module, event.source_entity_id, e
                );
            }
        }
    }

    fn snapshot_of<'a>(
        event: &'a SourceLifecycleEvent,
    ) -> ScheduleResult<&'a SourceEntitySnapshot> {
        event.snapshot.as_ref().ok_or_else(|| {
            ScheduleError::InvalidTrigger(format!(
                "{:?} 事件缺少来源实体快照",
                event.kind
            ))
        })
    }

    /// 创建事件：已存在同来源任务时按更新处理（重复投递或重建场景）
    async fn on_created(
        &self,
        event: &SourceLifecycleEvent,
        now: DateTime<Utc>,
    ) -> ScheduleResult<()> {
        let snapshot = Self::snapshot_of(event)?;
        let existing = self
            .repository
            .find_by_source_entity(event.source_module, &event.source_entity_id)
            .await?;

        if !existing.is_empty() {
            debug!(
                "来源实体 {}/{} 已有 {} 个计划任务，按更新处理",
                event.source_module,
                event.source_entity_id,
                existing.len()
            );
            return self.refresh_existing(existing, snapshot, now).await;
        }

        let input = CreateScheduleTaskInput {
            account_uuid: event.account_uuid,
            source_module: event.source_module,
            source_entity_id: event.source_entity_id.clone(),
            snapshot: snapshot.clone(),
        };
        let mut task = self.factory.create_from_source(&input, now)?;
        self.repository.save(&mut task).await?;
        info!("已为来源实体创建{}", task.entity_description());
        self.publish_events(&mut task).await;
        Ok(())
    }

    /// 更新事件：同步名称，快照携带触发描述时重新推导触发配置
    async fn on_updated(
        &self,
        event: &SourceLifecycleEvent,
        now: DateTime<Utc>,
    ) -> ScheduleResult<()> {
        let snapshot = Self::snapshot_of(event)?;
        let existing = self
            .repository
            .find_by_source_entity(event.source_module, &event.source_entity_id)
            .await?;

        if existing.is_empty() {
            // 更新先于创建到达，或任务曾因不需要调度而未创建
            debug!(
                "来源实体 {}/{} 没有计划任务，按创建处理更新事件",
                event.source_module, event.source_entity_id
            );
            return self.on_created(event, now).await;
        }

        self.refresh_existing(existing, snapshot, now).await
    }

    async fn refresh_existing(
        &self,
        tasks: Vec<ScheduleTask>,
        snapshot: &SourceEntitySnapshot,
        now: DateTime<Utc>,
    ) -> ScheduleResult<()> {
        for mut task in tasks {
            if !snapshot.trigger.is_null() {
                match self.factory.derive_trigger(task.source_module, snapshot) {
                    Ok(config) => task.update_trigger_config(config, now),
                    Err(e) if e.is_expected() => {
                        // 来源实体不再需要调度，禁用而非删除
                        task.disable(now);
                    }
                    Err(e) => return Err(e),
                }
            }
            if task.task_name != snapshot.title {
                task.rename(snapshot.title.clone(), now);
            }
            if snapshot.enabled {
                task.enable(now);
            } else {
                task.disable(now);
            }
            self.repository.save(&mut task).await?;
            self.publish_events(&mut task).await;
        }
        Ok(())
    }

    async fn on_enabled(
        &self,
        event: &SourceLifecycleEvent,
        now: DateTime<Utc>,
    ) -> ScheduleResult<()> {
        let tasks = self
            .repository
            .find_by_source_entity(event.source_module, &event.source_entity_id)
            .await?;
        for mut task in tasks {
            task.enable(now);
            self.repository.save(&mut task).await?;
            self.publish_events(&mut task).await;
        }
        Ok(())
    }

    async fn on_paused(
        &self,
        event: &SourceLifecycleEvent,
        now: DateTime<Utc>,
    ) -> ScheduleResult<()> {
        let tasks = self
            .repository
            .find_by_source_entity(event.source_module, &event.source_entity_id)
            .await?;
        for mut task in tasks {
            task.disable(now);
            self.repository.save(&mut task).await?;
            self.publish_events(&mut task).await;
        }
        Ok(())
    }

    /// 删除事件：移除该来源实体的全部计划任务并公告删除
    async fn on_deleted(
        &self,
        event: &SourceLifecycleEvent,
        now: DateTime<Utc>,
    ) -> ScheduleResult<()> {
        let tasks = self
            .repository
            .find_by_source_entity(event.source_module, &event.source_entity_id)
            .await?;
        if tasks.is_empty() {
            debug!(
                "来源实体 {}/{} 没有计划任务需要删除",
                event.source_module, event.source_entity_id
            );
            return Ok(());
        }
        for task in tasks {
            self.repository.delete_by_uuid(task.uuid).await?;
            info!("已删除{}", task.entity_description());
            let deleted = ScheduleDomainEvent::TaskDeleted {
                task_uuid: task.uuid,
                source_module: task.source_module,
                source_entity_id: task.source_entity_id.clone(),
                occurred_at: now,
            };
            if let Err(e) = self.event_bus.publish(deleted).await {
                warn!("发布任务删除事件失败: {}", e);
            }
        }
        Ok(())
    }

    /// 保存成功后发布聚合缓冲的领域事件并清空缓冲
    async fn publish_events(&self, task: &mut ScheduleTask) {
        for event in task.take_events() {
            let event_type = event.event_type();
            if let Err(e) = self.event_bus.publish(event).await {
                warn!("发布领域事件 {} 失败: {}", event_type, e);
            }
        }
    }
}
