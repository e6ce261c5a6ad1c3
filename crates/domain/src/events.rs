//! 领域事件
//!
//! 调度子系统消费的来源模块生命周期事件与自身产生的领域事件定义，
//! 用于跨模块解耦。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schedule_task::SourceModule;

/// 来源实体快照
///
/// 随生命周期事件携带，内容足以让工厂推导触发配置。
/// `trigger` 的具体结构由各来源模块的触发策略解释。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntitySnapshot {
    pub title: String,
    pub enabled: bool,
    pub status: String,
    #[serde(default)]
    pub trigger: serde_json::Value,
}

/// 来源实体生命周期事件类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceEventKind {
    Created,
    Updated,
    Enabled,
    Paused,
    Deleted,
}

/// 调度子系统消费的来源模块生命周期事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceLifecycleEvent {
    pub account_uuid: Uuid,
    pub source_module: SourceModule,
    pub source_entity_id: String,
    pub kind: SourceEventKind,
    /// Deleted事件可以不携带快照
    pub snapshot: Option<SourceEntitySnapshot>,
    pub occurred_at: DateTime<Utc>,
}

/// 计划任务产生的领域事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScheduleDomainEvent {
    TaskCreated {
        task_uuid: Uuid,
        source_module: SourceModule,
        source_entity_id: String,
        occurred_at: DateTime<Utc>,
    },
    TaskEnabled {
        task_uuid: Uuid,
        source_module: SourceModule,
        source_entity_id: String,
        occurred_at: DateTime<Utc>,
    },
    TaskDisabled {
        task_uuid: Uuid,
        source_module: SourceModule,
        source_entity_id: String,
        occurred_at: DateTime<Utc>,
    },
    TaskDeleted {
        task_uuid: Uuid,
        source_module: SourceModule,
        source_entity_id: String,
        occurred_at: DateTime<Utc>,
    },
    /// 一次成功的触发执行，下游的通知投递模块消费
    TaskExecuted {
        task_uuid: Uuid,
        source_module: SourceModule,
        source_entity_id: String,
        executed_at: DateTime<Utc>,
    },
}

impl ScheduleDomainEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ScheduleDomainEvent::TaskCreated { .. } => "ScheduleTaskCreated",
            ScheduleDomainEvent::TaskEnabled { .. } => "ScheduleTaskEnabled",
            ScheduleDomainEvent::TaskDisabled { .. } => "ScheduleTaskDisabled",
            ScheduleDomainEvent::TaskDeleted { .. } => "ScheduleTaskDeleted",
            ScheduleDomainEvent::TaskExecuted { .. } => "ScheduleTaskExecuted",
        }
    }

    pub fn task_uuid(&self) -> Uuid {
        match self {
            ScheduleDomainEvent::TaskCreated { task_uuid, .. }
            | ScheduleDomainEvent::TaskEnabled { task_uuid, .. }
            | ScheduleDomainEvent::TaskDisabled { task_uuid, .. }
            | ScheduleDomainEvent::TaskDeleted { task_uuid, .. }
            | ScheduleDomainEvent::TaskExecuted { task_uuid, .. } => *task_uuid,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ScheduleDomainEvent::TaskCreated { occurred_at, .. }
            | ScheduleDomainEvent::TaskEnabled { occurred_at, .. }
            | ScheduleDomainEvent::TaskDisabled { occurred_at, .. }
            | ScheduleDomainEvent::TaskDeleted { occurred_at, .. } => *occurred_at,
            ScheduleDomainEvent::TaskExecuted { executed_at, .. } => *executed_at,
        }
    }
}
