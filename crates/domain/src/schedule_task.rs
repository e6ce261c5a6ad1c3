use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{ScheduleError, ScheduleResult};
use crate::events::ScheduleDomainEvent;
use crate::trigger::TriggerConfig;

/// 来源模块标识
///
/// 计划任务总是某个业务模块实体的派生投影，该枚举标记派生来源。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SourceModule {
    #[serde(rename = "REMINDER")]
    Reminder,
    #[serde(rename = "TASK")]
    Task,
    #[serde(rename = "GOAL")]
    Goal,
}

impl SourceModule {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceModule::Reminder => "REMINDER",
            SourceModule::Task => "TASK",
            SourceModule::Goal => "GOAL",
        }
    }

    pub fn parse(s: &str) -> ScheduleResult<Self> {
        match s {
            "REMINDER" => Ok(SourceModule::Reminder),
            "TASK" => Ok(SourceModule::Task),
            "GOAL" => Ok(SourceModule::Goal),
            _ => Err(ScheduleError::Internal(format!(
                "未知的来源模块: {s}"
            ))),
        }
    }
}

impl std::fmt::Display for SourceModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 计划任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScheduleStatus {
    /// 可被调度执行
    #[serde(rename = "ACTIVE")]
    Active,
    /// 用户主动暂停，可恢复
    #[serde(rename = "PAUSED")]
    Paused,
    /// 终态：无后续触发
    #[serde(rename = "COMPLETED")]
    Completed,
    /// 因来源实体被禁用而挂起，区别于用户暂停
    #[serde(rename = "DISABLED")]
    Disabled,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Active => "ACTIVE",
            ScheduleStatus::Paused => "PAUSED",
            ScheduleStatus::Completed => "COMPLETED",
            ScheduleStatus::Disabled => "DISABLED",
        }
    }

    pub fn parse(s: &str) -> ScheduleResult<Self> {
        match s {
            "ACTIVE" => Ok(ScheduleStatus::Active),
            "PAUSED" => Ok(ScheduleStatus::Paused),
            "COMPLETED" => Ok(ScheduleStatus::Completed),
            "DISABLED" => Ok(ScheduleStatus::Disabled),
            _ => Err(ScheduleError::Internal(format!(
                "未知的计划任务状态: {s}"
            ))),
        }
    }
}

/// 计划任务聚合根
///
/// 调度子系统的持久化单元，自身维护状态机与下次触发时间的推进。
/// 聚合的存在始终是来源实体的派生投影，没有独立的用户创建入口。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleTask {
    pub uuid: Uuid,
    pub account_uuid: Uuid,
    pub source_module: SourceModule,
    pub source_entity_id: String,
    pub task_name: String,
    pub trigger_config: TriggerConfig,
    pub status: ScheduleStatus,
    /// 来源实体自身的启用开关，独立于status
    pub enabled: bool,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    /// 乐观并发版本号，每次变更自增
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// 仓储加载时的版本号，保存时用作条件更新的期望值
    #[serde(skip)]
    persisted_version: i64,
    /// 自上次发布以来缓冲的领域事件，发布后显式清空
    #[serde(skip)]
    domain_events: Vec<ScheduleDomainEvent>,
}

impl ScheduleTask {
    /// 由工厂从来源实体快照创建新聚合，未持久化
    pub fn new(
        account_uuid: Uuid,
        source_module: SourceModule,
        source_entity_id: impl Into<String>,
        task_name: impl Into<String>,
        trigger_config: TriggerConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let uuid = Uuid::new_v4();
        let source_entity_id = source_entity_id.into();
        let next_run_at = trigger_config.next_occurrence(now);

        let mut task = Self {
            uuid,
            account_uuid,
            source_module,
            source_entity_id: source_entity_id.clone(),
            task_name: task_name.into(),
            trigger_config,
            status: ScheduleStatus::Active,
            enabled: true,
            next_run_at,
            last_run_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
            persisted_version: 0,
            domain_events: Vec::new(),
        };
        task.domain_events.push(ScheduleDomainEvent::TaskCreated {
            task_uuid: uuid,
            source_module,
            source_entity_id,
            occurred_at: now,
        });
        task
    }

    /// 仓储从存储行还原聚合
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        uuid: Uuid,
        account_uuid: Uuid,
        source_module: SourceModule,
        source_entity_id: String,
        task_name: String,
        trigger_config: TriggerConfig,
        status: ScheduleStatus,
        enabled: bool,
        next_run_at: Option<DateTime<Utc>>,
        last_run_at: Option<DateTime<Utc>>,
        version: i64,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            uuid,
            account_uuid,
            source_module,
            source_entity_id,
            task_name,
            trigger_config,
            status,
            enabled,
            next_run_at,
            last_run_at,
            version,
            created_at,
            updated_at,
            persisted_version: version,
            domain_events: Vec::new(),
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version += 1;
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, ScheduleStatus::Active)
    }

    /// 启用计划任务
    ///
    /// 合法前态为 Paused/Disabled；已是 Active 时幂等无操作。
    /// Completed 是终态，不可重新启用。
    pub fn enable(&mut self, now: DateTime<Utc>) {
        match self.status {
            ScheduleStatus::Active => {}
            ScheduleStatus::Completed => {
                tracing::debug!("计划任务 {} 已完成，忽略启用请求", self.uuid);
            }
            ScheduleStatus::Paused | ScheduleStatus::Disabled => {
                self.status = ScheduleStatus::Active;
                self.enabled = true;
                if self.next_run_at.map_or(true, |t| t <= now) {
                    self.next_run_at = self.trigger_config.next_occurrence(now);
                }
                self.touch(now);
                self.domain_events.push(ScheduleDomainEvent::TaskEnabled {
                    task_uuid: self.uuid,
                    source_module: self.source_module,
                    source_entity_id: self.source_entity_id.clone(),
                    occurred_at: now,
                });
            }
        }
    }

    /// 禁用计划任务（来源实体被禁用/暂停时由事件桥调用）
    ///
    /// 合法前态为 Active/Paused；已是 Disabled 时幂等无操作。
    pub fn disable(&mut self, now: DateTime<Utc>) {
        match self.status {
            ScheduleStatus::Disabled | ScheduleStatus::Completed => {}
            ScheduleStatus::Active | ScheduleStatus::Paused => {
                self.status = ScheduleStatus::Disabled;
                self.enabled = false;
                self.next_run_at = None;
                self.touch(now);
                self.domain_events.push(ScheduleDomainEvent::TaskDisabled {
                    task_uuid: self.uuid,
                    source_module: self.source_module,
                    source_entity_id: self.source_entity_id.clone(),
                    occurred_at: now,
                });
            }
        }
    }

    /// 替换触发配置；处于 Active 时立即重算下次触发时间
    pub fn update_trigger_config(&mut self, config: TriggerConfig, now: DateTime<Utc>) {
        self.trigger_config = config;
        if self.is_active() {
            self.next_run_at = self.trigger_config.next_occurrence(now);
        }
        self.touch(now);
    }

    /// 更新任务名称（来源实体标题变更时同步）
    pub fn rename(&mut self, task_name: impl Into<String>, now: DateTime<Utc>) {
        self.task_name = task_name.into();
        self.touch(now);
    }

    /// 纯判定：当前时刻是否可执行
    pub fn can_execute(&self, now: DateTime<Utc>) -> bool {
        self.is_active()
            && self.enabled
            && self.next_run_at.is_some_and(|t| t <= now)
    }

    /// 说明不可执行的原因，供执行器记录日志
    pub fn execution_blocked_reason(&self, now: DateTime<Utc>) -> Option<&'static str> {
        if !self.is_active() {
            return Some("状态不是ACTIVE");
        }
        if !self.enabled {
            return Some("来源实体已禁用");
        }
        match self.next_run_at {
            None => Some("没有下次触发时间"),
            Some(t) if t > now => Some("尚未到达触发时间"),
            Some(_) => None,
        }
    }

    /// 执行一次触发
    ///
    /// 前置条件 `can_execute` 由调用方负责检查；条件不满足时返回 false
    /// 而不报错，保持批量执行循环的简单性。成功时推进 `last_run_at` 与
    /// `next_run_at`，无后续触发则转入 Completed，并缓冲一条执行事件。
    pub fn execute(&mut self, now: DateTime<Utc>) -> bool {
        if !self.can_execute(now) {
            return false;
        }

        self.last_run_at = Some(now);
        match self.trigger_config.next_occurrence(now) {
            Some(next) => {
                self.next_run_at = Some(next);
            }
            None => {
                self.status = ScheduleStatus::Completed;
                self.next_run_at = None;
            }
        }
        self.touch(now);
        self.domain_events.push(ScheduleDomainEvent::TaskExecuted {
            task_uuid: self.uuid,
            source_module: self.source_module,
            source_entity_id: self.source_entity_id.clone(),
            executed_at: now,
        });
        true
    }

    /// 仓储加载时的版本号，保存时的乐观并发期望值
    pub fn persisted_version(&self) -> i64 {
        self.persisted_version
    }

    /// 是否尚未持久化
    pub fn is_new(&self) -> bool {
        self.persisted_version == 0
    }

    /// 保存成功后由仓储回写
    pub fn mark_persisted(&mut self) {
        self.persisted_version = self.version;
    }

    /// 原子认领成功后同步内存侧版本（存储侧版本已+1）
    pub fn mark_claimed(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.persisted_version += 1;
        self.updated_at = now;
    }

    /// 取走缓冲的领域事件（按追加顺序），并清空缓冲
    pub fn take_events(&mut self) -> Vec<ScheduleDomainEvent> {
        std::mem::take(&mut self.domain_events)
    }

    pub fn pending_events(&self) -> &[ScheduleDomainEvent] {
        &self.domain_events
    }

    pub fn entity_description(&self) -> String {
        format!(
            "计划任务 '{}' (uuid: {}, 来源: {}/{})",
            self.task_name, self.uuid, self.source_module, self.source_entity_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn daily_9am() -> TriggerConfig {
        TriggerConfig::cron("0 0 9 * * *").unwrap()
    }

    fn sample_task(now: DateTime<Utc>) -> ScheduleTask {
        ScheduleTask::new(
            Uuid::new_v4(),
            SourceModule::Reminder,
            "reminder-1",
            "晨间提醒",
            daily_9am(),
            now,
        )
    }

    #[test]
    fn test_new_task_is_active_with_future_next_run() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let task = sample_task(now);
        assert_eq!(task.status, ScheduleStatus::Active);
        assert!(task.enabled);
        assert!(task.next_run_at.unwrap() > now);
        assert_eq!(task.version, 1);
        assert!(task.is_new());
        assert_eq!(task.pending_events().len(), 1);
    }

    #[test]
    fn test_disable_clears_next_run_and_is_idempotent() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let mut task = sample_task(now);
        task.disable(now);
        assert_eq!(task.status, ScheduleStatus::Disabled);
        assert_eq!(task.next_run_at, None);
        let version = task.version;
        task.disable(now);
        assert_eq!(task.version, version);
    }

    #[test]
    fn test_enable_restores_next_run() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let mut task = sample_task(now);
        task.disable(now);
        let later = now + Duration::hours(2);
        task.enable(later);
        assert_eq!(task.status, ScheduleStatus::Active);
        assert_eq!(
            task.next_run_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_enable_is_noop_when_active_or_completed() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let mut task = sample_task(now);
        let version = task.version;
        task.enable(now);
        assert_eq!(task.version, version);

        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let mut one_shot = ScheduleTask::new(
            Uuid::new_v4(),
            SourceModule::Reminder,
            "reminder-2",
            "一次性提醒",
            TriggerConfig::one_shot(at).unwrap(),
            now,
        );
        assert!(one_shot.execute(at));
        assert_eq!(one_shot.status, ScheduleStatus::Completed);
        let version = one_shot.version;
        one_shot.enable(at + Duration::hours(1));
        assert_eq!(one_shot.status, ScheduleStatus::Completed);
        assert_eq!(one_shot.version, version);
    }

    #[test]
    fn test_can_execute_predicate() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let task = sample_task(now);
        assert!(!task.can_execute(now));
        let due = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        assert!(task.can_execute(due));
        assert!(task.can_execute(due + Duration::minutes(5)));
    }

    #[test]
    fn test_execute_before_due_is_rejected_without_mutation() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let mut task = sample_task(now);
        let version = task.version;
        let next = task.next_run_at;
        let events_before = task.pending_events().len();
        assert!(!task.execute(now));
        assert_eq!(task.version, version);
        assert_eq!(task.next_run_at, next);
        assert_eq!(task.last_run_at, None);
        assert_eq!(task.pending_events().len(), events_before);
    }

    #[test]
    fn test_execute_recurring_advances_next_run() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let mut task = sample_task(now);
        let due = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 30).unwrap();
        assert!(task.execute(due));
        assert_eq!(task.status, ScheduleStatus::Active);
        assert_eq!(task.last_run_at, Some(due));
        assert_eq!(
            task.next_run_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap())
        );
        assert!(task.next_run_at.unwrap() > task.last_run_at.unwrap());
        let events = task.take_events();
        assert!(matches!(
            events.last(),
            Some(ScheduleDomainEvent::TaskExecuted { executed_at, .. }) if *executed_at == due
        ));
        assert!(task.pending_events().is_empty());
    }

    #[test]
    fn test_execute_one_shot_completes() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let mut task = ScheduleTask::new(
            Uuid::new_v4(),
            SourceModule::Reminder,
            "reminder-3",
            "截止提醒",
            TriggerConfig::one_shot(at).unwrap(),
            now,
        );
        assert!(task.execute(at));
        assert_eq!(task.status, ScheduleStatus::Completed);
        assert_eq!(task.next_run_at, None);
        assert_eq!(task.last_run_at, Some(at));
    }

    #[test]
    fn test_update_trigger_config_recomputes_when_active() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let mut task = sample_task(now);
        let noon = TriggerConfig::cron("0 0 12 * * *").unwrap();
        task.update_trigger_config(noon, now);
        assert_eq!(
            task.next_run_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap())
        );
        assert_eq!(task.version, 2);
    }

    #[test]
    fn test_version_tracking_across_persistence() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let mut task = sample_task(now);
        assert_eq!(task.persisted_version(), 0);
        task.mark_persisted();
        assert_eq!(task.persisted_version(), 1);
        task.disable(now);
        assert_eq!(task.version, 2);
        assert_eq!(task.persisted_version(), 1);
    }
}
