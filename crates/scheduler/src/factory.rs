use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use dayflow_domain::{
    ScheduleError, ScheduleResult, ScheduleTask, SourceEntitySnapshot, SourceModule,
    TriggerConfig, TriggerStrategy,
};

/// 触发策略注册表
///
/// 启动时显式注册，按来源模块查找。注册表本身不做任何运行期发现。
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: HashMap<SourceModule, Arc<dyn TriggerStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    pub fn register(&mut self, strategy: Arc<dyn TriggerStrategy>) {
        let module = strategy.source_module();
        debug!("注册触发策略: {}", module);
        self.strategies.insert(module, strategy);
    }

    pub fn get(&self, module: SourceModule) -> ScheduleResult<Arc<dyn TriggerStrategy>> {
        self.strategies
            .get(&module)
            .cloned()
            .ok_or(ScheduleError::StrategyNotFound(module))
    }
}

/// 工厂的创建入参：来源实体的归属与快照
#[derive(Debug, Clone)]
pub struct CreateScheduleTaskInput {
    pub account_uuid: Uuid,
    pub source_module: SourceModule,
    pub source_entity_id: String,
    pub snapshot: SourceEntitySnapshot,
}

/// 计划任务工厂
///
/// 把来源模块特有的实体快照翻译为计划任务聚合。返回的聚合未持久化，
/// 保存是调用方的职责。
pub struct ScheduleTaskFactory {
    registry: Arc<StrategyRegistry>,
}

impl ScheduleTaskFactory {
    pub fn new(registry: Arc<StrategyRegistry>) -> Self {
        Self { registry }
    }

    /// 从来源实体创建计划任务
    ///
    /// 策略判定来源实体不需要调度时返回 `NoScheduleRequired`，
    /// 对调用方而言这是预期内的结果而非系统故障。
    pub fn create_from_source(
        &self,
        input: &CreateScheduleTaskInput,
        now: DateTime<Utc>,
    ) -> ScheduleResult<ScheduleTask> {
        let strategy = self.registry.get(input.source_module)?;
        let trigger_config = strategy.derive(&input.snapshot)?;

        Ok(ScheduleTask::new(
            input.account_uuid,
            input.source_module,
            input.source_entity_id.clone(),
            input.snapshot.title.clone(),
            trigger_config,
            now,
        ))
    }

    /// 仅重新推导触发配置（供事件桥处理更新事件使用）
    pub fn derive_trigger(
        &self,
        source_module: SourceModule,
        snapshot: &SourceEntitySnapshot,
    ) -> ScheduleResult<TriggerConfig> {
        let strategy = self.registry.get(source_module)?;
        strategy.derive(snapshot)
    }
}

/// 提醒模块的触发描述
///
/// 提醒实体用三种形式之一表达触发时机，随快照的 `trigger` 字段传入。
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReminderTrigger {
    /// CRON表达式（秒级字段）
    Cron { expression: String },
    /// 每日固定时刻
    Daily { hour: u32, minute: u32 },
    /// 一次性截止时刻
    Once { at: DateTime<Utc> },
    /// 未配置触发
    None,
}

/// 提醒模块触发策略
pub struct ReminderTriggerStrategy;

impl ReminderTriggerStrategy {
    pub fn new() -> Self {
        Self
    }

    fn no_schedule(snapshot: &SourceEntitySnapshot) -> ScheduleError {
        ScheduleError::NoScheduleRequired {
            source_module: SourceModule::Reminder,
            source_entity_id: snapshot.title.clone(),
        }
    }
}

impl Default for ReminderTriggerStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl TriggerStrategy for ReminderTriggerStrategy {
    fn source_module(&self) -> SourceModule {
        SourceModule::Reminder
    }

    fn derive(&self, snapshot: &SourceEntitySnapshot) -> ScheduleResult<TriggerConfig> {
        if !snapshot.enabled {
            debug!("提醒 '{}' 处于禁用状态，不需要调度", snapshot.title);
            return Err(Self::no_schedule(snapshot));
        }
        if snapshot.trigger.is_null() {
            debug!("提醒 '{}' 未配置触发，不需要调度", snapshot.title);
            return Err(Self::no_schedule(snapshot));
        }

        let trigger: ReminderTrigger = serde_json::from_value(snapshot.trigger.clone())
            .map_err(|e| {
                ScheduleError::InvalidTrigger(format!(
                    "无法解析提醒触发描述: {e}"
                ))
            })?;

        match trigger {
            ReminderTrigger::Cron { expression } => TriggerConfig::cron(expression),
            ReminderTrigger::Daily { hour, minute } => {
                NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| {
                    ScheduleError::InvalidTrigger(format!(
                        "无效的每日触发时刻: {hour}:{minute}"
                    ))
                })?;
                TriggerConfig::cron(format!("0 {minute} {hour} * * *"))
            }
            ReminderTrigger::Once { at } => TriggerConfig::one_shot(at),
            ReminderTrigger::None => Err(Self::no_schedule(snapshot)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn snapshot(enabled: bool, trigger: serde_json::Value) -> SourceEntitySnapshot {
        SourceEntitySnapshot {
            title: "喝水提醒".to_string(),
            enabled,
            status: "active".to_string(),
            trigger,
        }
    }

    fn factory() -> ScheduleTaskFactory {
        let mut registry = StrategyRegistry::new();
        registry.register(Arc::new(ReminderTriggerStrategy::new()));
        ScheduleTaskFactory::new(Arc::new(registry))
    }

    #[test]
    fn test_create_from_daily_reminder() {
        let factory = factory();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let input = CreateScheduleTaskInput {
            account_uuid: Uuid::new_v4(),
            source_module: SourceModule::Reminder,
            source_entity_id: "reminder-1".to_string(),
            snapshot: snapshot(true, json!({"type": "daily", "hour": 9, "minute": 30})),
        };

        let task = factory.create_from_source(&input, now).unwrap();
        assert!(task.is_active());
        assert!(task.enabled);
        assert_eq!(
            task.next_run_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap())
        );
        assert_eq!(task.task_name, "喝水提醒");
    }

    #[test]
    fn test_disabled_reminder_needs_no_schedule() {
        let factory = factory();
        let now = Utc::now();
        let input = CreateScheduleTaskInput {
            account_uuid: Uuid::new_v4(),
            source_module: SourceModule::Reminder,
            source_entity_id: "reminder-2".to_string(),
            snapshot: snapshot(false, json!({"type": "daily", "hour": 9, "minute": 0})),
        };

        let result = factory.create_from_source(&input, now);
        assert!(matches!(
            result,
            Err(ScheduleError::NoScheduleRequired { .. })
        ));
    }

    #[test]
    fn test_missing_trigger_needs_no_schedule() {
        let factory = factory();
        let input = CreateScheduleTaskInput {
            account_uuid: Uuid::new_v4(),
            source_module: SourceModule::Reminder,
            source_entity_id: "reminder-3".to_string(),
            snapshot: snapshot(true, serde_json::Value::Null),
        };
        assert!(matches!(
            factory.create_from_source(&input, Utc::now()),
            Err(ScheduleError::NoScheduleRequired { .. })
        ));
    }

    #[test]
    fn test_unregistered_module_is_an_error() {
        let factory = factory();
        let input = CreateScheduleTaskInput {
            account_uuid: Uuid::new_v4(),
            source_module: SourceModule::Goal,
            source_entity_id: "goal-1".to_string(),
            snapshot: snapshot(true, json!({"type": "none"})),
        };
        assert!(matches!(
            factory.create_from_source(&input, Utc::now()),
            Err(ScheduleError::StrategyNotFound(SourceModule::Goal))
        ));
    }

    #[test]
    fn test_invalid_daily_time_is_rejected() {
        let factory = factory();
        let input = CreateScheduleTaskInput {
            account_uuid: Uuid::new_v4(),
            source_module: SourceModule::Reminder,
            source_entity_id: "reminder-4".to_string(),
            snapshot: snapshot(true, json!({"type": "daily", "hour": 25, "minute": 0})),
        };
        assert!(matches!(
            factory.create_from_source(&input, Utc::now()),
            Err(ScheduleError::InvalidTrigger(_))
        ));
    }
}
