use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cron_utils::CronScheduler;
use crate::errors::{ScheduleError, ScheduleResult};

/// 触发配置值对象
///
/// 描述一个计划任务"何时触发"：CRON表达式描述周期性触发，
/// `run_at` 描述若干一次性的固定触发时刻，两者可以并存。
/// 下一次触发时间始终取两者中最早的一个。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// CRON表达式（秒级，6/7字段），None表示无周期性触发
    pub cron_expr: Option<String>,
    /// 一次性固定触发时刻
    #[serde(default)]
    pub run_at: Vec<DateTime<Utc>>,
}

impl TriggerConfig {
    pub fn new(
        cron_expr: Option<String>,
        run_at: Vec<DateTime<Utc>>,
    ) -> ScheduleResult<Self> {
        let config = Self { cron_expr, run_at };
        config.validate()?;
        Ok(config)
    }

    /// 纯CRON触发配置
    pub fn cron(expr: impl Into<String>) -> ScheduleResult<Self> {
        Self::new(Some(expr.into()), Vec::new())
    }

    /// 一次性触发配置
    pub fn one_shot(at: DateTime<Utc>) -> ScheduleResult<Self> {
        Self::new(None, vec![at])
    }

    /// 校验触发配置的有效性
    pub fn validate(&self) -> ScheduleResult<()> {
        if self.cron_expr.is_none() && self.run_at.is_empty() {
            return Err(ScheduleError::InvalidTrigger(
                "触发配置必须至少包含CRON表达式或固定触发时刻".to_string(),
            ));
        }
        if let Some(expr) = &self.cron_expr {
            CronScheduler::validate_expression(expr)?;
        }
        Ok(())
    }

    /// 计算严格晚于 `after` 的下一次触发时刻
    ///
    /// None 表示不存在未来触发（一次性任务已消耗完、或CRON已无后续时刻）。
    /// 已通过 `validate` 的配置在此处解析失败时按"无后续触发"处理。
    pub fn next_occurrence(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let cron_next = self
            .cron_expr
            .as_deref()
            .and_then(|expr| CronScheduler::new(expr).ok())
            .and_then(|scheduler| scheduler.next_after(after));

        let fixed_next = self.run_at.iter().filter(|t| **t > after).min().copied();

        match (cron_next, fixed_next) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }

    /// 是否包含周期性触发
    pub fn is_recurring(&self) -> bool {
        self.cron_expr.is_some()
    }
}
