use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::errors::{ScheduleError, ScheduleResult};

/// CRON表达式的解析与求值
///
/// 触发配置的周期性部分统一经过这里，解析失败映射为 `InvalidCron`。
pub struct CronScheduler {
    schedule: Schedule,
}

impl CronScheduler {
    pub fn new(cron_expr: &str) -> ScheduleResult<Self> {
        let schedule = Schedule::from_str(cron_expr).map_err(|e| ScheduleError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { schedule })
    }

    /// 严格晚于 `after` 的下一次触发时刻；无后续触发返回None
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// 校验表达式而不保留调度器
    pub fn validate_expression(cron_expr: &str) -> ScheduleResult<()> {
        Self::new(cron_expr).map(|_| ())
    }
}
