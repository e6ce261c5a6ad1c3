use thiserror::Error;
use uuid::Uuid;

use crate::schedule_task::SourceModule;

/// 计划任务引擎错误类型定义
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("数据库操作失败: {0}")]
    DatabaseOperation(String),

    #[error("计划任务不存在: uuid={uuid}")]
    TaskNotFound { uuid: Uuid },

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("无效的触发配置: {0}")]
    InvalidTrigger(String),

    #[error("来源实体不需要调度: module={source_module}, entity={source_entity_id}")]
    NoScheduleRequired {
        source_module: SourceModule,
        source_entity_id: String,
    },

    #[error("未注册的触发策略: module={0}")]
    StrategyNotFound(SourceModule),

    #[error("版本冲突: uuid={uuid}, 期望版本={expected}, 实际版本={actual}")]
    VersionConflict {
        uuid: Uuid,
        expected: i64,
        actual: i64,
    },

    #[error("数据序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("事件总线操作失败: {0}")]
    EventBus(String),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type ScheduleResult<T> = Result<T, ScheduleError>;

impl ScheduleError {
    pub fn task_not_found(uuid: Uuid) -> Self {
        Self::TaskNotFound { uuid }
    }

    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        Self::DatabaseOperation(msg.into())
    }

    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// 是否为预期内的非异常结果（调用方按info级别记录即可）
    pub fn is_expected(&self) -> bool {
        matches!(self, ScheduleError::NoScheduleRequired { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScheduleError::Internal(_) | ScheduleError::Configuration(_)
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScheduleError::DatabaseOperation(_) | ScheduleError::EventBus(_)
        )
    }
}

impl From<sqlx::Error> for ScheduleError {
    fn from(err: sqlx::Error) -> Self {
        ScheduleError::DatabaseOperation(err.to_string())
    }
}

impl From<serde_json::Error> for ScheduleError {
    fn from(err: serde_json::Error) -> Self {
        ScheduleError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for ScheduleError {
    fn from(err: anyhow::Error) -> Self {
        ScheduleError::Internal(err.to_string())
    }
}
