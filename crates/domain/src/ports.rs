//! 端口接口定义
//!
//! 调度子系统对外依赖的抽象接口：
//! - 计划任务仓储接口 (ScheduleTaskRepository)
//! - 触发策略接口 (TriggerStrategy)
//! - 事件总线接口 (EventBus)
//!
//! 所有接口与具体实现分离，组合根在进程启动时一次性完成装配，
//! 不存在运行期的跨模块动态解析。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::errors::ScheduleResult;
use crate::events::{ScheduleDomainEvent, SourceEntitySnapshot};
use crate::schedule_task::{ScheduleTask, SourceModule};
use crate::trigger::TriggerConfig;

/// 计划任务仓储接口
///
/// 持久化层必须通过 `version` 字段实施乐观并发控制：`save` 在存储
/// 版本与聚合加载版本不一致时返回 `VersionConflict`。
#[async_trait]
pub trait ScheduleTaskRepository: Send + Sync {
    /// 按uuid查找
    async fn find_by_uuid(&self, uuid: Uuid) -> ScheduleResult<Option<ScheduleTask>>;

    /// 按来源实体查找
    ///
    /// 正常情况下每个来源实体至多对应一个计划任务，但历史或迁移数据
    /// 可能存在重复行，调用方必须遍历整个集合而不能假设单结果。
    async fn find_by_source_entity(
        &self,
        source_module: SourceModule,
        source_entity_id: &str,
    ) -> ScheduleResult<Vec<ScheduleTask>>;

    /// 查询到期任务：ACTIVE且启用、next_run_at <= before，
    /// 按next_run_at升序（最早到期优先）返回
    async fn find_due(&self, before: DateTime<Utc>) -> ScheduleResult<Vec<ScheduleTask>>;

    /// 保存聚合（插入或条件更新）
    ///
    /// 更新以聚合加载时的版本号作为条件；不匹配返回 `VersionConflict`。
    /// 成功后回写聚合的持久化版本标记。
    async fn save(&self, task: &mut ScheduleTask) -> ScheduleResult<()>;

    /// 按uuid删除；目标不存在时幂等成功
    async fn delete_by_uuid(&self, uuid: Uuid) -> ScheduleResult<()>;

    /// 原子认领一个到期任务
    ///
    /// 单条条件更新：仅当存储行版本仍等于 `expected_version` 且仍满足
    /// 到期条件时自增版本并返回 true。返回 false 表示已被其他执行者
    /// 处理，调用方应跳过。
    async fn claim_due(
        &self,
        uuid: Uuid,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> ScheduleResult<bool>;
}

/// 触发策略接口
///
/// 各来源模块对"何时触发"的编码方式不同（固定时刻、重复规则、
/// 一次性截止时间），策略把这种差异隔离在工厂之后，执行器与
/// 到期查询无需任何模块相关知识。
pub trait TriggerStrategy: Send + Sync {
    /// 本策略服务的来源模块
    fn source_module(&self) -> SourceModule;

    /// 从来源实体快照推导触发配置
    ///
    /// 来源实体自身被禁用或不含任何启用的触发描述时返回
    /// `NoScheduleRequired`，这是预期内的非异常结果。
    fn derive(&self, snapshot: &SourceEntitySnapshot) -> ScheduleResult<TriggerConfig>;
}

/// 事件总线接口
///
/// 进程内按类型广播，不提供跨进程投递保证。
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: ScheduleDomainEvent) -> ScheduleResult<()>;

    fn subscribe(&self) -> broadcast::Receiver<ScheduleDomainEvent>;
}
