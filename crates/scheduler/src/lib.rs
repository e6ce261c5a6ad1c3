//! 计划任务调度服务
//!
//! 包含触发策略与工厂、来源事件桥、到期任务执行器和轮询循环。

pub mod event_bridge;
pub mod executor;
pub mod factory;
pub mod poller;

pub use event_bridge::SourceEventBridge;
pub use executor::ScheduleTaskExecutor;
pub use factory::{
    CreateScheduleTaskInput, ReminderTriggerStrategy, ScheduleTaskFactory, StrategyRegistry,
};
pub use poller::SchedulePoller;
