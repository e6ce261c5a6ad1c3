//! 基础设施实现
//!
//! 领域端口的具体实现：SQLite仓储、内存仓储和进程内事件总线。

pub mod event_bus;
pub mod memory_repository;
pub mod sqlite_repository;

pub use event_bus::InMemoryEventBus;
pub use memory_repository::InMemoryScheduleTaskRepository;
pub use sqlite_repository::SqliteScheduleTaskRepository;
