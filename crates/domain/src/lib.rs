pub mod cron_utils;
pub mod errors;
pub mod events;
pub mod ports;
pub mod schedule_task;
pub mod trigger;

pub use cron_utils::CronScheduler;
pub use errors::{ScheduleError, ScheduleResult};
pub use events::*;
pub use ports::*;
pub use schedule_task::*;
pub use trigger::TriggerConfig;
