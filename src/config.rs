use std::path::Path;

use serde::{Deserialize, Serialize};

use dayflow_domain::{ScheduleError, ScheduleResult};

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite连接串；设为"memory"时使用内存仓储
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// 调度器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// 到期扫描的轮询间隔（秒）
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// 进程内事件总线容量
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

fn default_database_url() -> String {
    "sqlite:dayflow.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_poll_interval() -> u64 {
    30
}

fn default_event_bus_capacity() -> usize {
    256
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval(),
            event_bus_capacity: default_event_bus_capacity(),
        }
    }
}

impl AppConfig {
    /// 加载配置文件；未指定或文件不存在时使用默认值
    pub fn load(config_path: Option<&str>) -> ScheduleResult<Self> {
        let config = match config_path {
            Some(path) if Path::new(path).exists() => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    ScheduleError::Configuration(format!("读取配置文件 {path} 失败: {e}"))
                })?;
                toml::from_str(&content).map_err(|e| {
                    ScheduleError::Configuration(format!("解析配置文件 {path} 失败: {e}"))
                })?
            }
            _ => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ScheduleResult<()> {
        if self.database.url.is_empty() {
            return Err(ScheduleError::Configuration(
                "数据库连接串不能为空".to_string(),
            ));
        }
        if self.scheduler.poll_interval_seconds == 0 {
            return Err(ScheduleError::Configuration(
                "轮询间隔必须大于0秒".to_string(),
            ));
        }
        if self.scheduler.event_bus_capacity == 0 {
            return Err(ScheduleError::Configuration(
                "事件总线容量必须大于0".to_string(),
            ));
        }
        Ok(())
    }
}
