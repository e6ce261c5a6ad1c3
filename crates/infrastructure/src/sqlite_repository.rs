use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use dayflow_domain::{
    ScheduleError, ScheduleResult, ScheduleStatus, ScheduleTask, ScheduleTaskRepository,
    SourceModule, TriggerConfig,
};

/// SQLite计划任务仓储
pub struct SqliteScheduleTaskRepository {
    pool: SqlitePool,
}

impl SqliteScheduleTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 创建嵌入式SQLite仓储，自动初始化数据库
    pub async fn new_embedded(database_path: &str, max_connections: u32) -> ScheduleResult<Self> {
        use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
        use std::str::FromStr;

        debug!("创建嵌入式SQLite仓储: {}", database_path);

        // 启用外键约束和WAL模式
        let connect_options = SqliteConnectOptions::from_str(database_path)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(1)
            .connect_with(connect_options)
            .await?;

        Self::run_migrations(&pool).await?;

        debug!("嵌入式SQLite仓储初始化完成");
        Ok(Self { pool })
    }

    /// 运行数据库迁移
    async fn run_migrations(pool: &SqlitePool) -> ScheduleResult<()> {
        debug!("运行SQLite数据库迁移");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schedule_tasks (
                uuid TEXT PRIMARY KEY,
                account_uuid TEXT NOT NULL,
                source_module TEXT NOT NULL,
                source_entity_id TEXT NOT NULL,
                task_name TEXT NOT NULL,
                trigger_config TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'ACTIVE',
                enabled INTEGER NOT NULL DEFAULT 1,
                next_run_at DATETIME,
                last_run_at DATETIME,
                version INTEGER NOT NULL DEFAULT 1,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        let indexes = vec![
            "CREATE INDEX IF NOT EXISTS idx_schedule_tasks_status ON schedule_tasks(status)",
            "CREATE INDEX IF NOT EXISTS idx_schedule_tasks_next_run_at ON schedule_tasks(next_run_at)",
            "CREATE INDEX IF NOT EXISTS idx_schedule_tasks_source ON schedule_tasks(source_module, source_entity_id)",
        ];
        for index_sql in indexes {
            sqlx::query(index_sql).execute(pool).await?;
        }

        debug!("SQLite数据库迁移完成");
        Ok(())
    }

    fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> ScheduleResult<ScheduleTask> {
        let uuid_str: String = row.try_get("uuid")?;
        let uuid = Uuid::parse_str(&uuid_str)
            .map_err(|e| ScheduleError::Internal(format!("无效的任务uuid '{uuid_str}': {e}")))?;
        let account_str: String = row.try_get("account_uuid")?;
        let account_uuid = Uuid::parse_str(&account_str).map_err(|e| {
            ScheduleError::Internal(format!("无效的账户uuid '{account_str}': {e}"))
        })?;

        let source_module_str: String = row.try_get("source_module")?;
        let source_module = SourceModule::parse(&source_module_str)?;
        let status_str: String = row.try_get("status")?;
        let status = ScheduleStatus::parse(&status_str)?;

        let trigger_json: String = row.try_get("trigger_config")?;
        let trigger_config: TriggerConfig = serde_json::from_str(&trigger_json)?;

        Ok(ScheduleTask::from_persisted(
            uuid,
            account_uuid,
            source_module,
            row.try_get("source_entity_id")?,
            row.try_get("task_name")?,
            trigger_config,
            status,
            row.try_get::<i64, _>("enabled")? != 0,
            row.try_get("next_run_at")?,
            row.try_get("last_run_at")?,
            row.try_get("version")?,
            row.try_get("created_at")?,
            row.try_get("updated_at")?,
        ))
    }
}

#[async_trait]
impl ScheduleTaskRepository for SqliteScheduleTaskRepository {
    async fn find_by_uuid(&self, uuid: Uuid) -> ScheduleResult<Option<ScheduleTask>> {
        let row = sqlx::query("SELECT * FROM schedule_tasks WHERE uuid = ?")
            .bind(uuid.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| Self::row_to_task(&r)).transpose()
    }

    async fn find_by_source_entity(
        &self,
        source_module: SourceModule,
        source_entity_id: &str,
    ) -> ScheduleResult<Vec<ScheduleTask>> {
        let rows = sqlx::query(
            "SELECT * FROM schedule_tasks
             WHERE source_module = ? AND source_entity_id = ?
             ORDER BY created_at ASC",
        )
        .bind(source_module.as_str())
        .bind(source_entity_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_task).collect()
    }

    async fn find_due(&self, before: DateTime<Utc>) -> ScheduleResult<Vec<ScheduleTask>> {
        let rows = sqlx::query(
            "SELECT * FROM schedule_tasks
             WHERE status = 'ACTIVE'
               AND enabled = 1
               AND next_run_at IS NOT NULL
               AND next_run_at <= ?
             ORDER BY next_run_at ASC",
        )
        .bind(before)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_task).collect()
    }

    async fn save(&self, task: &mut ScheduleTask) -> ScheduleResult<()> {
        let trigger_json = serde_json::to_string(&task.trigger_config)?;

        if task.is_new() {
            sqlx::query(
                r#"
                INSERT INTO schedule_tasks
                    (uuid, account_uuid, source_module, source_entity_id, task_name,
                     trigger_config, status, enabled, next_run_at, last_run_at,
                     version, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(task.uuid.to_string())
            .bind(task.account_uuid.to_string())
            .bind(task.source_module.as_str())
            .bind(task.source_entity_id.as_str())
            .bind(task.task_name.as_str())
            .bind(&trigger_json)
            .bind(task.status.as_str())
            .bind(task.enabled as i64)
            .bind(task.next_run_at)
            .bind(task.last_run_at)
            .bind(task.version)
            .bind(task.created_at)
            .bind(task.updated_at)
            .execute(&self.pool)
            .await?;

            task.mark_persisted();
            return Ok(());
        }

        // 以加载时的版本号作为条件更新，实施乐观并发控制
        let result = sqlx::query(
            r#"
            UPDATE schedule_tasks
            SET task_name = ?, trigger_config = ?, status = ?, enabled = ?,
                next_run_at = ?, last_run_at = ?, version = ?, updated_at = ?
            WHERE uuid = ? AND version = ?
            "#,
        )
        .bind(task.task_name.as_str())
        .bind(&trigger_json)
        .bind(task.status.as_str())
        .bind(task.enabled as i64)
        .bind(task.next_run_at)
        .bind(task.last_run_at)
        .bind(task.version)
        .bind(task.updated_at)
        .bind(task.uuid.to_string())
        .bind(task.persisted_version())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let current = sqlx::query("SELECT version FROM schedule_tasks WHERE uuid = ?")
                .bind(task.uuid.to_string())
                .fetch_optional(&self.pool)
                .await?;
            return match current {
                Some(row) => Err(ScheduleError::VersionConflict {
                    uuid: task.uuid,
                    expected: task.persisted_version(),
                    actual: row.try_get("version")?,
                }),
                None => Err(ScheduleError::TaskNotFound { uuid: task.uuid }),
            };
        }

        task.mark_persisted();
        Ok(())
    }

    async fn delete_by_uuid(&self, uuid: Uuid) -> ScheduleResult<()> {
        sqlx::query("DELETE FROM schedule_tasks WHERE uuid = ?")
            .bind(uuid.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn claim_due(
        &self,
        uuid: Uuid,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> ScheduleResult<bool> {
        // 单条条件更新：版本匹配且仍满足到期条件时自增版本。
        // 并发执行者中只有一个能改到这一行。
        let result = sqlx::query(
            r#"
            UPDATE schedule_tasks
            SET version = version + 1, updated_at = ?
            WHERE uuid = ?
              AND version = ?
              AND status = 'ACTIVE'
              AND enabled = 1
              AND next_run_at IS NOT NULL
              AND next_run_at <= ?
            "#,
        )
        .bind(now)
        .bind(uuid.to_string())
        .bind(expected_version)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
