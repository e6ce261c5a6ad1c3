use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::executor::ScheduleTaskExecutor;

/// 调度轮询器
///
/// 单进程的固定间隔轮询循环，每个周期扫描一轮到期任务并交给
/// 执行器。收到关闭信号后在当前周期边界退出。
pub struct SchedulePoller {
    executor: Arc<ScheduleTaskExecutor>,
    poll_interval: Duration,
}

impl SchedulePoller {
    pub fn new(executor: Arc<ScheduleTaskExecutor>, poll_interval: Duration) -> Self {
        Self {
            executor,
            poll_interval,
        }
    }

    /// 运行轮询循环直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "调度轮询器启动, 轮询间隔: {}秒",
            self.poll_interval.as_secs()
        );
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Utc::now();
                    match self.executor.scan_and_execute(now).await {
                        Ok(0) => {}
                        Ok(count) => {
                            info!("本轮触发了 {} 个计划任务", count);
                        }
                        Err(e) => {
                            // 整轮失败（通常是存储不可用），等待下个周期重试
                            error!("到期任务扫描失败: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("调度轮询器收到关闭信号，停止轮询");
                    break;
                }
            }
        }
    }
}
