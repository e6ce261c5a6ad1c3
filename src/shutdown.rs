use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// 优雅关闭管理器
///
/// 广播通道的一层薄封装：组件订阅后等待一次性的关闭信号。
/// 关闭只会触发一次，重复调用是无操作。
#[derive(Clone)]
pub struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    fired: Arc<AtomicBool>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self {
            shutdown_tx,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 订阅关闭信号
    ///
    /// 关闭已经触发过时返回一个立即可收到信号的接收器，
    /// 晚注册的组件不会错过关闭。
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        if self.fired.load(Ordering::SeqCst) {
            let (tx, rx) = broadcast::channel(1);
            let _ = tx.send(());
            return rx;
        }
        self.shutdown_tx.subscribe()
    }

    /// 触发关闭；仅第一次调用生效
    pub fn shutdown(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            debug!("关闭信号已经触发过");
            return;
        }
        info!(
            "发送关闭信号给 {} 个订阅者",
            self.shutdown_tx.receiver_count()
        );
        // 没有订阅者时发送失败，忽略
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_shutdown(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}
