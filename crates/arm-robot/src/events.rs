//! 整臂事件广播
//!
//! 两种订阅方式：
//! - `subscribe()`：返回 channel 接收端，适合独立线程消费
//! - `add_listener()`：注册 `RobotListener` 回调，在发布线程上同步调用
//!
//! 发布永不阻塞：channel 订阅使用 `try_send`，队列满时丢弃本条事件并记录，
//! 接收端已断开的订阅者被移除。
//! 回调必须快速返回，且不能在回调里再注册订阅。

use crate::state::{RobotMeta, RobotState};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// 默认订阅队列容量
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

/// 整臂事件
#[derive(Debug, Clone, PartialEq)]
pub enum RobotEvent {
    /// 构造完成，关节参数已就绪
    Ready,
    /// 完整状态
    State(RobotState),
    /// 元信息
    Meta(RobotMeta),
    /// 编码器数据可读（仅信号）
    Encoder,
}

impl RobotEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RobotEvent::Ready => "ready",
            RobotEvent::State(_) => "state",
            RobotEvent::Meta(_) => "meta",
            RobotEvent::Encoder => "encoder",
        }
    }
}

/// 事件回调
pub trait RobotListener: Send + Sync {
    fn on_event(&self, event: &RobotEvent);
}

impl<F> RobotListener for F
where
    F: Fn(&RobotEvent) + Send + Sync,
{
    fn on_event(&self, event: &RobotEvent) {
        self(event)
    }
}

/// 订阅者集合
#[derive(Default)]
pub(crate) struct EventHub {
    subscribers: RwLock<Vec<Sender<RobotEvent>>>,
    listeners: RwLock<Vec<Arc<dyn RobotListener>>>,
}

impl EventHub {
    pub(crate) fn subscribe(&self, capacity: usize) -> Receiver<RobotEvent> {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        self.subscribers.write().push(tx);
        rx
    }

    pub(crate) fn add_listener(&self, listener: Arc<dyn RobotListener>) {
        self.listeners.write().push(listener);
    }

    pub(crate) fn has_subscribers(&self) -> bool {
        !self.subscribers.read().is_empty() || !self.listeners.read().is_empty()
    }

    pub(crate) fn publish(&self, event: RobotEvent) {
        trace!("Robot event: {}", event.name());

        for listener in self.listeners.read().iter() {
            listener.on_event(&event);
        }

        self.subscribers
            .write()
            .retain(|tx| match tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!("Robot event subscriber is full, dropping {} event", event.name());
                    true
                },
                Err(TrySendError::Disconnected(_)) => {
                    debug!("Robot event subscriber disconnected, removing");
                    false
                },
            });
    }
}
