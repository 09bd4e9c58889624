//! 关节事件
//!
//! 关节在生命周期边沿（开始回零、到达零位、使能、去使能、复位）发出事件。
//! 事件通过无界 channel 投递，发送方永不阻塞；
//! 上层在自己的调度时隙里消费事件。

use crossbeam_channel::Sender;
use serde::Serialize;
use tracing::trace;

/// 关节事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JointEventKind {
    /// 开始回零
    Homing,
    /// 回零完成
    Home,
    /// 已使能
    Enabled,
    /// 已去使能
    Disabled,
    /// 已复位
    Reset,
}

/// 关节事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JointEvent {
    /// 发出事件的关节
    pub joint: String,
    pub kind: JointEventKind,
}

/// 事件发送端
///
/// 在关节构造时交给关节，绑定关节 id。
#[derive(Debug, Clone)]
pub struct EventSink {
    joint: String,
    tx: Sender<JointEvent>,
}

impl EventSink {
    pub fn new(joint: impl Into<String>, tx: Sender<JointEvent>) -> Self {
        Self {
            joint: joint.into(),
            tx,
        }
    }

    /// 发出事件；接收端已关闭时静默丢弃
    pub fn emit(&self, kind: JointEventKind) {
        let event = JointEvent {
            joint: self.joint.clone(),
            kind,
        };
        if self.tx.send(event).is_err() {
            trace!("Joint {}: event receiver dropped, {:?} discarded", self.joint, kind);
        }
    }

    pub fn joint(&self) -> &str {
        &self.joint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_tags_joint_id() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let sink = EventSink::new("j2", tx);
        sink.emit(JointEventKind::Home);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.joint, "j2");
        assert_eq!(event.kind, JointEventKind::Home);
    }

    #[test]
    fn test_emit_after_receiver_dropped_does_not_panic() {
        let (tx, rx) = crossbeam_channel::unbounded();
        drop(rx);
        EventSink::new("j0", tx).emit(JointEventKind::Reset);
    }
}
