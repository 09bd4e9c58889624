//! 内存回环通道
//!
//! 无硬件依赖的 `BusChannel` 实现：
//! - 记录所有发送的帧，供测试断言
//! - `inject()` 注入"从总线收到"的帧
//! - 可选应答器（responder）：对每个发送帧生成应答帧，用于模拟驱动器
//! - 故障注入：发送失败、通道关闭

use crate::{BusChannel, BusError, BusFrame};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// 应答器：根据发送帧生成需要回灌的接收帧
pub type Responder = Box<dyn Fn(&BusFrame) -> Vec<BusFrame> + Send + Sync>;

/// 内存回环通道
pub struct LoopbackBus {
    name: String,
    sent: Mutex<Vec<BusFrame>>,
    rx_tx: Sender<BusFrame>,
    rx_rx: Receiver<BusFrame>,
    responder: Mutex<Option<Responder>>,
    fail_sends: AtomicBool,
    closed: AtomicBool,
}

impl LoopbackBus {
    /// 创建新的回环通道
    pub fn new(name: impl Into<String>) -> Self {
        let (rx_tx, rx_rx) = unbounded();
        Self {
            name: name.into(),
            sent: Mutex::new(Vec::new()),
            rx_tx,
            rx_rx,
            responder: Mutex::new(None),
            fail_sends: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// 设置应答器（替换已有的应答器）
    pub fn set_responder(&self, responder: Responder) {
        *self.responder.lock() = Some(responder);
    }

    /// 注入一帧到接收队列
    pub fn inject(&self, frame: BusFrame) {
        // 接收端由 self 持有，发送不会失败
        let _ = self.rx_tx.send(frame);
    }

    /// 已发送帧的快照
    pub fn sent_frames(&self) -> Vec<BusFrame> {
        self.sent.lock().clone()
    }

    /// 清空已发送帧记录
    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }

    /// 已发送帧数量
    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// 让后续 `send()` 返回错误
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::Relaxed);
    }

    /// 关闭通道，之后收发都返回 `BusError::Closed`
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl BusChannel for LoopbackBus {
    fn send(&self, frame: BusFrame) -> Result<(), BusError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        if self.fail_sends.load(Ordering::Relaxed) {
            return Err(BusError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "injected send failure",
            )));
        }

        self.sent.lock().push(frame);

        let replies = match self.responder.lock().as_ref() {
            Some(responder) => responder(&frame),
            None => Vec::new(),
        };
        for reply in replies {
            self.inject(reply);
        }
        Ok(())
    }

    fn receive_timeout(&self, timeout: Duration) -> Result<BusFrame, BusError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        match self.rx_rx.recv_timeout(timeout) {
            Ok(frame) => Ok(frame),
            Err(RecvTimeoutError::Timeout) => Err(BusError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(BusError::Closed),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
