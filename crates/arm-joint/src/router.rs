//! 反馈帧分发
//!
//! 一条总线上挂多个驱动器，由单个接收线程读取所有帧，
//! 按 COB-ID 中的 node id 分发给对应的 `BusJoint`。

use crate::bus_joint::BusJoint;
use crate::error::JointError;
use crate::protocol;
use arm_can::{BusChannel, BusError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// node id → 关节
#[derive(Default)]
pub struct FrameRouter {
    joints: RwLock<HashMap<u8, Arc<BusJoint>>>,
}

impl FrameRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册关节；同一 node id 只能注册一次
    pub fn register(&self, joint: Arc<BusJoint>) -> Result<(), JointError> {
        use crate::controller::JointController;

        let node = joint.bus_address();
        let mut joints = self.joints.write();
        if let Some(existing) = joints.get(&node) {
            return Err(JointError::Construction {
                joint: joint.id().to_string(),
                reason: format!("bus address {} already used by '{}'", node, existing.id()),
            });
        }
        joints.insert(node, joint);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.joints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.read().is_empty()
    }

    /// 分发一帧；返回是否有关节处理了它
    pub fn route(&self, frame: &arm_can::BusFrame) -> bool {
        let node = protocol::node_of(frame.id);
        let joint = self.joints.read().get(&node).cloned();
        let Some(joint) = joint else {
            trace!("No joint for node {} (COB-ID 0x{:03X})", node, frame.id);
            return false;
        };

        match joint.handle_frame(frame) {
            Ok(()) => true,
            Err(e) => {
                // 同一 node 的其他服务（NMT、EMCY……）不是错误
                trace!("Node {}: frame 0x{:03X} ignored: {}", node, frame.id, e);
                false
            },
        }
    }
}

/// 接收线程配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxConfig {
    /// 单次接收超时（毫秒），决定停止标志的响应速度
    pub receive_timeout_ms: u64,
}

impl Default for RxConfig {
    fn default() -> Self {
        Self {
            receive_timeout_ms: 2,
        }
    }
}

/// 接收线程主循环
///
/// `is_running` 被清除或遇到致命总线错误时退出；
/// 致命错误会同时清除 `is_running`。
pub fn rx_loop(
    channel: Arc<dyn BusChannel>,
    router: Arc<FrameRouter>,
    is_running: Arc<AtomicBool>,
    config: RxConfig,
) {
    let timeout = Duration::from_millis(config.receive_timeout_ms.max(1));

    loop {
        if !is_running.load(Ordering::Acquire) {
            trace!("RX thread: is_running flag is false, exiting");
            break;
        }

        let frame = match channel.receive_timeout(timeout) {
            Ok(frame) => frame,
            Err(BusError::Timeout) => continue,
            Err(e) if e.is_fatal() => {
                error!("RX thread: fatal bus error on {}: {}", channel.name(), e);
                is_running.store(false, Ordering::Release);
                break;
            },
            Err(e) => {
                warn!("RX thread: bus receive error: {}", e);
                continue;
            },
        };

        router.route(&frame);
    }
}

/// 接收线程句柄
///
/// `stop()` 或 drop 时停止并 join。
pub struct RxThread {
    is_running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl RxThread {
    pub fn spawn(
        channel: Arc<dyn BusChannel>,
        router: Arc<FrameRouter>,
        config: RxConfig,
    ) -> Result<Self, JointError> {
        let is_running = Arc::new(AtomicBool::new(true));
        let flag = is_running.clone();
        let name = format!("arm-rx-{}", channel.name());

        let handle = std::thread::Builder::new()
            .name(name)
            .spawn(move || rx_loop(channel, router, flag, config))
            .map_err(|e| JointError::Bus(BusError::Io(e)))?;

        info!("RX thread started");
        Ok(Self {
            is_running,
            handle: Some(handle),
        })
    }

    /// 线程是否仍在运行（致命错误后为 false）
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    pub fn stop(&mut self) {
        self.is_running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("RX thread panicked");
            } else {
                debug!("RX thread joined");
            }
        }
    }
}

impl Drop for RxThread {
    fn drop(&mut self) {
        self.stop();
    }
}
