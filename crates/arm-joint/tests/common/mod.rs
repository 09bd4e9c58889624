//! 测试辅助：回环总线上的单个 BusJoint

#![allow(dead_code)]

use arm_can::{BusChannel, LoopbackBus};
use arm_joint::protocol;
use arm_joint::{BusJoint, EventSink, JointConfig, JointEvent, JointEventKind, JointParams};
use crossbeam_channel::Receiver;
use std::sync::Arc;

/// 状态字：ready + switched on + operation enabled + quick stop
pub const SW_OPERATION_ENABLED: u16 = 0x0027;
/// 状态字：switch on disabled
pub const SW_DISABLED: u16 = 0x0040;
/// bit 12
pub const SW_HOMING_ATTAINED: u16 = 0x1000;
/// bit 13
pub const SW_HOMING_ERROR: u16 = 0x2000;

pub const NODE: u8 = 3;
pub const COUNTS_PER_DEGREE: f64 = 100.0;

pub struct Harness {
    pub bus: Arc<LoopbackBus>,
    pub joint: BusJoint,
    pub events: Receiver<JointEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_params(JointParams::default())
    }

    pub fn with_params(params: JointParams) -> Self {
        let bus = Arc::new(LoopbackBus::new("test"));
        let channel: Arc<dyn BusChannel> = bus.clone();
        let (tx, events) = crossbeam_channel::unbounded();

        let config = JointConfig {
            counts_per_degree: COUNTS_PER_DEGREE,
            params,
            ..JointConfig::new("j0", NODE)
        };
        let joint = BusJoint::new(&config, channel, EventSink::new("j0", tx)).unwrap();

        Self { bus, joint, events }
    }

    /// 模拟驱动器上报 TPDO1
    pub fn feedback(&self, statusword: u16, position: i32) {
        self.joint
            .handle_frame(&protocol::feedback_frame(NODE, statusword, position))
            .unwrap();
    }

    /// 进入 operation enabled 并清空已发送帧和事件
    pub fn enabled(self) -> Self {
        self.feedback(SW_OPERATION_ENABLED, 0);
        self.bus.clear_sent();
        self.drain_events();
        self
    }

    pub fn drain_events(&self) -> Vec<JointEventKind> {
        self.events.try_iter().map(|e| e.kind).collect()
    }
}
