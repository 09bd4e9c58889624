//! 进程内仿真关节
//!
//! 不接总线，命令立即完成并发出与真实驱动器相同的事件序列。
//! 用于 CLI 的 `--sim` 模式和上层集成测试。

use crate::config::JointConfig;
use crate::controller::{JointController, JointFactory};
use crate::error::JointError;
use crate::event::{EventSink, JointEventKind};
use crate::params::{JointParam, JointParams};
use crate::state::{JointState, ParameterReading, SharedJointState};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// 仿真关节
pub struct SimJoint {
    id: String,
    bus_address: u8,
    counts_per_degree: f64,
    params: Mutex<JointParams>,
    pending: Mutex<Option<f64>>,
    state: SharedJointState,
    events: EventSink,
    writes: AtomicU64,
}

impl SimJoint {
    pub fn new(config: &JointConfig, events: EventSink) -> Self {
        let mut initial = JointState::new(config.id.clone(), config.bus_address);
        initial.zero_step = (config.params.limit_adj * config.counts_per_degree).round() as i32;

        Self {
            id: config.id.clone(),
            bus_address: config.bus_address,
            counts_per_degree: config.counts_per_degree,
            params: Mutex::new(config.params),
            pending: Mutex::new(None),
            state: SharedJointState::new(initial),
            events,
            writes: AtomicU64::new(0),
        }
    }

    /// 实际写出的设定点数量
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    fn set_enabled(&self, enabled: bool) {
        let (prev, next) = self.state.update(|s| s.enabled = enabled);
        match (prev.enabled, next.enabled) {
            (false, true) => self.events.emit(JointEventKind::Enabled),
            (true, false) => self.events.emit(JointEventKind::Disabled),
            _ => {},
        }
    }

    fn finish_homing(&self) {
        self.state.update(|s| {
            s.homing = true;
            s.homed = false;
        });
        self.events.emit(JointEventKind::Homing);

        self.state.update(|s| {
            s.homing = false;
            s.homed = true;
            s.position = 0.0;
        });
        self.events.emit(JointEventKind::Home);
    }
}

impl JointController for SimJoint {
    fn id(&self) -> &str {
        &self.id
    }

    fn bus_address(&self) -> u8 {
        self.bus_address
    }

    fn write_set_point(&self) -> Result<(), JointError> {
        if !self.state.load().enabled {
            return Ok(());
        }
        let Some(target) = self.pending.lock().take() else {
            return Ok(());
        };
        self.state.update(|s| s.position = target);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn set_position(&self, position: f64, velocity: Option<f64>) -> Result<(), JointError> {
        if !position.is_finite() {
            return Err(JointError::InvalidArgument(format!(
                "position must be finite, got {}",
                position
            )));
        }
        if let Some(v) = velocity
            && !(v.is_finite() && v > 0.0)
        {
            return Err(JointError::InvalidArgument(format!(
                "velocity must be > 0, got {}",
                v
            )));
        }

        let clamped = self.params.lock().clamp_position(position);
        *self.pending.lock() = Some(clamped);
        self.state.update(|s| {
            s.set_point = Some(clamped);
            s.velocity = velocity;
        });
        Ok(())
    }

    fn go_home(&self) -> Result<(), JointError> {
        self.finish_homing();
        Ok(())
    }

    fn reset(&self) -> Result<(), JointError> {
        self.state.update(|s| s.error = false);
        self.events.emit(JointEventKind::Reset);
        Ok(())
    }

    fn enable(&self) -> Result<(), JointError> {
        self.set_enabled(true);
        Ok(())
    }

    fn disable(&self) -> Result<(), JointError> {
        self.pending.lock().take();
        self.set_enabled(false);
        Ok(())
    }

    fn zero(&self) -> Result<(), JointError> {
        self.set_position(0.0, None)?;
        self.write_set_point()
    }

    fn calibrate(&self) -> Result<(), JointError> {
        self.finish_homing();
        Ok(())
    }

    fn query_position(&self) -> Result<(), JointError> {
        Ok(())
    }

    fn query_parameter(&self, index: u16, subindex: u8) -> Result<(), JointError> {
        self.state.update(|s| {
            s.last_parameter = Some(ParameterReading {
                index,
                subindex,
                value: 0,
            });
        });
        Ok(())
    }

    fn update_zero_step(&self) -> Result<(), JointError> {
        let limit_adj = self.params.lock().limit_adj;
        let step = (limit_adj * self.counts_per_degree).round() as i32;
        self.state.update(|s| s.zero_step = step);
        debug!("Sim joint {}: zero step = {}", self.id, step);
        Ok(())
    }

    fn set_param(&self, param: JointParam) -> Result<(), JointError> {
        self.params.lock().apply(param)?;
        Ok(())
    }

    fn params(&self) -> JointParams {
        *self.params.lock()
    }

    fn state(&self) -> JointState {
        (*self.state.load()).clone()
    }
}

/// 仿真关节工厂
#[derive(Debug, Clone, Copy, Default)]
pub struct SimJointFactory;

impl JointFactory for SimJointFactory {
    fn create(
        &self,
        config: &JointConfig,
        events: EventSink,
    ) -> Result<Arc<dyn JointController>, JointError> {
        Ok(Arc::new(SimJoint::new(config, events)))
    }
}
