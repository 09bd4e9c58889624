//! CiA 402 总线关节
//!
//! 通过共享 `BusChannel` 与驱动器通信：
//! - 命令 → SDO 加速下载（控制字、运行模式、目标位置……）
//! - 反馈 ← TPDO1 / SDO 应答，由 `FrameRouter` 按 node id 分发到 `handle_frame()`
//!
//! 事件由状态字的边沿产生（`go_home()` / `reset()` 除外，它们在命令发出后立即通知）：
//!
//! | 边沿 | 事件 |
//! |---|---|
//! | operation_enabled 0 → 1 | `Enabled` |
//! | operation_enabled 1 → 0 | `Disabled` |
//! | 回零中且 homing_attained 0 → 1 | `Home` |

use crate::config::JointConfig;
use crate::controller::{JointController, JointFactory};
use crate::error::{JointError, ProtocolError};
use crate::event::{EventSink, JointEventKind};
use crate::params::{JointParam, JointParams};
use crate::protocol::{self, Inbound, OperationMode, SdoValue, Statusword, controlword};
use crate::router::FrameRouter;
use crate::state::{JointState, ParameterReading, SharedJointState};
use arm_can::{BusChannel, BusFrame};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// 锁存的设定点
#[derive(Debug, Clone, Copy)]
struct SetPoint {
    position: f64,
    velocity: Option<f64>,
}

/// 总线关节
pub struct BusJoint {
    id: String,
    node: u8,
    counts_per_degree: f64,
    channel: Arc<dyn BusChannel>,
    params: Mutex<JointParams>,
    pending: Mutex<Option<SetPoint>>,
    state: SharedJointState,
    events: EventSink,
}

impl BusJoint {
    /// 创建总线关节（不做任何总线 I/O）
    pub fn new(
        config: &JointConfig,
        channel: Arc<dyn BusChannel>,
        events: EventSink,
    ) -> Result<Self, JointError> {
        if !(1..=127).contains(&config.bus_address) {
            return Err(JointError::Construction {
                joint: config.id.clone(),
                reason: format!("bus address {} outside 1..=127", config.bus_address),
            });
        }
        if !(config.counts_per_degree.is_finite() && config.counts_per_degree > 0.0) {
            return Err(JointError::Construction {
                joint: config.id.clone(),
                reason: format!("invalid counts_per_degree {}", config.counts_per_degree),
            });
        }

        let mut initial = JointState::new(config.id.clone(), config.bus_address);
        initial.zero_step = zero_step(config.params.limit_adj, config.counts_per_degree);

        Ok(Self {
            id: config.id.clone(),
            node: config.bus_address,
            counts_per_degree: config.counts_per_degree,
            channel,
            params: Mutex::new(config.params),
            pending: Mutex::new(None),
            state: SharedJointState::new(initial),
            events,
        })
    }

    fn send_all(&self, frames: &[BusFrame]) -> Result<(), JointError> {
        for frame in frames {
            self.channel.send(*frame)?;
        }
        Ok(())
    }

    fn direction(params: &JointParams) -> f64 {
        if params.invert { -1.0 } else { 1.0 }
    }

    fn to_counts(&self, degrees: f64, params: &JointParams, zero_step: i32) -> i32 {
        let offset = (degrees * self.counts_per_degree * Self::direction(params)).round();
        zero_step.saturating_add(offset as i32)
    }

    fn to_degrees(&self, counts: i32, params: &JointParams, zero_step: i32) -> f64 {
        (counts as i64 - zero_step as i64) as f64 / self.counts_per_degree
            * Self::direction(params)
    }

    /// 设定点未发出时放回（不覆盖更新的设定点）
    fn restore_pending(&self, set_point: SetPoint) {
        let mut pending = self.pending.lock();
        if pending.is_none() {
            *pending = Some(set_point);
        }
    }

    fn start_homing(&self, method: i8) -> Result<(), JointError> {
        self.state.update(|s| {
            s.homing = true;
            s.homed = false;
        });

        let frames = [
            protocol::sdo_download(
                self.node,
                protocol::OD_HOMING_METHOD,
                0,
                SdoValue::I8(method),
            ),
            protocol::sdo_download(
                self.node,
                protocol::OD_MODES_OF_OPERATION,
                0,
                SdoValue::U8(OperationMode::Homing.into()),
            ),
            protocol::controlword_frame(self.node, controlword::ENABLE_OPERATION),
            protocol::controlword_frame(self.node, controlword::NEW_SET_POINT),
        ];
        if let Err(e) = self.send_all(&frames) {
            self.state.update(|s| s.homing = false);
            return Err(e);
        }

        self.events.emit(JointEventKind::Homing);
        Ok(())
    }

    /// 处理路由过来的帧
    pub fn handle_frame(&self, frame: &BusFrame) -> Result<(), ProtocolError> {
        let (_, inbound) = protocol::decode(frame)?;
        match inbound {
            Inbound::Feedback {
                statusword,
                position,
            } => self.apply_feedback(statusword, Some(position)),
            Inbound::Upload {
                index: protocol::OD_POSITION_ACTUAL,
                value,
                ..
            } => {
                let params = *self.params.lock();
                self.state.update(|s| {
                    s.position = self.to_degrees(value as i32, &params, s.zero_step);
                });
            },
            Inbound::Upload {
                index: protocol::OD_STATUSWORD,
                value,
                ..
            } => self.apply_feedback(Statusword::from(value as u16), None),
            Inbound::Upload {
                index,
                subindex,
                value,
            } => {
                debug!(
                    "Joint {}: parameter 0x{:04X}:{} = 0x{:08X}",
                    self.id, index, subindex, value
                );
                self.state.update(|s| {
                    s.last_parameter = Some(ParameterReading {
                        index,
                        subindex,
                        value,
                    });
                });
            },
            Inbound::DownloadAck { index, subindex } => {
                trace!("Joint {}: SDO ack 0x{:04X}:{}", self.id, index, subindex);
            },
            Inbound::Abort {
                index,
                subindex,
                code,
            } => {
                warn!(
                    "Joint {}: SDO abort on 0x{:04X}:{} (code 0x{:08X})",
                    self.id, index, subindex, code
                );
            },
        }
        Ok(())
    }

    fn apply_feedback(&self, statusword: Statusword, position: Option<i32>) {
        let params = *self.params.lock();
        let (prev, next) = self.state.update(|s| {
            s.enabled = statusword.operation_enabled();
            s.error = statusword.fault();
            if let Some(counts) = position {
                s.position = self.to_degrees(counts, &params, s.zero_step);
            }
            if s.homing {
                if statusword.homing_error() {
                    s.homing = false;
                    s.error = true;
                } else if statusword.homing_attained() {
                    s.homing = false;
                    s.homed = true;
                }
            }
        });

        if !prev.enabled && next.enabled {
            self.events.emit(JointEventKind::Enabled);
        } else if prev.enabled && !next.enabled {
            self.events.emit(JointEventKind::Disabled);
        }

        if !prev.homed && next.homed {
            info!("Joint {}: home reached", self.id);
            // 回零结束后切回轮廓位置模式
            let frame = protocol::sdo_download(
                self.node,
                protocol::OD_MODES_OF_OPERATION,
                0,
                SdoValue::U8(OperationMode::ProfilePosition.into()),
            );
            if let Err(e) = self.channel.send(frame) {
                warn!("Joint {}: failed to restore profile mode: {}", self.id, e);
            }
            self.events.emit(JointEventKind::Home);
        } else if prev.homing && !next.homing {
            warn!("Joint {}: homing failed", self.id);
        }

        if !prev.error && next.error {
            warn!("Joint {}: drive reports fault", self.id);
        }
    }
}

fn zero_step(limit_adj: f64, counts_per_degree: f64) -> i32 {
    (limit_adj * counts_per_degree).round() as i32
}

impl JointController for BusJoint {
    fn id(&self) -> &str {
        &self.id
    }

    fn bus_address(&self) -> u8 {
        self.node
    }

    fn write_set_point(&self) -> Result<(), JointError> {
        let Some(set_point) = self.pending.lock().take() else {
            return Ok(());
        };

        let state = self.state.load();
        if !state.enabled {
            trace!("Joint {}: not enabled, set-point held", self.id);
            self.restore_pending(set_point);
            return Ok(());
        }

        let params = *self.params.lock();
        let counts = self.to_counts(set_point.position, &params, state.zero_step);
        let velocity = set_point.velocity.unwrap_or(params.max_speed);
        let velocity_counts = (velocity.abs() * self.counts_per_degree).round() as u32;

        let frames = [
            protocol::sdo_download(
                self.node,
                protocol::OD_PROFILE_VELOCITY,
                0,
                SdoValue::U32(velocity_counts),
            ),
            protocol::sdo_download(
                self.node,
                protocol::OD_TARGET_POSITION,
                0,
                SdoValue::I32(counts),
            ),
            protocol::controlword_frame(self.node, controlword::SET_POINT_IMMEDIATE),
            protocol::controlword_frame(self.node, controlword::ENABLE_OPERATION),
        ];
        if let Err(e) = self.send_all(&frames) {
            self.restore_pending(set_point);
            return Err(e);
        }
        trace!(
            "Joint {}: set-point {:.3}° ({} counts) sent",
            self.id, set_point.position, counts
        );
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
        if clamped != position {
            debug!(
                "Joint {}: set-point {:.3}° clamped to {:.3}°",
                self.id, position, clamped
            );
        }

        *self.pending.lock() = Some(SetPoint {
            position: clamped,
            velocity,
        });
        self.state.update(|s| {
            s.set_point = Some(clamped);
            s.velocity = velocity;
        });
        Ok(())
    }

    fn go_home(&self) -> Result<(), JointError> {
        self.start_homing(protocol::homing_method::NEGATIVE_LIMIT_SWITCH)
    }

    fn reset(&self) -> Result<(), JointError> {
        self.send_all(&[
            protocol::controlword_frame(self.node, controlword::FAULT_RESET),
            protocol::controlword_frame(self.node, controlword::SHUTDOWN),
        ])?;
        self.state.update(|s| s.error = false);
        self.events.emit(JointEventKind::Reset);
        Ok(())
    }

    fn enable(&self) -> Result<(), JointError> {
        let acceleration = self.params.lock().acceleration;
        self.send_all(&[
            protocol::sdo_download(
                self.node,
                protocol::OD_MODES_OF_OPERATION,
                0,
                SdoValue::U8(OperationMode::ProfilePosition.into()),
            ),
            protocol::sdo_download(
                self.node,
                protocol::OD_PROFILE_ACCELERATION,
                0,
                SdoValue::U32((acceleration * self.counts_per_degree).round() as u32),
            ),
            protocol::controlword_frame(self.node, controlword::SHUTDOWN),
            protocol::controlword_frame(self.node, controlword::SWITCH_ON),
            protocol::controlword_frame(self.node, controlword::ENABLE_OPERATION),
        ])
    }

    fn disable(&self) -> Result<(), JointError> {
        self.pending.lock().take();
        self.send_all(&[protocol::controlword_frame(
            self.node,
            controlword::SHUTDOWN,
        )])
    }

    fn zero(&self) -> Result<(), JointError> {
        self.set_position(0.0, None)?;
        self.write_set_point()
    }

    fn calibrate(&self) -> Result<(), JointError> {
        self.start_homing(protocol::homing_method::CURRENT_POSITION)
    }

    fn query_position(&self) -> Result<(), JointError> {
        self.send_all(&[protocol::sdo_upload_request(
            self.node,
            protocol::OD_POSITION_ACTUAL,
            0,
        )])
    }

    fn query_parameter(&self, index: u16, subindex: u8) -> Result<(), JointError> {
        self.send_all(&[protocol::sdo_upload_request(self.node, index, subindex)])
    }

    fn update_zero_step(&self) -> Result<(), JointError> {
        let limit_adj = self.params.lock().limit_adj;
        let step = zero_step(limit_adj, self.counts_per_degree);
        // 零点偏移只在本地换算中生效，不写驱动器的 home offset
        self.state.update(|s| s.zero_step = step);
        debug!("Joint {}: zero step = {}", self.id, step);
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

/// 总线关节工厂
///
/// 创建的每个关节都注册到同一个 `FrameRouter`，由接收线程分发反馈帧。
pub struct BusJointFactory {
    channel: Arc<dyn BusChannel>,
    router: Arc<FrameRouter>,
}

impl BusJointFactory {
    pub fn new(channel: Arc<dyn BusChannel>, router: Arc<FrameRouter>) -> Self {
        Self { channel, router }
    }
}

impl JointFactory for BusJointFactory {
    fn create(
        &self,
        config: &JointConfig,
        events: EventSink,
    ) -> Result<Arc<dyn JointController>, JointError> {
        let joint = Arc::new(BusJoint::new(config, self.channel.clone(), events)?);
        self.router.register(joint.clone())?;
        Ok(joint)
    }
}
