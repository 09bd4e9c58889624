//! 运行时：周期动作 + 关节事件泵
//!
//! | 线程 | 周期 | 动作 |
//! |---|---|---|
//! | `arm-tick-set-point` | 50 ms | `write_joint_set_points()` |
//! | `arm-tick-encoder` | 100 ms | `encoder` 信号 |
//! | `arm-tick-state` | 1000 ms | `state` 广播 |
//! | `arm-events` | 事件驱动 | `process_joint_events()` |

use crate::error::RobotError;
use crate::robot::Robot;
use crate::scheduler::{ActionId, CyclicScheduler, SchedulerHandle};
use arm_config::CyclePeriods;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, trace};

/// 事件泵等待超时，决定停止的响应时间
const PUMP_WAIT: Duration = Duration::from_millis(10);

/// `Robot::schedule()` 注册的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledActions {
    pub set_point: ActionId,
    pub encoder: ActionId,
    pub state: ActionId,
}

impl Robot {
    /// 注册三个周期动作
    pub fn schedule(
        self: &Arc<Self>,
        scheduler: &mut CyclicScheduler,
        periods: CyclePeriods,
    ) -> Result<ScheduledActions, RobotError> {
        let robot = self.clone();
        let set_point = scheduler.register("set-point", periods.set_point(), move || {
            robot.write_joint_set_points();
            Ok(())
        })?;

        let robot = self.clone();
        let encoder = scheduler.register("encoder", periods.encoder(), move || {
            robot.signal_encoder();
            Ok(())
        })?;

        let robot = self.clone();
        let state = scheduler.register("state", periods.state(), move || {
            robot.broadcast_state();
            Ok(())
        })?;

        Ok(ScheduledActions {
            set_point,
            encoder,
            state,
        })
    }
}

/// 关节事件泵线程
///
/// `stop()` 或 drop 时停止并 join。
pub struct EventPump {
    is_running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EventPump {
    pub fn spawn(robot: Arc<Robot>) -> Result<Self, RobotError> {
        let is_running = Arc::new(AtomicBool::new(true));
        let flag = is_running.clone();

        let handle = std::thread::Builder::new()
            .name("arm-events".to_string())
            .spawn(move || {
                while flag.load(Ordering::Acquire) {
                    let handled = robot.wait_joint_events(PUMP_WAIT);
                    if handled > 0 {
                        trace!("Event pump: {} joint event(s)", handled);
                    }
                }
            })
            .map_err(|source| RobotError::Spawn {
                name: "arm-events".to_string(),
                source,
            })?;

        Ok(Self {
            is_running,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        self.is_running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            error!("Event pump thread panicked");
        }
    }
}

impl Drop for EventPump {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 运行中的机械臂
pub struct RobotRuntime {
    robot: Arc<Robot>,
    actions: ScheduledActions,
    scheduler: SchedulerHandle,
    pump: EventPump,
    running: bool,
}

impl RobotRuntime {
    /// 启动周期动作和事件泵
    pub fn start(robot: Arc<Robot>, periods: CyclePeriods) -> Result<Self, RobotError> {
        let mut scheduler = CyclicScheduler::monotonic();
        let actions = robot.schedule(&mut scheduler, periods)?;

        let pump = EventPump::spawn(robot.clone())?;
        let scheduler = scheduler.start()?;

        info!(
            "Robot {}: runtime started (set-point {:?}, encoder {:?}, state {:?})",
            robot.id(),
            periods.set_point(),
            periods.encoder(),
            periods.state()
        );
        Ok(Self {
            robot,
            actions,
            scheduler,
            pump,
            running: true,
        })
    }

    pub fn robot(&self) -> &Arc<Robot> {
        &self.robot
    }

    pub fn actions(&self) -> ScheduledActions {
        self.actions
    }

    /// 取消单个周期动作
    pub fn cancel(&mut self, id: ActionId) -> bool {
        self.scheduler.cancel(id)
    }

    /// 停止所有线程（drop 时自动调用）
    pub fn shutdown(&mut self) {
        if !std::mem::replace(&mut self.running, false) {
            return;
        }
        self.scheduler.stop();
        self.pump.stop();
        info!("Robot {}: runtime stopped", self.robot.id());
    }
}

impl Drop for RobotRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}
