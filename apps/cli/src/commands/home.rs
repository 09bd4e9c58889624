//! 回零命令

use crate::session::{RobotArgs, Session};
use anyhow::{Result, bail};
use arm_robot::EventPump;
use clap::Args;
use crossbeam_channel::RecvTimeoutError;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Args, Debug)]
pub struct HomeCommand {
    #[command(flatten)]
    pub robot: RobotArgs,

    /// 等待回零完成的超时（秒）
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,
}

impl HomeCommand {
    pub fn execute(self) -> Result<()> {
        let session = Session::open(&self.robot)?;
        let robot = session.robot.clone();
        let events = robot.subscribe();
        let _pump = EventPump::spawn(robot.clone())?;

        robot.robot_enable();
        let failures = robot.robot_home();
        if failures == session.arm.joints.len() && failures > 0 {
            bail!("homing could not be started on any joint");
        }

        let deadline = Instant::now() + Duration::from_secs(self.timeout_secs);
        loop {
            if robot.flags().home {
                info!("All joints homed");
                println!("{}", serde_json::to_string_pretty(&robot.meta().to_json())?);
                return Ok(());
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                robot.robot_stop();
                bail!("homing did not complete within {}s", self.timeout_secs);
            }
            match events.recv_timeout(remaining.min(Duration::from_millis(100))) {
                Ok(_) | Err(RecvTimeoutError::Timeout) => {},
                Err(RecvTimeoutError::Disconnected) => bail!("robot event channel closed"),
            }
        }
    }
}
