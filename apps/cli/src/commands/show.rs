//! 状态输出命令

use crate::session::{RobotArgs, Session};
use anyhow::Result;
use clap::Args;
use serde_json::json;
use std::time::Duration;
use tracing::warn;

/// 等待位置查询应答的时间
const QUERY_SETTLE: Duration = Duration::from_millis(200);

#[derive(Args, Debug)]
pub struct ShowCommand {
    #[command(flatten)]
    pub robot: RobotArgs,
}

impl ShowCommand {
    pub fn execute(self) -> Result<()> {
        let session = Session::open(&self.robot)?;
        let robot = &session.robot;

        if session.is_bus() {
            for id in robot.joint_ids() {
                if let Err(e) = robot.query_motor_position(id) {
                    warn!("Position query failed: {}", e);
                }
            }
            std::thread::sleep(QUERY_SETTLE);
        }
        robot.process_joint_events();

        let output = json!({
            "state": robot.state().to_json(),
            "meta": robot.meta().to_json(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }
}
