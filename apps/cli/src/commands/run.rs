//! 运行命令
//!
//! 启动周期动作和事件泵，记录广播，Ctrl-C 时停止所有关节后退出。

use crate::session::{RobotArgs, Session};
use anyhow::{Context, Result};
use arm_robot::{RobotEvent, RobotRuntime};
use clap::Args;
use crossbeam_channel::RecvTimeoutError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, trace};

#[derive(Args, Debug)]
pub struct RunCommand {
    #[command(flatten)]
    pub robot: RobotArgs,

    /// 启动后回零
    #[arg(long)]
    pub home: bool,
}

impl RunCommand {
    pub fn execute(self) -> Result<()> {
        let session = Session::open(&self.robot)?;
        let robot = session.robot.clone();
        let events = robot.subscribe();

        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
            .context("failed to install Ctrl-C handler")?;

        let mut runtime = RobotRuntime::start(robot.clone(), session.arm.cycle)?;
        robot.robot_enable();
        if self.home {
            robot.robot_home();
        }
        info!("Running, press Ctrl-C to stop");

        while running.load(Ordering::SeqCst) {
            match events.recv_timeout(Duration::from_millis(100)) {
                Ok(event) => log_event(&event),
                Err(RecvTimeoutError::Timeout) => {},
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        info!("Stopping");
        robot.robot_stop();
        runtime.shutdown();
        Ok(())
    }
}

fn log_event(event: &RobotEvent) {
    match event {
        RobotEvent::Ready => info!("ready"),
        RobotEvent::Meta(meta) => info!("meta: {}", meta.to_json()),
        RobotEvent::State(state) => debug!("state: {}", state.to_json()),
        RobotEvent::Encoder => trace!("encoder"),
    }
}
