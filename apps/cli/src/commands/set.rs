//! 配置更新命令
//!
//! `joint.param` 更新关节参数，其余为全局键。

use crate::session::{RobotArgs, Session, parse_value};
use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

#[derive(Args, Debug)]
pub struct SetCommand {
    /// 配置键（如 j0.limitAdj）
    pub key: String,

    /// 值（JSON，无法解析时按字符串处理）
    #[arg(allow_hyphen_values = true)]
    pub value: String,

    /// 写入参数文件
    #[arg(long)]
    pub persist: bool,

    #[command(flatten)]
    pub robot: RobotArgs,
}

impl SetCommand {
    pub fn execute(self) -> Result<()> {
        let session = Session::open(&self.robot)?;
        let value = parse_value(&self.value);

        session
            .robot
            .update_config(&self.key, value.clone(), self.persist)
            .with_context(|| format!("failed to set '{}'", self.key))?;

        println!("{} = {}", self.key, value);
        if self.persist {
            info!("Saved to {}", session.store_path.display());
        } else {
            info!("Not persisted, pass --persist to write {}", session.store_path.display());
        }
        Ok(())
    }
}
