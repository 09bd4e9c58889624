//! 机械臂描述（TOML）
//!
//! ```toml
//! id = "bench-arm"
//! store = "params.json"
//!
//! [cycle]
//! set_point_ms = 50
//!
//! [[joints]]
//! id = "j0"
//! bus_address = 1
//!
//! [[joints]]
//! id = "j1"
//! bus_address = 2
//! counts_per_degree = 100.0
//! ```

use crate::error::ConfigError;
use arm_joint::JointConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 周期动作的周期（毫秒）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CyclePeriods {
    /// 设定点下发
    pub set_point_ms: u64,
    /// 编码器 / 遥测信号
    pub encoder_ms: u64,
    /// 状态广播
    pub state_ms: u64,
}

impl Default for CyclePeriods {
    fn default() -> Self {
        Self {
            set_point_ms: 50,
            encoder_ms: 100,
            state_ms: 1000,
        }
    }
}

impl CyclePeriods {
    pub fn set_point(&self) -> Duration {
        Duration::from_millis(self.set_point_ms)
    }

    pub fn encoder(&self) -> Duration {
        Duration::from_millis(self.encoder_ms)
    }

    pub fn state(&self) -> Duration {
        Duration::from_millis(self.state_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, ms) in [
            ("set_point_ms", self.set_point_ms),
            ("encoder_ms", self.encoder_ms),
            ("state_ms", self.state_ms),
        ] {
            if ms == 0 {
                return Err(ConfigError::Validation(format!("cycle.{} must be > 0", name)));
            }
        }
        Ok(())
    }
}

/// 机械臂描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmConfig {
    pub id: String,
    #[serde(default)]
    pub joints: Vec<JointConfig>,
    #[serde(default)]
    pub cycle: CyclePeriods,
    /// 参数文档路径；相对路径按描述文件所在目录解析
    #[serde(default)]
    pub store: Option<PathBuf>,
}

impl ArmConfig {
    /// 解析并校验
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: ArmConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载；`store` 的相对路径改写为相对于该文件
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        let mut config = Self::from_toml_str(&contents)?;

        if let Some(store) = config.store.as_mut()
            && store.is_relative()
            && let Some(dir) = path.parent()
        {
            *store = dir.join(&*store);
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::Validation("arm id must not be empty".into()));
        }
        self.cycle.validate()?;

        let mut ids = HashSet::new();
        let mut addresses = HashSet::new();
        for joint in &self.joints {
            if joint.id.is_empty() || joint.id.contains('.') {
                return Err(ConfigError::Validation(format!(
                    "joint id '{}' must be non-empty and must not contain '.'",
                    joint.id
                )));
            }
            if !ids.insert(joint.id.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate joint id '{}'",
                    joint.id
                )));
            }
            if !addresses.insert(joint.bus_address) {
                return Err(ConfigError::Validation(format!(
                    "duplicate bus address {} (joint '{}')",
                    joint.bus_address, joint.id
                )));
            }
        }
        Ok(())
    }
}
